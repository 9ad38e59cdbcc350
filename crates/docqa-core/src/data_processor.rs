use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::Document;

/// Turns a directory of `.txt` files into documents: one document per
/// non-empty paragraph, grouped under the file's path relative to the data
/// directory (without extension, `/`-separated) as `source`.
#[derive(Debug, Clone, Default)]
pub struct DataProcessor {
    /// Paragraphs longer than this are split on whitespace; `None` keeps them whole.
    max_paragraph_chars: Option<usize>,
}

impl DataProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_paragraph_chars(mut self, max: usize) -> Self {
        self.max_paragraph_chars = Some(max.max(1));
        self
    }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<Document>> {
        self.process_files(data_dir, self.list_txt_files(data_dir))
    }

    pub fn process_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<Vec<Document>> {
        let mut files = self.list_txt_files(data_dir);
        if files.len() > limit {
            files.truncate(limit);
            info!(limit, "limited ingestion to the first files");
        }
        self.process_files(data_dir, files)
    }

    fn process_files(&self, data_dir: &Path, files: Vec<PathBuf>) -> Result<Vec<Document>> {
        if files.is_empty() {
            warn!(dir = %data_dir.display(), "no .txt files found");
            return Ok(vec![]);
        }
        let mut documents = Vec::new();
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(file = %file_path.display(), n = file_index + 1, of = files.len(), "processing file");
            let content = self.read_file_content(file_path)?;
            let Some(source) = self.source_for(data_dir, file_path) else {
                warn!(file = %file_path.display(), "skipping file without a usable name");
                continue;
            };
            documents.extend(self.split_document(&content, &source));
        }
        info!(files = files.len(), documents = documents.len(), "processed directory");
        Ok(documents)
    }

    /// Split one file's text into paragraph documents. Ids are `"{source}:{n}"`
    /// and titles `"{source} #{n}"`, counting from 1.
    pub fn split_document(&self, content: &str, source: &str) -> Vec<Document> {
        let normalized = content.replace("\r\n", "\n");
        let mut out = Vec::new();
        for paragraph in normalized.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            for piece in self.split_long(paragraph) {
                let n = out.len() + 1;
                out.push(Document::new(format!("{source}:{n}"), format!("{source} #{n}"), piece, source));
            }
        }
        out
    }

    fn split_long(&self, paragraph: &str) -> Vec<String> {
        let Some(max) = self.max_paragraph_chars else {
            return vec![paragraph.to_string()];
        };
        let mut pieces = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;
        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            if current_len > 0 && current_len + 1 + word_len > max {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
        }
        if !current.is_empty() {
            pieces.push(current);
        }
        pieces
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => {
                let bytes = fs::read(file_path).with_context(|| format!("reading {}", file_path.display()))?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }

    /// `notes.txt` -> `notes`, `2019/notes.txt` -> `2019/notes`. Nested files
    /// keep their directories so equal stems never share document ids.
    fn source_for(&self, data_dir: &Path, file_path: &Path) -> Option<String> {
        let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path).with_extension("");
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().trim().to_string()),
                _ => None,
            })
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    fn list_txt_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
            .collect();
        txt_files.sort();
        txt_files
    }
}
