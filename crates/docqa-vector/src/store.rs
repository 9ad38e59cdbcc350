use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use docqa_core::{Document, DocumentId, DocumentStore, Embedding, Error, IndexError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Serialize, Deserialize)]
struct Snapshot {
    documents: Vec<Document>,
}

/// Document store held in memory and persisted as one JSON snapshot.
///
/// Embedding batches are applied under a single write lock, so readers see
/// either none or all of a batch.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<Vec<Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: Vec<Document>) -> Self {
        let store = Self::new();
        store.add_documents(documents);
        store
    }

    /// Load a snapshot; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no snapshot yet, starting empty");
            return Ok(Self::new());
        }
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let snapshot: Snapshot =
            serde_json::from_str(&raw).with_context(|| format!("parsing snapshot {}", path.display()))?;
        info!(path = %path.display(), documents = snapshot.documents.len(), "loaded snapshot");
        Ok(Self::with_documents(snapshot.documents))
    }

    /// Write the snapshot next to `path` and rename it into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let snapshot = Snapshot { documents: self.read().clone() };
        let json = serde_json::to_string_pretty(&snapshot)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        debug!(path = %path.display(), documents = snapshot.documents.len(), "saved snapshot");
        Ok(())
    }

    /// Insert documents, replacing any existing document with the same id.
    /// A replacement without a vector keeps the stored one when its title
    /// and content are unchanged. Returns how many were new.
    pub fn add_documents(&self, documents: Vec<Document>) -> usize {
        let mut docs = self.write();
        let mut positions: HashMap<DocumentId, usize> =
            docs.iter().enumerate().map(|(i, d)| (d.id.clone(), i)).collect();
        let mut added = 0;
        for mut doc in documents {
            match positions.get(&doc.id) {
                Some(&i) => {
                    let old = &mut docs[i];
                    if doc.embedding.is_none() && old.title == doc.title && old.content == doc.content {
                        doc.embedding = old.embedding.take();
                    }
                    *old = doc;
                }
                None => {
                    positions.insert(doc.id.clone(), docs.len());
                    docs.push(doc);
                    added += 1;
                }
            }
        }
        added
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.read().iter().find(|d| d.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensionality of the vectors already stored, if any.
    pub fn dimension(&self) -> Option<usize> {
        stored_dimension(&self.read())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Document>> {
        self.docs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Document>> {
        self.docs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn stored_dimension(docs: &[Document]) -> Option<usize> {
    docs.iter().find_map(|d| d.embedding.as_ref().filter(|v| !v.is_empty()).map(Vec::len))
}

fn check_dimension(expected: Option<usize>, vector: &Embedding) -> Result<(), IndexError> {
    match expected {
        Some(expected) if expected != vector.dim() => {
            Err(IndexError::DimensionMismatch { expected, actual: vector.dim() })
        }
        _ => Ok(()),
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn documents_with_embeddings(&self) -> Result<Vec<(DocumentId, Vec<f32>)>> {
        Ok(self
            .read()
            .iter()
            .filter_map(|d| d.embedding.as_ref().filter(|v| !v.is_empty()).map(|v| (d.id.clone(), v.clone())))
            .collect())
    }

    fn documents_by_ids(&self, ids: &[DocumentId]) -> Result<Vec<Document>> {
        let docs = self.read();
        let by_id: HashMap<&str, &Document> = docs.iter().map(|d| (d.id.as_str(), d)).collect();
        Ok(ids.iter().filter_map(|id| by_id.get(id.as_str()).map(|d| (*d).clone())).collect())
    }

    fn all_documents(&self) -> Result<Vec<Document>> {
        Ok(self.read().clone())
    }

    fn documents_missing_embeddings(&self, source: Option<&str>) -> Result<Vec<Document>> {
        Ok(self
            .read()
            .iter()
            .filter(|d| !d.has_embedding() && source.map_or(true, |s| d.source == s))
            .cloned()
            .collect())
    }

    fn persist_embedding(&self, id: &str, vector: &Embedding) -> Result<()> {
        self.persist_embeddings(&[(id.to_string(), vector.clone())]).map(|_| ())
    }

    fn persist_embeddings(&self, batch: &[(DocumentId, Embedding)]) -> Result<usize> {
        let mut docs = self.write();
        let positions: HashMap<&str, usize> = docs.iter().enumerate().map(|(i, d)| (d.id.as_str(), i)).collect();

        // validate the whole batch before touching anything
        let mut expected = stored_dimension(&docs);
        let mut targets = Vec::with_capacity(batch.len());
        for (id, vector) in batch {
            let &i = positions.get(id.as_str()).ok_or_else(|| Error::NotFound(format!("document {id}")))?;
            check_dimension(expected, vector)?;
            expected = Some(vector.dim());
            targets.push(i);
        }
        drop(positions);

        for (i, (_, vector)) in targets.into_iter().zip(batch) {
            docs[i].embedding = Some(vector.as_slice().to_vec());
        }
        Ok(batch.len())
    }
}
