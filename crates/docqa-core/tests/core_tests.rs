use std::fs;
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;

use docqa_core::data_processor::DataProcessor;
use docqa_core::{DocumentStore, Embedding, RetryPolicy};

#[test]
fn process_directory_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let mut f = fs::File::create(dir.join("a.txt")).unwrap();
    writeln!(f, "Short text").unwrap();

    let docs = DataProcessor::new().process_directory(dir).expect("process");

    assert_eq!(docs.len(), 1, "one small paragraph becomes one document");
    assert_eq!(docs[0].content, "Short text");
    assert_eq!(docs[0].source, "a");
    assert_eq!(docs[0].title, "a #1");
}

#[test]
fn process_directory_walks_nested_dirs_and_ignores_other_files() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("nested")).unwrap();
    fs::write(dir.join("nested").join("letters.txt"), "one\n\ntwo").unwrap();
    fs::write(dir.join("photo.jpg"), [0u8, 1, 2]).unwrap();

    let docs = DataProcessor::new().process_directory(dir).expect("process");

    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.source == "nested/letters"));
    assert_eq!(docs[0].id, "nested/letters:1");
}

#[test]
fn same_file_name_in_two_folders_keeps_both_paragraphs() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("a")).unwrap();
    fs::create_dir_all(dir.join("b")).unwrap();
    fs::write(dir.join("a").join("notes.txt"), "alpha").unwrap();
    fs::write(dir.join("b").join("notes.txt"), "beta").unwrap();

    let docs = DataProcessor::new().process_directory(dir).expect("process");

    let ids: std::collections::HashSet<_> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids.len(), 2, "ids stay unique across folders");
    assert!(ids.contains("a/notes:1") && ids.contains("b/notes:1"));
}

#[test]
fn process_directory_limited_two_files_limit_one() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "alpha bravo").unwrap();
    fs::write(dir.join("b.txt"), "charlie delta").unwrap();

    let docs = DataProcessor::new().process_directory_limited(dir, 1).expect("process limited");

    let sources: std::collections::HashSet<_> = docs.iter().map(|d| d.source.clone()).collect();
    assert_eq!(sources.len(), 1, "limited to one source file");
}

#[test]
fn empty_directory_yields_no_documents() {
    let tmp = TempDir::new().unwrap();
    let docs = DataProcessor::new().process_directory(tmp.path()).expect("process");
    assert!(docs.is_empty());
}

/// Store double that only implements the required methods, so the provided
/// `persist_embeddings` and `coverage` defaults are what gets exercised.
struct VecStore(std::sync::Mutex<Vec<docqa_core::Document>>);

impl DocumentStore for VecStore {
    fn documents_with_embeddings(&self) -> anyhow::Result<Vec<(String, Vec<f32>)>> {
        let docs = self.0.lock().unwrap();
        Ok(docs.iter().filter_map(|d| d.embedding.clone().map(|v| (d.id.clone(), v))).collect())
    }

    fn documents_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<docqa_core::Document>> {
        let docs = self.0.lock().unwrap();
        Ok(docs.iter().filter(|d| ids.contains(&d.id)).cloned().collect())
    }

    fn all_documents(&self) -> anyhow::Result<Vec<docqa_core::Document>> {
        Ok(self.0.lock().unwrap().clone())
    }

    fn documents_missing_embeddings(&self, source: Option<&str>) -> anyhow::Result<Vec<docqa_core::Document>> {
        let docs = self.0.lock().unwrap();
        Ok(docs
            .iter()
            .filter(|d| !d.has_embedding() && source.map_or(true, |s| d.source == s))
            .cloned()
            .collect())
    }

    fn persist_embedding(&self, id: &str, vector: &Embedding) -> anyhow::Result<()> {
        let mut docs = self.0.lock().unwrap();
        let doc = docs.iter_mut().find(|d| d.id == id).ok_or_else(|| anyhow::anyhow!("unknown id {id}"))?;
        doc.embedding = Some(vector.as_slice().to_vec());
        Ok(())
    }
}

#[test]
fn default_store_methods_persist_and_report_coverage() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("diary.txt"), "a\n\nb\n\nc").unwrap();
    fs::write(tmp.path().join("recipes.txt"), "d").unwrap();
    let docs = DataProcessor::new().process_directory(tmp.path()).unwrap();
    let store = VecStore(std::sync::Mutex::new(docs));

    let v = Embedding::try_new(vec![1.0, 0.0]).unwrap();
    let written = store
        .persist_embeddings(&[("diary:1".to_string(), v.clone()), ("recipes:1".to_string(), v)])
        .unwrap();
    assert_eq!(written, 2);

    let all = store.coverage(None).unwrap();
    assert_eq!((all.total, all.with_embedding, all.without_embedding), (4, 2, 2));
    assert_eq!(all.percentage, 50.0);

    let diary = store.coverage(Some("diary")).unwrap();
    assert_eq!((diary.total, diary.with_embedding), (3, 1));
    assert!((diary.percentage - 33.33).abs() < 1e-9);
    assert_eq!(store.documents_missing_embeddings(Some("diary")).unwrap().len(), 2);
}

#[tokio::test]
async fn retry_policy_recovers_after_two_failures() {
    let policy = RetryPolicy::fixed(3, Duration::from_millis(1));
    let out: Result<&str, String> = policy
        .run(|attempt| async move { if attempt < 3 { Err(format!("boom {attempt}")) } else { Ok("ok") } }, |_| true)
        .await;
    assert_eq!(out, Ok("ok"));
}
