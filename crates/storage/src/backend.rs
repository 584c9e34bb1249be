//! Record stores keyed by document
//!
//! Writes are replace-all: a document's previous records are swapped for
//! the new set in one step, so a reader never sees a mix of old and new.

use crate::record::AnnotationRecord;
use crate::{DocumentId, StorageError, StorageResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const RECORDS_SCHEMA_VERSION: u32 = 1;

pub trait RecordStore {
    /// Swap every record of `document` for `records`
    fn replace_all(
        &mut self,
        document: &DocumentId,
        records: &[AnnotationRecord],
    ) -> StorageResult<()>;

    /// All records of `document`; [`StorageError::NotFound`] if it was never saved
    fn fetch_all(&self, document: &DocumentId) -> StorageResult<Vec<AnnotationRecord>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordsEnvelope {
    version: u32,
    document: String,
    records: Vec<AnnotationRecord>,
}

/// One pretty-printed JSON file per document under a root directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn from_default_project() -> StorageResult<Self> {
        let dirs = ProjectDirs::from("dev", "PdfMarkup", "PdfMarkup")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().join("annotations") })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, document: &DocumentId) -> PathBuf {
        self.root.join(format!("{}.json", document.file_stem()))
    }
}

impl RecordStore for JsonFileStore {
    fn replace_all(
        &mut self,
        document: &DocumentId,
        records: &[AnnotationRecord],
    ) -> StorageResult<()> {
        fs::create_dir_all(&self.root)?;

        let envelope = RecordsEnvelope {
            version: RECORDS_SCHEMA_VERSION,
            document: document.as_str().to_string(),
            records: records.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        // Rename over the old file so a crash leaves either version intact
        let path = self.path_for(document);
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, bytes)?;
        if let Err(err) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        tracing::debug!(document = %document, count = records.len(), "records written");
        Ok(())
    }

    fn fetch_all(&self, document: &DocumentId) -> StorageResult<Vec<AnnotationRecord>> {
        let path = self.path_for(document);
        if !path.exists() {
            return Err(StorageError::NotFound(document.clone()));
        }

        let bytes = fs::read(path)?;
        let envelope: RecordsEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version > RECORDS_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion(envelope.version));
        }
        Ok(envelope.records)
    }
}

/// Process-local store, used by tests and previews
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: HashMap<DocumentId, Vec<AnnotationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }
}

impl RecordStore for MemoryStore {
    fn replace_all(
        &mut self,
        document: &DocumentId,
        records: &[AnnotationRecord],
    ) -> StorageResult<()> {
        self.documents.insert(document.clone(), records.to_vec());
        Ok(())
    }

    fn fetch_all(&self, document: &DocumentId) -> StorageResult<Vec<AnnotationRecord>> {
        self.documents
            .get(document)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(document.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> AnnotationRecord {
        AnnotationRecord {
            id: id.to_string(),
            tool: "rectangle".to_string(),
            page_index: 0,
            created_at: 1,
            modified_at: 1,
            z_index: 0,
            rotation: 0.0,
            frame: "0,0,10,10".to_string(),
            properties: "{}".to_string(),
            payload: None,
        }
    }

    #[test]
    fn replace_all_drops_previous_records() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut store = JsonFileStore::with_root(temp.path());
        let doc = DocumentId::new("report.pdf");

        store.replace_all(&doc, &[record("a"), record("b")]).expect("first save");
        store.replace_all(&doc, &[record("c")]).expect("second save");

        let loaded = store.fetch_all(&doc).expect("fetch should succeed");
        assert_eq!(loaded, vec![record("c")]);
        assert!(!store.path_for(&doc).with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_document_is_not_found() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = JsonFileStore::with_root(temp.path());

        let err = store.fetch_all(&DocumentId::new("never-saved")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn documents_are_isolated() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut store = JsonFileStore::with_root(temp.path());
        let (a, b) = (DocumentId::new("a.pdf"), DocumentId::new("b.pdf"));

        store.replace_all(&a, &[record("1")]).unwrap();
        store.replace_all(&b, &[]).unwrap();

        assert_eq!(store.fetch_all(&a).unwrap().len(), 1);
        assert!(store.fetch_all(&b).unwrap().is_empty());
    }

    #[test]
    fn newer_schema_is_rejected() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = JsonFileStore::with_root(temp.path());
        let doc = DocumentId::new("future");
        fs::write(store.path_for(&doc), r#"{"version": 99, "document": "future", "records": []}"#)
            .unwrap();

        assert!(matches!(store.fetch_all(&doc), Err(StorageError::UnsupportedVersion(99))));
    }

    #[test]
    fn corrupt_file_is_a_serde_error() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = JsonFileStore::with_root(temp.path());
        let doc = DocumentId::new("broken");
        fs::write(store.path_for(&doc), b"{ not json").unwrap();

        assert!(matches!(store.fetch_all(&doc), Err(StorageError::Serde(_))));
    }

    #[test]
    fn memory_store_round_trip() {
        let mut store = MemoryStore::new();
        let doc = DocumentId::new("mem");
        assert!(matches!(store.fetch_all(&doc), Err(StorageError::NotFound(_))));

        store.replace_all(&doc, &[record("x")]).unwrap();
        assert_eq!(store.fetch_all(&doc).unwrap(), vec![record("x")]);
        assert_eq!(store.document_count(), 1);
    }
}
