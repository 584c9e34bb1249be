//! Annotation persistence
//!
//! Saving replaces every stored record of a document with the current
//! annotation set. Loading rebuilds annotations record by record, skipping
//! any that no longer decode, so one damaged record never hides the rest.

mod autosave;
mod backend;
mod migrate;
mod record;

use pdf_markup_core::Annotation;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

pub use autosave::{Autosave, AutosaveConfig, AutosaveOutcome};
pub use backend::{JsonFileStore, MemoryStore, RecordStore};
pub use migrate::{
    legacy_tool, migrate, migrate_json, migrate_record, LegacyRecord, MigrationError,
    MigrationOutcome,
};
pub use record::{format_frame, parse_frame, AnnotationRecord, DecodeError, EncodeError};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("no saved annotations for document {0}")]
    NotFound(DocumentId),
    #[error("unsupported record schema version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid value for configuration key: {0}")]
    InvalidConfig(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Key under which a document's annotations are stored
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id derived from a PDF's file name
    pub fn for_path(path: &Path) -> Self {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Self(name.unwrap_or_else(|| path.to_string_lossy().into_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-system safe form of the id
    pub(crate) fn file_stem(&self) -> String {
        let stem: String = self
            .0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
            .collect();
        if stem.trim_matches('.').is_empty() {
            format!("_{stem}")
        } else {
            stem
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace the stored annotations of `document`, returning how many were written
///
/// Annotations with non-finite or zero-area geometry are left out with a
/// warning rather than failing the save.
pub fn save<'a, S, I>(backend: &mut S, document: &DocumentId, annotations: I) -> StorageResult<usize>
where
    S: RecordStore + ?Sized,
    I: IntoIterator<Item = &'a Annotation>,
{
    let mut records = Vec::new();
    for annotation in annotations {
        match AnnotationRecord::from_annotation(annotation) {
            Ok(record) => records.push(record),
            Err(EncodeError::Invalid(err)) => {
                tracing::warn!(id = %annotation.id(), %err, "annotation not saved");
            }
            Err(EncodeError::Serde(err)) => return Err(err.into()),
        }
    }

    backend.replace_all(document, &records)?;
    tracing::debug!(%document, count = records.len(), "annotations saved");
    Ok(records.len())
}

/// Load the annotations of `document` ordered by creation time
///
/// Ids stay unique: a record repeating an earlier record's id is loaded
/// under a fresh id.
pub fn load<S: RecordStore + ?Sized>(
    backend: &S,
    document: &DocumentId,
) -> StorageResult<Vec<Annotation>> {
    let records = backend.fetch_all(document)?;
    let mut annotations = Vec::with_capacity(records.len());
    let mut seen = HashSet::with_capacity(records.len());
    for record in &records {
        let decoded = record.to_annotation().and_then(|annotation| {
            if !seen.contains(&annotation.id()) {
                return Ok(annotation);
            }
            let fresh = AnnotationRecord { id: Uuid::new_v4().to_string(), ..record.clone() };
            tracing::warn!(taken = %record.id, id = %fresh.id, "repeated record id re-identified");
            fresh.to_annotation()
        });
        match decoded {
            Ok(annotation) => {
                seen.insert(annotation.id());
                annotations.push(annotation);
            }
            Err(err) => tracing::warn!(id = %record.id, %err, "skipping unreadable record"),
        }
    }
    annotations.sort_by_key(|a| a.created_at());
    tracing::debug!(
        %document,
        loaded = annotations.len(),
        skipped = records.len() - annotations.len(),
        "annotations loaded"
    );
    Ok(annotations)
}

/// [`load`], with any failure presented as an empty document
pub fn load_or_empty<S: RecordStore + ?Sized>(backend: &S, document: &DocumentId) -> Vec<Annotation> {
    match load(backend, document) {
        Ok(annotations) => annotations,
        Err(StorageError::NotFound(_)) => Vec::new(),
        Err(err) => {
            tracing::warn!(%document, %err, "annotations unavailable, starting empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_markup_core::{AnnotationStore, Color, Point, Rect, Tool};

    fn rect_at(x: f32) -> Annotation {
        Annotation::new(Tool::Rectangle, Rect::new(x, 0.0, 10.0, 10.0), 0)
    }

    #[test]
    fn save_then_load_restores_fields() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut backend = JsonFileStore::with_root(temp.path());
        let doc = DocumentId::new("contract.pdf");

        let mut store = AnnotationStore::default();
        let mut note = Annotation::new(Tool::Note, Rect::new(5.0, 5.0, 24.0, 24.0), 1);
        note.properties_mut().text = "check totals".into();
        note.properties_mut().fill_color = Some(Color::RED);
        let note_id = store.add(note);
        let line_id = store.add({
            let mut line = Annotation::new(Tool::Line, Rect::new(0.0, 0.0, 50.0, 1.0), 0);
            line.properties_mut().path = vec![
                pdf_markup_core::PathSegment::MoveTo { to: Point::new(0.0, 0.5) },
                pdf_markup_core::PathSegment::LineTo { to: Point::new(50.0, 0.5) },
            ];
            line
        });

        assert_eq!(save(&mut backend, &doc, store.iter()).unwrap(), 2);
        let loaded = load(&backend, &doc).unwrap();

        assert_eq!(loaded.len(), 2);
        let restored_note = loaded.iter().find(|a| a.id() == note_id).unwrap();
        let original_note = store.get(note_id).unwrap();
        assert_eq!(restored_note.properties(), original_note.properties());
        assert_eq!(restored_note.page_index(), 1);
        assert_eq!(restored_note.z_index(), original_note.z_index());
        let restored_line = loaded.iter().find(|a| a.id() == line_id).unwrap();
        assert_eq!(restored_line.properties().path.len(), 2);
    }

    #[test]
    fn save_replaces_previous_set() {
        let mut backend = MemoryStore::new();
        let doc = DocumentId::new("doc");
        let (a, b) = (rect_at(0.0), rect_at(20.0));

        save(&mut backend, &doc, [&a, &b]).unwrap();
        save(&mut backend, &doc, [&b]).unwrap();

        let loaded = load(&backend, &doc).unwrap();
        assert_eq!(loaded.iter().map(Annotation::id).collect::<Vec<_>>(), vec![b.id()]);
    }

    #[test]
    fn degenerate_annotations_are_not_saved() {
        let mut backend = MemoryStore::new();
        let doc = DocumentId::new("doc");
        let flat = Annotation::new(Tool::Rectangle, Rect::new(0.0, 0.0, 0.0, 10.0), 0);

        assert_eq!(save(&mut backend, &doc, [&flat, &rect_at(0.0)]).unwrap(), 1);
    }

    #[test]
    fn load_skips_bad_records_and_orders_by_creation() {
        let mut backend = MemoryStore::new();
        let doc = DocumentId::new("doc");
        let mut records: Vec<AnnotationRecord> = [rect_at(0.0), rect_at(10.0)]
            .iter()
            .map(|a| AnnotationRecord::from_annotation(a).unwrap())
            .collect();
        records[0].created_at = 2_000;
        records[1].created_at = 1_000;
        let mut broken = records[0].clone();
        broken.frame = "garbage".into();
        records.push(broken);
        backend.replace_all(&doc, &records).unwrap();

        let loaded = load(&backend, &doc).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].created_at(), 1_000);
        assert_eq!(loaded[1].created_at(), 2_000);
    }

    #[test]
    fn repeated_record_ids_load_as_distinct_annotations() {
        let mut backend = MemoryStore::new();
        let doc = DocumentId::new("doc");
        let rect = AnnotationRecord::from_annotation(&rect_at(0.0)).unwrap();
        let oval = Annotation::new(Tool::Oval, Rect::new(40.0, 0.0, 10.0, 10.0), 0);
        let mut oval = AnnotationRecord::from_annotation(&oval).unwrap();
        oval.id = rect.id.clone();
        oval.created_at = rect.created_at + 1;
        backend.replace_all(&doc, &[rect.clone(), oval]).unwrap();

        let loaded = load(&backend, &doc).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id().to_string(), rect.id);
        assert_eq!(loaded[0].tool(), Tool::Rectangle);
        assert_ne!(loaded[1].id(), loaded[0].id());

        let store = AnnotationStore::with_annotations(loaded, 50);
        let mut tools: Vec<Tool> = store.page_annotations(0).iter().map(|a| a.tool()).collect();
        tools.sort_by_key(|t| t.as_str());
        assert_eq!(tools, vec![Tool::Oval, Tool::Rectangle]);
    }

    #[test]
    fn missing_document_loads_empty() {
        let backend = MemoryStore::new();
        let doc = DocumentId::new("unknown");
        assert!(matches!(load(&backend, &doc), Err(StorageError::NotFound(_))));
        assert!(load_or_empty(&backend, &doc).is_empty());
    }

    #[test]
    fn file_stem_is_path_safe() {
        assert_eq!(DocumentId::new("a b/c.pdf").file_stem(), "a_b_c.pdf");
        assert_eq!(DocumentId::new("..").file_stem(), "_..");
        assert_eq!(DocumentId::new("").file_stem(), "_");
        assert_eq!(DocumentId::for_path(Path::new("/tmp/x/report.pdf")).as_str(), "report.pdf");
    }
}
