//! Periodic best-effort saving
//!
//! The host calls [`Autosave::tick`] from its timer on the same sequence
//! that mutates the annotation store. Store events mark the document dirty;
//! a tick saves once the interval has passed since the last attempt. A
//! failed save leaves the document dirty so the next due tick retries.

use crate::backend::RecordStore;
use crate::{save, DocumentId, StorageError, StorageResult};
use pdf_markup_core::{AnnotationStore, StoreEvent};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub interval: Duration,
    pub enabled: bool,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(5), enabled: true }
    }
}

impl AutosaveConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PDF_MARKUP_AUTOSAVE`: `on`/`off` (also `true`/`false`, `1`/`0`)
    /// - `PDF_MARKUP_AUTOSAVE_SECS`: interval in whole seconds (default: 5)
    pub fn from_env() -> StorageResult<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PDF_MARKUP_AUTOSAVE") {
            config.enabled = match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                _ => return Err(StorageError::InvalidConfig("PDF_MARKUP_AUTOSAVE".into())),
            };
        }
        if let Ok(val) = std::env::var("PDF_MARKUP_AUTOSAVE_SECS") {
            let secs = val
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| StorageError::InvalidConfig("PDF_MARKUP_AUTOSAVE_SECS".into()))?;
            config.interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Result of one autosave tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosaveOutcome {
    Disabled,
    /// Nothing changed since the last successful save
    Clean,
    NotDue,
    Saved(usize),
    Failed,
}

#[derive(Debug)]
pub struct Autosave {
    config: AutosaveConfig,
    document: DocumentId,
    dirty: bool,
    last_attempt: Instant,
}

impl Autosave {
    /// Start tracking `document`; the first save is due one interval after `now`
    pub fn new(config: AutosaveConfig, document: DocumentId, now: Instant) -> Self {
        Self { config, document, dirty: false, last_attempt: now }
    }

    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn observe(&mut self, event: &StoreEvent) {
        if event.is_content_change() {
            self.dirty = true;
        }
    }

    /// Consume every pending store event without blocking
    pub fn drain(&mut self, events: &Receiver<StoreEvent>) {
        for event in events.try_iter() {
            self.observe(&event);
        }
    }

    /// Save if enabled, dirty and due
    pub fn tick<S: RecordStore + ?Sized>(
        &mut self,
        now: Instant,
        backend: &mut S,
        annotations: &AnnotationStore,
    ) -> AutosaveOutcome {
        if !self.config.enabled {
            return AutosaveOutcome::Disabled;
        }
        if !self.dirty {
            return AutosaveOutcome::Clean;
        }
        if now.saturating_duration_since(self.last_attempt) < self.config.interval {
            return AutosaveOutcome::NotDue;
        }
        self.flush(now, backend, annotations)
    }

    /// Save now if dirty, ignoring the interval
    pub fn flush<S: RecordStore + ?Sized>(
        &mut self,
        now: Instant,
        backend: &mut S,
        annotations: &AnnotationStore,
    ) -> AutosaveOutcome {
        if !self.dirty {
            return AutosaveOutcome::Clean;
        }
        self.last_attempt = now;
        match save(backend, &self.document, annotations.iter()) {
            Ok(count) => {
                self.dirty = false;
                AutosaveOutcome::Saved(count)
            }
            Err(err) => {
                tracing::warn!(document = %self.document, %err, "autosave failed, will retry");
                AutosaveOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::record::AnnotationRecord;
    use pdf_markup_core::{Annotation, Rect, Tool};
    use serial_test::serial;
    use std::env;

    struct FlakyStore {
        inner: MemoryStore,
        fail_next: bool,
    }

    impl RecordStore for FlakyStore {
        fn replace_all(
            &mut self,
            document: &DocumentId,
            records: &[AnnotationRecord],
        ) -> StorageResult<()> {
            if std::mem::take(&mut self.fail_next) {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.replace_all(document, records)
        }

        fn fetch_all(&self, document: &DocumentId) -> StorageResult<Vec<AnnotationRecord>> {
            self.inner.fetch_all(document)
        }
    }

    fn setup() -> (Autosave, AnnotationStore, Instant) {
        let start = Instant::now();
        let autosave = Autosave::new(AutosaveConfig::default(), DocumentId::new("doc"), start);
        (autosave, AnnotationStore::default(), start)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn clean_document_is_a_no_op() {
        let (mut autosave, store, start) = setup();
        let mut backend = MemoryStore::new();

        assert_eq!(autosave.tick(start + secs(60), &mut backend, &store), AutosaveOutcome::Clean);
        assert_eq!(backend.document_count(), 0);
    }

    #[test]
    fn saves_after_interval_once_dirty() {
        let (mut autosave, mut store, start) = setup();
        let events = store.subscribe();
        let mut backend = MemoryStore::new();

        store.add(Annotation::new(Tool::Oval, Rect::new(0.0, 0.0, 20.0, 20.0), 0));
        autosave.drain(&events);
        assert!(autosave.is_dirty());

        assert_eq!(autosave.tick(start + secs(2), &mut backend, &store), AutosaveOutcome::NotDue);
        assert_eq!(autosave.tick(start + secs(5), &mut backend, &store), AutosaveOutcome::Saved(1));
        assert!(!autosave.is_dirty());
        assert_eq!(backend.fetch_all(autosave.document()).unwrap().len(), 1);
    }

    #[test]
    fn selection_changes_do_not_dirty() {
        let (mut autosave, _, _) = setup();
        autosave.observe(&StoreEvent::SelectionChanged { previous: None, current: None });
        autosave.observe(&StoreEvent::HistoryChanged { can_undo: true, can_redo: false });
        assert!(!autosave.is_dirty());

        autosave.observe(&StoreEvent::Cleared);
        assert!(autosave.is_dirty());
    }

    #[test]
    fn failure_keeps_dirty_and_retries_next_interval() {
        let (mut autosave, store, start) = setup();
        let mut backend = FlakyStore { inner: MemoryStore::new(), fail_next: true };
        autosave.mark_dirty();

        assert_eq!(autosave.tick(start + secs(5), &mut backend, &store), AutosaveOutcome::Failed);
        assert!(autosave.is_dirty());
        // The interval restarts from the failed attempt
        assert_eq!(autosave.tick(start + secs(6), &mut backend, &store), AutosaveOutcome::NotDue);
        assert_eq!(
            autosave.tick(start + secs(10), &mut backend, &store),
            AutosaveOutcome::Saved(0)
        );
    }

    #[test]
    fn disabled_never_saves() {
        let start = Instant::now();
        let config = AutosaveConfig::default().with_enabled(false);
        let mut autosave = Autosave::new(config, DocumentId::new("doc"), start);
        autosave.mark_dirty();
        let mut backend = MemoryStore::new();

        let outcome = autosave.tick(start + secs(60), &mut backend, &AnnotationStore::default());
        assert_eq!(outcome, AutosaveOutcome::Disabled);
        assert!(autosave.is_dirty());
    }

    #[test]
    fn flush_ignores_interval() {
        let (mut autosave, store, start) = setup();
        let mut backend = MemoryStore::new();
        autosave.mark_dirty();

        assert_eq!(autosave.flush(start, &mut backend, &store), AutosaveOutcome::Saved(0));
        assert_eq!(autosave.flush(start, &mut backend, &store), AutosaveOutcome::Clean);
    }

    #[test]
    #[serial]
    fn config_from_env() {
        let _guard = EnvGuard::new(&["PDF_MARKUP_AUTOSAVE", "PDF_MARKUP_AUTOSAVE_SECS"]);

        env::set_var("PDF_MARKUP_AUTOSAVE", "off");
        env::set_var("PDF_MARKUP_AUTOSAVE_SECS", "30");
        let config = AutosaveConfig::from_env().unwrap();
        assert!(!config.enabled);
        assert_eq!(config.interval, secs(30));

        env::set_var("PDF_MARKUP_AUTOSAVE_SECS", "0");
        assert!(matches!(AutosaveConfig::from_env(), Err(StorageError::InvalidConfig(_))));
    }

    // Helper to save and restore environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names.iter().map(|name| (name.to_string(), env::var(name).ok())).collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }
}
