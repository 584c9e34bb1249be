//! Annotation store with a page-bucketed read-through cache
//!
//! The store owns the authoritative annotation list, the undo/redo log and
//! the single selection. All mutation goes through it so the page cache,
//! history and subscribers stay consistent.

use crate::annotation::{Annotation, AnnotationId, Snapshot};
use crate::config::EngineConfig;
use crate::geometry::Point;
use crate::history::{Action, ActionLog, DEFAULT_HISTORY_CAPACITY};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc;

/// Store operation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("annotation not found: {0}")]
    NotFound(AnnotationId),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Change notifications published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Added { id: AnnotationId, page_index: u32 },
    Removed { id: AnnotationId, page_index: u32 },
    Updated { id: AnnotationId, page_index: u32 },
    SelectionChanged { previous: Option<AnnotationId>, current: Option<AnnotationId> },
    Cleared,
    HistoryChanged { can_undo: bool, can_redo: bool },
}

impl StoreEvent {
    /// True for events that change persisted content
    pub fn is_content_change(&self) -> bool {
        matches!(
            self,
            StoreEvent::Added { .. }
                | StoreEvent::Removed { .. }
                | StoreEvent::Updated { .. }
                | StoreEvent::Cleared
        )
    }
}

/// Authoritative annotation list for one document
pub struct AnnotationStore {
    annotations: Vec<Annotation>,

    /// Position of each annotation in `annotations`
    index: HashMap<AnnotationId, usize>,

    /// Page index -> ids in ascending z order, rebuilt lazily after invalidation
    page_cache: RefCell<HashMap<u32, Vec<AnnotationId>>>,

    selected: Option<AnnotationId>,
    history: ActionLog,
    subscribers: Vec<mpsc::Sender<StoreEvent>>,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl std::fmt::Debug for AnnotationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationStore")
            .field("annotations", &self.annotations.len())
            .field("selected", &self.selected)
            .field("can_undo", &self.history.can_undo())
            .field("can_redo", &self.history.can_redo())
            .finish()
    }
}

impl AnnotationStore {
    /// Create an empty store with the given undo capacity
    pub fn new(history_capacity: usize) -> Self {
        Self {
            annotations: Vec::new(),
            index: HashMap::new(),
            page_cache: RefCell::new(HashMap::new()),
            selected: None,
            history: ActionLog::new(history_capacity),
            subscribers: Vec::new(),
        }
    }

    /// Empty store whose undo depth comes from the engine config
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.history_capacity)
    }

    /// Create a store pre-populated with loaded annotations and no history
    ///
    /// A repeated id is given to the first annotation carrying it; later
    /// ones are re-identified.
    pub fn with_annotations(annotations: Vec<Annotation>, history_capacity: usize) -> Self {
        let mut store = Self::new(history_capacity);
        let mut seen = HashSet::with_capacity(annotations.len());
        store.annotations = annotations
            .into_iter()
            .map(|mut annotation| {
                annotation.set_selected(false);
                if !seen.insert(annotation.id()) {
                    let taken = annotation.id();
                    annotation.assign_fresh_id();
                    seen.insert(annotation.id());
                    tracing::warn!(%taken, id = %annotation.id(), "repeated id re-identified");
                }
                annotation
            })
            .collect();
        store.reindex();
        store
    }

    /// Register a subscriber; dropped receivers are pruned on the next send
    pub fn subscribe(&mut self) -> mpsc::Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self, event: StoreEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn notify_history(&mut self) {
        let event = StoreEvent::HistoryChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        };
        self.notify(event);
    }

    fn reindex(&mut self) {
        self.index = self.annotations.iter().enumerate().map(|(i, a)| (a.id(), i)).collect();
    }

    fn invalidate_page(&self, page_index: u32) {
        self.page_cache.borrow_mut().remove(&page_index);
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// All annotations in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.index.get(&id).and_then(|&i| self.annotations.get(i))
    }

    fn get_mut(&mut self, id: AnnotationId) -> StoreResult<&mut Annotation> {
        let i = *self.index.get(&id).ok_or(StoreError::NotFound(id))?;
        self.annotations.get_mut(i).ok_or(StoreError::NotFound(id))
    }

    /// Highest z index among annotations on `page_index`
    fn page_max_z(&self, page_index: u32, excluding: Option<AnnotationId>) -> Option<i64> {
        self.annotations
            .iter()
            .filter(|a| a.page_index() == page_index && Some(a.id()) != excluding)
            .map(|a| a.z_index())
            .max()
    }

    fn page_min_z(&self, page_index: u32, excluding: Option<AnnotationId>) -> Option<i64> {
        self.annotations
            .iter()
            .filter(|a| a.page_index() == page_index && Some(a.id()) != excluding)
            .map(|a| a.z_index())
            .min()
    }

    /// Insert without recording history
    fn attach(&mut self, mut annotation: Annotation, position: usize) {
        let id = annotation.id();
        let page_index = annotation.page_index();
        annotation.set_selected(false);
        let position = position.min(self.annotations.len());
        self.annotations.insert(position, annotation);
        self.reindex();
        self.invalidate_page(page_index);
        tracing::trace!(%id, page_index, "annotation attached");
        self.notify(StoreEvent::Added { id, page_index });
    }

    /// Remove without recording history, returning the live annotation and its position
    fn detach(&mut self, id: AnnotationId) -> Option<(Annotation, usize)> {
        let position = *self.index.get(&id)?;
        let mut annotation = self.annotations.remove(position);
        self.reindex();
        let page_index = annotation.page_index();
        self.invalidate_page(page_index);
        if self.selected == Some(id) {
            self.selected = None;
            annotation.set_selected(false);
            self.notify(StoreEvent::SelectionChanged { previous: Some(id), current: None });
        }
        tracing::trace!(%id, page_index, "annotation detached");
        self.notify(StoreEvent::Removed { id, page_index });
        Some((annotation, position))
    }

    fn record(&mut self, action: Action) {
        tracing::debug!(kind = action.kind(), "recording action");
        self.history.record(action);
        self.notify_history();
    }

    /// Add an annotation on top of its page and record an Add action
    ///
    /// Returns the id the annotation is stored under. An id already present
    /// in the store is never reused: the newcomer gets a fresh one.
    pub fn add(&mut self, mut annotation: Annotation) -> AnnotationId {
        if self.index.contains_key(&annotation.id()) {
            let taken = annotation.id();
            annotation.assign_fresh_id();
            tracing::warn!(%taken, id = %annotation.id(), "id already in store, re-identified");
        }
        let page_index = annotation.page_index();
        let count = self.annotations.len() as i64;
        let z = self.page_max_z(page_index, None).map_or(count, |max| count.max(max + 1));
        annotation.set_z_index(z);
        let id = annotation.id();
        self.attach(annotation.clone(), self.annotations.len());
        self.record(Action::Add(annotation));
        id
    }

    /// Remove an annotation and record a Remove action
    pub fn remove(&mut self, id: AnnotationId) -> StoreResult<Annotation> {
        let (annotation, index) = self.detach(id).ok_or(StoreError::NotFound(id))?;
        self.record(Action::Remove { annotation: annotation.clone(), index });
        Ok(annotation)
    }

    /// Apply an in-place edit, stamp the modification time and invalidate caches
    ///
    /// No undo entry is recorded; use [`AnnotationStore::modify`] or
    /// [`AnnotationStore::commit_modify`] for undoable edits.
    pub fn update<F>(&mut self, id: AnnotationId, edit: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Annotation),
    {
        let annotation = self.get_mut(id)?;
        let old_page = annotation.page_index();
        edit(annotation);
        annotation.touch();
        let new_page = annotation.page_index();
        self.invalidate_page(old_page);
        if new_page != old_page {
            self.invalidate_page(new_page);
        }
        self.notify(StoreEvent::Updated { id, page_index: new_page });
        Ok(())
    }

    /// Apply an in-place edit and record it as one undoable Modify action
    pub fn modify<F>(&mut self, id: AnnotationId, edit: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Annotation),
    {
        let before = self.get(id).ok_or(StoreError::NotFound(id))?.snapshot();
        self.update(id, edit)?;
        self.commit_modify(id, before)
    }

    /// Record a Modify action from a snapshot taken before a multi-step edit
    ///
    /// Nothing is recorded when the annotation ended up unchanged.
    pub fn commit_modify(&mut self, id: AnnotationId, before: Snapshot) -> StoreResult<()> {
        let after = self.get(id).ok_or(StoreError::NotFound(id))?.snapshot();
        if after != before {
            self.record(Action::Modify { id, before, after });
        }
        Ok(())
    }

    /// Annotations on a page in ascending z order
    ///
    /// Served from the page cache when present, otherwise rebuilt from the
    /// full list and cached.
    pub fn page_annotations(&self, page_index: u32) -> Vec<&Annotation> {
        let mut cache = self.page_cache.borrow_mut();
        let ids = cache.entry(page_index).or_insert_with(|| {
            let mut on_page: Vec<&Annotation> =
                self.annotations.iter().filter(|a| a.page_index() == page_index).collect();
            on_page.sort_by_key(|a| a.z_index());
            on_page.into_iter().map(|a| a.id()).collect()
        });
        ids.iter().filter_map(|id| self.get(*id)).collect()
    }

    /// Whether the page currently has a cached bucket
    pub fn is_page_cached(&self, page_index: u32) -> bool {
        self.page_cache.borrow().contains_key(&page_index)
    }

    /// Topmost annotation on the page containing `point` (page space)
    pub fn hit_test(&self, point: &Point, page_index: u32) -> Option<&Annotation> {
        self.page_annotations(page_index).into_iter().rev().find(|a| a.contains(point))
    }

    /// Move an annotation above everything else on its page
    pub fn bring_to_front(&mut self, id: AnnotationId) -> StoreResult<()> {
        let annotation = self.get(id).ok_or(StoreError::NotFound(id))?;
        let current = annotation.z_index();
        match self.page_max_z(annotation.page_index(), Some(id)) {
            Some(max) if max >= current => {
                self.update(id, |a| a.set_z_index(max + 1))
            }
            _ => Ok(()),
        }
    }

    /// Move an annotation below everything else on its page
    pub fn send_to_back(&mut self, id: AnnotationId) -> StoreResult<()> {
        let annotation = self.get(id).ok_or(StoreError::NotFound(id))?;
        let current = annotation.z_index();
        match self.page_min_z(annotation.page_index(), Some(id)) {
            Some(min) if min <= current => {
                self.update(id, |a| a.set_z_index(min - 1))
            }
            _ => Ok(()),
        }
    }

    pub fn selected_id(&self) -> Option<AnnotationId> {
        self.selected
    }

    pub fn selected(&self) -> Option<&Annotation> {
        self.selected.and_then(|id| self.get(id))
    }

    /// Select one annotation, deselecting the previous one
    ///
    /// Both flags flip before the single notification is sent.
    pub fn select(&mut self, id: Option<AnnotationId>) -> StoreResult<()> {
        if let Some(id) = id {
            if !self.index.contains_key(&id) {
                return Err(StoreError::NotFound(id));
            }
        }
        let previous = self.selected;
        if previous == id {
            return Ok(());
        }
        if let Some(prev) = previous {
            if let Ok(annotation) = self.get_mut(prev) {
                annotation.set_selected(false);
            }
        }
        if let Some(next) = id {
            self.get_mut(next)?.set_selected(true);
        }
        self.selected = id;
        self.notify(StoreEvent::SelectionChanged { previous, current: id });
        Ok(())
    }

    pub fn deselect(&mut self) {
        // Clearing a selection cannot fail
        let _ = self.select(None);
    }

    /// Clone an annotation with a fresh identity, offset in page space
    pub fn duplicate(&mut self, id: AnnotationId, dx: f32, dy: f32) -> StoreResult<AnnotationId> {
        let source = self.get(id).ok_or(StoreError::NotFound(id))?;
        let mut copy = source.copy();
        copy.set_frame(copy.frame().translated(dx, dy));
        Ok(self.add(copy))
    }

    /// Paste a clipboard annotation as a new annotation on `page_index`
    pub fn paste(&mut self, clip: &Annotation, page_index: u32) -> AnnotationId {
        let mut copy = clip.copy();
        copy.set_page_index(page_index);
        self.add(copy)
    }

    /// Remove every annotation as one undoable step
    pub fn clear_all(&mut self) {
        if self.annotations.is_empty() {
            return;
        }
        let mut removed = Vec::with_capacity(self.annotations.len());
        while let Some(id) = self.annotations.last().map(|a| a.id()) {
            if let Some((annotation, index)) = self.detach(id) {
                removed.push(Action::Remove { annotation, index });
            }
        }
        self.page_cache.borrow_mut().clear();
        self.notify(StoreEvent::Cleared);
        self.record(Action::Batch(removed));
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &ActionLog {
        &self.history
    }

    /// Undo the most recent action; returns false when there was nothing to undo
    pub fn undo(&mut self) -> bool {
        let Some(action) = self.history.take_undo() else {
            return false;
        };
        tracing::debug!(kind = action.kind(), "undo");
        let redo = self.revert(action);
        self.history.push_redo(redo);
        self.notify_history();
        true
    }

    /// Re-apply the most recently undone action
    pub fn redo(&mut self) -> bool {
        let Some(action) = self.history.take_redo() else {
            return false;
        };
        tracing::debug!(kind = action.kind(), "redo");
        let undo = self.replay(action);
        self.history.push_undo(undo);
        self.notify_history();
        true
    }

    fn apply_snapshot(&mut self, id: AnnotationId, snapshot: &Snapshot) {
        if let Err(err) = self.update(id, |a| a.restore(snapshot)) {
            tracing::warn!(%err, "history refers to a missing annotation");
        }
    }

    /// Apply the inverse of `action`, returning the action to push for redo
    fn revert(&mut self, action: Action) -> Action {
        match action {
            Action::Add(annotation) => match self.detach(annotation.id()) {
                Some((live, _)) => Action::Add(live),
                None => Action::Add(annotation),
            },
            Action::Remove { annotation, index } => {
                self.attach(annotation.clone(), index);
                Action::Remove { annotation, index }
            }
            Action::Modify { id, before, after } => {
                self.apply_snapshot(id, &before);
                Action::Modify { id, before, after }
            }
            Action::Batch(actions) => {
                let mut reverted: Vec<Action> =
                    actions.into_iter().rev().map(|a| self.revert(a)).collect();
                reverted.reverse();
                Action::Batch(reverted)
            }
        }
    }

    /// Apply `action` forward, returning the action to push for undo
    fn replay(&mut self, action: Action) -> Action {
        match action {
            Action::Add(annotation) => {
                self.attach(annotation.clone(), self.annotations.len());
                Action::Add(annotation)
            }
            Action::Remove { annotation, index } => match self.detach(annotation.id()) {
                Some((live, position)) => Action::Remove { annotation: live, index: position },
                None => Action::Remove { annotation, index },
            },
            Action::Modify { id, before, after } => {
                self.apply_snapshot(id, &after);
                Action::Modify { id, before, after }
            }
            Action::Batch(actions) => {
                Action::Batch(actions.into_iter().map(|a| self.replay(a)).collect())
            }
        }
    }
}
