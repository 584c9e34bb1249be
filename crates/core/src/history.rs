//! Undo/redo action log
//!
//! Records reversible edits as [`Action`] values. The log only stores and
//! orders actions; applying them against the annotation list is the store's
//! job, so the two can never disagree about what an action means.

use crate::annotation::{Annotation, AnnotationId, Snapshot};
use std::collections::VecDeque;

/// Default number of undoable actions retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// A reversible edit
#[derive(Debug, Clone)]
pub enum Action {
    /// An annotation was added
    Add(Annotation),

    /// An annotation was removed from `index` in the store's list
    Remove { annotation: Annotation, index: usize },

    /// An annotation's frame, rotation or properties changed in place
    Modify { id: AnnotationId, before: Snapshot, after: Snapshot },

    /// Several actions undone and redone as one step
    Batch(Vec<Action>),
}

impl Action {
    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Add(_) => "add",
            Action::Remove { .. } => "remove",
            Action::Modify { .. } => "modify",
            Action::Batch(_) => "batch",
        }
    }
}

/// Bounded undo stack plus a redo stack
///
/// Pushing a new action clears the redo stack. When the undo stack exceeds
/// its capacity the oldest entry is dropped.
#[derive(Debug)]
pub struct ActionLog {
    undo: VecDeque<Action>,
    redo: Vec<Action>,
    capacity: usize,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ActionLog {
    /// Create a log holding at most `capacity` undoable actions
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { undo: VecDeque::with_capacity(capacity), redo: Vec::new(), capacity }
    }

    /// Record a new user action
    pub fn record(&mut self, action: Action) {
        self.redo.clear();
        self.push_undo(action);
    }

    /// Push onto the undo stack without touching redo (used by redo)
    pub(crate) fn push_undo(&mut self, action: Action) {
        if self.undo.len() == self.capacity {
            if let Some(dropped) = self.undo.pop_front() {
                tracing::trace!(kind = dropped.kind(), "history full, dropping oldest action");
            }
        }
        self.undo.push_back(action);
    }

    pub(crate) fn push_redo(&mut self, action: Action) {
        self.redo.push(action);
    }

    pub(crate) fn take_undo(&mut self) -> Option<Action> {
        self.undo.pop_back()
    }

    pub(crate) fn take_redo(&mut self) -> Option<Action> {
        self.redo.pop()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget all history
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
