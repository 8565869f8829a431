//! Per-line tokenization state

use crate::decode::Token;
use parking_lot::RwLock;
use std::sync::Arc;

/// Supplies the document text the model tokenizes.
///
/// Implemented by the host editor; the model never stores line text itself.
/// `line_text` returns `None` when the line no longer exists, which the
/// worker treats as a stop condition.
pub trait LineSource: Send + Sync + 'static {
    fn line_count(&self) -> usize;
    fn line_text(&self, line_index: usize) -> Option<String>;
}

/// Tokenization state of one document line.
///
/// Invariant: `start_state` of line N+1 equals the end state produced by
/// tokenizing line N, or line N+1 is due for re-tokenization.
#[derive(Debug, Clone)]
pub(crate) struct LineState<S> {
    /// Last fully decoded tokens, `None` until first tokenized. Replaced
    /// wholesale so concurrent readers only ever see complete snapshots.
    pub tokens: Option<Arc<[Token]>>,
    pub start_state: Option<S>,
    pub invalid: bool,
}

impl<S> Default for LineState<S> {
    fn default() -> Self {
        Self {
            tokens: None,
            start_state: None,
            invalid: false,
        }
    }
}

/// The per-line state table.
///
/// Tokens and states are written by the background worker (single writer);
/// edit notifications adjust the table's structure and invalid flags from
/// the host side. All accesses are short read/write-locked sections.
#[derive(Debug)]
pub(crate) struct Lines<S> {
    inner: RwLock<Vec<LineState<S>>>,
}

impl<S: Clone + PartialEq> Lines<S> {
    pub fn new(line_count: usize) -> Self {
        let mut states = Vec::with_capacity(line_count);
        states.resize_with(line_count, LineState::default);
        Self {
            inner: RwLock::new(states),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn exists(&self, line_index: usize) -> bool {
        line_index < self.len()
    }

    pub fn tokens(&self, line_index: usize) -> Option<Arc<[Token]>> {
        self.inner.read().get(line_index)?.tokens.clone()
    }

    pub fn start_state(&self, line_index: usize) -> Option<S> {
        self.inner.read().get(line_index)?.start_state.clone()
    }

    pub fn is_invalid(&self, line_index: usize) -> bool {
        self.inner
            .read()
            .get(line_index)
            .is_some_and(|line| line.invalid)
    }

    /// Mark a line invalid; returns false when the line does not exist.
    pub fn mark_invalid(&self, line_index: usize) -> bool {
        match self.inner.write().get_mut(line_index) {
            Some(line) => {
                line.invalid = true;
                true
            }
            None => false,
        }
    }

    /// Install fresh tokens and clear the invalid flag.
    pub fn set_tokens(&self, line_index: usize, tokens: Arc<[Token]>) {
        if let Some(line) = self.inner.write().get_mut(line_index) {
            line.tokens = Some(tokens);
            line.invalid = false;
        }
    }

    pub fn set_start_state(&self, line_index: usize, state: S) {
        if let Some(line) = self.inner.write().get_mut(line_index) {
            line.start_state = Some(state);
        }
    }

    /// Whether the stored start state already equals `state`.
    pub fn start_state_equals(&self, line_index: usize, state: &S) -> bool {
        self.inner
            .read()
            .get(line_index)
            .is_some_and(|line| line.start_state.as_ref() == Some(state))
    }

    /// Insert `count` fresh (invalid) lines before `at`.
    pub fn insert(&self, at: usize, count: usize) {
        let mut inner = self.inner.write();
        let at = at.min(inner.len());
        inner.splice(
            at..at,
            std::iter::repeat_with(|| LineState {
                invalid: true,
                ..LineState::default()
            })
            .take(count),
        );
    }

    /// Remove up to `count` lines starting at `at`.
    pub fn remove(&self, at: usize, count: usize) {
        let mut inner = self.inner.write();
        if at >= inner.len() {
            return;
        }
        let end = (at + count).min(inner.len());
        inner.drain(at..end);
    }

    /// Drop all line state. Terminal; used on dispose.
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}
