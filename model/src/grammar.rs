//! The grammar capability consumed by the tokenization pipeline

use anyhow::Result;
use std::time::Duration;

/// A raw token as reported by the grammar for one line.
///
/// `scopes` is the full scope stack active at the token, outermost first;
/// index 0 is the grammar's own root scope. The core never interprets scope
/// syntax beyond dot-delimited hierarchical names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToken {
    pub start: usize,
    pub end: usize,
    pub scopes: Vec<String>,
}

/// The grammar's result for one line.
#[derive(Debug, Clone)]
pub struct RawLineTokens<S> {
    pub tokens: Vec<RawToken>,
    pub end_state: S,
    /// True when the time budget expired before the line was fully
    /// tokenized; `tokens` then covers only a prefix of the line.
    pub stopped_early: bool,
}

/// A line tokenizer driven by an opaque per-line state chain.
///
/// Implementations are external collaborators (e.g. a TextMate grammar
/// engine); the model only requires that tokenizing line N with its start
/// state yields the start state for line N+1.
pub trait Grammar: Send + Sync + 'static {
    /// Opaque state carried between consecutive lines.
    type State: Clone + PartialEq + Send + Sync + 'static;

    /// The state to seed the first line with.
    fn initial_state(&self) -> Self::State;

    /// Tokenize one line of text, giving up after roughly `time_limit`.
    fn tokenize_line(
        &self,
        line: &str,
        state: Self::State,
        time_limit: Duration,
    ) -> Result<RawLineTokens<Self::State>>;
}
