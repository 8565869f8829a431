//! The incremental token model and its background worker

use crate::decode::Token;
use crate::event::{push_changed_line, LineRange, TokensChangedEvent};
use crate::grammar::Grammar;
use crate::lines::{LineSource, Lines};
use crate::queue::DirtyQueue;
use crate::tokenizer::LineTokenizer;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Budgets and cache sizing for a token model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Hard time limit handed to the grammar for a single line.
    pub time_per_line: Duration,
    /// Wall-clock budget for one cascading revalidation pass; when exceeded
    /// the next line is re-enqueued instead of processed inline.
    pub max_batch_time: Duration,
    /// Capacity of the scope-stack → kind memo.
    pub decode_cache_capacity: usize,
    /// Idle expiry of the scope-stack → kind memo.
    pub decode_cache_ttl: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            time_per_line: Duration::from_secs(1),
            max_batch_time: Duration::from_millis(200),
            decode_cache_capacity: 1024,
            decode_cache_ttl: Duration::from_secs(5),
        }
    }
}

/// Whether the background worker still has lines to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundState {
    InProgress,
    Completed,
}

pub type ListenerId = u64;

type ListenerFn = Arc<dyn Fn(&TokensChangedEvent) + Send + Sync>;

/// State guarded by the single "should a worker be running" lock.
struct Control<G: Grammar> {
    listeners: Vec<(ListenerId, ListenerFn)>,
    next_listener_id: ListenerId,
    grammar: Option<Arc<G>>,
    worker_running: bool,
    disposed: bool,
}

struct Shared<G: Grammar> {
    config: ModelConfig,
    source: Arc<dyn LineSource>,
    lines: Lines<G::State>,
    queue: DirtyQueue,
    is_working: AtomicBool,
    /// Identifies the currently sanctioned worker; bumping it makes running
    /// workers exit cooperatively at their next loop boundary.
    active_epoch: AtomicU64,
    control: Mutex<Control<G>>,
}

/// Keeps a per-line token cache consistent with document edits.
///
/// Edits mark lines invalid and enqueue them; a single background worker
/// re-tokenizes invalid lines, propagates state changes to following lines,
/// and notifies listeners with coalesced changed-line ranges. The worker
/// runs while a grammar is installed and at least one listener is
/// registered; it is detached and never blocks process shutdown.
pub struct TokenModel<G: Grammar> {
    shared: Arc<Shared<G>>,
}

impl<G: Grammar> TokenModel<G> {
    pub fn new(source: Arc<dyn LineSource>) -> Self {
        Self::with_config(source, ModelConfig::default())
    }

    pub fn with_config(source: Arc<dyn LineSource>, config: ModelConfig) -> Self {
        let line_count = source.line_count();
        let model = Self {
            shared: Arc::new(Shared {
                config,
                source,
                lines: Lines::new(line_count),
                queue: DirtyQueue::new(),
                is_working: AtomicBool::new(false),
                active_epoch: AtomicU64::new(0),
                control: Mutex::new(Control {
                    listeners: Vec::new(),
                    next_listener_id: 0,
                    grammar: None,
                    worker_running: false,
                    disposed: false,
                }),
            }),
        };
        model.invalidate_line(0);
        model
    }

    /// Install the grammar, seed line 0's start state synchronously and
    /// (re)start the worker.
    pub fn set_grammar(&self, grammar: Arc<G>) {
        let mut control = self.shared.control.lock();
        if control.disposed {
            return;
        }
        if control
            .grammar
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &grammar))
        {
            return;
        }

        control.grammar = Some(grammar.clone());
        self.shared.lines.set_start_state(0, grammar.initial_state());
        self.shared.invalidate_line(0);

        // A running worker still holds the previous grammar's tokenizer.
        Self::stop_worker_locked(&self.shared, &mut control);
        self.start_worker_locked(&mut control);
    }

    pub fn grammar(&self) -> Option<Arc<G>> {
        self.shared.control.lock().grammar.clone()
    }

    /// Register a changed-tokens listener; the first listener starts the
    /// worker.
    pub fn add_listener(
        &self,
        listener: impl Fn(&TokensChangedEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let mut control = self.shared.control.lock();
        let id = control.next_listener_id;
        control.next_listener_id += 1;
        control.listeners.push((id, Arc::new(listener)));
        self.start_worker_locked(&mut control);
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        let mut control = self.shared.control.lock();
        control.listeners.retain(|(listener_id, _)| *listener_id != id);
        if control.listeners.is_empty() {
            // No need to keep tokenizing if no one cares.
            Self::stop_worker_locked(&self.shared, &mut control);
        }
    }

    pub fn background_state(&self) -> BackgroundState {
        if self.shared.is_working.load(Ordering::SeqCst) {
            BackgroundState::InProgress
        } else {
            BackgroundState::Completed
        }
    }

    /// The decoded tokens of a line; `None` if the line does not exist or
    /// has not been tokenized yet.
    pub fn get_line_tokens(&self, line_index: usize) -> Option<Arc<[Token]>> {
        self.shared.lines.tokens(line_index)
    }

    pub fn line_count(&self) -> usize {
        self.shared.lines.len()
    }

    /// Mark a line out-of-date, scheduling async re-tokenization.
    pub fn invalidate_line(&self, line_index: usize) {
        self.shared.invalidate_line(line_index);
    }

    /// Host notification: a line's text changed in place.
    pub fn on_line_changed(&self, line_index: usize) {
        self.shared.invalidate_line(line_index);
    }

    /// Host notification: `count` lines were inserted before `at`.
    ///
    /// Revalidation restarts at the preceding line so its end state flows
    /// into the inserted block.
    pub fn on_lines_inserted(&self, at: usize, count: usize) {
        if count == 0 {
            return;
        }
        self.shared.lines.insert(at, count);
        if at == 0 {
            // The inserted lines are already marked invalid.
            self.shared.queue.push(0);
        } else {
            self.shared.invalidate_line(at - 1);
        }
    }

    /// Host notification: `count` lines were removed starting at `at`.
    ///
    /// The line that moved up inherits a stale start state; revalidating
    /// from the preceding line repairs the state chain.
    pub fn on_lines_removed(&self, at: usize, count: usize) {
        if count == 0 {
            return;
        }
        self.shared.lines.remove(at, count);
        self.shared.invalidate_line(at.saturating_sub(1));
    }

    /// Stop the worker and release line storage. Terminal.
    pub fn dispose(&self) {
        let mut control = self.shared.control.lock();
        if control.disposed {
            return;
        }
        control.disposed = true;
        control.listeners.clear();
        Self::stop_worker_locked(&self.shared, &mut control);
        drop(control);
        self.shared.queue.clear();
        self.shared.lines.clear();
    }

    fn start_worker_locked(&self, control: &mut Control<G>) {
        if control.worker_running || control.disposed || control.listeners.is_empty() {
            return;
        }
        let Some(grammar) = control.grammar.clone() else {
            return;
        };

        let epoch = self.shared.active_epoch.load(Ordering::SeqCst);
        let shared = self.shared.clone();
        let spawned = std::thread::Builder::new()
            .name("weft-tokenizer".to_owned())
            .spawn(move || worker_loop(shared, grammar, epoch));
        match spawned {
            Ok(_) => control.worker_running = true,
            Err(error) => error!(%error, "failed to spawn tokenizer thread"),
        }
    }

    fn stop_worker_locked(shared: &Shared<G>, control: &mut Control<G>) {
        if control.worker_running {
            shared.active_epoch.fetch_add(1, Ordering::SeqCst);
            shared.queue.notify_all();
            control.worker_running = false;
        }
    }
}

impl<G: Grammar> Drop for TokenModel<G> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Drains the dirty queue until the model stops or replaces this worker.
fn worker_loop<G: Grammar>(shared: Arc<Shared<G>>, grammar: Arc<G>, epoch: u64) {
    let mut tokenizer = LineTokenizer::new(
        grammar,
        shared.config.decode_cache_capacity,
        shared.config.decode_cache_ttl,
    );
    let exit = {
        let shared = shared.clone();
        move || shared.active_epoch.load(Ordering::SeqCst) != epoch
    };

    loop {
        shared
            .is_working
            .store(!shared.queue.is_empty(), Ordering::SeqCst);
        let Some(line_index) = shared.queue.pop(&exit) else {
            break;
        };
        shared.is_working.store(true, Ordering::SeqCst);

        // Skip entries that went stale while queued.
        if !shared.lines.is_invalid(line_index) {
            continue;
        }
        shared.revalidate(&mut tokenizer, line_index, &exit);
    }
    shared.is_working.store(false, Ordering::SeqCst);
}

impl<G: Grammar> Shared<G> {
    fn invalidate_line(&self, line_index: usize) {
        if self.lines.mark_invalid(line_index) {
            self.queue.push(line_index);
        }
    }

    /// Re-tokenize `start_line` and cascade through following lines while
    /// their start states keep changing.
    fn revalidate(
        &self,
        tokenizer: &mut LineTokenizer<G>,
        start_line: usize,
        exit: &impl Fn() -> bool,
    ) {
        debug!(start_line, "revalidating tokens");
        let mut changed: Vec<LineRange> = Vec::new();
        let mut line_index = start_line;
        let started_at = Instant::now();

        loop {
            if exit() {
                break;
            }
            let Some(line_text) = self
                .lines
                .exists(line_index)
                .then(|| self.source.line_text(line_index))
                .flatten()
            else {
                debug!(line = line_index, "line does not exist anymore");
                break;
            };

            let start_state = match self.lines.start_state(line_index) {
                Some(state) => state,
                None => tokenizer.initial_state(),
            };

            let mut result = match tokenizer.tokenize_line(
                &line_text,
                start_state.clone(),
                0,
                self.config.time_per_line,
            ) {
                Ok(result) => result,
                Err(error) => {
                    error!(line = line_index, %error, "tokenization failed, requeueing line");
                    self.invalidate_line(line_index);
                    break;
                }
            };

            if result.stopped_early {
                // Treat the rest of the line as one untyped token, and carry
                // the line's start state forward so the partial end state
                // never propagates.
                result
                    .tokens
                    .push(Token::new(result.actual_stop_offset, SmolStr::default()));
                result.end_state = start_state;
            }
            self.lines.set_tokens(line_index, result.tokens.into());
            push_changed_line(&mut changed, line_index);

            // Check whether the next line needs re-tokenization too.
            line_index += 1;
            if !self.lines.exists(line_index) {
                break;
            }
            if !self.lines.is_invalid(line_index)
                && self.lines.start_state_equals(line_index, &result.end_state)
            {
                // Matching start state; the next line is up to date.
                break;
            }

            self.lines.set_start_state(line_index, result.end_state);
            if started_at.elapsed() >= self.config.max_batch_time {
                // Out of budget; hand the rest back to the queue.
                self.invalidate_line(line_index);
                break;
            }
        }

        if !changed.is_empty() {
            self.emit(TokensChangedEvent { ranges: changed });
        }
    }

    fn emit(&self, event: TokensChangedEvent) {
        let listeners: Vec<ListenerFn> = self
            .control
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in &listeners {
            listener(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{RawLineTokens, RawToken};
    use anyhow::Result;

    struct StaticDoc(Vec<String>);

    impl LineSource for StaticDoc {
        fn line_count(&self) -> usize {
            self.0.len()
        }

        fn line_text(&self, line_index: usize) -> Option<String> {
            self.0.get(line_index).cloned()
        }
    }

    struct UnitGrammar;

    impl Grammar for UnitGrammar {
        type State = u32;

        fn initial_state(&self) -> u32 {
            0
        }

        fn tokenize_line(
            &self,
            line: &str,
            state: u32,
            _time_limit: Duration,
        ) -> Result<RawLineTokens<u32>> {
            Ok(RawLineTokens {
                tokens: vec![RawToken {
                    start: 0,
                    end: line.len(),
                    scopes: vec!["source.unit".to_owned()],
                }],
                end_state: state,
                stopped_early: false,
            })
        }
    }

    fn doc(lines: &[&str]) -> Arc<StaticDoc> {
        Arc::new(StaticDoc(lines.iter().map(|l| l.to_string()).collect()))
    }

    #[test]
    fn test_new_model_is_completed_and_untokenized() {
        let model: TokenModel<UnitGrammar> = TokenModel::new(doc(&["a", "b"]));
        assert_eq!(model.background_state(), BackgroundState::Completed);
        assert_eq!(model.line_count(), 2);
        assert!(model.get_line_tokens(0).is_none());
        assert!(model.get_line_tokens(5).is_none());
    }

    #[test]
    fn test_listener_ids_are_distinct_and_removable() {
        let model: TokenModel<UnitGrammar> = TokenModel::new(doc(&["a"]));
        let first = model.add_listener(|_| {});
        let second = model.add_listener(|_| {});
        assert_ne!(first, second);
        model.remove_listener(first);
        model.remove_listener(second);
        model.remove_listener(second);
    }

    #[test]
    fn test_edit_notifications_adjust_line_count() {
        let model: TokenModel<UnitGrammar> = TokenModel::new(doc(&["a", "b", "c"]));
        model.on_lines_inserted(1, 2);
        assert_eq!(model.line_count(), 5);
        model.on_lines_removed(0, 4);
        assert_eq!(model.line_count(), 1);
        model.on_lines_inserted(1, 0);
        assert_eq!(model.line_count(), 1);
    }

    #[test]
    fn test_dispose_is_terminal_and_idempotent() {
        let model: TokenModel<UnitGrammar> = TokenModel::new(doc(&["a"]));
        model.set_grammar(Arc::new(UnitGrammar));
        model.dispose();
        assert_eq!(model.line_count(), 0);
        assert!(model.get_line_tokens(0).is_none());
        model.dispose();
        model.invalidate_line(0);
        assert_eq!(model.background_state(), BackgroundState::Completed);
    }

    #[test]
    fn test_set_grammar_twice_with_same_grammar_is_a_no_op() {
        let model: TokenModel<UnitGrammar> = TokenModel::new(doc(&["a"]));
        let grammar = Arc::new(UnitGrammar);
        model.set_grammar(grammar.clone());
        model.set_grammar(grammar.clone());
        assert!(model
            .grammar()
            .is_some_and(|current| Arc::ptr_eq(&current, &grammar)));
    }
}
