//! Budgeted per-line tokenization with run coalescing

use crate::decode::{Token, TokenDecoder, TtlCache};
use crate::grammar::Grammar;
use anyhow::Result;
use smol_str::SmolStr;
use std::sync::Arc;
use std::time::Duration;

/// The decoded result of tokenizing one line.
#[derive(Debug, Clone)]
pub struct TokenizedLine<S> {
    pub tokens: Vec<Token>,
    /// Offset just past the last raw token, clamped to the line length.
    pub actual_stop_offset: usize,
    pub end_state: S,
    pub stopped_early: bool,
}

/// Wraps the external grammar: invokes it with a time budget, compacts raw
/// scope stacks through a [`TokenDecoder`], and coalesces adjacent tokens
/// that decode to the same kind.
///
/// Holds the per-tokenizer decode tables plus a TTL-bounded memo of
/// scope-stack → kind, since identical stacks recur heavily within one
/// tokenization pass.
pub struct LineTokenizer<G: Grammar> {
    grammar: Arc<G>,
    decoder: TokenDecoder,
    kind_cache: TtlCache<Vec<String>, SmolStr>,
}

impl<G: Grammar> LineTokenizer<G> {
    pub fn new(grammar: Arc<G>, cache_capacity: usize, cache_ttl: Duration) -> Self {
        Self {
            grammar,
            decoder: TokenDecoder::new(),
            kind_cache: TtlCache::new(cache_capacity, cache_ttl),
        }
    }

    pub fn initial_state(&self) -> G::State {
        self.grammar.initial_state()
    }

    /// Tokenize `line` starting from `state`.
    ///
    /// `offset_delta` is added to every produced token offset. When the
    /// grammar reports `stopped_early` the result still covers a consistent
    /// prefix; the caller decides how to represent the remainder.
    pub fn tokenize_line(
        &mut self,
        line: &str,
        state: G::State,
        offset_delta: usize,
        time_limit: Duration,
    ) -> Result<TokenizedLine<G::State>> {
        let raw = self.grammar.tokenize_line(line, state, time_limit)?;

        let mut tokens = Vec::with_capacity(raw.tokens.len().min(10));
        let mut last_kind: Option<SmolStr> = None;
        for raw_token in &raw.tokens {
            let cached = self.kind_cache.get(&raw_token.scopes).cloned();
            let kind = match cached {
                Some(kind) => kind,
                None => {
                    let kind = self.decoder.decode(&raw_token.scopes);
                    self.kind_cache.insert(raw_token.scopes.clone(), kind.clone());
                    kind
                }
            };

            // Skip a new token when the kind repeats; this collapses no-op
            // runs and keeps ligatures intact.
            if last_kind.as_ref() != Some(&kind) {
                tokens.push(Token::new(raw_token.start + offset_delta, kind.clone()));
                last_kind = Some(kind);
            }
        }

        // Grammars can over-report the last end index; clamp to the line.
        let actual_stop_offset = match raw.tokens.last() {
            Some(last) => offset_delta + last.end.min(line.len()),
            None => {
                tokens.push(Token::new(offset_delta, SmolStr::default()));
                offset_delta + line.len()
            }
        };

        Ok(TokenizedLine {
            tokens,
            actual_stop_offset,
            end_state: raw.end_state,
            stopped_early: raw.stopped_early,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{RawLineTokens, RawToken};

    /// Splits a line into word/space runs; words get a `word.test` scope.
    struct WordGrammar;

    impl Grammar for WordGrammar {
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
            let mut tokens = Vec::new();
            let mut start = 0;
            for (index, ch) in line.char_indices() {
                let boundary = line[start..index]
                    .chars()
                    .next()
                    .map(|prev| prev.is_whitespace() != ch.is_whitespace());
                if boundary == Some(true) {
                    tokens.push(raw_token(&line[start..index], start, index));
                    start = index;
                }
            }
            if start < line.len() || line.is_empty() {
                tokens.push(raw_token(&line[start..], start, line.len()));
            }
            Ok(RawLineTokens {
                tokens,
                end_state: state + 1,
                stopped_early: false,
            })
        }
    }

    fn raw_token(text: &str, start: usize, end: usize) -> RawToken {
        let scopes = if text.chars().all(char::is_whitespace) {
            vec!["source.test".to_owned()]
        } else {
            vec!["source.test".to_owned(), "word.test".to_owned()]
        };
        RawToken { start, end, scopes }
    }

    fn tokenizer() -> LineTokenizer<WordGrammar> {
        LineTokenizer::new(Arc::new(WordGrammar), 64, Duration::from_secs(5))
    }

    #[test]
    fn test_tokenize_alternating_runs() {
        let mut tokenizer = tokenizer();
        let result = tokenizer
            .tokenize_line("one two", 0, 0, Duration::from_secs(1))
            .expect("tokenize");

        let kinds: Vec<_> = result
            .tokens
            .iter()
            .map(|t| (t.start, t.kind.as_str()))
            .collect();
        assert_eq!(kinds, vec![(0, "word.test"), (3, ""), (4, "word.test")]);
        assert_eq!(result.actual_stop_offset, 7);
        assert_eq!(result.end_state, 1);
        assert!(!result.stopped_early);
    }

    #[test]
    fn test_adjacent_same_kind_tokens_coalesce() {
        struct TwoTokenGrammar;
        impl Grammar for TwoTokenGrammar {
            type State = ();
            fn initial_state(&self) {}
            fn tokenize_line(
                &self,
                _line: &str,
                _state: (),
                _time_limit: Duration,
            ) -> Result<RawLineTokens<()>> {
                let scopes = vec!["source.test".to_owned(), "word.test".to_owned()];
                Ok(RawLineTokens {
                    tokens: vec![
                        RawToken {
                            start: 0,
                            end: 3,
                            scopes: scopes.clone(),
                        },
                        RawToken {
                            start: 3,
                            end: 6,
                            scopes,
                        },
                    ],
                    end_state: (),
                    stopped_early: false,
                })
            }
        }

        let mut tokenizer = LineTokenizer::new(Arc::new(TwoTokenGrammar), 64, Duration::from_secs(5));
        let result = tokenizer
            .tokenize_line("abcdef", (), 0, Duration::from_secs(1))
            .expect("tokenize");
        assert_eq!(result.tokens.len(), 1);
        assert_eq!(result.tokens[0], Token::new(0, "word.test"));
    }

    #[test]
    fn test_offset_delta_shifts_token_starts() {
        let mut tokenizer = tokenizer();
        let result = tokenizer
            .tokenize_line("ab", 0, 100, Duration::from_secs(1))
            .expect("tokenize");
        assert_eq!(result.tokens[0].start, 100);
        assert_eq!(result.actual_stop_offset, 102);
    }

    #[test]
    fn test_overlong_end_index_is_clamped() {
        struct OverreportingGrammar;
        impl Grammar for OverreportingGrammar {
            type State = ();
            fn initial_state(&self) {}
            fn tokenize_line(
                &self,
                line: &str,
                _state: (),
                _time_limit: Duration,
            ) -> Result<RawLineTokens<()>> {
                Ok(RawLineTokens {
                    tokens: vec![RawToken {
                        start: 0,
                        end: line.len() + 10,
                        scopes: vec!["source.test".to_owned()],
                    }],
                    end_state: (),
                    stopped_early: false,
                })
            }
        }

        let mut tokenizer =
            LineTokenizer::new(Arc::new(OverreportingGrammar), 64, Duration::from_secs(5));
        let result = tokenizer
            .tokenize_line("abc", (), 0, Duration::from_secs(1))
            .expect("tokenize");
        assert_eq!(result.actual_stop_offset, 3);
    }

    #[test]
    fn test_empty_raw_result_yields_single_untyped_token() {
        struct EmptyGrammar;
        impl Grammar for EmptyGrammar {
            type State = ();
            fn initial_state(&self) {}
            fn tokenize_line(
                &self,
                _line: &str,
                _state: (),
                _time_limit: Duration,
            ) -> Result<RawLineTokens<()>> {
                Ok(RawLineTokens {
                    tokens: Vec::new(),
                    end_state: (),
                    stopped_early: false,
                })
            }
        }

        let mut tokenizer = LineTokenizer::new(Arc::new(EmptyGrammar), 64, Duration::from_secs(5));
        let result = tokenizer
            .tokenize_line("abc", (), 0, Duration::from_secs(1))
            .expect("tokenize");
        assert_eq!(result.tokens, vec![Token::new(0, "")]);
        assert_eq!(result.actual_stop_offset, 3);
    }

    #[test]
    fn test_kind_cache_is_consistent_across_lines() {
        let mut tokenizer = tokenizer();
        let first = tokenizer
            .tokenize_line("alpha", 0, 0, Duration::from_secs(1))
            .expect("tokenize");
        let second = tokenizer
            .tokenize_line("beta", 1, 0, Duration::from_secs(1))
            .expect("tokenize");
        assert_eq!(first.tokens[0].kind, second.tokens[0].kind);
    }
}
