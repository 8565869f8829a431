//! Scope-to-style resolution for Weft
//!
//! This crate turns the scope stacks produced by a grammar into concrete
//! visual styling. Theme rules are parsed from an ordered settings list,
//! resolved into a trie keyed by dot-separated scope segments, and matched
//! against scope stacks with TextMate-compatible specificity ranking.
//!
//! The key components are:
//! - [`color_map::ColorMap`] - Interns color strings to small stable ids
//! - [`style::StyleAttributes`] - A resolved (font style, foreground, background) triple
//! - [`scope::ScopeStack`] - An immutable parent-pointing chain of scope names
//! - [`trie::ThemeTrieNode`] - Specificity-ranked rule storage
//! - [`theme::Theme`] - Parse/resolve pipeline and the scope-stack match entry point

pub mod color_map;
pub mod raw;
pub mod scope;
pub mod style;
pub mod theme;
pub mod trie;

pub use color_map::{ColorMap, ColorMapError};
pub use raw::{RawStyle, RawTheme, RawThemeSetting, ScopeSelector};
pub use scope::ScopeStack;
pub use style::{ColorId, FontStyle, StyleAttributes};
pub use theme::{parse_theme, ParsedThemeRule, Theme};
pub use trie::{ThemeTrieNode, TrieRule};
