//! Theme parsing, resolution and scope-stack matching

use crate::color_map::{ColorMap, ColorMapError};
use crate::raw::{is_valid_hex_color, RawTheme, ScopeSelector};
use crate::scope::ScopeStack;
use crate::style::{ColorId, FontStyle, StyleAttributes};
use crate::trie::{ThemeTrieNode, TrieRule};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::sync::Arc;

/// A single theme rule after selector expansion, before trie insertion.
///
/// `index` is the rule's position in the original settings list and breaks
/// ordering ties so that later settings override earlier ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedThemeRule {
    pub scope: SmolStr,
    pub parent_scopes: Option<Arc<[SmolStr]>>,
    pub index: usize,
    pub font_style: Option<FontStyle>,
    pub foreground: Option<String>,
    pub background: Option<String>,
}

/// Expand a raw settings list into parsed rules.
///
/// Each selector is trimmed of leading/trailing commas and split on commas;
/// every resulting selector is then split on whitespace, the last token
/// becoming the target scope and the preceding tokens (reversed, so index 0
/// is the nearest ancestor) its parent scope patterns.
pub fn parse_theme(raw: &RawTheme) -> Vec<ParsedThemeRule> {
    let mut result = Vec::new();
    let mut index = 0usize;

    for entry in &raw.settings {
        let Some(style) = &entry.settings else {
            continue;
        };
        let entry_index = index;
        index += 1;

        let selectors: SmallVec<[String; 4]> = match &entry.scope {
            Some(ScopeSelector::Single(selector)) => {
                let trimmed = selector
                    .trim_start_matches(',')
                    .trim_end_matches(',');
                trimmed.split(',').map(str::to_owned).collect()
            }
            Some(ScopeSelector::Many(selectors)) => selectors.iter().cloned().collect(),
            None => SmallVec::from_iter([String::new()]),
        };

        let font_style = style.font_style.as_deref().map(|value| {
            let mut flags = FontStyle::empty();
            for segment in value.split_whitespace() {
                match segment {
                    "italic" => flags |= FontStyle::ITALIC,
                    "bold" => flags |= FontStyle::BOLD,
                    "underline" => flags |= FontStyle::UNDERLINE,
                    "strikethrough" => flags |= FontStyle::STRIKETHROUGH,
                    _ => {}
                }
            }
            flags
        });

        let foreground = style
            .foreground
            .as_deref()
            .filter(|color| is_valid_hex_color(color))
            .map(str::to_owned);
        let background = style
            .background
            .as_deref()
            .filter(|color| is_valid_hex_color(color))
            .map(str::to_owned);

        for selector in &selectors {
            let mut segments: SmallVec<[&str; 4]> = selector.split_whitespace().collect();
            let scope = SmolStr::new(segments.pop().unwrap_or(""));

            let parent_scopes = if segments.is_empty() {
                None
            } else {
                segments.reverse();
                Some(segments.iter().map(|s| SmolStr::new(s)).collect())
            };

            result.push(ParsedThemeRule {
                scope,
                parent_scopes,
                index: entry_index,
                font_style,
                foreground: foreground.clone(),
                background: background.clone(),
            });
        }
    }

    result
}

/// Ordering for parent scope pattern lists: absent before present, fewer
/// entries before more, then element-wise lexicographic.
fn str_arr_cmp(a: Option<&[SmolStr]>, b: Option<&[SmolStr]>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match a.len().cmp(&b.len()) {
            Ordering::Equal => a.cmp(b),
            ord => ord,
        },
    }
}

/// A resolved theme: the rule trie, the color map and the context defaults.
///
/// Matching results for a given top-level scope name are memoized for the
/// theme's lifetime; themes are immutable once resolved and safe to share
/// across models.
#[derive(Debug)]
pub struct Theme {
    color_map: ColorMap,
    defaults: StyleAttributes,
    root: ThemeTrieNode,
    match_cache: RwLock<FxHashMap<SmolStr, Arc<[TrieRule]>>>,
}

impl Theme {
    /// Parse and resolve a raw theme in one step.
    ///
    /// When `fixed_color_map` is supplied the color map is frozen and any
    /// color missing from it fails resolution.
    pub fn from_raw(
        raw: &RawTheme,
        fixed_color_map: Option<&[String]>,
    ) -> Result<Self, ColorMapError> {
        Self::resolve(parse_theme(raw), fixed_color_map)
    }

    /// Resolve parsed rules into a matchable theme.
    pub fn resolve(
        mut rules: Vec<ParsedThemeRule>,
        fixed_color_map: Option<&[String]>,
    ) -> Result<Self, ColorMapError> {
        // Stable sort by scope, then parent scopes, then settings order.
        rules.sort_by(|a, b| {
            a.scope
                .cmp(&b.scope)
                .then_with(|| str_arr_cmp(a.parent_scopes.as_deref(), b.parent_scopes.as_deref()))
                .then_with(|| a.index.cmp(&b.index))
        });

        // Leading empty-scope rules merge into the defaults, later rules
        // overriding earlier ones field by field.
        let mut default_font_style = FontStyle::empty();
        let mut default_foreground = "#000000".to_owned();
        let mut default_background = "#ffffff".to_owned();
        let mut remaining = rules.into_iter().peekable();
        while remaining.peek().is_some_and(|rule| rule.scope.is_empty()) {
            let incoming = remaining.next().expect("peeked rule");
            if let Some(font_style) = incoming.font_style {
                default_font_style = font_style;
            }
            if let Some(foreground) = incoming.foreground {
                default_foreground = foreground;
            }
            if let Some(background) = incoming.background {
                default_background = background;
            }
        }

        let mut color_map = match fixed_color_map {
            Some(colors) => ColorMap::frozen(colors),
            None => ColorMap::new(),
        };
        let defaults = StyleAttributes::new(
            Some(default_font_style),
            color_map.get_id(Some(&default_foreground))?,
            color_map.get_id(Some(&default_background))?,
        );

        let mut root = ThemeTrieNode::new(TrieRule::unset(), Vec::new());
        for rule in remaining {
            let foreground = color_map.get_id(rule.foreground.as_deref())?;
            let background = color_map.get_id(rule.background.as_deref())?;
            root.insert(
                0,
                &rule.scope,
                rule.parent_scopes,
                rule.font_style,
                foreground,
                background,
            );
        }

        Ok(Self {
            color_map,
            defaults,
            root,
            match_cache: RwLock::new(FxHashMap::default()),
        })
    }

    /// The context default style.
    pub fn defaults(&self) -> StyleAttributes {
        self.defaults
    }

    /// The ordered color table (index 0 reserved), suitable for feeding back
    /// as a fixed color map.
    pub fn color_map(&self) -> &[String] {
        self.color_map.colors()
    }

    /// Resolve a color id back to its color string.
    pub fn lookup_color(&self, id: ColorId) -> Option<&str> {
        self.color_map.lookup(id)
    }

    /// Resolve a scope stack to style attributes.
    ///
    /// `None` yields the theme defaults. A `Some` result carries the first
    /// specificity-ranked candidate whose parent scope patterns are satisfied
    /// by the stack's ancestor chain; `None` is returned when no candidate
    /// matches and the caller should fall back to [`Theme::defaults`].
    pub fn match_scope_path(&self, scope_path: Option<&ScopeStack>) -> Option<StyleAttributes> {
        let Some(scope_path) = scope_path else {
            return Some(self.defaults);
        };

        let scope_name = scope_path.scope_name();
        let candidates = self.cached_candidates(scope_name);

        let ancestors = scope_path.parent().map(|parent| &**parent);
        let effective = candidates
            .iter()
            .find(|rule| Self::matches_parent_scopes(ancestors, rule.parent_scopes.as_deref()))?;

        Some(StyleAttributes::new(
            effective.font_style,
            effective.foreground,
            effective.background,
        ))
    }

    fn cached_candidates(&self, scope_name: &str) -> Arc<[TrieRule]> {
        if let Some(found) = self.match_cache.read().get(scope_name) {
            return found.clone();
        }
        // Computing inside the write lock keeps it to one computation per key.
        self.match_cache
            .write()
            .entry(SmolStr::new(scope_name))
            .or_insert_with(|| self.root.match_scope(scope_name).into())
            .clone()
    }

    /// Walk the parent patterns (nearest required ancestor first) against the
    /// ancestor chain. A `">"` entry requires the following pattern to match
    /// the immediately next ancestor.
    fn matches_parent_scopes(
        scope_path: Option<&ScopeStack>,
        parent_patterns: Option<&[SmolStr]>,
    ) -> bool {
        let patterns = parent_patterns.unwrap_or(&[]);
        if patterns.is_empty() {
            return true;
        }

        let mut scope_path = scope_path;
        let mut index = 0;
        while index < patterns.len() {
            let mut pattern = patterns[index].as_str();
            let mut must_match_next = false;

            if pattern == ">" {
                if index == patterns.len() - 1 {
                    // Trailing child combinator is an invalid selector.
                    return false;
                }
                index += 1;
                pattern = patterns[index].as_str();
                must_match_next = true;
            }

            loop {
                let Some(node) = scope_path else {
                    // Ancestor chain ran out before all patterns matched.
                    return false;
                };
                if Self::matches_scope(node.scope_name(), pattern) {
                    break;
                }
                if must_match_next {
                    return false;
                }
                scope_path = node.parent().map(|parent| &**parent);
            }

            scope_path = scope_path
                .and_then(ScopeStack::parent)
                .map(|parent| &**parent);
            index += 1;
        }

        true
    }

    /// A pattern matches a scope name when they are equal or the scope name
    /// extends the pattern with a `.` segment boundary.
    fn matches_scope(scope_name: &str, pattern: &str) -> bool {
        scope_name == pattern
            || (scope_name.starts_with(pattern)
                && scope_name.as_bytes().get(pattern.len()) == Some(&b'.'))
    }
}

impl PartialEq for Theme {
    fn eq(&self, other: &Self) -> bool {
        // The match cache is derived data and excluded from equality.
        self.color_map == other.color_map
            && self.defaults == other.defaults
            && self.root == other.root
    }
}

impl Eq for Theme {}
