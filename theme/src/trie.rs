//! Theme rule trie with specificity-ranked matching

use crate::style::{ColorId, FontStyle};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::sync::Arc;

/// A style rule stored in the trie.
///
/// `parent_scopes == None` marks a node's unconditional main rule; otherwise
/// the rule only applies when the ancestor chain satisfies the patterns
/// (innermost required ancestor first, `">"` entries marking strict
/// parent-child adjacency for the following pattern).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieRule {
    pub scope_depth: u32,
    pub parent_scopes: Option<Arc<[SmolStr]>>,
    pub font_style: Option<FontStyle>,
    pub foreground: ColorId,
    pub background: ColorId,
}

impl TrieRule {
    pub fn new(
        scope_depth: u32,
        parent_scopes: Option<Arc<[SmolStr]>>,
        font_style: Option<FontStyle>,
        foreground: ColorId,
        background: ColorId,
    ) -> Self {
        Self {
            scope_depth,
            parent_scopes,
            font_style,
            foreground,
            background,
        }
    }

    /// The empty rule used to seed a trie root: matches everything and
    /// inherits everything.
    pub fn unset() -> Self {
        Self::new(0, None, None, ColorId::NONE, ColorId::NONE)
    }

    fn parent_patterns(&self) -> &[SmolStr] {
        self.parent_scopes.as_deref().unwrap_or(&[])
    }

    /// Merge an incoming rule into this one, overwriting only fields the
    /// incoming rule explicitly sets.
    ///
    /// A regressing scope depth is a defined no-op; it is not expected to be
    /// reachable from the resolve pipeline's insertion order.
    fn accept_overwrite(
        &mut self,
        scope_depth: u32,
        font_style: Option<FontStyle>,
        foreground: ColorId,
        background: ColorId,
    ) {
        if self.scope_depth > scope_depth {
            tracing::debug!(
                current = self.scope_depth,
                incoming = scope_depth,
                "ignoring scope depth regression in rule merge"
            );
        } else {
            self.scope_depth = scope_depth;
        }
        if font_style.is_some() {
            self.font_style = font_style;
        }
        if !foreground.is_none() {
            self.foreground = foreground;
        }
        if !background.is_none() {
            self.background = background;
        }
    }

    /// Specificity ordering: more specific rules sort first.
    ///
    /// Ranks by scope depth, then by a depth-first comparison of parent
    /// scope pattern lengths (child combinators skipped), then by parent
    /// scope count, per TextMate's scope-selector ranking.
    pub fn cmp_by_specificity(a: &TrieRule, b: &TrieRule) -> Ordering {
        if a.scope_depth != b.scope_depth {
            return b.scope_depth.cmp(&a.scope_depth);
        }

        let a_parents = a.parent_patterns();
        let b_parents = b.parent_patterns();
        let mut a_index = 0;
        let mut b_index = 0;
        loop {
            // Child combinators don't affect specificity.
            if a_parents.get(a_index).map(SmolStr::as_str) == Some(">") {
                a_index += 1;
            }
            if b_parents.get(b_index).map(SmolStr::as_str) == Some(">") {
                b_index += 1;
            }

            // Scope-by-scope comparison stops once either rule runs out.
            let (Some(a_pattern), Some(b_pattern)) = (a_parents.get(a_index), b_parents.get(b_index))
            else {
                break;
            };

            // A longer parent scope pattern is the more specific one.
            match b_pattern.len().cmp(&a_pattern.len()) {
                Ordering::Equal => {}
                ord => return ord,
            }

            a_index += 1;
            b_index += 1;
        }

        // Tie: the rule with more parent scopes wins.
        b_parents.len().cmp(&a_parents.len())
    }
}

/// A trie node keyed by dot-separated scope path segments.
///
/// Every child is seeded with a clone of its parent's accumulated rules at
/// insertion time, so an unmatched scope tail resolves to the deepest
/// matched ancestor's style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeTrieNode {
    main_rule: TrieRule,
    rules_with_parent_scopes: Vec<TrieRule>,
    children: FxHashMap<SmolStr, ThemeTrieNode>,
}

fn split_scope(scope: &str) -> (&str, &str) {
    match scope.find('.') {
        Some(dot) => (&scope[..dot], &scope[dot + 1..]),
        None => (scope, ""),
    }
}

impl ThemeTrieNode {
    pub fn new(main_rule: TrieRule, rules_with_parent_scopes: Vec<TrieRule>) -> Self {
        Self {
            main_rule,
            rules_with_parent_scopes,
            children: FxHashMap::default(),
        }
    }

    /// Insert a rule for `scope` (relative to this node), walking or creating
    /// children one dot-separated segment at a time.
    pub fn insert(
        &mut self,
        scope_depth: u32,
        scope: &str,
        parent_scopes: Option<Arc<[SmolStr]>>,
        font_style: Option<FontStyle>,
        foreground: ColorId,
        background: ColorId,
    ) {
        if scope.is_empty() {
            self.insert_here(scope_depth, parent_scopes, font_style, foreground, background);
            return;
        }

        let (head, tail) = split_scope(scope);
        let main_rule = &self.main_rule;
        let inherited_rules = &self.rules_with_parent_scopes;
        let child = self
            .children
            .entry(SmolStr::new(head))
            .or_insert_with(|| ThemeTrieNode::new(main_rule.clone(), inherited_rules.clone()));
        child.insert(
            scope_depth + 1,
            tail,
            parent_scopes,
            font_style,
            foreground,
            background,
        );
    }

    fn insert_here(
        &mut self,
        scope_depth: u32,
        parent_scopes: Option<Arc<[SmolStr]>>,
        font_style: Option<FontStyle>,
        foreground: ColorId,
        background: ColorId,
    ) {
        let Some(parent_scopes) = parent_scopes else {
            // Merge into the main rule.
            self.main_rule
                .accept_overwrite(scope_depth, font_style, foreground, background);
            return;
        };

        // Merge into an existing rule with the same parent scope patterns.
        for rule in &mut self.rules_with_parent_scopes {
            if rule.parent_scopes.as_deref() == Some(&*parent_scopes) {
                rule.accept_overwrite(scope_depth, font_style, foreground, background);
                return;
            }
        }

        // New qualified rule; fields left unset inherit from the main rule.
        let font_style = font_style.or(self.main_rule.font_style);
        let foreground = if foreground.is_none() {
            self.main_rule.foreground
        } else {
            foreground
        };
        let background = if background.is_none() {
            self.main_rule.background
        } else {
            background
        };
        self.rules_with_parent_scopes.push(TrieRule::new(
            scope_depth,
            Some(parent_scopes),
            font_style,
            foreground,
            background,
        ));
    }

    /// Collect the candidate rules for `scope`, most specific first.
    ///
    /// Unmatched scope tails fall back to the deepest matched node's
    /// accumulated rules.
    pub fn match_scope(&self, scope: &str) -> Vec<TrieRule> {
        if !scope.is_empty() {
            let (head, tail) = split_scope(scope);
            if let Some(child) = self.children.get(head) {
                return child.match_scope(tail);
            }
        }

        let mut rules = self.rules_with_parent_scopes.clone();
        rules.push(self.main_rule.clone());
        rules.sort_by(|a, b| TrieRule::cmp_by_specificity(a, b));
        rules
    }
}
