//! Scope stack compaction and the decode result cache

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A decoded token: the line offset where it starts and its compacted kind.
///
/// The kind is a canonical dot-joined list of style-relevant scope
/// components; an empty kind marks untyped text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub start: usize,
    pub kind: SmolStr,
}

impl Token {
    pub fn new(start: usize, kind: impl Into<SmolStr>) -> Self {
        Self {
            start,
            kind: kind.into(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.kind.is_empty() {
            "<empty>"
        } else {
            self.kind.as_str()
        };
        write!(f, "({}, {})", self.start, kind)
    }
}

/// Compacts a raw per-token scope stack into a canonical kind string.
///
/// Scope-name components are interned to small ids in assignment order; the
/// kind is rendered by joining the components present in the token's
/// accumulated id set in that order, which makes the result order-stable
/// regardless of how scopes were nested. Consecutive tokens usually share a
/// scope-stack prefix, so the per-level accumulated sets of the previous
/// token are memoized and reused up to the first differing level.
///
/// Tables grow monotonically; the component alphabet is bounded by the
/// grammar.
#[derive(Debug)]
pub struct TokenDecoder {
    last_component_id: u32,
    scope_to_component_ids: FxHashMap<SmolStr, Arc<[u32]>>,
    component_to_id: FxHashMap<SmolStr, u32>,
    /// Index 0 is unused; component ids are 1-based.
    id_to_component: Vec<SmolStr>,
    prev_scopes: Vec<String>,
    /// Accumulated component-id set per scope level of the previous token;
    /// index 0 is unused.
    prev_level_sets: Vec<Arc<FxHashSet<u32>>>,
}

impl Default for TokenDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenDecoder {
    pub fn new() -> Self {
        Self {
            last_component_id: 0,
            scope_to_component_ids: FxHashMap::default(),
            component_to_id: FxHashMap::default(),
            id_to_component: vec![SmolStr::default()],
            prev_scopes: Vec::new(),
            prev_level_sets: Vec::new(),
        }
    }

    /// Decode a scope stack (outermost first) into its canonical kind.
    ///
    /// Level 0 is the grammar's root scope and deliberately excluded from
    /// styling hints.
    pub fn decode(&mut self, scopes: &[String]) -> SmolStr {
        let empty_set: Arc<FxHashSet<u32>> = Arc::new(FxHashSet::default());
        let mut level_sets: Vec<Arc<FxHashSet<u32>>> = vec![empty_set.clone()];
        let mut current_set = empty_set;
        let mut same_as_prev = true;

        for (level, scope) in scopes.iter().enumerate().skip(1) {
            if same_as_prev {
                if self.prev_scopes.get(level) == Some(scope) {
                    current_set = self.prev_level_sets[level].clone();
                    level_sets.push(current_set.clone());
                    continue;
                }
                same_as_prev = false;
            }

            let component_ids = self.component_ids(scope);
            let mut extended = (*current_set).clone();
            extended.extend(component_ids.iter().copied());
            current_set = Arc::new(extended);
            level_sets.push(current_set.clone());
        }

        self.prev_scopes = scopes.to_vec();
        self.prev_level_sets = level_sets;
        self.render(&current_set)
    }

    /// The interned component ids for one scope name, splitting and
    /// assigning ids on first sight.
    fn component_ids(&mut self, scope: &str) -> Arc<[u32]> {
        if let Some(ids) = self.scope_to_component_ids.get(scope) {
            return ids.clone();
        }

        let ids: Arc<[u32]> = scope
            .split('.')
            .map(|component| match self.component_to_id.get(component) {
                Some(&id) => id,
                None => {
                    self.last_component_id += 1;
                    let component = SmolStr::new(component);
                    self.component_to_id
                        .insert(component.clone(), self.last_component_id);
                    self.id_to_component.push(component);
                    self.last_component_id
                }
            })
            .collect();
        self.scope_to_component_ids
            .insert(SmolStr::new(scope), ids.clone());
        ids
    }

    /// Join the components present in `set`, in id assignment order.
    fn render(&self, set: &FxHashSet<u32>) -> SmolStr {
        let mut result = String::new();
        for id in 1..=self.last_component_id {
            if set.contains(&id) {
                if !result.is_empty() {
                    result.push('.');
                }
                result.push_str(&self.id_to_component[id as usize]);
            }
        }
        SmolStr::new(result)
    }
}

struct CacheEntry<V> {
    value: V,
    last_access: Instant,
}

/// A capacity-bounded cache whose entries expire a fixed time after their
/// last access.
///
/// Expired entries are dropped opportunistically on access and insertion;
/// at capacity the least recently used entry is evicted. Used for the
/// scope-stack → kind memo, which recurs heavily within one tokenization
/// pass but should not pin memory indefinitely.
pub struct TtlCache<K, V> {
    capacity: usize,
    ttl: Duration,
    entries: FxHashMap<K, CacheEntry<V>>,
}

impl<K: Eq + Hash + Clone, V> TtlCache<K, V> {
    /// `capacity` must be non-zero.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: FxHashMap::default(),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) => now.duration_since(entry.last_access) >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        entry.last_access = now;
        Some(&entry.value)
    }

    pub fn insert(&mut self, key: K, value: V) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_access) < self.ttl);

        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            // Evict the least recently used entry.
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                last_access: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
