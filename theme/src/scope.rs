//! Immutable scope stacks

use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;

/// The full ancestor scope path of a token, as an immutable parent-pointing
/// chain.
///
/// Multiple tokens share suffixes of the same chain, so nodes are never
/// mutated; extending a stack allocates a new head that points at the shared
/// parent via [`Arc`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ScopeStack {
    scope_name: SmolStr,
    parent: Option<Arc<ScopeStack>>,
}

impl ScopeStack {
    /// A stack holding a single root scope.
    pub fn root(scope_name: impl Into<SmolStr>) -> Arc<Self> {
        Arc::new(Self {
            scope_name: scope_name.into(),
            parent: None,
        })
    }

    /// Extend the stack with a new innermost scope.
    pub fn push(self: Arc<Self>, scope_name: impl Into<SmolStr>) -> Arc<Self> {
        Arc::new(Self {
            scope_name: scope_name.into(),
            parent: Some(self),
        })
    }

    /// Build a stack from a path of scope names, outermost first.
    ///
    /// Returns `None` for an empty path.
    pub fn from_path<I, S>(path: I) -> Option<Arc<Self>>
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        let mut stack: Option<Arc<Self>> = None;
        for segment in path {
            stack = Some(match stack {
                Some(parent) => parent.push(segment),
                None => Self::root(segment),
            });
        }
        stack
    }

    /// The innermost scope name.
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    /// The enclosing scope, if any.
    pub fn parent(&self) -> Option<&Arc<ScopeStack>> {
        self.parent.as_ref()
    }

    /// Iterate the chain from the innermost scope outward.
    pub fn iter_outward(&self) -> impl Iterator<Item = &str> {
        let mut current = Some(self);
        std::iter::from_fn(move || {
            let node = current?;
            current = node.parent.as_deref();
            Some(node.scope_name.as_str())
        })
    }
}

impl fmt::Debug for ScopeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut path: Vec<&str> = self.iter_outward().collect();
        path.reverse();
        write!(f, "ScopeStack({})", path.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_and_iteration() {
        let stack = ScopeStack::from_path(["source.js", "meta.function.js", "string.quoted.js"])
            .expect("non-empty path");
        assert_eq!(stack.scope_name(), "string.quoted.js");
        let outward: Vec<_> = stack.iter_outward().collect();
        assert_eq!(
            outward,
            vec!["string.quoted.js", "meta.function.js", "source.js"]
        );
    }

    #[test]
    fn test_from_path_empty() {
        let empty: [&str; 0] = [];
        assert!(ScopeStack::from_path(empty).is_none());
    }

    #[test]
    fn test_push_shares_parent() {
        let base = ScopeStack::root("source.rs");
        let a = base.clone().push("meta.block.rs");
        let b = base.clone().push("comment.line.rs");
        assert!(Arc::ptr_eq(a.parent().expect("parent"), &base));
        assert!(Arc::ptr_eq(b.parent().expect("parent"), &base));
        assert_eq!(base.scope_name(), "source.rs");
    }
}
