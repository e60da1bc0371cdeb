//! Depth-bounded walk from a category up towards the root.

use crate::cancel::CancelToken;
use crate::error::ResolveError;
use crate::model::CategoryId;
use crate::store::CategoryStore;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Default number of parent hops taken before the walk stops.
pub const MAX_ANCESTOR_DEPTH: usize = 6;

/// Ordered chain `[category_id, parent, grandparent, ...]`.
///
/// At most `max_depth` parent lookups are made, so the result holds at most
/// `max_depth + 1` ids even when the parent pointers form a cycle. A failed
/// lookup ends the walk at the last node that resolved; it is not an error.
///
/// # Errors
///
/// Returns [`ResolveError::Cancelled`] if `cancel` fires before or during a
/// lookup.
pub fn ancestors(
    store: &dyn CategoryStore,
    category_id: &str,
    max_depth: usize,
    cancel: &CancelToken,
) -> Result<Vec<CategoryId>, ResolveError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::ancestor_walk_span(category_id).entered();

    let mut chain = vec![category_id.to_string()];
    let mut current = category_id.to_string();

    for _ in 0..max_depth {
        cancel.check()?;
        let lookup = store.parent_id(&current);
        cancel.check()?;

        let parent = match lookup {
            Ok(Some(parent)) => parent,
            Ok(None) => break,
            Err(e) => {
                log::warn!(
                    "ancestor lookup for category {current} failed, truncating chain at depth {}: {e}",
                    chain.len() - 1
                );
                break;
            }
        };

        chain.push(parent.clone());
        current = parent;
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCategoryStore;

    fn chain_store() -> MemoryCategoryStore {
        MemoryCategoryStore::new()
            .with_category("leaf", "laptops", Some("mid"))
            .with_category("mid", "computers", Some("root"))
            .with_category("root", "electronics", None)
    }

    #[test]
    fn test_walks_to_root_nearest_first() {
        let store = chain_store();
        let chain = ancestors(&store, "leaf", MAX_ANCESTOR_DEPTH, &CancelToken::never()).unwrap();
        assert_eq!(chain, vec!["leaf", "mid", "root"]);
    }

    #[test]
    fn test_root_yields_self_only() {
        let store = chain_store();
        let chain = ancestors(&store, "root", MAX_ANCESTOR_DEPTH, &CancelToken::never()).unwrap();
        assert_eq!(chain, vec!["root"]);
    }

    #[test]
    fn test_cycle_is_bounded_by_depth() {
        let store = MemoryCategoryStore::new()
            .with_category("a", "a", Some("b"))
            .with_category("b", "b", Some("a"));

        let chain = ancestors(&store, "a", 4, &CancelToken::never()).unwrap();
        assert_eq!(chain, vec!["a", "b", "a", "b", "a"]);

        let chain = ancestors(&store, "a", MAX_ANCESTOR_DEPTH, &CancelToken::never()).unwrap();
        assert_eq!(chain.len(), MAX_ANCESTOR_DEPTH + 1);
    }

    #[test]
    fn test_self_parent_is_bounded() {
        let store = MemoryCategoryStore::new().with_category("loop", "loop", Some("loop"));
        let chain = ancestors(&store, "loop", 2, &CancelToken::never()).unwrap();
        assert_eq!(chain, vec!["loop", "loop", "loop"]);
    }

    #[test]
    fn test_lookup_failure_truncates() {
        let store = chain_store().failing_lookup("mid");
        let chain = ancestors(&store, "leaf", MAX_ANCESTOR_DEPTH, &CancelToken::never()).unwrap();
        assert_eq!(chain, vec!["leaf", "mid"]);
    }

    #[test]
    fn test_zero_depth_returns_self() {
        let store = chain_store();
        let chain = ancestors(&store, "leaf", 0, &CancelToken::never()).unwrap();
        assert_eq!(chain, vec!["leaf"]);
    }

    #[test]
    fn test_cancelled_walk_fails() {
        let store = chain_store();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            ancestors(&store, "leaf", MAX_ANCESTOR_DEPTH, &cancel),
            Err(ResolveError::Cancelled)
        ));
    }
}
