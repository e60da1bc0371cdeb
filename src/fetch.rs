//! Attribute fetch for one resolution: the scoped query over the ancestor
//! chain and the global query, issued concurrently.
//!
//! Both queries ask for the current projection first. A store that lacks the
//! `is_active` column answers with a missing-column error; the query is then
//! repeated once with the legacy projection. Any other failure ends that
//! query: a scoped failure aborts the fetch, a global failure degrades to an
//! empty global list.

use crate::cancel::CancelToken;
use crate::error::{ResolveError, StoreError};
use crate::model::CategoryId;
use crate::store::{AttributeQuery, AttributeStore, StoredRow, ACTIVE_COLUMN};
use may::coroutine;
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Rows of one resolution, inactive rows already removed.
#[derive(Debug, Default)]
pub struct FetchedRows {
    pub scoped: Vec<StoredRow>,
    pub global: Vec<StoredRow>,
    /// The global query failed and `global` was replaced by an empty list.
    pub global_degraded: bool,
}

#[derive(Debug)]
pub enum FetchOutcome {
    Rows(FetchedRows),
    /// The scoped query failed; the resolution has no attributes.
    ScopedFailed,
}

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub include_global: bool,
    pub filterable_only: bool,
    /// Stack size of the coroutine running the global query.
    pub stack_size: usize,
}

type GlobalResult = Result<Vec<StoredRow>, StoreError>;

enum GlobalFetch {
    Skipped,
    Spawned(coroutine::JoinHandle<GlobalResult>),
    Inline(GlobalResult),
}

/// Run `run` with the current projection, retrying with the legacy one when
/// the store reports the `is_active` column missing.
fn with_legacy_fallback<F>(scope: &'static str, query: AttributeQuery, run: F) -> GlobalResult
where
    F: Fn(&AttributeQuery) -> GlobalResult,
{
    match run(&query) {
        Err(e) if e.is_missing_column(ACTIVE_COLUMN) => {
            log::debug!("{scope} attribute query hit schema drift, retrying without {ACTIVE_COLUMN}: {e}");
            #[cfg(feature = "metrics")]
            METRICS.record_schema_fallback(scope);
            run(&query.legacy())
        }
        other => other,
    }
}

fn active_only(rows: Vec<StoredRow>) -> Vec<StoredRow> {
    rows.into_iter().filter(StoredRow::is_active).collect()
}

fn start_global(
    store: &Arc<dyn AttributeStore>,
    query: AttributeQuery,
    options: FetchOptions,
) -> GlobalFetch {
    if !options.include_global {
        return GlobalFetch::Skipped;
    }

    let worker_store = Arc::clone(store);
    let builder = coroutine::Builder::new()
        .name("category-attrs-global".to_string())
        .stack_size(options.stack_size);
    let spawned = may::go!(builder, move || {
        with_legacy_fallback("global", query, |q| worker_store.query_global(q))
    });

    match spawned {
        Ok(handle) => GlobalFetch::Spawned(handle),
        Err(e) => {
            log::warn!("could not spawn global attribute query, running inline: {e}");
            GlobalFetch::Inline(with_legacy_fallback("global", query, |q| store.query_global(q)))
        }
    }
}

fn finish_global(fetch: GlobalFetch) -> (Vec<StoredRow>, bool) {
    let result = match fetch {
        GlobalFetch::Skipped => return (Vec::new(), false),
        GlobalFetch::Inline(result) => result,
        GlobalFetch::Spawned(handle) => match handle.join() {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(
                "global attribute query panicked".to_string(),
            )),
        },
    };

    match result {
        Ok(rows) => (active_only(rows), false),
        Err(e) => {
            log::warn!("global attribute query failed, continuing without global attributes: {e}");
            #[cfg(feature = "metrics")]
            METRICS.record_degraded_fetch("global");
            (Vec::new(), true)
        }
    }
}

/// Fetch scoped and global rows for `category_ids`.
///
/// # Errors
///
/// Only [`ResolveError::Cancelled`]; store failures are reported through
/// [`FetchOutcome`] and [`FetchedRows::global_degraded`].
pub fn fetch_rows(
    store: &Arc<dyn AttributeStore>,
    category_ids: &[CategoryId],
    options: FetchOptions,
    cancel: &CancelToken,
) -> Result<FetchOutcome, ResolveError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::fetch_span(category_ids.len(), options.include_global).entered();

    cancel.check()?;
    let query = AttributeQuery::current(options.filterable_only);
    let global = start_global(store, query, options);

    let scoped = with_legacy_fallback("scoped", query, |q| {
        store.query_by_category_ids(category_ids, q)
    });
    // Cancelled callers do not wait for the global query; its coroutine
    // finishes the round trip detached and the rows are dropped.
    cancel.check()?;
    let (global, global_degraded) = finish_global(global);
    cancel.check()?;

    match scoped {
        Ok(rows) => Ok(FetchOutcome::Rows(FetchedRows {
            scoped: active_only(rows),
            global,
            global_degraded,
        })),
        Err(e) => {
            log::warn!(
                "attribute query for categories {category_ids:?} failed, resolving to an empty set: {e}"
            );
            #[cfg(feature = "metrics")]
            METRICS.record_degraded_fetch("scoped");
            Ok(FetchOutcome::ScopedFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryAttributeStore;
    use crate::store::AttributeRecord;
    use crossbeam_channel::{bounded, Receiver};
    use std::time::{Duration, Instant};

    /// Cancels `cancel` from inside the scoped query; the global query blocks
    /// until `release` fires or a timeout passes.
    struct CancelDuringScoped {
        inner: MemoryAttributeStore,
        cancel: CancelToken,
        release: Receiver<()>,
    }

    impl AttributeStore for CancelDuringScoped {
        fn query_by_category_ids(
            &self,
            category_ids: &[CategoryId],
            query: &AttributeQuery,
        ) -> Result<Vec<StoredRow>, StoreError> {
            self.cancel.cancel();
            self.inner.query_by_category_ids(category_ids, query)
        }

        fn query_global(&self, query: &AttributeQuery) -> Result<Vec<StoredRow>, StoreError> {
            let _ = self.release.recv_timeout(Duration::from_secs(3));
            self.inner.query_global(query)
        }
    }

    /// Cancels `cancel` from inside the global query after a short delay, so
    /// the scoped query has already returned.
    struct CancelDuringGlobal {
        inner: MemoryAttributeStore,
        cancel: CancelToken,
    }

    impl AttributeStore for CancelDuringGlobal {
        fn query_by_category_ids(
            &self,
            category_ids: &[CategoryId],
            query: &AttributeQuery,
        ) -> Result<Vec<StoredRow>, StoreError> {
            self.inner.query_by_category_ids(category_ids, query)
        }

        fn query_global(&self, query: &AttributeQuery) -> Result<Vec<StoredRow>, StoreError> {
            std::thread::sleep(Duration::from_millis(50));
            self.cancel.cancel();
            self.inner.query_global(query)
        }
    }

    const STACK: usize = 0x8000;

    fn options(include_global: bool) -> FetchOptions {
        FetchOptions {
            include_global,
            filterable_only: false,
            stack_size: STACK,
        }
    }

    fn rows(outcome: FetchOutcome) -> FetchedRows {
        match outcome {
            FetchOutcome::Rows(rows) => rows,
            FetchOutcome::ScopedFailed => panic!("scoped fetch failed"),
        }
    }

    fn base() -> MemoryAttributeStore {
        MemoryAttributeStore::new()
            .with_row(AttributeRecord::new("a1", Some("c"), "Color"))
            .with_inactive_row(AttributeRecord::new("a2", Some("c"), "Retired"))
            .with_row(AttributeRecord::new("g1", None, "Brand").scope("global"))
    }

    #[test]
    fn test_fetches_scoped_and_global() {
        let store: Arc<dyn AttributeStore> = Arc::new(base());
        let fetched = rows(fetch_rows(&store, &["c".to_string()], options(true), &CancelToken::never()).unwrap());
        assert_eq!(fetched.scoped.len(), 1);
        assert_eq!(fetched.global.len(), 1);
        assert!(!fetched.global_degraded);
    }

    #[test]
    fn test_global_skipped_when_not_requested() {
        let memory = Arc::new(base());
        let store: Arc<dyn AttributeStore> = memory.clone();
        let fetched = rows(fetch_rows(&store, &["c".to_string()], options(false), &CancelToken::never()).unwrap());
        assert!(fetched.global.is_empty());
        assert_eq!(memory.global_calls(), 0);
    }

    #[test]
    fn test_schema_drift_retries_once_per_query() {
        let memory = Arc::new(base().without_active_column());
        let store: Arc<dyn AttributeStore> = memory.clone();
        let fetched = rows(fetch_rows(&store, &["c".to_string()], options(true), &CancelToken::never()).unwrap());

        // Legacy rows are all treated as active.
        assert_eq!(fetched.scoped.len(), 2);
        assert!(matches!(fetched.scoped[0], StoredRow::Legacy(_)));
        assert_eq!(memory.scoped_calls(), 2);
        assert_eq!(memory.global_calls(), 2);
    }

    #[test]
    fn test_scoped_failure_aborts() {
        let store: Arc<dyn AttributeStore> = Arc::new(base().fail_scoped());
        let outcome = fetch_rows(&store, &["c".to_string()], options(true), &CancelToken::never()).unwrap();
        assert!(matches!(outcome, FetchOutcome::ScopedFailed));
    }

    #[test]
    fn test_global_failure_degrades() {
        let memory = Arc::new(base().fail_global());
        let store: Arc<dyn AttributeStore> = memory.clone();
        let fetched = rows(fetch_rows(&store, &["c".to_string()], options(true), &CancelToken::never()).unwrap());
        assert_eq!(fetched.scoped.len(), 1);
        assert!(fetched.global.is_empty());
        assert!(fetched.global_degraded);
        // No retry for errors other than the missing column.
        assert_eq!(memory.global_calls(), 1);
    }

    #[test]
    fn test_cancelled_before_fetch() {
        let memory = Arc::new(base());
        let store: Arc<dyn AttributeStore> = memory.clone();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = fetch_rows(&store, &["c".to_string()], options(true), &cancel);
        assert!(matches!(result, Err(ResolveError::Cancelled)));
        assert_eq!(memory.scoped_calls(), 0);
    }

    #[test]
    fn test_cancel_during_scoped_query_does_not_wait_for_global() {
        let cancel = CancelToken::new();
        let (release_tx, release_rx) = bounded::<()>(1);
        let store: Arc<dyn AttributeStore> = Arc::new(CancelDuringScoped {
            inner: base(),
            cancel: cancel.clone(),
            release: release_rx,
        });

        let started = Instant::now();
        let result = fetch_rows(&store, &["c".to_string()], options(true), &cancel);
        let elapsed = started.elapsed();
        let _ = release_tx.send(());

        assert!(matches!(result, Err(ResolveError::Cancelled)));
        assert!(elapsed < Duration::from_secs(2), "waited {elapsed:?} for the global query");
    }

    #[test]
    fn test_cancel_during_global_query_is_reported_after_join() {
        let cancel = CancelToken::new();
        let store: Arc<dyn AttributeStore> = Arc::new(CancelDuringGlobal {
            inner: base(),
            cancel: cancel.clone(),
        });

        let result = fetch_rows(&store, &["c".to_string()], options(true), &cancel);
        assert!(matches!(result, Err(ResolveError::Cancelled)));
        assert!(cancel.is_cancelled());
    }
}
