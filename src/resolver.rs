//! Public entry point: resolve the effective attribute set of a category.
//!
//! A resolution runs as a short chain of store round trips followed by a
//! pure merge:
//!
//! 1. slug or id → category id (UUIDs skip the lookup)
//! 2. ancestor walk, unless parents are excluded
//! 3. scoped + global fetch, concurrently
//! 4. normalize, filter by visibility, merge
//!
//! Results are memoized in a [`CacheRegion`] under [`CacheKey`] and tagged so
//! [`AttributeResolver::invalidate`] can drop everything that depended on a
//! changed category or on the global scope. Not-found and degraded results
//! are returned but never stored.

use crate::ancestors::ancestors;
use crate::cache::{CacheKey, CacheRegion, CacheTag, TagCache, Tagged};
use crate::cancel::CancelToken;
use crate::config::{AppConfig, ResolverSettings};
use crate::connection;
use crate::error::ResolveError;
use crate::executor::MayPostgresExecutor;
use crate::fetch::{fetch_rows, FetchOptions, FetchOutcome};
use crate::merge::merge;
use crate::model::{AttributeDefinition, CategoryId, ResolveFlags, ResolvedAttributeSet};
use crate::normalize::normalize;
use crate::scope::is_visible;
use crate::store::postgres::{PgAttributeStore, PgCategoryStore};
use crate::store::{AttributeStore, CategoryStore};
use crossbeam_channel::unbounded;
use may::coroutine;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

type Resolution = Result<Arc<ResolvedAttributeSet>, ResolveError>;

/// Resolves category attribute sets against a pair of stores and a cache
/// region. Cheap to clone; clones share stores and cache.
#[derive(Clone)]
pub struct AttributeResolver {
    categories: Arc<dyn CategoryStore>,
    attributes: Arc<dyn AttributeStore>,
    cache: Arc<dyn CacheRegion>,
    settings: ResolverSettings,
}

impl AttributeResolver {
    pub fn new(
        categories: Arc<dyn CategoryStore>,
        attributes: Arc<dyn AttributeStore>,
        cache: Arc<dyn CacheRegion>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            categories,
            attributes,
            cache,
            settings,
        }
    }

    /// Connect to PostgreSQL and build a resolver with a fresh [`TagCache`].
    pub fn connect(config: &AppConfig) -> Result<Self, ResolveError> {
        let client = connection::connect(&config.database)?;
        let executor = Arc::new(MayPostgresExecutor::new(client));

        Ok(Self::new(
            Arc::new(PgCategoryStore::new(Arc::clone(&executor))),
            Arc::new(PgAttributeStore::new(executor)),
            Arc::new(TagCache::new()),
            config.resolver,
        ))
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<dyn CacheRegion> {
        &self.cache
    }

    /// Resolve without a cancellation signal.
    pub fn resolve(&self, slug_or_id: &str, flags: ResolveFlags) -> Resolution {
        self.resolve_with_cancel(slug_or_id, flags, &CancelToken::never())
    }

    /// Resolve `slug_or_id`, serving from the cache region when possible.
    ///
    /// # Errors
    ///
    /// [`ResolveError::Cancelled`] when `cancel` fires at any store round
    /// trip. Store failures are not errors: an unknown category yields
    /// [`ResolvedAttributeSet::not_found`] and a failed fetch an empty or
    /// partial set.
    pub fn resolve_with_cancel(
        &self,
        slug_or_id: &str,
        flags: ResolveFlags,
        cancel: &CancelToken,
    ) -> Resolution {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::resolve_span(slug_or_id, &flags).entered();

        let Some(category_id) = self.resolve_category_id(slug_or_id, cancel)? else {
            #[cfg(feature = "metrics")]
            METRICS.record_resolution("not_found");
            return Ok(Arc::new(ResolvedAttributeSet::not_found()));
        };

        let key = CacheKey::new(category_id.clone(), flags);
        if let Some(hit) = self.cache.get(&key) {
            #[cfg(feature = "metrics")]
            METRICS.record_cache_lookup(true);
            return Ok(hit);
        }
        #[cfg(feature = "metrics")]
        METRICS.record_cache_lookup(false);

        let Tagged {
            value,
            tags,
            cacheable,
        } = self.compute(&category_id, flags, cancel)?;
        let value = Arc::new(value);

        if cacheable {
            self.cache.insert(key, Arc::clone(&value), tags);
            #[cfg(feature = "metrics")]
            METRICS.record_resolution("resolved");
        } else {
            log::debug!("not caching degraded resolution of category {category_id}");
            #[cfg(feature = "metrics")]
            METRICS.record_resolution("degraded");
        }

        Ok(value)
    }

    /// Map a slug or id to a category id.
    ///
    /// Input that parses as a UUID in any accepted spelling is taken as an id
    /// and returned in lower-case hyphenated form, the form stores hand back.
    /// Anything else is looked up by slug; blank input and failed lookups
    /// give `None`.
    pub fn resolve_category_id(
        &self,
        slug_or_id: &str,
        cancel: &CancelToken,
    ) -> Result<Option<CategoryId>, ResolveError> {
        cancel.check()?;
        if slug_or_id.trim().is_empty() {
            return Ok(None);
        }
        if let Ok(id) = Uuid::parse_str(slug_or_id.trim()) {
            return Ok(Some(id.to_string()));
        }

        let lookup = self.categories.find_category_id(slug_or_id);
        cancel.check()?;
        match lookup {
            Ok(found) => Ok(found),
            Err(e) => {
                log::warn!("category lookup for {slug_or_id:?} failed, treating as not found: {e}");
                Ok(None)
            }
        }
    }

    /// Compute the attribute set of `category_id` and the tags it depends on.
    ///
    /// Touches the stores only; the cache region is neither read nor written.
    /// The result is marked uncacheable when the scoped or global fetch
    /// failed.
    pub fn compute(
        &self,
        category_id: &str,
        flags: ResolveFlags,
        cancel: &CancelToken,
    ) -> Result<Tagged<ResolvedAttributeSet>, ResolveError> {
        cancel.check()?;
        let ancestor_ids = if flags.include_parents {
            ancestors(
                self.categories.as_ref(),
                category_id,
                self.settings.max_ancestor_depth,
                cancel,
            )?
        } else {
            vec![category_id.to_string()]
        };

        let tags = dependency_tags(category_id, &ancestor_ids, flags);
        let options = FetchOptions {
            include_global: flags.include_global,
            filterable_only: flags.filterable_only,
            stack_size: self.settings.coroutine_stack_size,
        };

        let fetched = match fetch_rows(&self.attributes, &ancestor_ids, options, cancel)? {
            FetchOutcome::Rows(rows) => rows,
            FetchOutcome::ScopedFailed => {
                let empty = ResolvedAttributeSet {
                    category_id: Some(category_id.to_string()),
                    attributes: Vec::new(),
                    ancestor_ids,
                };
                return Ok(Tagged::new(empty, tags).uncacheable());
            }
        };

        let visible: Vec<AttributeDefinition> = fetched
            .scoped
            .into_iter()
            .chain(fetched.global)
            .map(|row| normalize(row.into_record()))
            .filter(|definition| !flags.filterable_only || definition.is_filterable)
            .filter(|definition| {
                is_visible(
                    definition,
                    category_id,
                    flags.include_parents,
                    flags.include_global,
                )
            })
            .collect();

        let resolved = ResolvedAttributeSet {
            category_id: Some(category_id.to_string()),
            attributes: merge(category_id, &ancestor_ids, visible),
            ancestor_ids,
        };

        let tagged = Tagged::new(resolved, tags);
        Ok(if fetched.global_degraded {
            tagged.uncacheable()
        } else {
            tagged
        })
    }

    /// Resolve a batch with up to `warm_concurrency` coroutines.
    ///
    /// Results come back in request order. Each request is independent: one
    /// cancelled or degraded resolution does not affect the others, except
    /// that they all share `cancel`.
    pub fn warm(&self, requests: &[(String, ResolveFlags)], cancel: &CancelToken) -> Vec<Resolution> {
        let (job_tx, job_rx) = unbounded::<(usize, String, ResolveFlags)>();
        let (result_tx, result_rx) = unbounded::<(usize, Resolution)>();
        for (idx, (slug_or_id, flags)) in requests.iter().enumerate() {
            let _ = job_tx.send((idx, slug_or_id.clone(), *flags));
        }
        drop(job_tx);

        let workers = self.settings.warm_concurrency.clamp(1, requests.len().max(1));
        let mut handles = Vec::with_capacity(workers);
        for n in 0..workers {
            let resolver = self.clone();
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let cancel = cancel.clone();
            let builder = coroutine::Builder::new()
                .name(format!("category-attrs-warm-{n}"))
                .stack_size(self.settings.coroutine_stack_size);

            // The queue is filled and closed up front, so try_recv never
            // parks a scheduler thread.
            let spawned = may::go!(builder, move || {
                while let Ok((idx, slug_or_id, flags)) = jobs.try_recv() {
                    let outcome = resolver.resolve_with_cancel(&slug_or_id, flags, &cancel);
                    let _ = results.send((idx, outcome));
                }
            });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => log::warn!("could not spawn warm worker {n}: {e}"),
            }
        }
        drop(result_tx);

        for handle in handles {
            if handle.join().is_err() {
                log::warn!("warm worker panicked; its pending requests are resolved inline");
            }
        }

        let mut slots: Vec<Option<Resolution>> = requests.iter().map(|_| None).collect();
        for (idx, outcome) in result_rx.try_iter() {
            slots[idx] = Some(outcome);
        }

        slots
            .into_iter()
            .zip(requests)
            .map(|(slot, (slug_or_id, flags))| {
                slot.unwrap_or_else(|| self.resolve_with_cancel(slug_or_id, *flags, cancel))
            })
            .collect()
    }

    /// Drop every cached entry carrying `tag`. Returns how many were dropped.
    pub fn invalidate(&self, tag: &CacheTag) -> usize {
        let dropped = self.cache.invalidate_by_tag(tag);
        log::debug!("invalidated {dropped} cached resolutions tagged {tag}");
        dropped
    }
}

/// Tags a resolution of `category_id` depends on.
fn dependency_tags(category_id: &str, ancestor_ids: &[CategoryId], flags: ResolveFlags) -> Vec<CacheTag> {
    let mut tags = Vec::with_capacity(ancestor_ids.len() + 2);
    tags.push(CacheTag::Category(category_id.to_string()));
    tags.extend(
        ancestor_ids
            .iter()
            .map(|id| CacheTag::CategoryAttributes(id.clone())),
    );
    if flags.include_global {
        tags.push(CacheTag::GlobalAttributes);
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryAttributeStore, MemoryCategoryStore};
    use crate::store::AttributeRecord;

    const LEAF: &str = "6f0b2c7e-1f7a-4c59-9a51-0d3a4c0e7a11";

    fn resolver(attributes: MemoryAttributeStore) -> AttributeResolver {
        let categories = MemoryCategoryStore::new()
            .with_category(LEAF, "laptops", Some("root"))
            .with_category("root", "electronics", None);
        AttributeResolver::new(
            Arc::new(categories),
            Arc::new(attributes),
            Arc::new(TagCache::new()),
            ResolverSettings::default(),
        )
    }

    #[test]
    fn test_uuid_input_skips_slug_lookup() {
        let resolver = resolver(MemoryAttributeStore::new());
        let id = resolver
            .resolve_category_id(LEAF, &CancelToken::never())
            .unwrap();
        assert_eq!(id.as_deref(), Some(LEAF));
    }

    #[test]
    fn test_uuid_spellings_are_canonicalized() {
        let resolver = resolver(MemoryAttributeStore::new());
        let cancel = CancelToken::never();
        let simple = LEAF.replace('-', "");
        for spelling in [LEAF.to_uppercase(), simple, format!("{{{LEAF}}}"), format!("urn:uuid:{LEAF}")] {
            let id = resolver.resolve_category_id(&spelling, &cancel).unwrap();
            assert_eq!(id.as_deref(), Some(LEAF), "spelling {spelling}");
        }
    }

    #[test]
    fn test_slug_lookup_and_blank_input() {
        let resolver = resolver(MemoryAttributeStore::new());
        let cancel = CancelToken::never();
        assert_eq!(
            resolver.resolve_category_id("laptops", &cancel).unwrap().as_deref(),
            Some(LEAF)
        );
        assert_eq!(resolver.resolve_category_id("  ", &cancel).unwrap(), None);
        assert_eq!(resolver.resolve_category_id("tablets", &cancel).unwrap(), None);
    }

    #[test]
    fn test_dependency_tags() {
        let chain = vec![LEAF.to_string(), "root".to_string()];
        let rendered: Vec<String> = dependency_tags(LEAF, &chain, ResolveFlags::default())
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            rendered,
            vec![
                format!("category:{LEAF}"),
                format!("attrs:category:{LEAF}"),
                "attrs:category:root".to_string(),
                "attrs:global".to_string(),
            ]
        );

        let no_global = dependency_tags(LEAF, &chain, ResolveFlags::default().include_global(false));
        assert!(!no_global.contains(&CacheTag::GlobalAttributes));
    }

    #[test]
    fn test_compute_does_not_touch_cache() {
        let resolver = resolver(
            MemoryAttributeStore::new()
                .with_row(AttributeRecord::new("a1", Some(LEAF), "Color")),
        );
        let tagged = resolver
            .compute(LEAF, ResolveFlags::default(), &CancelToken::never())
            .unwrap();
        assert!(tagged.cacheable);
        assert_eq!(tagged.value.keys(), vec!["color"]);
        assert!(resolver.cache().get(&CacheKey::new(LEAF, ResolveFlags::default())).is_none());
    }

    #[test]
    fn test_parents_excluded_skips_walk() {
        let categories = Arc::new(
            MemoryCategoryStore::new()
                .with_category(LEAF, "laptops", Some("root"))
                .with_category("root", "electronics", None),
        );
        let resolver = AttributeResolver::new(
            categories.clone(),
            Arc::new(MemoryAttributeStore::new()),
            Arc::new(TagCache::new()),
            ResolverSettings::default(),
        );
        let tagged = resolver
            .compute(LEAF, ResolveFlags::default().include_parents(false), &CancelToken::never())
            .unwrap();
        assert_eq!(tagged.value.ancestor_ids, vec![LEAF.to_string()]);
        assert_eq!(categories.parent_lookups(), 0);
    }
}
