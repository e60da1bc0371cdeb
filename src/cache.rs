//! Tag-based cache region for resolved attribute sets.
//!
//! A resolution is a pure computation producing a value and the tags it
//! depends on ([`Tagged`]). The region stores values under a [`CacheKey`] and
//! remembers which tags each entry carries so an external invalidation hook can
//! purge every entry that consulted a changed category, or the global scope.
//! Nothing expires by time.
//!
//! ## Tags
//!
//! | Tag                               | Rendered as              |
//! |-----------------------------------|--------------------------|
//! | [`CacheTag::Category`]            | `category:<id>`          |
//! | [`CacheTag::CategoryAttributes`]  | `attrs:category:<id>`    |
//! | [`CacheTag::GlobalAttributes`]    | `attrs:global`           |

use crate::model::{CategoryId, ResolveFlags, ResolvedAttributeSet};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Exact tuple a resolution is memoized by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub category_id: CategoryId,
    pub flags: ResolveFlags,
}

impl CacheKey {
    pub fn new(category_id: impl Into<CategoryId>, flags: ResolveFlags) -> Self {
        Self {
            category_id: category_id.into(),
            flags,
        }
    }
}

/// Invalidation label attached to cached entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTag {
    /// The category row itself.
    Category(CategoryId),
    /// Attribute definitions owned by a category.
    CategoryAttributes(CategoryId),
    /// Category-less attribute definitions.
    GlobalAttributes,
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTag::Category(id) => write!(f, "category:{id}"),
            CacheTag::CategoryAttributes(id) => write!(f, "attrs:category:{id}"),
            CacheTag::GlobalAttributes => f.write_str("attrs:global"),
        }
    }
}

/// A computed value together with the tags it must be stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<V> {
    pub value: V,
    pub tags: Vec<CacheTag>,
    /// False for degraded results that must not be memoized.
    pub cacheable: bool,
}

impl<V> Tagged<V> {
    pub fn new(value: V, tags: Vec<CacheTag>) -> Self {
        Self {
            value,
            tags,
            cacheable: true,
        }
    }

    pub fn uncacheable(mut self) -> Self {
        self.cacheable = false;
        self
    }
}

/// Storage for resolved sets.
///
/// Entries are written whole and never mutated; inserting under an existing
/// key replaces the entry and its tags.
pub trait CacheRegion: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Arc<ResolvedAttributeSet>>;

    fn insert(&self, key: CacheKey, value: Arc<ResolvedAttributeSet>, tags: Vec<CacheTag>);

    /// Drop every entry carrying `tag`; returns how many were dropped.
    fn invalidate_by_tag(&self, tag: &CacheTag) -> usize;

    fn clear(&self);
}

struct CacheEntry {
    value: Arc<ResolvedAttributeSet>,
    tags: Vec<CacheTag>,
}

#[derive(Default)]
struct TagCacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    keys_by_tag: HashMap<CacheTag, HashSet<CacheKey>>,
}

impl TagCacheInner {
    fn remove(&mut self, key: &CacheKey) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        for tag in &entry.tags {
            if let Some(keys) = self.keys_by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.keys_by_tag.remove(tag);
                }
            }
        }
        true
    }
}

/// In-memory [`CacheRegion`] with a tag → keys reverse index.
#[derive(Default)]
pub struct TagCache {
    inner: RwLock<TagCacheInner>,
}

impl TagCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tags currently attached to `key`, rendered.
    pub fn tags_of(&self, key: &CacheKey) -> Vec<String> {
        self.inner
            .read()
            .entries
            .get(key)
            .map(|entry| entry.tags.iter().map(ToString::to_string).collect())
            .unwrap_or_default()
    }
}

impl CacheRegion for TagCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<ResolvedAttributeSet>> {
        self.inner
            .read()
            .entries
            .get(key)
            .map(|entry| Arc::clone(&entry.value))
    }

    fn insert(&self, key: CacheKey, value: Arc<ResolvedAttributeSet>, tags: Vec<CacheTag>) {
        let mut inner = self.inner.write();
        inner.remove(&key);
        for tag in &tags {
            inner
                .keys_by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        inner.entries.insert(key, CacheEntry { value, tags });
    }

    fn invalidate_by_tag(&self, tag: &CacheTag) -> usize {
        let mut inner = self.inner.write();
        let keys: Vec<CacheKey> = inner
            .keys_by_tag
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.iter().filter(|key| inner.remove(key)).count()
    }

    fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.keys_by_tag.clear();
    }
}

/// Region that stores nothing; every resolution recomputes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl CacheRegion for NoCache {
    fn get(&self, _key: &CacheKey) -> Option<Arc<ResolvedAttributeSet>> {
        None
    }

    fn insert(&self, _key: CacheKey, _value: Arc<ResolvedAttributeSet>, _tags: Vec<CacheTag>) {}

    fn invalidate_by_tag(&self, _tag: &CacheTag) -> usize {
        0
    }

    fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(id: &str) -> Arc<ResolvedAttributeSet> {
        Arc::new(ResolvedAttributeSet {
            category_id: Some(id.to_string()),
            attributes: Vec::new(),
            ancestor_ids: vec![id.to_string()],
        })
    }

    #[test]
    fn test_tag_rendering() {
        assert_eq!(CacheTag::Category("phones".into()).to_string(), "category:phones");
        assert_eq!(CacheTag::CategoryAttributes("c1".into()).to_string(), "attrs:category:c1");
        assert_eq!(CacheTag::GlobalAttributes.to_string(), "attrs:global");
    }

    #[test]
    fn test_invalidate_by_tag_drops_tagged_entries_only() {
        let cache = TagCache::new();
        let flags = ResolveFlags::default();
        let leaf = CacheKey::new("leaf", flags);
        let other = CacheKey::new("other", flags);

        cache.insert(
            leaf.clone(),
            set("leaf"),
            vec![
                CacheTag::CategoryAttributes("leaf".into()),
                CacheTag::CategoryAttributes("root".into()),
            ],
        );
        cache.insert(other.clone(), set("other"), vec![CacheTag::CategoryAttributes("other".into())]);

        assert_eq!(cache.invalidate_by_tag(&CacheTag::CategoryAttributes("root".into())), 1);
        assert!(cache.get(&leaf).is_none());
        assert!(cache.get(&other).is_some());
        assert_eq!(cache.invalidate_by_tag(&CacheTag::GlobalAttributes), 0);
    }

    #[test]
    fn test_insert_replaces_entry_and_tags() {
        let cache = TagCache::new();
        let key = CacheKey::new("leaf", ResolveFlags::default());
        cache.insert(key.clone(), set("leaf"), vec![CacheTag::GlobalAttributes]);
        cache.insert(key.clone(), set("leaf"), vec![CacheTag::CategoryAttributes("leaf".into())]);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate_by_tag(&CacheTag::GlobalAttributes), 0);
        assert_eq!(cache.tags_of(&key), vec!["attrs:category:leaf"]);
    }

    #[test]
    fn test_flags_are_part_of_the_key() {
        let cache = TagCache::new();
        cache.insert(CacheKey::new("leaf", ResolveFlags::default()), set("leaf"), Vec::new());
        let filtered = CacheKey::new("leaf", ResolveFlags::default().filterable_only(true));
        assert!(cache.get(&filtered).is_none());
    }

    #[test]
    fn test_no_cache_never_stores() {
        let key = CacheKey::new("leaf", ResolveFlags::default());
        NoCache.insert(key.clone(), set("leaf"), Vec::new());
        assert!(NoCache.get(&key).is_none());
    }
}
