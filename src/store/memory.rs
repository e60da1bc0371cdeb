//! Preloaded in-process stores.
//!
//! Behave like the PostgreSQL stores, including the missing-column failure of
//! a deployment without `is_active`, and can be told to fail specific
//! queries. The call counters let callers observe how many round trips a
//! resolution made.

use super::{
    store_order, AttributeQuery, AttributeRecord, AttributeStore, CategoryStore, Projection,
    StoredRow, ACTIVE_COLUMN,
};
use crate::error::StoreError;
use crate::model::CategoryId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

const ATTRIBUTES_TABLE: &str = "category_attributes";

/// Category tree held in memory.
#[derive(Debug, Default)]
pub struct MemoryCategoryStore {
    slugs: HashMap<String, CategoryId>,
    parents: HashMap<CategoryId, Option<CategoryId>>,
    failing: HashSet<CategoryId>,
    lookups: AtomicUsize,
}

impl MemoryCategoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, id: &str, slug: &str, parent_id: Option<&str>) -> Self {
        self.slugs.insert(slug.to_string(), id.to_string());
        self.parents
            .insert(id.to_string(), parent_id.map(str::to_string));
        self
    }

    /// Make parent lookups for `id` fail.
    pub fn failing_lookup(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Number of parent lookups served so far.
    pub fn parent_lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl CategoryStore for MemoryCategoryStore {
    fn find_category_id(&self, slug: &str) -> Result<Option<CategoryId>, StoreError> {
        Ok(self.slugs.get(slug).cloned())
    }

    fn parent_id(&self, category_id: &str) -> Result<Option<CategoryId>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(category_id) {
            return Err(StoreError::Unavailable(format!(
                "parent lookup for {category_id} refused"
            )));
        }
        Ok(self.parents.get(category_id).cloned().flatten())
    }
}

#[derive(Debug, Clone)]
struct MemoryRow {
    record: AttributeRecord,
    is_active: bool,
}

/// Attribute definitions held in memory.
#[derive(Debug)]
pub struct MemoryAttributeStore {
    rows: Vec<MemoryRow>,
    has_active_column: bool,
    fail_scoped: bool,
    fail_global: bool,
    scoped_calls: AtomicUsize,
    global_calls: AtomicUsize,
}

impl Default for MemoryAttributeStore {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            has_active_column: true,
            fail_scoped: false,
            fail_global: false,
            scoped_calls: AtomicUsize::new(0),
            global_calls: AtomicUsize::new(0),
        }
    }
}

impl MemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(mut self, record: AttributeRecord) -> Self {
        self.rows.push(MemoryRow {
            record,
            is_active: true,
        });
        self
    }

    pub fn with_inactive_row(mut self, record: AttributeRecord) -> Self {
        self.rows.push(MemoryRow {
            record,
            is_active: false,
        });
        self
    }

    /// Emulate a deployment whose schema predates `is_active`.
    pub fn without_active_column(mut self) -> Self {
        self.has_active_column = false;
        self
    }

    /// Fail every category-scoped query.
    pub fn fail_scoped(mut self) -> Self {
        self.fail_scoped = true;
        self
    }

    /// Fail every global query.
    pub fn fail_global(mut self) -> Self {
        self.fail_global = true;
        self
    }

    /// Scoped queries issued so far, retries included.
    pub fn scoped_calls(&self) -> usize {
        self.scoped_calls.load(Ordering::SeqCst)
    }

    /// Global queries issued so far, retries included.
    pub fn global_calls(&self) -> usize {
        self.global_calls.load(Ordering::SeqCst)
    }

    fn select<F>(&self, query: &AttributeQuery, owner: F) -> Result<Vec<StoredRow>, StoreError>
    where
        F: Fn(Option<&str>) -> bool,
    {
        if query.projection == Projection::Current && !self.has_active_column {
            return Err(StoreError::missing_column(ATTRIBUTES_TABLE, ACTIVE_COLUMN));
        }

        let mut records: Vec<&MemoryRow> = self
            .rows
            .iter()
            .filter(|row| owner(row.record.category_id.as_deref()))
            .filter(|row| !query.filterable_only || row.record.is_filterable)
            .filter(|row| match query.projection {
                Projection::Current => row.is_active,
                Projection::Legacy => true,
            })
            .collect();
        records.sort_by(|a, b| store_order(&a.record, &b.record));

        Ok(records
            .into_iter()
            .map(|row| match query.projection {
                Projection::Current => StoredRow::Current {
                    record: row.record.clone(),
                    is_active: row.is_active,
                },
                Projection::Legacy => StoredRow::Legacy(row.record.clone()),
            })
            .collect())
    }
}

impl AttributeStore for MemoryAttributeStore {
    fn query_by_category_ids(
        &self,
        category_ids: &[CategoryId],
        query: &AttributeQuery,
    ) -> Result<Vec<StoredRow>, StoreError> {
        self.scoped_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_scoped {
            return Err(StoreError::Unavailable("scoped query refused".to_string()));
        }
        self.select(query, |owner| {
            owner.is_some_and(|id| category_ids.iter().any(|wanted| wanted == id))
        })
    }

    fn query_global(&self, query: &AttributeQuery) -> Result<Vec<StoredRow>, StoreError> {
        self.global_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_global {
            return Err(StoreError::Unavailable("global query refused".to_string()));
        }
        self.select(query, |owner| owner.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryAttributeStore {
        MemoryAttributeStore::new()
            .with_row(AttributeRecord::new("a2", Some("c1"), "Size").sort_order(2))
            .with_row(AttributeRecord::new("a1", Some("c1"), "Color").sort_order(1))
            .with_row(AttributeRecord::new("a3", Some("c1"), "Notes"))
            .with_inactive_row(AttributeRecord::new("a4", Some("c1"), "Old"))
            .with_row(AttributeRecord::new("g1", None, "Brand").filterable(false))
    }

    #[test]
    fn test_scoped_query_orders_and_filters_inactive() {
        let rows = store()
            .query_by_category_ids(&["c1".to_string()], &AttributeQuery::current(false))
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|row| row.record().id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "a3"]);
        assert!(rows.iter().all(StoredRow::is_active));
    }

    #[test]
    fn test_legacy_projection_ignores_activity() {
        let rows = store()
            .query_by_category_ids(&["c1".to_string()], &AttributeQuery::current(false).legacy())
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|row| matches!(row, StoredRow::Legacy(_))));
    }

    #[test]
    fn test_missing_active_column() {
        let store = store().without_active_column();
        let err = store
            .query_global(&AttributeQuery::current(false))
            .unwrap_err();
        assert!(err.is_missing_column(ACTIVE_COLUMN));
        assert_eq!(store.global_calls(), 1);
    }

    #[test]
    fn test_filterable_only_global() {
        let rows = store().query_global(&AttributeQuery::current(true)).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_category_store_lookups() {
        let store = MemoryCategoryStore::new()
            .with_category("c1", "phones", Some("c0"))
            .with_category("c0", "electronics", None);
        assert_eq!(store.find_category_id("phones").unwrap().as_deref(), Some("c1"));
        assert_eq!(store.find_category_id("nope").unwrap(), None);
        assert_eq!(store.parent_id("c1").unwrap().as_deref(), Some("c0"));
        assert_eq!(store.parent_id("c0").unwrap(), None);
        assert_eq!(store.parent_lookups(), 2);
    }
}
