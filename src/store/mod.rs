//! Read-only collaborators the resolver consumes.
//!
//! The category tree and the attribute definitions live in an external store.
//! This module defines the interfaces the engine needs from it and the raw
//! row shapes it returns. Two implementations ship with the crate:
//!
//! - [`postgres`]: `may_postgres` backed stores over the `categories` and
//!   `category_attributes` tables
//! - [`memory`]: preloaded in-process stores

pub mod memory;
pub mod postgres;
pub(crate) mod value_conversion;

use crate::error::StoreError;
use crate::model::CategoryId;

/// Name of the optional column older deployments lack.
pub const ACTIVE_COLUMN: &str = "is_active";

/// Category tree lookups.
pub trait CategoryStore: Send + Sync {
    /// Resolve a slug to a category id. `Ok(None)` when no category has it.
    fn find_category_id(&self, slug: &str) -> Result<Option<CategoryId>, StoreError>;

    /// Parent of `category_id`. `Ok(None)` for roots and unknown ids.
    fn parent_id(&self, category_id: &str) -> Result<Option<CategoryId>, StoreError>;
}

/// Attribute definition queries.
///
/// Both queries return rows ordered by `sort_order` ascending (unset last),
/// then by `id`. With [`Projection::Current`] a store without the
/// `is_active` column must fail with [`StoreError::MissingColumn`] naming it.
pub trait AttributeStore: Send + Sync {
    /// Definitions owned by any of `category_ids`.
    fn query_by_category_ids(
        &self,
        category_ids: &[CategoryId],
        query: &AttributeQuery,
    ) -> Result<Vec<StoredRow>, StoreError>;

    /// Definitions with no owning category.
    fn query_global(&self, query: &AttributeQuery) -> Result<Vec<StoredRow>, StoreError>;
}

/// Column set requested from the attribute store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Full column set, restricted to `is_active = true`.
    Current,
    /// Column set of deployments that predate `is_active`; no activity filter.
    Legacy,
}

/// Parameters of one attribute query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeQuery {
    pub projection: Projection,
    /// Restrict to `is_filterable = true`.
    pub filterable_only: bool,
}

impl AttributeQuery {
    pub fn current(filterable_only: bool) -> Self {
        Self {
            projection: Projection::Current,
            filterable_only,
        }
    }

    /// Same predicate set without the `is_active` column.
    pub fn legacy(self) -> Self {
        Self {
            projection: Projection::Legacy,
            ..self
        }
    }
}

/// Raw column values of one `category_attributes` row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeRecord {
    pub id: String,
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub name_bg: Option<String>,
    pub attribute_type: Option<String>,
    pub attribute_key: Option<String>,
    pub inherit_scope: Option<String>,
    pub options: Option<Vec<String>>,
    pub options_bg: Option<Vec<String>>,
    pub placeholder: Option<String>,
    pub placeholder_bg: Option<String>,
    pub is_filterable: bool,
    pub is_required: bool,
    pub is_hero_spec: Option<bool>,
    pub hero_priority: Option<i32>,
    pub is_badge_spec: Option<bool>,
    pub badge_priority: Option<i32>,
    pub unit_suffix: Option<String>,
    pub sort_order: Option<i32>,
    pub validation_rules: Option<serde_json::Value>,
}

impl AttributeRecord {
    pub fn new(id: impl Into<String>, category_id: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category_id: category_id.map(str::to_string),
            name: name.into(),
            attribute_type: Some("text".to_string()),
            is_filterable: true,
            ..Self::default()
        }
    }

    pub fn attribute_type(mut self, attribute_type: &str) -> Self {
        self.attribute_type = Some(attribute_type.to_string());
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.attribute_key = Some(key.to_string());
        self
    }

    pub fn scope(mut self, scope: &str) -> Self {
        self.inherit_scope = Some(scope.to_string());
        self
    }

    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    pub fn localized_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options_bg = Some(options.into_iter().map(Into::into).collect());
        self
    }

    pub fn sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = Some(sort_order);
        self
    }

    pub fn filterable(mut self, filterable: bool) -> Self {
        self.is_filterable = filterable;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.is_required = required;
        self
    }
}

/// A row as returned by the store, tagged with the projection that read it.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredRow {
    /// Read with the full column set; `is_active` was available.
    Current { record: AttributeRecord, is_active: bool },
    /// Read from a deployment without `is_active`; always active.
    Legacy(AttributeRecord),
}

impl StoredRow {
    pub fn is_active(&self) -> bool {
        match self {
            StoredRow::Current { is_active, .. } => *is_active,
            StoredRow::Legacy(_) => true,
        }
    }

    pub fn record(&self) -> &AttributeRecord {
        match self {
            StoredRow::Current { record, .. } | StoredRow::Legacy(record) => record,
        }
    }

    pub fn into_record(self) -> AttributeRecord {
        match self {
            StoredRow::Current { record, .. } | StoredRow::Legacy(record) => record,
        }
    }
}

/// Store ordering: `sort_order` ascending with unset values last, then `id`.
pub(crate) fn store_order(a: &AttributeRecord, b: &AttributeRecord) -> std::cmp::Ordering {
    let rank = |record: &AttributeRecord| (record.sort_order.is_none(), record.sort_order);
    rank(a).cmp(&rank(b)).then_with(|| a.id.cmp(&b.id))
}
