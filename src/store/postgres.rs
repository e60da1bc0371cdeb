//! PostgreSQL backed stores.
//!
//! Queries are built with SeaQuery against two tables:
//!
//! ```sql
//! categories (id uuid primary key, slug text unique, parent_id uuid null)
//! category_attributes (
//!     id uuid primary key, category_id uuid null, name text, name_bg text,
//!     attribute_type text, attribute_key text, inherit_scope text,
//!     options jsonb, options_bg jsonb, placeholder text, placeholder_bg text,
//!     is_filterable bool, is_required bool, is_hero_spec bool, hero_priority int,
//!     is_badge_spec bool, badge_priority int, unit_suffix text, sort_order int,
//!     validation_rules jsonb, is_active bool  -- absent on older deployments
//! )
//! ```

use super::value_conversion::with_converted_params;
use super::{AttributeQuery, AttributeRecord, AttributeStore, CategoryStore, Projection, StoredRow};
use crate::error::StoreError;
use crate::executor::QueryExecutor;
use crate::model::CategoryId;
use may_postgres::Row;
use sea_query::{
    Expr, ExprTrait, Iden, NullOrdering, Order, PostgresQueryBuilder, Query, SelectStatement,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
enum Categories {
    Table,
    Id,
    Slug,
    ParentId,
}

impl Iden for Categories {
    fn unquoted(&self) -> &str {
        match self {
            Categories::Table => "categories",
            Categories::Id => "id",
            Categories::Slug => "slug",
            Categories::ParentId => "parent_id",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CategoryAttributes {
    Table,
    Id,
    CategoryId,
    Name,
    NameBg,
    AttributeType,
    AttributeKey,
    InheritScope,
    Options,
    OptionsBg,
    Placeholder,
    PlaceholderBg,
    IsFilterable,
    IsRequired,
    IsHeroSpec,
    HeroPriority,
    IsBadgeSpec,
    BadgePriority,
    UnitSuffix,
    SortOrder,
    ValidationRules,
    IsActive,
}

impl Iden for CategoryAttributes {
    fn unquoted(&self) -> &str {
        match self {
            CategoryAttributes::Table => "category_attributes",
            CategoryAttributes::Id => "id",
            CategoryAttributes::CategoryId => "category_id",
            CategoryAttributes::Name => "name",
            CategoryAttributes::NameBg => "name_bg",
            CategoryAttributes::AttributeType => "attribute_type",
            CategoryAttributes::AttributeKey => "attribute_key",
            CategoryAttributes::InheritScope => "inherit_scope",
            CategoryAttributes::Options => "options",
            CategoryAttributes::OptionsBg => "options_bg",
            CategoryAttributes::Placeholder => "placeholder",
            CategoryAttributes::PlaceholderBg => "placeholder_bg",
            CategoryAttributes::IsFilterable => "is_filterable",
            CategoryAttributes::IsRequired => "is_required",
            CategoryAttributes::IsHeroSpec => "is_hero_spec",
            CategoryAttributes::HeroPriority => "hero_priority",
            CategoryAttributes::IsBadgeSpec => "is_badge_spec",
            CategoryAttributes::BadgePriority => "badge_priority",
            CategoryAttributes::UnitSuffix => "unit_suffix",
            CategoryAttributes::SortOrder => "sort_order",
            CategoryAttributes::ValidationRules => "validation_rules",
            CategoryAttributes::IsActive => "is_active",
        }
    }
}

/// Columns every deployment has.
const LEGACY_COLUMNS: [CategoryAttributes; 20] = [
    CategoryAttributes::Id,
    CategoryAttributes::CategoryId,
    CategoryAttributes::Name,
    CategoryAttributes::NameBg,
    CategoryAttributes::AttributeType,
    CategoryAttributes::AttributeKey,
    CategoryAttributes::InheritScope,
    CategoryAttributes::Options,
    CategoryAttributes::OptionsBg,
    CategoryAttributes::Placeholder,
    CategoryAttributes::PlaceholderBg,
    CategoryAttributes::IsFilterable,
    CategoryAttributes::IsRequired,
    CategoryAttributes::IsHeroSpec,
    CategoryAttributes::HeroPriority,
    CategoryAttributes::IsBadgeSpec,
    CategoryAttributes::BadgePriority,
    CategoryAttributes::UnitSuffix,
    CategoryAttributes::SortOrder,
    CategoryAttributes::ValidationRules,
];

fn parse_uuid(id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(id).map_err(|e| StoreError::Query(format!("category id {id:?} is not a UUID: {e}")))
}

fn run<E: QueryExecutor>(executor: &E, statement: &SelectStatement) -> Result<Vec<Row>, StoreError> {
    let (sql, values) = statement.build(PostgresQueryBuilder);
    with_converted_params(&values, |params| executor.query_all(&sql, params))
}

/// SELECT with the projection and the shared predicates applied.
fn attribute_select(query: &AttributeQuery) -> SelectStatement {
    let mut select = Query::select();
    select
        .columns(LEGACY_COLUMNS)
        .from(CategoryAttributes::Table);

    if query.projection == Projection::Current {
        select
            .column(CategoryAttributes::IsActive)
            .and_where(Expr::col(CategoryAttributes::IsActive).eq(true));
    }
    if query.filterable_only {
        select.and_where(Expr::col(CategoryAttributes::IsFilterable).eq(true));
    }

    select
        .order_by_with_nulls(CategoryAttributes::SortOrder, Order::Asc, NullOrdering::Last)
        .order_by(CategoryAttributes::Id, Order::Asc);
    select
}

/// Category tree over the `categories` table.
pub struct PgCategoryStore<E> {
    executor: E,
}

impl<E: QueryExecutor> PgCategoryStore<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }
}

impl<E: QueryExecutor> CategoryStore for PgCategoryStore<E> {
    fn find_category_id(&self, slug: &str) -> Result<Option<CategoryId>, StoreError> {
        let mut query = Query::select();
        query
            .column(Categories::Id)
            .from(Categories::Table)
            .and_where(Expr::col(Categories::Slug).eq(slug));

        let rows = run(&self.executor, &query)?;
        match rows.first() {
            Some(row) => {
                let id: Uuid = row
                    .try_get("id")
                    .map_err(|e| StoreError::Decode(format!("categories.id: {e}")))?;
                Ok(Some(id.to_string()))
            }
            None => Ok(None),
        }
    }

    fn parent_id(&self, category_id: &str) -> Result<Option<CategoryId>, StoreError> {
        let mut query = Query::select();
        query
            .column(Categories::ParentId)
            .from(Categories::Table)
            .and_where(Expr::col(Categories::Id).eq(parse_uuid(category_id)?));

        let rows = run(&self.executor, &query)?;
        match rows.first() {
            Some(row) => {
                let parent: Option<Uuid> = row
                    .try_get("parent_id")
                    .map_err(|e| StoreError::Decode(format!("categories.parent_id: {e}")))?;
                Ok(parent.map(|id| id.to_string()))
            }
            None => Ok(None),
        }
    }
}

/// Attribute definitions over the `category_attributes` table.
pub struct PgAttributeStore<E> {
    executor: E,
}

impl<E: QueryExecutor> PgAttributeStore<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    fn fetch(&self, statement: &SelectStatement, projection: Projection) -> Result<Vec<StoredRow>, StoreError> {
        run(&self.executor, statement)?
            .iter()
            .map(|row| decode_row(row, projection))
            .collect()
    }
}

impl<E: QueryExecutor> AttributeStore for PgAttributeStore<E> {
    fn query_by_category_ids(
        &self,
        category_ids: &[CategoryId],
        query: &AttributeQuery,
    ) -> Result<Vec<StoredRow>, StoreError> {
        if category_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = category_ids
            .iter()
            .map(|id| parse_uuid(id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut select = attribute_select(query);
        select.and_where(Expr::col(CategoryAttributes::CategoryId).is_in(ids));
        self.fetch(&select, query.projection)
    }

    fn query_global(&self, query: &AttributeQuery) -> Result<Vec<StoredRow>, StoreError> {
        let mut select = attribute_select(query);
        select.and_where(Expr::col(CategoryAttributes::CategoryId).is_null());
        self.fetch(&select, query.projection)
    }
}

fn column<'a, T>(row: &'a Row, name: &str) -> Result<T, StoreError>
where
    T: may_postgres::types::FromSql<'a>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Decode(format!("category_attributes.{name}: {e}")))
}

/// Keep the string elements of a JSON array; anything else is "no options".
fn string_list(value: Option<serde_json::Value>) -> Option<Vec<String>> {
    match value? {
        serde_json::Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

fn decode_row(row: &Row, projection: Projection) -> Result<StoredRow, StoreError> {
    let id: Uuid = column(row, "id")?;
    let category_id: Option<Uuid> = column(row, "category_id")?;

    let record = AttributeRecord {
        id: id.to_string(),
        category_id: category_id.map(|id| id.to_string()),
        name: column(row, "name")?,
        name_bg: column(row, "name_bg")?,
        attribute_type: column(row, "attribute_type")?,
        attribute_key: column(row, "attribute_key")?,
        inherit_scope: column(row, "inherit_scope")?,
        options: string_list(column(row, "options")?),
        options_bg: string_list(column(row, "options_bg")?),
        placeholder: column(row, "placeholder")?,
        placeholder_bg: column(row, "placeholder_bg")?,
        is_filterable: column::<Option<bool>>(row, "is_filterable")?.unwrap_or(false),
        is_required: column::<Option<bool>>(row, "is_required")?.unwrap_or(false),
        is_hero_spec: column(row, "is_hero_spec")?,
        hero_priority: column(row, "hero_priority")?,
        is_badge_spec: column(row, "is_badge_spec")?,
        badge_priority: column(row, "badge_priority")?,
        unit_suffix: column(row, "unit_suffix")?,
        sort_order: column(row, "sort_order")?,
        validation_rules: column(row, "validation_rules")?,
    };

    Ok(match projection {
        Projection::Current => StoredRow::Current {
            is_active: column::<Option<bool>>(row, "is_active")?.unwrap_or(true),
            record,
        },
        Projection::Legacy => StoredRow::Legacy(record),
    })
}
