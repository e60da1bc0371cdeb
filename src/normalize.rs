//! Conversion of raw store rows into canonical definitions.

use crate::model::{AttributeDefinition, AttributeType, InheritScope};
use crate::store::AttributeRecord;
use once_cell::sync::Lazy;
use regex::Regex;

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid attribute key pattern"));

/// Derive an attribute key from a display name.
///
/// Lower-cases, collapses every run of non-alphanumeric characters into a
/// single `_` and strips leading/trailing separators: `"RAM Size (GB)"`
/// becomes `"ram_size_gb"`. Applying it to its own output is a no-op.
pub fn derive_key(name: &str) -> String {
    let lowered = name.to_lowercase();
    NON_ALPHANUMERIC
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Key a definition is stored and merged under.
///
/// A stored key wins (trimmed and lower-cased); a blank or missing one is
/// derived from `name`. The result is empty only when neither yields text.
pub fn attribute_key(stored: Option<&str>, name: &str) -> String {
    match stored.map(str::trim) {
        Some(key) if !key.is_empty() => key.to_lowercase(),
        _ => derive_key(name),
    }
}

/// Normalize one stored row.
pub fn normalize(record: AttributeRecord) -> AttributeDefinition {
    let attribute_type = record
        .attribute_type
        .as_deref()
        .map(AttributeType::parse)
        .unwrap_or(AttributeType::Text);
    let attribute_key = attribute_key(record.attribute_key.as_deref(), &record.name);
    let inherit_scope = InheritScope::effective(
        record.inherit_scope.as_deref().and_then(InheritScope::parse),
        record.category_id.as_deref(),
    );

    AttributeDefinition {
        id: record.id,
        category_id: record.category_id,
        name: record.name,
        localized_name: record.name_bg,
        attribute_type,
        attribute_key,
        inherit_scope,
        options: record.options.unwrap_or_default(),
        localized_options: record.options_bg.unwrap_or_default(),
        placeholder: record.placeholder,
        localized_placeholder: record.placeholder_bg,
        is_filterable: record.is_filterable,
        is_required: record.is_required,
        is_hero_spec: record.is_hero_spec,
        hero_priority: record.hero_priority,
        is_badge_spec: record.is_badge_spec,
        badge_priority: record.badge_priority,
        unit_suffix: record.unit_suffix,
        sort_order: record.sort_order,
        validation_rules: record.validation_rules,
    }
}
