//! Core types shared by every stage of attribute resolution.
//!
//! An [`AttributeDefinition`] is the canonical, normalized form of a stored
//! `category_attributes` row. A [`ResolvedAttributeSet`] is what a caller gets
//! back for one category: the merged definitions plus the ancestor chain that
//! was consulted to produce them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a category node (a UUID in the PostgreSQL schema).
pub type CategoryId = String;

/// Sort order applied to definitions that do not carry one.
pub const DEFAULT_SORT_ORDER: i32 = 999;

/// Value type of an attribute definition.
///
/// Stored values outside the known set coerce to [`AttributeType::Text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Select,
    Multiselect,
    Boolean,
    Number,
    Text,
    Date,
}

impl AttributeType {
    /// Parse a stored type name, falling back to `Text` for anything unknown.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "select" => AttributeType::Select,
            "multiselect" => AttributeType::Multiselect,
            "boolean" => AttributeType::Boolean,
            "number" => AttributeType::Number,
            "date" => AttributeType::Date,
            _ => AttributeType::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::Select => "select",
            AttributeType::Multiselect => "multiselect",
            AttributeType::Boolean => "boolean",
            AttributeType::Number => "number",
            AttributeType::Text => "text",
            AttributeType::Date => "date",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy deciding which categories can see a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritScope {
    /// Visible on the owning category only.
    SelfOnly,
    /// Visible on the owning category and all of its descendants.
    Inherit,
    /// Visible everywhere (the only scope honoured for category-less rows).
    Global,
}

impl InheritScope {
    /// Parse a stored scope name. Unknown values are treated as unset.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "self_only" => Some(InheritScope::SelfOnly),
            "inherit" => Some(InheritScope::Inherit),
            "global" => Some(InheritScope::Global),
            _ => None,
        }
    }

    /// Scope in force for a row: the stored one, or `self_only` for
    /// category-owned rows and `global` for category-less rows.
    pub fn effective(stored: Option<InheritScope>, category_id: Option<&str>) -> Self {
        match (stored, category_id) {
            (Some(scope), _) => scope,
            (None, Some(_)) => InheritScope::SelfOnly,
            (None, None) => InheritScope::Global,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InheritScope::SelfOnly => "self_only",
            InheritScope::Inherit => "inherit",
            InheritScope::Global => "global",
        }
    }
}

/// A normalized attribute definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub id: String,
    /// Owning category; `None` for global rows.
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub localized_name: Option<String>,
    pub attribute_type: AttributeType,
    /// Lower-cased, never empty once a definition leaves the normalizer.
    pub attribute_key: String,
    pub inherit_scope: InheritScope,
    pub options: Vec<String>,
    pub localized_options: Vec<String>,
    pub placeholder: Option<String>,
    pub localized_placeholder: Option<String>,
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

impl AttributeDefinition {
    pub fn effective_sort_order(&self) -> i32 {
        self.sort_order.unwrap_or(DEFAULT_SORT_ORDER)
    }

    /// True when either locale carries at least one option.
    pub fn has_options(&self) -> bool {
        !self.options.is_empty() || !self.localized_options.is_empty()
    }

    pub fn is_owned_by(&self, category_id: &str) -> bool {
        self.category_id.as_deref() == Some(category_id)
    }
}

/// Caller-controlled switches for one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolveFlags {
    pub include_parents: bool,
    pub include_global: bool,
    pub filterable_only: bool,
}

impl Default for ResolveFlags {
    fn default() -> Self {
        Self {
            include_parents: true,
            include_global: true,
            filterable_only: false,
        }
    }
}

impl ResolveFlags {
    pub fn include_parents(mut self, include: bool) -> Self {
        self.include_parents = include;
        self
    }

    pub fn include_global(mut self, include: bool) -> Self {
        self.include_global = include;
        self
    }

    pub fn filterable_only(mut self, only: bool) -> Self {
        self.filterable_only = only;
        self
    }
}

/// The effective attribute set of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAttributeSet {
    /// `None` when the slug or id did not resolve to a category.
    pub category_id: Option<CategoryId>,
    pub attributes: Vec<AttributeDefinition>,
    /// Nearest first; `ancestor_ids[0]` is the category itself.
    pub ancestor_ids: Vec<CategoryId>,
}

impl ResolvedAttributeSet {
    pub fn not_found() -> Self {
        Self {
            category_id: None,
            attributes: Vec::new(),
            ancestor_ids: Vec::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|attr| attr.attribute_key == key)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .map(|attr| attr.attribute_key.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_type_unknown_coerces_to_text() {
        assert_eq!(AttributeType::parse("multiselect"), AttributeType::Multiselect);
        assert_eq!(AttributeType::parse("colour-picker"), AttributeType::Text);
        assert_eq!(AttributeType::parse(""), AttributeType::Text);
    }

    #[test]
    fn test_inherit_scope_defaults() {
        assert_eq!(InheritScope::effective(None, Some("c1")), InheritScope::SelfOnly);
        assert_eq!(InheritScope::effective(None, None), InheritScope::Global);
        assert_eq!(
            InheritScope::effective(Some(InheritScope::Inherit), None),
            InheritScope::Inherit
        );
        assert_eq!(InheritScope::parse("bogus"), None);
    }

    #[test]
    fn test_flags_default() {
        let flags = ResolveFlags::default();
        assert!(flags.include_parents);
        assert!(flags.include_global);
        assert!(!flags.filterable_only);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&InheritScope::SelfOnly).unwrap();
        assert_eq!(json, "\"self_only\"");
        let json = serde_json::to_string(&AttributeType::Multiselect).unwrap();
        assert_eq!(json, "\"multiselect\"");
    }
}
