//! Visibility of a definition from a target category.

use crate::model::{AttributeDefinition, InheritScope};

/// Whether `definition` applies to `target_category_id`.
///
/// 1. A category always sees its own definitions.
/// 2. Without `include_parents` it sees nothing else.
/// 3. A category-less row is visible only with `include_global` and scope `global`.
/// 4. An ancestor's row is visible with scope `inherit` or `global`; `self_only`
///    rows stay on their owner.
pub fn is_visible(
    definition: &AttributeDefinition,
    target_category_id: &str,
    include_parents: bool,
    include_global: bool,
) -> bool {
    if definition.is_owned_by(target_category_id) {
        return true;
    }
    if !include_parents {
        return false;
    }

    let scope = definition.inherit_scope;
    match definition.category_id {
        None => include_global && scope == InheritScope::Global,
        Some(_) => matches!(scope, InheritScope::Inherit | InheritScope::Global),
    }
}
