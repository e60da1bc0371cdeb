//! Inheritance merge: folds every visible definition of a category into one
//! ordered, conflict-free list.
//!
//! Definitions collide when they share a [`MergeKey`]. Inherited definitions
//! are applied farthest ancestor first so nearer ancestors overwrite farther
//! ones; the category's own definitions are applied last and always take the
//! slot. A definition that overwrites a slot without listing options keeps the
//! options already in the slot (see [`with_fallback_options`]).
//!
//! The output puts own slots first, then inherited ones, each group by
//! ascending `sort_order` with ties kept in the order slots were first
//! created.

use crate::model::{AttributeDefinition, AttributeType, CategoryId};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Depth assigned to definitions whose category is not on the ancestor chain
/// (global rows). Larger than any real depth, so they are applied first.
pub const UNKNOWN_DEPTH: usize = 9999;

/// Identity of "the same field" across category levels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey {
    pub attribute_key: String,
    pub attribute_type: AttributeType,
}

impl MergeKey {
    pub fn of(definition: &AttributeDefinition) -> Self {
        Self {
            attribute_key: definition.attribute_key.trim().to_lowercase(),
            attribute_type: definition.attribute_type,
        }
    }
}

/// Who currently holds a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SlotOrigin {
    Own,
    Inherited,
}

#[derive(Debug)]
struct MergeSlot {
    definition: AttributeDefinition,
    origin: SlotOrigin,
    /// Creation order of the slot; replacing the definition keeps it.
    position: usize,
}

/// Insertion-ordered map from [`MergeKey`] to slot.
#[derive(Debug, Default)]
struct MergeTable {
    slots: Vec<MergeSlot>,
    index: HashMap<MergeKey, usize>,
}

impl MergeTable {
    fn apply(&mut self, incoming: AttributeDefinition, origin: SlotOrigin) {
        let key = MergeKey::of(&incoming);
        match self.index.get(&key) {
            Some(&idx) => {
                let slot = &mut self.slots[idx];
                slot.definition = with_fallback_options(incoming, &slot.definition);
                slot.origin = origin;
            }
            None => {
                let position = self.slots.len();
                self.index.insert(key, position);
                self.slots.push(MergeSlot {
                    definition: incoming,
                    origin,
                    position,
                });
            }
        }
    }

    fn into_ordered(mut self) -> Vec<AttributeDefinition> {
        self.slots.sort_by_key(|slot| {
            (
                slot.origin,
                slot.definition.effective_sort_order(),
                slot.position,
            )
        });
        self.slots.into_iter().map(|slot| slot.definition).collect()
    }
}

/// Carry option lists over from the definition being replaced.
///
/// When `incoming` lists no options in either locale and `existing` does,
/// the result takes `existing`'s option lists, and a `text` incoming type is
/// upgraded to `existing`'s richer type. Otherwise `incoming` is returned
/// untouched.
pub fn with_fallback_options(
    incoming: AttributeDefinition,
    existing: &AttributeDefinition,
) -> AttributeDefinition {
    if incoming.has_options() || !existing.has_options() {
        return incoming;
    }

    let mut merged = incoming;
    if merged.options.is_empty() {
        merged.options = existing.options.clone();
    }
    if merged.localized_options.is_empty() {
        merged.localized_options = existing.localized_options.clone();
    }
    if merged.attribute_type == AttributeType::Text && existing.attribute_type != AttributeType::Text {
        merged.attribute_type = existing.attribute_type;
    }
    merged
}

/// Merge the visible definitions of `target_category_id`.
///
/// `ancestor_ids` only supplies relative depth (index 0 is the target);
/// visibility must already have been decided. Definitions with an empty
/// attribute key are dropped. Within one depth, inherited definitions are
/// applied by `sort_order` and then `id`, so duplicate keys on one category
/// resolve the same way regardless of the order the store returned them in.
pub fn merge(
    target_category_id: &str,
    ancestor_ids: &[CategoryId],
    visible: Vec<AttributeDefinition>,
) -> Vec<AttributeDefinition> {
    let depth_by_category: HashMap<&str, usize> = ancestor_ids
        .iter()
        .enumerate()
        .map(|(depth, id)| (id.as_str(), depth))
        .collect();
    let depth_of = |definition: &AttributeDefinition| {
        definition
            .category_id
            .as_deref()
            .and_then(|id| depth_by_category.get(id).copied())
            .unwrap_or(UNKNOWN_DEPTH)
    };

    let (mut own, mut inherited): (Vec<_>, Vec<_>) = visible
        .into_iter()
        .filter(|definition| !definition.attribute_key.trim().is_empty())
        .partition(|definition| definition.is_owned_by(target_category_id));

    inherited.sort_by(|a, b| {
        Reverse(depth_of(a))
            .cmp(&Reverse(depth_of(b)))
            .then_with(|| a.effective_sort_order().cmp(&b.effective_sort_order()))
            .then_with(|| a.id.cmp(&b.id))
    });
    own.sort_by(|a, b| {
        a.effective_sort_order()
            .cmp(&b.effective_sort_order())
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut table = MergeTable::default();
    for definition in inherited {
        table.apply(definition, SlotOrigin::Inherited);
    }
    for definition in own {
        table.apply(definition, SlotOrigin::Own);
    }
    table.into_ordered()
}
