//! Resource consumption ledger.
//!
//! Each bound resource tracks a deduction against an external numeric
//! field. On every card mutation the ledger recomputes whether each
//! deduction *should* currently be applied (manual override first, then
//! the automatic progress trigger) and toggles the external field when the
//! answer differs from the recorded state. Toggling is idempotent: a
//! resource that is already where it should be is never touched again.

use tracing::debug;

use crate::cards::{AutoconsumeAfter, Card, ConsumeAction, ConsumeResource, Item};
use crate::resolution::group_updates;
use crate::store::{DocumentStore, EntityPatch, EntityUpdate};

/// The dotted field path of a level-indexed resource pool.
#[must_use]
pub fn slot_path(level: u8) -> String {
    format!("spells.slot{}.value", level)
}

/// Whether a resource should currently be deducted.
///
/// A manual override always wins; otherwise the automatic trigger fires
/// once the item has progressed far enough.
#[must_use]
pub fn should_apply(resource: &ConsumeResource, item: &Item) -> bool {
    match resource.action {
        Some(ConsumeAction::Undo) => false,
        Some(ConsumeAction::ManualApply) => true,
        None => match resource.autoconsume_after {
            AutoconsumeAfter::Init => true,
            AutoconsumeAfter::Attack => item.attack_evaluated(),
            AutoconsumeAfter::Damage => item.any_damage_evaluated(),
            AutoconsumeAfter::Check => item.any_check_evaluated(),
            AutoconsumeAfter::TemplatePlaced => {
                item.target_definition.created_template.is_some()
            }
        },
    }
}

/// Recompute every resource's target state and toggle the ones that
/// differ. Returns the resulting external writes, batched one `Fields`
/// patch per touched record.
#[must_use]
pub fn sync(card: &mut Card) -> Vec<EntityUpdate> {
    let mut updates: Vec<EntityUpdate> = Vec::new();

    for item in &mut card.items {
        // Split borrow: trigger evaluation reads the item, the toggle
        // mutates its resources.
        let mut toggles: Vec<(usize, bool)> = Vec::new();
        for (index, resource) in item.consume_resources.iter().enumerate() {
            let target = should_apply(resource, item);
            if target != resource.applied {
                toggles.push((index, target));
            }
        }

        for (index, target) in toggles {
            let resource = &mut item.consume_resources[index];
            let value = if target {
                (resource.original - resource.amount).max(0)
            } else {
                resource.original
            };
            resource.applied = target;
            debug!(
                uuid = %resource.uuid,
                path = %resource.path,
                value,
                applied = target,
                "consume resource toggled"
            );
            updates.push(EntityUpdate {
                uuid: resource.uuid.clone(),
                patch: EntityPatch::Fields(vec![(resource.path.clone(), value)]),
            });
        }
    }

    group_updates(updates)
}

/// Set the manual override on the selected resources. `None` selects all
/// items / all resources. Returns whether anything changed.
pub fn set_manual(
    card: &mut Card,
    item_index: Option<usize>,
    resource_index: Option<usize>,
    action: ConsumeAction,
) -> bool {
    let mut changed = false;
    for (index, item) in card.items.iter_mut().enumerate() {
        if item_index.is_some_and(|selected| selected != index) {
            continue;
        }
        for (res_index, resource) in item.consume_resources.iter_mut().enumerate() {
            if resource_index.is_some_and(|selected| selected != res_index) {
                continue;
            }
            if resource.action != Some(action) {
                resource.action = Some(action);
                changed = true;
            }
        }
    }
    changed
}

/// Derived item flag: every bound resource currently deducted.
pub fn derive_applied_flags(item: &mut Item) {
    item.calc.all_consume_resources_applied =
        item.consume_resources.iter().all(|r| r.applied);
}

/// Whether the level selection is still mutable: nothing deducted yet and
/// no roll final.
#[must_use]
pub fn can_change_level(item: &Item) -> bool {
    !item.consume_resources.iter().any(|r| r.applied) && !item.any_roll_final()
}

/// Change the upcast level, re-capturing the pool binding of every
/// level-indexed resource that has not been deducted yet.
///
/// Returns `false` (no mutation) when the level is locked.
pub fn change_level(item: &mut Item, level: u8, store: &dyn DocumentStore) -> bool {
    if !can_change_level(item) || item.selected_level == Some(level) {
        return false;
    }
    item.selected_level = Some(level);

    for resource in &mut item.consume_resources {
        if !resource.slot_scaled || resource.applied {
            continue;
        }
        resource.path = slot_path(level);
        resource.original = store
            .entity(&resource.uuid)
            .and_then(|e| e.field(&resource.path))
            .unwrap_or(0);
    }
    true
}
