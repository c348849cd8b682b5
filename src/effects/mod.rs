//! Active-effect applicator.
//!
//! Applies and retracts derived status records on targets based on their
//! resolved outcome. Every derived record is stamped with an origin key
//! `(message, item index, effect index)`; reapplication reuses records
//! bearing the key (update in place) and retraction deletes exactly those
//! records, which makes the whole pass idempotent under repeated
//! dispatcher runs.

use rustc_hash::FxHashMap;

use crate::cards::{Card, Target};
use crate::core::Uuid;
use crate::store::{
    AppliedEffect, DocumentStore, EntityPatch, EntityUpdate, NewEffect, OriginKey,
};

/// Whether a target should currently carry the item's derived effects.
///
/// When damage is present the user's commit decision gates the effects;
/// otherwise a failed save or a confirmed hit does.
#[must_use]
pub fn should_apply(target: &Target) -> bool {
    if target.calc.result.dmg.is_some() {
        target.apply_dmg
    } else {
        target.calc.result.check_pass == Some(false) || target.calc.result.hit == Some(true)
    }
}

/// Diff the desired effect state of every target against what was last
/// applied and produce the store writes that reconcile them. Targets whose
/// state flipped get their `applied_active_effects` marker updated, so a
/// second pass over the unchanged card is a no-op.
#[must_use]
pub fn sync_active_effects(
    message: &Uuid,
    card: &mut Card,
    store: &dyn DocumentStore,
) -> Vec<EntityUpdate> {
    // Collect flips first; an empty set means nothing to reconcile, which
    // is what keeps repeated after-hook runs from looping.
    let mut flips: FxHashMap<Uuid, Vec<(usize, bool)>> = FxHashMap::default();
    for (item_index, item) in card.items.iter().enumerate() {
        if item.calc.effect_templates.is_empty() {
            continue;
        }
        for target in item.targets.iter().flatten() {
            let desired = should_apply(target);
            if desired == target.calc.result.applied_active_effects {
                continue;
            }
            flips
                .entry(target.uuid.clone())
                .or_default()
                .push((item_index, desired));
        }
    }
    if flips.is_empty() {
        return Vec::new();
    }

    let entities = store.entities(&flips.keys().cloned().collect::<Vec<_>>());
    let mut updates: Vec<EntityUpdate> = Vec::new();

    for (target_uuid, item_flips) in &flips {
        let Some(entity) = entities.get(target_uuid) else {
            continue;
        };

        // Existing derived records on this entity, grouped by origin.
        let mut by_origin: FxHashMap<OriginKey, Vec<&AppliedEffect>> = FxHashMap::default();
        for effect in &entity.effects {
            if let Some(origin) = &effect.origin {
                by_origin.entry(origin.clone()).or_default().push(effect);
            }
        }

        let mut deletions: Vec<&AppliedEffect> = Vec::new();
        for (item_index, desired) in item_flips {
            if *desired {
                continue;
            }
            let item = &card.items[*item_index];
            for effect_index in 0..item.calc.effect_templates.len() {
                let key = OriginKey {
                    message: message.clone(),
                    item_index: *item_index as u32,
                    effect_index: effect_index as u32,
                };
                if let Some(existing) = by_origin.get(&key) {
                    deletions.extend(existing.iter().copied());
                }
            }
        }

        let mut creates: Vec<NewEffect> = Vec::new();
        let mut replacements: Vec<AppliedEffect> = Vec::new();
        let mut reusable = deletions.clone();
        for (item_index, desired) in item_flips {
            if !*desired {
                continue;
            }
            let item = &card.items[*item_index];
            for (effect_index, template) in item.calc.effect_templates.iter().enumerate() {
                let origin = OriginKey {
                    message: message.clone(),
                    item_index: *item_index as u32,
                    effect_index: effect_index as u32,
                };
                if reusable.is_empty() {
                    creates.push(NewEffect {
                        label: template.label.clone(),
                        changes: template.changes.clone(),
                        origin,
                    });
                } else {
                    // Reuse a record scheduled for deletion instead of
                    // deleting + creating.
                    let reused = reusable.remove(0);
                    replacements.push(AppliedEffect {
                        id: reused.id,
                        label: template.label.clone(),
                        changes: template.changes.clone(),
                        origin: Some(origin),
                    });
                }
            }
        }
        let delete_ids: Vec<u64> = reusable.iter().map(|e| e.id).collect();

        if !creates.is_empty() {
            updates.push(EntityUpdate {
                uuid: target_uuid.clone(),
                patch: EntityPatch::CreateEffects(creates),
            });
        }
        if !replacements.is_empty() {
            updates.push(EntityUpdate {
                uuid: target_uuid.clone(),
                patch: EntityPatch::UpdateEffects(replacements),
            });
        }
        if !delete_ids.is_empty() {
            updates.push(EntityUpdate {
                uuid: target_uuid.clone(),
                patch: EntityPatch::DeleteEffects(delete_ids),
            });
        }
    }

    // Record what is applied now so the next pass sees no flips.
    for item in &mut card.items {
        if item.calc.effect_templates.is_empty() {
            continue;
        }
        for target in item.targets.iter_mut().flatten() {
            target.calc.result.applied_active_effects = should_apply(target);
        }
    }

    updates
}
