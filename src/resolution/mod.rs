//! Damage & save resolution pipeline.
//!
//! [`recompute`] rebuilds every derived (`calc`) block of a card from its
//! items and target snapshots. It is deterministic and idempotent: running
//! it twice over an unchanged card yields identical output, and the only
//! state carried over from the previous pass is each aggregate's committed
//! `applied_dmg`.

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::cards::{
    AggregateDamage, Card, HpSnapshot, Item, ItemCategory, SaveModifierRule, Target,
    TargetAggregate, TargetDamage,
};
use crate::core::Uuid;
use crate::store::{EntityPatch, EntityUpdate};

/// Selects aggregates for apply/undo commits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetSelector {
    One(Uuid),
    All,
}

impl TargetSelector {
    fn matches(&self, uuid: &Uuid) -> bool {
        match self {
            TargetSelector::One(selected) => selected == uuid,
            TargetSelector::All => true,
        }
    }
}

/// Rebuild all derived card state.
pub fn recompute(card: &mut Card) {
    // Previously shown aggregates always resurface so a committed amount
    // can still be undone after targets change.
    let mut aggregates: Vec<TargetAggregate> = card
        .calc
        .target_aggregates
        .iter()
        .map(|old| TargetAggregate {
            uuid: old.uuid.clone(),
            name: old.name.clone(),
            img: old.img.clone(),
            hp_snapshot: old.hp_snapshot,
            dmg: Some(AggregateDamage {
                applied: false,
                applied_dmg: old.dmg.as_ref().map_or(0, |d| d.applied_dmg),
                avoided: None,
                calc_dmg: 0,
                calc_hp: old.hp_snapshot.hp,
                calc_temp: old.hp_snapshot.temp,
            }),
        })
        .collect();

    for item in &mut card.items {
        let Some(targets) = item.targets.as_mut() else {
            continue;
        };

        // Reset derived outcomes; the effect-application marker survives.
        for target in targets.iter_mut() {
            target.calc.result.hit = None;
            target.calc.result.check_pass = None;
            target.calc.result.dmg = None;
        }

        // Attack
        if let Some(total) = item
            .attack
            .as_ref()
            .and_then(|a| a.evaluated.as_ref())
            .map(|roll| roll.total)
        {
            for target in targets.iter_mut() {
                target.calc.result.hit = Some(target.ac <= total);
            }
        }

        // Check
        if let Some(check) = &item.check {
            for target in targets.iter_mut() {
                target.calc.result.check_pass = target
                    .check
                    .as_ref()
                    .and_then(|c| c.evaluated.as_ref())
                    .map(|roll| roll.total >= check.dc);
            }
        }

        resolve_item_damage(
            item.category,
            item.base_level,
            item.check.is_some(),
            &item.damages,
            targets,
            &mut aggregates,
        );
    }

    derive_avoided(&card.items, &mut aggregates);

    aggregates.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uuid.cmp(&b.uuid)));
    for aggregate in &mut aggregates {
        if let Some(dmg) = &mut aggregate.dmg {
            dmg.applied = dmg.calc_dmg == dmg.applied_dmg;
        }
    }
    card.calc.all_dmg_applied = !aggregates.is_empty()
        && aggregates
            .iter()
            .all(|a| a.dmg.as_ref().is_some_and(|d| d.applied));
    card.calc.target_aggregates = aggregates;
}

fn resolve_item_damage(
    category: ItemCategory,
    base_level: Option<u8>,
    has_check: bool,
    damages: &[crate::cards::DamageRoll],
    targets: &mut [Target],
    aggregates: &mut Vec<TargetAggregate>,
) {
    // Eligible: not a confirmed miss, and (no check demanded or this
    // target's check already evaluated).
    let eligible: Vec<usize> = targets
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            t.calc.result.hit != Some(false) && (!has_check || t.check_evaluated())
        })
        .map(|(i, _)| i)
        .collect();
    if eligible.is_empty() {
        return;
    }

    for damage in damages {
        let Some(roll) = damage.active_roll() else {
            continue;
        };
        let results = roll.damage_results();
        for &target_index in &eligible {
            let target = &mut targets[target_index];
            for (damage_type, amount) in &results {
                let mut base = *amount as f64;
                if has_check && target.calc.result.check_pass == Some(true) {
                    // Save scaling happens before defense modifiers.
                    let rule = effective_rule(damage.modifier_rule, category, base_level);
                    base = match rule {
                        SaveModifierRule::SaveFullDmg => base,
                        SaveModifierRule::SaveNoDmg => 0.0,
                        SaveModifierRule::SaveHalveDmg => base * 0.5,
                    };
                }

                let mut modifier = 1.0;
                if damage_type.is_some_and(|t| target.immunities.contains(&t)) {
                    modifier = 0.0;
                } else {
                    if damage_type.is_some_and(|t| target.resistances.contains(&t)) {
                        modifier -= 0.5;
                    }
                    if damage_type.is_some_and(|t| target.vulnerabilities.contains(&t)) {
                        modifier += 0.5;
                    }
                }

                let calc = (base * modifier).floor() as i32;
                target.calc.result.dmg = Some(TargetDamage {
                    damage_type: *damage_type,
                    raw: base.floor() as i32,
                    calc,
                });

                let aggregate = aggregate_entry(aggregates, target);
                let dmg = aggregate.dmg.get_or_insert_with(|| AggregateDamage {
                    applied: false,
                    applied_dmg: 0,
                    avoided: None,
                    calc_dmg: 0,
                    calc_hp: aggregate.hp_snapshot.hp,
                    calc_temp: aggregate.hp_snapshot.temp,
                });

                match damage_type {
                    Some(t) if t.is_temp_hp() => {
                        dmg.calc_temp += calc;
                    }
                    Some(t) if t.is_healing() => {
                        apply_heal(dmg, aggregate.hp_snapshot, calc);
                    }
                    _ => {
                        apply_dmg(dmg, aggregate.hp_snapshot, calc);
                    }
                }
            }
        }
    }
}

fn effective_rule(
    rule: Option<SaveModifierRule>,
    category: ItemCategory,
    base_level: Option<u8>,
) -> SaveModifierRule {
    // Zero-tier spells never deal half damage on a pass.
    if category == ItemCategory::Spell && base_level == Some(0) {
        return SaveModifierRule::SaveNoDmg;
    }
    rule.unwrap_or_default()
}

fn aggregate_entry<'a>(
    aggregates: &'a mut Vec<TargetAggregate>,
    target: &Target,
) -> &'a mut TargetAggregate {
    if let Some(index) = aggregates.iter().position(|a| a.uuid == target.uuid) {
        return &mut aggregates[index];
    }
    aggregates.push(TargetAggregate {
        uuid: target.uuid.clone(),
        name: target.name.clone(),
        img: target.img.clone(),
        hp_snapshot: target.hp_snapshot,
        dmg: None,
    });
    let last = aggregates.len() - 1;
    &mut aggregates[last]
}

/// Non-healing damage first consumes the temporary pool, then spills into
/// hit points, clamped to what the entity actually has.
fn apply_dmg(dmg: &mut AggregateDamage, snapshot: HpSnapshot, amount: i32) {
    let max_dmg = snapshot.hp + snapshot.temp;
    let mut remaining = amount.clamp(0, max_dmg);
    if remaining > 0 {
        let temp_dmg = dmg.calc_temp.min(remaining);
        dmg.calc_temp -= temp_dmg;
        remaining -= temp_dmg;
    }
    dmg.calc_dmg += remaining;
    dmg.calc_hp -= remaining;
}

/// Healing raises hit points up to the snapshot maximum.
fn apply_heal(dmg: &mut AggregateDamage, snapshot: HpSnapshot, amount: i32) {
    let max_heal = (snapshot.max - snapshot.hp).max(0);
    let heal = amount.clamp(0, max_heal);
    dmg.calc_dmg -= heal;
    dmg.calc_hp += heal;
}

/// Derive each aggregate's `avoided` flag from the outcomes of every item
/// that could damage it: `Some(true)` when all attacks missed or saves
/// succeeded, `None` while any outcome is pending.
fn derive_avoided(items: &[Item], aggregates: &mut [TargetAggregate]) {
    for aggregate in aggregates.iter_mut() {
        let mut any_pending = false;
        let mut any_threat = false;
        let mut all_avoided = true;

        for item in items {
            if item.damages.is_empty() {
                continue;
            }
            let Some(target) = item.target(&aggregate.uuid) else {
                continue;
            };
            any_threat = true;

            let result = &target.calc.result;
            if item.attack.is_some() && result.hit.is_none() {
                any_pending = true;
                continue;
            }
            if item.check.is_some() && result.check_pass.is_none() {
                any_pending = true;
                continue;
            }

            let avoided_here =
                result.hit == Some(false) || result.check_pass == Some(true);
            if !avoided_here {
                all_avoided = false;
            }
        }

        if let Some(dmg) = &mut aggregate.dmg {
            dmg.avoided = if !any_threat || any_pending {
                None
            } else {
                Some(all_avoided)
            };
        }
    }
}

/// Commit calculated damage for the selected aggregates: the entity's
/// pools are set to the calculated values and `applied_dmg` records the
/// committed amount. Writes are batched one per entity.
pub fn apply_damage(
    card: &mut Card,
    selector: &TargetSelector,
    updates: &mut Vec<EntityUpdate>,
) -> bool {
    commit_damage(card, selector, updates, true)
}

/// Revert committed damage for the selected aggregates back to the hp
/// snapshot taken when targeting happened.
pub fn undo_damage(
    card: &mut Card,
    selector: &TargetSelector,
    updates: &mut Vec<EntityUpdate>,
) -> bool {
    commit_damage(card, selector, updates, false)
}

fn commit_damage(
    card: &mut Card,
    selector: &TargetSelector,
    updates: &mut Vec<EntityUpdate>,
    apply: bool,
) -> bool {
    let mut touched: Vec<Uuid> = Vec::new();
    for aggregate in &mut card.calc.target_aggregates {
        if !selector.matches(&aggregate.uuid) {
            continue;
        }
        let Some(dmg) = &mut aggregate.dmg else {
            continue;
        };
        let (hp, temp) = if apply {
            dmg.applied_dmg = dmg.calc_dmg;
            (dmg.calc_hp, dmg.calc_temp)
        } else {
            dmg.applied_dmg = 0;
            (aggregate.hp_snapshot.hp, aggregate.hp_snapshot.temp)
        };
        dmg.applied = dmg.calc_dmg == dmg.applied_dmg;
        touched.push(aggregate.uuid.clone());
        updates.push(EntityUpdate {
            uuid: aggregate.uuid.clone(),
            patch: EntityPatch::Hp { hp, temp },
        });
    }

    if touched.is_empty() {
        warn!("no aggregate matched the damage selector");
        return false;
    }

    for item in &mut card.items {
        for target in item.targets.iter_mut().flatten() {
            if touched.contains(&target.uuid) {
                target.apply_dmg = apply;
            }
        }
    }
    card.calc.all_dmg_applied = !card.calc.target_aggregates.is_empty()
        && card
            .calc
            .target_aggregates
            .iter()
            .all(|a| a.dmg.as_ref().is_some_and(|d| d.applied));
    true
}

/// Dedup helper for aggregate maps used by callers that batch by entity.
#[must_use]
pub fn group_updates(updates: Vec<EntityUpdate>) -> Vec<EntityUpdate> {
    let mut grouped: Vec<EntityUpdate> = Vec::new();
    let mut field_index: FxHashMap<Uuid, usize> = FxHashMap::default();
    for update in updates {
        match update.patch {
            EntityPatch::Fields(fields) => match field_index.get(&update.uuid) {
                Some(&index) => {
                    if let EntityPatch::Fields(existing) = &mut grouped[index].patch {
                        existing.extend(fields);
                    }
                }
                None => {
                    field_index.insert(update.uuid.clone(), grouped.len());
                    grouped.push(EntityUpdate {
                        uuid: update.uuid,
                        patch: EntityPatch::Fields(fields),
                    });
                }
            },
            patch => grouped.push(EntityUpdate {
                uuid: update.uuid,
                patch,
            }),
        }
    }
    grouped
}
