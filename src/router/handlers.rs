//! Built-in card actions.
//!
//! One entry per interaction the card UI can produce, in the same order
//! the source table scans them: attack, damage and check rolls with their
//! bonus/mode variants, template placement, level selection, resource
//! overrides, and the elevated-only damage commits.

use tracing::warn;

use crate::cards::{
    advance, bonus_key, Card, ConsumeAction, DamageRoll, PhaseOutcome, RollPhase, TargetCheck,
};
use crate::core::{InteractionError, Uuid};
use crate::dice::{
    critical_bonus, set_roll_mode, DamageMode, DiceExpression, DiceTerm, Keep, RollMode, Term,
};
use crate::resolution::{self, TargetSelector};
use crate::resources;
use crate::store::EntityTraits;
use crate::targeting;

use super::{
    ActionCtx, ActionEntry, ActionRouter, Command, ModeShift, Mutation, PermissionCtx,
    PermissionRequest,
};

/// Install the built-in entries on a router.
pub fn register_builtin(router: &mut ActionRouter) {
    router.register(ActionEntry::new(
        |c| matches!(c, Command::ItemAttack { .. }),
        actor_permission,
        |ctx, c| match c {
            Command::ItemAttack { item } => attack_advance(ctx, *item),
            _ => Ok(Mutation::Unchanged),
        },
    ));
    router.register(ActionEntry::new(
        |c| matches!(c, Command::ItemAttackBonus { .. }),
        actor_permission,
        |ctx, c| match c {
            Command::ItemAttackBonus { item } => attack_bonus(ctx, *item),
            _ => Ok(Mutation::Unchanged),
        },
    ));
    router.register(ActionEntry::new(
        |c| matches!(c, Command::ItemAttackMode { .. }),
        actor_permission,
        |ctx, c| match c {
            Command::ItemAttackMode { item, shift } => attack_mode(ctx, *item, *shift),
            _ => Ok(Mutation::Unchanged),
        },
    ));

    router.register(ActionEntry::new(
        |c| matches!(c, Command::ItemDamage { .. }),
        actor_permission,
        |ctx, c| match c {
            Command::ItemDamage { item, damage } => damage_advance(ctx, *item, *damage),
            _ => Ok(Mutation::Unchanged),
        },
    ));
    router.register(ActionEntry::new(
        |c| matches!(c, Command::ItemDamageBonus { .. }),
        actor_permission,
        |ctx, c| match c {
            Command::ItemDamageBonus { item, damage } => damage_bonus(ctx, *item, *damage),
            _ => Ok(Mutation::Unchanged),
        },
    ));
    router.register(ActionEntry::new(
        |c| matches!(c, Command::ItemDamageMode { .. }),
        actor_permission,
        |ctx, c| match c {
            Command::ItemDamageMode {
                item,
                damage,
                shift,
            } => damage_mode(ctx, *item, *damage, *shift),
            _ => Ok(Mutation::Unchanged),
        },
    ));

    router.register(ActionEntry::new(
        |c| matches!(c, Command::ItemCheck { .. }),
        check_permission,
        |ctx, c| match c {
            Command::ItemCheck { item, target } => check_advance(ctx, *item, target.clone()),
            _ => Ok(Mutation::Unchanged),
        },
    ));
    router.register(ActionEntry::new(
        |c| matches!(c, Command::ItemCheckBonus { .. }),
        check_permission,
        |ctx, c| match c {
            Command::ItemCheckBonus { item, target } => check_bonus(ctx, *item, target.clone()),
            _ => Ok(Mutation::Unchanged),
        },
    ));
    router.register(ActionEntry::new(
        |c| matches!(c, Command::ItemCheckMode { .. }),
        check_permission,
        |ctx, c| match c {
            Command::ItemCheckMode {
                item,
                target,
                shift,
            } => check_mode(ctx, *item, target.clone(), *shift),
            _ => Ok(Mutation::Unchanged),
        },
    ));

    router.register(ActionEntry::new(
        |c| matches!(c, Command::ItemTemplate { .. }),
        |ctx| PermissionRequest {
            owner_of: ctx.card.actor.clone(),
            requires_authorship: true,
            run_local_only: true,
            ..PermissionRequest::default()
        },
        |ctx, c| match c {
            Command::ItemTemplate { item } => place_template(ctx, *item),
            _ => Ok(Mutation::Unchanged),
        },
    ));

    router.register(ActionEntry::new(
        |c| matches!(c, Command::ItemLevel { .. }),
        actor_permission,
        |ctx, c| match c {
            Command::ItemLevel { item } => change_level(ctx, *item),
            _ => Ok(Mutation::Unchanged),
        },
    ));

    router.register(ActionEntry::new(
        |c| matches!(c, Command::ApplyConsumeResource { .. }),
        authorship_permission,
        |ctx, c| match c {
            Command::ApplyConsumeResource { item, resource } => Ok(mutation(
                resources::set_manual(
                    ctx.card,
                    item.index(),
                    resource.index(),
                    ConsumeAction::ManualApply,
                ),
            )),
            _ => Ok(Mutation::Unchanged),
        },
    ));
    router.register(ActionEntry::new(
        |c| matches!(c, Command::UndoConsumeResource { .. }),
        authorship_permission,
        |ctx, c| match c {
            Command::UndoConsumeResource { item, resource } => Ok(mutation(
                resources::set_manual(
                    ctx.card,
                    item.index(),
                    resource.index(),
                    ConsumeAction::Undo,
                ),
            )),
            _ => Ok(Mutation::Unchanged),
        },
    ));

    router.register(ActionEntry::new(
        |c| matches!(c, Command::ApplyDamage { .. }),
        elevated_permission,
        |ctx, c| match c {
            Command::ApplyDamage { target } => Ok(mutation(resolution::apply_damage(
                ctx.card,
                target,
                ctx.updates,
            ))),
            _ => Ok(Mutation::Unchanged),
        },
    ));
    router.register(ActionEntry::new(
        |c| matches!(c, Command::UndoDamage { .. }),
        elevated_permission,
        |ctx, c| match c {
            Command::UndoDamage { target } => Ok(mutation(resolution::undo_damage(
                ctx.card,
                target,
                ctx.updates,
            ))),
            _ => Ok(Mutation::Unchanged),
        },
    ));
}

fn actor_permission(ctx: &PermissionCtx<'_>) -> PermissionRequest {
    PermissionRequest {
        owner_of: ctx.card.actor.clone(),
        ..PermissionRequest::default()
    }
}

/// A target rolls its own save: ownership of the *target* entity gates
/// the check actions.
fn check_permission(ctx: &PermissionCtx<'_>) -> PermissionRequest {
    let target = match ctx.command {
        Command::ItemCheck { target, .. }
        | Command::ItemCheckBonus { target, .. }
        | Command::ItemCheckMode { target, .. } => Some(target.clone()),
        _ => None,
    };
    PermissionRequest {
        owner_of: target,
        ..PermissionRequest::default()
    }
}

fn authorship_permission(_ctx: &PermissionCtx<'_>) -> PermissionRequest {
    PermissionRequest {
        requires_authorship: true,
        ..PermissionRequest::default()
    }
}

fn elevated_permission(_ctx: &PermissionCtx<'_>) -> PermissionRequest {
    PermissionRequest {
        elevated: true,
        ..PermissionRequest::default()
    }
}

fn mutation(changed: bool) -> Mutation {
    if changed {
        Mutation::Changed
    } else {
        Mutation::Unchanged
    }
}

/// Build the d20 term for a roll: die count and keep modifier from the
/// advantage mode, reroll/minimum modifiers from the rolling entity's
/// traits.
fn d20_term(mode: RollMode, traits: Option<&EntityTraits>, is_check: bool) -> DiceTerm {
    let mut term = match mode {
        RollMode::Normal => DiceTerm::new(1, 20),
        RollMode::Advantage => DiceTerm::new(2, 20).with_keep(Keep::Highest(1)),
        RollMode::Disadvantage => DiceTerm::new(2, 20).with_keep(Keep::Lowest(1)),
    };
    if let Some(traits) = traits {
        if traits.lucky {
            term.reroll_ones = true;
        }
        if is_check && traits.reliable && traits.proficiency > 0 {
            term.minimum = Some(10);
        }
    }
    term
}

/// Parse the user bonus, failing the commit when it is not a valid dice
/// expression. An empty bonus contributes nothing.
fn parsed_user_bonus(user_bonus: &str) -> Result<Option<DiceExpression>, InteractionError> {
    let trimmed = user_bonus.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    DiceExpression::parse(trimmed)
        .map(Some)
        .map_err(|_| InteractionError::warn(format!("invalid bonus formula `{}`", trimmed)))
}

fn input_text(ctx: &ActionCtx<'_>) -> String {
    ctx.input
        .as_ref()
        .and_then(|v| v.as_text())
        .unwrap_or_default()
        .to_string()
}

// --- attack ---

fn attack_advance(ctx: &mut ActionCtx<'_>, item_index: usize) -> Result<Mutation, InteractionError> {
    let Some(attack) = ctx
        .card
        .items
        .get_mut(item_index)
        .and_then(|i| i.attack.as_mut())
    else {
        return Ok(Mutation::Unchanged);
    };
    let old_phase = attack.phase;

    match advance(&mut attack.phase, ctx.click.shift) {
        PhaseOutcome::Unchanged => Ok(Mutation::Unchanged),
        PhaseOutcome::Moved => Ok(Mutation::Changed),
        PhaseOutcome::Evaluate => match evaluate_attack(ctx, item_index)? {
            true => Ok(Mutation::Changed),
            false => {
                // Retarget prompt cancelled: the roll never happened, the
                // phase goes back to where it was.
                if let Some(attack) = ctx
                    .card
                    .items
                    .get_mut(item_index)
                    .and_then(|i| i.attack.as_mut())
                {
                    attack.phase = old_phase;
                }
                Ok(Mutation::Unchanged)
            }
        },
    }
}

fn attack_bonus(ctx: &mut ActionCtx<'_>, item_index: usize) -> Result<Mutation, InteractionError> {
    let input = input_text(ctx);
    let Some(attack) = ctx
        .card
        .items
        .get_mut(item_index)
        .and_then(|i| i.attack.as_mut())
    else {
        return Ok(Mutation::Unchanged);
    };
    if attack.is_evaluated() || attack.phase.is_result() {
        return Ok(Mutation::Unchanged);
    }

    let old_phase = attack.phase;
    let old_bonus = attack.user_bonus.clone();
    attack.user_bonus = input;

    if let Some(key) = ctx.key {
        match bonus_key(&mut attack.phase, key) {
            PhaseOutcome::Evaluate => {
                if evaluate_attack(ctx, item_index)? {
                    return Ok(Mutation::Changed);
                }
                if let Some(attack) = ctx
                    .card
                    .items
                    .get_mut(item_index)
                    .and_then(|i| i.attack.as_mut())
                {
                    attack.phase = old_phase;
                }
                return Ok(Mutation::Unchanged);
            }
            PhaseOutcome::Moved | PhaseOutcome::Unchanged => {}
        }
    }

    let Some(attack) = ctx.card.items.get(item_index).and_then(|i| i.attack.as_ref()) else {
        return Ok(Mutation::Unchanged);
    };
    if attack.user_bonus != old_bonus || attack.phase != old_phase {
        Ok(Mutation::Changed)
    } else {
        Ok(Mutation::Unchanged)
    }
}

fn attack_mode(
    ctx: &mut ActionCtx<'_>,
    item_index: usize,
    shift: ModeShift,
) -> Result<Mutation, InteractionError> {
    let Some(attack) = ctx
        .card
        .items
        .get_mut(item_index)
        .and_then(|i| i.attack.as_mut())
    else {
        return Ok(Mutation::Unchanged);
    };

    let mut delta = shift.delta();
    if ctx.click.shift {
        delta *= 2;
    }
    let new_mode = attack.mode.stepped(delta);
    if new_mode == attack.mode {
        return Ok(Mutation::Unchanged);
    }
    attack.mode = new_mode;

    if ctx.click.shift && !attack.is_evaluated() {
        evaluate_attack(ctx, item_index)?;
    }

    let Some(attack) = ctx
        .card
        .items
        .get_mut(item_index)
        .and_then(|i| i.attack.as_mut())
    else {
        return Ok(Mutation::Changed);
    };
    if let Some(roll) = attack.evaluated.as_mut() {
        set_roll_mode(roll, new_mode, ctx.rng);
    }
    Ok(Mutation::Changed)
}

/// Roll the attack. Returns `false` when a required retarget confirmation
/// was cancelled (no roll happened).
fn evaluate_attack(ctx: &mut ActionCtx<'_>, item_index: usize) -> Result<bool, InteractionError> {
    let Some(item) = ctx.card.items.get(item_index) else {
        return Ok(false);
    };
    let Some(attack) = &item.attack else {
        return Ok(false);
    };
    if attack.is_evaluated() {
        return Ok(true);
    }

    // The selection may have drifted since targeting; a terminal roll
    // must confirm the new target set first.
    if targeting::can_change_targets(item) && targeting::selection_changed(item, ctx.selection) {
        let current: Vec<Uuid> = item
            .targets
            .iter()
            .flatten()
            .map(|t| t.uuid.clone())
            .collect();
        let Some(confirmed) = ctx.prompt.confirm_targets(&current, ctx.selection) else {
            return Ok(false);
        };
        let item = &mut ctx.card.items[item_index];
        targeting::set_targets(item, &confirmed, ctx.store);
    }

    let traits = ctx
        .card
        .actor
        .as_ref()
        .and_then(|uuid| ctx.store.entity(uuid))
        .map(|e| e.traits);

    let item = &mut ctx.card.items[item_index];
    let Some(attack) = item.attack.as_mut() else {
        return Ok(false);
    };

    let mut expression = DiceExpression {
        terms: [Term::Dice(d20_term(attack.mode, traits.as_ref(), false))]
            .into_iter()
            .collect(),
    };
    if let Some(bonus) = &attack.bonus {
        expression = expression.merged(bonus);
    }
    if let Some(user_bonus) = parsed_user_bonus(&attack.user_bonus)? {
        expression = expression.merged(&user_bonus);
    }

    attack.evaluated = Some(expression.evaluate(ctx.rng));
    attack.phase = RollPhase::Result;
    Ok(true)
}

// --- damage ---

fn damage_advance(
    ctx: &mut ActionCtx<'_>,
    item_index: usize,
    damage_index: usize,
) -> Result<Mutation, InteractionError> {
    let Some(damage) = get_damage_mut(ctx.card, item_index, damage_index) else {
        return Ok(Mutation::Unchanged);
    };
    match advance(&mut damage.phase, ctx.click.shift) {
        PhaseOutcome::Unchanged => Ok(Mutation::Unchanged),
        PhaseOutcome::Moved => Ok(Mutation::Changed),
        PhaseOutcome::Evaluate => {
            evaluate_damage(ctx, item_index, damage_index)?;
            Ok(Mutation::Changed)
        }
    }
}

fn damage_bonus(
    ctx: &mut ActionCtx<'_>,
    item_index: usize,
    damage_index: usize,
) -> Result<Mutation, InteractionError> {
    let input = input_text(ctx);
    let Some(damage) = get_damage_mut(ctx.card, item_index, damage_index) else {
        return Ok(Mutation::Unchanged);
    };
    if damage.normal.is_some() || damage.phase.is_result() {
        return Ok(Mutation::Unchanged);
    }

    let old_phase = damage.phase;
    let old_bonus = damage.user_bonus.clone();
    damage.user_bonus = input;

    if let Some(key) = ctx.key {
        match bonus_key(&mut damage.phase, key) {
            PhaseOutcome::Evaluate => {
                evaluate_damage(ctx, item_index, damage_index)?;
                return Ok(Mutation::Changed);
            }
            PhaseOutcome::Moved | PhaseOutcome::Unchanged => {}
        }
    }

    let Some(damage) = get_damage_mut(ctx.card, item_index, damage_index) else {
        return Ok(Mutation::Unchanged);
    };
    if damage.user_bonus != old_bonus || damage.phase != old_phase {
        Ok(Mutation::Changed)
    } else {
        Ok(Mutation::Unchanged)
    }
}

fn damage_mode(
    ctx: &mut ActionCtx<'_>,
    item_index: usize,
    damage_index: usize,
    shift: ModeShift,
) -> Result<Mutation, InteractionError> {
    let Some(damage) = get_damage_mut(ctx.card, item_index, damage_index) else {
        return Ok(Mutation::Unchanged);
    };
    let new_mode = damage.mode.stepped(shift.delta());
    if new_mode == damage.mode {
        return Ok(Mutation::Unchanged);
    }
    damage.mode = new_mode;

    // Switching an already-rolled damage to critical rolls the missing
    // bonus dice right away.
    let needs_roll = ctx.click.shift
        || (damage.normal.is_some()
            && damage.mode == DamageMode::Critical
            && damage.critical.is_none());
    if needs_roll {
        evaluate_damage(ctx, item_index, damage_index)?;
    }
    Ok(Mutation::Changed)
}

fn evaluate_damage(
    ctx: &mut ActionCtx<'_>,
    item_index: usize,
    damage_index: usize,
) -> Result<(), InteractionError> {
    let Some(item) = ctx.card.items.get(item_index) else {
        return Ok(());
    };
    let upcast_levels = item.upcast_levels();
    let Some(damage) = item.damages.get(damage_index) else {
        return Ok(());
    };
    let user_bonus = parsed_user_bonus(&damage.user_bonus)?;

    let Some(damage) = get_damage_mut(ctx.card, item_index, damage_index) else {
        return Ok(());
    };
    damage.phase = RollPhase::Result;

    match damage.mode {
        DamageMode::Critical => {
            if damage.critical.is_some() {
                return Ok(());
            }
            if damage.normal.is_none() {
                let mut expression = damage.expression(upcast_levels);
                if let Some(user_bonus) = &user_bonus {
                    expression = expression.merged(user_bonus);
                    expression.inherit_damage_types();
                }
                damage.normal = Some(expression.evaluate(ctx.rng));
            }
            let Some(normal) = damage.normal.as_ref() else {
                return Ok(());
            };
            // Only the bonus dice are new; the normal portion keeps its
            // already-rendered results.
            let bonus = critical_bonus(&normal.expression()).evaluate(ctx.rng);
            damage.critical = Some(normal.merged(&bonus));
            Ok(())
        }
        DamageMode::Normal => {
            if damage.normal.is_some() {
                return Ok(());
            }
            let mut expression = damage.expression(upcast_levels);
            if let Some(user_bonus) = &user_bonus {
                expression = expression.merged(user_bonus);
                expression.inherit_damage_types();
            }
            let roll = expression.evaluate(ctx.rng);
            let pure_restoration = !roll.damage_results().is_empty()
                && roll
                    .damage_results()
                    .iter()
                    .all(|(t, _)| t.is_some_and(|t| t.is_healing() || t.is_temp_hp()));
            damage.normal = Some(roll);

            // Healing very rarely gets vetoed, so it commits immediately.
            if pure_restoration {
                let targets: Vec<Uuid> = ctx.card.items[item_index]
                    .targets
                    .iter()
                    .flatten()
                    .map(|t| t.uuid.clone())
                    .collect();
                if !targets.is_empty() {
                    resolution::recompute(ctx.card);
                    for uuid in targets {
                        resolution::apply_damage(
                            ctx.card,
                            &TargetSelector::One(uuid),
                            ctx.updates,
                        );
                    }
                }
            }
            Ok(())
        }
    }
}

fn get_damage_mut<'a>(
    card: &'a mut Card,
    item_index: usize,
    damage_index: usize,
) -> Option<&'a mut DamageRoll> {
    card.items.get_mut(item_index)?.damages.get_mut(damage_index)
}

// --- check ---

fn check_advance(
    ctx: &mut ActionCtx<'_>,
    item_index: usize,
    target_uuid: Uuid,
) -> Result<Mutation, InteractionError> {
    let Some(check) = get_check_mut(ctx.card, item_index, &target_uuid) else {
        return Ok(Mutation::Unchanged);
    };
    if check.phase.is_result() {
        return Ok(Mutation::Unchanged);
    }
    match advance(&mut check.phase, ctx.click.shift) {
        PhaseOutcome::Unchanged => Ok(Mutation::Unchanged),
        PhaseOutcome::Moved => Ok(Mutation::Changed),
        PhaseOutcome::Evaluate => {
            evaluate_check(ctx, item_index, &target_uuid)?;
            Ok(Mutation::Changed)
        }
    }
}

fn check_bonus(
    ctx: &mut ActionCtx<'_>,
    item_index: usize,
    target_uuid: Uuid,
) -> Result<Mutation, InteractionError> {
    let input = input_text(ctx);
    let Some(check) = get_check_mut(ctx.card, item_index, &target_uuid) else {
        return Ok(Mutation::Unchanged);
    };
    if check.phase.is_result() {
        return Ok(Mutation::Unchanged);
    }

    let old_phase = check.phase;
    let old_bonus = check.user_bonus.clone();
    check.user_bonus = input;

    if let Some(key) = ctx.key {
        match bonus_key(&mut check.phase, key) {
            PhaseOutcome::Evaluate => {
                evaluate_check(ctx, item_index, &target_uuid)?;
                return Ok(Mutation::Changed);
            }
            PhaseOutcome::Moved | PhaseOutcome::Unchanged => {}
        }
    }

    let Some(check) = get_check_mut(ctx.card, item_index, &target_uuid) else {
        return Ok(Mutation::Unchanged);
    };
    if check.user_bonus != old_bonus || check.phase != old_phase {
        Ok(Mutation::Changed)
    } else {
        Ok(Mutation::Unchanged)
    }
}

fn check_mode(
    ctx: &mut ActionCtx<'_>,
    item_index: usize,
    target_uuid: Uuid,
    shift: ModeShift,
) -> Result<Mutation, InteractionError> {
    let Some(check) = get_check_mut(ctx.card, item_index, &target_uuid) else {
        return Ok(Mutation::Unchanged);
    };

    let mut delta = shift.delta();
    if ctx.click.shift {
        delta *= 2;
    }
    let new_mode = check.mode.stepped(delta);
    if new_mode == check.mode {
        return Ok(Mutation::Unchanged);
    }
    check.mode = new_mode;

    if let Some(roll) = check.evaluated.as_mut() {
        set_roll_mode(roll, new_mode, ctx.rng);
    }
    Ok(Mutation::Changed)
}

fn evaluate_check(
    ctx: &mut ActionCtx<'_>,
    item_index: usize,
    target_uuid: &Uuid,
) -> Result<(), InteractionError> {
    let Some(item) = ctx.card.items.get(item_index) else {
        return Ok(());
    };
    let Some(check_def) = item.check.clone() else {
        warn!(item = item_index, "no check found");
        return Ok(());
    };
    let Some(target) = item.target(target_uuid) else {
        return Ok(());
    };
    if target.check_evaluated() {
        return Ok(());
    }

    let Some(entity) = ctx.store.entity(target_uuid) else {
        warn!(%target_uuid, "check target cannot be resolved");
        return Ok(());
    };

    let Some(check) = get_check_mut(ctx.card, item_index, target_uuid) else {
        return Ok(());
    };
    let user_bonus = parsed_user_bonus(&check.user_bonus)?;

    let mut expression = DiceExpression {
        terms: [Term::Dice(d20_term(check.mode, Some(&entity.traits), true))]
            .into_iter()
            .collect(),
    };
    if check_def.add_save_bonus {
        let bonus = entity.save_bonus(&check_def.ability);
        if bonus != 0 {
            expression = expression.merged(&DiceExpression::constant(bonus));
        }
    }
    if let Some(user_bonus) = &user_bonus {
        expression = expression.merged(user_bonus);
    }

    check.evaluated = Some(expression.evaluate(ctx.rng));
    check.phase = RollPhase::Result;
    Ok(())
}

fn get_check_mut<'a>(
    card: &'a mut Card,
    item_index: usize,
    target_uuid: &Uuid,
) -> Option<&'a mut TargetCheck> {
    card.items
        .get_mut(item_index)?
        .target_mut(target_uuid)?
        .check
        .as_mut()
}

// --- template / level / misc ---

fn place_template(ctx: &mut ActionCtx<'_>, item_index: usize) -> Result<Mutation, InteractionError> {
    let Some(item) = ctx.card.items.get(item_index) else {
        return Ok(Mutation::Unchanged);
    };
    if !item.target_definition.has_aoe() || !targeting::can_change_targets(item) {
        return Ok(Mutation::Unchanged);
    }
    // Placement itself is canvas work; the dispatch result carries the
    // request back to the UI layer.
    *ctx.template_preview = Some(item_index);
    Ok(Mutation::Unchanged)
}

fn change_level(ctx: &mut ActionCtx<'_>, item_index: usize) -> Result<Mutation, InteractionError> {
    let Some(level) = ctx.input.as_ref().and_then(|v| v.as_number()) else {
        return Ok(Mutation::Unchanged);
    };
    if !(0.0..=255.0).contains(&level) {
        return Err(InteractionError::warn(format!("invalid level `{}`", level)));
    }
    let Some(item) = ctx.card.items.get_mut(item_index) else {
        return Ok(Mutation::Unchanged);
    };
    Ok(mutation(resources::change_level(
        item,
        level as u8,
        ctx.store,
    )))
}
