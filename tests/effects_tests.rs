//! Active-effect applicator tests.

mod common;

use common::*;
use vtt_cards::effects::sync_active_effects;
use vtt_cards::*;

fn poisoned_template() -> EffectTemplate {
    EffectTemplate {
        label: "Poisoned".into(),
        changes: vec![EffectChange {
            key: "attack.disadvantage".into(),
            value: serde_json::json!(true),
        }],
    }
}

/// Item that hit its target (no damage, so the hit alone gates effects).
fn hitting_item(target: Target) -> Item {
    let mut item = bare_item("Item.1", "Ray of Sickness");
    let mut attack = AttackRoll::new(None);
    attack.phase = RollPhase::Result;
    attack.evaluated = Some(eval_const("30"));
    item.attack = Some(attack);
    item.calc.effect_templates = vec![poisoned_template()];
    item.targets = Some(vec![target]);
    item
}

#[test]
fn test_effect_applied_on_hit() {
    let mut store = MemoryStore::new();
    store.add_entity(entity("Token.t", "Tester"));

    let mut card = card_with_items("alice", vec![hitting_item(target_of(&entity("Token.t", "Tester"), false))]);
    recompute(&mut card);

    let message = Uuid::new("Message.1");
    let updates = sync_active_effects(&message, &mut card, &store);
    assert_eq!(updates.len(), 1);
    store.bulk_update(&updates).unwrap();

    let effects = &store.entity(&Uuid::new("Token.t")).unwrap().effects;
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0].label, "Poisoned");
    assert_eq!(
        effects[0].origin,
        Some(OriginKey {
            message: message.clone(),
            item_index: 0,
            effect_index: 0,
        })
    );
    assert!(card.items[0].targets.as_ref().unwrap()[0]
        .calc
        .result
        .applied_active_effects);

    // Second pass: marker matches, nothing to reconcile.
    let updates = sync_active_effects(&message, &mut card, &store);
    assert!(updates.is_empty(), "reapplication must not duplicate");
    assert_eq!(store.entity(&Uuid::new("Token.t")).unwrap().effects.len(), 1);
}

#[test]
fn test_effect_retracted_on_flip() {
    let mut store = MemoryStore::new();
    store.add_entity(entity("Token.t", "Tester"));

    let mut card = card_with_items("alice", vec![hitting_item(target_of(&entity("Token.t", "Tester"), false))]);
    recompute(&mut card);
    let message = Uuid::new("Message.1");
    let updates = sync_active_effects(&message, &mut card, &store);
    store.bulk_update(&updates).unwrap();
    assert_eq!(store.entity(&Uuid::new("Token.t")).unwrap().effects.len(), 1);

    // The attack re-derives into a miss; the outcome flips off.
    card.items[0].attack.as_mut().unwrap().evaluated = Some(eval_const("1"));
    // Give the target an absurd AC so the re-derived roll misses.
    card.items[0].targets.as_mut().unwrap()[0].ac = 30;
    recompute(&mut card);

    let updates = sync_active_effects(&message, &mut card, &store);
    assert_eq!(updates.len(), 1);
    store.bulk_update(&updates).unwrap();
    assert!(
        store.entity(&Uuid::new("Token.t")).unwrap().effects.is_empty(),
        "retraction deletes exactly the derived record"
    );
    assert!(!card.items[0].targets.as_ref().unwrap()[0]
        .calc
        .result
        .applied_active_effects);
}

#[test]
fn test_retraction_leaves_foreign_effects() {
    let mut store = MemoryStore::new();
    let mut tester = entity("Token.t", "Tester");
    // A hand-authored effect with no origin key.
    tester.effects.push(AppliedEffect {
        id: 999,
        label: "Blessed".into(),
        changes: Vec::new(),
        origin: None,
    });
    store.add_entity(tester);

    let mut card = card_with_items("alice", vec![hitting_item(target_of(&entity("Token.t", "Tester"), false))]);
    recompute(&mut card);
    let message = Uuid::new("Message.1");
    let updates = sync_active_effects(&message, &mut card, &store);
    store.bulk_update(&updates).unwrap();
    assert_eq!(store.entity(&Uuid::new("Token.t")).unwrap().effects.len(), 2);

    card.items[0].targets.as_mut().unwrap()[0].ac = 30;
    recompute(&mut card);
    let updates = sync_active_effects(&message, &mut card, &store);
    store.bulk_update(&updates).unwrap();

    let effects = &store.entity(&Uuid::new("Token.t")).unwrap().effects;
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0].label, "Blessed");
}

#[test]
fn test_damage_present_gates_on_apply_confirmation() {
    let mut store = MemoryStore::new();
    store.add_entity(entity("Token.t", "Tester"));

    let mut item = hitting_item(target_of(&entity("Token.t", "Tester"), false));
    item.damages = vec![evaluated_damage("6[poison]")];
    let mut card = card_with_items("alice", vec![item]);
    recompute(&mut card);

    let message = Uuid::new("Message.1");
    // Hit, but damage not committed yet: no effects.
    let updates = sync_active_effects(&message, &mut card, &store);
    assert!(updates.is_empty());

    // Commit the damage; now the effect applies.
    let mut hp_updates = Vec::new();
    apply_damage(&mut card, &TargetSelector::All, &mut hp_updates);
    let updates = sync_active_effects(&message, &mut card, &store);
    assert_eq!(updates.len(), 1);
    store.bulk_update(&updates).unwrap();
    assert_eq!(store.entity(&Uuid::new("Token.t")).unwrap().effects.len(), 1);
}

#[test]
fn test_failed_save_applies_effect() {
    let mut store = MemoryStore::new();
    store.add_entity(entity("Token.t", "Tester"));

    let mut item = bare_item("Item.1", "Hold Person");
    item.check = Some(CheckDef {
        ability: "wis".into(),
        dc: 15,
        skill: None,
        add_save_bonus: true,
        label: None,
    });
    item.calc.effect_templates = vec![poisoned_template()];
    let mut target = target_of(&entity("Token.t", "Tester"), true);
    let check = target.check.as_mut().unwrap();
    check.phase = RollPhase::Result;
    check.evaluated = Some(eval_const("9"));
    item.targets = Some(vec![target]);

    let mut card = card_with_items("alice", vec![item]);
    recompute(&mut card);
    assert_eq!(
        card.items[0].targets.as_ref().unwrap()[0].calc.result.check_pass,
        Some(false)
    );

    let updates = sync_active_effects(&Uuid::new("Message.1"), &mut card, &store);
    assert_eq!(updates.len(), 1);
}

#[test]
fn test_reapply_reuses_record_id() {
    let mut store = MemoryStore::new();
    store.add_entity(entity("Token.t", "Tester"));

    let mut card = card_with_items("alice", vec![hitting_item(target_of(&entity("Token.t", "Tester"), false))]);
    recompute(&mut card);
    let message = Uuid::new("Message.1");
    let updates = sync_active_effects(&message, &mut card, &store);
    store.bulk_update(&updates).unwrap();
    let original_id = store.entity(&Uuid::new("Token.t")).unwrap().effects[0].id;

    // Flip off and on within one reconciliation: the off-flip's record is
    // reused for the on-flip of the other item.
    let mut second_item = hitting_item(target_of(&entity("Token.t", "Tester"), false));
    second_item.uuid = Uuid::new("Item.2");
    card.items[0].targets.as_mut().unwrap()[0].ac = 30;
    card.items.push(second_item);
    recompute(&mut card);

    let updates = sync_active_effects(&message, &mut card, &store);
    store.bulk_update(&updates).unwrap();
    let effects = &store.entity(&Uuid::new("Token.t")).unwrap().effects;
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0].id, original_id, "update in place, not delete+create");
    assert_eq!(
        effects[0].origin.as_ref().map(|o| o.item_index),
        Some(1),
        "reused record now belongs to the second item"
    );
}
