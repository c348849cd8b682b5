//! Resource consumption ledger tests.

mod common;

use common::*;
use vtt_cards::resources::{can_change_level, change_level, set_manual, should_apply, sync};
use vtt_cards::*;

fn resource(uuid: &str, path: &str, original: i64, after: AutoconsumeAfter) -> ConsumeResource {
    ConsumeResource {
        uuid: Uuid::new(uuid),
        path: path.to_string(),
        amount: 1,
        original,
        autoconsume_after: after,
        action: None,
        applied: false,
        slot_scaled: false,
    }
}

#[test]
fn test_toggle_applies_and_reverts() {
    let mut item = bare_item("Item.1", "Wand");
    item.consume_resources = vec![ConsumeResource {
        amount: 1,
        ..resource("Actor.a", "charges.value", 3, AutoconsumeAfter::Init)
    }];
    let mut card = card_with_items("alice", vec![item]);

    // Init applies immediately
    let updates = sync(&mut card);
    assert_eq!(updates.len(), 1);
    match &updates[0].patch {
        EntityPatch::Fields(fields) => {
            assert_eq!(fields[0], ("charges.value".to_string(), 2));
        }
        other => panic!("expected fields patch, got {:?}", other),
    }
    assert!(card.items[0].consume_resources[0].applied);

    // Repeated sync without changes is a no-op
    let updates = sync(&mut card);
    assert!(updates.is_empty(), "apply must not deduct twice");

    // Manual undo restores the original
    assert!(set_manual(&mut card, Some(0), Some(0), ConsumeAction::Undo));
    let updates = sync(&mut card);
    assert_eq!(updates.len(), 1);
    match &updates[0].patch {
        EntityPatch::Fields(fields) => {
            assert_eq!(fields[0], ("charges.value".to_string(), 3));
        }
        other => panic!("expected fields patch, got {:?}", other),
    }
    assert!(!card.items[0].consume_resources[0].applied);
}

#[test]
fn test_deduction_floors_at_zero() {
    let mut item = bare_item("Item.1", "Wand");
    item.consume_resources = vec![ConsumeResource {
        amount: 5,
        ..resource("Actor.a", "charges.value", 2, AutoconsumeAfter::Init)
    }];
    let mut card = card_with_items("alice", vec![item]);

    let updates = sync(&mut card);
    match &updates[0].patch {
        EntityPatch::Fields(fields) => assert_eq!(fields[0].1, 0),
        other => panic!("expected fields patch, got {:?}", other),
    }
}

#[test]
fn test_autoconsume_trigger_matrix() {
    let mut item = bare_item("Item.1", "Bow");
    item.attack = Some(AttackRoll::new(None));
    item.damages = vec![DamageRoll::new(DiceExpression::parse("1d8").unwrap())];

    let attack_resource = resource("Actor.a", "arrows", 10, AutoconsumeAfter::Attack);
    let damage_resource = resource("Actor.a", "oil", 2, AutoconsumeAfter::Damage);

    // Nothing evaluated: neither fires
    assert!(!should_apply(&attack_resource, &item));
    assert!(!should_apply(&damage_resource, &item));

    // Attack evaluated: attack trigger fires
    item.attack.as_mut().unwrap().evaluated = Some(eval_const("15"));
    assert!(should_apply(&attack_resource, &item));
    assert!(!should_apply(&damage_resource, &item));

    // Damage evaluated: damage trigger fires
    item.damages[0].normal = Some(eval_const("4"));
    assert!(should_apply(&damage_resource, &item));
}

#[test]
fn test_template_and_check_triggers() {
    let mut item = bare_item("Item.1", "Fireball");
    let template_resource = resource("Actor.a", "slots", 2, AutoconsumeAfter::TemplatePlaced);
    assert!(!should_apply(&template_resource, &item));
    item.target_definition.created_template = Some(Uuid::new("Template.1"));
    assert!(should_apply(&template_resource, &item));

    let check_resource = resource("Actor.a", "slots", 2, AutoconsumeAfter::Check);
    assert!(!should_apply(&check_resource, &item));
    let mut target = target_of(&entity("Token.t", "Tester"), true);
    target.check.as_mut().unwrap().evaluated = Some(eval_const("12"));
    item.targets = Some(vec![target]);
    assert!(should_apply(&check_resource, &item));
}

#[test]
fn test_manual_override_beats_trigger() {
    let mut item = bare_item("Item.1", "Bow");
    item.attack = Some(AttackRoll::new(None));
    item.attack.as_mut().unwrap().evaluated = Some(eval_const("15"));

    let mut applied = resource("Actor.a", "arrows", 10, AutoconsumeAfter::Attack);
    applied.action = Some(ConsumeAction::Undo);
    assert!(
        !should_apply(&applied, &item),
        "manual undo wins over a fired trigger"
    );

    let mut pending = resource("Actor.a", "arrows", 10, AutoconsumeAfter::Attack);
    pending.action = Some(ConsumeAction::ManualApply);
    item.attack.as_mut().unwrap().evaluated = None;
    assert!(
        should_apply(&pending, &item),
        "manual apply wins over an unfired trigger"
    );
}

#[test]
fn test_wildcard_manual_selection() {
    let mut first = bare_item("Item.1", "Wand");
    first.consume_resources = vec![
        resource("Actor.a", "a", 1, AutoconsumeAfter::Attack),
        resource("Actor.a", "b", 1, AutoconsumeAfter::Attack),
    ];
    let mut second = bare_item("Item.2", "Staff");
    second.consume_resources = vec![resource("Actor.a", "c", 1, AutoconsumeAfter::Attack)];
    let mut card = card_with_items("alice", vec![first, second]);

    assert!(set_manual(&mut card, None, None, ConsumeAction::ManualApply));
    for item in &card.items {
        for consume in &item.consume_resources {
            assert_eq!(consume.action, Some(ConsumeAction::ManualApply));
        }
    }

    // Setting the same action again reports no change
    assert!(!set_manual(&mut card, None, None, ConsumeAction::ManualApply));
}

#[test]
fn test_updates_batched_per_record() {
    let mut item = bare_item("Item.1", "Ritual");
    item.consume_resources = vec![
        resource("Actor.a", "x", 4, AutoconsumeAfter::Init),
        resource("Actor.a", "y", 4, AutoconsumeAfter::Init),
        resource("Actor.b", "z", 4, AutoconsumeAfter::Init),
    ];
    let mut card = card_with_items("alice", vec![item]);

    let updates = sync(&mut card);
    // Two records touched, two update entries, the first carrying both
    // field writes for Actor.a.
    assert_eq!(updates.len(), 2);
    let actor_a = updates
        .iter()
        .find(|u| u.uuid == Uuid::new("Actor.a"))
        .unwrap();
    match &actor_a.patch {
        EntityPatch::Fields(fields) => assert_eq!(fields.len(), 2),
        other => panic!("expected fields patch, got {:?}", other),
    }
}

#[test]
fn test_level_change_recaptures_slot() {
    let mut store = MemoryStore::new();
    let mut caster = entity("Actor.caster", "Caster");
    caster.fields.insert("spells.slot1.value".into(), 4);
    caster.fields.insert("spells.slot2.value".into(), 3);
    store.add_entity(caster);

    let mut item = bare_item("Item.1", "Burning Hands");
    item.category = ItemCategory::Spell;
    item.base_level = Some(1);
    item.selected_level = Some(1);
    item.consume_resources = vec![ConsumeResource {
        slot_scaled: true,
        ..resource(
            "Actor.caster",
            "spells.slot1.value",
            4,
            AutoconsumeAfter::Init,
        )
    }];

    assert!(can_change_level(&item));
    assert!(change_level(&mut item, 2, &store));
    assert_eq!(item.selected_level, Some(2));
    assert_eq!(item.consume_resources[0].path, "spells.slot2.value");
    assert_eq!(item.consume_resources[0].original, 3);
}

#[test]
fn test_level_locked_after_application() {
    let store = MemoryStore::new();
    let mut item = bare_item("Item.1", "Burning Hands");
    item.base_level = Some(1);
    item.selected_level = Some(1);
    let mut consumed = resource(
        "Actor.caster",
        "spells.slot1.value",
        4,
        AutoconsumeAfter::Init,
    );
    consumed.applied = true;
    item.consume_resources = vec![consumed];

    assert!(!can_change_level(&item));
    assert!(!change_level(&mut item, 2, &store));
    assert_eq!(item.selected_level, Some(1));
}

#[test]
fn test_level_locked_after_final_roll() {
    let store = MemoryStore::new();
    let mut item = bare_item("Item.1", "Scorching Ray");
    item.base_level = Some(2);
    item.selected_level = Some(2);
    item.attack = Some(AttackRoll::new(None));
    item.attack.as_mut().unwrap().evaluated = Some(eval_const("15"));

    assert!(!can_change_level(&item));
    assert!(!change_level(&mut item, 3, &store));
}
