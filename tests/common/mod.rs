//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use vtt_cards::*;

/// An entity snapshot with sensible defaults.
pub fn entity(uuid: &str, name: &str) -> EntityRecord {
    EntityRecord {
        uuid: Uuid::new(uuid),
        name: name.to_string(),
        img: None,
        ac: 12,
        hp: 20,
        temp_hp: 0,
        max_hp: 20,
        immunities: Vec::new(),
        resistances: Vec::new(),
        vulnerabilities: Vec::new(),
        disposition: Disposition::Neutral,
        traits: EntityTraits::default(),
        save_bonuses: Default::default(),
        fields: Default::default(),
        effects: Vec::new(),
        owner: None,
        position: None,
    }
}

pub fn user(id: &str, active: bool, elevated: bool) -> UserInfo {
    UserInfo {
        id: ClientId::new(id),
        active,
        elevated,
    }
}

/// Evaluate a dice-free formula; constants make the result deterministic.
pub fn eval_const(formula: &str) -> EvaluatedRoll {
    let mut rng = DiceRng::new(0);
    DiceExpression::parse(formula)
        .expect("formula parses")
        .evaluate(&mut rng)
}

/// A bare item with nothing attached.
pub fn bare_item(uuid: &str, name: &str) -> Item {
    Item {
        uuid: Uuid::new(uuid),
        name: name.to_string(),
        img: None,
        category: ItemCategory::Other,
        base_level: None,
        selected_level: None,
        attack: None,
        damages: Vec::new(),
        check: None,
        targets: None,
        target_definition: TargetDefinition::default(),
        consume_resources: Vec::new(),
        calc: ItemCalc::default(),
    }
}

/// A target snapshot built straight from an entity record.
pub fn target_of(entity: &EntityRecord, with_check: bool) -> Target {
    Target::from_entity(entity, with_check)
}

/// A card owned by the given client with the given items.
pub fn card_with_items(author: &str, items: Vec<Item>) -> Card {
    let mut card = Card::new(ClientId::new(author));
    card.items = items;
    card
}

/// A damage roll whose normal result is already evaluated from a
/// dice-free formula.
pub fn evaluated_damage(formula: &str) -> DamageRoll {
    let expression = DiceExpression::parse(formula).expect("formula parses");
    let mut damage = DamageRoll::new(expression);
    damage.phase = RollPhase::Result;
    damage.normal = Some(eval_const(formula));
    damage
}
