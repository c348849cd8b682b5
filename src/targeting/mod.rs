//! Targeting: manual selection and area templates.
//!
//! Manual targeting diffs the user's current selection against the item's
//! target list; a changed selection demands a re-target confirmation
//! before a terminal roll may proceed. Area templates derive the target
//! set geometrically and re-derive it whenever the template moves.

mod shape;

pub use shape::{Point, TemplateAnchor, TemplateShape};

use crate::cards::{Item, Target, TargetKind};
use crate::store::{Disposition, DocumentStore, EntityRecord, TemplateRecord};
use crate::core::Uuid;

/// Whether an item's target list may still change.
///
/// Locked once any target rolled its save or had damage committed.
#[must_use]
pub fn can_change_targets(item: &Item) -> bool {
    let Some(targets) = &item.targets else {
        return true;
    };
    !targets
        .iter()
        .any(|t| t.calc.result.check_pass.is_some() || t.apply_dmg)
}

/// Whether the user's current selection differs from the item's targets.
///
/// An empty selection is treated as "no change": the user simply has
/// nothing selected right now.
#[must_use]
pub fn selection_changed(item: &Item, selection: &[Uuid]) -> bool {
    if selection.is_empty() {
        return false;
    }
    let current: Vec<&Uuid> = item
        .targets
        .iter()
        .flatten()
        .map(|t| &t.uuid)
        .collect();
    if current.len() != selection.len() {
        return true;
    }
    selection.iter().any(|uuid| !current.contains(&uuid))
}

/// Replace an item's target list with snapshots of the given entities,
/// sorted by display name. Targets get fresh per-target check state when
/// the item demands one; the roll itself is generated when it is made.
pub fn set_targets(item: &mut Item, uuids: &[Uuid], store: &dyn DocumentStore) {
    let entities = store.entities(uuids);
    let with_check = item.check.is_some();

    let mut targets: Vec<Target> = uuids
        .iter()
        .filter_map(|uuid| entities.get(uuid))
        .map(|entity| Target::from_entity(entity, with_check))
        .collect();
    targets.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uuid.cmp(&b.uuid)));
    item.targets = Some(targets);
}

/// Entities inside a placed template, disposition-filtered for the item's
/// target kind relative to the template's anchor entity.
#[must_use]
pub fn targets_from_template(
    template: &TemplateRecord,
    kind: TargetKind,
    store: &dyn DocumentStore,
) -> Vec<Uuid> {
    let anchor_disposition = template
        .anchor_entity
        .as_ref()
        .and_then(|uuid| store.entity(uuid))
        .map(|e| e.disposition);

    store
        .scene_entities()
        .into_iter()
        .filter(|entity| {
            entity.position.is_some_and(|p| {
                template
                    .shape
                    .contains(template.origin, template.direction_deg, p)
            })
        })
        .filter(|entity| matches_kind(entity, kind, anchor_disposition))
        .map(|entity| entity.uuid)
        .collect()
}

fn matches_kind(
    entity: &EntityRecord,
    kind: TargetKind,
    anchor_disposition: Option<Disposition>,
) -> bool {
    match kind {
        TargetKind::None => false,
        TargetKind::SelfOnly | TargetKind::Creature => true,
        TargetKind::Ally => anchor_disposition.is_none_or(|a| entity.disposition == a),
        TargetKind::Enemy => anchor_disposition.is_none_or(|a| {
            a != Disposition::Neutral
                && entity.disposition != Disposition::Neutral
                && entity.disposition != a
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{CheckDef, Item, ItemCalc, TargetDefinition};
    use crate::store::{EntityTraits, MemoryStore};

    fn scene_entity(uuid: &str, name: &str, pos: Point, disposition: Disposition) -> EntityRecord {
        EntityRecord {
            uuid: Uuid::new(uuid),
            name: name.to_string(),
            img: None,
            ac: 12,
            hp: 10,
            temp_hp: 0,
            max_hp: 10,
            immunities: Vec::new(),
            resistances: Vec::new(),
            vulnerabilities: Vec::new(),
            disposition,
            traits: EntityTraits::default(),
            save_bonuses: Default::default(),
            fields: Default::default(),
            effects: Vec::new(),
            owner: None,
            position: Some(pos),
        }
    }

    fn bare_item() -> Item {
        Item {
            uuid: Uuid::new("Item.1"),
            name: "Fire Burst".into(),
            img: None,
            category: Default::default(),
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

    #[test]
    fn test_set_targets_sorted_with_check_state() {
        let mut store = MemoryStore::new();
        store.add_entity(scene_entity(
            "Token.b",
            "Zed",
            Point::new(0.0, 0.0),
            Disposition::Hostile,
        ));
        store.add_entity(scene_entity(
            "Token.a",
            "Anna",
            Point::new(0.0, 0.0),
            Disposition::Hostile,
        ));

        let mut item = bare_item();
        item.check = Some(CheckDef {
            ability: "dex".into(),
            dc: 13,
            skill: None,
            add_save_bonus: true,
            label: None,
        });

        set_targets(
            &mut item,
            &[Uuid::new("Token.b"), Uuid::new("Token.a")],
            &store,
        );

        let targets = item.targets.as_ref().unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name, "Anna");
        assert_eq!(targets[1].name, "Zed");
        assert!(targets.iter().all(|t| t.check.is_some()));
    }

    #[test]
    fn test_selection_changed_rules() {
        let mut store = MemoryStore::new();
        store.add_entity(scene_entity(
            "Token.a",
            "Anna",
            Point::new(0.0, 0.0),
            Disposition::Hostile,
        ));
        let mut item = bare_item();
        set_targets(&mut item, &[Uuid::new("Token.a")], &store);

        // Empty selection means no change
        assert!(!selection_changed(&item, &[]));
        // Same set: no change
        assert!(!selection_changed(&item, &[Uuid::new("Token.a")]));
        // Different set: change
        assert!(selection_changed(&item, &[Uuid::new("Token.b")]));
        assert!(selection_changed(
            &item,
            &[Uuid::new("Token.a"), Uuid::new("Token.b")]
        ));
    }

    #[test]
    fn test_template_disposition_filter() {
        let mut store = MemoryStore::new();
        store.add_entity(scene_entity(
            "Token.anchor",
            "Caster",
            Point::new(0.0, 0.0),
            Disposition::Friendly,
        ));
        store.add_entity(scene_entity(
            "Token.friend",
            "Friend",
            Point::new(3.0, 0.0),
            Disposition::Friendly,
        ));
        store.add_entity(scene_entity(
            "Token.foe",
            "Foe",
            Point::new(0.0, 3.0),
            Disposition::Hostile,
        ));
        store.add_entity(scene_entity(
            "Token.far",
            "Far",
            Point::new(50.0, 0.0),
            Disposition::Hostile,
        ));

        let template = TemplateRecord {
            id: Uuid::new("Template.1"),
            origin: Point::new(0.0, 0.0),
            direction_deg: 0.0,
            shape: TemplateShape::Circle { radius: 10.0 },
            anchor_entity: Some(Uuid::new("Token.anchor")),
            bound_message: None,
            bound_item: None,
        };

        let enemies = targets_from_template(&template, TargetKind::Enemy, &store);
        assert_eq!(enemies, vec![Uuid::new("Token.foe")]);

        let allies = targets_from_template(&template, TargetKind::Ally, &store);
        assert!(allies.contains(&Uuid::new("Token.anchor")));
        assert!(allies.contains(&Uuid::new("Token.friend")));
        assert!(!allies.contains(&Uuid::new("Token.foe")));

        let all = targets_from_template(&template, TargetKind::Creature, &store);
        assert_eq!(all.len(), 3);
    }
}
