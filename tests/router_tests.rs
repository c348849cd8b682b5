//! Action router tests: permission arbitration, local-vs-delegated
//! execution, structured failures.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use vtt_cards::engine::{CardEngine, DelegateTransport, ItemDefinition};
use vtt_cards::*;

const MSG: &str = "Message.1";

/// A world with an owner-player, a bystander, and an elevated arbiter,
/// all sharing one store.
fn shared_world() -> SharedStore {
    let mut store = MemoryStore::new();
    store.add_user(user("alice", true, false));
    store.add_user(user("bob", true, false));
    store.add_user(user("gm", true, true));

    let mut hero = entity("Actor.hero", "Hero");
    hero.owner = Some(ClientId::new("alice"));
    store.add_entity(hero);

    let mut goblin = entity("Token.goblin", "Goblin");
    goblin.ac = 5;
    goblin.owner = Some(ClientId::new("bob"));
    goblin.save_bonuses.insert("dex".into(), 2);
    store.add_entity(goblin);

    SharedStore::new(store)
}

fn attack_card(engine: &mut CardEngine<SharedStore>) {
    engine.set_selection(vec![Uuid::new("Token.goblin")]);
    let mut definition = ItemDefinition::new(Uuid::new("Item.sword"), "Sword");
    definition.attack_bonus = Some("5".into());
    definition.damages = vec![vtt_cards::engine::DamageDefinition {
        formula: "2d6 + 3[fire]".into(),
        label: None,
        upcast: None,
    }];
    engine
        .use_items(
            Uuid::new(MSG),
            Some(Uuid::new("Actor.hero")),
            Some(Uuid::new("Token.hero")),
            vec![definition],
        )
        .unwrap();
}

#[test]
fn test_owner_executes_locally() {
    let store = shared_world();
    let mut alice = CardEngine::new(ClientId::new("alice"), store, 7);
    attack_card(&mut alice);

    let response = alice.interact(
        &Uuid::new(MSG),
        "item-0-attack",
        ClickModifiers::shift(),
        None,
        None,
    );
    assert_eq!(response, Some(InteractionResponse::Success));

    let card = alice.card(&Uuid::new(MSG)).unwrap();
    let attack = card.items[0].attack.as_ref().unwrap();
    assert!(attack.is_evaluated());
    assert_eq!(attack.phase, RollPhase::Result);
}

#[test]
fn test_non_owner_is_blocked_silently() {
    let store = shared_world();
    let mut alice = CardEngine::new(ClientId::new("alice"), store.clone(), 7);
    attack_card(&mut alice);

    // Bob neither owns the acting entity nor authored the card.
    let mut bob = CardEngine::new(ClientId::new("bob"), store, 9);
    let response = bob.interact(
        &Uuid::new(MSG),
        "item-0-attack",
        ClickModifiers::default(),
        None,
        None,
    );
    assert_eq!(response, None, "missing permissions drop the interaction");

    let card = bob.card(&Uuid::new(MSG)).unwrap();
    assert!(!card.items[0].attack.as_ref().unwrap().is_evaluated());
}

#[test]
fn test_unknown_action_is_dropped() {
    let store = shared_world();
    let mut alice = CardEngine::new(ClientId::new("alice"), store, 7);
    attack_card(&mut alice);

    let response = alice.interact(
        &Uuid::new(MSG),
        "item-0-do-a-backflip",
        ClickModifiers::default(),
        None,
        None,
    );
    assert_eq!(response, None);
}

/// Relays requests into another engine, as the socket layer would.
struct InProcessRelay {
    arbiter: Rc<RefCell<CardEngine<SharedStore>>>,
    relayed: Rc<RefCell<Vec<ClientId>>>,
}

impl DelegateTransport for InProcessRelay {
    fn relay(
        &mut self,
        peer: &ClientId,
        request: &InteractionRequest,
    ) -> Option<InteractionResponse> {
        self.relayed.borrow_mut().push(peer.clone());
        Some(self.arbiter.borrow_mut().process_interaction(request))
    }
}

#[test]
fn test_delegation_to_elevated_peer() {
    let store = shared_world();
    let mut alice = CardEngine::new(ClientId::new("alice"), store.clone(), 7);
    // The card demands a save from Bob's goblin.
    engine_with_save_card(&mut alice);

    let arbiter = Rc::new(RefCell::new(CardEngine::new(
        ClientId::new("gm"),
        store.clone(),
        11,
    )));
    let relayed = Rc::new(RefCell::new(Vec::new()));

    // Bob owns the goblin, so the permission check passes, but he cannot
    // write Alice's message: the request must travel to the arbiter.
    let mut bob = CardEngine::new(ClientId::new("bob"), store, 9);
    bob.set_transport(Box::new(InProcessRelay {
        arbiter: arbiter.clone(),
        relayed: relayed.clone(),
    }));

    let response = bob.interact(
        &Uuid::new(MSG),
        "item-0-check-Token.goblin",
        ClickModifiers::shift(),
        None,
        None,
    );
    assert_eq!(response, Some(InteractionResponse::Success));
    assert_eq!(&*relayed.borrow(), &[ClientId::new("gm")]);

    // The arbiter executed and persisted the roll.
    let card = bob.card(&Uuid::new(MSG)).unwrap();
    let target = card.items[0].target(&Uuid::new("Token.goblin")).unwrap();
    assert!(target.check_evaluated());
}

#[test]
fn test_unreachable_delegate_drops_silently() {
    let store = shared_world();
    let mut alice = CardEngine::new(ClientId::new("alice"), store.clone(), 7);
    engine_with_save_card(&mut alice);

    // Default transport reaches nobody.
    let mut bob = CardEngine::new(ClientId::new("bob"), store, 9);
    let response = bob.interact(
        &Uuid::new(MSG),
        "item-0-check-Token.goblin",
        ClickModifiers::shift(),
        None,
        None,
    );
    assert_eq!(response, None, "non-response is silent failure");

    let card = bob.card(&Uuid::new(MSG)).unwrap();
    let target = card.items[0].target(&Uuid::new("Token.goblin")).unwrap();
    assert!(!target.check_evaluated());
}

#[test]
fn test_elevated_only_action() {
    let store = shared_world();
    let mut alice = CardEngine::new(ClientId::new("alice"), store.clone(), 7);
    attack_card(&mut alice);
    // Land the hit and the damage so an aggregate exists.
    alice.interact(
        &Uuid::new(MSG),
        "item-0-attack",
        ClickModifiers::shift(),
        None,
        None,
    );
    alice.interact(
        &Uuid::new(MSG),
        "item-0-damage-0",
        ClickModifiers::shift(),
        None,
        None,
    );

    // Alice authored the card, so the dispatch runs locally, but the
    // apply-damage candidate demands elevation: structured failure.
    let response = alice.interact(
        &Uuid::new(MSG),
        "apply-damage-*",
        ClickModifiers::default(),
        None,
        None,
    );
    assert_eq!(response, None, "client-side scan already blocks");

    // The arbiter may.
    let mut gm = CardEngine::new(ClientId::new("gm"), store, 11);
    let response = gm.interact(
        &Uuid::new(MSG),
        "apply-damage-*",
        ClickModifiers::default(),
        None,
        None,
    );
    assert_eq!(response, Some(InteractionResponse::Success));

    let card = gm.card(&Uuid::new(MSG)).unwrap();
    let aggregate = &card.calc.target_aggregates[0];
    let dmg = aggregate.dmg.as_ref().unwrap();
    assert!(dmg.applied);
    assert_eq!(dmg.applied_dmg, dmg.calc_dmg);
}

#[test]
fn test_invalid_bonus_fails_only_at_commit() {
    let store = shared_world();
    let mut alice = CardEngine::new(ClientId::new("alice"), store, 7);
    attack_card(&mut alice);

    // Typing a garbage bonus is fine...
    let response = alice.interact(
        &Uuid::new(MSG),
        "item-0-attack-bonus",
        ClickModifiers::default(),
        None,
        Some(InputValue::Text("1d6 + garbage".into())),
    );
    assert_eq!(response, Some(InteractionResponse::Success));
    let card = alice.card(&Uuid::new(MSG)).unwrap();
    assert_eq!(
        card.items[0].attack.as_ref().unwrap().user_bonus,
        "1d6 + garbage"
    );

    // ...until Enter commits it.
    let response = alice.interact(
        &Uuid::new(MSG),
        "item-0-attack-bonus",
        ClickModifiers::default(),
        Some(KeyPress::Enter),
        Some(InputValue::Text("1d6 + garbage".into())),
    );
    match response {
        Some(InteractionResponse::Failure { kind, message }) => {
            assert_eq!(kind, ErrorKind::Warn);
            assert!(message.contains("invalid bonus"));
        }
        other => panic!("expected a validation failure, got {:?}", other),
    }
    // Nothing was persisted by the failing candidate.
    let card = alice.card(&Uuid::new(MSG)).unwrap();
    assert!(!card.items[0].attack.as_ref().unwrap().is_evaluated());
}

/// Card with a save-demanding item targeting Bob's goblin.
fn engine_with_save_card(engine: &mut CardEngine<SharedStore>) {
    engine.set_selection(vec![Uuid::new("Token.goblin")]);
    let mut definition = ItemDefinition::new(Uuid::new("Item.spell"), "Hold Person");
    definition.check = Some(CheckDef {
        ability: "dex".into(),
        dc: 12,
        skill: None,
        add_save_bonus: true,
        label: None,
    });
    engine
        .use_items(
            Uuid::new(MSG),
            Some(Uuid::new("Actor.hero")),
            Some(Uuid::new("Token.hero")),
            vec![definition],
        )
        .unwrap();
}
