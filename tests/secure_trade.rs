mod common;

use mushcore::container::hold::MSG_TRADE_RECIPIENT;
use mushcore::world::{Item, Packet, Parent};

#[test]
fn change_at_any_depth_clears_acceptance() {
    let mut world = common::world();
    let (a, _) = common::player(&mut world, "Iolo");
    let (b, _) = common::player(&mut world, "Gwenno");
    let id = world.open_trade(a, b).unwrap();

    let bag = common::bag(&mut world);
    let pouch = common::bag(&mut world);
    world.add_item(bag, pouch).unwrap();
    assert!(world.offer_item(id, a, bag).unwrap());

    assert!(!world.set_accepted(id, b, true).unwrap());
    assert!(world.trade(id).unwrap().to.accepted);

    // Two levels below the trade container.
    let gem = world.spawn(Item::new("gem", 0x0F10).with_weight(0.1));
    world.add_item(pouch, gem).unwrap();
    let trade = world.trade(id).unwrap();
    assert!(!trade.from.accepted);
    assert!(!trade.to.accepted);

    assert!(!world.set_accepted(id, b, true).unwrap());
    let coins = world.spawn(Item::gold(10));
    world.add_item(pouch, coins).unwrap();
    assert!(!world.set_accepted(id, b, true).unwrap());
    world.set_amount(coins, 9).unwrap();
    assert!(!world.trade(id).unwrap().to.accepted);

    let updates = world
        .drain_outbox()
        .into_iter()
        .filter(|packet| matches!(packet, Packet::TradeUpdate { .. }))
        .count();
    assert!(updates >= 2);
}

#[test]
fn offer_refused_when_recipient_cannot_carry_it() {
    let mut world = common::world();
    let (a, _) = common::player(&mut world, "Shamino");
    let (b, b_pack) = common::player(&mut world, "Dupre");
    let ingots = common::pile(&mut world, "ingot", 396);
    world.add_item(b_pack, ingots).unwrap();

    let id = world.open_trade(a, b).unwrap();
    let anvil = world.spawn(Item::new("anvil", 0x0FAF).with_weight(5.0));
    world.drain_outbox();
    assert!(!world.offer_item(id, a, anvil).unwrap());
    assert_eq!(world.get_item(anvil).unwrap().parent(), Parent::World);
    assert!(world.drain_outbox().contains(&Packet::Message {
        to: a,
        text: MSG_TRADE_RECIPIENT.to_string()
    }));

    let feather = world.spawn(Item::new("feather", 0x1BD1).with_weight(0.1));
    assert!(world.offer_item(id, a, feather).unwrap());
}

#[test]
fn only_the_owner_reaches_into_a_trade_container() {
    let mut world = common::world();
    let (a, _) = common::player(&mut world, "Katrina");
    let (b, _) = common::player(&mut world, "Julia");
    let id = world.open_trade(a, b).unwrap();
    let from_container = world.trade(id).unwrap().from.container;

    let dagger = world.spawn(Item::new("dagger", 0x0F52));
    assert!(!world.try_drop_item(Some(b), from_container, dagger, false).unwrap());
    assert!(world.try_drop_item(Some(a), from_container, dagger, false).unwrap());
    assert!(!world.lift_item(b, dagger).unwrap());
}

#[test]
fn deleting_one_side_closes_the_session() {
    let mut world = common::world();
    let (a, _) = common::player(&mut world, "Jaana");
    let (b, _) = common::player(&mut world, "Mariah");
    let id = world.open_trade(a, b).unwrap();
    let trade = world.trade(id).unwrap().clone();

    world.delete(trade.from.container).unwrap();
    assert!(world.trade(id).is_none());
    assert!(world
        .drain_outbox()
        .contains(&Packet::TradeClose { to: b, container: trade.to.container }));
    assert!(world.trade_recipient(trade.to.container).is_none());
}

#[test]
fn deleting_one_side_returns_both_offers() {
    let mut world = common::world();
    let (a, a_pack) = common::player(&mut world, "Sentri");
    let (b, b_pack) = common::player(&mut world, "Tseramed");
    let id = world.open_trade(a, b).unwrap();
    let trade = world.trade(id).unwrap().clone();

    let sword = world.spawn(Item::new("sword", 0x0F5E).with_weight(6.0));
    let coins = world.spawn(Item::gold(75));
    assert!(world.offer_item(id, a, sword).unwrap());
    assert!(world.offer_item(id, b, coins).unwrap());

    world.delete(trade.from.container).unwrap();
    assert!(world.trade(id).is_none());
    assert!(world.item(trade.from.container).is_none());
    assert!(world.item(trade.to.container).is_none());
    assert_eq!(world.get_item(sword).unwrap().parent(), Parent::Item(a_pack));
    assert_eq!(world.get_item(coins).unwrap().parent(), Parent::Item(b_pack));
    assert_eq!(world.get_mobile(b).unwrap().totals().gold, 75);
    assert!(world.verify_totals().unwrap().is_empty());
}
