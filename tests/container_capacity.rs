mod common;

use mushcore::container::hold::{MSG_DECO, MSG_TOO_HEAVY, MSG_TOO_MANY_ITEMS};
use mushcore::container::ContainerState;
use mushcore::world::{AccessLevel, Item, Packet, Parent, Point3D};

fn last_message(world: &mut mushcore::World) -> Option<String> {
    world.drain_outbox().into_iter().rev().find_map(|packet| match packet {
        Packet::Message { text, .. } => Some(text),
        _ => None,
    })
}

#[test]
fn weight_limit_applies_to_every_ancestor() {
    let mut world = common::world();
    let (player, pack) = common::player(&mut world, "Shamino");

    let bag = world.spawn(
        Item::new("bag", 0x0E76)
            .with_weight(2.0)
            .with_container(ContainerState::plain().with_max_weight(1000)),
    );
    world.add_item(pack, bag).unwrap();
    let ingots = common::pile(&mut world, "ingot", 390);
    world.add_item(pack, ingots).unwrap();
    assert_eq!(world.container(pack).unwrap().totals().weight, 392);

    // The bag could take it, the backpack around it cannot.
    let anvil = world.spawn(Item::new("anvil", 0x0FAF).with_weight(10.0));
    assert!(!world.try_drop_item(Some(player), bag, anvil, true).unwrap());
    assert_eq!(world.get_item(anvil).unwrap().parent(), Parent::World);
    assert_eq!(last_message(&mut world).as_deref(), Some(MSG_TOO_HEAVY));

    let hammer = world.spawn(Item::new("hammer", 0x13E3).with_weight(8.0));
    assert!(world.try_drop_item(Some(player), bag, hammer, true).unwrap());
    assert_eq!(world.container(pack).unwrap().totals().weight, 400);
    assert_eq!(world.get_mobile(player).unwrap().totals().weight, 403);
}

#[test]
fn item_limit_rejects_new_stacks_but_allows_merges() {
    let mut world = common::world();
    let (player, _) = common::player(&mut world, "Julia");
    let quiver = world.spawn(
        Item::new("quiver", 0x2FB7).with_container(ContainerState::plain().with_max_items(1)),
    );
    let arrows = world.spawn(Item::new("arrow", 0x0F3F).stackable().with_weight(0.1).with_amount(5));
    world.add_item(quiver, arrows).unwrap();

    let dagger = world.spawn(Item::new("dagger", 0x0F52));
    assert!(!world.try_drop_item(Some(player), quiver, dagger, true).unwrap());
    assert_eq!(last_message(&mut world).as_deref(), Some(MSG_TOO_MANY_ITEMS));

    let more = world.spawn(Item::new("arrow", 0x0F3F).stackable().with_weight(0.1).with_amount(10));
    assert!(world.try_drop_item(Some(player), quiver, more, true).unwrap());
    assert_eq!(world.get_item(arrows).unwrap().amount(), 15);
    assert!(world.item(more).is_none());
    assert_eq!(world.container(quiver).unwrap().items(), &[arrows]);
    assert_eq!(world.container(quiver).unwrap().totals().weight, 2);
}

#[test]
fn deco_container_refuses_players_only() {
    let mut world = common::world();
    let (player, _) = common::player(&mut world, "Jaana");
    let staff = world.create_player("Lord British", AccessLevel::Administrator).unwrap();

    let mut crate_item = Item::new("crate", 0x0E3D)
        .immovable()
        .with_container(ContainerState::plain());
    crate_item.location = Point3D::new(1500, 1600, 0);
    let display = world.spawn(crate_item);

    let apple = world.spawn(Item::new("apple", 0x09D0));
    assert!(!world.try_drop_item(Some(player), display, apple, true).unwrap());
    assert_eq!(last_message(&mut world).as_deref(), Some(MSG_DECO));
    assert!(world.try_drop_item(Some(staff), display, apple, true).unwrap());
}

#[test]
fn server_side_add_skips_capacity_checks() {
    let mut world = common::world();
    let (player, pack) = common::player(&mut world, "Iolo");
    let boulders = common::pile(&mut world, "boulder", 1000);

    assert!(!world.check_hold(Some(player), pack, boulders, Default::default()));
    world.add_item(pack, boulders).unwrap();
    assert_eq!(world.container(pack).unwrap().totals().weight, 1000);
    assert!(world.verify_totals().unwrap().is_empty());
}
