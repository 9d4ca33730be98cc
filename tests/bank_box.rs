mod common;

use mushcore::config::WorldConfig;
use mushcore::container::place::MSG_NOT_ACCESSIBLE;
use mushcore::container::{BankState, ContainerKind, ContainerState};
use mushcore::world::{AccessLevel, Item, Packet, Parent, Point3D};

#[test]
fn closed_bank_refuses_its_owner() {
    let mut world = common::world();
    let (player, _) = common::player(&mut world, "Lord Blackthorn");
    let bank = world.get_mobile(player).unwrap().bank_box().unwrap();
    let coins = world.spawn(Item::gold(1000));

    assert!(!world.try_drop_item(Some(player), bank, coins, true).unwrap());
    assert_eq!(
        world.drain_outbox(),
        vec![Packet::Message {
            to: player,
            text: MSG_NOT_ACCESSIBLE.to_string()
        }]
    );

    world.open_bank(bank).unwrap();
    assert!(world.try_drop_item(Some(player), bank, coins, true).unwrap());
    world.close_bank(bank).unwrap();
    assert!(!world.lift_item(player, coins).unwrap());

    let staff = world.create_player("GM", AccessLevel::GameMaster).unwrap();
    assert!(world.lift_item(staff, coins).unwrap());
}

#[test]
fn bank_contents_do_not_weigh_on_the_owner() {
    let mut world = common::world();
    let (player, _) = common::player(&mut world, "Geoffrey");
    let bank = world.get_mobile(player).unwrap().bank_box().unwrap();
    let before = world.get_mobile(player).unwrap().totals();

    let ingots = common::pile(&mut world, "ingot", 5000);
    world.open_bank(bank).unwrap();
    assert!(world.try_drop_item(Some(player), bank, ingots, false).unwrap());
    let coins = world.spawn(Item::gold(2500));
    assert!(world.try_drop_item(Some(player), bank, coins, false).unwrap());

    let totals = world.container(bank).unwrap().totals();
    assert_eq!(totals.weight, 5050);
    assert_eq!(totals.gold, 2500);
    assert_eq!(world.get_mobile(player).unwrap().totals(), before);
    assert!(world.verify_totals().unwrap().is_empty());
}

#[test]
fn ownerless_bank_is_destroyed_on_load() {
    let (_dir, store) = common::temp_store();
    let mut world = common::world();
    let mut box_item = Item::new("bankbox", 0x09AB)
        .virtual_item()
        .immovable()
        .with_container(ContainerState::new(ContainerKind::BankBox(BankState::default())));
    box_item.location = Point3D::new(800, 900, 5);
    let bank = world.spawn(box_item);
    let coins = world.spawn(Item::gold(40));
    world.add_item(bank, coins).unwrap();
    store.save_world(&world).unwrap();

    let (loaded, report) = store
        .load_world(WorldConfig::default(), common::registry(), world.now())
        .unwrap();
    assert_eq!(report.banks_destroyed, 1);
    assert!(loaded.item(bank).is_none());
    let coins = loaded.get_item(coins).unwrap();
    assert_eq!(coins.parent(), Parent::World);
    assert_eq!(coins.location, Point3D::new(800, 900, 5));
}
