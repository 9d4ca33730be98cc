mod common;

use mushcore::world::Item;

#[test]
fn consume_total_is_all_or_nothing() {
    let mut world = common::world();
    let (_, pack) = common::player(&mut world, "Mariah");
    let first = common::pile(&mut world, "ginseng", 30);
    let second = common::pile(&mut world, "ginseng", 20);
    world.add_item(pack, first).unwrap();
    world.add_item(pack, second).unwrap();
    assert_eq!(world.get_amount(pack, &["ginseng"], false), 50);

    assert!(!world.consume_total(pack, &["ginseng"], 100, false).unwrap());
    assert_eq!(world.get_item(first).unwrap().amount(), 30);
    assert_eq!(world.get_item(second).unwrap().amount(), 20);

    assert!(world.consume_total(pack, &["ginseng"], 30, false).unwrap());
    assert_eq!(world.get_amount(pack, &["ginseng"], false), 20);
    assert!(world.item(first).is_none());
    assert_eq!(world.container(pack).unwrap().totals().weight, 20);
    assert!(world.verify_totals().unwrap().is_empty());
}

#[test]
fn recursive_search_reaches_nested_bags() {
    let mut world = common::world();
    let (player, pack) = common::player(&mut world, "Tseramed");
    let bag = common::bag(&mut world);
    world.add_item(pack, bag).unwrap();
    let coins = world.spawn(Item::gold(250));
    world.add_item(bag, coins).unwrap();
    let loose = world.spawn(Item::gold(50));
    world.add_item(pack, loose).unwrap();

    assert_eq!(world.get_amount(pack, &["gold"], false), 50);
    assert_eq!(world.get_amount(pack, &["gold"], true), 300);
    assert_eq!(world.find_items_by_type(pack, "container", false), vec![bag]);

    assert!(world.consume_total(pack, &["gold"], 120, true).unwrap());
    assert_eq!(world.get_amount(pack, &["gold"], true), 180);
    assert_eq!(world.get_mobile(player).unwrap().totals().gold, 180);
    assert!(world.verify_totals().unwrap().is_empty());
}

#[test]
fn consume_many_reports_first_shortfall() {
    let mut world = common::world();
    let (_, pack) = common::player(&mut world, "Katrina");
    let ash = common::pile(&mut world, "ash", 5);
    let moss = common::pile(&mut world, "moss", 1);
    world.add_item(pack, ash).unwrap();
    world.add_item(pack, moss).unwrap();

    let ash_kind: &[&str] = &["ash"];
    let moss_kind: &[&str] = &["moss"];
    assert_eq!(
        world
            .consume_total_many(pack, &[(ash_kind, 2), (moss_kind, 3)], false)
            .unwrap(),
        Some(1)
    );
    assert_eq!(world.get_amount(pack, &["ash"], false), 5);

    assert_eq!(
        world
            .consume_total_many(pack, &[(ash_kind, 2), (moss_kind, 1)], false)
            .unwrap(),
        None
    );
    assert_eq!(world.get_amount(pack, &["ash"], false), 3);
    assert!(world.item(moss).is_none());
}

#[test]
fn consume_up_to_takes_what_there_is() {
    let mut world = common::world();
    let (_, pack) = common::player(&mut world, "Dupre");
    let bandages = common::pile(&mut world, "bandage", 7);
    world.add_item(pack, bandages).unwrap();

    assert_eq!(world.consume_up_to(pack, &["bandage"], 10, false).unwrap(), 7);
    assert!(world.item(bandages).is_none());
    assert_eq!(world.consume_up_to(pack, &["bandage"], 10, false).unwrap(), 0);
}
