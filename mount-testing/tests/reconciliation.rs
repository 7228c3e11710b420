mod common;

use std::time::Duration;

use common::{deliver, describe, drain, modern, modern_manager, paths};
use futures::StreamExt;
use mount_testing::FakeBus;
use mount_testing::fixtures::{
    added, block, block_path, changed, drive_path, removed, stick_interfaces, usb_drive,
};
use mount_udisks::bus::udisks2::{BLOCK_IFACE, DRIVE_IFACE};
use mount_udisks::{ManagerConfig, MediaType, MountManager, PropertyValue};

#[tokio::test]
async fn initial_resync_populates_registry() {
    let bus = FakeBus::new();
    let sdb1 = bus.add_stick("sdb1", "STICK", "Cruzer");
    let sdc1 = bus.add_stick("sdc1", "DATA", "Ultra");

    let manager = modern_manager(&bus).await;
    assert_eq!(paths(&manager), vec![sdb1.clone(), sdc1]);

    let info = manager.device(&sdb1).unwrap().info();
    assert_eq!(info.dev_file, "/dev/sdb1");
    assert_eq!(info.label, "STICK");
    assert_eq!(info.vendor, "SanDisk");
    assert_eq!(info.file_system, "vfat");
    assert_eq!(info.media_type, MediaType::Partition);
    assert_eq!(info.size_string(), "8.0 GB");
    assert!(info.is_valid);
    assert!(info.is_external);
    assert!(info.is_ejectable);
    assert!(!info.is_mounted);
    assert_eq!(info.mount_path, None);
}

#[tokio::test]
async fn replayed_notifications_net_to_final_membership() {
    let bus = FakeBus::new();
    let mut manager = modern_manager(&bus).await;
    let mut events = manager.subscribe();
    assert!(manager.devices().is_empty());

    let sdb1 = bus.add_stick("sdb1", "STICK", "Cruzer");
    let drive = drive_path("Cruzer");
    let payload = stick_interfaces("sdb1", "STICK", &drive);

    deliver(&bus, &mut manager, added(&sdb1, Some(payload.clone()))).await;
    let first = manager.device(&sdb1).unwrap();

    deliver(&bus, &mut manager, added(&sdb1, Some(payload))).await;
    deliver(&bus, &mut manager, removed(&sdb1)).await;
    deliver(&bus, &mut manager, removed(&sdb1)).await;
    deliver(&bus, &mut manager, added(&sdb1, None)).await;

    assert_eq!(paths(&manager), vec![sdb1.clone()]);
    assert_eq!(
        describe(&drain(&mut events)),
        vec![
            format!("added {sdb1}"),
            format!("removed {sdb1}"),
            format!("added {sdb1}"),
        ]
    );

    let second = manager.device(&sdb1).unwrap();
    assert!(!first.is_valid());
    assert!(second.is_valid());
    assert!(!first.same_as(&second));
}

#[tokio::test]
async fn duplicate_adds_never_create_two_records() {
    let bus = FakeBus::new();
    let sdb1 = bus.add_stick("sdb1", "STICK", "Cruzer");
    let mut manager = modern_manager(&bus).await;
    let mut events = manager.subscribe();

    for _ in 0..3 {
        deliver(&bus, &mut manager, added(&sdb1, None)).await;
    }
    manager.update().await;

    assert_eq!(paths(&manager), vec![sdb1]);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn change_for_untracked_block_is_an_implicit_add() {
    let bus = FakeBus::new();
    let mut manager = modern_manager(&bus).await;
    let mut events = manager.subscribe();

    let sdb1 = bus.add_stick("sdb1", "STICK", "Cruzer");
    deliver(&bus, &mut manager, changed(&sdb1)).await;

    assert_eq!(paths(&manager), vec![sdb1.clone()]);
    assert_eq!(describe(&drain(&mut events)), vec![format!("added {sdb1}")]);
}

#[tokio::test]
async fn zero_delta_change_is_silent() {
    let bus = FakeBus::new();
    let sdb1 = bus.add_stick("sdb1", "STICK", "Cruzer");
    let mut manager = modern_manager(&bus).await;
    let mut events = manager.subscribe();

    deliver(&bus, &mut manager, changed(&sdb1)).await;
    deliver(&bus, &mut manager, changed(&sdb1)).await;

    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn attribute_change_emits_exactly_one_changed() {
    let bus = FakeBus::new();
    let sdb1 = bus.add_stick("sdb1", "STICK", "Cruzer");
    let mut manager = modern_manager(&bus).await;
    let mut events = manager.subscribe();
    let observer = manager.device(&sdb1).unwrap();

    let relabelled = block("sdb1", "BACKUP", &drive_path("Cruzer"))
        .with("IdType", PropertyValue::Str("exfat".to_string()));
    bus.set_properties(&sdb1, BLOCK_IFACE, relabelled);
    deliver(&bus, &mut manager, changed(&sdb1)).await;

    assert_eq!(describe(&drain(&mut events)), vec![format!("changed {sdb1}")]);
    assert_eq!(observer.record().label(), "BACKUP");
    assert_eq!(observer.record().file_system(), "exfat");
}

#[tokio::test]
async fn mount_state_follows_notifications() {
    let bus = FakeBus::new();
    let sdb1 = bus.add_stick("sdb1", "STICK", "Cruzer");
    let mut manager = modern_manager(&bus).await;
    let mut events = manager.subscribe();

    bus.set_mount_points(&sdb1, &["/run/media/user/STICK"]);
    deliver(&bus, &mut manager, changed(&sdb1)).await;

    let device = manager.device(&sdb1).unwrap();
    assert!(device.is_mounted());
    assert_eq!(device.mount_path().as_deref(), Some("/run/media/user/STICK"));

    bus.set_mount_points(&sdb1, &[]);
    deliver(&bus, &mut manager, changed(&sdb1)).await;
    assert!(!device.is_mounted());

    assert_eq!(
        describe(&drain(&mut events)),
        vec![
            format!("changed {sdb1}"),
            format!("mounted {sdb1}"),
            format!("changed {sdb1}"),
            format!("unmounted {sdb1}"),
        ]
    );
}

#[tokio::test]
async fn drive_change_refreshes_every_block_on_it() {
    let bus = FakeBus::new();
    let sdb1 = bus.add_stick("sdb1", "ONE", "Cruzer");
    let sdb2 = bus.add_stick("sdb2", "TWO", "Cruzer");
    let sdc1 = bus.add_stick("sdc1", "OTHER", "Ultra");
    let mut manager = modern_manager(&bus).await;
    let mut events = manager.subscribe();

    let drive = drive_path("Cruzer");
    bus.set_properties(&drive, DRIVE_IFACE, usb_drive("Cruzer Blade"));
    deliver(&bus, &mut manager, changed(&drive)).await;

    let mut refreshed = describe(&drain(&mut events));
    refreshed.sort();
    assert_eq!(
        refreshed,
        vec![format!("changed {sdb1}"), format!("changed {sdb2}")]
    );
    assert_eq!(manager.device(&sdb1).unwrap().record().model(), "Cruzer Blade");
    assert_eq!(manager.device(&sdc1).unwrap().record().model(), "Cruzer");
}

#[tokio::test]
async fn resync_drops_devices_the_service_no_longer_reports() {
    let bus = FakeBus::new();
    let sdb1 = bus.add_stick("sdb1", "STICK", "Cruzer");
    let sdc1 = bus.add_stick("sdc1", "DATA", "Ultra");
    let mut manager = modern_manager(&bus).await;
    let mut events = manager.subscribe();
    let gone = manager.device(&sdb1).unwrap();

    bus.remove_path(&sdb1);
    let sdd1 = bus.add_stick("sdd1", "NEW", "Extreme");
    manager.update().await;

    assert_eq!(paths(&manager), vec![sdc1, sdd1.clone()]);
    assert_eq!(
        describe(&drain(&mut events)),
        vec![format!("added {sdd1}"), format!("removed {sdb1}")]
    );
    assert!(!gone.is_valid());
}

#[tokio::test]
async fn unreadable_block_keeps_last_known_state() {
    let bus = FakeBus::new();
    let sdb1 = bus.add_stick("sdb1", "STICK", "Cruzer");
    let mut manager = modern_manager(&bus).await;
    let mut events = manager.subscribe();

    bus.clear_properties(&sdb1, BLOCK_IFACE);
    deliver(&bus, &mut manager, changed(&sdb1)).await;

    let device = manager.device(&sdb1).unwrap();
    assert!(device.is_valid());
    assert_eq!(device.record().label(), "STICK");
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn ignored_blocks_are_hidden_unless_configured() {
    let bus = FakeBus::new();
    let sda1 = block_path("sda1");
    bus.add_path(&sda1);
    bus.set_properties(
        &sda1,
        BLOCK_IFACE,
        block("sda1", "EFI", "/").with("HintIgnore", PropertyValue::Bool(true)),
    );

    let manager = modern_manager(&bus).await;
    assert!(manager.devices().is_empty());

    let config = ManagerConfig {
        show_ignored: true,
        ..ManagerConfig::default()
    };
    let manager = MountManager::with_candidates(vec![modern(&bus, config)]).await;
    assert_eq!(paths(&manager), vec![sda1]);

    // No drive object and no partition table: nothing to classify it by.
    let info = manager.devices()[0].info();
    assert_eq!(info.media_type, MediaType::Unknown);
    assert!(!info.is_external);
    assert!(!info.is_ejectable);
}

#[tokio::test]
async fn events_reach_every_subscriber_in_order() {
    let bus = FakeBus::new();
    let mut manager = modern_manager(&bus).await;
    let mut first = manager.subscribe();
    let mut second = manager.subscribe();

    let sdb1 = bus.add_stick("sdb1", "STICK", "Cruzer");
    deliver(&bus, &mut manager, added(&sdb1, None)).await;
    deliver(&bus, &mut manager, removed(&sdb1)).await;

    let expected = vec![format!("added {sdb1}"), format!("removed {sdb1}")];
    assert_eq!(describe(&drain(&mut first)), expected);
    assert_eq!(describe(&drain(&mut second)), expected);

    assert!(drain(&mut first).is_empty());
}

#[tokio::test]
async fn queued_events_outlive_the_manager() {
    let bus = FakeBus::new();
    let mut manager = modern_manager(&bus).await;
    let events = manager.subscribe();

    let sdb1 = bus.add_stick("sdb1", "STICK", "Cruzer");
    deliver(&bus, &mut manager, added(&sdb1, None)).await;
    deliver(&bus, &mut manager, removed(&sdb1)).await;
    drop(manager);

    // Each event is rendered and dropped as it is read, releasing the last
    // device handles so the stream can close.
    let seen = tokio::time::timeout(
        Duration::from_secs(5),
        events
            .map(|event| describe(std::slice::from_ref(&event)).remove(0))
            .collect::<Vec<_>>(),
    )
    .await
    .expect("event stream closes once the manager is gone");

    assert_eq!(seen, vec![format!("added {sdb1}"), format!("removed {sdb1}")]);
}
