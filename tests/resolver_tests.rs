//! Intent expansion: state→color rules, overrides, error policy, batches.

use std::sync::Arc;
use std::time::Duration;

use lumibus::{
    Addr, ApartmentRecord, BatchItem, Color, Command, Config, EntityKind, FloorGroup, Inventory,
    LightError, LightRef, LightRequest, LightState, Packet, ReconnectPolicy, Resolver, SimSink,
    Transport,
};

fn record(id: &str, floor: i32, group: &str, pos: u16, addrs: &[u16]) -> ApartmentRecord {
    ApartmentRecord {
        id: id.to_string(),
        floor,
        group_id: group.to_string(),
        unit_position: pos,
        lights: addrs
            .iter()
            .enumerate()
            .map(|(i, &a)| LightRef {
                index: (i + 1) as u16,
                addr: Addr(a),
            })
            .collect(),
    }
}

fn group(id: &str, floor: i32) -> FloorGroup {
    FloorGroup {
        id: id.to_string(),
        tower: "T1".to_string(),
        floor,
    }
}

async fn harness() -> (Resolver, Arc<Inventory>, Arc<Transport>) {
    let transport = Transport::connect_paced(
        Box::new(SimSink::with_latency(Duration::ZERO)),
        ReconnectPolicy::default(),
        Duration::ZERO,
    )
    .await
    .unwrap();

    let inventory = Arc::new(Inventory::new());
    inventory
        .load(
            vec![group("T1-F09", 9), group("T1-F10", 10)],
            vec![
                record("A-0901", 9, "T1-F09", 1, &[0x0901, 0x0902]),
                record("A-0902", 9, "T1-F09", 2, &[0x0903]),
                record("A-1001", 10, "T1-F10", 1, &[0x1001]),
                record("SHELL", 9, "T1-F09", 3, &[]),
            ],
        )
        .unwrap();

    let mut config = Config::default();
    config.default_fade = Duration::ZERO;
    let resolver = Resolver::new(Arc::clone(&inventory), Arc::clone(&transport), config);
    (resolver, inventory, transport)
}

async fn next_packet(
    rx: &mut tokio::sync::broadcast::Receiver<Arc<lumibus::EmittedFrame>>,
) -> Packet {
    let frame = rx.recv().await.unwrap();
    Packet::decode_wire(&frame.bytes).unwrap()
}

#[tokio::test]
async fn lighting_an_apartment_emits_per_fixture_levels_and_marks_state() {
    let (resolver, inventory, transport) = harness().await;
    let mut tap = transport.tap().subscribe();

    resolver
        .light_apartment("A-0901", LightState::Available, LightRequest::default())
        .await
        .unwrap();

    // One RGB_LEVEL per fixture, light-index order, state default green.
    let p1 = next_packet(&mut tap).await;
    let p2 = next_packet(&mut tap).await;
    assert_eq!(p1.addr, Addr(0x0901));
    assert_eq!(p2.addr, Addr(0x0902));
    assert_eq!(p1.command, Command::RgbLevel { r: 0, g: 255, b: 0 });

    assert_eq!(
        inventory.apartment("A-0901").unwrap().state,
        LightState::Available
    );
    transport.shutdown().await;
}

#[tokio::test]
async fn overrides_beat_state_defaults_and_scale_by_intensity() {
    let (resolver, _inventory, transport) = harness().await;
    let mut tap = transport.tap().subscribe();

    resolver
        .light_apartment("A-1001", LightState::Sold, LightRequest {
            intensity: Some(128),
            fade: None,
            rgb: Some(Color::new(255, 128, 64)),
        })
        .await
        .unwrap();

    let p = next_packet(&mut tap).await;
    // ⌊channel·128/255⌋ per channel.
    assert_eq!(p.command, Command::RgbLevel {
        r: 128,
        g: 64,
        b: 32
    });
    transport.shutdown().await;
}

#[tokio::test]
async fn nonzero_fade_plans_rgb_fade_from_level_zero() {
    let (resolver, _inventory, transport) = harness().await;
    let mut tap = transport.tap().subscribe();

    resolver
        .light_apartment("A-1001", LightState::Available, LightRequest {
            intensity: None,
            fade: Some(Duration::from_millis(500)),
            rgb: None,
        })
        .await
        .unwrap();

    let p = next_packet(&mut tap).await;
    match p.command {
        Command::RgbFade { r, g, b } => {
            // Green swings 0→255 in 500 ms: interval 1, step 6. Dark
            // channels keep the unit plan.
            assert_eq!((g.level, g.interval, g.step), (255, 1, 6));
            assert_eq!((r.level, r.interval, r.step), (0, 1, 1));
            assert_eq!((b.level, b.interval, b.step), (0, 1, 1));
        }
        other => panic!("expected RgbFade, got {other:?}"),
    }
    transport.shutdown().await;
}

#[tokio::test]
async fn lookup_and_validation_errors_are_typed() {
    let (resolver, _inventory, transport) = harness().await;

    assert!(matches!(
        resolver
            .light_apartment("A-9999", LightState::Sold, LightRequest::default())
            .await,
        Err(LightError::NotFound { kind: "apartment", .. })
    ));
    assert!(matches!(
        resolver
            .light_apartment("SHELL", LightState::Sold, LightRequest::default())
            .await,
        Err(LightError::NoAddresses { .. })
    ));
    assert!(matches!(
        resolver
            .light_group("T9-F99", LightState::Sold, LightRequest::default())
            .await,
        Err(LightError::NotFound { kind: "floor_group", .. })
    ));
    transport.shutdown().await;
}

#[tokio::test]
async fn group_lighting_is_per_fixture_never_broadcast() {
    let (resolver, inventory, transport) = harness().await;
    let mut tap = transport.tap().subscribe();

    resolver
        .light_group("T1-F09", LightState::Reserved, LightRequest::default())
        .await
        .unwrap();

    // Three fixtures across the two lit apartments; the shell is skipped.
    let mut addrs = Vec::new();
    for _ in 0..3 {
        let p = next_packet(&mut tap).await;
        assert_ne!(p.addr, Addr::BROADCAST);
        addrs.push(p.addr);
    }
    assert_eq!(addrs, vec![Addr(0x0901), Addr(0x0902), Addr(0x0903)]);
    assert_eq!(
        inventory.apartment("A-0902").unwrap().state,
        LightState::Reserved
    );
    transport.shutdown().await;
}

#[tokio::test]
async fn batch_items_fail_independently() {
    let (resolver, inventory, transport) = harness().await;

    let outcomes = resolver
        .light_batch(vec![
            BatchItem {
                kind: EntityKind::Apartment,
                id: "A-0901".into(),
                state: LightState::Sold,
                request: LightRequest::default(),
            },
            BatchItem {
                kind: EntityKind::Apartment,
                id: "MISSING".into(),
                state: LightState::Sold,
                request: LightRequest::default(),
            },
            BatchItem {
                kind: EntityKind::Apartment,
                id: "A-1001".into(),
                state: LightState::Selected,
                request: LightRequest::default(),
            },
        ])
        .await;

    assert!(outcomes[0].result.is_ok());
    assert!(matches!(
        outcomes[1].result,
        Err(LightError::NotFound { .. })
    ));
    assert!(outcomes[2].result.is_ok());
    // The failing middle item did not abort its siblings.
    assert_eq!(inventory.apartment("A-0901").unwrap().state, LightState::Sold);
    assert_eq!(
        inventory.apartment("A-1001").unwrap().state,
        LightState::Selected
    );
    transport.shutdown().await;
}

#[tokio::test]
async fn off_and_on_all_use_a_single_broadcast() {
    let (resolver, _inventory, transport) = harness().await;
    let mut tap = transport.tap().subscribe();

    resolver.off_all().await.unwrap();
    let p = next_packet(&mut tap).await;
    assert_eq!(p.addr, Addr::BROADCAST);
    assert_eq!(p.command, Command::Off);

    resolver.on_all(Some(180)).await.unwrap();
    let p = next_packet(&mut tap).await;
    assert_eq!(p.addr, Addr::BROADCAST);
    assert_eq!(p.command, Command::Level { level: 180 });
    transport.shutdown().await;
}

#[tokio::test]
async fn off_entity_fades_every_address_to_zero() {
    let (resolver, inventory, transport) = harness().await;
    let mut tap = transport.tap().subscribe();

    resolver
        .off_entity(EntityKind::Apartment, "A-0901")
        .await
        .unwrap();

    for expected in [Addr(0x0901), Addr(0x0902)] {
        let p = next_packet(&mut tap).await;
        assert_eq!(p.addr, expected);
        assert!(matches!(p.command, Command::Fade(ch) if ch.level == 0));
    }
    assert_eq!(inventory.apartment("A-0901").unwrap().state, LightState::Off);
    transport.shutdown().await;
}

#[tokio::test]
async fn fixture_kind_addresses_the_bus_directly() {
    let (resolver, _inventory, transport) = harness().await;
    let mut tap = transport.tap().subscribe();

    resolver
        .light_entity(
            EntityKind::Fixture,
            "4097",
            LightState::Selected,
            LightRequest::default(),
        )
        .await
        .unwrap();
    let p = next_packet(&mut tap).await;
    assert_eq!(p.addr, Addr(4097));
    transport.shutdown().await;
}
