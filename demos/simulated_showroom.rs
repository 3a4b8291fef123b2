//! A showroom session against the simulated sink.
//!
//! Loads a small two-floor tower, lights a few apartments, runs a login/
//! logout cycle, and prints the virtual fixture table at each step.
//!
//! Run with: `cargo run --example simulated_showroom`

use std::sync::Arc;

use lumibus::{
    ApartmentRecord, Config, EntityKind, FloorGroup, Installation, Inventory, LightRef,
    RawLightCall, Settings,
};

fn load_inventory() -> anyhow::Result<Arc<Inventory>> {
    let inventory = Arc::new(Inventory::new());
    let groups = vec![
        FloorGroup {
            id: "T1-F09".into(),
            tower: "T1".into(),
            floor: 9,
        },
        FloorGroup {
            id: "T1-F10".into(),
            tower: "T1".into(),
            floor: 10,
        },
    ];
    let mut apartments = Vec::new();
    for (floor, group) in [(9, "T1-F09"), (10, "T1-F10")] {
        for unit in 1..=4u16 {
            apartments.push(ApartmentRecord {
                id: format!("A-{floor:02}{unit:02}"),
                floor,
                group_id: group.into(),
                unit_position: unit,
                lights: vec![LightRef {
                    index: 1,
                    addr: lumibus::Addr((floor as u16) << 8 | unit),
                }],
            });
        }
    }
    inventory.load(groups, apartments)?;
    Ok(inventory)
}

fn print_table(installation: &Installation, label: &str) {
    println!("--- {label} ---");
    for row in installation.simulator().snapshot() {
        println!(
            "  {}  on={} level={} rgb=({}, {}, {})",
            row.addr, row.state.on, row.state.level, row.state.r, row.state.g, row.state.b
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::new()
        .with("simulation_mode", "true")
        .with("default_fade_time_ms", "0")
        .with("ambient_enabled", "false");
    let config = Config::from_settings(&settings);

    let installation = Installation::start(config, load_inventory()?).await?;

    // A buyer's view: two units available, one sold, one reserved.
    installation
        .light_entity(EntityKind::Apartment, "A-0901", &RawLightCall {
            state: "AVAILABLE".into(),
            ..Default::default()
        })
        .await?;
    installation
        .light_entity(EntityKind::Apartment, "A-0902", &RawLightCall {
            state: "SOLD".into(),
            ..Default::default()
        })
        .await?;
    installation
        .light_entity(EntityKind::FloorGroup, "T1-F10", &RawLightCall {
            state: "RESERVED".into(),
            intensity: Some(128),
            ..Default::default()
        })
        .await?;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    print_table(&installation, "after state commands");

    // An agent takes over: the tower fades down top to bottom.
    installation.login("demo-agent").await?;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    print_table(&installation, "after login fade-down");

    installation.logout("demo-agent").await?;

    let status = installation.query_status().await;
    println!(
        "link={:?} sent={} queue_depth={}",
        status.transport.state, status.transport.sent, status.transport.queue_depth
    );

    installation.shutdown().await;
    Ok(())
}
