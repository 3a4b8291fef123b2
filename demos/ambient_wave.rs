//! Watch the ambient wave run on the simulator for a few seconds.
//!
//! Run with: `cargo run --example ambient_wave`

use std::sync::Arc;
use std::time::Duration;

use lumibus::{
    ApartmentRecord, Config, FloorGroup, Installation, Inventory, LightRef, Settings,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let inventory = Arc::new(Inventory::new());
    let groups: Vec<FloorGroup> = (1..=5)
        .map(|floor| FloorGroup {
            id: format!("T1-F{floor:02}"),
            tower: "T1".into(),
            floor,
        })
        .collect();
    let apartments: Vec<ApartmentRecord> = (1..=5)
        .map(|floor| ApartmentRecord {
            id: format!("A-{floor:02}01"),
            floor,
            group_id: format!("T1-F{floor:02}"),
            unit_position: 1,
            lights: vec![LightRef {
                index: 1,
                addr: lumibus::Addr(floor as u16 * 16),
            }],
        })
        .collect();
    inventory.load(groups, apartments)?;

    let settings = Settings::new()
        .with("simulation_mode", "true")
        .with("ambient_enabled", "true")
        .with("ambient_sequence_id", "wave");
    let installation = Installation::start(Config::from_settings(&settings), inventory).await?;

    for tick in 0..10 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let lit = installation
            .simulator()
            .snapshot()
            .iter()
            .filter(|row| row.state.on)
            .count();
        println!("t={:>4}ms lit fixtures: {lit}/5", tick * 500);
    }

    installation.shutdown().await;
    Ok(())
}
