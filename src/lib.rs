//! # lumibus
//!
//! **Lumibus** is the middleware behind an architectural-model lighting
//! installation: many addressable RGB fixtures on a serial bus, driven by
//! high-level state commands ("apartment X is AVAILABLE") from external
//! clients, with ambient animation whenever no client is active.
//!
//! ## Features
//!
//! | Area            | Description                                                         | Key types                                    |
//! |-----------------|---------------------------------------------------------------------|----------------------------------------------|
//! | **Codec**       | Framing, XOR checksum, command layouts, fade planning. Pure.        | [`Packet`], [`Command`], [`Addr`], [`FadePlan`] |
//! | **Inventory**   | Apartments, floor groups, the closed state set, indexed joins.      | [`Inventory`], [`LightState`], [`Apartment`] |
//! | **Transport**   | Single-writer FIFO over the serial endpoint, reconnect, frame tap.  | [`Transport`], [`FrameSink`], [`FrameObserver`] |
//! | **Resolver**    | Intent → ordered per-fixture packets with state→color rules.        | [`Resolver`], [`LightRequest`], [`EntityKind`] |
//! | **Session**     | Login/logout machine; top-to-bottom fade-down; ambient exclusion.   | [`SessionController`], [`SessionPhase`]      |
//! | **Animation**   | Cooperative engine over the enumerated sequence kinds.              | [`AnimationEngine`], [`Sequence`]            |
//! | **Simulator**   | Virtual fixture table mirroring every emitted frame.                | [`Simulator`]                                |
//! | **Facade**      | The wired runtime and the external operation surface.               | [`Installation`]                             |
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumibus::{
//!     Config, EntityKind, Installation, Inventory, RawLightCall, Settings,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::new()
//!         .with("simulation_mode", "true")
//!         .with("ambient_sequence_id", "wave");
//!     let config = Config::from_settings(&settings);
//!
//!     let inventory = Arc::new(Inventory::new());
//!     // ... load floor groups and apartments ...
//!
//!     let installation = Installation::start(config, inventory).await?;
//!     installation
//!         .light_entity(EntityKind::Apartment, "A-0901", &RawLightCall {
//!             state: "AVAILABLE".into(),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     let status = installation.query_status().await;
//!     println!("link: {:?}", status.transport.state);
//!     installation.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod animation;
mod audit;
mod codec;
mod config;
mod error;
mod installation;
mod inventory;
mod resolver;
mod session;
mod simulator;
mod transport;

// ---- Public re-exports ----

pub use animation::{
    AnimationEngine, Sequence, SequenceKind, SequenceLibrary, SequenceStep, WaveDirection,
};
pub use audit::{CommandLog, CommandRecord, SessionEvent, SessionLog, WireAudit, WireRecord};
pub use codec::{Addr, ChannelFade, Command, FadePlan, FrameSplitter, Packet};
pub use config::{Config, Settings};
pub use error::{LightError, LightResult};
pub use installation::{Installation, RawLightCall, StatusReport};
pub use inventory::{
    Apartment, ApartmentRecord, Color, FloorGroup, Inventory, InventoryError, LightRef,
    LightState, StateStyle,
};
pub use resolver::{BatchItem, BatchOutcome, EntityKind, LightRequest, Resolver};
pub use session::{SessionController, SessionPhase};
pub use simulator::{FixtureRow, FixtureState, Simulator};
pub use transport::{
    CommandSource, EmittedFrame, FrameObserver, FrameSink, FrameTap, LinkState, ObserverSet,
    ReconnectPolicy, SerialSink, SimSink, Transport, TransportStatus,
};
