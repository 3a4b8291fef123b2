//! # Simulator: virtual fixtures fed by the frame tap.
//!
//! The simulator is a [`FrameObserver`]: every packet the transport emits is
//! decoded leniently (a garbled checksum never hides a command) and
//! replayed against a virtual fixture table. Clients exercise the whole
//! pipeline without hardware and query the table through the facade.
//!
//! ## Rules
//! - Fades collapse to their final value; intermediate steps are not
//!   simulated. FLASH likewise collapses, settling on its first phase level
//!   (`level_a`).
//! - Pseudo-address commands (PADDSET / PADDERASE) configure routing, not
//!   light output; they never alter fixture state.
//! - Broadcast expands to every known fixture: the inventory's addresses
//!   plus any address already seen on the wire.
//! - Checksum mismatches are ignored; truncated frames are dropped with a
//!   debug log. The diagnostic path never crashes the process.

use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;

use crate::codec::{Addr, Command, FrameSplitter, Packet};
use crate::inventory::Inventory;
use crate::transport::{EmittedFrame, FrameObserver};
use std::sync::Arc;

/// Virtual state of one fixture.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FixtureState {
    /// Whether the fixture is emitting light.
    pub on: bool,
    /// Overall level (max channel for RGB commands).
    pub level: u8,
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// When the fixture last changed.
    pub last_updated: SystemTime,
}

impl FixtureState {
    fn dark() -> Self {
        Self {
            on: false,
            level: 0,
            r: 0,
            g: 0,
            b: 0,
            last_updated: SystemTime::now(),
        }
    }

    fn set_rgb(&mut self, r: u8, g: u8, b: u8) {
        self.r = r;
        self.g = g;
        self.b = b;
        self.level = r.max(g).max(b);
        self.on = self.level > 0;
        self.last_updated = SystemTime::now();
    }

    fn set_level(&mut self, level: u8) {
        self.set_rgb(level, level, level);
    }
}

/// One row of a simulator query, address included.
#[derive(Debug, Clone, Serialize)]
pub struct FixtureRow {
    /// Bus address.
    pub addr: Addr,
    /// Current virtual state.
    #[serde(flatten)]
    pub state: FixtureState,
}

/// The virtual fixture table.
pub struct Simulator {
    inventory: Arc<Inventory>,
    fixtures: DashMap<Addr, FixtureState>,
}

impl Simulator {
    /// Creates a simulator primed with the inventory's fixtures, all off.
    pub fn new(inventory: Arc<Inventory>) -> Self {
        let sim = Self {
            inventory,
            fixtures: DashMap::new(),
        };
        sim.reset();
        sim
    }

    /// Resets every fixture to off, re-priming from the inventory.
    pub fn reset(&self) {
        self.fixtures.clear();
        for addr in self.inventory.all_addresses() {
            self.fixtures.insert(addr, FixtureState::dark());
        }
    }

    /// Applies one decoded packet to the table.
    pub fn apply(&self, packet: &Packet) {
        if packet.addr.is_broadcast() {
            // Known fixtures: inventory plus anything seen on the wire.
            for addr in self.inventory.all_addresses() {
                self.fixtures.entry(addr).or_insert_with(FixtureState::dark);
            }
            for mut entry in self.fixtures.iter_mut() {
                Self::apply_command(entry.value_mut(), &packet.command);
            }
        } else {
            let mut entry = self
                .fixtures
                .entry(packet.addr)
                .or_insert_with(FixtureState::dark);
            Self::apply_command(entry.value_mut(), &packet.command);
        }
    }

    fn apply_command(fixture: &mut FixtureState, command: &Command) {
        match command {
            Command::On => fixture.set_rgb(255, 255, 255),
            Command::Off => fixture.set_level(0),
            Command::Level { level } => fixture.set_level(*level),
            // Fades collapse to the final value.
            Command::Fade(ch) => fixture.set_level(ch.level),
            Command::RgbLevel { r, g, b } => fixture.set_rgb(*r, *g, *b),
            Command::RgbFade { r, g, b } => fixture.set_rgb(r.level, g.level, b.level),
            // Like fades, a flash collapses: it settles on its first phase.
            Command::Flash { level_a, .. } => fixture.set_level(*level_a),
            // Routing configuration, not light output.
            Command::PseudoAddrSet { .. } | Command::PseudoAddrErase => {}
        }
    }

    /// The whole table, ordered by address.
    pub fn snapshot(&self) -> Vec<FixtureRow> {
        let mut rows: Vec<FixtureRow> = self
            .fixtures
            .iter()
            .map(|e| FixtureRow {
                addr: *e.key(),
                state: *e.value(),
            })
            .collect();
        rows.sort_by_key(|r| r.addr);
        rows
    }

    /// One fixture's state.
    pub fn fixture(&self, addr: Addr) -> Option<FixtureState> {
        self.fixtures.get(&addr).map(|s| *s)
    }

    /// The slice of fixtures on one floor, via the inventory join.
    pub fn floor_slice(&self, floor: i32) -> Vec<FixtureRow> {
        let mut rows = Vec::new();
        for apartment in self.inventory.floor_members(floor) {
            for addr in apartment.lights {
                if let Some(state) = self.fixture(addr) {
                    rows.push(FixtureRow { addr, state });
                }
            }
        }
        rows
    }

    /// Number of tracked fixtures.
    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    /// True when no fixture is tracked.
    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }
}

#[async_trait]
impl FrameObserver for Simulator {
    async fn on_frame(&self, frame: &EmittedFrame) {
        let mut splitter = FrameSplitter::new();
        for payload in splitter.feed(&frame.bytes) {
            match Packet::decode_lenient(&payload) {
                Ok(packet) => self.apply(&packet),
                Err(e) => {
                    tracing::debug!(error = %e, seq = frame.seq, "simulator skipped undecodable frame");
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "simulator"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ChannelFade;
    use crate::inventory::{ApartmentRecord, FloorGroup, LightRef};

    fn primed() -> Simulator {
        let inventory = Arc::new(Inventory::new());
        inventory
            .load(
                vec![FloorGroup {
                    id: "T1-F01".into(),
                    tower: "T1".into(),
                    floor: 1,
                }],
                vec![ApartmentRecord {
                    id: "A-0101".into(),
                    floor: 1,
                    group_id: "T1-F01".into(),
                    unit_position: 1,
                    lights: vec![
                        LightRef {
                            index: 1,
                            addr: Addr(10),
                        },
                        LightRef {
                            index: 2,
                            addr: Addr(11),
                        },
                    ],
                }],
            )
            .unwrap();
        Simulator::new(inventory)
    }

    #[test]
    fn primes_all_inventory_fixtures_off() {
        let sim = primed();
        assert_eq!(sim.len(), 2);
        assert!(!sim.fixture(Addr(10)).unwrap().on);
    }

    #[test]
    fn rgb_level_sets_channels_and_level() {
        let sim = primed();
        sim.apply(&Packet::new(Addr(10), Command::RgbLevel {
            r: 255,
            g: 128,
            b: 0,
        }));
        let f = sim.fixture(Addr(10)).unwrap();
        assert!(f.on);
        assert_eq!((f.r, f.g, f.b), (255, 128, 0));
        assert_eq!(f.level, 255);
    }

    #[test]
    fn fades_collapse_to_their_final_value() {
        let sim = primed();
        sim.apply(&Packet::new(
            Addr(10),
            Command::Fade(ChannelFade {
                level: 0,
                interval: 1,
                step: 6,
            }),
        ));
        let f = sim.fixture(Addr(10)).unwrap();
        assert!(!f.on);
        assert_eq!(f.level, 0);

        sim.apply(&Packet::new(Addr(10), Command::RgbFade {
            r: ChannelFade {
                level: 200,
                interval: 1,
                step: 3,
            },
            g: ChannelFade {
                level: 100,
                interval: 1,
                step: 2,
            },
            b: ChannelFade {
                level: 0,
                interval: 1,
                step: 1,
            },
        }));
        let f = sim.fixture(Addr(10)).unwrap();
        assert!(f.on);
        assert_eq!(f.level, 200);
    }

    #[test]
    fn flash_settles_on_its_first_phase_level() {
        let sim = primed();
        sim.apply(&Packet::new(
            Addr(10),
            Command::Flash {
                steps: 6,
                interval_a: 50,
                interval_b: 50,
                level_a: 200,
                level_b: 0,
            },
        ));
        let f = sim.fixture(Addr(10)).unwrap();
        assert!(f.on);
        assert_eq!(f.level, 200);
    }

    #[test]
    fn pseudo_address_commands_leave_fixture_state_untouched() {
        let sim = primed();
        sim.apply(&Packet::new(Addr(10), Command::Level { level: 90 }));
        sim.apply(&Packet::new(Addr(10), Command::PseudoAddrSet {
            addr: Addr(0x0203),
        }));
        sim.apply(&Packet::new(Addr(10), Command::PseudoAddrErase));
        let f = sim.fixture(Addr(10)).unwrap();
        assert!(f.on);
        assert_eq!(f.level, 90);
    }

    #[test]
    fn broadcast_expands_to_all_fixtures() {
        let sim = primed();
        sim.apply(&Packet::new(Addr::BROADCAST, Command::On));
        assert!(sim.snapshot().iter().all(|r| r.state.on && r.state.level == 255));
        sim.apply(&Packet::new(Addr::BROADCAST, Command::Off));
        assert!(sim.snapshot().iter().all(|r| !r.state.on));
    }

    #[test]
    fn unknown_addresses_join_the_table_on_first_frame() {
        let sim = primed();
        sim.apply(&Packet::new(Addr(999), Command::Level { level: 40 }));
        assert_eq!(sim.len(), 3);
        assert_eq!(sim.fixture(Addr(999)).unwrap().level, 40);
    }

    #[test]
    fn reset_returns_to_the_primed_state() {
        let sim = primed();
        sim.apply(&Packet::new(Addr(999), Command::On));
        sim.reset();
        assert_eq!(sim.len(), 2);
        assert!(!sim.fixture(Addr(10)).unwrap().on);
        assert!(sim.fixture(Addr(999)).is_none());
    }

    #[tokio::test]
    async fn observer_path_decodes_wire_bytes_leniently() {
        use crate::transport::CommandSource;
        let sim = primed();
        // Corrupt the checksum byte; lenient decode still applies the command.
        let mut bytes = Packet::new(Addr(10), Command::On).encode();
        let n = bytes.len();
        bytes[n - 2] ^= 0xFF;
        sim.on_frame(&EmittedFrame::now(bytes, true, CommandSource::Diagnostic))
            .await;
        assert!(sim.fixture(Addr(10)).unwrap().on);
    }

    #[test]
    fn floor_slice_follows_the_inventory_join() {
        let sim = primed();
        sim.apply(&Packet::new(Addr(10), Command::Level { level: 10 }));
        let slice = sim.floor_slice(1);
        assert_eq!(slice.len(), 2);
        assert!(sim.floor_slice(2).is_empty());
    }
}
