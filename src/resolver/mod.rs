//! # Resolver: high-level intents → ordered wire packets.
//!
//! The resolver joins the inventory tables, applies the state→color rules,
//! scales intensity, plans fades, and enqueues one packet per fixture
//! address. Failures follow §-level policy: a batch isolates its items, a
//! multi-packet intent stops on the first transport error and does not mark
//! the apartment's persisted state.
//!
//! ## Flow (light apartment)
//! ```text
//! lookup apartment ──► NotFound
//!   └─► address list (ordered by light index) ──► NoAddresses when empty
//!         └─► color = rgb override | state default
//!               └─► scale channels ⌊c·intensity/255⌋
//!                     └─► fade_ms > 0 ? RGB_FADE (planned per channel) : RGB_LEVEL
//!                           └─► enqueue per fixture ──► mark persisted state
//! ```
//!
//! ## Rules
//! - Lighting a floor group emits independent per-fixture packets, never a
//!   broadcast, so per-fixture addressing stays authoritative.
//! - off_all / on_all emit a single broadcast packet; a following per-fixture
//!   command may race visually with the device-side fan-out (documented).
//! - Fades are planned from an assumed current level of 0. That is wrong
//!   after prior illumination and preserved on purpose; the opt-in last-level
//!   cache (`track_levels`) plans from the last scaled color instead.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::codec::{Addr, Command, FadePlan, Packet};
use crate::config::Config;
use crate::error::{LightError, LightResult};
use crate::inventory::{Color, Inventory, LightState};
use crate::transport::{CommandSource, Transport};

/// Which table a request identifier points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A single apartment.
    Apartment,
    /// Every apartment of a floor group.
    FloorGroup,
    /// One fixture addressed directly.
    Fixture,
}

impl EntityKind {
    /// Label used in `NotFound` errors and audit records.
    pub fn as_label(&self) -> &'static str {
        match self {
            EntityKind::Apartment => "apartment",
            EntityKind::FloorGroup => "floor_group",
            EntityKind::Fixture => "fixture",
        }
    }
}

/// Per-request overrides accompanying a state change.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightRequest {
    /// Intensity override; absent uses the per-state default.
    pub intensity: Option<u8>,
    /// Fade duration override; absent uses the configured default.
    pub fade: Option<Duration>,
    /// Color override; absent uses the state's default color.
    pub rgb: Option<Color>,
}

/// One entry of a batch call.
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Table to resolve against.
    pub kind: EntityKind,
    /// Entity identifier (fixture addresses in decimal).
    pub id: String,
    /// Requested state.
    pub state: LightState,
    /// Overrides.
    pub request: LightRequest,
}

/// Per-item result of a batch call.
#[derive(Debug)]
pub struct BatchOutcome {
    /// The item's identifier.
    pub id: String,
    /// Success or the item's own failure; siblings are unaffected.
    pub result: LightResult<()>,
}

/// Expands intents into packets on the transport.
pub struct Resolver {
    inventory: Arc<Inventory>,
    transport: Arc<Transport>,
    config: Config,
    /// Last scaled color per fixture; only populated when `track_levels`.
    last_levels: Option<DashMap<Addr, Color>>,
}

impl Resolver {
    /// Creates a resolver over the shared inventory and transport.
    pub fn new(inventory: Arc<Inventory>, transport: Arc<Transport>, config: Config) -> Self {
        let last_levels = config.track_levels.then(DashMap::new);
        Self {
            inventory,
            transport,
            config,
            last_levels,
        }
    }

    /// Lights one entity. Persists apartment states on success.
    pub async fn light_entity(
        &self,
        kind: EntityKind,
        id: &str,
        state: LightState,
        request: LightRequest,
    ) -> LightResult<()> {
        match kind {
            EntityKind::Apartment => self.light_apartment(id, state, request).await,
            EntityKind::FloorGroup => self.light_group(id, state, request).await,
            EntityKind::Fixture => {
                let addr = parse_fixture_id(id)?;
                self.light_addresses(&[addr], state, request).await
            }
        }
    }

    /// Lights one apartment and marks its persisted state.
    pub async fn light_apartment(
        &self,
        id: &str,
        state: LightState,
        request: LightRequest,
    ) -> LightResult<()> {
        let apartment = self
            .inventory
            .apartment(id)
            .ok_or_else(|| LightError::NotFound {
                kind: "apartment",
                id: id.to_string(),
            })?;
        if apartment.is_unlit_shell() {
            return Err(LightError::NoAddresses { id: id.to_string() });
        }
        self.light_addresses(&apartment.lights, state, request)
            .await?;
        self.inventory.set_state(id, state);
        Ok(())
    }

    /// Lights every apartment of a floor group, packet per fixture.
    pub async fn light_group(
        &self,
        group_id: &str,
        state: LightState,
        request: LightRequest,
    ) -> LightResult<()> {
        if self.inventory.group(group_id).is_none() {
            return Err(LightError::NotFound {
                kind: "floor_group",
                id: group_id.to_string(),
            });
        }
        for apartment in self.inventory.group_members(group_id) {
            if apartment.is_unlit_shell() {
                // A shell in the group doesn't abort its neighbors.
                tracing::debug!(apartment = %apartment.id, "skipping shell without fixtures");
                continue;
            }
            self.light_addresses(&apartment.lights, state, request)
                .await?;
            self.inventory.set_state(&apartment.id, state);
        }
        Ok(())
    }

    /// Per-item processing; individual failures do not abort the batch.
    pub async fn light_batch(&self, items: Vec<BatchItem>) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let result = self
                .light_entity(item.kind, &item.id, item.state, item.request)
                .await;
            if let Err(e) = &result {
                tracing::debug!(id = %item.id, error = %e, "batch item failed");
            }
            outcomes.push(BatchOutcome {
                id: item.id,
                result,
            });
        }
        outcomes
    }

    /// FADE to level 0 on every address of an entity.
    pub async fn off_entity(&self, kind: EntityKind, id: &str) -> LightResult<()> {
        let addresses = match kind {
            EntityKind::Apartment => {
                let apartment =
                    self.inventory
                        .apartment(id)
                        .ok_or_else(|| LightError::NotFound {
                            kind: "apartment",
                            id: id.to_string(),
                        })?;
                if apartment.is_unlit_shell() {
                    return Err(LightError::NoAddresses { id: id.to_string() });
                }
                apartment.lights
            }
            EntityKind::FloorGroup => {
                if self.inventory.group(id).is_none() {
                    return Err(LightError::NotFound {
                        kind: "floor_group",
                        id: id.to_string(),
                    });
                }
                self.inventory
                    .group_members(id)
                    .into_iter()
                    .flat_map(|a| a.lights)
                    .collect()
            }
            EntityKind::Fixture => vec![parse_fixture_id(id)?],
        };

        let fade_ms = self.config.default_fade.as_millis() as u64;
        for addr in &addresses {
            // Turning off assumes a fully lit fixture unless the cache knows
            // better; planning 0→0 would degenerate to an instant cut.
            let cached = self.assumed_level(*addr).max_channel();
            let start = if cached > 0 { cached } else { 255 };
            let plan = FadePlan::between(start, 0, fade_ms);
            let command = Command::Fade(crate::codec::ChannelFade {
                level: 0,
                interval: plan.interval,
                step: plan.step,
            });
            self.transport
                .enqueue(&Packet::new(*addr, command), CommandSource::Resolver)
                .await?;
            self.remember(*addr, Color::default());
        }
        if kind == EntityKind::Apartment {
            self.inventory.set_state(id, LightState::Off);
        }
        Ok(())
    }

    /// Single broadcast OFF.
    pub async fn off_all(&self) -> LightResult<()> {
        self.transport
            .enqueue(
                &Packet::new(Addr::BROADCAST, Command::Off),
                CommandSource::Resolver,
            )
            .await
    }

    /// Single broadcast LEVEL at the requested (or default) intensity.
    pub async fn on_all(&self, intensity: Option<u8>) -> LightResult<()> {
        let level = intensity.unwrap_or(self.config.default_intensity);
        self.transport
            .enqueue(
                &Packet::new(Addr::BROADCAST, Command::Level { level }),
                CommandSource::Resolver,
            )
            .await
    }

    /// Shared tail of every lighting intent: one packet per address.
    async fn light_addresses(
        &self,
        addresses: &[Addr],
        state: LightState,
        request: LightRequest,
    ) -> LightResult<()> {
        let style = self.inventory.style_for(state);
        let color = request.rgb.unwrap_or(style.color);
        let intensity = request.intensity.unwrap_or(style.intensity);
        let scaled = color.scaled(intensity);
        let fade = request.fade.unwrap_or(self.config.default_fade);
        let fade_ms = fade.as_millis() as u64;

        for addr in addresses {
            let command = if fade_ms > 0 {
                let from = self.assumed_level(*addr);
                Command::RgbFade {
                    r: FadePlan::channel(from.r, scaled.r, fade_ms),
                    g: FadePlan::channel(from.g, scaled.g, fade_ms),
                    b: FadePlan::channel(from.b, scaled.b, fade_ms),
                }
            } else {
                Command::RgbLevel {
                    r: scaled.r,
                    g: scaled.g,
                    b: scaled.b,
                }
            };
            self.transport
                .enqueue(&Packet::new(*addr, command), CommandSource::Resolver)
                .await?;
            self.remember(*addr, scaled);
        }
        Ok(())
    }

    /// Fade source level: 0 unless the last-level cache is enabled.
    fn assumed_level(&self, addr: Addr) -> Color {
        self.last_levels
            .as_ref()
            .and_then(|cache| cache.get(&addr).map(|c| *c))
            .unwrap_or_default()
    }

    fn remember(&self, addr: Addr, color: Color) {
        if let Some(cache) = &self.last_levels {
            cache.insert(addr, color);
        }
    }
}

/// Fixture ids arrive as decimal bus addresses.
fn parse_fixture_id(id: &str) -> LightResult<Addr> {
    let raw: u32 = id.trim().parse().map_err(|_| LightError::NotFound {
        kind: "fixture",
        id: id.to_string(),
    })?;
    if raw > u32::from(u16::MAX) {
        return Err(LightError::BadRange {
            what: "fixture address",
            value: i64::from(raw),
            min: 0,
            max: i64::from(u16::MAX),
        });
    }
    Ok(Addr(raw as u16))
}
