//! # Session controller: login/logout and ambient exclusion.
//!
//! A two-state machine, idle or active, toggled by external login/logout
//! calls. It is the only component allowed to start or stop the animation
//! engine during normal operation.
//!
//! ## Login flow
//! ```text
//! login(agent)
//!   ├─► already active → refresh agent, no-op success
//!   ├─► raise session flag (engine starts become no-ops)
//!   ├─► engine.stop() (cancel → join)
//!   ├─► fade-down: floors highest → lowest
//!   │     ├─► FADE-to-0 per fixture (completion awaited per packet)
//!   │     └─► inter-floor delay (login_fade_delay, default 100 ms)
//!   └─► state = Active
//!
//! logout(agent)
//!   ├─► idle → no-op success
//!   ├─► state = Idle, clear session flag
//!   └─► ambient_enabled → engine.start(configured sequence)
//! ```
//!
//! ## Rules
//! - The session flag is raised before the fade-down, so nothing can restart
//!   the engine mid-fade.
//! - A failed fade-down leaves the machine idle (flag cleared) and surfaces
//!   the transport error; no partial "session active" claim.
//! - Within a floor, fixture order is arbitrary; across floors the delay
//!   makes the sweep deterministic top to bottom.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::animation::{AnimationEngine, SequenceLibrary};
use crate::audit::SessionLog;
use crate::codec::{ChannelFade, Command, FadePlan, Packet};
use crate::config::Config;
use crate::error::LightResult;
use crate::inventory::Inventory;
use crate::transport::{CommandSource, Transport};

/// The two session states.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum SessionPhase {
    /// No client controls the installation; ambient may run.
    Idle,
    /// A client session suppresses ambient.
    Active {
        /// Opaque agent identifier supplied at login.
        agent: String,
    },
}

/// Login/logout state machine.
pub struct SessionController {
    transport: Arc<Transport>,
    inventory: Arc<Inventory>,
    engine: Arc<AnimationEngine>,
    sequences: Arc<SequenceLibrary>,
    session_log: Arc<SessionLog>,
    config: Config,
    /// Shared with the engine; raised while a session is active.
    active_flag: Arc<AtomicBool>,
    /// Serializes login/logout; also holds the current phase.
    state: Mutex<SessionPhase>,
}

impl SessionController {
    /// Creates the controller in the idle state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<Transport>,
        inventory: Arc<Inventory>,
        engine: Arc<AnimationEngine>,
        sequences: Arc<SequenceLibrary>,
        session_log: Arc<SessionLog>,
        config: Config,
        active_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transport,
            inventory,
            engine,
            sequences,
            session_log,
            config,
            active_flag,
            state: Mutex::new(SessionPhase::Idle),
        }
    }

    /// Current phase snapshot.
    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.clone()
    }

    /// True while a session is active (engine exclusion flag).
    pub fn is_active(&self) -> bool {
        self.active_flag.load(AtomicOrdering::SeqCst)
    }

    /// Logs a client in: stop ambient, fade the tower down, go active.
    ///
    /// Completes only after the fade-down's last packet completed. A repeat
    /// login refreshes the agent id without re-running the fade.
    pub async fn login(&self, agent: &str) -> LightResult<()> {
        let mut state = self.state.lock().await;
        if let SessionPhase::Active {
            agent: current_agent,
        } = &mut *state
        {
            tracing::debug!(agent, "repeat login, refreshing agent");
            *current_agent = agent.to_string();
            return Ok(());
        }

        // Raise the flag first: engine starts become no-ops before we cancel.
        self.active_flag.store(true, AtomicOrdering::SeqCst);
        self.engine.stop().await;

        if let Err(e) = self.fade_down().await {
            self.active_flag.store(false, AtomicOrdering::SeqCst);
            tracing::warn!(agent, error = %e, "login fade-down failed");
            return Err(e);
        }

        *state = SessionPhase::Active {
            agent: agent.to_string(),
        };
        self.session_log.login(agent);
        tracing::info!(agent, "session active");
        Ok(())
    }

    /// Logs a client out and resumes ambient when configured.
    pub async fn logout(&self, agent: &str) -> LightResult<()> {
        let mut state = self.state.lock().await;
        if *state == SessionPhase::Idle {
            return Ok(());
        }

        *state = SessionPhase::Idle;
        self.active_flag.store(false, AtomicOrdering::SeqCst);
        self.session_log.logout(agent);
        tracing::info!(agent, "session idle");

        if self.config.ambient_enabled {
            match self.sequences.get(&self.config.ambient_sequence_id) {
                Some(sequence) => {
                    self.engine.start(sequence).await;
                }
                None => tracing::warn!(
                    id = %self.config.ambient_sequence_id,
                    "configured ambient sequence not registered"
                ),
            }
        }
        Ok(())
    }

    /// Deterministic fade-down from the highest populated floor to the lowest.
    async fn fade_down(&self) -> LightResult<()> {
        let fade_ms = self.config.default_fade.as_millis() as u64;
        let plan = FadePlan::between(255, 0, fade_ms);
        let command = Command::Fade(ChannelFade {
            level: 0,
            interval: plan.interval,
            step: plan.step,
        });

        let floors = self.inventory.floors_descending();
        let mut floors_iter = floors.iter().peekable();
        while let Some(&floor) = floors_iter.next() {
            for apartment in self.inventory.floor_members(floor) {
                for addr in apartment.lights {
                    self.transport
                        .enqueue(&Packet::new(addr, command), CommandSource::Session)
                        .await?;
                }
            }
            if floors_iter.peek().is_some() {
                tokio::time::sleep(self.config.login_fade_delay).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::animation::{Sequence, SequenceKind};
    use crate::codec::Addr;
    use crate::inventory::{ApartmentRecord, FloorGroup, LightRef};
    use crate::transport::{ReconnectPolicy, SimSink};

    async fn harness(ambient_enabled: bool) -> (Arc<SessionController>, Arc<AnimationEngine>, Arc<Transport>) {
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
                vec![
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
                ],
                vec![
                    ApartmentRecord {
                        id: "A-0901".into(),
                        floor: 9,
                        group_id: "T1-F09".into(),
                        unit_position: 1,
                        lights: vec![LightRef {
                            index: 1,
                            addr: Addr(0x0901),
                        }],
                    },
                    ApartmentRecord {
                        id: "A-1001".into(),
                        floor: 10,
                        group_id: "T1-F10".into(),
                        unit_position: 1,
                        lights: vec![LightRef {
                            index: 1,
                            addr: Addr(0x1001),
                        }],
                    },
                ],
            )
            .unwrap();

        let active_flag = Arc::new(AtomicBool::new(false));
        let engine = Arc::new(AnimationEngine::new(
            Arc::clone(&transport),
            Arc::clone(&inventory),
            Arc::clone(&active_flag),
        ));
        let sequences = Arc::new(SequenceLibrary::default());
        sequences.register(Sequence::new("breathe", SequenceKind::Breathe {
            min: 0,
            max: 100,
            period: Duration::from_millis(400),
        }));

        let mut config = Config::default();
        config.ambient_enabled = ambient_enabled;
        config.ambient_sequence_id = "breathe".into();
        config.login_fade_delay = Duration::from_millis(10);

        let controller = Arc::new(SessionController::new(
            Arc::clone(&transport),
            inventory,
            Arc::clone(&engine),
            sequences,
            Arc::new(SessionLog::new(64)),
            config,
            active_flag,
        ));
        (controller, engine, transport)
    }

    #[tokio::test]
    async fn login_fades_top_floor_first_and_goes_active() {
        let (controller, engine, transport) = harness(true).await;
        let mut tap_rx = transport.tap().subscribe();

        controller.login("agent-7").await.unwrap();
        assert!(controller.is_active());
        assert!(!engine.is_running());
        assert_eq!(controller.phase().await, SessionPhase::Active {
            agent: "agent-7".into()
        });

        // Floor 10 fixture before floor 9 fixture.
        let first = tap_rx.recv().await.unwrap();
        let second = tap_rx.recv().await.unwrap();
        let p1 = Packet::decode_wire(&first.bytes).unwrap();
        let p2 = Packet::decode_wire(&second.bytes).unwrap();
        assert_eq!(p1.addr, Addr(0x1001));
        assert_eq!(p2.addr, Addr(0x0901));
        assert!(matches!(p1.command, Command::Fade(ch) if ch.level == 0));

        // Queue drained: both jobs completed before login returned.
        assert_eq!(transport.status().queue_depth, 0);
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn logout_resumes_ambient_only_when_enabled() {
        let (controller, engine, transport) = harness(true).await;
        controller.login("agent-7").await.unwrap();
        controller.logout("agent-7").await.unwrap();
        assert!(!controller.is_active());
        // Engine restarted with the configured ambient sequence.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(engine.is_running());
        engine.stop().await;
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn logout_stays_idle_when_ambient_disabled() {
        let (controller, engine, transport) = harness(false).await;
        controller.login("agent-7").await.unwrap();
        controller.logout("agent-7").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!engine.is_running());
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn repeat_login_is_a_noop_refreshing_the_agent() {
        let (controller, _engine, transport) = harness(true).await;
        controller.login("first").await.unwrap();
        let sent_before = transport.status().sent;
        controller.login("second").await.unwrap();
        assert_eq!(transport.status().sent, sent_before);
        assert_eq!(controller.phase().await, SessionPhase::Active {
            agent: "second".into()
        });
        transport.shutdown().await;
    }
}
