//! # The installation facade.
//!
//! [`Installation`] owns the wired runtime (transport, observers, resolver,
//! session controller, animation engine, simulator, audit) and exposes the
//! operations external collaborators consume. The HTTP surface, dashboards,
//! and storage never touch the components directly.
//!
//! ## Wiring
//! ```text
//! Config ──► sink (serial | sim) ──► Transport::connect
//!                                        │ tap
//!                                        ▼
//!                          ObserverSet [ Simulator, WireAudit ]
//!
//! Installation ──► Resolver ─────────┐
//!              ──► SessionController ├──► Transport FIFO
//!              ──► AnimationEngine ──┘
//! ```
//!
//! ## Rules
//! - Startup failures (unreachable serial device, invalid inventory) abort;
//!   runtime transport failures go to reconnect instead.
//! - Every operation is recorded in the command log with its outcome and
//!   execution time.
//! - With ambient enabled, the configured sequence starts at startup (the
//!   installation boots idle) and resumes on logout.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::animation::{AnimationEngine, SequenceLibrary};
use crate::audit::{CommandLog, CommandRecord, SessionLog, WireAudit};
use crate::config::Config;
use crate::error::{LightError, LightResult};
use crate::inventory::{Color, Inventory, LightState};
use crate::resolver::{BatchItem, BatchOutcome, EntityKind, LightRequest, Resolver};
use crate::session::{SessionController, SessionPhase};
use crate::simulator::Simulator;
use crate::transport::{
    CommandSource, FrameObserver, FrameSink, ObserverSet, ReconnectPolicy, SerialSink, SimSink,
    Transport, TransportStatus,
};

/// Boundary shape of a light request, as the HTTP collaborator submits it.
///
/// Numeric fields are wide on purpose: [`RawLightCall::parse`] performs the
/// documented range checks and turns violations into [`LightError::BadRange`]
/// before any packet is built.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLightCall {
    /// Requested state name, e.g. `"AVAILABLE"`.
    pub state: String,
    /// Intensity 0..=255.
    #[serde(default)]
    pub intensity: Option<i64>,
    /// Fade duration in milliseconds.
    #[serde(default)]
    pub fade_ms: Option<i64>,
    /// RGB override, each channel 0..=255.
    #[serde(default)]
    pub rgb: Option<[i64; 3]>,
}

impl RawLightCall {
    /// Validates boundary ranges and the state name.
    pub fn parse(&self) -> LightResult<(LightState, LightRequest)> {
        let state: LightState = self.state.parse()?;

        let intensity = match self.intensity {
            None => None,
            Some(v @ 0..=255) => Some(v as u8),
            Some(v) => {
                return Err(LightError::BadRange {
                    what: "intensity",
                    value: v,
                    min: 0,
                    max: 255,
                })
            }
        };

        let fade = match self.fade_ms {
            None => None,
            Some(v) if v >= 0 => Some(std::time::Duration::from_millis(v as u64)),
            Some(v) => {
                return Err(LightError::BadRange {
                    what: "fade_ms",
                    value: v,
                    min: 0,
                    max: i64::MAX,
                })
            }
        };

        let rgb = match self.rgb {
            None => None,
            Some(channels) => {
                for (name, v) in ["r", "g", "b"].iter().zip(channels) {
                    if !(0..=255).contains(&v) {
                        return Err(LightError::BadRange {
                            what: match *name {
                                "r" => "rgb.r",
                                "g" => "rgb.g",
                                _ => "rgb.b",
                            },
                            value: v,
                            min: 0,
                            max: 255,
                        });
                    }
                }
                Some(Color::new(
                    channels[0] as u8,
                    channels[1] as u8,
                    channels[2] as u8,
                ))
            }
        };

        Ok((state, LightRequest {
            intensity,
            fade,
            rgb,
        }))
    }
}

/// Full status snapshot for `query_status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Transport health and counters.
    pub transport: TransportStatus,
    /// Session phase.
    pub session: SessionPhase,
    /// Whether the animation engine is running.
    pub animation_running: bool,
    /// Id of the running sequence, if any.
    pub animation_sequence: Option<String>,
    /// Fixtures tracked by the simulator.
    pub fixtures_tracked: usize,
    /// Frames dropped per observer since startup.
    pub observer_drops: Vec<(&'static str, u64)>,
}

/// The wired lighting middleware.
pub struct Installation {
    config: Config,
    inventory: Arc<Inventory>,
    transport: Arc<Transport>,
    resolver: Resolver,
    session: SessionController,
    engine: Arc<AnimationEngine>,
    simulator: Arc<Simulator>,
    sequences: Arc<SequenceLibrary>,
    command_log: Arc<CommandLog>,
    session_log: Arc<SessionLog>,
    wire_audit: Arc<WireAudit>,
    observers: Mutex<Option<Arc<ObserverSet>>>,
    /// The tap listener's handle; joined during shutdown so the observer
    /// set's last strong reference is released before the workers drain.
    listener: Mutex<Option<JoinHandle<()>>>,
    token: CancellationToken,
}

impl Installation {
    /// Builds and starts the runtime from a configuration and loaded inventory.
    ///
    /// The sink is chosen by `simulation_mode` (or a missing `com_port`);
    /// an initial serial open failure aborts startup.
    pub async fn start(config: Config, inventory: Arc<Inventory>) -> LightResult<Arc<Self>> {
        Self::start_with_sequences(config, inventory, Arc::new(SequenceLibrary::with_defaults()))
            .await
    }

    /// As [`Installation::start`], with a caller-provided sequence library.
    pub async fn start_with_sequences(
        config: Config,
        inventory: Arc<Inventory>,
        sequences: Arc<SequenceLibrary>,
    ) -> LightResult<Arc<Self>> {
        let sink: Box<dyn FrameSink> = match (&config.com_port, config.simulation_mode) {
            (Some(path), false) => Box::new(SerialSink::new(path.clone(), config.baud_rate)),
            _ => Box::new(SimSink::new()),
        };
        let transport = Transport::connect(sink, ReconnectPolicy::default()).await?;

        let simulator = Arc::new(Simulator::new(Arc::clone(&inventory)));
        let wire_audit = Arc::new(WireAudit::new(1024));
        let token = CancellationToken::new();
        let observers = Arc::new(ObserverSet::new(vec![
            Arc::clone(&simulator) as Arc<dyn FrameObserver>,
            Arc::clone(&wire_audit) as Arc<dyn FrameObserver>,
        ]));
        let listener = Arc::clone(&observers).spawn_listener(transport.tap(), token.clone());

        let active_flag = Arc::new(AtomicBool::new(false));
        let engine = Arc::new(AnimationEngine::new(
            Arc::clone(&transport),
            Arc::clone(&inventory),
            Arc::clone(&active_flag),
        ));
        let session_log = Arc::new(SessionLog::new(256));
        let session = SessionController::new(
            Arc::clone(&transport),
            Arc::clone(&inventory),
            Arc::clone(&engine),
            Arc::clone(&sequences),
            Arc::clone(&session_log),
            config.clone(),
            active_flag,
        );
        let resolver = Resolver::new(
            Arc::clone(&inventory),
            Arc::clone(&transport),
            config.clone(),
        );

        let installation = Arc::new(Self {
            config,
            inventory,
            transport,
            resolver,
            session,
            engine,
            simulator,
            sequences,
            command_log: Arc::new(CommandLog::new(2048)),
            session_log,
            wire_audit,
            observers: Mutex::new(Some(observers)),
            listener: Mutex::new(Some(listener)),
            token,
        });

        // The installation boots idle; ambient runs until a client logs in.
        if installation.config.ambient_enabled {
            if let Some(sequence) = installation
                .sequences
                .get(&installation.config.ambient_sequence_id)
            {
                installation.engine.start(sequence).await;
            }
        }

        Ok(installation)
    }

    /// Lights an entity with boundary validation applied.
    pub async fn light_entity(
        &self,
        kind: EntityKind,
        id: &str,
        call: &RawLightCall,
    ) -> LightResult<()> {
        let started = Instant::now();
        let result = match call.parse() {
            Ok((state, request)) => self.resolver.light_entity(kind, id, state, request).await,
            Err(e) => Err(e),
        };
        self.audit("light_entity", id, started, &result);
        result
    }

    /// Per-item batch; sibling failures never abort the batch.
    pub async fn light_batch(&self, items: Vec<BatchItem>) -> Vec<BatchOutcome> {
        let started = Instant::now();
        let outcomes = self.resolver.light_batch(items).await;
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        self.record(
            "resolver",
            "light_batch",
            &format!("{} items", outcomes.len()),
            started,
            failed == 0,
            (failed > 0).then(|| format!("{failed} items failed")),
        );
        outcomes
    }

    /// FADE-to-0 on every address of an entity.
    pub async fn off_entity(&self, kind: EntityKind, id: &str) -> LightResult<()> {
        let started = Instant::now();
        let result = self.resolver.off_entity(kind, id).await;
        self.audit("off_entity", id, started, &result);
        result
    }

    /// Single broadcast OFF.
    pub async fn off_all(&self) -> LightResult<()> {
        let started = Instant::now();
        let result = self.resolver.off_all().await;
        self.audit("off_all", "broadcast", started, &result);
        result
    }

    /// Single broadcast LEVEL at the requested (or default) intensity.
    pub async fn on_all(&self, intensity: Option<u8>) -> LightResult<()> {
        let started = Instant::now();
        let result = self.resolver.on_all(intensity).await;
        self.audit("on_all", "broadcast", started, &result);
        result
    }

    /// Toggles the session machine to active (see [`SessionController`]).
    pub async fn login(&self, agent: &str) -> LightResult<()> {
        let started = Instant::now();
        let result = self.session.login(agent).await;
        self.audit("login", agent, started, &result);
        result
    }

    /// Toggles the session machine back to idle.
    pub async fn logout(&self, agent: &str) -> LightResult<()> {
        let started = Instant::now();
        let result = self.session.logout(agent).await;
        self.audit("logout", agent, started, &result);
        result
    }

    /// Diagnostic: enqueue already-encoded wire bytes as-is.
    pub async fn send_raw_frame(&self, bytes: Vec<u8>) -> LightResult<()> {
        let started = Instant::now();
        let target = format!("{} bytes", bytes.len());
        let result = self
            .transport
            .enqueue_raw(bytes, CommandSource::Diagnostic)
            .await;
        self.audit("send_raw_frame", &target, started, &result);
        result
    }

    /// Transport state, queue depth, counters, session and engine status.
    pub async fn query_status(&self) -> StatusReport {
        let observer_drops = self
            .observers
            .lock()
            .expect("observer set lock")
            .as_ref()
            .map(|set| set.dropped_counts())
            .unwrap_or_default();
        StatusReport {
            transport: self.transport.status(),
            session: self.session.phase().await,
            animation_running: self.engine.is_running(),
            animation_sequence: self.engine.current_sequence().await,
            fixtures_tracked: self.simulator.len(),
            observer_drops,
        }
    }

    /// The virtual fixture table.
    pub fn simulator(&self) -> &Arc<Simulator> {
        &self.simulator
    }

    /// The inventory tables (admin operations).
    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inventory
    }

    /// The rolling command log (storage drain).
    pub fn command_log(&self) -> &Arc<CommandLog> {
        &self.command_log
    }

    /// The rolling session event log (storage drain).
    pub fn session_log(&self) -> &Arc<SessionLog> {
        &self.session_log
    }

    /// The wire-frame diagnostics ring.
    pub fn wire_audit(&self) -> &Arc<WireAudit> {
        &self.wire_audit
    }

    /// The sequence registry.
    pub fn sequences(&self) -> &Arc<SequenceLibrary> {
        &self.sequences
    }

    /// Stops animation, the transport, and the observer fan-out, in that
    /// order, joining every background task on the way out.
    pub async fn shutdown(&self) {
        self.engine.stop().await;
        self.transport.shutdown().await;

        // Joining the listener releases its strong reference to the set; only
        // then can the set be unwrapped and its workers drained.
        self.token.cancel();
        let listener = self.listener.lock().expect("listener handle lock").take();
        if let Some(listener) = listener {
            let _ = listener.await;
        }

        let observers = self.observers.lock().expect("observer set lock").take();
        if let Some(observers) = observers {
            match Arc::try_unwrap(observers) {
                Ok(set) => set.shutdown().await,
                Err(_) => tracing::warn!("observer set still shared, workers left to the runtime"),
            }
        }
    }

    fn audit(&self, command: &'static str, target: &str, started: Instant, result: &LightResult<()>) {
        let source = match command {
            "login" | "logout" => "session",
            "send_raw_frame" => "diagnostic",
            _ => "resolver",
        };
        self.record(
            source,
            command,
            target,
            started,
            result.is_ok(),
            result.as_ref().err().map(|e| e.to_string()),
        );
    }

    fn record(
        &self,
        source: &'static str,
        command: &'static str,
        target: &str,
        started: Instant,
        success: bool,
        error: Option<String>,
    ) {
        self.command_log.record(CommandRecord {
            at: std::time::SystemTime::now(),
            source,
            command,
            target: target.to_string(),
            success,
            error,
            elapsed: started.elapsed(),
        });
        self.command_log.prune(self.config.log_retention);
    }
}
