//! # The animation engine: one cooperative loop, one running sequence.
//!
//! ## Architecture
//! ```text
//! AnimationEngine::start(seq)
//!   ├─► no-op when a session is active
//!   ├─► stop() any running sequence (cancel → join)
//!   └─► spawn runner task
//!
//! runner loop (per SequenceKind):
//!   ├─► check token (before every enqueue and every tick)
//!   ├─► transport.enqueue(packet) ── suspension point
//!   └─► cancellable sleep ───────── suspension point
//! ```
//!
//! ## Rules
//! - At every suspension point the loop observes the token; once cancelled it
//!   exits without emitting further packets. Packets already committed to the
//!   FIFO are accepted as a short visual tail.
//! - The transport's atomic packet writes mean cancellation can never leave a
//!   partial frame on the wire.
//! - Transport errors stop the sequence (logged); the engine does not retry.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::animation::sequence::{Sequence, SequenceKind, SequenceStep, WaveDirection};
use crate::codec::{Addr, Command, FadePlan, Packet};
use crate::inventory::{Color, Inventory};
use crate::transport::{CommandSource, Transport};

/// Tick of the breathe ramp (≈20 Hz).
const BREATHE_TICK: Duration = Duration::from_millis(50);

/// Handle to the currently running sequence task.
struct Running {
    id: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Cooperative ambient animation driver.
pub struct AnimationEngine {
    transport: Arc<Transport>,
    inventory: Arc<Inventory>,
    /// Set by the session controller; `start` is a no-op while true.
    session_active: Arc<AtomicBool>,
    /// True while a runner task is live. Cleared by the runner on exit.
    running: Arc<AtomicBool>,
    current: Mutex<Option<Running>>,
}

impl AnimationEngine {
    /// Creates a stopped engine.
    ///
    /// `session_active` is shared with the session controller, which flips it
    /// around login/logout.
    pub fn new(
        transport: Arc<Transport>,
        inventory: Arc<Inventory>,
        session_active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transport,
            inventory,
            session_active,
            running: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
        }
    }

    /// Starts a sequence, replacing any running one.
    ///
    /// Returns `false` without side effects while a session is active.
    pub async fn start(&self, sequence: Sequence) -> bool {
        if self.session_active.load(AtomicOrdering::SeqCst) {
            tracing::debug!(sequence = %sequence.id, "start ignored, session active");
            return false;
        }

        let mut current = self.current.lock().await;
        Self::stop_locked(&mut current).await;

        let token = CancellationToken::new();
        let running_flag = Arc::clone(&self.running);
        running_flag.store(true, AtomicOrdering::SeqCst);

        let runner = SequenceRunner {
            transport: Arc::clone(&self.transport),
            inventory: Arc::clone(&self.inventory),
            token: token.clone(),
        };
        let id = sequence.id.clone();
        tracing::info!(sequence = %id, "animation starting");
        let handle = tokio::spawn(async move {
            runner.run(sequence).await;
            running_flag.store(false, AtomicOrdering::SeqCst);
        });

        *current = Some(Running { id, token, handle });
        true
    }

    /// Stops the running sequence, if any, and awaits its exit.
    pub async fn stop(&self) {
        let mut current = self.current.lock().await;
        Self::stop_locked(&mut current).await;
    }

    async fn stop_locked(current: &mut Option<Running>) {
        if let Some(running) = current.take() {
            tracing::info!(sequence = %running.id, "animation stopping");
            running.token.cancel();
            let _ = running.handle.await;
        }
    }

    /// True while a runner task is live.
    pub fn is_running(&self) -> bool {
        self.running.load(AtomicOrdering::SeqCst)
    }

    /// Id of the running sequence, if any.
    pub async fn current_sequence(&self) -> Option<String> {
        let current = self.current.lock().await;
        current
            .as_ref()
            .filter(|r| !r.token.is_cancelled())
            .map(|r| r.id.clone())
    }
}

/// Interprets one sequence against the live inventory until cancelled.
struct SequenceRunner {
    transport: Arc<Transport>,
    inventory: Arc<Inventory>,
    token: CancellationToken,
}

impl SequenceRunner {
    async fn run(&self, sequence: Sequence) {
        match sequence.kind {
            SequenceKind::Static { step } => self.run_static(step).await,
            SequenceKind::Loop { steps, step_hold } => self.run_loop(&steps, step_hold).await,
            SequenceKind::Wave {
                direction,
                color,
                fade,
                floor_delay,
                hold,
                pause,
                repeat,
            } => {
                self.run_wave(direction, color, fade, floor_delay, hold, pause, repeat)
                    .await
            }
            SequenceKind::Chase { color, tail, tick } => self.run_chase(color, tail, tick).await,
            SequenceKind::Breathe { min, max, period } => {
                self.run_breathe(min, max, period).await
            }
        }
        tracing::debug!(sequence = %sequence.id, "animation runner exited");
    }

    /// Emits one packet unless cancelled. Returns `false` to unwind the loop.
    async fn emit(&self, addr: Addr, command: Command) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        match self
            .transport
            .enqueue(&Packet::new(addr, command), CommandSource::Animation)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "animation enqueue failed, stopping sequence");
                false
            }
        }
    }

    /// Cancellable sleep. Returns `false` when cancelled.
    async fn pause(&self, d: Duration) -> bool {
        if d.is_zero() {
            return !self.token.is_cancelled();
        }
        tokio::select! {
            _ = tokio::time::sleep(d) => true,
            _ = self.token.cancelled() => false,
        }
    }

    fn step_command(step: &SequenceStep) -> Command {
        let c = step.color.scaled(step.intensity);
        Command::RgbLevel {
            r: c.r,
            g: c.g,
            b: c.b,
        }
    }

    async fn run_static(&self, step: SequenceStep) {
        if !self.emit(Addr::BROADCAST, Self::step_command(&step)).await {
            return;
        }
        // Hold until stopped.
        self.token.cancelled().await;
    }

    async fn run_loop(&self, steps: &[SequenceStep], step_hold: Duration) {
        if steps.is_empty() {
            return;
        }
        loop {
            for step in steps {
                if !self.emit(Addr::BROADCAST, Self::step_command(step)).await {
                    return;
                }
                if !self.pause(step.hold.unwrap_or(step_hold)).await {
                    return;
                }
            }
        }
    }

    async fn run_wave(
        &self,
        direction: WaveDirection,
        color: Color,
        fade: Duration,
        floor_delay: Duration,
        hold: Duration,
        pause: Duration,
        repeat: bool,
    ) {
        loop {
            let mut floors = self.inventory.floors_descending();
            if direction == WaveDirection::Up {
                floors.reverse();
            }
            if floors.is_empty() {
                return;
            }

            // Rising edge: fade each floor up, staggered.
            for &floor in &floors {
                if !self.fade_floor(floor, Color::default(), color, fade).await {
                    return;
                }
                if !self.pause(floor_delay).await {
                    return;
                }
            }
            if !self.pause(hold).await {
                return;
            }

            // Falling edge: reverse order, fade to dark.
            for &floor in floors.iter().rev() {
                if !self.fade_floor(floor, color, Color::default(), fade).await {
                    return;
                }
                if !self.pause(floor_delay).await {
                    return;
                }
            }
            if !self.pause(pause).await {
                return;
            }
            if !repeat {
                return;
            }
        }
    }

    /// Fades every fixture of a floor from one color towards another.
    async fn fade_floor(&self, floor: i32, from: Color, to: Color, fade: Duration) -> bool {
        let fade_ms = fade.as_millis() as u64;
        let command = Command::RgbFade {
            r: FadePlan::channel(from.r, to.r, fade_ms),
            g: FadePlan::channel(from.g, to.g, fade_ms),
            b: FadePlan::channel(from.b, to.b, fade_ms),
        };
        for apartment in self.inventory.floor_members(floor) {
            for addr in apartment.lights {
                if !self.emit(addr, command).await {
                    return false;
                }
            }
        }
        true
    }

    async fn run_chase(&self, color: Color, tail: usize, tick: Duration) {
        let tail = tail.max(1);
        let mut head: usize = 0;
        loop {
            let apartments = self.inventory.apartments_ordered();
            let n = apartments.len();
            if n == 0 {
                return;
            }
            head = (head + 1) % n;

            for (i, apartment) in apartments.iter().enumerate() {
                // Distance behind the head, wrapping over the flat order.
                let distance = (head + n - i) % n;
                let brightness = if distance < tail {
                    (255 * (tail - distance) / tail) as u8
                } else {
                    0
                };
                let c = color.scaled(brightness);
                for &addr in &apartment.lights {
                    if !self
                        .emit(addr, Command::RgbLevel {
                            r: c.r,
                            g: c.g,
                            b: c.b,
                        })
                        .await
                    {
                        return;
                    }
                }
            }
            if !self.pause(tick).await {
                return;
            }
        }
    }

    async fn run_breathe(&self, min: u8, max: u8, period: Duration) {
        let (min, max) = (min.min(max), min.max(max));
        let half_ticks = ((period.as_millis() / 2) / BREATHE_TICK.as_millis()).max(1) as u64;
        let span = u64::from(max - min);
        loop {
            for tick in 0..=half_ticks {
                let level = min + (span * tick / half_ticks) as u8;
                if !self.emit(Addr::BROADCAST, Command::Level { level }).await {
                    return;
                }
                if !self.pause(BREATHE_TICK).await {
                    return;
                }
            }
            for tick in (0..=half_ticks).rev() {
                let level = min + (span * tick / half_ticks) as u8;
                if !self.emit(Addr::BROADCAST, Command::Level { level }).await {
                    return;
                }
                if !self.pause(BREATHE_TICK).await {
                    return;
                }
            }
        }
    }
}
