//! # Frame tap: broadcast of emitted wire packets to observers.
//!
//! Every packet the writer task flushes is published as an [`EmittedFrame`]
//! on the [`FrameTap`] (a thin wrapper over [`tokio::sync::broadcast`]).
//! [`ObserverSet`] subscribes once and fans frames out to registered
//! [`FrameObserver`]s through per-observer bounded queues.
//!
//! ## Architecture
//! ```text
//! writer task ──► FrameTap (broadcast)
//!                     │
//!            ObserverSet listener
//!                     ├──► [queue 1] ──► worker 1 ──► simulator.on_frame()
//!                     ├──► [queue 2] ──► worker 2 ──► audit.on_frame()
//!                     └──► [queue N] ──► worker N ──► ...
//! ```
//!
//! ## Rules
//! - Fan-out is non-blocking (`try_send`); a slow observer only loses its own
//!   frames, counted per observer and logged.
//! - Observer panics are caught and isolated; the worker keeps running.
//! - Per-observer FIFO: each observer sees frames in emission order.
//! - Frames carry the original wire bytes and the simulated/live flag.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Global sequence counter for frame ordering across async boundaries.
static FRAME_SEQ: AtomicU64 = AtomicU64::new(0);

/// Which producer committed a packet to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    /// A client request expanded by the resolver.
    Resolver,
    /// The session controller's login fade-down.
    Session,
    /// The ambient animation engine.
    Animation,
    /// A raw diagnostic frame injected through `send_raw_frame`.
    Diagnostic,
}

impl CommandSource {
    /// Short stable label for audit records.
    pub fn as_label(&self) -> &'static str {
        match self {
            CommandSource::Resolver => "resolver",
            CommandSource::Session => "session",
            CommandSource::Animation => "animation",
            CommandSource::Diagnostic => "diagnostic",
        }
    }
}

/// One wire packet as it left the transport.
#[derive(Debug, Clone)]
pub struct EmittedFrame {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock emission time (logging only).
    pub at: SystemTime,
    /// The exact bytes written to the sink, framing included.
    pub bytes: Vec<u8>,
    /// True when the simulated sink carried the packet.
    pub simulated: bool,
    /// Producer that committed the packet.
    pub source: CommandSource,
}

impl EmittedFrame {
    /// Creates a frame record with the next sequence number.
    pub fn now(bytes: Vec<u8>, simulated: bool, source: CommandSource) -> Self {
        Self {
            seq: FRAME_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            bytes,
            simulated,
            source,
        }
    }
}

/// Broadcast channel for emitted frames.
///
/// Cloned freely; publishing with no subscribers drops the frame silently,
/// the transport operates fine without observers.
#[derive(Clone)]
pub struct FrameTap {
    tx: broadcast::Sender<Arc<EmittedFrame>>,
}

impl FrameTap {
    /// Creates a tap with the given ring capacity (clamped to ≥ 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes a frame to all current subscribers.
    pub fn publish(&self, frame: EmittedFrame) {
        let _ = self.tx.send(Arc::new(frame));
    }

    /// Creates an independent subscriber receiving all future frames.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EmittedFrame>> {
        self.tx.subscribe()
    }
}

/// Observer of emitted frames (simulator, audit log, dashboards).
///
/// Each observer gets a dedicated worker task and bounded queue; slow or
/// panicking observers cannot stall the writer or each other.
#[async_trait]
pub trait FrameObserver: Send + Sync + 'static {
    /// Processes one emitted frame.
    ///
    /// Runs on the observer's worker task, frames arrive in emission order.
    async fn on_frame(&self, frame: &EmittedFrame);

    /// Observer name for logs and drop accounting.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity. Frames beyond it are dropped for this
    /// observer only.
    fn queue_capacity(&self) -> usize {
        1024
    }
}

/// Per-observer channel metadata.
struct ObserverChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<EmittedFrame>>,
    dropped: Arc<AtomicU64>,
}

/// Fan-out coordinator for frame observers.
pub struct ObserverSet {
    channels: Vec<ObserverChannel>,
    workers: Vec<JoinHandle<()>>,
}

impl ObserverSet {
    /// Creates the set and spawns one worker per observer.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn FrameObserver>>) -> Self {
        let mut channels = Vec::with_capacity(observers.len());
        let mut workers = Vec::with_capacity(observers.len());

        for obs in observers {
            let cap = obs.queue_capacity().max(1);
            let name = obs.name();
            let (tx, mut rx) = mpsc::channel::<Arc<EmittedFrame>>(cap);
            let dropped = Arc::new(AtomicU64::new(0));

            let worker = tokio::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    let fut = obs.on_frame(frame.as_ref());
                    if let Err(panic_err) =
                        std::panic::AssertUnwindSafe(fut).catch_unwind().await
                    {
                        let info = panic_message(&panic_err);
                        tracing::error!(observer = obs.name(), panic = %info, "frame observer panicked");
                    }
                }
            });

            channels.push(ObserverChannel {
                name,
                sender: tx,
                dropped,
            });
            workers.push(worker);
        }

        Self { channels, workers }
    }

    /// Spawns a listener forwarding the tap into this set.
    ///
    /// Runs until the token is cancelled or the tap is dropped. Lagging on
    /// the broadcast ring skips old frames rather than stalling.
    ///
    /// Returns the listener's handle; callers that shut the set down must
    /// await it first, since the task holds a strong reference to the set
    /// until it exits.
    #[must_use]
    pub fn spawn_listener(
        self: Arc<Self>,
        tap: &FrameTap,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = tap.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(frame) => self.emit_arc(frame),
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "observer listener lagged behind the tap");
                            continue;
                        }
                    }
                }
            }
        })
    }

    /// Distributes one frame to every observer queue (non-blocking).
    pub fn emit_arc(&self, frame: Arc<EmittedFrame>) {
        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&frame)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_))
                | Err(mpsc::error::TrySendError::Closed(_)) => {
                    let total = channel.dropped.fetch_add(1, AtomicOrdering::Relaxed) + 1;
                    tracing::warn!(
                        observer = channel.name,
                        dropped_total = total,
                        "frame dropped for observer"
                    );
                }
            }
        }
    }

    /// Frames dropped per observer, for `query_status` counters.
    pub fn dropped_counts(&self) -> Vec<(&'static str, u64)> {
        self.channels
            .iter()
            .map(|c| (c.name, c.dropped.load(AtomicOrdering::Relaxed)))
            .collect()
    }

    /// Closes all queues and awaits the workers.
    pub async fn shutdown(self) {
        drop(self.channels);
        for w in self.workers {
            let _ = w.await;
        }
    }
}

fn panic_message(panic_err: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic_err.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
