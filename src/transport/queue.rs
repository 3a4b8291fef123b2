//! # The single-writer transmit queue.
//!
//! [`Transport`] owns the serial endpoint through a writer task and a bounded
//! FIFO of write jobs. A job is a fully formed wire packet plus a completion
//! notifier; producers await the notifier, which resolves only after the
//! bytes flushed and the inter-packet gap elapsed. That single await is every
//! producer's backpressure.
//!
//! ## Rules
//! - **FIFO**: jobs complete in enqueue order; no priority channel exists.
//! - **Drain after write**: the sink contract guarantees flushed-on-return;
//!   the gap is paced from that point.
//! - **Failure scoping**: a write error fails only the job that hit it; the
//!   link enters the reconnect schedule and later jobs either dispatch after
//!   reach-open or fail with `TransportClosed` once the schedule is
//!   abandoned.
//! - **Tap**: every flushed packet is published to the [`FrameTap`] with the
//!   simulated/live flag, whether the sink is hardware or simulation.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::Packet;
use crate::error::{LightError, LightResult};
use crate::transport::link::{LinkState, ReconnectPolicy};
use crate::transport::sink::FrameSink;
use crate::transport::tap::{CommandSource, EmittedFrame, FrameTap};

/// Pause between successive packets, letting devices process.
pub const INTER_PACKET_GAP: Duration = Duration::from_millis(10);

/// Default FIFO capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// One queued write: wire bytes plus the completion notifier.
struct WriteJob {
    bytes: Vec<u8>,
    source: CommandSource,
    done: oneshot::Sender<LightResult<()>>,
}

/// Counters exposed through [`TransportStatus`].
#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    failed: AtomicU64,
    reconnects: AtomicU64,
}

/// Snapshot of transport health for `query_status`.
#[derive(Debug, Clone, Serialize)]
pub struct TransportStatus {
    /// Current link state.
    pub state: LinkState,
    /// Jobs waiting in the FIFO right now.
    pub queue_depth: usize,
    /// Packets flushed since startup.
    pub sent: u64,
    /// Jobs failed (write errors and closed rejections).
    pub failed: u64,
    /// Successful reconnects since startup.
    pub reconnects: u64,
    /// True when the sink is the simulated one.
    pub simulated: bool,
    /// Sink description for dashboards.
    pub sink: String,
}

/// The single logical writer over the serial endpoint.
pub struct Transport {
    tx: mpsc::Sender<WriteJob>,
    state_rx: watch::Receiver<LinkState>,
    counters: Arc<Counters>,
    tap: FrameTap,
    simulated: bool,
    sink_desc: String,
    shutdown: CancellationToken,
    writer: Mutex<Option<JoinHandle<()>>>,
    gap: Duration,
}

impl Transport {
    /// Opens the sink and spawns the writer task.
    ///
    /// The initial open failure propagates: an unreachable device at startup
    /// is fatal; only spontaneous failures while running go to reconnect.
    pub async fn connect(
        sink: Box<dyn FrameSink>,
        policy: ReconnectPolicy,
    ) -> LightResult<Arc<Self>> {
        Self::connect_paced(sink, policy, INTER_PACKET_GAP).await
    }

    /// As [`Transport::connect`], with an explicit inter-packet gap.
    ///
    /// Tests pass a zero gap to keep schedules fast.
    pub async fn connect_paced(
        mut sink: Box<dyn FrameSink>,
        policy: ReconnectPolicy,
        gap: Duration,
    ) -> LightResult<Arc<Self>> {
        sink.open().await?;
        let (tx, rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
        let (state_tx, state_rx) = watch::channel(LinkState::Open);
        let tap = FrameTap::new(256);
        let counters = Arc::new(Counters::default());
        let shutdown = CancellationToken::new();
        let simulated = sink.is_simulated();
        let sink_desc = sink.describe();

        let writer = Writer {
            sink,
            rx,
            state: state_tx,
            tap: tap.clone(),
            counters: Arc::clone(&counters),
            policy,
            token: shutdown.clone(),
            gap,
        };
        let handle = tokio::spawn(writer.run());

        Ok(Arc::new(Self {
            tx,
            state_rx,
            counters,
            tap,
            simulated,
            sink_desc,
            shutdown,
            writer: Mutex::new(Some(handle)),
            gap,
        }))
    }

    /// Enqueues a packet and awaits its completion.
    ///
    /// Resolves after the bytes flushed and the gap elapsed, or with the
    /// job's error. Rejected with [`LightError::TransportClosed`] when the
    /// link is closed or closing.
    pub async fn enqueue(&self, packet: &Packet, source: CommandSource) -> LightResult<()> {
        self.enqueue_raw(packet.encode(), source).await
    }

    /// Enqueues pre-encoded wire bytes (diagnostic path).
    pub async fn enqueue_raw(&self, bytes: Vec<u8>, source: CommandSource) -> LightResult<()> {
        match *self.state_rx.borrow() {
            LinkState::Closed | LinkState::Closing => {
                return Err(LightError::TransportClosed);
            }
            _ => {}
        }

        let (done_tx, done_rx) = oneshot::channel();
        let job = WriteJob {
            bytes,
            source,
            done: done_tx,
        };
        self.tx
            .send(job)
            .await
            .map_err(|_| LightError::TransportClosed)?;
        done_rx.await.map_err(|_| LightError::TransportClosed)?
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    /// A watcher for link state transitions.
    pub fn state_watch(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    /// The tap observers subscribe to.
    pub fn tap(&self) -> &FrameTap {
        &self.tap
    }

    /// Configured inter-packet gap.
    pub fn gap(&self) -> Duration {
        self.gap
    }

    /// Health snapshot for `query_status`.
    pub fn status(&self) -> TransportStatus {
        TransportStatus {
            state: self.state(),
            queue_depth: self.tx.max_capacity() - self.tx.capacity(),
            sent: self.counters.sent.load(AtomicOrdering::Relaxed),
            failed: self.counters.failed.load(AtomicOrdering::Relaxed),
            reconnects: self.counters.reconnects.load(AtomicOrdering::Relaxed),
            simulated: self.simulated,
            sink: self.sink_desc.clone(),
        }
    }

    /// Stops the writer, failing queued jobs with `TransportClosed`.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.writer.lock().expect("writer handle lock").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// The writer task state. Exclusive owner of the sink.
struct Writer {
    sink: Box<dyn FrameSink>,
    rx: mpsc::Receiver<WriteJob>,
    state: watch::Sender<LinkState>,
    tap: FrameTap,
    counters: Arc<Counters>,
    policy: ReconnectPolicy,
    token: CancellationToken,
    gap: Duration,
}

impl Writer {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                job = self.rx.recv() => match job {
                    None => break,
                    Some(job) => self.dispatch(job).await,
                }
            }
        }

        let _ = self.state.send(LinkState::Closing);
        self.rx.close();
        while let Ok(job) = self.rx.try_recv() {
            self.counters.failed.fetch_add(1, AtomicOrdering::Relaxed);
            let _ = job.done.send(Err(LightError::TransportClosed));
        }
        self.sink.close().await;
        let _ = self.state.send(LinkState::Closed);
    }

    async fn dispatch(&mut self, job: WriteJob) {
        let WriteJob {
            bytes,
            source,
            done,
        } = job;

        if *self.state.borrow() != LinkState::Open {
            // Reconnect was abandoned; everything still queued fails fast.
            self.counters.failed.fetch_add(1, AtomicOrdering::Relaxed);
            let _ = done.send(Err(LightError::TransportClosed));
            return;
        }

        match self.sink.write_packet(&bytes).await {
            Ok(()) => {
                self.counters.sent.fetch_add(1, AtomicOrdering::Relaxed);
                self.tap.publish(EmittedFrame::now(
                    bytes,
                    self.sink.is_simulated(),
                    source,
                ));
                if self.gap > Duration::ZERO {
                    tokio::select! {
                        _ = tokio::time::sleep(self.gap) => {}
                        _ = self.token.cancelled() => {}
                    }
                }
                let _ = done.send(Ok(()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "serial write failed, entering reconnect");
                self.counters.failed.fetch_add(1, AtomicOrdering::Relaxed);
                let _ = done.send(Err(e));
                self.reconnect().await;
            }
        }
    }

    /// Runs the bounded exponential schedule until reopen or abandonment.
    async fn reconnect(&mut self) {
        let _ = self.state.send(LinkState::Reconnecting);
        self.sink.close().await;

        let mut prev: Option<Duration> = None;
        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.next(prev);
            prev = Some(delay);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.token.cancelled() => return,
            }

            match self.sink.open().await {
                Ok(()) => {
                    self.counters.reconnects.fetch_add(1, AtomicOrdering::Relaxed);
                    let _ = self.state.send(LinkState::Open);
                    tracing::info!(attempt, sink = %self.sink.describe(), "serial link reopened");
                    return;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "reopen attempt failed");
                }
            }
        }

        tracing::error!(
            attempts = self.policy.max_attempts,
            "reconnect abandoned, link closed"
        );
        let _ = self.state.send(LinkState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Addr, Command};
    use crate::transport::sink::SimSink;

    fn test_transport() -> impl std::future::Future<Output = LightResult<Arc<Transport>>> {
        Transport::connect_paced(
            Box::new(SimSink::with_latency(Duration::ZERO)),
            ReconnectPolicy::default(),
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn enqueue_completes_and_counts() {
        let transport = test_transport().await.unwrap();
        let packet = Packet::new(Addr(5), Command::On);
        transport
            .enqueue(&packet, CommandSource::Resolver)
            .await
            .unwrap();
        let status = transport.status();
        assert_eq!(status.sent, 1);
        assert_eq!(status.failed, 0);
        assert_eq!(status.state, LinkState::Open);
        assert!(status.simulated);
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn jobs_complete_in_enqueue_order() {
        let transport = test_transport().await.unwrap();
        let mut tap_rx = transport.tap().subscribe();

        // Two producers committing "at the same instant": A polls first, so
        // A's bytes must flush to completion before any byte of B.
        let a = Packet::new(Addr(1), Command::On);
        let b = Packet::new(Addr(2), Command::Off);
        let (ra, rb) = tokio::join!(
            transport.enqueue(&a, CommandSource::Resolver),
            transport.enqueue(&b, CommandSource::Animation),
        );
        ra.unwrap();
        rb.unwrap();

        let f1 = tap_rx.recv().await.unwrap();
        let f2 = tap_rx.recv().await.unwrap();
        assert_eq!(f1.bytes, a.encode());
        assert_eq!(f2.bytes, b.encode());
        assert!(f1.seq < f2.seq);
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_rejects_later_enqueues() {
        let transport = test_transport().await.unwrap();
        transport.shutdown().await;
        let packet = Packet::new(Addr(5), Command::On);
        let err = transport
            .enqueue(&packet, CommandSource::Resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, LightError::TransportClosed));
    }
}
