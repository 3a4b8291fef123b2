//! Transport: the single-writer serial transmit queue.
//!
//! The serial endpoint is owned exclusively by one writer task. Every
//! producer (resolver, session controller, animation engine) serializes
//! through the same bounded FIFO, which makes ordering a pure queueing
//! property and keeps partial frames off the wire.
//!
//! ## Architecture
//! ```text
//! producers ──enqueue(packet)──► [FIFO] ──► writer task
//!                                             ├─► sink.write_packet() (write + drain)
//!                                             ├─► FrameTap.publish(EmittedFrame)
//!                                             │        └─► ObserverSet ──► simulator / audit
//!                                             ├─► inter-packet gap (≈10 ms)
//!                                             └─► complete job (oneshot)
//!
//! on write failure: fail the current job ──► Reconnecting ──► exponential
//! schedule (2 s × 2ⁿ, 10 attempts) ──► Open (attempts reset) | Closed (abandoned)
//! ```
//!
//! ## Rules
//! - Jobs complete strictly in enqueue order; an enqueue suspends until its
//!   bytes are flushed and the inter-packet gap has elapsed.
//! - Jobs enqueued while the link is down stay queued and dispatch on
//!   reach-open; the job that hit the failure is the only one that errors.
//! - Simulation mode swaps the sink, not the pipeline: observers still see
//!   every frame, flagged as simulated.
//!
//! ## Contents
//! - [`sink`] — [`FrameSink`] trait, [`SerialSink`], [`SimSink`]
//! - [`link`] — [`LinkState`] machine and [`ReconnectPolicy`]
//! - [`queue`] — [`Transport`], [`TransportStatus`]
//! - [`tap`] — [`EmittedFrame`], [`FrameTap`], [`FrameObserver`], [`ObserverSet`]

pub mod link;
pub mod queue;
pub mod sink;
pub mod tap;

pub use link::{LinkState, ReconnectPolicy};
pub use queue::{Transport, TransportStatus};
pub use sink::{FrameSink, SerialSink, SimSink};
pub use tap::{CommandSource, EmittedFrame, FrameObserver, FrameTap, ObserverSet};
