//! Animation: ambient motion on the installation.
//!
//! A cooperative loop producing packets into the same transmit queue as every
//! other producer. The engine is either stopped or running exactly one named
//! sequence; the session controller is the only component that starts or
//! stops it during normal operation.
//!
//! ## Contents
//! - [`sequence`] — [`Sequence`], [`SequenceKind`], the [`SequenceLibrary`]
//! - [`engine`] — [`AnimationEngine`]: start/stop, cancellation, exclusion
//!
//! ## Rules
//! - Cancellation is cooperative: the running loop checks its token between
//!   packet enqueues and between ticks, and exits without emitting further
//!   packets. Frames already committed to the FIFO may still be sent.
//! - While a session is active, `start` is a no-op.

pub mod engine;
pub mod sequence;

pub use engine::AnimationEngine;
pub use sequence::{Sequence, SequenceKind, SequenceLibrary, SequenceStep, WaveDirection};
