//! # Sequence definitions: the enumerated ambient patterns.
//!
//! A [`Sequence`] is data, not code: the engine interprets its
//! [`SequenceKind`] against the live inventory. There is deliberately no
//! scripting language beyond this closed set.
//!
//! ## Kinds
//! - **Static** — one step, held until stopped.
//! - **Loop** — steps in order with per-step hold, wrapping indefinitely.
//! - **Wave** — floors fade up one by one, hold, fade down in reverse,
//!   pause, optionally repeat.
//! - **Chase** — a bright head runs over the flat apartment order with a
//!   linearly decaying tail.
//! - **Breathe** — global intensity ramps between min and max at ≈20 Hz.

use std::time::Duration;

use dashmap::DashMap;

use crate::inventory::Color;

/// One emitted step of a static or loop sequence.
///
/// A step recolors the whole installation (broadcast), so loops stay cheap
/// on the bus no matter how many fixtures are installed.
#[derive(Debug, Clone, Copy)]
pub struct SequenceStep {
    /// Color applied to every fixture.
    pub color: Color,
    /// Intensity scaling for the step.
    pub intensity: u8,
    /// Hold before the next step; `None` uses the sequence default.
    pub hold: Option<Duration>,
}

/// Direction a wave travels through the floors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveDirection {
    /// Lowest floor first.
    Up,
    /// Highest floor first.
    Down,
}

/// The closed set of ambient patterns.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum SequenceKind {
    /// Emit one step and hold it until stopped.
    Static {
        /// The held step.
        step: SequenceStep,
    },
    /// Emit each step in order, wrap to the first, forever.
    Loop {
        /// Steps in emission order.
        steps: Vec<SequenceStep>,
        /// Hold applied when a step carries none.
        step_hold: Duration,
    },
    /// Fade floors up one by one, hold, fade back in reverse, pause.
    Wave {
        /// Travel direction of the rising edge.
        direction: WaveDirection,
        /// Color each floor fades up to.
        color: Color,
        /// Per-floor fade time.
        fade: Duration,
        /// Delay between starting adjacent floors.
        floor_delay: Duration,
        /// Hold with everything lit before fading back.
        hold: Duration,
        /// Pause with everything dark before the next pass.
        pause: Duration,
        /// Whether the wave repeats after the pause.
        repeat: bool,
    },
    /// A head position runs over the flat apartment order with a decaying tail.
    Chase {
        /// Color of the head.
        color: Color,
        /// Tail length in apartments; brightness decays linearly over it.
        tail: usize,
        /// Advance interval.
        tick: Duration,
    },
    /// Global intensity ramps linearly between bounds at a fixed ≈20 Hz tick.
    Breathe {
        /// Lower intensity bound.
        min: u8,
        /// Upper intensity bound.
        max: u8,
        /// Full period: half up, half down.
        period: Duration,
    },
}

/// A named, registered ambient sequence.
#[derive(Debug, Clone)]
pub struct Sequence {
    /// Registry key, referenced by `ambient_sequence_id`.
    pub id: String,
    /// The pattern to run.
    pub kind: SequenceKind,
}

impl Sequence {
    /// Creates a sequence.
    pub fn new(id: impl Into<String>, kind: SequenceKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Registry of sequences keyed by id.
///
/// Ships with the commissioning defaults; collaborators may register more at
/// startup (an administrative operation).
#[derive(Debug, Default)]
pub struct SequenceLibrary {
    sequences: DashMap<String, Sequence>,
}

impl SequenceLibrary {
    /// Creates a library holding the built-in sequences
    /// (`wave`, `chase`, `breathe`, `warm-static`).
    pub fn with_defaults() -> Self {
        let lib = Self::default();
        lib.register(Sequence::new("wave", SequenceKind::Wave {
            direction: WaveDirection::Up,
            color: Color::new(255, 180, 60),
            fade: Duration::from_millis(800),
            floor_delay: Duration::from_millis(150),
            hold: Duration::from_secs(2),
            pause: Duration::from_secs(1),
            repeat: true,
        }));
        lib.register(Sequence::new("chase", SequenceKind::Chase {
            color: Color::new(120, 160, 255),
            tail: 6,
            tick: Duration::from_millis(120),
        }));
        lib.register(Sequence::new("breathe", SequenceKind::Breathe {
            min: 20,
            max: 200,
            period: Duration::from_secs(6),
        }));
        lib.register(Sequence::new("warm-static", SequenceKind::Static {
            step: SequenceStep {
                color: Color::new(255, 160, 40),
                intensity: 180,
                hold: None,
            },
        }));
        lib
    }

    /// Registers (or replaces) a sequence under its id.
    pub fn register(&self, sequence: Sequence) {
        self.sequences.insert(sequence.id.clone(), sequence);
    }

    /// Looks up a sequence by id.
    pub fn get(&self, id: &str) -> Option<Sequence> {
        self.sequences.get(id).map(|s| s.clone())
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sequences.iter().map(|s| s.id.clone()).collect();
        ids.sort();
        ids
    }
}
