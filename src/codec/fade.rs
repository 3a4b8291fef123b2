//! # Fade planning: millisecond intents → on-device descriptors.
//!
//! The device fades by stepping the PWM level every `interval × 10 ms` by
//! `step` units. [`FadePlan::between`] picks `(interval, step)` so that
//! `|target − start| · 10 / step ≈ duration_ms`, within the hardware ranges
//! interval ∈ [1, 255] and step ∈ [1, 127].
//!
//! ## Rules
//! - A zero-distance fade yields `(1, 1)`; the device still accepts it.
//! - When the requested duration is too long to express, interval clamps to
//!   255 with step 1: the fade runs longer than asked rather than faster.
//! - When the duration is too short, step grows up to 127: the fade lands as
//!   close to the request as the hardware allows.
//! - Durations under one tick (10 ms) degenerate to the fastest legal fade.

use std::time::Duration;

use crate::codec::ChannelFade;

/// A planned fade: tick interval and per-tick step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadePlan {
    /// Tick interval in units of 10 ms, 1..=255.
    pub interval: u8,
    /// PWM units per tick, 1..=127.
    pub step: u8,
}

impl FadePlan {
    /// Plans a fade from `start` to `target` over roughly `duration_ms`.
    pub fn between(start: u8, target: u8, duration_ms: u64) -> Self {
        let distance = u64::from(start.abs_diff(target));
        if distance == 0 {
            return Self {
                interval: 1,
                step: 1,
            };
        }

        // Hundredths of a second, the device's tick unit.
        let ticks = duration_ms / 10;
        if ticks == 0 {
            // Sub-tick request: fastest legal fade.
            return Self {
                interval: 1,
                step: 127,
            };
        }

        // One PWM unit per tick: interval = ticks per unit of distance.
        let interval = (ticks + distance / 2) / distance;
        if interval > 255 {
            // Longer than expressible; accept a slower fade.
            return Self {
                interval: 255,
                step: 1,
            };
        }
        if interval < 1 {
            // Faster than one-unit steps allow; grow the step instead.
            let step = distance.div_ceil(ticks).min(127).max(1) as u8;
            return Self { interval: 1, step };
        }

        Self {
            interval: interval as u8,
            step: 1,
        }
    }

    /// Plans a fade towards `target`, pairing the plan with the level.
    pub fn channel(start: u8, target: u8, duration_ms: u64) -> ChannelFade {
        let plan = Self::between(start, target, duration_ms);
        ChannelFade {
            level: target,
            interval: plan.interval,
            step: plan.step,
        }
    }

    /// How long this plan takes for the given distance.
    ///
    /// Used by callers that wait out a fade before the next action.
    pub fn duration_for(&self, distance: u8) -> Duration {
        let ticks = u64::from(distance).div_ceil(u64::from(self.step.max(1)));
        Duration::from_millis(ticks * u64::from(self.interval.max(1)) * 10)
    }
}
