//! # The closed sales-state set and its colors.
//!
//! [`LightState`] is a closed tagged set, not dynamic dispatch: the variants
//! are known at design time and configuration only tweaks the color tuple per
//! tag. Unknown state strings are rejected at the API boundary, before any
//! packet is built.

use serde::{Deserialize, Serialize};

use crate::error::LightError;

/// RGB color triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Creates a color.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scales every channel by `intensity` (⌊channel·intensity/255⌋).
    pub fn scaled(self, intensity: u8) -> Self {
        let scale = |c: u8| ((u16::from(c) * u16::from(intensity)) / 255) as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }

    /// Brightest channel; the simulator reports this as the fixture level.
    pub fn max_channel(self) -> u8 {
        self.r.max(self.g).max(self.b)
    }

    /// True when every channel is zero.
    pub fn is_dark(self) -> bool {
        self.r == 0 && self.g == 0 && self.b == 0
    }
}

/// Per-state rendering style: default color plus default intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateStyle {
    /// Default color for the state.
    pub color: Color,
    /// Default intensity applied when a request carries none.
    pub intensity: u8,
}

/// Sales state of an apartment. The set is authoritative and closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LightState {
    /// Unit can be purchased.
    Available,
    /// Unit has been sold.
    Sold,
    /// Unit is under reservation.
    Reserved,
    /// Unit is not on the market.
    Unavailable,
    /// Unit is highlighted for a viewer.
    Selected,
    /// Unit light is off.
    Off,
}

impl LightState {
    /// Every member of the closed set, in display order.
    pub const ALL: [LightState; 6] = [
        LightState::Available,
        LightState::Sold,
        LightState::Reserved,
        LightState::Unavailable,
        LightState::Selected,
        LightState::Off,
    ];

    /// Canonical wire/API name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LightState::Available => "AVAILABLE",
            LightState::Sold => "SOLD",
            LightState::Reserved => "RESERVED",
            LightState::Unavailable => "UNAVAILABLE",
            LightState::Selected => "SELECTED",
            LightState::Off => "OFF",
        }
    }

    /// Human description shown on the dashboard.
    pub fn description(&self) -> &'static str {
        match self {
            LightState::Available => "available for sale",
            LightState::Sold => "sold",
            LightState::Reserved => "reserved",
            LightState::Unavailable => "not on the market",
            LightState::Selected => "selected by a viewer",
            LightState::Off => "light off",
        }
    }

    /// Commissioning defaults for color and intensity.
    pub fn default_style(&self) -> StateStyle {
        let (color, intensity) = match self {
            LightState::Available => (Color::new(0, 255, 0), 255),
            LightState::Sold => (Color::new(255, 0, 0), 255),
            LightState::Reserved => (Color::new(255, 128, 0), 255),
            LightState::Unavailable => (Color::new(128, 128, 128), 128),
            LightState::Selected => (Color::new(0, 64, 255), 255),
            LightState::Off => (Color::new(0, 0, 0), 0),
        };
        StateStyle { color, intensity }
    }
}

impl std::str::FromStr for LightState {
    type Err = LightError;

    /// Parses the canonical uppercase name; anything else is [`LightError::BadState`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LightState::ALL
            .iter()
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| LightError::BadState {
                state: s.to_string(),
            })
    }
}

impl std::fmt::Display for LightState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
