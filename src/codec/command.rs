//! # Command layouts: addresses, opcodes, packet encode/decode.
//!
//! A [`Packet`] is one command aimed at one [`Addr`]. Its pre-framing byte
//! layout is always `addr_hi addr_lo opcode [fields...]`; [`Packet::encode`]
//! appends the XOR checksum and applies the framing discipline.
//!
//! ## Opcode table
//! ```text
//! 0x20 ON          —
//! 0x21 OFF         —
//! 0x22 LEVEL       level
//! 0x23 FADE        level interval step
//! 0x2C RGB_LEVEL   r g b
//! 0x2E FLASH       steps:2 interval_a:2 interval_b:2 level_a level_b
//! 0x31 RGB_FADE    (level interval step) × r,g,b
//! 0x25 PADDSET     pseudo_addr:2
//! 0x26 PADDERASE   —
//! ```
//!
//! ## Rules
//! - Out-of-range numeric fields are **coerced** into their legal ranges at
//!   encode time, never rejected. Resolver math cannot make encoding fail.
//! - Strict decode verifies the checksum; lenient decode skips that check but
//!   still demands a complete payload for the opcode.
//! - The device is write-only for these operations; decode exists for the
//!   simulator and diagnostics.

use serde::{Deserialize, Serialize};

use crate::codec::{checksum, frame, unframe};
use crate::error::{LightError, LightResult};

/// Fixture address on the bus (16-bit, big-endian on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Addr(pub u16);

impl Addr {
    /// Reserved address targeting every fixture on the bus.
    pub const BROADCAST: Addr = Addr(0xFFFF);
    /// Reserved address of the bus master.
    pub const MASTER: Addr = Addr(0xFFFE);

    /// High byte (big-endian).
    #[inline]
    pub fn hi(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Low byte (big-endian).
    #[inline]
    pub fn lo(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Reassembles an address from its wire bytes.
    #[inline]
    pub fn from_bytes(hi: u8, lo: u8) -> Self {
        Addr(u16::from_be_bytes([hi, lo]))
    }

    /// True for the all-fixtures address.
    #[inline]
    pub fn is_broadcast(self) -> bool {
        self == Addr::BROADCAST
    }
}

impl From<u16> for Addr {
    fn from(raw: u16) -> Self {
        Addr(raw)
    }
}

impl std::fmt::Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_broadcast() {
            write!(f, "broadcast")
        } else {
            write!(f, "{:#06x}", self.0)
        }
    }
}

/// One channel's fade descriptor as the device consumes it.
///
/// `interval` is in units of 10 ms, `step` in PWM units per interval. Both
/// are clamped into their legal ranges at encode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFade {
    /// Target level.
    pub level: u8,
    /// Tick interval, 1..=255 (units of 10 ms).
    pub interval: u8,
    /// Level change per tick, 1..=127.
    pub step: u8,
}

impl ChannelFade {
    fn emit(self, out: &mut Vec<u8>) {
        out.push(self.level);
        out.push(self.interval.max(1));
        out.push(self.step.clamp(1, 127));
    }

    fn read(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            level: *bytes.first()?,
            interval: *bytes.get(1)?,
            step: *bytes.get(2)?,
        })
    }
}

/// Commands understood by the fixtures. The set is closed.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Switch fully on.
    On,
    /// Switch fully off.
    Off,
    /// Set a single overall level.
    Level {
        /// Target level.
        level: u8,
    },
    /// Fade the overall level towards a target.
    Fade(ChannelFade),
    /// Set the three color channels at once.
    RgbLevel {
        /// Red channel.
        r: u8,
        /// Green channel.
        g: u8,
        /// Blue channel.
        b: u8,
    },
    /// Alternate between two levels.
    Flash {
        /// Number of alternations, 2..=65535.
        steps: u16,
        /// Time at `level_a`, 1..=65535.
        interval_a: u16,
        /// Time at `level_b`, 1..=65535.
        interval_b: u16,
        /// First level.
        level_a: u8,
        /// Second level.
        level_b: u8,
    },
    /// Fade each color channel independently.
    RgbFade {
        /// Red channel plan.
        r: ChannelFade,
        /// Green channel plan.
        g: ChannelFade,
        /// Blue channel plan.
        b: ChannelFade,
    },
    /// Assign a pseudo-address to the fixture.
    PseudoAddrSet {
        /// The pseudo-address to store.
        addr: Addr,
    },
    /// Clear the fixture's pseudo-address.
    PseudoAddrErase,
}

impl Command {
    pub(crate) const OP_ON: u8 = 0x20;
    pub(crate) const OP_OFF: u8 = 0x21;
    pub(crate) const OP_LEVEL: u8 = 0x22;
    pub(crate) const OP_FADE: u8 = 0x23;
    pub(crate) const OP_PADDSET: u8 = 0x25;
    pub(crate) const OP_PADDERASE: u8 = 0x26;
    pub(crate) const OP_RGB_LEVEL: u8 = 0x2C;
    pub(crate) const OP_FLASH: u8 = 0x2E;
    pub(crate) const OP_RGB_FADE: u8 = 0x31;

    /// Wire opcode for this command.
    pub fn opcode(&self) -> u8 {
        match self {
            Command::On => Self::OP_ON,
            Command::Off => Self::OP_OFF,
            Command::Level { .. } => Self::OP_LEVEL,
            Command::Fade(_) => Self::OP_FADE,
            Command::RgbLevel { .. } => Self::OP_RGB_LEVEL,
            Command::Flash { .. } => Self::OP_FLASH,
            Command::RgbFade { .. } => Self::OP_RGB_FADE,
            Command::PseudoAddrSet { .. } => Self::OP_PADDSET,
            Command::PseudoAddrErase => Self::OP_PADDERASE,
        }
    }

    /// Short stable label for audit records and logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Command::On => "on",
            Command::Off => "off",
            Command::Level { .. } => "level",
            Command::Fade(_) => "fade",
            Command::RgbLevel { .. } => "rgb_level",
            Command::Flash { .. } => "flash",
            Command::RgbFade { .. } => "rgb_fade",
            Command::PseudoAddrSet { .. } => "padd_set",
            Command::PseudoAddrErase => "padd_erase",
        }
    }
}

/// One command addressed to one fixture (or broadcast).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    /// Routing target.
    pub addr: Addr,
    /// The command to execute.
    pub command: Command,
}

impl Packet {
    /// Creates a packet.
    pub fn new(addr: Addr, command: Command) -> Self {
        Self { addr, command }
    }

    /// Pre-framing payload: address, opcode, clamped fields. No checksum.
    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12);
        out.push(self.addr.hi());
        out.push(self.addr.lo());
        out.push(self.command.opcode());
        match self.command {
            Command::On | Command::Off | Command::PseudoAddrErase => {}
            Command::Level { level } => out.push(level),
            Command::Fade(ch) => ch.emit(&mut out),
            Command::RgbLevel { r, g, b } => {
                out.push(r);
                out.push(g);
                out.push(b);
            }
            Command::Flash {
                steps,
                interval_a,
                interval_b,
                level_a,
                level_b,
            } => {
                out.extend_from_slice(&steps.max(2).to_be_bytes());
                out.extend_from_slice(&interval_a.max(1).to_be_bytes());
                out.extend_from_slice(&interval_b.max(1).to_be_bytes());
                out.push(level_a);
                out.push(level_b);
            }
            Command::RgbFade { r, g, b } => {
                r.emit(&mut out);
                g.emit(&mut out);
                b.emit(&mut out);
            }
            Command::PseudoAddrSet { addr } => {
                out.push(addr.hi());
                out.push(addr.lo());
            }
        }
        out
    }

    /// Full wire packet: payload + checksum, framed and escaped.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = self.payload();
        payload.push(checksum(&payload));
        frame(&payload)
    }

    /// Strict decode of an unframed payload (checksum byte included).
    ///
    /// Rejects checksum mismatches with [`LightError::DecodeBadChecksum`].
    pub fn decode(payload: &[u8]) -> LightResult<Self> {
        Self::decode_inner(payload, true)
    }

    /// Lenient decode of an unframed payload: checksum mismatches are ignored.
    ///
    /// The simulator path uses this; a garbled trailing byte should not hide
    /// an otherwise well-formed command from the virtual fixtures.
    pub fn decode_lenient(payload: &[u8]) -> LightResult<Self> {
        Self::decode_inner(payload, false)
    }

    /// Diagnostic decode of raw wire bytes: unframe, then strict decode.
    pub fn decode_wire(bytes: &[u8]) -> LightResult<Self> {
        let payload = unframe(bytes).ok_or(LightError::DecodeTruncated {
            context: "no complete frame in input",
        })?;
        Self::decode(&payload)
    }

    fn decode_inner(payload: &[u8], verify_checksum: bool) -> LightResult<Self> {
        // addr(2) + opcode(1) + checksum(1) is the minimum viable frame.
        if payload.len() < 4 {
            return Err(LightError::DecodeTruncated {
                context: "frame shorter than address + opcode + checksum",
            });
        }
        let (body, carried) = payload.split_at(payload.len() - 1);
        let carried = carried[0];
        if verify_checksum {
            let computed = checksum(body);
            if computed != carried {
                return Err(LightError::DecodeBadChecksum { computed, carried });
            }
        }

        let addr = Addr::from_bytes(body[0], body[1]);
        let opcode = body[2];
        let fields = &body[3..];
        let command = match opcode {
            Command::OP_ON => Command::On,
            Command::OP_OFF => Command::Off,
            Command::OP_LEVEL => Command::Level {
                level: *fields.first().ok_or(TRUNCATED_FIELDS)?,
            },
            Command::OP_FADE => Command::Fade(ChannelFade::read(fields).ok_or(TRUNCATED_FIELDS)?),
            Command::OP_RGB_LEVEL => Command::RgbLevel {
                r: *fields.first().ok_or(TRUNCATED_FIELDS)?,
                g: *fields.get(1).ok_or(TRUNCATED_FIELDS)?,
                b: *fields.get(2).ok_or(TRUNCATED_FIELDS)?,
            },
            Command::OP_FLASH => {
                if fields.len() < 8 {
                    return Err(TRUNCATED_FIELDS);
                }
                Command::Flash {
                    steps: u16::from_be_bytes([fields[0], fields[1]]),
                    interval_a: u16::from_be_bytes([fields[2], fields[3]]),
                    interval_b: u16::from_be_bytes([fields[4], fields[5]]),
                    level_a: fields[6],
                    level_b: fields[7],
                }
            }
            Command::OP_RGB_FADE => {
                if fields.len() < 9 {
                    return Err(TRUNCATED_FIELDS);
                }
                Command::RgbFade {
                    r: ChannelFade::read(&fields[0..3]).ok_or(TRUNCATED_FIELDS)?,
                    g: ChannelFade::read(&fields[3..6]).ok_or(TRUNCATED_FIELDS)?,
                    b: ChannelFade::read(&fields[6..9]).ok_or(TRUNCATED_FIELDS)?,
                }
            }
            Command::OP_PADDSET => {
                if fields.len() < 2 {
                    return Err(TRUNCATED_FIELDS);
                }
                Command::PseudoAddrSet {
                    addr: Addr::from_bytes(fields[0], fields[1]),
                }
            }
            Command::OP_PADDERASE => Command::PseudoAddrErase,
            _ => {
                return Err(LightError::DecodeTruncated {
                    context: "unknown opcode",
                })
            }
        };

        Ok(Packet { addr, command })
    }
}

const TRUNCATED_FIELDS: LightError = LightError::DecodeTruncated {
    context: "payload ended inside command fields",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_packet_matches_reference_bytes() {
        // Address 5, ON. Pre-framing 00 05 20, checksum 25.
        let p = Packet::new(Addr(5), Command::On);
        assert_eq!(p.payload(), vec![0x00, 0x05, 0x20]);
        assert_eq!(p.encode(), vec![0xC0, 0x00, 0x05, 0x20, 0x25, 0xC0]);
    }

    #[test]
    fn rgb_level_packet_matches_reference_bytes() {
        let p = Packet::new(
            Addr(100),
            Command::RgbLevel {
                r: 255,
                g: 128,
                b: 64,
            },
        );
        assert_eq!(p.payload(), vec![0x00, 0x64, 0x2C, 0xFF, 0x80, 0x40]);
        assert_eq!(p.encode(), vec![
            0xC0, 0x00, 0x64, 0x2C, 0xFF, 0x80, 0x40, 0x77, 0xC0
        ]);
    }

    #[test]
    fn address_packing_roundtrips_the_full_range() {
        for raw in [0u16, 1, 255, 256, 0x1234, 0xFFFE, 0xFFFF] {
            let a = Addr(raw);
            assert_eq!(a.hi() as u16, raw / 256);
            assert_eq!(a.lo() as u16, raw % 256);
            assert_eq!(Addr::from_bytes(a.hi(), a.lo()), a);
        }
    }

    #[test]
    fn fade_fields_are_clamped_not_rejected() {
        let p = Packet::new(
            Addr(1),
            Command::Fade(ChannelFade {
                level: 10,
                interval: 0,
                step: 200,
            }),
        );
        // interval coerced to 1, step to 127.
        assert_eq!(p.payload()[3..], [10, 1, 127]);
    }

    #[test]
    fn flash_minimums_are_enforced() {
        let p = Packet::new(
            Addr(1),
            Command::Flash {
                steps: 0,
                interval_a: 0,
                interval_b: 0,
                level_a: 200,
                level_b: 0,
            },
        );
        let body = p.payload();
        assert_eq!(u16::from_be_bytes([body[3], body[4]]), 2);
        assert_eq!(u16::from_be_bytes([body[5], body[6]]), 1);
        assert_eq!(u16::from_be_bytes([body[7], body[8]]), 1);
    }

    #[test]
    fn strict_decode_roundtrips_every_command() {
        let commands = [
            Command::On,
            Command::Off,
            Command::Level { level: 42 },
            Command::Fade(ChannelFade {
                level: 0,
                interval: 3,
                step: 6,
            }),
            Command::RgbLevel { r: 1, g: 2, b: 3 },
            Command::Flash {
                steps: 10,
                interval_a: 50,
                interval_b: 50,
                level_a: 255,
                level_b: 0,
            },
            Command::RgbFade {
                r: ChannelFade {
                    level: 255,
                    interval: 1,
                    step: 6,
                },
                g: ChannelFade {
                    level: 128,
                    interval: 1,
                    step: 3,
                },
                b: ChannelFade {
                    level: 64,
                    interval: 1,
                    step: 2,
                },
            },
            Command::PseudoAddrSet { addr: Addr(0x0203) },
            Command::PseudoAddrErase,
        ];
        for command in commands {
            let p = Packet::new(Addr(0x1234), command);
            let decoded = Packet::decode_wire(&p.encode()).unwrap();
            assert_eq!(decoded, p);
        }
    }

    #[test]
    fn strict_decode_rejects_bad_checksum_lenient_accepts() {
        let mut payload = Packet::new(Addr(5), Command::On).payload();
        payload.push(checksum(&payload) ^ 0xFF);
        assert!(matches!(
            Packet::decode(&payload),
            Err(LightError::DecodeBadChecksum { .. })
        ));
        let p = Packet::decode_lenient(&payload).unwrap();
        assert_eq!(p.command, Command::On);
    }

    #[test]
    fn truncated_fields_are_reported() {
        // LEVEL with no level byte: 00 01 22 <checksum>.
        let mut payload = vec![0x00, 0x01, Command::OP_LEVEL];
        payload.push(checksum(&payload));
        assert!(matches!(
            Packet::decode(&payload),
            Err(LightError::DecodeTruncated { .. })
        ));
    }

    #[test]
    fn stuffed_addresses_survive_the_wire() {
        // 0xC0DB forces both escapes into the address bytes.
        let p = Packet::new(Addr(0xC0DB), Command::Off);
        let decoded = Packet::decode_wire(&p.encode()).unwrap();
        assert_eq!(decoded.addr, Addr(0xC0DB));
    }
}
