//! # Error types used by the lumibus core.
//!
//! One enum covers both the request path (lookup/validation failures) and the
//! delivery path (transport failures, diagnostic decode failures):
//!
//! - Lookup/validation: [`LightError::NotFound`], [`LightError::NoAddresses`],
//!   [`LightError::BadState`], [`LightError::BadRange`]
//! - Delivery: [`LightError::TransportClosed`], [`LightError::TransportIo`]
//! - Diagnostic decode: [`LightError::DecodeBadChecksum`], [`LightError::DecodeTruncated`]
//!
//! `as_label` yields short stable snake_case labels for logs and metrics.
//! The HTTP collaborator maps kinds to status codes (`NotFound`→404,
//! `BadState`/`BadRange`→400, transport kinds→502) via [`LightError::is_client_fault`]
//! and [`LightError::is_transport`].

use thiserror::Error;

/// Errors produced by the lighting core.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LightError {
    /// Unknown entity identifier (apartment, floor group, or fixture).
    #[error("unknown {kind} '{id}'")]
    NotFound {
        /// Entity kind that was looked up ("apartment", "floor_group", "fixture").
        kind: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// Entity exists but has no fixture associations, so nothing can be lit.
    #[error("'{id}' has no fixture addresses")]
    NoAddresses {
        /// The entity identifier.
        id: String,
    },

    /// Requested state is not in the closed state set.
    #[error("unknown state '{state}'")]
    BadState {
        /// The rejected state string.
        state: String,
    },

    /// Numeric parameter out of documented bounds at the API boundary.
    ///
    /// The codec clamps silently; this variant is only raised by request
    /// validation before any packet is built.
    #[error("{what} out of range: {value} (allowed {min}..={max})")]
    BadRange {
        /// Which parameter was rejected.
        what: &'static str,
        /// Offending value.
        value: i64,
        /// Lower bound (inclusive).
        min: i64,
        /// Upper bound (inclusive).
        max: i64,
    },

    /// Enqueue rejected because the transport is shut down or abandoned reconnect.
    #[error("transport closed")]
    TransportClosed,

    /// Underlying serial write or open failed.
    #[error("transport i/o: {reason}")]
    TransportIo {
        /// Human-readable failure description from the serial layer.
        reason: String,
    },

    /// Diagnostic decode: checksum over the payload did not match the trailing byte.
    #[error("bad checksum: computed {computed:#04x}, frame carried {carried:#04x}")]
    DecodeBadChecksum {
        /// XOR over the payload bytes.
        computed: u8,
        /// Checksum byte carried by the frame.
        carried: u8,
    },

    /// Diagnostic decode: frame ended before the payload for its opcode was complete.
    #[error("truncated frame: {context}")]
    DecodeTruncated {
        /// What was being read when the data ran out.
        context: &'static str,
    },
}

impl LightError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LightError::NotFound { .. } => "not_found",
            LightError::NoAddresses { .. } => "no_addresses",
            LightError::BadState { .. } => "bad_state",
            LightError::BadRange { .. } => "bad_range",
            LightError::TransportClosed => "transport_closed",
            LightError::TransportIo { .. } => "transport_io",
            LightError::DecodeBadChecksum { .. } => "decode_bad_checksum",
            LightError::DecodeTruncated { .. } => "decode_truncated",
        }
    }

    /// True for errors the caller caused (4xx at the HTTP boundary).
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            LightError::NotFound { .. }
                | LightError::NoAddresses { .. }
                | LightError::BadState { .. }
                | LightError::BadRange { .. }
        )
    }

    /// True for delivery-path failures (502 at the HTTP boundary).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LightError::TransportClosed | LightError::TransportIo { .. }
        )
    }
}

impl From<std::io::Error> for LightError {
    fn from(e: std::io::Error) -> Self {
        LightError::TransportIo {
            reason: e.to_string(),
        }
    }
}

impl From<serialport::Error> for LightError {
    fn from(e: serialport::Error) -> Self {
        LightError::TransportIo {
            reason: e.to_string(),
        }
    }
}

/// Convenience alias used across the crate.
pub type LightResult<T> = Result<T, LightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(
            LightError::NotFound {
                kind: "apartment",
                id: "A-101".into()
            }
            .as_label(),
            "not_found"
        );
        assert_eq!(LightError::TransportClosed.as_label(), "transport_closed");
    }

    #[test]
    fn classification_splits_client_and_transport() {
        let bad = LightError::BadState {
            state: "LEASED".into(),
        };
        assert!(bad.is_client_fault());
        assert!(!bad.is_transport());

        let closed = LightError::TransportClosed;
        assert!(closed.is_transport());
        assert!(!closed.is_client_fault());
    }
}
