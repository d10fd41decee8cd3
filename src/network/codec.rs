//! Centralizes the bincode configuration used to put a [`TickState`] on the wire.
//!
//! Reconciliation compares states with exact equality, so the wire form must carry every
//! `f32` bit for bit: no quantization, no varint tricks. Fixed-width integer encoding also
//! makes every encoded state the same size, [`TICK_STATE_WIRE_SIZE`] bytes.
//!
//! # Examples
//!
//! ```
//! use rebound::network::codec::{decode_state, encode_state, TICK_STATE_WIRE_SIZE};
//! use rebound::{EntityState, Tick, TickState, Vec2};
//!
//! let state = TickState::new(Tick::new(7), EntityState::new(Vec2::new(0.1, -2.5), Vec2::ZERO));
//! let bytes = encode_state(&state).expect("encoding should succeed");
//! assert_eq!(bytes.len(), TICK_STATE_WIRE_SIZE);
//! assert_eq!(decode_state(&bytes).expect("decoding should succeed"), state);
//! ```

use serde::de::DeserializeOwned;
use std::fmt;

use crate::error::ReboundError;
use crate::state::TickState;

/// Encoded size of one [`TickState`]: an `i32` tick and four `f32` components.
pub const TICK_STATE_WIRE_SIZE: usize = 4 + 4 * 4;

/// Encoded size of a `(previous, current)` notification.
pub const NOTIFICATION_WIRE_SIZE: usize = 2 * TICK_STATE_WIRE_SIZE;

// Fixed-width integers keep message sizes constant and byte layout deterministic.
fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// What was being encoded or decoded when a codec error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// A single tick state.
    State,
    /// A `(previous, current)` pair.
    Notification,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State => write!(f, "tick state"),
            Self::Notification => write!(f, "change notification"),
        }
    }
}

/// Errors that can occur during encoding or decoding.
///
/// Bincode's own errors only expose a `Display` message, which is kept as a `String`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// A fixed-size message was followed by extra bytes.
    TrailingBytes {
        /// Bytes the message occupied.
        consumed: usize,
        /// Bytes that were provided.
        provided: usize,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
}

impl CodecError {
    /// Creates a new encode error with the given message and operation.
    #[must_use]
    pub fn encode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation,
        }
    }

    /// Creates a new decode error with the given message and operation.
    #[must_use]
    pub fn decode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed for {operation}: {message}")
            },
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed for {operation}: {message}")
            },
            Self::TrailingBytes {
                consumed,
                provided,
                operation,
            } => {
                write!(
                    f,
                    "{operation} used {consumed} of {provided} bytes, the rest is unexpected"
                )
            },
        }
    }
}

impl std::error::Error for CodecError {}

impl From<CodecError> for ReboundError {
    fn from(err: CodecError) -> Self {
        Self::Codec {
            context: err.to_string(),
        }
    }
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Decodes a value that must occupy `bytes` exactly.
fn decode_exact<T: DeserializeOwned>(bytes: &[u8], operation: CodecOperation) -> CodecResult<T> {
    let (value, consumed) = bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| CodecError::decode(e.to_string(), operation))?;
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes {
            consumed,
            provided: bytes.len(),
            operation,
        });
    }
    Ok(value)
}

/// Encodes one [`TickState`].
pub fn encode_state(state: &TickState) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(state, config())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::State))
}

/// Decodes one [`TickState`], rejecting truncated input and trailing bytes.
pub fn decode_state(bytes: &[u8]) -> CodecResult<TickState> {
    decode_exact(bytes, CodecOperation::State)
}

/// Encodes a `(previous, current)` change notification.
pub fn encode_notification(previous: &TickState, current: &TickState) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec((previous, current), config())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::Notification))
}

/// Decodes a `(previous, current)` change notification.
pub fn decode_notification(bytes: &[u8]) -> CodecResult<(TickState, TickState)> {
    decode_exact(bytes, CodecOperation::Notification)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::state::{EntityState, Vec2};
    use crate::test_config::miri_case_count;
    use crate::Tick;
    use proptest::prelude::*;

    fn state_from_bits(tick: i32, bits: [u32; 4]) -> TickState {
        TickState::new(
            Tick::new(tick),
            EntityState::new(
                Vec2::new(f32::from_bits(bits[0]), f32::from_bits(bits[1])),
                Vec2::new(f32::from_bits(bits[2]), f32::from_bits(bits[3])),
            ),
        )
    }

    fn bits(state: &TickState) -> [u32; 4] {
        [
            state.position.x.to_bits(),
            state.position.y.to_bits(),
            state.velocity.x.to_bits(),
            state.velocity.y.to_bits(),
        ]
    }

    #[test]
    fn state_has_fixed_wire_size() {
        for tick in [0, 1, 1_000_000, i32::MAX] {
            let state = TickState::new(Tick::new(tick), EntityState::default());
            assert_eq!(encode_state(&state).unwrap().len(), TICK_STATE_WIRE_SIZE);
        }
    }

    #[test]
    fn special_floats_keep_their_bits() {
        let specials = [
            (-0.0f32).to_bits(),
            f32::MIN_POSITIVE.to_bits() >> 1, // subnormal
            0x7fc0_1234,                      // NaN with payload
            f32::INFINITY.to_bits(),
        ];
        let state = state_from_bits(3, specials);
        let decoded = decode_state(&encode_state(&state).unwrap()).unwrap();
        assert_eq!(bits(&decoded), specials);
        assert_eq!(decoded.tick, Tick::new(3));
    }

    #[test]
    fn notification_carries_both_states_in_order() {
        let previous = state_from_bits(1, [1, 2, 3, 4]);
        let current = state_from_bits(2, [5, 6, 7, 8]);
        let bytes = encode_notification(&previous, &current).unwrap();
        assert_eq!(bytes.len(), NOTIFICATION_WIRE_SIZE);

        let (p, c) = decode_notification(&bytes).unwrap();
        assert_eq!(p.tick, Tick::new(1));
        assert_eq!(bits(&c), [5, 6, 7, 8]);
    }

    #[test]
    fn truncated_state_is_rejected() {
        let bytes = encode_state(&TickState::default()).unwrap();
        let err = decode_state(&bytes[..TICK_STATE_WIRE_SIZE - 1]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::DecodeError {
                operation: CodecOperation::State,
                ..
            }
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode_state(&TickState::default()).unwrap();
        bytes.push(0);
        let err = decode_state(&bytes).unwrap_err();
        assert_eq!(
            err,
            CodecError::TrailingBytes {
                consumed: TICK_STATE_WIRE_SIZE,
                provided: TICK_STATE_WIRE_SIZE + 1,
                operation: CodecOperation::State,
            }
        );
    }

    #[test]
    fn notification_is_two_states_back_to_back() {
        let previous = state_from_bits(9, [10, 20, 30, 40]);
        let current = state_from_bits(10, [11, 21, 31, 41]);
        let bytes = encode_notification(&previous, &current).unwrap();
        assert_eq!(&bytes[..TICK_STATE_WIRE_SIZE], encode_state(&previous).unwrap().as_slice());
        assert_eq!(&bytes[TICK_STATE_WIRE_SIZE..], encode_state(&current).unwrap().as_slice());
    }

    #[test]
    fn truncated_notification_is_rejected() {
        let bytes = encode_notification(&TickState::default(), &TickState::default()).unwrap();
        let err = decode_notification(&bytes[..NOTIFICATION_WIRE_SIZE - 1]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::DecodeError {
                operation: CodecOperation::Notification,
                ..
            }
        ));
    }

    #[test]
    fn codec_error_converts_to_rebound_error() {
        let err: ReboundError = CodecError::decode("boom", CodecOperation::Notification).into();
        match err {
            ReboundError::Codec { context } => {
                assert!(context.contains("change notification"));
                assert!(context.contains("boom"));
            },
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let state = state_from_bits(5, [1, 1, 1, 1]);
        assert_eq!(encode_state(&state).unwrap(), encode_state(&state).unwrap());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn every_bit_pattern_survives(tick in any::<i32>(), raw in any::<[u32; 4]>()) {
            let state = state_from_bits(tick, raw);
            let decoded = decode_state(&encode_state(&state).unwrap()).unwrap();
            prop_assert_eq!(decoded.tick, state.tick);
            prop_assert_eq!(bits(&decoded), raw);
        }
    }
}
