use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::Tick;

/// This enum contains all error messages this library can return. Most API functions will
/// generally return a [`ReboundResult<T>`].
///
/// Disagreement between a predicted state and the authoritative state is *not* an error:
/// it is the normal signal that triggers a correction. The variants here describe broken
/// invariants and invalid requests.
#[derive(Debug, Clone, PartialEq)]
pub enum ReboundError {
    /// A state was appended to a [`HistoryLog`](crate::HistoryLog) whose tick does not
    /// strictly follow the newest entry. This is a programming error: continuing with a
    /// corrupt history produces undetectable drift.
    OutOfOrderHistory {
        /// The newest tick already in the log.
        last: Tick,
        /// The tick that was rejected.
        attempted: Tick,
    },
    /// You made an invalid request, usually by calling an operation on the wrong role.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// A configuration value was rejected during validation.
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// Encoding or decoding a replicated state failed.
    Codec {
        /// A description of what failed to encode/decode.
        context: String,
    },
    /// An internal error occurred that should not happen under normal operation.
    /// If you encounter this error, please report it as a bug.
    InternalError {
        /// A description of the internal error.
        context: String,
    },
}

/// Result alias used throughout the crate.
pub type ReboundResult<T> = Result<T, ReboundError>;

impl Display for ReboundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrderHistory { last, attempted } => {
                write!(
                    f,
                    "History append out of order: tick {} does not follow newest tick {}",
                    attempted, last
                )
            },
            Self::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            },
            Self::InvalidConfig { field, reason } => {
                write!(f, "Invalid configuration for `{}`: {}", field, reason)
            },
            Self::Codec { context } => {
                write!(f, "Codec error: {}", context)
            },
            Self::InternalError { context } => {
                write!(f, "Internal error (please report as bug): {}", context)
            },
        }
    }
}

impl Error for ReboundError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_display_names_both_ticks() {
        let err = ReboundError::OutOfOrderHistory {
            last: Tick::new(7),
            attempted: Tick::new(5),
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains('5'));
    }

    #[test]
    fn invalid_config_display_names_field() {
        let err = ReboundError::InvalidConfig {
            field: "half_size",
            reason: "must be finite".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration for `half_size`: must be finite"
        );
    }

    #[test]
    fn errors_are_std_errors() {
        fn assert_error<E: Error>(_: &E) {}
        assert_error(&ReboundError::InternalError {
            context: "x".to_string(),
        });
    }
}
