use std::fmt;
use std::net::SocketAddr;

use serde::Serialize;
use thiserror::Error;

use crate::registry::Layer;

/// Failure of a single `invoke` or `send_raw` call.
///
/// Serialized with a `code` tag so the CLI `--json` output and the HTTP API
/// can report it as structured data.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "code", content = "detail")]
pub enum DispatchError {
    #[error("{command}: {reason}")]
    NotFound {
        command: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        layer: Option<Layer>,
        reason: NotFoundReason,
    },
    #[error("{command}: {value} is outside {min} to {max}")]
    RangeError {
        command: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{command} {message}")]
    TypeError { command: String, message: String },
    #[error("encode failed: {0}")]
    EncodeError(#[from] OscError),
    #[error("transport failed: {0}")]
    TransportError(#[from] TransportError),
}

impl DispatchError {
    /// Stable short name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::RangeError { .. } => "RangeError",
            Self::TypeError { .. } => "TypeError",
            Self::EncodeError(_) => "EncodeError",
            Self::TransportError(_) => "TransportError",
        }
    }

    /// True when the caller's input was rejected before anything was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::RangeError { .. }
                | Self::TypeError { .. }
                | Self::EncodeError(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundReason {
    UnknownCommand,
    LayerRequired,
    LayerNotAccepted,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::LayerRequired => write!(f, "requires a layer (macro, meso or micro)"),
            Self::LayerNotAccepted => write!(f, "takes no layer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown layer '{0}' (expected macro, meso or micro)")]
pub struct ParseLayerError(pub String);

/// The parameter table violates a registry invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("duplicate command name '{name}'")]
    DuplicateName { name: String },
    #[error("duplicate address '{address}'")]
    DuplicateAddress { address: String },
    #[error("{name}: {message}")]
    InvalidDomain { name: String, message: String },
    #[error("{name}: address pattern '{pattern}' has no usable layer placeholder")]
    UnresolvedPattern { name: String, pattern: String },
    #[error("{name}: {source}")]
    InvalidAddress {
        name: String,
        #[source]
        source: OscError,
    },
}

/// OSC message encoding or decoding failure.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "code", content = "detail")]
pub enum OscError {
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: &'static str },
    #[error("integer {value} does not fit in int32")]
    IntegerOverflow { value: i64 },
    #[error("float {value} is not finite")]
    NonFiniteFloat { value: f64 },
    #[error("message is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("malformed packet: {reason}")]
    Malformed { reason: &'static str },
    #[error("unsupported type tag '{tag}'")]
    UnsupportedTag { tag: char },
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", content = "detail")]
pub enum TransportError {
    #[error("cannot bind {address}: {message}")]
    Bind { address: String, message: String },
    #[error("send to {destination} failed: {message}")]
    Send {
        destination: SocketAddr,
        message: String,
    },
    #[error("short send to {destination}: {sent} of {expected} bytes")]
    ShortSend {
        destination: SocketAddr,
        sent: usize,
        expected: usize,
    },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot resolve {host}:{port}")]
    Unresolvable { host: String, port: u16 },
    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_serialize_with_code_tag() {
        let err = DispatchError::RangeError {
            command: "seqbpm".to_string(),
            value: 5.0,
            min: 10.0,
            max: 300.0,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "RangeError");
        assert_eq!(json["detail"]["min"], 10.0);
        assert_eq!(err.to_string(), "seqbpm: 5 is outside 10 to 300");
    }

    #[test]
    fn not_found_message_names_the_reason() {
        let err = DispatchError::NotFound {
            command: "gain".to_string(),
            layer: None,
            reason: NotFoundReason::LayerRequired,
        };
        assert!(err.to_string().contains("requires a layer"));
        assert!(err.is_validation());
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn transport_errors_are_not_validation() {
        let err: DispatchError = TransportError::Send {
            destination: "127.0.0.1:4799".parse().unwrap(),
            message: "unreachable".to_string(),
        }
        .into();
        assert!(!err.is_validation());
        assert_eq!(err.kind(), "TransportError");
    }
}
