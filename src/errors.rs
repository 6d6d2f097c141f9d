use std::net::SocketAddr;

use thiserror::Error;

use crate::domain::entities::field_record::FieldType;

/// Structural corruption of the binary receipt container.
///
/// Always fatal to the current decode; no partial field list is ever
/// returned alongside one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("receipt data is not valid base64: {0}")]
    InvalidBase64(String),

    #[error("receipt data is empty")]
    Empty,

    /// The input ended before a declared length was satisfied.
    #[error("truncated at offset {offset}: {needed} bytes declared, {available} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A length is malformed or does not fit inside its enclosing container.
    #[error("bad length at offset {offset}: {reason}")]
    BadLength { offset: usize, reason: String },

    /// A structural element carried a tag other than the one the format
    /// requires at that position.
    #[error("unsupported type at offset {offset}: expected tag {expected:#04x}, found {found:#04x}")]
    UnsupportedType {
        offset: usize,
        expected: u8,
        found: u8,
    },

    #[error("envelope mismatch: {0}")]
    EnvelopeMismatch(String),
}

/// A structurally valid receipt whose fields do not form a trustworthy
/// receipt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("missing required field {field_id} ({name})")]
    MissingRequiredField { field_id: i64, name: &'static str },

    #[error("field {field_id} holds an invalid date: {value:?}")]
    InvalidDate { field_id: i64, value: String },

    #[error("inconsistent purchase grouping at field {field_id}: {reason}")]
    InconsistentPurchaseGrouping { field_id: i64, reason: String },

    #[error("field {field_id} has type {found:?}, expected {expected:?}")]
    UnexpectedFieldType {
        field_id: i64,
        expected: FieldType,
        found: FieldType,
    },

    #[error("field {field_id} holds an invalid value: {reason}")]
    InvalidValue { field_id: i64, reason: String },

    #[error("nested container in field {field_id} is corrupt: {source}")]
    NestedDecode {
        field_id: i64,
        #[source]
        source: DecodeError,
    },
}

/// Failure to turn a base64 receipt string into a [`Receipt`].
///
/// [`Receipt`]: crate::domain::entities::receipt::Receipt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiptError {
    #[error("malformed receipt: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid receipt: {0}")]
    Model(#[from] ModelError),
}

/// The verification callout never produced an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("verification callout to {url} failed: {reason}")]
pub struct TransportError {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Error)]
#[error("failed to build HTTP client: {0}")]
pub struct HttpClientError(#[from] pub reqwest::Error);

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read fault policy {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse fault policy: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid fault rule #{index}: {reason}")]
    InvalidRule { index: usize, reason: String },
}

/// Errors that end a server process. Per-request faults are simulated
/// behavior and never surface here.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("port unavailable: could not bind {addr}: {source}")]
    PortUnavailable {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server I/O failure: {0}")]
    Io(#[from] std::io::Error),
}
