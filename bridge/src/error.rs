use std::fmt;

use bridge_value::ErrorKind;

/// Errors raised by the bridge runtime itself, as opposed to
/// [`bridge_value::Error`] which the codec raises while unpacking a value.
///
/// A hand-written enum with manual `Display`/`std::error::Error` impls,
/// not `thiserror` — consistent with [`bridge_value::Error`].
#[derive(Debug)]
pub enum Error {
    /// A verb (`close`/`emit`/`update`/`addListener`/...) was applied to a
    /// value the Magic Store has never marked bridgeable.
    NotBridgeable,
    /// An incoming call named a method this object does not expose.
    NoSuchMethod { name: String },
    /// A method stub was invoked after the proxy (or its remote target)
    /// was closed.
    ClosedProxy { name: String },
    /// A `returns` entry named a `callId` with no matching pending call.
    InvalidCallId { call_id: u64 },
    /// A `changed`/`events`/`closed` entry named a `localId` this peer has
    /// never created a proxy for.
    InvalidLocalId { local_id: i64 },
    /// `shareData` registered the same name twice with different values.
    DuplicateShareId { share_id: String },
    /// The peer was closed, usually surfaced from a pending call's
    /// rejection.
    Closed(String),
    /// Propagated from the codec while unpacking a value embedded in a
    /// message.
    Value(bridge_value::Error),
    /// A remote method call's return payload carried the throw flag — the
    /// peer's method body returned `Err`, not a transport failure.
    Thrown(bridge_value::JsError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotBridgeable => ErrorKind::TypeError,
            Error::NoSuchMethod { .. } => ErrorKind::TypeError,
            Error::ClosedProxy { .. } => ErrorKind::TypeError,
            Error::InvalidCallId { .. } => ErrorKind::RangeError,
            Error::InvalidLocalId { .. } => ErrorKind::RangeError,
            Error::DuplicateShareId { .. } => ErrorKind::Error,
            Error::Closed(_) => ErrorKind::Error,
            Error::Value(e) => e.kind(),
            Error::Thrown(e) => match e.class {
                Some(bridge_value::JsErrorClass::TypeError) => ErrorKind::TypeError,
                Some(bridge_value::JsErrorClass::RangeError) => ErrorKind::RangeError,
                _ => ErrorKind::Error,
            },
        }
    }
}

impl From<bridge_value::Error> for Error {
    fn from(e: bridge_value::Error) -> Self {
        Error::Value(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotBridgeable => write!(f, "object has not been marked bridgeable"),
            Error::NoSuchMethod { name } => write!(f, "'{name}' is not a function"),
            Error::ClosedProxy { name } => write!(f, "Cannot call method '{name}' of closed proxy"),
            Error::InvalidCallId { call_id } => write!(f, "Invalid callId {call_id}"),
            Error::InvalidLocalId { local_id } => write!(f, "Invalid localId {local_id}"),
            Error::DuplicateShareId { share_id } => {
                write!(f, "shareId '{share_id}' already registered with a different value")
            }
            Error::Closed(msg) => write!(f, "{msg}"),
            Error::Value(e) => write!(f, "{e}"),
            Error::Thrown(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Value(e) => Some(e),
            Error::Thrown(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
