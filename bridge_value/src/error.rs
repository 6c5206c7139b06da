use std::fmt;

/// Errors raised while unpacking a wire value.
///
/// A hand-written enum rather than one derived with `thiserror` — no crate
/// in this workspace's dependency graph pulls that in.
#[derive(Debug)]
pub enum Error {
    /// A value that cannot be represented on the wire (a non-shared
    /// function, a raw pointer, ...). Surfaces as `TypeError` on unpack.
    UnsupportedType { path: String, type_name: &'static str },
    /// `'o'` envelope had `raw == null`: the referenced bridgeable object
    /// has already been closed.
    ClosedBridgeObject { path: String },
    /// `'o'` envelope's packed id does not resolve to a live proxy/object.
    InvalidPackedId { path: String, packed_id: i64 },
    /// `'s'` envelope names a share id unknown to the process-wide table.
    InvalidShareId { path: String, share_id: String },
    /// `shareData` was called twice for the same name with differing
    /// values.
    DuplicateShareId { share_id: String },
    /// Raw JSON (de)serialization of a `raw` payload failed.
    Json(String),
}

impl Error {
    /// Path through the value tree at which the error occurred.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::UnsupportedType { path, .. }
            | Error::ClosedBridgeObject { path }
            | Error::InvalidPackedId { path, .. }
            | Error::InvalidShareId { path, .. } => Some(path),
            Error::DuplicateShareId { .. } | Error::Json(_) => None,
        }
    }

    /// The JS-side error class this would surface as on the other end of
    /// the bridge.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedType { .. } => ErrorKind::TypeError,
            Error::ClosedBridgeObject { .. } => ErrorKind::TypeError,
            Error::InvalidPackedId { .. } => ErrorKind::RangeError,
            Error::InvalidShareId { .. } => ErrorKind::RangeError,
            Error::DuplicateShareId { .. } => ErrorKind::Error,
            Error::Json(_) => ErrorKind::TypeError,
        }
    }
}

/// The JS error "base" class a given failure would be reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TypeError,
    RangeError,
    Error,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedType { path, type_name } => {
                write!(f, "unsupported type {type_name} at {path}")
            }
            Error::ClosedBridgeObject { path } => {
                write!(f, "Closed bridge object at {path}")
            }
            Error::InvalidPackedId { path, packed_id } => {
                write!(f, "Invalid packedId {packed_id} at {path}")
            }
            Error::InvalidShareId { path, share_id } => {
                write!(f, "Invalid shareId '{share_id}' at {path}")
            }
            Error::DuplicateShareId { share_id } => {
                write!(f, "shareId '{share_id}' already registered with a different value")
            }
            Error::Json(msg) => write!(f, "raw value error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
