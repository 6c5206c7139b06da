//! `shareData`: registers a table of process-wide constants by name, the
//! same mechanism [`crate::management::ON_METHOD`]/`WATCH_METHOD` use
//! internally, exposed for application code to share its own constants
//! (enum-like marker values, singleton handles) the same way.

use std::any::Any;
use std::sync::Arc;

/// Registers every `(key, value)` pair in `table` under
/// `"<namespace>.<key>"` if `namespace` is given, or bare `key` otherwise —
/// the Rust stand-in for calling `shareData` with a plain object of
/// constants. Re-registering the exact same `Arc` under a name already
/// taken is a no-op; registering a different value under a taken name
/// fails with `Error::DuplicateShareId`.
pub fn share_data<K, V>(table: impl IntoIterator<Item = (K, Arc<V>)>, namespace: Option<&str>) -> crate::Result<()>
where
    K: AsRef<str>,
    V: Any + Send + Sync,
{
    for (key, value) in table {
        let name = match namespace {
            Some(ns) => format!("{ns}.{}", key.as_ref()),
            None => key.as_ref().to_string(),
        };
        bridge_value::SHARE_TABLE.register(name, value as Arc<dyn Any + Send + Sync>)?;
    }
    Ok(())
}
