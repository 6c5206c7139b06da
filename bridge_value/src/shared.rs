use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

/// Registry backing `PeerHandle::lookup_shared`/`shared_name_of`: a small
/// set of constants (functions, enums, sentinel objects) both ends of a
/// bridge already agree on by name, so they never need to be packed by
/// value.
///
/// One process-wide table, mirroring how the wire protocol treats shared
/// constants as globally named rather than scoped to a single bridge.
pub struct ShareTable {
    by_name: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl ShareTable {
    fn new() -> Self {
        ShareTable { by_name: RwLock::new(HashMap::new()) }
    }

    /// Register `value` under `name`. Registering the same name twice is
    /// only an error if the value differs by pointer identity from what
    /// was already registered — re-registering the exact same `Arc` is a
    /// no-op, which lets call-once module-init code run more than once
    /// without panicking.
    pub fn register(&self, name: impl Into<String>, value: Arc<dyn Any + Send + Sync>) -> crate::Result<()> {
        let name = name.into();
        let mut table = self.by_name.write().expect("share table lock poisoned");
        match table.get(&name) {
            Some(existing) if Arc::ptr_eq(existing, &value) => Ok(()),
            Some(_) => {
                tracing::warn!(share_id = %name, "duplicate share registration with a different value");
                Err(crate::Error::DuplicateShareId { share_id: name })
            }
            None => {
                table.insert(name, value);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.by_name.read().expect("share table lock poisoned").get(name).cloned()
    }

    pub fn name_of(&self, value: &dyn Any) -> Option<String> {
        let table = self.by_name.read().expect("share table lock poisoned");
        table
            .iter()
            .find(|(_, v)| std::ptr::eq(v.as_ref() as *const dyn Any as *const (), value as *const dyn Any as *const ()))
            .map(|(name, _)| name.clone())
    }
}

/// The single process-wide instance, analogous to the `shareData` module
/// singleton.
pub static SHARE_TABLE: Lazy<ShareTable> = Lazy::new(ShareTable::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup_roundtrips() {
        let table = ShareTable::new();
        let value: Arc<dyn Any + Send + Sync> = Arc::new(42u32);
        table.register("test.answer", value.clone()).unwrap();
        let found = table.lookup("test.answer").unwrap();
        assert_eq!(*found.downcast_ref::<u32>().unwrap(), 42);
        assert_eq!(table.name_of(value.as_ref()), Some("test.answer".to_string()));
    }

    #[test]
    fn duplicate_registration_with_different_value_errors() {
        let table = ShareTable::new();
        table.register("dup", Arc::new(1u32) as Arc<dyn Any + Send + Sync>).unwrap();
        let err = table.register("dup", Arc::new(2u32) as Arc<dyn Any + Send + Sync>).unwrap_err();
        assert!(matches!(err, crate::Error::DuplicateShareId { .. }));
    }

    #[test]
    fn duplicate_registration_with_same_arc_is_fine() {
        let table = ShareTable::new();
        let value: Arc<dyn Any + Send + Sync> = Arc::new(1u32);
        table.register("same", value.clone()).unwrap();
        table.register("same", value).unwrap();
    }
}
