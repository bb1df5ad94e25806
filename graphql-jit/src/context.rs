//! Provide a [`Context`] shared by every resolver of one execution.
//!
//! The context is a DashMap of JSON entries, so resolvers running concurrently in the same
//! fan-out batch can read and write it without coordination.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::json_ext::Value;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Holds [`Context`] entries.
pub(crate) type Entries = Arc<DashMap<String, Value>>;

/// Per-request data handed to every resolver through
/// [`ResolveInfo::context`](crate::resolver::ResolveInfo::context).
///
/// Cloning a context is cheap and clones share their entries.
#[derive(Clone, Debug, Default)]
pub struct Context {
    entries: Entries,
}

impl Context {
    pub fn new() -> Self {
        Context {
            entries: Default::default(),
        }
    }

    /// Returns a deserialized copy of the entry stored under `key`.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>, BoxError> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        Ok(Some(serde_json_bytes::from_value(entry.value().clone())?))
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn insert(&self, key: impl Into<String>, value: impl Serialize) -> Result<(), BoxError> {
        self.entries.insert(key.into(), serde_json_bytes::to_value(value)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Context;

    #[test]
    fn insert_and_get() {
        let context = Context::new();
        context.insert("viewer", "ada").unwrap();
        context.insert("viewer", "grace").unwrap();
        assert_eq!(
            context.get::<String>("viewer").unwrap(),
            Some("grace".to_string())
        );
        assert_eq!(context.get::<String>("missing").unwrap(), None);
    }

    #[test]
    fn get_with_the_wrong_type_fails() {
        let context = Context::new();
        context.insert("viewer", "ada").unwrap();
        assert!(context.get::<u32>("viewer").is_err());
    }

    #[test]
    fn clones_share_entries() {
        let context = Context::new();
        context.clone().insert("calls", 1).unwrap();
        assert_eq!(context.get("calls").unwrap(), Some(1));
    }
}
