//! Durable key-value state shared by every page invocation.
//!
//! ## Keys
//!
//! ```text
//! currentTask   # the single active Task (or the last cleared one)
//! taskSeq       # last issued task id
//! dictionary    # purposes/areas scraped from the site
//! profiles      # saved searches
//! settings      # credentials, check interval, language
//! ```
//!
//! Values are JSON. [`LocalStorage`] keeps one file per key; [`MemoryStorage`]
//! is process-local.

pub mod local;
pub mod memory;
pub mod records;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::Result;

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use records::{DictionaryStore, ProfileStore, Settings, SettingsStore, TaskStore};

/// Versionless key-value backend.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value, `None` when the key was never written.
    async fn get_raw(&self, key: &str) -> Result<Option<Value>>;

    async fn set_raw(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// Read and decode a typed value.
pub async fn read<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get_raw(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encode and write a typed value.
pub async fn write<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    store.set_raw(key, serde_json::to_value(value)?).await
}
