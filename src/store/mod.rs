mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use anyhow::Result;
use serde_json::Value;

/// Store key for the cached bearer token (`{"auth_token": …}`).
pub const AUTH_KEY: &str = "auth";
/// Store key for the last successfully fetched balances snapshot.
pub const BALANCES_KEY: &str = "balances";
/// Store key for the raw snapshot debug copy.
pub const BALANCES_RAW_KEY: &str = "balances_raw";
/// Store key for the inventory listing captured by probe runs.
pub const INVENTORY_KEY: &str = "inventory";
/// Store key for the per-run audit record.
pub const LAST_RUN_KEY: &str = "last_run";

/// Key-value blob store for state shared across runs.
///
/// Absence is a first-class value: a missing key loads as `None`, and
/// implementations treat unreadable or malformed persisted content the same
/// way rather than failing the run.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn put(&self, key: &str, value: &Value) -> Result<()>;
}
