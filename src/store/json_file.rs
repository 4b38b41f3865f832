//! JSON file-backed state store.
//!
//! One pretty-printed JSON file per key under the data directory:
//!
//! ```text
//! data/
//!   auth.json
//!   balances.json
//!   last_run.json
//! ```
//!
//! Files are shared mutable state across runs with no locking; concurrent
//! runs race, as documented.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::fs;

use super::StateStore;

pub struct JsonFileStore {
    base_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn key_file(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{key}.json"))
    }
}

#[async_trait::async_trait]
impl StateStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.key_file(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                tracing::warn!(key, error = %err, "state file unreadable, treating as absent");
                return Ok(None);
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(key, error = %err, "state file malformed, treating as absent");
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: &Value) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .with_context(|| format!("Failed to create data dir: {}", self.base_path.display()))?;

        let path = self.key_file(key);
        let content = serde_json::to_string_pretty(value).context("Failed to serialize state")?;
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        Ok(())
    }
}
