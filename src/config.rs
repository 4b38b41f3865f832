use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default Telegram Web entry point.
fn default_telegram_url() -> String {
    "https://web.telegram.org/a/".to_string()
}

/// Default store API base.
fn default_api_base() -> String {
    "https://demo-api-rd.zargates.com".to_string()
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from the config file's
    /// location. If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    /// Telegram Web URL with the store bot's chat open.
    #[serde(default = "default_telegram_url")]
    pub telegram_url: String,

    /// Base URL of the store's REST API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Direct Mini App URL (tgWebAppData included) for probe mode.
    pub tma_url: Option<String>,

    /// Run Chrome without a visible window.
    pub headless: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            telegram_url: default_telegram_url(),
            api_base: default_api_base(),
            tma_url: None,
            headless: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Resolve the data directory path.
    ///
    /// If `data_dir` is set and relative, it's resolved relative to
    /// `config_dir`. If `data_dir` is not set, returns `config_dir`.
    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./gemflow.toml` if it exists in the current directory
/// 2. `~/.local/share/gemflow/gemflow.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("gemflow.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("gemflow").join("gemflow.toml");
    }

    local_config
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The resolved data directory path.
    pub data_dir: PathBuf,
    pub telegram_url: String,
    pub api_base: String,
    pub tma_url: Option<String>,
    pub headless: bool,
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    ///
    /// The data directory is resolved relative to the config file's parent
    /// directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        let data_dir = config.resolve_data_dir(config_dir);

        Ok(Self {
            data_dir,
            telegram_url: config.telegram_url,
            api_base: config.api_base,
            tma_url: config.tma_url,
            headless: config.headless,
        })
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    ///
    /// If the config file doesn't exist, the config file's intended parent
    /// directory is used as the data directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        let config = Config::default();
        Ok(Self {
            data_dir: config.resolve_data_dir(config_dir),
            telegram_url: config.telegram_url,
            api_base: config.api_base,
            tma_url: config.tma_url,
            headless: config.headless,
        })
    }

    /// Chrome profile directory kept alongside the run data, so the
    /// Telegram session survives between runs.
    pub fn profile_dir(&self) -> PathBuf {
        self.data_dir.join("profile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn default_data_dir_is_config_dir() {
        let config = Config::default();
        let config_dir = Path::new("/home/user/gems");
        assert_eq!(
            config.resolve_data_dir(config_dir),
            PathBuf::from("/home/user/gems")
        );
    }

    #[test]
    fn relative_data_dir_resolves_from_config_dir() {
        let config = Config {
            data_dir: Some(PathBuf::from("state")),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_data_dir(Path::new("/home/user/gems")),
            PathBuf::from("/home/user/gems/state")
        );
    }

    #[test]
    fn load_or_default_missing_file_uses_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("gemflow.toml");

        let resolved = ResolvedConfig::load_or_default(&config_path)?;
        assert_eq!(resolved.data_dir, dir.path());
        assert_eq!(resolved.telegram_url, default_telegram_url());
        assert_eq!(resolved.api_base, default_api_base());
        assert!(resolved.tma_url.is_none());
        assert!(!resolved.headless);

        Ok(())
    }

    #[test]
    fn load_reads_overrides() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("gemflow.toml");
        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "data_dir = \"state\"")?;
        writeln!(file, "api_base = \"https://api.example.test\"")?;
        writeln!(file, "headless = true")?;

        let resolved = ResolvedConfig::load(&config_path)?;
        assert_eq!(resolved.data_dir, dir.path().canonicalize()?.join("state"));
        assert_eq!(resolved.api_base, "https://api.example.test");
        assert!(resolved.headless);

        Ok(())
    }
}
