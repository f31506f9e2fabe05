//! Application configuration
//!
//! Three layers, later ones winning:
//!
//! 1. Built-in defaults
//! 2. `config.toml` (`~/.config/larder/config.toml`, or `LARDER_CONFIG`, or
//!    the path given with `--config`)
//! 3. `LARDER_DATA_DIR`, `LARDER_API_URL` and `LARDER_REQUEST_TIMEOUT`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "LARDER";

/// Where the inventory service listens when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Per-request timeout for remote calls
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Holds the SQLite database and, unless `log_file` says otherwise, the log
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the remote inventory service, without a trailing `/`
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_url: default_api_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            log_file: None,
        }
    }
}

impl Config {
    /// Load from the default config file
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from `path` when given, otherwise from the default config file
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load from `path`, falling back to defaults when it does not exist
    ///
    /// Creates the data directory.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let base = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("Invalid TOML in {}", path.display()))?
        } else {
            Self::default()
        };

        let config = base.finish();
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Cannot create data directory {}", config.data_dir.display())
        })?;
        Ok(config)
    }

    /// Parse TOML text and apply environment overrides, touching no files
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let base: Config = toml::from_str(toml_content).context("Invalid config TOML")?;
        Ok(base.finish())
    }

    fn finish(mut self) -> Self {
        self.apply_env_overrides();
        self.normalize();
        self
    }

    fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_var("DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        // An empty URL means "back to the default"
        if let Some(url) = env_var("API_URL") {
            self.api_url = if url.is_empty() { default_api_url() } else { url };
        }

        // Garbage is ignored rather than fatal
        if let Some(secs) = env_var("REQUEST_TIMEOUT").and_then(|v| v.trim().parse::<u64>().ok()) {
            self.request_timeout_secs = secs;
        }
    }

    fn normalize(&mut self) {
        let trimmed_len = self.api_url.trim_end_matches('/').len();
        self.api_url.truncate(trimmed_len);
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }
    }

    /// Write to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Write as TOML to `config_path`, creating parent directories
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
        }

        let text = toml::to_string_pretty(self).context("Cannot serialize config")?;
        std::fs::write(config_path, text)
            .with_context(|| format!("Cannot write {}", config_path.display()))
    }

    /// `LARDER_CONFIG`, or `config.toml` in the platform config dir
    pub fn config_file_path() -> PathBuf {
        match env_var("CONFIG") {
            Some(path) => PathBuf::from(path),
            None => platform_dir(dirs::config_dir()).join("config.toml"),
        }
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("larder.db")
    }

    /// `log_file` if set, else `larder.log` in the data directory
    pub fn log_path(&self) -> PathBuf {
        match &self.log_file {
            Some(path) => path.clone(),
            None => self.data_dir.join("larder.log"),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, suffix)).ok()
}

/// `<base>/larder`, or `./larder` when the platform has no such directory
fn platform_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join("larder")
}

fn default_data_dir() -> PathBuf {
    platform_dir(dirs::data_local_dir())
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::TempDir;

    // Tests that read or write LARDER_* variables run one at a time
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_VARS: &[&str] = &["LARDER_DATA_DIR", "LARDER_API_URL", "LARDER_REQUEST_TIMEOUT"];

    /// Clears the LARDER_* variables and puts them back on drop
    struct ScopedEnv {
        _lock: MutexGuard<'static, ()>,
        previous: Vec<(&'static str, Option<String>)>,
    }

    impl ScopedEnv {
        fn clean() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let previous = ENV_VARS.iter().map(|&name| (name, env::var(name).ok())).collect();
            for name in ENV_VARS {
                env::remove_var(name);
            }
            Self {
                _lock: lock,
                previous,
            }
        }
    }

    impl Drop for ScopedEnv {
        fn drop(&mut self) {
            for (name, value) in &self.previous {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.log_file.is_none());
        assert!(config.data_dir.ends_with("larder"));
    }

    #[test]
    fn test_derived_paths() {
        let mut config = Config::default();
        assert!(config.sqlite_path().ends_with("larder.db"));
        assert!(config.log_path().ends_with("larder.log"));

        config.log_file = Some(PathBuf::from("/var/log/larder-debug.log"));
        assert_eq!(config.log_path(), PathBuf::from("/var/log/larder-debug.log"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _env = ScopedEnv::clean();

        let mut config = Config::default();
        env::set_var("LARDER_DATA_DIR", "/tmp/larder-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/larder-test"));
    }

    #[test]
    fn test_env_override_api_url() {
        let _env = ScopedEnv::clean();

        let mut config = Config::default();
        env::set_var("LARDER_API_URL", "https://api.example.com");
        config.apply_env_overrides();
        assert_eq!(config.api_url, "https://api.example.com");

        env::set_var("LARDER_API_URL", "");
        config.apply_env_overrides();
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_env_override_timeout() {
        let _env = ScopedEnv::clean();

        let mut config = Config::default();
        env::set_var("LARDER_REQUEST_TIMEOUT", "5");
        config.apply_env_overrides();
        assert_eq!(config.request_timeout_secs, 5);

        env::set_var("LARDER_REQUEST_TIMEOUT", "soon");
        config.apply_env_overrides();
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn test_load_from_str_normalizes() {
        let _env = ScopedEnv::clean();

        let toml = r#"
            data_dir = "/custom/data"
            api_url = "http://inventory.local:5000//"
            request_timeout_secs = 0
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.api_url, "http://inventory.local:5000");
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_env_beats_file() {
        let _env = ScopedEnv::clean();
        env::set_var("LARDER_API_URL", "http://from-env:9000");

        let config = Config::load_from_str(r#"api_url = "http://from-file:5000""#).unwrap();
        assert_eq!(config.api_url, "http://from-env:9000");
    }

    #[test]
    fn test_save_and_reload() {
        let _env = ScopedEnv::clean();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            data_dir: temp_dir.path().join("data"),
            api_url: "http://sync.example.com".to_string(),
            request_timeout_secs: 12,
            log_file: Some(temp_dir.path().join("debug.log")),
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.data_dir, config.data_dir);
        assert_eq!(loaded.api_url, config.api_url);
        assert_eq!(loaded.request_timeout_secs, 12);
        assert_eq!(loaded.log_file, config.log_file);
        assert!(loaded.data_dir.exists());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let _env = ScopedEnv::clean();
        let temp_dir = TempDir::new().unwrap();
        env::set_var("LARDER_DATA_DIR", temp_dir.path().join("data"));

        let config = Config::load_from_path(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.data_dir, temp_dir.path().join("data"));
        assert!(config.data_dir.exists());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let _env = ScopedEnv::clean();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "api_url = [").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid TOML"));
    }
}
