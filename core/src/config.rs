//! Configuration
//!
//! Settings are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file: the explicit path, else `TEMPO_CONFIG_PATH`, else
//!    `tempo.toml` in the working directory when present
//! 3. Environment variables `TEMPO_<SECTION>__<KEY>` (a `.env` file is
//!    loaded first)
//! 4. Builder overrides (e.g. the CLI `--safe` flag)
//!
//! ```toml
//! [interpreter]
//! safe = false
//!
//! [scopes]
//! lock_timeout_ms = 5000
//!
//! [namespaces]
//! rename_in_use_ok = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "TEMPO";
pub const CONFIG_PATH_ENV: &str = "TEMPO_CONFIG_PATH";
pub const DEFAULT_CONFIG_FILE: &str = "tempo.toml";

/* ===================== Settings ===================== */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub interpreter: InterpreterSettings,
    pub scopes: ScopeSettings,
    pub namespaces: NamespaceSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterSettings {
    /// Restricted mode: unsafe options are rejected and timings are coarse
    pub safe: bool,
    /// Refuse to create new scopes
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeSettings {
    pub enabled: bool,
    /// Default wait for `scope lock` and `scope eval -lock`; negative waits forever
    pub lock_timeout_ms: i64,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_timeout_ms: -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceSettings {
    pub enabled: bool,
    pub rename_global_ok: bool,
    pub rename_in_use_ok: bool,
    /// Deleting a namespace that a live frame overlays defers the reclaim
    /// instead of failing
    pub delete_in_use_ok: bool,
}

impl Default for NamespaceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rename_global_ok: false,
            rename_in_use_ok: false,
            delete_in_use_ok: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` overrides it
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

/* ===================== Loading ===================== */

impl Config {
    /// Load using the default search path and the environment
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Render the effective settings as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration as TOML")
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    use_env: Option<bool>,
    safe: Option<bool>,
    read_only: Option<bool>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Skip `.env` and `TEMPO_*` variables (on by default)
    pub fn use_env(mut self, use_env: bool) -> Self {
        self.use_env = Some(use_env);
        self
    }

    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = Some(safe);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    pub fn build(self) -> Result<Config> {
        let use_env = self.use_env.unwrap_or(true);
        if use_env {
            let _ = dotenvy::dotenv();
        }

        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&Config::default()).context("Failed to seed default configuration")?,
        );

        // An explicit path must exist; the implicit default file is optional
        let explicit = self
            .config_path
            .clone()
            .or_else(|| use_env.then(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from)).flatten());
        match explicit {
            Some(path) => {
                builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            }
            None => {
                builder = builder.add_source(
                    File::with_name(DEFAULT_CONFIG_FILE)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        if use_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let mut config: Config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if let Some(safe) = self.safe {
            config.interpreter.safe = safe;
        }
        if let Some(read_only) = self.read_only {
            config.interpreter.read_only = read_only;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.scopes.enabled);
        assert_eq!(config.scopes.lock_timeout_ms, -1);
        assert!(!config.namespaces.rename_global_ok);
        assert!(config.namespaces.delete_in_use_ok);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[scopes]\nlock_timeout_ms = 250\n\n[namespaces]\nrename_in_use_ok = true"
        )
        .unwrap();

        let config = Config::builder()
            .config_path(file.path())
            .use_env(false)
            .build()
            .unwrap();

        assert_eq!(config.scopes.lock_timeout_ms, 250);
        assert!(config.scopes.enabled);
        assert!(config.namespaces.rename_in_use_ok);
        assert!(!config.namespaces.rename_global_ok);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::builder()
            .config_path(dir.path().join("absent.toml"))
            .use_env(false)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_overrides_win() {
        let config = Config::builder().use_env(false).safe(true).build().unwrap();
        assert!(config.interpreter.safe);
    }

    #[test]
    fn test_to_toml_round_trips_sections() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[scopes]"));
        assert!(rendered.contains("lock_timeout_ms = -1"));
    }
}
