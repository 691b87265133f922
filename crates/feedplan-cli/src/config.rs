//! Configuration file management for feedplan.
//!
//! Provides a TOML-based config file at `~/.config/feedplan/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use feedplan_core::config::{PlannerConfig, ProviderConfig, ProviderKind};
use feedplan_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub provider: ProviderConfig,
    pub planner: PlannerConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: DbConfig::DEFAULT_URL.to_owned(),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the feedplan config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/feedplan` or `~/.config/feedplan`,
/// also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("feedplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("feedplan")
}

/// Return the path to the feedplan config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file at `path`.
pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix; the file may hold an API key.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub database_url: Option<String>,
    pub provider: Option<ProviderKind>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct FeedplanConfig {
    pub db_config: DbConfig,
    pub provider: ProviderConfig,
    pub planner: PlannerConfig,
}

impl FeedplanConfig {
    /// Resolve against the process environment and the default config file
    /// (a missing file counts as empty; a malformed one is an error).
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let path = config_path();
        let file = if path.exists() {
            Some(load_config_from(&path)?)
        } else {
            None
        };
        Self::resolve_with(cli, file, |name| std::env::var(name).ok())
    }

    /// Resolve using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `--database-url` > `FEEDPLAN_DATABASE_URL` > `[database].url` > `DbConfig::DEFAULT_URL`
    /// - Provider: `--provider` > `FEEDPLAN_PROVIDER` > `[provider].kind` > static
    /// - API key: `ANTHROPIC_API_KEY` > `[provider].api_key`
    /// - Ollama URL: `OLLAMA_URL` > `[provider].base_url`, ollama only
    pub fn resolve_with(
        cli: &CliOverrides,
        file: Option<ConfigFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file = file.unwrap_or_default();

        let db_url = cli
            .database_url
            .clone()
            .or_else(|| env("FEEDPLAN_DATABASE_URL"))
            .unwrap_or(file.database.url);
        let db_config = DbConfig::new(db_url);

        let mut provider = file.provider;
        if let Some(kind) = cli.provider {
            provider.kind = kind;
        } else if let Some(kind) = env("FEEDPLAN_PROVIDER") {
            provider.kind = kind
                .parse()
                .context("FEEDPLAN_PROVIDER env var is not a valid provider")?;
        }
        if let Some(key) = env("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty()) {
            provider.api_key = Some(key);
        }
        if provider.kind == ProviderKind::Ollama {
            if let Some(url) = env("OLLAMA_URL") {
                provider.base_url = Some(url);
            }
        }

        Ok(Self {
            db_config,
            provider,
            planner: file.planner,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
