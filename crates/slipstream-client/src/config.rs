// Configuration loading and parsing (client.toml, credentials.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::draft::constraints::{Price, RosterLimits};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub league: LeagueSelection,
    pub draft: DraftSettings,
    pub notifications: NotificationSettings,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// client.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire client.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ClientFile {
    backend: BackendConfig,
    league: LeagueSelection,
    draft: DraftSettings,
    notifications: NotificationSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// REST base URL of the backend of record.
    pub base_url: String,
    /// WebSocket URL of the realtime notification stream.
    pub channel_url: String,
}

/// Which league/race/team this client is operating as.
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueSelection {
    pub league_id: String,
    pub race_id: String,
    pub team_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftSettings {
    /// Draft state polling cadence while the draft is in progress.
    pub poll_interval_secs: u64,
    /// Per-pick countdown length, mirrored from the league settings.
    pub pick_timer_secs: u64,
    /// How many drivers each team drafts (the number of rounds).
    pub picks_per_team: u32,
    pub max_drivers: u32,
    pub max_per_constructor: u32,
    /// Per-team budget in tenths of a currency unit.
    pub budget_tenths: u32,
}

impl DraftSettings {
    pub fn roster_limits(&self) -> RosterLimits {
        RosterLimits {
            max_drivers: self.max_drivers,
            max_per_constructor: self.max_per_constructor,
            budget: Price::from_tenths(self.budget_tenths),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    /// How long a toast stays on screen before it starts exiting.
    pub toast_duration_secs: u64,
}

impl NotificationSettings {
    pub fn toast_duration(&self) -> Duration {
        Duration::from_secs(self.toast_duration_secs)
    }
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub session_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load configuration from `client.toml` and (optionally) `credentials.toml`
/// inside the given directory.
pub fn load_from_dir(config_dir: &Path) -> Result<Config, ConfigError> {
    // --- client.toml (required) ---
    let client_path = config_dir.join("client.toml");
    let client_text = read_file(&client_path)?;
    let client_file: ClientFile =
        toml::from_str(&client_text).map_err(|e| ConfigError::ParseError {
            path: client_path.clone(),
            source: e,
        })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        backend: client_file.backend,
        league: client_file.league,
        draft: client_file.draft,
        notifications: client_file.notifications,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure config files exist under `base_dir/config` by copying missing ones
/// from `base_dir/defaults`. Returns the files that were copied. Skips
/// `.example` templates.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }

        let target = config_dir.join(file_name);
        if target.exists() {
            continue;
        }
        std::fs::copy(&path, &target).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to copy {} to {}: {e}", path.display(), target.display()),
        })?;
        copied.push(target);
    }

    Ok(copied)
}

/// Convenience wrapper: load from `./config`, falling back to the per-user
/// config directory. The working-directory location is initialized from
/// `./defaults` when present.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    let local_dir = cwd.join("config");
    if local_dir.join("client.toml").exists() {
        return load_from_dir(&local_dir);
    }

    if let Some(user_dir) = user_config_dir() {
        if user_dir.join("client.toml").exists() {
            return load_from_dir(&user_dir);
        }
    }

    ensure_config_files(&cwd)?;
    load_from_dir(&local_dir)
}

/// The per-user config directory for this application, if resolvable.
pub fn user_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "slipstream")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.backend.base_url.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "backend.base_url".into(),
            message: "must not be empty".into(),
        });
    }
    if config.backend.channel_url.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "backend.channel_url".into(),
            message: "must not be empty".into(),
        });
    }

    if config.draft.poll_interval_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.poll_interval_secs".into(),
            message: "must be greater than 0".into(),
        });
    }
    if config.draft.pick_timer_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.pick_timer_secs".into(),
            message: "must be greater than 0".into(),
        });
    }
    if config.draft.picks_per_team == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.picks_per_team".into(),
            message: "must be greater than 0".into(),
        });
    }
    if config.draft.picks_per_team > config.draft.max_drivers {
        return Err(ConfigError::ValidationError {
            field: "draft.picks_per_team".into(),
            message: format!(
                "cannot exceed max_drivers ({} > {})",
                config.draft.picks_per_team, config.draft.max_drivers
            ),
        });
    }
    if config.draft.max_per_constructor == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.max_per_constructor".into(),
            message: "must be greater than 0".into(),
        });
    }
    if config.draft.budget_tenths == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.budget_tenths".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.notifications.toast_duration_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "notifications.toast_duration_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}
