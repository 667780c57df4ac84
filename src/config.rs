use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND: &str = "0.0.0.0:5005";
pub const DEFAULT_DATABASE: &str = "carnivorous_green_house.db";
pub const DEFAULT_TELEMETRY_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Optional on-disk configuration, loaded from TOML.
///
/// Every field is optional; anything left unset falls back to the CLI value
/// or the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<SocketAddr>,
    pub database: Option<PathBuf>,
    pub telemetry_interval_ms: Option<u64>,
    pub session_ttl_secs: Option<u64>,
}

impl FileConfig {
    /// Load config from a TOML file path. Returns None if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        check_config_permissions(path);

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        Ok(Some(config))
    }
}

/// Values supplied on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<SocketAddr>,
    pub database: Option<PathBuf>,
    pub telemetry_interval_ms: Option<u64>,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub database: PathBuf,
    pub telemetry_interval: Duration,
    pub session_ttl: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5005)),
            database: PathBuf::from(DEFAULT_DATABASE),
            telemetry_interval: Duration::from_millis(DEFAULT_TELEMETRY_INTERVAL_MS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }
}

impl AppConfig {
    /// Layer CLI flags over the file config over the defaults.
    pub fn resolve(file: Option<FileConfig>, cli: CliOverrides) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let interval_ms = cli
            .telemetry_interval_ms
            .or(file.telemetry_interval_ms)
            .unwrap_or(DEFAULT_TELEMETRY_INTERVAL_MS);
        if interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "telemetry interval must be greater than zero".into(),
            ));
        }

        if file.session_ttl_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "session ttl must be greater than zero".into(),
            ));
        }

        Ok(Self {
            bind: cli.bind.or(file.bind).unwrap_or(defaults.bind),
            database: cli.database.or(file.database).unwrap_or(defaults.database),
            telemetry_interval: Duration::from_millis(interval_ms),
            session_ttl: file
                .session_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
        })
    }
}

/// Errors that can occur when loading config.
#[derive(Debug)]
pub enum ConfigError {
    ReadFailed(PathBuf, std::io::Error),
    ParseFailed(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFailed(path, e) => {
                write!(f, "Failed to read config {}: {}", path.display(), e)
            }
            Self::ParseFailed(path, e) => {
                write!(f, "Failed to parse config {}: {}", path.display(), e)
            }
            Self::Invalid(detail) => write!(f, "Invalid config: {}", detail),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Warn if the config file is world-readable.
#[cfg(unix)]
pub fn check_config_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return,
    };

    let mode = metadata.permissions().mode();
    if is_world_readable(mode) {
        tracing::warn!(
            "Config file {} is world-readable (mode {:o}); consider restricting permissions to 600.",
            path.display(),
            mode & 0o7777,
        );
    }
}

#[cfg(not(unix))]
pub fn check_config_permissions(_path: &Path) {}

/// Returns true if the given file mode has the world-readable bit set.
pub fn is_world_readable(mode: u32) -> bool {
    mode & 0o004 != 0
}
