use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "whisperwall.toml",
    "config/whisperwall.toml",
    "crates/config/whisperwall.toml",
    "../whisperwall.toml",
    "../config/whisperwall.toml",
    "backend/whisperwall.toml",
    "backend/config/whisperwall.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://whisperwall.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_session_ttl")]
    pub session_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: Self::default_session_ttl(),
        }
    }
}

impl AuthConfig {
    /// Anonymous sessions live for thirty days.
    fn default_session_ttl() -> u64 {
        30 * 86_400
    }
}

/// Where uploaded media lands and how large a single file may be.
///
/// ```
/// use whisperwall_config::StorageConfig;
///
/// let storage = StorageConfig::default();
/// assert_eq!(storage.upload_dir, "uploads");
/// assert_eq!(storage.public_path, "/uploads");
/// assert_eq!(storage.max_upload_bytes, 25 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "StorageConfig::default_public_path")]
    pub public_path: String,
    #[serde(default = "StorageConfig::default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl StorageConfig {
    fn default_upload_dir() -> String {
        "uploads".to_string()
    }

    fn default_public_path() -> String {
        "/uploads".to_string()
    }

    const fn default_max_upload_bytes() -> u64 {
        25 * 1024 * 1024
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: Self::default_upload_dir(),
            public_path: Self::default_public_path(),
            max_upload_bytes: Self::default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "FeedConfig::default_nearby_radius_km")]
    pub default_nearby_radius_km: f64,
    #[serde(default = "FeedConfig::default_max_nearby_radius_km")]
    pub max_nearby_radius_km: f64,
    /// Seconds between sweeps that delete vanished posts. Zero disables the sweeper.
    #[serde(default = "FeedConfig::default_purge_interval")]
    pub purge_interval_seconds: u64,
}

impl FeedConfig {
    const fn default_nearby_radius_km() -> f64 {
        50.0
    }

    const fn default_max_nearby_radius_km() -> f64 {
        500.0
    }

    const fn default_purge_interval() -> u64 {
        300
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_nearby_radius_km: Self::default_nearby_radius_km(),
            max_nearby_radius_km: Self::default_max_nearby_radius_km(),
            purge_interval_seconds: Self::default_purge_interval(),
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use whisperwall_config::load;
///
/// std::env::remove_var("WHISPERWALL_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let db_max = i64::from(defaults.database.max_connections);
    let session_ttl = i64::try_from(defaults.auth.session_ttl_seconds).unwrap_or(i64::MAX);
    let max_upload = i64::try_from(defaults.storage.max_upload_bytes).unwrap_or(i64::MAX);
    let purge_interval = i64::try_from(defaults.feed.purge_interval_seconds).unwrap_or(i64::MAX);

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default("database.max_connections", db_max)?
        .set_default("auth.session_ttl_seconds", session_ttl)?
        .set_default("storage.upload_dir", defaults.storage.upload_dir.clone())?
        .set_default("storage.public_path", defaults.storage.public_path.clone())?
        .set_default("storage.max_upload_bytes", max_upload)?
        .set_default(
            "feed.default_nearby_radius_km",
            defaults.feed.default_nearby_radius_km,
        )?
        .set_default(
            "feed.max_nearby_radius_km",
            defaults.feed.max_nearby_radius_km,
        )?
        .set_default("feed.purge_interval_seconds", purge_interval)?;

    let environment_overrides =
        config::Environment::with_prefix("WHISPERWALL").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("WHISPERWALL_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via WHISPERWALL_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    if config.feed.default_nearby_radius_km > config.feed.max_nearby_radius_km {
        config.feed.default_nearby_radius_km = config.feed.max_nearby_radius_km;
    }

    debug!(?config, "loaded backend configuration");
    Ok(config)
}
