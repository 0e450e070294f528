//! Configuration loading for the ads sync service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `ADS_SYNC_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, path::PathBuf};

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::CryptoKey;
use crate::facebook::{FacebookAppConfig, GraphApiConfig};

/// Prefix shared by every recognised environment variable.
pub const ENV_PREFIX: &str = "ADS_SYNC_";

/// Scopes requested when `FACEBOOK_APP_SCOPES` is unset or empty.
pub const DEFAULT_SCOPES: [&str; 4] = [
    "ads_read",
    "ads_management",
    "business_management",
    "read_insights",
];

/// Upper bound for how long an issued PKCE session stays valid.
pub const MAX_OAUTH_STATE_TTL_SECONDS: u64 = 600;

/// Application configuration derived from `ADS_SYNC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook_app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook_app_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook_redirect_uri: Option<String>,
    #[serde(default = "default_scopes")]
    pub facebook_app_scopes: Vec<String>,
    #[serde(default = "default_graph_version")]
    pub facebook_graph_version: String,
    #[serde(default = "default_graph_base")]
    pub facebook_graph_base: String,
    #[serde(default = "default_dialog_base")]
    pub facebook_dialog_base: String,
    #[serde(default = "default_oauth_state_ttl_seconds")]
    pub oauth_state_ttl_seconds: u64,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// Sync engine and API client tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncConfig {
    /// Hard cap on pages followed for one paginated fetch (default: 1000)
    #[serde(default = "default_sync_max_pages")]
    pub max_pages: usize,

    /// `limit` sent with every paginated read (default: 500)
    #[serde(default = "default_sync_page_size")]
    pub page_size: u32,

    /// Rows per INSERT statement inside one batch transaction (default: 200)
    #[serde(default = "default_sync_upsert_chunk_size")]
    pub upsert_chunk_size: usize,
}

impl SyncConfig {
    /// Validate sync configuration bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pages == 0 || self.max_pages > 100_000 {
            return Err(ConfigError::InvalidSyncMaxPages {
                value: self.max_pages,
            });
        }

        if self.page_size == 0 || self.page_size > 5_000 {
            return Err(ConfigError::InvalidSyncPageSize {
                value: self.page_size,
            });
        }

        if self.upsert_chunk_size == 0 || self.upsert_chunk_size > 1_000 {
            return Err(ConfigError::InvalidUpsertChunkSize {
                value: self.upsert_chunk_size,
            });
        }

        Ok(())
    }
}

/// Scheduled refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RefreshConfig {
    /// Background refresh interval in seconds (default: 3600)
    #[serde(default = "default_refresh_tick_seconds")]
    pub tick_seconds: u64,

    /// Trailing insight window pulled by scheduled refreshes (default: 7)
    #[serde(default = "default_refresh_lookback_days")]
    pub lookback_days: u32,

    /// Maximum number of users refreshed concurrently (default: 4)
    #[serde(default = "default_refresh_concurrency")]
    pub concurrency: u32,

    /// Jitter factor to avoid thundering herd (default: 0.1)
    #[serde(default = "default_refresh_jitter_factor")]
    pub jitter_factor: f64,
}

impl RefreshConfig {
    /// Validate refresh configuration bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_seconds < 60 {
            return Err(ConfigError::InvalidRefreshTickInterval {
                value: self.tick_seconds,
            });
        }

        if self.lookback_days == 0 || self.lookback_days > 90 {
            return Err(ConfigError::InvalidRefreshLookback {
                value: self.lookback_days,
            });
        }

        if self.concurrency == 0 || self.concurrency > 20 {
            return Err(ConfigError::InvalidRefreshConcurrency {
                value: self.concurrency,
            });
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidRefreshJitter {
                value: self.jitter_factor,
            });
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            crypto_key: None,
            facebook_app_id: None,
            facebook_app_secret: None,
            facebook_redirect_uri: None,
            facebook_app_scopes: default_scopes(),
            facebook_graph_version: default_graph_version(),
            facebook_graph_base: default_graph_base(),
            facebook_dialog_base: default_dialog_base(),
            oauth_state_ttl_seconds: default_oauth_state_ttl_seconds(),
            sync: SyncConfig::default(),
            refresh: RefreshConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_pages: default_sync_max_pages(),
            page_size: default_sync_page_size(),
            upsert_chunk_size: default_sync_upsert_chunk_size(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_refresh_tick_seconds(),
            lookback_days: default_refresh_lookback_days(),
            concurrency: default_refresh_concurrency(),
            jitter_factor: default_refresh_jitter_factor(),
        }
    }
}

impl AppConfig {
    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.crypto_key.is_some() {
            config.crypto_key = Some(b"[REDACTED]".to_vec());
        }
        if config.facebook_app_secret.is_some() {
            config.facebook_app_secret = Some("[REDACTED]".to_string());
        }
        if config.database_url.contains('@') {
            config.database_url = "[REDACTED]".to_string();
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.crypto_key {
            Some(ref key) if key.len() != 32 => {
                return Err(ConfigError::InvalidCryptoKeyLength { length: key.len() });
            }
            Some(_) => {}
            None => return Err(ConfigError::MissingCryptoKey),
        }

        // Local and test profiles may run without a registered app
        if !self.is_dev_profile() {
            if self.facebook_app_id.is_none() {
                return Err(ConfigError::MissingFacebookAppId);
            }
            if self.facebook_app_secret.is_none() {
                return Err(ConfigError::MissingFacebookAppSecret);
            }
            if self.facebook_redirect_uri.is_none() {
                return Err(ConfigError::MissingFacebookRedirectUri);
            }
        }

        if self.oauth_state_ttl_seconds == 0
            || self.oauth_state_ttl_seconds > MAX_OAUTH_STATE_TTL_SECONDS
        {
            return Err(ConfigError::InvalidOAuthStateTtl {
                value: self.oauth_state_ttl_seconds,
            });
        }

        for (field, value) in [
            ("FACEBOOK_GRAPH_BASE", &self.facebook_graph_base),
            ("FACEBOOK_DIALOG_BASE", &self.facebook_dialog_base),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::InvalidUrl {
                    field,
                    value: value.clone(),
                });
            }
        }

        self.sync.validate()?;
        self.refresh.validate()?;

        Ok(())
    }

    fn is_dev_profile(&self) -> bool {
        matches!(self.profile.as_str(), "local" | "test")
    }

    /// Build the credential cipher key.
    pub fn crypto_key(&self) -> Result<CryptoKey, ConfigError> {
        let bytes = self.crypto_key.clone().ok_or(ConfigError::MissingCryptoKey)?;
        let length = bytes.len();
        CryptoKey::new(bytes).map_err(|_| ConfigError::InvalidCryptoKeyLength { length })
    }

    /// Versioned Graph API base plus pagination limits.
    pub fn graph_api_config(&self) -> GraphApiConfig {
        GraphApiConfig {
            base_url: format!(
                "{}/{}",
                self.facebook_graph_base.trim_end_matches('/'),
                self.facebook_graph_version.trim_matches('/')
            ),
            page_size: self.sync.page_size,
            max_pages: self.sync.max_pages,
        }
    }

    /// App credentials for the OAuth legs and token introspection.
    pub fn facebook_app(&self) -> Result<FacebookAppConfig, ConfigError> {
        let app_id = self
            .facebook_app_id
            .clone()
            .ok_or(ConfigError::MissingFacebookAppId)?;
        let app_secret = self
            .facebook_app_secret
            .clone()
            .ok_or(ConfigError::MissingFacebookAppSecret)?;
        let redirect_uri = self
            .facebook_redirect_uri
            .clone()
            .ok_or(ConfigError::MissingFacebookRedirectUri)?;

        Ok(FacebookAppConfig {
            app_id,
            app_secret,
            redirect_uri,
            scopes: self.facebook_app_scopes.clone(),
            dialog_base: self.facebook_dialog_base.trim_end_matches('/').to_string(),
            state_ttl_seconds: self.oauth_state_ttl_seconds,
        })
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgresql://localhost:5432/ads_sync".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_graph_version() -> String {
    "v19.0".to_string()
}

fn default_graph_base() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_dialog_base() -> String {
    "https://www.facebook.com".to_string()
}

fn default_oauth_state_ttl_seconds() -> u64 {
    MAX_OAUTH_STATE_TTL_SECONDS
}

fn default_sync_max_pages() -> usize {
    1000
}

fn default_sync_page_size() -> u32 {
    500
}

fn default_sync_upsert_chunk_size() -> usize {
    200
}

fn default_refresh_tick_seconds() -> u64 {
    3600 // 1 hour
}

fn default_refresh_lookback_days() -> u32 {
    7
}

fn default_refresh_concurrency() -> u32 {
    4
}

fn default_refresh_jitter_factor() -> f64 {
    0.1 // 10% jitter
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("crypto key is missing; set ADS_SYNC_CRYPTO_KEY environment variable")]
    MissingCryptoKey,
    #[error("crypto key is invalid base64: {error}")]
    InvalidCryptoKeyBase64 { error: String },
    #[error("crypto key must decode to exactly 32 bytes, got {length} bytes")]
    InvalidCryptoKeyLength { length: usize },
    #[error("Facebook app id is missing; set ADS_SYNC_FACEBOOK_APP_ID")]
    MissingFacebookAppId,
    #[error("Facebook app secret is missing; set ADS_SYNC_FACEBOOK_APP_SECRET")]
    MissingFacebookAppSecret,
    #[error("Facebook redirect URI is missing; set ADS_SYNC_FACEBOOK_REDIRECT_URI")]
    MissingFacebookRedirectUri,
    #[error("{field} is not a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("OAuth state TTL must be between 1 and 600 seconds, got {value}")]
    InvalidOAuthStateTtl { value: u64 },
    #[error("sync max pages must be between 1 and 100000, got {value}")]
    InvalidSyncMaxPages { value: usize },
    #[error("sync page size must be between 1 and 5000, got {value}")]
    InvalidSyncPageSize { value: u32 },
    #[error("upsert chunk size must be between 1 and 1000, got {value}")]
    InvalidUpsertChunkSize { value: usize },
    #[error("refresh tick interval must be at least 60 seconds, got {value}")]
    InvalidRefreshTickInterval { value: u64 },
    #[error("refresh lookback must be between 1 and 90 days, got {value}")]
    InvalidRefreshLookback { value: u32 },
    #[error("refresh concurrency must be between 1 and 20, got {value}")]
    InvalidRefreshConcurrency { value: u32 },
    #[error("refresh jitter factor must be between 0.0 and 1.0, got {value}")]
    InvalidRefreshJitter { value: f64 },
}

/// Loads configuration using layered `.env` files and `ADS_SYNC_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates the layered configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_string(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let log_level = take_string(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format =
            take_string(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        let database_url =
            take_string(&mut layered, "DATABASE_URL").unwrap_or_else(default_database_url);
        let db_max_connections = take_parsed(&mut layered, "DB_MAX_CONNECTIONS")
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = take_parsed(&mut layered, "DB_ACQUIRE_TIMEOUT_MS")
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let crypto_key = match take_string(&mut layered, "CRYPTO_KEY") {
            Some(key_str) => Some(general_purpose::STANDARD.decode(key_str.trim()).map_err(
                |e| ConfigError::InvalidCryptoKeyBase64 {
                    error: e.to_string(),
                },
            )?),
            None => None,
        };

        let facebook_app_id = take_string(&mut layered, "FACEBOOK_APP_ID");
        let facebook_app_secret = take_string(&mut layered, "FACEBOOK_APP_SECRET");
        let facebook_redirect_uri = take_string(&mut layered, "FACEBOOK_REDIRECT_URI");
        let facebook_app_scopes = take_string(&mut layered, "FACEBOOK_APP_SCOPES")
            .map(|scopes| split_list(&scopes))
            .filter(|scopes| !scopes.is_empty())
            .unwrap_or_else(default_scopes);
        let facebook_graph_version = take_string(&mut layered, "FACEBOOK_GRAPH_VERSION")
            .unwrap_or_else(default_graph_version);
        let facebook_graph_base =
            take_string(&mut layered, "FACEBOOK_GRAPH_BASE").unwrap_or_else(default_graph_base);
        let facebook_dialog_base = take_string(&mut layered, "FACEBOOK_DIALOG_BASE")
            .unwrap_or_else(default_dialog_base);
        let oauth_state_ttl_seconds = take_parsed(&mut layered, "OAUTH_STATE_TTL_SECONDS")
            .unwrap_or_else(default_oauth_state_ttl_seconds);

        let sync = SyncConfig {
            max_pages: take_parsed(&mut layered, "SYNC_MAX_PAGES")
                .unwrap_or_else(default_sync_max_pages),
            page_size: take_parsed(&mut layered, "SYNC_PAGE_SIZE")
                .unwrap_or_else(default_sync_page_size),
            upsert_chunk_size: take_parsed(&mut layered, "SYNC_UPSERT_CHUNK_SIZE")
                .unwrap_or_else(default_sync_upsert_chunk_size),
        };

        let refresh = RefreshConfig {
            tick_seconds: take_parsed(&mut layered, "REFRESH_TICK_SECONDS")
                .unwrap_or_else(default_refresh_tick_seconds),
            lookback_days: take_parsed(&mut layered, "REFRESH_LOOKBACK_DAYS")
                .unwrap_or_else(default_refresh_lookback_days),
            concurrency: take_parsed(&mut layered, "REFRESH_CONCURRENCY")
                .unwrap_or_else(default_refresh_concurrency),
            jitter_factor: take_parsed(&mut layered, "REFRESH_JITTER_FACTOR")
                .unwrap_or_else(default_refresh_jitter_factor),
        };

        let config = AppConfig {
            profile,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            crypto_key,
            facebook_app_id,
            facebook_app_secret,
            facebook_redirect_uri,
            facebook_app_scopes,
            facebook_graph_version,
            facebook_graph_base,
            facebook_dialog_base,
            oauth_state_ttl_seconds,
            sync,
            refresh,
        };

        config.validate()?;

        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(values: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    values
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn take_parsed<T: std::str::FromStr>(values: &mut BTreeMap<String, String>, key: &str) -> Option<T> {
    take_string(values, key).and_then(|v| v.parse().ok())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
