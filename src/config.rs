//! Configuration management for the Synergy Engine
//!
//! Strongly-typed configuration read from environment variables (optionally
//! seeded from a `.env` file), with defaults and validation.
//!
//! # Example
//! ```no_run
//! use synergy::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("Data dir: {}", config.data.data_dir.display());
//! ```

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Data file layout
    pub data: DataConfig,
    /// API server configuration
    pub api: ApiConfig,
    /// Marketplace (TonAPI) configuration
    pub marketplace: MarketplaceConfig,
    /// Match engine configuration
    pub matching: MatchConfig,
}

/// Locations of every file the engine reads or writes
#[derive(Debug, Clone)]
pub struct DataConfig {
    pub data_dir: PathBuf,
    pub attributes_file: PathBuf,
    pub synergy_map_file: PathBuf,
    pub exceptions_file: PathBuf,
    pub nft_data_file: PathBuf,
    pub user_state_file: PathBuf,
    pub user_files_dir: PathBuf,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Request timeout
    pub request_timeout: Duration,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Maximum number of results returned to the web UI per search
    pub result_limit: usize,
}

/// Marketplace checker configuration
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub pacing: Pacing,
}

/// Request pacing for the marketplace checker
#[derive(Debug, Clone, PartialEq)]
pub struct Pacing {
    /// Pause after this many requests
    pub requests_before_pause: usize,
    /// Length of that pause
    pub pause_duration: Duration,
    /// Delay between any two other requests
    pub delay_between_requests: Duration,
    /// Retries on HTTP 429
    pub max_retries: u32,
    /// Base wait before a retry, multiplied by the attempt number
    pub retry_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            requests_before_pause: 5,
            pause_duration: Duration::from_millis(3000),
            delay_between_requests: Duration::from_millis(100),
            max_retries: 2,
            retry_delay: Duration::from_millis(2000),
        }
    }
}

impl Pacing {
    /// No waiting at all; used by tests and local tooling.
    pub fn immediate() -> Self {
        Self {
            requests_before_pause: 5,
            pause_duration: Duration::ZERO,
            delay_between_requests: Duration::ZERO,
            max_retries: 2,
            retry_delay: Duration::ZERO,
        }
    }
}

/// Match engine configuration
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Warn when a single match run takes longer than this
    pub slow_match_warn: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Try to load .env file (ignore if not found)
        dotenvy::dotenv().ok();

        let config = Self {
            data: DataConfig::from_env(),
            api: ApiConfig::from_env(),
            marketplace: MarketplaceConfig::from_env(),
            matching: MatchConfig::from_env(),
        };

        config.validate()?;
        config.log_summary();

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api.port == 0 {
            return Err(Error::InvalidConfig {
                key: "API_PORT",
                message: "port must be non-zero".into(),
            });
        }

        if self.marketplace.pacing.requests_before_pause == 0 {
            return Err(Error::InvalidConfig {
                key: "MARKET_REQUESTS_BEFORE_PAUSE",
                message: "must be at least 1".into(),
            });
        }

        let url = &self.marketplace.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::InvalidConfig {
                key: "TONAPI_BASE_URL",
                message: format!("Invalid URL: {}", url).into(),
            });
        }

        Ok(())
    }

    /// Log configuration summary (without sensitive data)
    fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  Data:");
        info!("    Directory: {}", self.data.data_dir.display());
        info!("    Synergy map: {}", self.data.synergy_map_file.display());
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
        info!("  Marketplace:");
        info!("    Base URL: {}", self.marketplace.base_url);
        info!(
            "    API key: {}",
            if self.marketplace.api_key.is_some() {
                "set"
            } else {
                "not set"
            }
        );
        info!(
            "    Pause: {:?} after every {} requests",
            self.marketplace.pacing.pause_duration, self.marketplace.pacing.requests_before_pause
        );
    }
}

impl DataConfig {
    fn from_env() -> Self {
        let data_dir = PathBuf::from(get_env_or("DATA_DIR", "nft_data"));
        Self::with_files(
            data_dir,
            &get_env_or("ATTRIBUTES_FILE", "attributes_power_data.json"),
            &get_env_or("SYNERGY_MAP_FILE", "synergy_state.json"),
            &get_env_or("SYNERGY_EXCEPTIONS_FILE", "synergy_exceptions.json"),
            &get_env_or("NFT_DATA_FILE", "all_nft_info.json"),
            &get_env_or("USER_STATE_FILE", "synergy_user_state.json"),
            &get_env_or("USER_FILES_DIR", "user_files"),
        )
    }

    /// Default file names rooted at `data_dir`
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::with_files(
            data_dir.as_ref().to_path_buf(),
            "attributes_power_data.json",
            "synergy_state.json",
            "synergy_exceptions.json",
            "all_nft_info.json",
            "synergy_user_state.json",
            "user_files",
        )
    }

    fn with_files(
        data_dir: PathBuf,
        attributes: &str,
        synergy_map: &str,
        exceptions: &str,
        nft_data: &str,
        user_state: &str,
        user_files: &str,
    ) -> Self {
        Self {
            attributes_file: data_dir.join(attributes),
            synergy_map_file: data_dir.join(synergy_map),
            exceptions_file: data_dir.join(exceptions),
            nft_data_file: data_dir.join(nft_data),
            user_state_file: data_dir.join(user_state),
            user_files_dir: data_dir.join(user_files),
            data_dir,
        }
    }
}

impl ApiConfig {
    fn from_env() -> Self {
        Self {
            port: get_env_or("API_PORT", "3000").parse().unwrap_or(3000),
            host: get_env_or("API_HOST", "0.0.0.0"),
            request_timeout: Duration::from_secs(
                get_env_or("API_REQUEST_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            cors_enabled: get_env_or("API_CORS_ENABLED", "true")
                .parse()
                .unwrap_or(true),
            result_limit: get_env_or("WEB_RESULT_LIMIT", "100")
                .parse()
                .unwrap_or(100),
        }
    }
}

impl MarketplaceConfig {
    fn from_env() -> Self {
        let defaults = Pacing::default();
        Self {
            base_url: get_env_or("TONAPI_BASE_URL", "https://tonapi.io"),
            api_key: std::env::var("TONAPI_KEY").ok().filter(|k| !k.is_empty()),
            request_timeout: Duration::from_millis(
                get_env_or("MARKET_REQUEST_TIMEOUT_MS", "15000")
                    .parse()
                    .unwrap_or(15000),
            ),
            pacing: Pacing {
                requests_before_pause: get_env_or("MARKET_REQUESTS_BEFORE_PAUSE", "5")
                    .parse()
                    .unwrap_or(defaults.requests_before_pause),
                pause_duration: get_env_duration_ms("MARKET_PAUSE_MS", defaults.pause_duration),
                delay_between_requests: get_env_duration_ms(
                    "MARKET_DELAY_MS",
                    defaults.delay_between_requests,
                ),
                max_retries: get_env_or("MARKET_MAX_RETRIES", "2")
                    .parse()
                    .unwrap_or(defaults.max_retries),
                retry_delay: get_env_duration_ms("MARKET_RETRY_DELAY_MS", defaults.retry_delay),
            },
        }
    }
}

impl MatchConfig {
    fn from_env() -> Self {
        Self {
            slow_match_warn: get_env_duration_ms("SLOW_MATCH_WARN_MS", Duration::from_secs(1)),
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a millisecond duration, falling back on absent or unparsable values
fn get_env_duration_ms(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
