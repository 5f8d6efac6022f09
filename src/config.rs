// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honored for local development.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default Gmail REST API base (v1).
pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Default Google user-info endpoint (used to resolve the account email of a token).
pub const DEFAULT_GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// Tuning for inbox scans.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Result cap passed as `maxResults` on every search query.
    pub max_results: u32,
    /// Number of metadata fetches per batch.
    pub batch_size: usize,
    /// Pause between batches (milliseconds) to stay under provider rate limits.
    pub batch_pause_ms: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_results: 50,
            batch_size: 10,
            batch_pause_ms: 200,
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Google OAuth client ID used by the browser token popup (public)
    pub google_client_id: String,
    /// Frontend URL for CORS and OAuth redirects
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Directory holding the persisted record store
    pub data_dir: PathBuf,
    /// Gmail API base URL (overridable for tests)
    pub gmail_api_base: String,
    /// Google user-info URL (overridable for tests)
    pub google_userinfo_url: String,
    /// Inbox scan tuning
    pub scan: ScanSettings,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for signing the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = ScanSettings::default();

        Ok(Self {
            google_client_id: required("GOOGLE_CLIENT_ID")?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: parse_or("PORT", 8080)?,
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            gmail_api_base: env::var("GMAIL_API_BASE")
                .unwrap_or_else(|_| DEFAULT_GMAIL_API_BASE.to_string()),
            google_userinfo_url: env::var("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|_| DEFAULT_GOOGLE_USERINFO_URL.to_string()),
            scan: ScanSettings {
                max_results: parse_or("SCAN_MAX_RESULTS", defaults.max_results)?,
                batch_size: parse_or("SCAN_BATCH_SIZE", defaults.batch_size)?.max(1),
                batch_pause_ms: parse_or("SCAN_BATCH_PAUSE_MS", defaults.batch_pause_ms)?,
            },

            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            oauth_state_key: required("OAUTH_STATE_KEY")?.into_bytes(),
        })
    }

    /// Config for tests: no pauses, local data dir, fixed keys.
    pub fn test_default() -> Self {
        Self {
            google_client_id: "test-client-id.apps.googleusercontent.com".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            data_dir: PathBuf::from("target/test-data"),
            gmail_api_base: DEFAULT_GMAIL_API_BASE.to_string(),
            google_userinfo_url: DEFAULT_GOOGLE_USERINFO_URL.to_string(),
            scan: ScanSettings {
                batch_pause_ms: 0,
                ..ScanSettings::default()
            },
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key".to_vec(),
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("GOOGLE_CLIENT_ID", "test_id");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("OAUTH_STATE_KEY", "  state_key  ");
        env::set_var("SCAN_BATCH_SIZE", "0");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.google_client_id, "test_id");
        assert_eq!(config.oauth_state_key, b"state_key".to_vec());
        assert_eq!(config.port, 8080);
        // Batch size is clamped so the scan loop always advances
        assert_eq!(config.scan.batch_size, 1);
        env::remove_var("SCAN_BATCH_SIZE");
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        env::set_var("SUBTRACK_TEST_PORT_GARBAGE", "eighty");
        let result: Result<u16, _> = parse_or("SUBTRACK_TEST_PORT_GARBAGE", 8080);
        assert!(matches!(result, Err(ConfigError::Invalid(_, _))));
    }
}
