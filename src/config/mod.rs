//! Configuration module for the photoshare backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use rand::distr::{Alphanumeric, SampleString};

/// Credentials for the Cloudinary media host.
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Directory used by the local media store
    pub media_path: PathBuf,
    /// Externally reachable base URL, used to build local media URLs
    pub public_url: String,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// HMAC secret for signing JWTs
    pub jwt_secret: String,
    /// Set when no secret was configured and one was generated for this process
    pub ephemeral_jwt_secret: bool,
    /// Access token lifetime in minutes
    pub access_token_minutes: i64,
    /// Refresh token lifetime in days
    pub refresh_token_days: i64,
    /// bcrypt work factor
    pub bcrypt_cost: u32,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// Cloudinary credentials; `None` selects the local media store
    pub cloudinary: Option<CloudinaryConfig>,
}

/// Error raised when an environment variable holds an unparsable value.
#[derive(Debug)]
pub struct ConfigError {
    pub var: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.var, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("PHOTOSHARE_DB_PATH")
            .unwrap_or_else(|_| "./data/photoshare.sqlite".to_string())
            .into();

        let index_path = env::var("PHOTOSHARE_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let media_path = env::var("PHOTOSHARE_MEDIA_PATH")
            .unwrap_or_else(|_| "./data/media".to_string())
            .into();

        let bind_addr: SocketAddr = parse_var("PHOTOSHARE_BIND_ADDR", "127.0.0.1:8080")?;

        let public_url = env::var("PHOTOSHARE_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}", bind_addr))
            .trim_end_matches('/')
            .to_string();

        let log_level = env::var("PHOTOSHARE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let (jwt_secret, ephemeral_jwt_secret) = match env::var("PHOTOSHARE_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => (secret, false),
            _ => (random_secret(), true),
        };

        let access_token_minutes = parse_var("PHOTOSHARE_ACCESS_TOKEN_MINUTES", "15")?;
        let refresh_token_days = parse_var("PHOTOSHARE_REFRESH_TOKEN_DAYS", "7")?;
        let bcrypt_cost: u32 = parse_var("PHOTOSHARE_BCRYPT_COST", "12")?;
        let max_upload_bytes = parse_var("PHOTOSHARE_MAX_UPLOAD_BYTES", "10485760")?;

        let cloudinary = match (
            env::var("CLOUDINARY_CLOUD_NAME"),
            env::var("CLOUDINARY_API_KEY"),
            env::var("CLOUDINARY_API_SECRET"),
        ) {
            (Ok(cloud_name), Ok(api_key), Ok(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        Ok(Self {
            db_path,
            index_path,
            media_path,
            public_url,
            bind_addr,
            log_level,
            jwt_secret,
            ephemeral_jwt_secret,
            access_token_minutes,
            refresh_token_days,
            bcrypt_cost: clamp_bcrypt_cost(bcrypt_cost),
            max_upload_bytes,
            cloudinary,
        })
    }

    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.access_token_minutes)
    }

    pub fn refresh_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_token_days)
    }
}

fn parse_var<T>(var: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    let raw = env::var(var).unwrap_or_else(|_| default.to_string());
    raw.trim().parse().map_err(|e: T::Err| ConfigError {
        var,
        message: format!("{:?}: {}", raw, e),
    })
}

fn clamp_bcrypt_cost(cost: u32) -> u32 {
    cost.clamp(4, 31)
}

fn random_secret() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 64)
}
