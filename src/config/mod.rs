//! Configuration module for the school registry backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default token lifetime in seconds.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Longest accepted token lifetime (30 days).
pub const MAX_TOKEN_TTL_SECS: i64 = 30 * 24 * 3600;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// HMAC secret used to sign bearer tokens
    pub jwt_secret: String,
    /// Whether `jwt_secret` was generated for this process only
    pub jwt_secret_generated: bool,
    /// Bearer token lifetime in seconds
    pub token_ttl_secs: i64,
    /// Pre-shared key required to sign up an admin account
    pub admin_psk: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = env::var("SCHOOL_DB_PATH")
            .unwrap_or_else(|_| "./data/school.sqlite".to_string())
            .into();

        let bind_addr = env::var("SCHOOL_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid SCHOOL_BIND_ADDR format");

        let log_level = env::var("SCHOOL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let (jwt_secret, jwt_secret_generated) = match env::var("SCHOOL_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => (secret, false),
            _ => (random_secret(), true),
        };

        let token_ttl_secs = token_ttl(env::var("SCHOOL_TOKEN_TTL_SECS").ok().as_deref());

        let admin_psk = env::var("SCHOOL_ADMIN_PSK").ok().filter(|k| !k.is_empty());

        Self {
            db_path,
            bind_addr,
            log_level,
            jwt_secret,
            jwt_secret_generated,
            token_ttl_secs,
            admin_psk,
        }
    }
}

/// Parse a token lifetime, falling back to the default when unset or not positive
/// and clamping to `MAX_TOKEN_TTL_SECS`.
fn token_ttl(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|ttl| *ttl > 0)
        .map(|ttl| ttl.min(MAX_TOKEN_TTL_SECS))
        .unwrap_or(DEFAULT_TOKEN_TTL_SECS)
}

/// Process-local signing secret; tokens do not survive a restart.
fn random_secret() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}
