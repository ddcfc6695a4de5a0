//! Service configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Parsing goes through a lookup
//! function so it can be exercised without touching the process
//! environment.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Configuration error raised at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but its value cannot be used.
    #[error("invalid value for {key}: {message}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}', expected 'text' or 'json'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

/// Top-level service configuration.
///
/// Loaded once at startup via [`ServiceConfig::from_env`].
#[derive(Clone)]
pub struct ServiceConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8080`).
    pub listen_addr: SocketAddr,

    /// PostgreSQL connection string.
    pub database_url: String,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Minimum idle connections in the pool.
    pub database_min_connections: u32,

    /// Timeout for acquiring a database connection.
    pub database_connect_timeout: Duration,

    /// Create missing tables at startup before the schema check.
    pub create_tables: bool,

    /// Period of the expired-membership sweep.
    pub tidy_interval: Duration,

    /// Whether membership changes are written to the audit log.
    pub audit_log_enabled: bool,

    /// Per-request timeout applied by the HTTP layer.
    pub request_timeout: Duration,

    /// Log output format.
    pub log_format: LogFormat,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("listen_addr", &self.listen_addr)
            .field("database_url", &redact_url(&self.database_url))
            .field("database_max_connections", &self.database_max_connections)
            .field("database_min_connections", &self.database_min_connections)
            .field("database_connect_timeout", &self.database_connect_timeout)
            .field("create_tables", &self.create_tables)
            .field("tidy_interval", &self.tidy_interval)
            .field("audit_log_enabled", &self.audit_log_enabled)
            .field("request_timeout", &self.request_timeout)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl ServiceConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` first to optionally load a `.env`
    /// file.
    ///
    /// # Errors
    ///
    /// See [`ServiceConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Numeric and boolean settings fall back to their defaults when unset
    /// or unparsable. `DATABASE_URL` wins over the individual `DB_*`
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `LISTEN_ADDR` or `LOG_FORMAT`
    /// cannot be parsed, or if `TIDY_INTERVAL_SECS` or
    /// `REQUEST_TIMEOUT_SECS` is zero.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "LISTEN_ADDR",
                message: e.to_string(),
            })?;

        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| {
            let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
            format!(
                "postgres://{}:{}@{}:{}/{}?sslmode=disable",
                var("DB_USER", "postgres"),
                var("DB_PASSWORD", "postgres"),
                var("DB_HOST", "localhost"),
                var("DB_PORT", "5432"),
                var("DB_NAME", "segmentation"),
            )
        });

        let tidy_interval_secs: u64 = parse_var(&lookup, "TIDY_INTERVAL_SECS", 30);
        if tidy_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "TIDY_INTERVAL_SECS",
                message: "must be greater than zero".to_string(),
            });
        }

        let request_timeout_secs: u64 = parse_var(&lookup, "REQUEST_TIMEOUT_SECS", 30);
        if request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "REQUEST_TIMEOUT_SECS",
                message: "must be greater than zero".to_string(),
            });
        }

        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(|message| ConfigError::Invalid {
                key: "LOG_FORMAT",
                message,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            listen_addr,
            database_url,
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS", 10),
            database_min_connections: parse_var(&lookup, "DATABASE_MIN_CONNECTIONS", 1),
            database_connect_timeout: Duration::from_secs(parse_var(
                &lookup,
                "DATABASE_CONNECT_TIMEOUT_SECS",
                5,
            )),
            create_tables: parse_bool(&lookup, "CREATE_TABLES", false),
            tidy_interval: Duration::from_secs(tidy_interval_secs),
            audit_log_enabled: parse_bool(&lookup, "AUDIT_LOG_ENABLED", true),
            request_timeout: Duration::from_secs(request_timeout_secs),
            log_format,
        })
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a variable as a boolean. Accepts `true`/`1`/`yes` and
/// `false`/`0`/`no` in any case. Returns `default` otherwise.
fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1" | "yes") => true,
        Some("false" | "0" | "no") => false,
        _ => default,
    }
}

/// Hides the password part of a connection string.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
