//! Configuration handling for the dude service.
//!
//! Server settings come from CLI arguments and environment variables. Named
//! databases come from `DB_<NAME>_URL` environment variables and repeated
//! `--database NAME=URL` arguments. Pool tuning rides along in each URL as
//! query parameters carrying the reserved `_x-` prefix.

use crate::error::ConfigError;
use crate::models::NamedEndpoint;
use clap::Parser;
use std::time::Duration;
use tracing::warn;
use url::Url;

pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_DB_HEADER: &str = "X-DB-Name";

/// Environment variables named `DB_<NAME>_URL` declare a database.
pub const ENV_DB_PREFIX: &str = "DB_";
pub const ENV_URL_SUFFIX: &str = "_URL";

/// Query parameters with this prefix are pool options, never driver options.
pub const PARAM_PREFIX: &str = "_x-";
pub const PARAM_POOL_SIZE: &str = "_x-poolSize";
pub const PARAM_ACQUIRE_TIMEOUT: &str = "_x-acquireTimeout";
pub const PARAM_IDLE_TIMEOUT: &str = "_x-idleTimeout";

// Pool configuration defaults
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Connection pool settings extracted from a database URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolConfig {
    /// Maximum open connections (`_x-poolSize`)
    pub pool_size: u32,
    /// Seconds to wait for a free connection (`_x-acquireTimeout`)
    pub acquire_timeout_secs: u64,
    /// Seconds before an idle connection is closed (`_x-idleTimeout`)
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    /// Read the `_x-` options from `url` and strip every `_x-` parameter.
    ///
    /// Values that are missing, unparsable, or zero fall back to the default.
    /// Parameters without the prefix are kept for the driver.
    pub fn extract(url: &mut Url) -> Self {
        let mut config = Self::default();
        let mut stripped = false;
        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter_map(|(k, v)| {
                if !k.starts_with(PARAM_PREFIX) {
                    return Some((k.into_owned(), v.into_owned()));
                }
                stripped = true;
                match &*k {
                    PARAM_POOL_SIZE => {
                        config.pool_size = positive_or(&k, &v, DEFAULT_POOL_SIZE);
                    }
                    PARAM_ACQUIRE_TIMEOUT => {
                        config.acquire_timeout_secs =
                            positive_or(&k, &v, DEFAULT_ACQUIRE_TIMEOUT_SECS);
                    }
                    PARAM_IDLE_TIMEOUT => {
                        config.idle_timeout_secs = positive_or(&k, &v, DEFAULT_IDLE_TIMEOUT_SECS);
                    }
                    _ => warn!(param = %k, "Ignoring unknown pool option"),
                }
                None
            })
            .collect();

        if !stripped {
            return config;
        }
        if remaining.is_empty() {
            url.set_query(None);
        } else {
            // Use query_pairs_mut for proper URL encoding
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }
        config
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

fn positive_or<T>(key: &str, value: &str, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::from(0) => parsed,
        _ => {
            warn!(param = %key, value = %value, "Invalid pool option, using default");
            default
        }
    }
}

/// Collect `DB_<NAME>_URL` pairs from the given environment.
///
/// Endpoints are sorted by name so startup order does not depend on the
/// order the process environment happens to list variables in.
pub fn read_endpoints<I>(vars: I) -> Result<Vec<NamedEndpoint>, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut endpoints = vars
        .into_iter()
        .filter_map(|(key, value)| {
            let name = key
                .strip_prefix(ENV_DB_PREFIX)?
                .strip_suffix(ENV_URL_SUFFIX)?
                .to_string();
            Some((name, value))
        })
        .map(|(name, value)| NamedEndpoint::parse(name, &value))
        .collect::<Result<Vec<_>, _>>()?;
    endpoints.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(endpoints)
}

/// Configuration for the dude service.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dude",
    about = "CRUD service that routes each request to one of several named databases",
    version,
    author
)]
pub struct Config {
    /// Additional databases as NAME=URL, on top of DB_<NAME>_URL variables.
    /// Can be specified multiple times.
    #[arg(short = 'd', long = "database", value_name = "NAME=URL")]
    pub databases: Vec<String>,

    /// HTTP host to bind to
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "DUDE_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "DUDE_HTTP_PORT")]
    pub http_port: u16,

    /// Request header naming the database a request is routed to
    #[arg(long, default_value = DEFAULT_DB_HEADER, env = "DUDE_DB_HEADER")]
    pub db_header: String,

    /// Apply embedded schema migrations to every database at startup
    #[arg(long, env = "DUDE_MIGRATE")]
    pub migrate: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DUDE_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DUDE_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            databases: Vec::new(),
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            db_header: DEFAULT_DB_HEADER.to_string(),
            migrate: false,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Endpoints from `--database` arguments followed by the environment.
    pub fn endpoints<I>(&self, vars: I) -> Result<Vec<NamedEndpoint>, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut endpoints = self
            .databases
            .iter()
            .map(|s| NamedEndpoint::parse_pair(s))
            .collect::<Result<Vec<_>, _>>()?;
        endpoints.extend(read_endpoints(vars)?);
        Ok(endpoints)
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
