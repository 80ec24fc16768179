use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub cache: CacheConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub target: DatabaseTarget,
    pub max_connections: u32,
}

/// Where the store lives: a connection URL, or TiDB fields that are handed
/// to the driver one by one so credentials never pass through URL parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatabaseTarget {
    Url(String),
    Tidb(TidbSettings),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    MySql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Time-to-live of each cached read, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub stats_ttl_ms: u64,
    pub page_ttl_ms: u64,
    pub total_ttl_ms: u64,
    pub today_ttl_ms: u64,
    pub recent_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stats_ttl_ms: 30_000,
            page_ttl_ms: 10_000,
            total_ttl_ms: 60_000,
            today_ttl_ms: 30_000,
            recent_ttl_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Path to a MaxMind GeoLite2-City / GeoIP2-City .mmdb file.
    /// If None, visits carry placeholder locations.
    pub geoip_city_db_path: Option<String>,
}

/// TiDB connection pieces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TidbSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub database: String,
    pub enable_ssl: bool,
}

impl TidbSettings {
    /// Driver options built field by field. With SSL enabled the server
    /// certificate and host name are verified.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        let ssl_mode = if self.enable_ssl {
            MySqlSslMode::VerifyIdentity
        } else {
            MySqlSslMode::Preferred
        };

        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(ssl_mode)
    }
}

impl DatabaseBackend {
    /// Infer the backend from a connection URL scheme
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_lowercase();
        match scheme.as_str() {
            "sqlite" => Some(DatabaseBackend::Sqlite),
            "postgres" | "postgresql" => Some(DatabaseBackend::Postgres),
            "mysql" | "mariadb" | "tidb" => Some(DatabaseBackend::MySql),
            _ => None,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "sqlite" => Some(DatabaseBackend::Sqlite),
            "postgres" | "postgresql" => Some(DatabaseBackend::Postgres),
            "mysql" | "tidb" => Some(DatabaseBackend::MySql),
            _ => None,
        }
    }
}

const DEFAULT_DATABASE_URL: &str = "sqlite://./visitlog.db?mode=rwc";

/// Resolve the store location with a fixed precedence:
/// explicit `DATABASE_URL`, then TiDB pieces, then the local SQLite file.
pub fn resolve_database(
    database_url: Option<String>,
    backend_override: Option<String>,
    tidb: Option<TidbSettings>,
) -> anyhow::Result<(DatabaseBackend, DatabaseTarget)> {
    let (inferred, target) = match (database_url, tidb) {
        (Some(url), _) => (DatabaseBackend::from_url(&url), DatabaseTarget::Url(url)),
        (None, Some(tidb)) => (Some(DatabaseBackend::MySql), DatabaseTarget::Tidb(tidb)),
        (None, None) => (
            Some(DatabaseBackend::Sqlite),
            DatabaseTarget::Url(DEFAULT_DATABASE_URL.to_string()),
        ),
    };

    let backend = match backend_override {
        Some(value) => DatabaseBackend::parse(&value).with_context(|| {
            format!("Unknown DATABASE_BACKEND '{value}'. Supported values: sqlite, postgres, mysql")
        })?,
        None => inferred.context("Cannot infer database backend from DATABASE_URL scheme")?,
    };

    if matches!(target, DatabaseTarget::Tidb(_)) && backend != DatabaseBackend::MySql {
        anyhow::bail!("TIDB_* settings require the mysql backend");
    }

    Ok((backend, target))
}

fn parse_max_connections(value: Option<String>) -> anyhow::Result<u32> {
    let Some(value) = value else {
        return Ok(5);
    };
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => anyhow::bail!("DATABASE_MAX_CONNECTIONS must be a positive integer, got '{value}'"),
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn env_u64(key: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .with_context(|| format!("{key} must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let tidb = match std::env::var("TIDB_HOST") {
            Ok(host) => Some(TidbSettings {
                host,
                port: std::env::var("TIDB_PORT")
                    .unwrap_or_else(|_| "4000".to_string())
                    .parse::<u16>()
                    .context("TIDB_PORT must be a port number")?,
                user: std::env::var("TIDB_USER").unwrap_or_else(|_| "root".to_string()),
                password: std::env::var("TIDB_PASSWORD").unwrap_or_default(),
                database: std::env::var("TIDB_DATABASE").unwrap_or_else(|_| "ue_site".to_string()),
                enable_ssl: env_flag("TIDB_ENABLE_SSL"),
            }),
            Err(_) => None,
        };

        let (backend, target) = resolve_database(
            std::env::var("DATABASE_URL").ok(),
            std::env::var("DATABASE_BACKEND").ok(),
            tidb,
        )?;

        let max_connections =
            parse_max_connections(std::env::var("DATABASE_MAX_CONNECTIONS").ok())?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;

        let defaults = CacheConfig::default();
        let cache = CacheConfig {
            stats_ttl_ms: env_u64("CACHE_STATS_TTL_MS", defaults.stats_ttl_ms)?,
            page_ttl_ms: env_u64("CACHE_PAGE_TTL_MS", defaults.page_ttl_ms)?,
            total_ttl_ms: env_u64("CACHE_TOTAL_TTL_MS", defaults.total_ttl_ms)?,
            today_ttl_ms: env_u64("CACHE_TODAY_TTL_MS", defaults.today_ttl_ms)?,
            recent_ttl_ms: env_u64("CACHE_RECENT_TTL_MS", defaults.recent_ttl_ms)?,
        };

        Ok(Config {
            database: DatabaseConfig {
                backend,
                target,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            cache,
            analytics: AnalyticsConfig {
                geoip_city_db_path: std::env::var("GEOIP_CITY_DB_PATH").ok(),
            },
        })
    }
}
