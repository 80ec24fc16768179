pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{DatabaseBackend, DatabaseConfig, DatabaseTarget};

pub use mysql::MySqlExecutor;
pub use postgres::PostgresExecutor;
pub use sqlite::SqliteExecutor;
pub use trait_def::{Dialect, QueryError, QueryExecutor, QueryResult, Row, RowSet, Value};

/// Open the executor selected by the resolved database configuration
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn QueryExecutor>> {
    let executor: Arc<dyn QueryExecutor> = match (&config.target, config.backend) {
        (DatabaseTarget::Tidb(tidb), _) => {
            info!("Using TiDB storage at {}:{}", tidb.host, tidb.port);
            Arc::new(
                MySqlExecutor::with_options(tidb.connect_options(), config.max_connections)
                    .await?,
            )
        }
        (DatabaseTarget::Url(url), DatabaseBackend::Sqlite) => {
            info!("Using SQLite storage: {}", url);
            Arc::new(SqliteExecutor::new(url, config.max_connections).await?)
        }
        (DatabaseTarget::Url(url), DatabaseBackend::Postgres) => {
            info!("Using PostgreSQL storage");
            Arc::new(PostgresExecutor::new(url, config.max_connections).await?)
        }
        (DatabaseTarget::Url(url), DatabaseBackend::MySql) => {
            info!("Using MySQL/TiDB storage");
            Arc::new(MySqlExecutor::new(url, config.max_connections).await?)
        }
    };
    Ok(executor)
}

/// Whether a statement produces a result set rather than an affected-row count
pub(crate) fn returns_rows(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();

    matches!(
        keyword.as_str(),
        "SELECT" | "WITH" | "SHOW" | "DESCRIBE" | "DESC" | "EXPLAIN" | "PRAGMA" | "VALUES"
    )
}
