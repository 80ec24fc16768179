//! MySQL protocol executor, used for TiDB both over a direct connection and
//! through a pooling proxy connection string

use crate::storage::{
    returns_rows, Dialect, QueryError, QueryExecutor, QueryResult, Row, RowSet, Value,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySqlPool, Row as _, TypeInfo, ValueRef};
use std::str::FromStr;
use std::sync::Arc;

pub struct MySqlExecutor {
    pool: Arc<MySqlPool>,
}

impl MySqlExecutor {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = MySqlConnectOptions::from_str(database_url)?;
        Self::with_options(options, max_connections).await
    }

    pub async fn with_options(options: MySqlConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn init(&self) -> Result<()> {
        // MySQL has no CREATE INDEX IF NOT EXISTS, so indexes are declared inline
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visitors (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                ip_address VARCHAR(64) NOT NULL,
                user_agent TEXT,
                referer VARCHAR(1024) NOT NULL DEFAULT 'direct',
                country VARCHAR(128),
                region VARCHAR(128),
                city VARCHAR(128),
                device_type VARCHAR(32) NOT NULL DEFAULT 'unknown',
                browser VARCHAR(64) NOT NULL DEFAULT 'unknown',
                os VARCHAR(64) NOT NULL DEFAULT 'unknown',
                session_id VARCHAR(128) NOT NULL,
                visited_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
                INDEX idx_visitors_visited_at (visited_at),
                INDEX idx_visitors_session_id (session_id)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> QueryResult<RowSet> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Int(v) => query.bind(*v),
                Value::Float(v) => query.bind(*v),
                Value::Text(s) => query.bind(s.as_str()),
            };
        }

        if !returns_rows(sql) {
            let result = query.execute(self.pool.as_ref()).await?;
            return Ok(RowSet::affected(result.rows_affected()));
        }

        let rows = query
            .fetch_all(self.pool.as_ref())
            .await?
            .iter()
            .map(decode_row)
            .collect::<QueryResult<Vec<Row>>>()?;

        Ok(RowSet::from_rows(rows))
    }
}

fn decode_row(row: &MySqlRow) -> QueryResult<Row> {
    let mut out = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        out.insert(column.name(), decode_column(row, idx)?);
    }
    Ok(out)
}

fn decode_column(row: &MySqlRow, idx: usize) -> QueryResult<Value> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "BIGINT" | "INT" | "MEDIUMINT" | "SMALLINT" | "TINYINT" | "BOOLEAN" => {
            Value::Int(row.try_get::<i64, _>(idx)?)
        }
        "BIGINT UNSIGNED" | "INT UNSIGNED" | "MEDIUMINT UNSIGNED" | "SMALLINT UNSIGNED"
        | "TINYINT UNSIGNED" => {
            let v = row.try_get::<u64, _>(idx)?;
            Value::Int(i64::try_from(v).map_err(|e| QueryError::Query(e.to_string()))?)
        }
        "DOUBLE" | "FLOAT" => Value::Float(row.try_get::<f64, _>(idx)?),
        "DATETIME" | "TIMESTAMP" => Value::Text(
            row.try_get::<NaiveDateTime, _>(idx)?
                .format("%Y-%m-%d %H:%M:%S%.3f")
                .to_string(),
        ),
        "DATE" => Value::Text(row.try_get::<NaiveDate, _>(idx)?.to_string()),
        _ => Value::Text(row.try_get::<String, _>(idx)?),
    };

    Ok(value)
}
