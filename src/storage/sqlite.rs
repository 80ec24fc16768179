use crate::storage::{returns_rows, Dialect, QueryExecutor, QueryResult, Row, RowSet, Value};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, SqlitePool, ValueRef};
use std::sync::Arc;

pub struct SqliteExecutor {
    pool: Arc<SqlitePool>,
}

impl SqliteExecutor {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn init(&self) -> Result<()> {
        // visited_at keeps millisecond precision in local time so date() compares
        // against the local calendar day
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visitors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip_address TEXT NOT NULL,
                user_agent TEXT,
                referer TEXT NOT NULL DEFAULT 'direct',
                country TEXT,
                region TEXT,
                city TEXT,
                device_type TEXT NOT NULL DEFAULT 'unknown',
                browser TEXT NOT NULL DEFAULT 'unknown',
                os TEXT NOT NULL DEFAULT 'unknown',
                session_id TEXT NOT NULL,
                visited_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now', 'localtime'))
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_visitors_visited_at ON visitors(visited_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_visitors_session_id ON visitors(session_id)")
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

fn decode_row(row: &SqliteRow) -> QueryResult<Row> {
    let mut out = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        out.insert(column.name(), decode_column(row, idx)?);
    }
    Ok(out)
}

fn decode_column(row: &SqliteRow, idx: usize) -> QueryResult<Value> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Ok(Value::Int(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Ok(Value::Float(v));
    }
    Ok(Value::Text(row.try_get::<String, _>(idx)?))
}
