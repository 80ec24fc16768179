use crate::storage::{
    returns_rows, Dialect, QueryError, QueryExecutor, QueryResult, Row, RowSet, Value,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row as _, TypeInfo, ValueRef};
use std::sync::Arc;

pub struct PostgresExecutor {
    pool: Arc<PgPool>,
}

impl PostgresExecutor {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visitors (
                id BIGSERIAL PRIMARY KEY,
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
                visited_at TIMESTAMP(3) NOT NULL DEFAULT LOCALTIMESTAMP
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

fn decode_row(row: &PgRow) -> QueryResult<Row> {
    let mut out = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        out.insert(column.name(), decode_column(row, idx)?);
    }
    Ok(out)
}

fn decode_column(row: &PgRow, idx: usize) -> QueryResult<Value> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "INT8" => Value::Int(row.try_get::<i64, _>(idx)?),
        "INT4" => Value::Int(row.try_get::<i32, _>(idx)?.into()),
        "INT2" => Value::Int(row.try_get::<i16, _>(idx)?.into()),
        "FLOAT8" => Value::Float(row.try_get::<f64, _>(idx)?),
        "FLOAT4" => Value::Float(row.try_get::<f32, _>(idx)?.into()),
        "BOOL" => Value::Int(row.try_get::<bool, _>(idx)?.into()),
        "TIMESTAMP" => Value::Text(
            row.try_get::<NaiveDateTime, _>(idx)?
                .format("%Y-%m-%d %H:%M:%S%.3f")
                .to_string(),
        ),
        "TIMESTAMPTZ" => Value::Text(
            row.try_get::<DateTime<Utc>, _>(idx)?
                .format("%Y-%m-%d %H:%M:%S%.3f")
                .to_string(),
        ),
        "DATE" => Value::Text(row.try_get::<NaiveDate, _>(idx)?.to_string()),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Value::Text(row.try_get::<String, _>(idx)?),
        other => {
            return Err(QueryError::Query(format!(
                "unsupported column type {} at index {}",
                other, idx
            )))
        }
    };

    Ok(value)
}
