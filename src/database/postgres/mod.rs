
pub mod models;

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, Pool, Postgres, Row, TypeInfo};
use tracing::{debug, info};

use crate::database::StoreAdapter;
use crate::database::postgres::models::{ObservationRow, SqlRow};
use crate::translator::{SchemaDescriptor, SqlQuery};
use crate::{Result, TidepoolError};

pub type DbPool = Pool<Postgres>;

/// Postgres error code raised when `statement_timeout` cancels a query.
const QUERY_CANCELED: &str = "57014";

/// Store adapter over a PostGIS-enabled Postgres database.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
    schema: SchemaDescriptor,
}

impl PgStore {
    #[inline]
    pub async fn connect(database_url: &str, schema: SchemaDescriptor) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to create database connection pool")?;

        info!("Connected to Postgres");
        Ok(Self { pool, schema })
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Total observation count, used by the status command.
    #[inline]
    pub async fn count_observations(&self) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", self.schema.table))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| TidepoolError::Database(e.to_string()))?;
        Ok(count)
    }
}

#[async_trait]
impl StoreAdapter for PgStore {
    async fn fetch_observations(&self, limit: Option<i64>) -> Result<Vec<ObservationRow>> {
        let mut sql = format!(
            "SELECT {} FROM {} ORDER BY id",
            self.schema.columns.join(", "),
            self.schema.table
        );
        if limit.is_some() {
            sql.push_str(" LIMIT $1");
        }

        debug!("Fetching observation snapshot (limit: {:?})", limit);

        let mut query = sqlx::query_as::<_, ObservationRow>(&sql);
        if let Some(limit) = limit {
            query = query.bind(limit);
        }

        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TidepoolError::Database(e.to_string()))
    }

    /// Run a validated statement inside a read-only transaction with a
    /// server-side statement timeout. Timeouts surface as `QueryTimeout`
    /// and are never retried.
    async fn execute(&self, query: &SqlQuery, timeout: Duration) -> Result<Vec<SqlRow>> {
        let timeout_ms = timeout.as_millis().max(1) as u64;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TidepoolError::Database(e.to_string()))?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| TidepoolError::Database(e.to_string()))?;

        // SET does not take bind parameters; the value is our own integer.
        sqlx::query(&format!("SET LOCAL statement_timeout = {timeout_ms}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| TidepoolError::Database(e.to_string()))?;

        let rows = sqlx::query(query.as_str())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_execution_error(e, timeout_ms))?;

        tx.rollback()
            .await
            .map_err(|e| TidepoolError::Database(e.to_string()))?;

        debug!("Statement returned {} rows", rows.len());
        rows.iter().map(decode_row).collect()
    }

    fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }
}

fn map_execution_error(error: sqlx::Error, timeout_ms: u64) -> TidepoolError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.code().as_deref() == Some(QUERY_CANCELED) {
            return TidepoolError::QueryTimeout(timeout_ms);
        }
    }
    TidepoolError::Database(error.to_string())
}

/// Decode one result row column-by-column based on the Postgres type.
fn decode_row(row: &PgRow) -> Result<SqlRow> {
    let mut columns = Vec::with_capacity(row.columns().len());
    let mut values = Vec::with_capacity(row.columns().len());

    for (i, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_value(row, i, column.type_info().name()));
    }

    Ok(SqlRow { columns, values })
}

fn decode_value(row: &PgRow, i: usize, type_name: &str) -> serde_json::Value {
    use serde_json::Value;

    match type_name {
        "INT2" => opt_value(row.try_get::<Option<i16>, _>(i).ok().flatten()),
        "INT4" => opt_value(row.try_get::<Option<i32>, _>(i).ok().flatten()),
        "INT8" => opt_value(row.try_get::<Option<i64>, _>(i).ok().flatten()),
        "FLOAT4" => opt_value(row.try_get::<Option<f32>, _>(i).ok().flatten()),
        "FLOAT8" => opt_value(row.try_get::<Option<f64>, _>(i).ok().flatten()),
        "BOOL" => opt_value(row.try_get::<Option<bool>, _>(i).ok().flatten()),
        // ROUND() and AVG() over integer columns come back as NUMERIC.
        "NUMERIC" => numeric_value(
            row.try_get::<Option<rust_decimal::Decimal>, _>(i)
                .ok()
                .flatten(),
        ),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(i)
            .ok()
            .flatten()
            .map_or(Value::Null, |ts| Value::String(ts.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
            .ok()
            .flatten()
            .map_or(Value::Null, |ts| Value::String(ts.to_rfc3339())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(i)
            .ok()
            .flatten()
            .map_or(Value::Null, |d| Value::String(d.to_string())),
        _ => row
            .try_get::<Option<String>, _>(i)
            .ok()
            .flatten()
            .map_or(Value::Null, Value::String),
    }
}

fn opt_value<T: Into<serde_json::Value>>(value: Option<T>) -> serde_json::Value {
    value.map_or(serde_json::Value::Null, Into::into)
}

/// Arbitrary-precision decimals become JSON numbers when exactly
/// representable as f64, otherwise a string preserving the digits.
fn numeric_value(value: Option<rust_decimal::Decimal>) -> serde_json::Value {
    use rust_decimal::prelude::ToPrimitive;

    match value {
        None => serde_json::Value::Null,
        Some(d) => d
            .to_f64()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(
                || serde_json::Value::String(d.to_string()),
                serde_json::Value::Number,
            ),
    }
}
