// Storage capabilities: the relational store (Postgres/PostGIS) and the
// vector index (LanceDB). Both sit behind traits so the retriever can be
// wired with test doubles.

pub mod lancedb;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;
use crate::database::postgres::models::{ObservationRow, SqlRow};
use crate::translator::{SchemaDescriptor, SqlQuery};

/// Relational store boundary.
///
/// `execute` only accepts statements that passed translator validation, runs
/// them read-only, and enforces the given timeout.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    async fn fetch_observations(&self, limit: Option<i64>) -> Result<Vec<ObservationRow>>;

    async fn execute(&self, query: &SqlQuery, timeout: Duration) -> Result<Vec<SqlRow>>;

    fn schema(&self) -> &SchemaDescriptor;
}
