#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Float64Array, Int64Array, RecordBatchIterator,
    StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use tracing::{debug, info};

use super::{DocumentMetadata, DocumentRecord, ScoredDocument, VectorIndex};
use crate::{Result, TidepoolError};

/// Vector index over LanceDB. One table per collection name; rebuilding a
/// collection drops and recreates its table.
pub struct VectorStore {
    connection: Connection,
    collection: String,
}

impl VectorStore {
    /// Open (or create) the LanceDB dataset at `db_path`.
    #[inline]
    pub async fn open(db_path: &Path, collection: &str) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TidepoolError::Database(format!("Failed to create vector database directory: {e}"))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri).execute().await.map_err(|e| {
            TidepoolError::Database(format!("Failed to connect to LanceDB: {e}"))
        })?;

        info!("Vector store initialized for collection '{}'", collection);
        Ok(Self {
            connection,
            collection: collection.to_string(),
        })
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("document", DataType::Utf8, false),
            Field::new("timestamp", DataType::Utf8, false),
            Field::new("latitude", DataType::Float64, false),
            Field::new("longitude", DataType::Float64, false),
        ]))
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| TidepoolError::Database(format!("Failed to list tables: {e}")))?;
        Ok(table_names.contains(&self.collection))
    }

    async fn drop_collection_if_exists(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping existing collection '{}'", self.collection);
            self.connection
                .drop_table(&self.collection)
                .await
                .map_err(|e| TidepoolError::Database(format!("Failed to drop table: {e}")))?;
        }
        Ok(())
    }

    /// Append a batch of records to the collection table. Used by `rebuild`
    /// today; an incremental upsert path would call this directly.
    async fn append_batch(&self, records: &[DocumentRecord]) -> Result<()> {
        let record_batch = create_record_batch(records)?;

        let table = self
            .connection
            .open_table(&self.collection)
            .execute()
            .await
            .map_err(|e| TidepoolError::Database(format!("Failed to open table: {e}")))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| TidepoolError::Database(format!("Failed to insert documents: {e}")))?;

        Ok(())
    }

    async fn parse_search_results_stream(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<ScoredDocument>> {
        let mut documents = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| TidepoolError::Database(format!("Failed to read result stream: {e}")))?
        {
            documents.extend(parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", documents.len());
        Ok(documents)
    }
}

#[async_trait]
impl VectorIndex for VectorStore {
    /// Full rebuild: drop the collection and write every record in one pass.
    /// Nothing is committed if record batch assembly fails.
    async fn rebuild(&self, records: Vec<DocumentRecord>) -> Result<()> {
        let Some(first) = records.first() else {
            return Err(TidepoolError::MalformedRow(
                "cannot rebuild an index from zero documents".to_string(),
            ));
        };
        let vector_dim = first.vector.len();

        info!(
            "Rebuilding collection '{}' with {} documents ({} dimensions)",
            self.collection,
            records.len(),
            vector_dim
        );

        self.drop_collection_if_exists().await?;

        let schema = Self::create_schema(vector_dim);
        self.connection
            .create_empty_table(&self.collection, schema)
            .execute()
            .await
            .map_err(|e| TidepoolError::Database(format!("Failed to create table: {e}")))?;

        self.append_batch(&records).await?;

        info!("Successfully stored {} documents", records.len());
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredDocument>> {
        if !self.table_exists().await? {
            return Err(TidepoolError::IndexNotBuilt(self.collection.clone()));
        }

        debug!("Searching for similar vectors with limit: {}", k);

        let table = self
            .connection
            .open_table(&self.collection)
            .execute()
            .await
            .map_err(|e| TidepoolError::Database(format!("Failed to open table: {e}")))?;

        let results = table
            .vector_search(vector)
            .map_err(|e| TidepoolError::Database(format!("Failed to create vector search: {e}")))?
            .column("vector")
            .limit(k)
            .execute()
            .await
            .map_err(|e| TidepoolError::Database(format!("Failed to execute search: {e}")))?;

        self.parse_search_results_stream(results).await
    }

    async fn count(&self) -> Result<u64> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self
            .connection
            .open_table(&self.collection)
            .execute()
            .await
            .map_err(|e| TidepoolError::Database(format!("Failed to open table: {e}")))?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| TidepoolError::Database(format!("Failed to count rows: {e}")))?;

        Ok(count as u64)
    }
}

fn create_record_batch(records: &[DocumentRecord]) -> Result<RecordBatch> {
    let len = records.len();
    let vector_dim = records
        .first()
        .map(|r| r.vector.len())
        .ok_or_else(|| TidepoolError::Database("empty record batch".to_string()))?;

    let mut ids = Vec::with_capacity(len);
    let mut documents = Vec::with_capacity(len);
    let mut timestamps = Vec::with_capacity(len);
    let mut latitudes = Vec::with_capacity(len);
    let mut longitudes = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);

    for record in records {
        if record.vector.len() != vector_dim {
            return Err(TidepoolError::Database(format!(
                "inconsistent vector dimension: expected {}, document {} has {}",
                vector_dim,
                record.id,
                record.vector.len()
            )));
        }
        ids.push(record.id);
        documents.push(record.document.as_str());
        timestamps.push(record.metadata.timestamp.as_str());
        latitudes.push(record.metadata.latitude);
        longitudes.push(record.metadata.longitude);
        flat_values.extend_from_slice(&record.vector);
    }

    let values_array = Float32Array::from(flat_values);
    let item_field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(item_field, vector_dim as i32, Arc::new(values_array), None)
            .map_err(|e| TidepoolError::Database(format!("Failed to create vector array: {e}")))?;

    let schema = VectorStore::create_schema(vector_dim);
    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(Int64Array::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(documents)),
        Arc::new(StringArray::from(timestamps)),
        Arc::new(Float64Array::from(latitudes)),
        Arc::new(Float64Array::from(longitudes)),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| TidepoolError::Database(format!("Failed to create record batch: {e}")))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredDocument>> {
    fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
        batch
            .column_by_name(name)
            .ok_or_else(|| TidepoolError::Database(format!("Missing {name} column")))?
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| TidepoolError::Database(format!("Invalid {name} column type")))
    }

    let ids = column::<Int64Array>(batch, "id")?;
    let documents = column::<StringArray>(batch, "document")?;
    let timestamps = column::<StringArray>(batch, "timestamp")?;
    let latitudes = column::<Float64Array>(batch, "latitude")?;
    let longitudes = column::<Float64Array>(batch, "longitude")?;

    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut documents_out = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        documents_out.push(ScoredDocument {
            id: ids.value(row),
            document: documents.value(row).to_string(),
            metadata: DocumentMetadata {
                timestamp: timestamps.value(row).to_string(),
                latitude: latitudes.value(row),
                longitude: longitudes.value(row),
            },
            // Convert distance to similarity score (higher is better)
            score: 1.0 - distance,
            distance,
        });
    }

    Ok(documents_out)
}
