use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use super::*;
use crate::database::StoreAdapter;
use crate::database::lancedb::{DocumentMetadata, DocumentRecord, ScoredDocument, VectorIndex};
use crate::database::postgres::models::{ObservationRow, SqlRow};
use crate::embeddings::EmbeddingProvider;
use crate::llm::LanguageModel;
use crate::translator::{SchemaDescriptor, SqlQuery, Translator};

struct StubStore {
    schema: SchemaDescriptor,
}

#[async_trait]
impl StoreAdapter for StubStore {
    async fn fetch_observations(&self, _limit: Option<i64>) -> crate::Result<Vec<ObservationRow>> {
        Ok(Vec::new())
    }

    async fn execute(&self, _query: &SqlQuery, _timeout: Duration) -> crate::Result<Vec<SqlRow>> {
        Ok(vec![SqlRow {
            columns: vec!["id".to_string()],
            values: vec![json!(1)],
        }])
    }

    fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }
}

struct CannedLlm;

impl LanguageModel for CannedLlm {
    fn complete(&self, _prompt: &str) -> crate::Result<String> {
        Ok("SQLQuery: SELECT id FROM ocean_observations".to_string())
    }
}

struct FakeEmbedder {
    fail: bool,
}

impl EmbeddingProvider for FakeEmbedder {
    fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(crate::TidepoolError::EmbeddingProvider(
                "host unreachable".to_string(),
            ));
        }
        Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
    }
}

struct MemoryIndex {
    records: Mutex<Option<Vec<DocumentRecord>>>,
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn rebuild(&self, records: Vec<DocumentRecord>) -> crate::Result<()> {
        *self.records.lock().unwrap() = Some(records);
        Ok(())
    }

    async fn search(&self, _vector: &[f32], k: usize) -> crate::Result<Vec<ScoredDocument>> {
        let guard = self.records.lock().unwrap();
        let records = guard
            .as_ref()
            .ok_or_else(|| crate::TidepoolError::IndexNotBuilt("ocean_data".to_string()))?;
        Ok(records
            .iter()
            .take(k)
            .enumerate()
            .map(|(rank, r)| ScoredDocument {
                id: r.id,
                document: r.document.clone(),
                metadata: r.metadata.clone(),
                score: 1.0 - rank as f32 * 0.1,
                distance: rank as f32 * 0.1,
            })
            .collect())
    }

    async fn count(&self) -> crate::Result<u64> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .as_ref()
            .map_or(0, |r| r.len() as u64))
    }
}

fn seeded_records() -> Vec<DocumentRecord> {
    vec![DocumentRecord {
        id: 1,
        vector: vec![0.1, 0.2, 0.3],
        document: "Observation at lat -10.00, lon 65.00".to_string(),
        metadata: DocumentMetadata {
            timestamp: "2024-01-15 12:00:00".to_string(),
            latitude: -10.0,
            longitude: 65.0,
        },
    }]
}

fn app(embedder_fails: bool, index_built: bool) -> Router {
    use std::sync::Arc;

    use crate::indexer::Indexer;
    use crate::retriever::Retriever;

    let translator = Translator::new(Arc::new(CannedLlm), SchemaDescriptor::ocean_observations());
    let store = Arc::new(StubStore {
        schema: SchemaDescriptor::ocean_observations(),
    });
    let index = Arc::new(MemoryIndex {
        records: Mutex::new(index_built.then(seeded_records)),
    });
    let indexer = Arc::new(Indexer::new(
        Arc::new(FakeEmbedder {
            fail: embedder_fails,
        }),
        index,
    ));
    let retriever = Arc::new(Retriever::new(
        translator,
        store,
        indexer,
        Duration::from_millis(500),
    ));
    router(AppState { retriever })
}

async fn post_query(app: Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/query")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn semantic_query_returns_items() {
    let (status, body) = post_query(
        app(false, true),
        json!({"text": "warm water", "mode": "semantic", "k": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "semantic");
    assert_eq!(body["items"][0]["id"], 1);
    assert_eq!(body["items"][0]["provenance"], "semantic");
}

#[tokio::test]
async fn defaults_apply_when_mode_and_k_omitted() {
    let (status, body) = post_query(app(false, true), json!({"text": "find warm regions"})).await;
    assert_eq!(status, StatusCode::OK);
    // "auto" classifies descriptive text as semantic.
    assert_eq!(body["mode"], "semantic");
}

#[tokio::test]
async fn unknown_mode_is_bad_request() {
    let (status, body) =
        post_query(app(false, true), json!({"text": "x", "mode": "hybrid"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");
}

#[tokio::test]
async fn empty_text_is_bad_request() {
    let (status, body) =
        post_query(app(false, true), json!({"text": "  ", "mode": "semantic"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");
}

#[tokio::test]
async fn missing_index_is_conflict() {
    let (status, body) =
        post_query(app(false, false), json!({"text": "warm", "mode": "semantic"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "index_not_built");
}

#[tokio::test]
async fn provider_failure_is_bad_gateway() {
    let (status, body) =
        post_query(app(true, true), json!({"text": "warm", "mode": "semantic"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "embedding_provider_error");
}

#[tokio::test]
async fn sql_mode_runs_through_store() {
    let (status, body) = post_query(
        app(false, true),
        json!({"text": "list observation ids", "mode": "sql", "k": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "sql");
    assert_eq!(body["items"][0]["provenance"], "sql");
    assert_eq!(body["items"][0]["content"], "id=1");
}

#[tokio::test]
async fn health_endpoint_responds() {
    let response = app(false, true)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
