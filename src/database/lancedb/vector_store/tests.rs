use super::*;
use tempfile::TempDir;

fn test_record(id: i64) -> DocumentRecord {
    // Small fixed-dimension vectors, nudged per id so neighbors differ
    let mut vector = vec![0.1, 0.2, 0.3, 0.4];
    for (i, val) in vector.iter_mut().enumerate() {
        *val += (id as f32).mul_add(0.01, i as f32 * 0.001);
    }

    DocumentRecord {
        id,
        vector,
        document: format!("Observation {id} rendered as a sentence"),
        metadata: DocumentMetadata {
            timestamp: "2024-01-01T00:00:00".to_string(),
            latitude: 12.5,
            longitude: -45.25,
        },
    }
}

async fn open_store() -> (VectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::open(&temp_dir.path().join("vectors"), "ocean_data")
        .await
        .expect("should open vector store");
    (store, temp_dir)
}

#[tokio::test]
async fn search_before_build_reports_index_not_built() {
    let (store, _temp_dir) = open_store().await;

    let err = store
        .search(&[0.1, 0.2, 0.3, 0.4], 3)
        .await
        .expect_err("search without a built index must fail");

    assert_eq!(err.kind(), "index_not_built");
    assert!(err.to_string().contains("ocean_data"));
}

#[tokio::test]
async fn count_before_build_is_zero() {
    let (store, _temp_dir) = open_store().await;
    let count = store.count().await.expect("count should succeed");
    assert_eq!(count, 0);
}

#[tokio::test]
async fn rebuild_and_search_round_trip() {
    let (store, _temp_dir) = open_store().await;

    let records: Vec<DocumentRecord> = (1..=5).map(test_record).collect();
    store.rebuild(records).await.expect("rebuild should succeed");

    assert_eq!(store.count().await.expect("count should succeed"), 5);

    let query = test_record(3).vector;
    let results = store
        .search(&query, 2)
        .await
        .expect("search should succeed");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, 3, "exact vector should be the top match");
    assert!(results[0].score >= results[1].score);
    assert_eq!(results[0].metadata.latitude, 12.5);
}

#[tokio::test]
async fn rebuild_replaces_previous_contents() {
    let (store, _temp_dir) = open_store().await;

    store
        .rebuild((1..=10).map(test_record).collect())
        .await
        .expect("first rebuild should succeed");
    assert_eq!(store.count().await.expect("count should succeed"), 10);

    store
        .rebuild((1..=3).map(test_record).collect())
        .await
        .expect("second rebuild should succeed");
    assert_eq!(
        store.count().await.expect("count should succeed"),
        3,
        "rebuild must replace, not append"
    );
}

#[tokio::test]
async fn rebuild_with_no_records_is_rejected() {
    let (store, _temp_dir) = open_store().await;
    let err = store
        .rebuild(Vec::new())
        .await
        .expect_err("empty rebuild must fail");
    assert_eq!(err.kind(), "malformed_row");
}

#[tokio::test]
async fn inconsistent_dimensions_are_rejected() {
    let (store, _temp_dir) = open_store().await;

    let mut records = vec![test_record(1), test_record(2)];
    records[1].vector.push(0.5);

    let err = store
        .rebuild(records)
        .await
        .expect_err("mixed dimensions must fail");
    assert_eq!(err.kind(), "database_error");
}
