// Indexer module
// Renders observations into canonical sentences, embeds them, and rebuilds
// the vector index in one pass

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::database::lancedb::{DocumentMetadata, DocumentRecord, ScoredDocument, VectorIndex};
use crate::database::postgres::models::{Observation, ObservationRow};
use crate::embeddings::EmbeddingProvider;
use crate::{Result, TidepoolError};


/// Statistics from a completed index build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub documents_indexed: usize,
    pub embedding_dimension: usize,
}

/// Builds and queries the semantic index over observations.
///
/// A build is all-or-nothing: every row is validated and embedded before a
/// single `rebuild` call replaces the collection, so a failed run leaves the
/// previous index intact.
pub struct Indexer {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl Indexer {
    #[inline]
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Render an observation into its canonical sentence form. The indexer
    /// and any ad-hoc lookups must agree on this exact rendering, so it has
    /// a single definition.
    #[inline]
    pub fn render_document(obs: &Observation) -> String {
        format!(
            "Observation at lat {:.2}, lon {:.2}, time {}: \
             temperature = {} °C, day_high temperature = {} °C, \
             day_low temperature = {} °C, pressure = {} dbar, \
             humidity = {}%, salinity = {} PSU.",
            obs.latitude,
            obs.longitude,
            obs.timestamp,
            obs.temperature_c,
            obs.day_high_temperature_c,
            obs.day_low_temperature_c,
            obs.pressure_dbar,
            obs.humidity_percent,
            obs.salinity_psu,
        )
    }

    /// Embed every observation and replace the index with the result.
    ///
    /// Any malformed row aborts the build before the index is touched.
    #[inline]
    pub async fn build(&self, rows: Vec<ObservationRow>) -> Result<IndexStats> {
        if rows.is_empty() {
            return Err(TidepoolError::MalformedRow(
                "no observations to index; load data first".to_string(),
            ));
        }

        let observations = rows
            .into_iter()
            .map(Observation::try_from)
            .collect::<Result<Vec<_>>>()?;

        info!("Indexing {} observations", observations.len());

        let documents: Vec<String> = observations.iter().map(Self::render_document).collect();

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(documents.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding observations")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let vectors = self.embedder.embed(&documents)?;
        bar.set_position(documents.len() as u64);
        bar.finish_and_clear();

        if vectors.len() != observations.len() {
            return Err(TidepoolError::EmbeddingProvider(format!(
                "expected {} embeddings, provider returned {}",
                observations.len(),
                vectors.len()
            )));
        }

        let dimension = vectors.first().map_or(0, Vec::len);

        let records = observations
            .iter()
            .zip(vectors)
            .map(|(obs, vector)| DocumentRecord {
                id: obs.id,
                vector,
                document: Self::render_document(obs),
                metadata: DocumentMetadata {
                    timestamp: obs.timestamp.to_string(),
                    latitude: obs.latitude,
                    longitude: obs.longitude,
                },
            })
            .collect::<Vec<_>>();

        self.index.rebuild(records).await?;

        let stats = IndexStats {
            documents_indexed: observations.len(),
            embedding_dimension: dimension,
        };
        info!(
            "Index build complete: {} documents, dimension {}",
            stats.documents_indexed, stats.embedding_dimension
        );
        Ok(stats)
    }

    /// Embed the query text and return the `k` nearest documents, ordered by
    /// ascending distance with ties broken by observation id.
    #[inline]
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Err(TidepoolError::Validation(
                "k must be at least 1".to_string(),
            ));
        }

        let vectors = self.embedder.embed(&[text.to_string()])?;
        let vector = vectors.first().ok_or_else(|| {
            TidepoolError::EmbeddingProvider("provider returned no embedding for query".to_string())
        })?;

        let mut hits = self.index.search(vector, k).await?;
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        debug!("Semantic query returned {} documents", hits.len());
        Ok(hits)
    }
}
