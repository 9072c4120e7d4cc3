// Retriever module
// Routes a query to the SQL and/or semantic backend and merges the results
// into one uniform response shape

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::StoreAdapter;
use crate::database::postgres::models::SqlRow;
use crate::indexer::Indexer;
use crate::translator::Translator;
use crate::{Result, TidepoolError};


/// Query dispatch mode. `Auto` resolves to one of the other three before any
/// backend is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Auto,
    Sql,
    Semantic,
    Combined,
}

impl FromStr for Mode {
    type Err = TidepoolError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "sql" => Ok(Self::Sql),
            "semantic" => Ok(Self::Semantic),
            "combined" => Ok(Self::Combined),
            other => Err(TidepoolError::Validation(format!(
                "unknown mode '{other}', expected auto|sql|semantic|combined"
            ))),
        }
    }
}

/// Which backend produced a result item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Sql,
    Semantic,
}

/// One entry of a query answer. SQL rows carry an id only when the generated
/// statement selected one; semantic hits always carry their observation id
/// and a similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedItem {
    pub id: Option<i64>,
    pub content: String,
    pub score: Option<f32>,
    pub provenance: Provenance,
}

/// Ordered answer to one query, tagged with the mode that actually ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub mode: Mode,
    pub items: Vec<RetrievedItem>,
}

/// Uniform error shape returned to HTTP callers. Raw SQL text and provider
/// payloads never appear here, only the taxonomy kind and display message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub kind: String,
    pub message: String,
}

impl From<&TidepoolError> for ErrorEnvelope {
    #[inline]
    fn from(err: &TidepoolError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

const AGGREGATE_WORDS: &[&str] = &[
    "average", "avg", "count", "sum", "minimum", "maximum", "highest", "lowest", "mean",
];

const COMPARATOR_TOKENS: &[&str] = &[
    ">", "<", ">=", "<=", "between", "greater than", "less than", "at least", "at most", "above",
    "below",
];

/// Routes queries to the translator/store pair and the semantic indexer.
/// All backends are injected at construction; the retriever itself holds no
/// mutable state.
pub struct Retriever {
    translator: Translator,
    store: Arc<dyn StoreAdapter>,
    indexer: Arc<Indexer>,
    timeout: Duration,
}

impl Retriever {
    #[inline]
    pub fn new(
        translator: Translator,
        store: Arc<dyn StoreAdapter>,
        indexer: Arc<Indexer>,
        timeout: Duration,
    ) -> Self {
        Self {
            translator,
            store,
            indexer,
            timeout,
        }
    }

    /// Heuristic dispatch for `auto` mode. Comparators and aggregate words
    /// weigh heavier than bare numbers or column mentions; two points tip
    /// the query to the SQL branch. The exact weights are an implementation
    /// detail, only "SQL-suggestive text favors sql" is load-bearing.
    #[inline]
    pub fn classify(&self, text: &str) -> Mode {
        let lowered = text.to_lowercase();
        let mut score = 0_u32;

        if COMPARATOR_TOKENS.iter().any(|t| lowered.contains(t)) {
            score += 2;
        }
        if AGGREGATE_WORDS
            .iter()
            .any(|w| word_present(&lowered, w))
        {
            score += 2;
        }
        if lowered.chars().any(|c| c.is_ascii_digit()) {
            score += 1;
        }
        for column in &self.store.schema().columns {
            let stem = column.split('_').next().unwrap_or(column);
            if stem.len() >= 4 && word_present(&lowered, stem) {
                score += 1;
                break;
            }
        }

        let mode = if score >= 2 { Mode::Sql } else { Mode::Semantic };
        debug!("Classified query as {mode:?} (score {score})");
        mode
    }

    /// Answer a query in the given mode. `Auto` classifies first; if the SQL
    /// branch it picked fails at translation, it falls back to semantic and
    /// logs the degradation.
    #[inline]
    pub async fn retrieve(&self, text: &str, mode: Mode, k: usize) -> Result<QueryResult> {
        if text.trim().is_empty() {
            return Err(TidepoolError::Validation(
                "query text must not be empty".to_string(),
            ));
        }
        if k == 0 {
            return Err(TidepoolError::Validation(
                "k must be at least 1".to_string(),
            ));
        }

        match mode {
            Mode::Sql => Ok(QueryResult {
                mode: Mode::Sql,
                items: self.sql_items(text, k).await?,
            }),
            Mode::Semantic => Ok(QueryResult {
                mode: Mode::Semantic,
                items: self.semantic_items(text, k).await?,
            }),
            Mode::Combined => self.retrieve_combined(text, k).await,
            Mode::Auto => match self.classify(text) {
                Mode::Sql => self.retrieve_auto_sql(text, k).await,
                _ => Ok(QueryResult {
                    mode: Mode::Semantic,
                    items: self.semantic_items(text, k).await?,
                }),
            },
        }
    }

    /// `auto` resolved to SQL: translation failure degrades to the semantic
    /// branch instead of surfacing. Execution failures still surface; a
    /// statement that translated fine but timed out is not a routing error.
    async fn retrieve_auto_sql(&self, text: &str, k: usize) -> Result<QueryResult> {
        let query = match self.translator.translate(text) {
            Ok(query) => query,
            Err(err) => {
                warn!("Auto mode falling back to semantic, translation failed: {err}");
                return Ok(QueryResult {
                    mode: Mode::Semantic,
                    items: self.semantic_items(text, k).await?,
                });
            }
        };
        let rows = self.execute_bounded(&query).await?;
        Ok(QueryResult {
            mode: Mode::Sql,
            items: rows_to_items(rows, k),
        })
    }

    /// Run both branches concurrently and merge, SQL rows first. If one
    /// branch fails the other's results are returned and the failure is
    /// logged; only a double failure surfaces an error.
    async fn retrieve_combined(&self, text: &str, k: usize) -> Result<QueryResult> {
        let (sql, semantic) =
            tokio::join!(self.sql_items(text, k), self.semantic_items(text, k));

        let items = match (sql, semantic) {
            (Ok(sql), Ok(semantic)) => merge_items(sql, semantic, k),
            (Ok(sql), Err(err)) => {
                warn!("Combined mode degraded to SQL only, semantic branch failed: {err}");
                sql
            }
            (Err(err), Ok(semantic)) => {
                warn!("Combined mode degraded to semantic only, SQL branch failed: {err}");
                semantic
            }
            (Err(first), Err(second)) => {
                warn!("Both combined branches failed, second error: {second}");
                return Err(first);
            }
        };

        Ok(QueryResult {
            mode: Mode::Combined,
            items,
        })
    }

    async fn sql_items(&self, text: &str, k: usize) -> Result<Vec<RetrievedItem>> {
        let query = self.translator.translate(text)?;
        let rows = self.execute_bounded(&query).await?;
        Ok(rows_to_items(rows, k))
    }

    async fn semantic_items(&self, text: &str, k: usize) -> Result<Vec<RetrievedItem>> {
        let hits = self.indexer.query(text, k).await?;
        Ok(hits
            .into_iter()
            .map(|hit| RetrievedItem {
                id: Some(hit.id),
                content: hit.document,
                score: Some(hit.score),
                provenance: Provenance::Semantic,
            })
            .collect())
    }

    /// The store already sets a server-side statement timeout; this outer
    /// bound also covers connection stalls so no request blocks forever.
    async fn execute_bounded(&self, query: &crate::translator::SqlQuery) -> Result<Vec<SqlRow>> {
        let millis = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let outer = self.timeout + Duration::from_millis(500);
        match tokio::time::timeout(outer, self.store.execute(query, self.timeout)).await {
            Ok(result) => result,
            Err(_) => Err(TidepoolError::QueryTimeout(millis)),
        }
    }
}

fn word_present(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token == word)
}

fn rows_to_items(rows: Vec<SqlRow>, k: usize) -> Vec<RetrievedItem> {
    rows.into_iter()
        .take(k)
        .map(|row| RetrievedItem {
            id: row.id(),
            content: row.render(),
            score: None,
            provenance: Provenance::Sql,
        })
        .collect()
}

/// Concatenate SQL results ahead of semantic ones, drop later duplicates of
/// an id already seen, and cap the total at `k`. Items without an id are
/// never considered duplicates.
fn merge_items(
    sql: Vec<RetrievedItem>,
    semantic: Vec<RetrievedItem>,
    k: usize,
) -> Vec<RetrievedItem> {
    let mut seen: HashSet<i64> = HashSet::new();
    sql.into_iter()
        .chain(semantic)
        .filter(|item| match item.id {
            Some(id) => seen.insert(id),
            None => true,
        })
        .take(k)
        .collect()
}
