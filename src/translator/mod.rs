//! Natural-language to SQL translation.
//!
//! The language model is the only source of query logic; this module seeds
//! it with the schema allow-list, extracts the statement from the response,
//! and refuses to hand anything to the store that is not a single read-only
//! `SELECT` over allow-listed tables. The original scripts executed model
//! output directly; the validation here is not optional.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use fancy_regex::Regex;
use tracing::debug;

use crate::llm::LanguageModel;
use crate::{Result, TidepoolError};

/// Delimiter the model is instructed to emit before the statement. When it
/// is absent the raw output is treated as the query verbatim; validation
/// still applies either way.
pub const SQL_MARKER: &str = "SQLQuery:";

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE", "COPY",
];

/// Explicit allow-list of what generated queries may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub table: String,
    pub columns: Vec<String>,
}

impl SchemaDescriptor {
    /// The ocean observation table this service fronts.
    #[inline]
    pub fn ocean_observations() -> Self {
        Self {
            table: "ocean_observations".to_string(),
            columns: [
                "id",
                "timestamp",
                "longitude",
                "latitude",
                "temperature_c",
                "day_low_temperature_c",
                "day_high_temperature_c",
                "pressure_dbar",
                "humidity_percent",
                "salinity_psu",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }
}

/// A statement that has passed [`validate_statement`]. The store adapter
/// only accepts this type, so unvalidated text cannot reach the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery(String);

impl SqlQuery {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub struct Translator {
    llm: Arc<dyn LanguageModel>,
    schema: SchemaDescriptor,
}

impl Translator {
    #[inline]
    pub fn new(llm: Arc<dyn LanguageModel>, schema: SchemaDescriptor) -> Self {
        Self { llm, schema }
    }

    #[inline]
    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Translate a free-text question into a validated SQL query.
    #[inline]
    pub fn translate(&self, question: &str) -> Result<SqlQuery> {
        let prompt = self.build_prompt(question);
        let raw = self.llm.complete(&prompt)?;
        let candidate = extract_sql(&raw);

        debug!("Model produced candidate statement ({} chars)", candidate.len());

        validate_statement(&candidate, &self.schema)?;
        Ok(SqlQuery(candidate))
    }

    fn build_prompt(&self, question: &str) -> String {
        format!(
            "You translate questions about ocean observations into PostgreSQL.\n\
             The only table available is \"{table}\" with columns: {columns}.\n\
             Write exactly one read-only SELECT statement answering the question.\n\
             Do not modify data. Do not use tables or columns not listed above.\n\
             Respond with the statement on a single line prefixed by \"{marker}\".\n\n\
             Question: {question}",
            table = self.schema.table,
            columns = self.schema.columns.join(", "),
            marker = SQL_MARKER,
        )
    }
}

/// Pull the statement out of a model response.
///
/// Takes everything after the `SQLQuery:` marker when present, otherwise the
/// whole response verbatim. Markdown code fences are stripped in both cases.
#[inline]
pub fn extract_sql(response: &str) -> String {
    let tail = response
        .split_once(SQL_MARKER)
        .map_or(response, |(_, tail)| tail);

    tail.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Reject anything that is not a single read-only `SELECT` against
/// allow-listed tables.
#[inline]
pub fn validate_statement(sql: &str, schema: &SchemaDescriptor) -> Result<()> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Err(TidepoolError::UnsafeQuery(
            "model produced an empty statement".to_string(),
        ));
    }

    // A semicolon after stripping the trailing one means chained statements.
    if trimmed.contains(';') {
        return Err(TidepoolError::UnsafeQuery(
            "chained statements are not allowed".to_string(),
        ));
    }

    let upper = trimmed.to_uppercase();
    if !(upper.starts_with("SELECT") || upper.starts_with("WITH")) {
        return Err(TidepoolError::UnsafeQuery(
            "only SELECT statements are allowed".to_string(),
        ));
    }

    for keyword in FORBIDDEN_KEYWORDS {
        let pattern = format!(r"\b{keyword}\b");
        let re = Regex::new(&pattern)
            .map_err(|e| TidepoolError::Other(anyhow::anyhow!("keyword pattern: {e}")))?;
        if re
            .is_match(&upper)
            .map_err(|e| TidepoolError::Other(anyhow::anyhow!("keyword scan: {e}")))?
        {
            return Err(TidepoolError::UnsafeQuery(format!(
                "statement contains forbidden keyword {keyword}"
            )));
        }
    }

    for table in referenced_tables(trimmed)? {
        let allowed = table.eq_ignore_ascii_case(&schema.table)
            || cte_names(trimmed)?
                .iter()
                .any(|cte| cte.eq_ignore_ascii_case(&table));
        if !allowed {
            return Err(TidepoolError::UnsafeQuery(format!(
                "table '{table}' is not on the allow-list"
            )));
        }
    }

    Ok(())
}

/// Table names appearing in FROM/JOIN clauses.
fn referenced_tables(sql: &str) -> Result<Vec<String>> {
    let re = Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([A-Za-z_][A-Za-z0-9_.]*)")
        .map_err(|e| TidepoolError::Other(anyhow::anyhow!("table pattern: {e}")))?;

    let mut tables = Vec::new();
    for capture in re.captures_iter(sql) {
        let capture = capture.map_err(|e| TidepoolError::Other(anyhow::anyhow!("table scan: {e}")))?;
        if let Some(m) = capture.get(1) {
            tables.push(m.as_str().to_string());
        }
    }
    Ok(tables)
}

/// CTE names introduced by `WITH name AS (...)`; these are legal FROM
/// targets. `name AS (` only occurs at a CTE definition, so matching it
/// anywhere also picks up comma-separated CTEs after a closing paren.
fn cte_names(sql: &str) -> Result<Vec<String>> {
    let re = Regex::new(r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s+AS\s*\(")
        .map_err(|e| TidepoolError::Other(anyhow::anyhow!("cte pattern: {e}")))?;

    let mut names = Vec::new();
    for capture in re.captures_iter(sql) {
        let capture = capture.map_err(|e| TidepoolError::Other(anyhow::anyhow!("cte scan: {e}")))?;
        if let Some(m) = capture.get(1) {
            names.push(m.as_str().to_string());
        }
    }
    Ok(names)
}
