// Ingest module
// Loads the oceanographic CSV dataset into the PostGIS-backed table

use std::path::Path;

use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{info, warn};

use crate::database::postgres::DbPool;
use crate::translator::SchemaDescriptor;
use crate::{Result, TidepoolError};


const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// One CSV line of the source dataset. Field names match the CSV header and
/// the table columns.
#[derive(Debug, Clone, Deserialize)]
pub struct CsvObservation {
    pub timestamp: String,
    pub longitude: f64,
    pub latitude: f64,
    pub temperature_c: f64,
    pub day_low_temperature_c: f64,
    pub day_high_temperature_c: f64,
    pub pressure_dbar: f64,
    pub humidity_percent: f64,
    pub salinity_psu: f64,
}

impl CsvObservation {
    /// Parse the timestamp column; both space- and T-separated forms occur
    /// in the source datasets.
    #[inline]
    pub fn parsed_timestamp(&self) -> Result<NaiveDateTime> {
        for format in TIMESTAMP_FORMATS {
            if let Ok(ts) = NaiveDateTime::parse_from_str(&self.timestamp, format) {
                return Ok(ts);
            }
        }
        Err(TidepoolError::MalformedRow(format!(
            "unparseable timestamp '{}'",
            self.timestamp
        )))
    }

    fn validate(&self, line: usize) -> Result<()> {
        self.parsed_timestamp()
            .map_err(|e| TidepoolError::MalformedRow(format!("line {line}: {e}")))?;
        let fields = [
            ("longitude", self.longitude),
            ("latitude", self.latitude),
            ("temperature_c", self.temperature_c),
            ("day_low_temperature_c", self.day_low_temperature_c),
            ("day_high_temperature_c", self.day_high_temperature_c),
            ("pressure_dbar", self.pressure_dbar),
            ("humidity_percent", self.humidity_percent),
            ("salinity_psu", self.salinity_psu),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(TidepoolError::MalformedRow(format!(
                    "line {line}: non-finite value in '{name}'"
                )));
            }
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(TidepoolError::MalformedRow(format!(
                "line {line}: longitude {} out of range",
                self.longitude
            )));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(TidepoolError::MalformedRow(format!(
                "line {line}: latitude {} out of range",
                self.latitude
            )));
        }
        Ok(())
    }
}

/// Outcome of a completed load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub rows_loaded: usize,
}

/// Read and validate the whole CSV before anything touches the database.
/// Line numbers in errors count the header as line 1.
#[inline]
pub fn read_csv(path: &Path) -> Result<Vec<CsvObservation>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| TidepoolError::MalformedRow(format!("cannot open {}: {e}", path.display())))?;

    let mut rows = Vec::new();
    for (i, record) in reader.deserialize::<CsvObservation>().enumerate() {
        let line = i + 2;
        let row =
            record.map_err(|e| TidepoolError::MalformedRow(format!("line {line}: {e}")))?;
        row.validate(line)?;
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(TidepoolError::MalformedRow(format!(
            "{} contains no data rows",
            path.display()
        )));
    }
    Ok(rows)
}

/// Recreate the observation table and insert every row in one transaction.
/// The geometry column is derived from longitude/latitude at insert time, so
/// the CSV never carries WKT.
#[inline]
pub async fn load_observations(
    pool: &DbPool,
    schema: &SchemaDescriptor,
    rows: &[CsvObservation],
) -> Result<LoadStats> {
    ensure_postgis(pool).await;

    let table = &schema.table;
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| TidepoolError::Database(e.to_string()))?;

    sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
        .execute(&mut *tx)
        .await
        .map_err(|e| TidepoolError::Database(e.to_string()))?;

    sqlx::query(&format!(
        "CREATE TABLE {table} (
            id SERIAL PRIMARY KEY,
            timestamp TIMESTAMP,
            longitude FLOAT,
            latitude FLOAT,
            temperature_c FLOAT,
            day_low_temperature_c FLOAT,
            day_high_temperature_c FLOAT,
            pressure_dbar FLOAT,
            humidity_percent FLOAT,
            salinity_psu FLOAT,
            geom GEOMETRY(Point, 4326)
        )"
    ))
    .execute(&mut *tx)
    .await
    .map_err(|e| TidepoolError::Database(e.to_string()))?;

    let insert = format!(
        "INSERT INTO {table} (timestamp, longitude, latitude, temperature_c, \
         day_low_temperature_c, day_high_temperature_c, pressure_dbar, \
         humidity_percent, salinity_psu, geom) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
         ST_SetSRID(ST_MakePoint($2, $3), 4326))"
    );

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(rows.len() as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Loading observations")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };

    for row in rows {
        let ts = row.parsed_timestamp()?;
        sqlx::query(&insert)
            .bind(ts)
            .bind(row.longitude)
            .bind(row.latitude)
            .bind(row.temperature_c)
            .bind(row.day_low_temperature_c)
            .bind(row.day_high_temperature_c)
            .bind(row.pressure_dbar)
            .bind(row.humidity_percent)
            .bind(row.salinity_psu)
            .execute(&mut *tx)
            .await
            .map_err(|e| TidepoolError::Database(e.to_string()))?;
        bar.inc(1);
    }
    bar.finish_and_clear();

    tx.commit()
        .await
        .map_err(|e| TidepoolError::Database(e.to_string()))?;

    info!("Loaded {} observations into {table}", rows.len());
    Ok(LoadStats {
        rows_loaded: rows.len(),
    })
}

/// PostGIS must exist for the geometry column. Creating the extension needs
/// superuser rights on some setups, so a failure is logged rather than
/// fatal; table creation will still fail loudly if the type is absent.
async fn ensure_postgis(pool: &DbPool) {
    if let Err(e) = sqlx::query("CREATE EXTENSION IF NOT EXISTS postgis")
        .execute(pool)
        .await
    {
        warn!("Could not ensure PostGIS extension: {e}");
    }
}
