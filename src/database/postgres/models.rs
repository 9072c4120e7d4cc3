use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{Result, TidepoolError};

/// Raw observation row as fetched from the store. Measurement columns are
/// nullable in the table, so they stay optional here; [`Observation`] is the
/// validated form the indexer works with.
#[derive(Debug, Clone, FromRow)]
pub struct ObservationRow {
    pub id: i64,
    pub timestamp: Option<NaiveDateTime>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub temperature_c: Option<f64>,
    pub day_low_temperature_c: Option<f64>,
    pub day_high_temperature_c: Option<f64>,
    pub pressure_dbar: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub salinity_psu: Option<f64>,
}

/// Immutable observation record carrying all ten structured fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub longitude: f64,
    pub latitude: f64,
    pub temperature_c: f64,
    pub day_low_temperature_c: f64,
    pub day_high_temperature_c: f64,
    pub pressure_dbar: f64,
    pub humidity_percent: f64,
    pub salinity_psu: f64,
}

impl TryFrom<ObservationRow> for Observation {
    type Error = TidepoolError;

    #[inline]
    fn try_from(row: ObservationRow) -> Result<Self> {
        fn field(id: i64, name: &str, value: Option<f64>) -> Result<f64> {
            match value {
                Some(v) if v.is_finite() => Ok(v),
                Some(_) => Err(TidepoolError::MalformedRow(format!(
                    "row {id}: non-finite value in '{name}'"
                ))),
                None => Err(TidepoolError::MalformedRow(format!(
                    "row {id}: missing field '{name}'"
                ))),
            }
        }

        let id = row.id;
        Ok(Self {
            id,
            timestamp: row.timestamp.ok_or_else(|| {
                TidepoolError::MalformedRow(format!("row {id}: missing field 'timestamp'"))
            })?,
            longitude: field(id, "longitude", row.longitude)?,
            latitude: field(id, "latitude", row.latitude)?,
            temperature_c: field(id, "temperature_c", row.temperature_c)?,
            day_low_temperature_c: field(id, "day_low_temperature_c", row.day_low_temperature_c)?,
            day_high_temperature_c: field(
                id,
                "day_high_temperature_c",
                row.day_high_temperature_c,
            )?,
            pressure_dbar: field(id, "pressure_dbar", row.pressure_dbar)?,
            humidity_percent: field(id, "humidity_percent", row.humidity_percent)?,
            salinity_psu: field(id, "salinity_psu", row.salinity_psu)?,
        })
    }
}

/// One row of an arbitrary SELECT result, decoded column-by-column into JSON
/// values so any generated query shape can be serialized for the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SqlRow {
    pub columns: Vec<String>,
    pub values: Vec<serde_json::Value>,
}

impl SqlRow {
    /// Value of the `id` column, when the query selected one.
    #[inline]
    pub fn id(&self) -> Option<i64> {
        self.columns
            .iter()
            .position(|c| c == "id")
            .and_then(|i| self.values.get(i))
            .and_then(serde_json::Value::as_i64)
    }

    /// Compact single-line rendering used as QueryResult content.
    #[inline]
    pub fn render(&self) -> String {
        use itertools::Itertools;
        self.columns
            .iter()
            .zip(self.values.iter())
            .map(|(c, v)| match v {
                serde_json::Value::String(s) => format!("{c}={s}"),
                other => format!("{c}={other}"),
            })
            .join(", ")
    }
}
