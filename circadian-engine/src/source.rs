//! Time-series source collaborator.
//!
//! The analyzer only needs arrays of timestamps, weights and night flags.
//! This module defines the async interface a time-series store exposes to
//! produce them, plus an in-memory store for tests and embedding.
//!
//! ```text
//! [SeriesSource] --query--> [QueryResult] --records_from--> [ActivityRecords] --> [CycleAnalyzer]
//! ```

use crate::error::{CycleError, Result};
use crate::records::ActivityRecords;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Name of the column every query result carries
pub const TIME_COLUMN: &str = "time";

/// Declared type of a stored field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    String,
    Boolean,
}

/// One stored field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Integer(_) => FieldType::Integer,
            Self::Float(_) => FieldType::Float,
            Self::String(_) => FieldType::String,
            Self::Boolean(_) => FieldType::Boolean,
        }
    }
}

/// Typed result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Time(Vec<DateTime<Utc>>),
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    String(Vec<Option<String>>),
    Boolean(Vec<Option<bool>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Time(v) => v.len(),
            Self::Integer(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Boolean(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric view; missing values become 0
    pub fn as_f64(&self) -> Option<Vec<f64>> {
        match self {
            Self::Integer(v) => Some(v.iter().map(|x| x.unwrap_or(0) as f64).collect()),
            Self::Float(v) => Some(v.iter().map(|x| x.unwrap_or(0.0)).collect()),
            _ => None,
        }
    }

    /// Boolean view; missing values become `false`
    pub fn as_bool(&self) -> Option<Vec<bool>> {
        match self {
            Self::Boolean(v) => Some(v.iter().map(|x| x.unwrap_or(false)).collect()),
            _ => None,
        }
    }
}

/// Range query against one series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    pub series: String,
    /// Fields to return; empty means all
    pub fields: Vec<String>,
    /// Tag filters: a row matches when each tag equals one of the listed values
    pub filters: BTreeMap<String, Vec<String>>,
    /// Inclusive lower bound
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub stop: Option<DateTime<Utc>>,
}

impl Query {
    pub fn new(series: impl Into<String>) -> Self {
        Self {
            series: series.into(),
            ..Self::default()
        }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn filter(mut self, tag: impl Into<String>, values: &[&str]) -> Self {
        self.filters
            .insert(tag.into(), values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn range(mut self, start: Option<DateTime<Utc>>, stop: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }
}

/// Columnar query result keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: BTreeMap<String, Column>,
}

impl QueryResult {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn time(&self) -> Option<&[DateTime<Utc>]> {
        match self.columns.get(TIME_COLUMN) {
            Some(Column::Time(times)) => Some(times),
            _ => None,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.time().map_or(0, |t| t.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Async interface of a time-series store
#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Names of all series
    async fn list_series(&self) -> Result<Vec<String>>;

    /// Tag keys of a series
    async fn list_tags(&self, series: &str) -> Result<Vec<String>>;

    /// Field keys of a series, with their declared types when `with_types`
    async fn list_fields(&self, series: &str, with_types: bool) -> Result<Vec<(String, Option<FieldType>)>>;

    /// Distinct values of one tag
    async fn list_tag_values(&self, series: &str, tag: &str) -> Result<Vec<String>>;

    /// Run a range query
    async fn query(&self, query: &Query) -> Result<QueryResult>;
}

/// One stored point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

impl Point {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time,
            tags: HashMap::new(),
            fields: HashMap::new(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn value(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Default)]
struct StoredSeries {
    points: Vec<Point>,
    field_types: BTreeMap<String, FieldType>,
}

/// In-process store backed by a shared map.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    series: Arc<RwLock<BTreeMap<String, StoredSeries>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append points to a series, fixing each field's type on first sight.
    pub async fn insert(&self, series: &str, points: Vec<Point>) -> Result<()> {
        let mut guard = self.series.write().await;
        let stored = guard.entry(series.to_string()).or_default();

        let mut field_types = stored.field_types.clone();
        for point in &points {
            for (name, value) in &point.fields {
                let declared = *field_types
                    .entry(name.clone())
                    .or_insert_with(|| value.field_type());
                if declared != value.field_type() {
                    return Err(CycleError::SourceError(format!(
                        "field '{}' of series '{}' is {:?}, got {:?}",
                        name,
                        series,
                        declared,
                        value.field_type()
                    )));
                }
            }
        }
        stored.field_types = field_types;
        stored.points.extend(points);
        Ok(())
    }

    fn unknown(series: &str) -> CycleError {
        CycleError::SourceError(format!("unknown series '{}'", series))
    }
}

#[async_trait]
impl SeriesSource for MemorySource {
    async fn list_series(&self) -> Result<Vec<String>> {
        Ok(self.series.read().await.keys().cloned().collect())
    }

    async fn list_tags(&self, series: &str) -> Result<Vec<String>> {
        let guard = self.series.read().await;
        let stored = guard.get(series).ok_or_else(|| Self::unknown(series))?;
        let mut tags: Vec<String> = stored
            .points
            .iter()
            .flat_map(|p| p.tags.keys().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    async fn list_fields(&self, series: &str, with_types: bool) -> Result<Vec<(String, Option<FieldType>)>> {
        let guard = self.series.read().await;
        let stored = guard.get(series).ok_or_else(|| Self::unknown(series))?;
        Ok(stored
            .field_types
            .iter()
            .map(|(name, &ty)| (name.clone(), with_types.then_some(ty)))
            .collect())
    }

    async fn list_tag_values(&self, series: &str, tag: &str) -> Result<Vec<String>> {
        let guard = self.series.read().await;
        let stored = guard.get(series).ok_or_else(|| Self::unknown(series))?;
        let mut values: Vec<String> = stored
            .points
            .iter()
            .filter_map(|p| p.tags.get(tag).cloned())
            .collect();
        values.sort();
        values.dedup();
        Ok(values)
    }

    async fn query(&self, query: &Query) -> Result<QueryResult> {
        let guard = self.series.read().await;
        let stored = guard
            .get(&query.series)
            .ok_or_else(|| Self::unknown(&query.series))?;

        let fields: Vec<(String, FieldType)> = if query.fields.is_empty() {
            stored.field_types.iter().map(|(n, &t)| (n.clone(), t)).collect()
        } else {
            query
                .fields
                .iter()
                .map(|name| {
                    stored
                        .field_types
                        .get(name)
                        .map(|&t| (name.clone(), t))
                        .ok_or_else(|| {
                            CycleError::SourceError(format!(
                                "unknown field '{}' in series '{}'",
                                name, query.series
                            ))
                        })
                })
                .collect::<Result<_>>()?
        };

        let mut rows: Vec<&Point> = stored
            .points
            .iter()
            .filter(|p| query.start.map_or(true, |s| p.time >= s))
            .filter(|p| query.stop.map_or(true, |s| p.time < s))
            .filter(|p| {
                query.filters.iter().all(|(tag, allowed)| {
                    p.tags.get(tag).map_or(false, |v| allowed.contains(v))
                })
            })
            .collect();
        rows.sort_by_key(|p| p.time);

        let mut result = QueryResult::default();
        result.columns.insert(
            TIME_COLUMN.to_string(),
            Column::Time(rows.iter().map(|p| p.time).collect()),
        );
        for (name, ty) in fields {
            let values = rows.iter().map(|p| p.fields.get(&name));
            let column = match ty {
                FieldType::Integer => Column::Integer(
                    values.map(|v| match v {
                        Some(FieldValue::Integer(x)) => Some(*x),
                        _ => None,
                    })
                    .collect(),
                ),
                FieldType::Float => Column::Float(
                    values.map(|v| match v {
                        Some(FieldValue::Float(x)) => Some(*x),
                        _ => None,
                    })
                    .collect(),
                ),
                FieldType::String => Column::String(
                    values.map(|v| match v {
                        Some(FieldValue::String(x)) => Some(x.clone()),
                        _ => None,
                    })
                    .collect(),
                ),
                FieldType::Boolean => Column::Boolean(
                    values.map(|v| match v {
                        Some(FieldValue::Boolean(x)) => Some(*x),
                        _ => None,
                    })
                    .collect(),
                ),
            };
            result.columns.insert(name, column);
        }

        debug!(series = %query.series, rows = result.len(), "query served");
        Ok(result)
    }
}

/// Build activity records from a query result.
///
/// `weight` names a numeric column (unit weights when `None`), `night` a
/// boolean column (all night when `None`).
pub fn records_from(result: &QueryResult, weight: Option<&str>, night: Option<&str>) -> Result<ActivityRecords> {
    let times = result
        .time()
        .ok_or_else(|| CycleError::SourceError("query result has no time column".to_string()))?;
    let mut records = ActivityRecords::new(times.to_vec());

    if let Some(name) = weight {
        let column = result
            .column(name)
            .and_then(Column::as_f64)
            .ok_or_else(|| CycleError::SourceError(format!("'{}' is not a numeric column", name)))?;
        records = records.with_weights(column)?;
    }
    if let Some(name) = night {
        let column = result
            .column(name)
            .and_then(Column::as_bool)
            .ok_or_else(|| CycleError::SourceError(format!("'{}' is not a boolean column", name)))?;
        records = records.with_night(column)?;
    }
    Ok(records)
}

/// Query a source and convert the result into activity records.
pub async fn load_records<S>(
    source: &S,
    query: &Query,
    weight: Option<&str>,
    night: Option<&str>,
) -> Result<ActivityRecords>
where
    S: SeriesSource + ?Sized,
{
    let result = source.query(query).await?;
    records_from(&result, weight, night)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 5, 1, h, 0, 0).unwrap()
    }

    async fn seeded() -> MemorySource {
        let source = MemorySource::new();
        let points = (0..6)
            .map(|h| {
                Point::new(at(h))
                    .tag("cage", if h % 2 == 0 { "a" } else { "b" })
                    .value("count", FieldValue::Integer(h as i64))
                    .value("dark", FieldValue::Boolean(h < 3))
            })
            .collect();
        source.insert("wheel", points).await.unwrap();
        source
    }

    #[tokio::test]
    async fn test_enumeration() {
        let source = seeded().await;
        assert_eq!(source.list_series().await.unwrap(), vec!["wheel"]);
        assert_eq!(source.list_tags("wheel").await.unwrap(), vec!["cage"]);
        assert_eq!(source.list_tag_values("wheel", "cage").await.unwrap(), vec!["a", "b"]);

        let fields = source.list_fields("wheel", true).await.unwrap();
        assert_eq!(
            fields,
            vec![
                ("count".to_string(), Some(FieldType::Integer)),
                ("dark".to_string(), Some(FieldType::Boolean)),
            ]
        );
        assert!(source.list_fields("wheel", false).await.unwrap().iter().all(|(_, t)| t.is_none()));
        assert!(source.list_tags("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_filtered_range_query() {
        let source = seeded().await;
        let query = Query::new("wheel")
            .field("count")
            .filter("cage", &["a"])
            .range(Some(at(1)), Some(at(5)));
        let result = source.query(&query).await.unwrap();

        assert_eq!(result.time().unwrap(), &[at(2), at(4)]);
        assert_eq!(result.column("count"), Some(&Column::Integer(vec![Some(2), Some(4)])));
        assert!(result.column("dark").is_none());
    }

    #[tokio::test]
    async fn test_records_from_query() {
        let source = seeded().await;
        let records = load_records(&source, &Query::new("wheel"), Some("count"), Some("dark"))
            .await
            .unwrap();

        assert_eq!(records.len(), 6);
        assert_eq!(records.weights(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(records.night(), &[true, true, true, false, false, false]);

        let err = load_records(&source, &Query::new("wheel"), Some("dark"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CycleError::SourceError(_)));
    }

    #[tokio::test]
    async fn test_field_type_conflict() {
        let source = seeded().await;
        let bad = vec![Point::new(at(7)).value("count", FieldValue::Float(1.5))];
        assert!(source.insert("wheel", bad).await.is_err());
    }
}
