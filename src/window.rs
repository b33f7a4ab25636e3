//! Partitioned window functions.
//!
//! This module is the reusable core behind the ranked analytics: given a
//! dataset, a partition key and a multi-key ordering, it assigns 1-based
//! ranks within each partition and looks up values from the preceding row
//! (lag). "Extreme point per user" and "distance between consecutive points
//! per day" both reduce to this one primitive, so tie-break and ordering
//! semantics are implemented exactly once.
//!
//! Sorting is O(n log n) per partition; rank and lag assignment are O(n)
//! afterwards. Partitions are independent, which is the fork point for the
//! `parallel` feature.
//!
//! ## Example
//! ```rust
//! use trajectory_stats::{rank, Direction, WindowSpec};
//! use trajectory_stats::{normalize_dataset, RawPoint};
//!
//! let points = normalize_dataset(&[
//!     RawPoint::new(1, 39.9, 116.4, 55.0, 39448.5),
//!     RawPoint::new(1, 40.1, 116.4, 60.0, 39448.6),
//! ]);
//!
//! let spec = WindowSpec::new(&["user_id"], &[("latitude", Direction::Desc)]).unwrap();
//! let ranked = rank(&points, &spec);
//! assert_eq!(ranked[0].rank, 1);
//! assert_eq!(ranked[0].row.latitude, 40.1);
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::PointRecord;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Datasets below this size are processed sequentially even when the
/// `parallel` feature is enabled.
#[cfg(feature = "parallel")]
pub(crate) const PARALLEL_THRESHOLD: usize = 10_000;

// ============================================================================
// Field Values
// ============================================================================

/// A single comparable cell value extracted from a row.
///
/// Floats compare via `total_cmp`, so every pair of values has a
/// deterministic order and multi-key comparisons never panic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl FieldValue {
    fn type_rank(&self) -> u8 {
        match self {
            FieldValue::Int(_) => 0,
            FieldValue::Float(_) => 1,
            FieldValue::Text(_) => 2,
            FieldValue::Date(_) => 3,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldValue {}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.total_cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Date(a), FieldValue::Date(b)) => a.cmp(b),
            // Mixed types only occur across differently-typed specs
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{}", v),
            FieldValue::Date(v) => write!(f, "{}", v),
        }
    }
}

// ============================================================================
// Rows
// ============================================================================

/// A record with named, extractable fields.
///
/// Implementors expose their schema through [`Row::field_names`] so that
/// partition and ordering specs can be validated before any data is
/// processed.
pub trait Row: Clone {
    /// The names this row type resolves, including derived fields.
    fn field_names() -> &'static [&'static str];

    /// Extract one field by name; `None` only for names outside the schema.
    fn field(&self, name: &str) -> Option<FieldValue>;
}

impl Row for PointRecord {
    fn field_names() -> &'static [&'static str] {
        &[
            "user_id",
            "latitude",
            "longitude",
            "altitude",
            "raw_timestamp",
            "timezone_offset",
            "adjusted_timestamp",
            "adjusted_date",
            "adjusted_time",
            "iso_week",
        ]
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "user_id" => Some(FieldValue::Int(self.user_id as i64)),
            "latitude" => Some(FieldValue::Float(self.latitude)),
            "longitude" => Some(FieldValue::Float(self.longitude)),
            "altitude" => Some(FieldValue::Float(self.altitude)),
            "raw_timestamp" => Some(FieldValue::Float(self.raw_timestamp)),
            "timezone_offset" => Some(FieldValue::Int(self.timezone_offset as i64)),
            "adjusted_timestamp" => Some(FieldValue::Float(self.adjusted_timestamp)),
            "adjusted_date" => Some(FieldValue::Date(self.adjusted_date)),
            "adjusted_time" => Some(FieldValue::Text(self.adjusted_time.to_string())),
            // Derived: ISO week number of the local date (1-53, year-agnostic)
            "iso_week" => Some(FieldValue::Int(self.adjusted_date.iso_week().week() as i64)),
            _ => None,
        }
    }
}

// ============================================================================
// Window Specs
// ============================================================================

/// Sort direction for one ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

/// One (field, direction) ordering key.
#[derive(Debug, Clone)]
pub struct OrderKey {
    pub field: String,
    pub direction: Direction,
}

/// A validated partition-by + order-by specification for rows of type `T`.
///
/// Construction fails fast with [`AnalyticsError::InvalidPartitionKey`]
/// when any named field is absent from `T`'s schema, so a misconfigured
/// query aborts before touching data.
#[derive(Debug, Clone)]
pub struct WindowSpec<T: Row> {
    partition: Vec<String>,
    order: Vec<OrderKey>,
    _row: PhantomData<T>,
}

impl<T: Row> WindowSpec<T> {
    /// Build a spec from partition field names and (field, direction)
    /// ordering keys. Later ordering keys break ties of earlier ones.
    pub fn new(partition: &[&str], order: &[(&str, Direction)]) -> Result<Self> {
        for field in partition.iter().chain(order.iter().map(|(f, _)| f)) {
            validate_field::<T>(field)?;
        }
        Ok(Self {
            partition: partition.iter().map(|f| f.to_string()).collect(),
            order: order
                .iter()
                .map(|(f, d)| OrderKey {
                    field: f.to_string(),
                    direction: *d,
                })
                .collect(),
            _row: PhantomData,
        })
    }

    fn partition_key(&self, row: &T) -> Vec<FieldValue> {
        self.partition.iter().filter_map(|f| row.field(f)).collect()
    }

    fn compare(&self, a: &T, b: &T) -> Ordering {
        for key in &self.order {
            let ord = a.field(&key.field).cmp(&b.field(&key.field));
            let ord = match key.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

pub(crate) fn validate_field<T: Row>(field: &str) -> Result<()> {
    if T::field_names().contains(&field) {
        Ok(())
    } else {
        Err(AnalyticsError::InvalidPartitionKey {
            field: field.to_string(),
            row_type: std::any::type_name::<T>(),
        })
    }
}

// ============================================================================
// Window Functions
// ============================================================================

/// A row tagged with its 1-based rank inside its partition.
#[derive(Debug, Clone)]
pub struct Ranked<T> {
    pub row: T,
    pub rank: u32,
}

/// A row paired with a value extracted from its in-order predecessor,
/// or `None` for the first row of its partition.
#[derive(Debug, Clone)]
pub struct Lagged<T, V> {
    pub row: T,
    pub prev: Option<V>,
}

/// Split rows into partitions, each keeping its input order, with
/// partitions themselves in ascending key order.
fn partitions<T: Row>(rows: &[T], spec: &WindowSpec<T>) -> Vec<(Vec<FieldValue>, Vec<T>)> {
    let mut map: BTreeMap<Vec<FieldValue>, Vec<T>> = BTreeMap::new();
    for row in rows {
        map.entry(spec.partition_key(row))
            .or_default()
            .push(row.clone());
    }
    map.into_iter().collect()
}

fn sorted_partitions<T: Row>(rows: &[T], spec: &WindowSpec<T>) -> Vec<(Vec<FieldValue>, Vec<T>)> {
    let mut parts = partitions(rows, spec);
    // Stable sort: rows with equal ordering keys keep input order, so tie
    // ranks are deterministic
    for (_, part) in parts.iter_mut() {
        part.sort_by(|a, b| spec.compare(a, b));
    }
    parts
}

#[cfg(feature = "parallel")]
fn sorted_partitions_parallel<T: Row + Send + Sync>(
    rows: &[T],
    spec: &WindowSpec<T>,
) -> Vec<(Vec<FieldValue>, Vec<T>)> {
    let mut parts = partitions(rows, spec);
    parts
        .par_iter_mut()
        .for_each(|(_, part)| part.sort_by(|a, b| spec.compare(a, b)));
    parts
}

/// Assign each row a 1-based rank within its partition according to the
/// spec's ordering. Ranks form a contiguous `1..=k` sequence per partition;
/// ties receive strictly increasing ranks in input order.
///
/// Output is ordered by partition key, then rank.
pub fn rank<T: Row>(rows: &[T], spec: &WindowSpec<T>) -> Vec<Ranked<T>> {
    rank_sorted(sorted_partitions(rows, spec))
}

/// Parallel variant of [`rank`]: partitions are sorted on rayon workers and
/// merged in deterministic key order. Falls back to sequential for small
/// datasets.
#[cfg(feature = "parallel")]
pub fn rank_parallel<T: Row + Send + Sync>(rows: &[T], spec: &WindowSpec<T>) -> Vec<Ranked<T>> {
    if rows.len() < PARALLEL_THRESHOLD {
        return rank(rows, spec);
    }
    rank_sorted(sorted_partitions_parallel(rows, spec))
}

fn rank_sorted<T>(parts: Vec<(Vec<FieldValue>, Vec<T>)>) -> Vec<Ranked<T>> {
    let mut out = Vec::new();
    for (_, part) in parts {
        for (i, row) in part.into_iter().enumerate() {
            out.push(Ranked {
                row,
                rank: (i + 1) as u32,
            });
        }
    }
    out
}

/// For each row, extract a value from the immediately preceding row of its
/// partition under the spec's ordering. The first row of every partition
/// gets `None`.
pub fn lag<T: Row, V, F>(rows: &[T], spec: &WindowSpec<T>, extract: F) -> Vec<Lagged<T, V>>
where
    F: Fn(&T) -> V,
{
    lag_sorted(sorted_partitions(rows, spec), extract)
}

/// Parallel variant of [`lag`]; same fallback rules as [`rank_parallel`].
#[cfg(feature = "parallel")]
pub fn lag_parallel<T, V, F>(rows: &[T], spec: &WindowSpec<T>, extract: F) -> Vec<Lagged<T, V>>
where
    T: Row + Send + Sync,
    F: Fn(&T) -> V,
{
    if rows.len() < PARALLEL_THRESHOLD {
        return lag(rows, spec, extract);
    }
    lag_sorted(sorted_partitions_parallel(rows, spec), extract)
}

fn lag_sorted<T, V, F>(parts: Vec<(Vec<FieldValue>, Vec<T>)>, extract: F) -> Vec<Lagged<T, V>>
where
    F: Fn(&T) -> V,
{
    let mut out = Vec::new();
    for (_, part) in parts {
        let mut prev: Option<V> = None;
        for row in part {
            let next_prev = Some(extract(&row));
            out.push(Lagged { row, prev });
            prev = next_prev;
        }
    }
    out
}

/// The top-ranked row of each partition (`rank == 1`), in partition key
/// order. Empty partitions contribute nothing.
pub fn top_per_partition<T: Row>(rows: &[T], spec: &WindowSpec<T>) -> Vec<T> {
    rank(rows, spec)
        .into_iter()
        .filter(|r| r.rank == 1)
        .map(|r| r.row)
        .collect()
}
