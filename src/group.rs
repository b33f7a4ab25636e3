//! Grouped aggregation with second-level rollups.
//!
//! Given a dataset, a group-by key and a reducer (count, sum, max, min, or
//! max-minus-min span), this module produces one output row per distinct
//! key. First-level results can be post-filtered (`having`-style, plain
//! slice filtering on the aggregate value) and re-grouped by a subset of
//! their key for two-stage analyses like "how many dates per user had more
//! than N points".
//!
//! Output rows come back in ascending key order, which is deterministic but
//! NOT the display order; callers apply [`sort_by_measure_desc`] (measure
//! descending, key ascending as tie-break) before truncating to a top-N.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use crate::error::{AnalyticsError, Result};
use crate::window::{validate_field, FieldValue, Row};

#[cfg(feature = "parallel")]
use crate::window::PARALLEL_THRESHOLD;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Reducer applied to each group of rows.
#[derive(Debug, Clone)]
pub enum Aggregate {
    /// Number of rows in the group
    Count,
    /// Sum of a numeric field
    Sum(String),
    /// Maximum of a numeric field
    Max(String),
    /// Minimum of a numeric field
    Min(String),
    /// Max minus min of a numeric field (always non-negative)
    Span(String),
}

impl Aggregate {
    fn field(&self) -> Option<&str> {
        match self {
            Aggregate::Count => None,
            Aggregate::Sum(f) | Aggregate::Max(f) | Aggregate::Min(f) | Aggregate::Span(f) => {
                Some(f)
            }
        }
    }
}

/// Reducer for second-level aggregation over [`GroupRow`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollup {
    Count,
    Sum,
    Max,
    Min,
}

/// A validated group-by key for rows of type `T`.
///
/// Like window specs, construction fails fast with
/// [`AnalyticsError::InvalidPartitionKey`] on unknown field names.
#[derive(Debug, Clone)]
pub struct GroupSpec<T: Row> {
    keys: Vec<String>,
    _row: PhantomData<T>,
}

impl<T: Row> GroupSpec<T> {
    pub fn new(keys: &[&str]) -> Result<Self> {
        for field in keys {
            validate_field::<T>(field)?;
        }
        Ok(Self {
            keys: keys.iter().map(|f| f.to_string()).collect(),
            _row: PhantomData,
        })
    }

    fn key(&self, row: &T) -> Vec<FieldValue> {
        self.keys.iter().filter_map(|f| row.field(f)).collect()
    }
}

/// One aggregated output row: the distinct key values plus the reduced
/// measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub keys: Vec<FieldValue>,
    pub value: f64,
}

/// Streaming accumulator shared by all reducers.
#[derive(Debug, Clone, Copy)]
struct Acc {
    count: u64,
    numeric: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for Acc {
    fn default() -> Self {
        Self {
            count: 0,
            numeric: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Acc {
    fn update(&mut self, value: Option<f64>) {
        self.count += 1;
        if let Some(x) = value {
            self.numeric += 1;
            self.sum += x;
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
    }

    #[cfg(feature = "parallel")]
    fn merge(mut self, other: Acc) -> Acc {
        self.count += other.count;
        self.numeric += other.numeric;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self
    }

    fn finish(&self, agg: &Aggregate) -> f64 {
        if self.numeric == 0 && !matches!(agg, Aggregate::Count) {
            return 0.0;
        }
        match agg {
            Aggregate::Count => self.count as f64,
            Aggregate::Sum(_) => self.sum,
            Aggregate::Max(_) => self.max,
            Aggregate::Min(_) => self.min,
            Aggregate::Span(_) => self.max - self.min,
        }
    }
}

/// Group rows by the spec's key and reduce each group.
///
/// Output is in ascending key order. Groups that end up with zero rows
/// simply do not appear; they are not an error.
pub fn group_by<T: Row>(rows: &[T], spec: &GroupSpec<T>, agg: &Aggregate) -> Result<Vec<GroupRow>> {
    if let Some(field) = agg.field() {
        validate_field::<T>(field)?;
    }

    let mut map: BTreeMap<Vec<FieldValue>, Acc> = BTreeMap::new();
    for row in rows {
        let value = agg
            .field()
            .and_then(|f| row.field(f))
            .and_then(|v| v.as_f64());
        map.entry(spec.key(row)).or_default().update(value);
    }

    Ok(map
        .into_iter()
        .map(|(keys, acc)| GroupRow {
            keys,
            value: acc.finish(agg),
        })
        .collect())
}

/// Parallel variant of [`group_by`]: rows are folded into per-worker maps
/// and merged. Falls back to sequential for small datasets.
#[cfg(feature = "parallel")]
pub fn group_by_parallel<T: Row + Send + Sync>(
    rows: &[T],
    spec: &GroupSpec<T>,
    agg: &Aggregate,
) -> Result<Vec<GroupRow>> {
    if rows.len() < PARALLEL_THRESHOLD {
        return group_by(rows, spec, agg);
    }
    if let Some(field) = agg.field() {
        validate_field::<T>(field)?;
    }

    let map = rows
        .par_iter()
        .fold(
            BTreeMap::<Vec<FieldValue>, Acc>::new,
            |mut map, row| {
                let value = agg
                    .field()
                    .and_then(|f| row.field(f))
                    .and_then(|v| v.as_f64());
                map.entry(spec.key(row)).or_default().update(value);
                map
            },
        )
        .reduce(BTreeMap::new, |mut left, right| {
            for (key, acc) in right {
                let entry = left.entry(key).or_default();
                *entry = entry.merge(acc);
            }
            left
        });

    Ok(map
        .into_iter()
        .map(|(keys, acc)| GroupRow {
            keys,
            value: acc.finish(agg),
        })
        .collect())
}

/// Second-level aggregation: re-key first-level rows by a subset of their
/// key (by index) and reduce their values.
pub fn regroup(rows: &[GroupRow], key_indices: &[usize], rollup: Rollup) -> Result<Vec<GroupRow>> {
    let mut map: BTreeMap<Vec<FieldValue>, Acc> = BTreeMap::new();
    for row in rows {
        // Rows from group_by always carry uniform keys, but callers may
        // assemble their own; validate every row rather than the first.
        let key: Vec<FieldValue> = key_indices
            .iter()
            .map(|&i| {
                row.keys.get(i).cloned().ok_or_else(|| AnalyticsError::InvalidPartitionKey {
                    field: format!("key[{}]", i),
                    row_type: "GroupRow",
                })
            })
            .collect::<Result<_>>()?;
        map.entry(key).or_default().update(Some(row.value));
    }

    Ok(map
        .into_iter()
        .map(|(keys, acc)| {
            let value = match rollup {
                Rollup::Count => acc.count as f64,
                Rollup::Sum => acc.sum,
                Rollup::Max => acc.max,
                Rollup::Min => acc.min,
            };
            GroupRow { keys, value }
        })
        .collect())
}

/// The engine-wide deterministic display ordering: measure descending,
/// key ascending as tie-break.
pub fn sort_by_measure_desc(rows: &mut [GroupRow]) {
    rows.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.keys.cmp(&b.keys)));
}
