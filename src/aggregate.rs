//! Per-key aggregation of records.
//!
//! Two modes:
//! - counting: every `add` bumps the bucket count (or adds a pre-aggregated
//!   count via `add_count`), no samples are kept.
//! - statistical: every `add` carries a numeric sample; count/sum/min/max
//!   update in O(1) and samples are retained for an exact median.
//!
//! Buckets merge associatively, so aggregators built over disjoint shards of
//! an input can be combined afterwards. The binary analyses one input in a
//! single pass, so the merge half of the API is only driven by tests.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Counting,
    Statistical,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateError {
    /// Statistical mode needs a sample on every add.
    MissingSample { key: String },
    NonFiniteSample { key: String, value: f64 },
    /// A bare count would break `count == samples.len()`.
    CountWithoutSample { key: String },
    CountOverflow { key: String },
    #[cfg_attr(not(test), allow(dead_code))]
    ModeMismatch { left: Mode, right: Mode },
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateError::MissingSample { key } => {
                write!(f, "no numeric sample for '{key}' in statistical mode")
            }
            AggregateError::NonFiniteSample { key, value } => {
                write!(f, "non-finite sample {value} for '{key}'")
            }
            AggregateError::CountWithoutSample { key } => {
                write!(f, "cannot add a bare count to '{key}' in statistical mode")
            }
            AggregateError::CountOverflow { key } => {
                write!(f, "occurrence count for '{key}' overflows")
            }
            AggregateError::ModeMismatch { left, right } => {
                write!(f, "cannot merge {left:?} aggregator with {right:?} aggregator")
            }
        }
    }
}

impl std::error::Error for AggregateError {}

/// Running aggregate for one key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bucket {
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    samples: Vec<f64>,
}

impl Bucket {
    pub fn count(&self) -> u64 {
        self.count
    }

    fn observe(&mut self, sample: f64) {
        self.count += 1;
        self.sum += sample;
        self.min = Some(self.min.map_or(sample, |m| m.min(sample)));
        self.max = Some(self.max.map_or(sample, |m| m.max(sample)));
        self.samples.push(sample);
    }
}

#[cfg_attr(not(test), allow(dead_code))]
impl Bucket {
    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Combine two buckets. Counts and sums add, extrema take the extreme of
    /// both, samples concatenate (`self` first). The count saturates;
    /// [`Aggregator::merge`] rejects overflowing merges before calling this.
    pub fn merge(mut self, other: Bucket) -> Bucket {
        self.count = self.count.saturating_add(other.count);
        self.sum += other.sum;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.samples.extend(other.samples);
        self
    }
}

/// Median of the samples, averaging the two central values for even lengths.
pub fn median(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Finalized statistics for one key.
///
/// `average` and `median` are only present for statistical buckets that saw
/// at least one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub average: Option<f64>,
    pub median: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<f64>,
}

impl Summary {
    fn from_bucket(bucket: Bucket, mode: Mode) -> Self {
        let (average, median) = match mode {
            Mode::Statistical if bucket.count > 0 => (
                Some(bucket.sum / bucket.count as f64),
                median(&bucket.samples),
            ),
            _ => (None, None),
        };
        Summary {
            count: bucket.count,
            sum: bucket.sum,
            min: bucket.min,
            max: bucket.max,
            average,
            median,
            samples: bucket.samples,
        }
    }
}

/// Groups samples by key. Buckets are created on first use and never removed.
#[derive(Debug, Clone)]
pub struct Aggregator {
    mode: Mode,
    buckets: HashMap<String, Bucket>,
}

impl Aggregator {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            buckets: HashMap::new(),
        }
    }

    pub fn counting() -> Self {
        Self::new(Mode::Counting)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn get(&self, key: &str) -> Option<&Bucket> {
        self.buckets.get(key)
    }

    fn bucket_mut(&mut self, key: &str) -> &mut Bucket {
        self.buckets.entry(key.to_string()).or_default()
    }

    /// Record one occurrence of `key`.
    ///
    /// In counting mode the sample is ignored. In statistical mode it is
    /// required and must be finite; on error the aggregator is unchanged.
    pub fn add(&mut self, key: &str, sample: Option<f64>) -> Result<(), AggregateError> {
        match self.mode {
            Mode::Counting => self.add_count(key, 1),
            Mode::Statistical => {
                let sample = sample.ok_or_else(|| AggregateError::MissingSample {
                    key: key.to_string(),
                })?;
                if !sample.is_finite() {
                    return Err(AggregateError::NonFiniteSample {
                        key: key.to_string(),
                        value: sample,
                    });
                }
                self.bucket_mut(key).observe(sample);
                Ok(())
            }
        }
    }

    /// Add an externally pre-aggregated occurrence count to `key`.
    ///
    /// Counting mode only. On error the aggregator is unchanged.
    pub fn add_count(&mut self, key: &str, n: u64) -> Result<(), AggregateError> {
        if self.mode == Mode::Statistical {
            return Err(AggregateError::CountWithoutSample {
                key: key.to_string(),
            });
        }
        let current = self.buckets.get(key).map_or(0, |b| b.count);
        let total = current
            .checked_add(n)
            .ok_or_else(|| AggregateError::CountOverflow {
                key: key.to_string(),
            })?;
        self.bucket_mut(key).count = total;
        Ok(())
    }

    /// Create an empty bucket for `key` so it is reported even when nothing
    /// is ever added to it.
    pub fn ensure(&mut self, key: &str) {
        self.bucket_mut(key);
    }

    /// Plain occurrence counts per key.
    pub fn counts(&self) -> HashMap<String, u64> {
        self.buckets
            .iter()
            .map(|(k, b)| (k.clone(), b.count))
            .collect()
    }

    pub fn finalize(self) -> HashMap<String, Summary> {
        let mode = self.mode;
        self.buckets
            .into_iter()
            .map(|(k, b)| (k, Summary::from_bucket(b, mode)))
            .collect()
    }
}

#[cfg_attr(not(test), allow(dead_code))]
impl Aggregator {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Combine another aggregator into this one, key by key. On error the
    /// aggregator is unchanged.
    pub fn merge(&mut self, other: Aggregator) -> Result<(), AggregateError> {
        if self.mode != other.mode {
            return Err(AggregateError::ModeMismatch {
                left: self.mode,
                right: other.mode,
            });
        }
        for (key, bucket) in &other.buckets {
            let current = self.buckets.get(key).map_or(0, |b| b.count);
            if current.checked_add(bucket.count).is_none() {
                return Err(AggregateError::CountOverflow { key: key.clone() });
            }
        }
        for (key, bucket) in other.buckets {
            let merged = match self.buckets.remove(&key) {
                Some(existing) => existing.merge(bucket),
                None => bucket,
            };
            self.buckets.insert(key, merged);
        }
        Ok(())
    }
}
