//! Sliding-window quantile reservoir
//!
//! Observations go into a ring of `age_buckets` sub-windows. The ring advances
//! one position every `max_age / age_buckets`, clearing the bucket it moves
//! into, so the union of all buckets approximates the last `max_age` of
//! observations. Eviction happens in whole sub-window steps.
//!
//! Rotation is decided against the caller-supplied monotonic time on every
//! `add` and `snapshot`, which keeps the window deterministic under a manual
//! clock and avoids a timer per reservoir.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Default)]
struct Bucket {
    count: u64,
    samples: Vec<f64>,
}

impl Bucket {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.samples.push(value);
    }

    fn clear(&mut self) {
        self.count = 0;
        self.samples.clear();
    }
}

/// Statistics over the current window
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuantileSnapshot {
    /// Number of samples in the window
    pub count: u64,
    pub min: Option<f64>,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub std_dev: Option<f64>,
    pub max: Option<f64>,
    /// `(quantile, value)` in ascending quantile order
    pub quantiles: Vec<(f64, Option<f64>)>,
}

/// Ring-buffer reservoir backing histogram quantiles
#[derive(Debug, Clone)]
pub struct TimeWindowQuantiles {
    quantiles: Vec<f64>,
    max_age: Duration,
    ring: Vec<Bucket>,
    current: usize,
    last_rotation: Duration,
    dirty: bool,
    last_snapshot: Option<QuantileSnapshot>,
}

impl TimeWindowQuantiles {
    /// Create an empty window whose first sub-window starts at `now`
    pub fn new(quantiles: &[f64], max_age: Duration, age_buckets: usize, now: Duration) -> Self {
        let mut quantiles = quantiles.to_vec();
        quantiles.sort_by(f64::total_cmp);
        quantiles.dedup();

        Self {
            quantiles,
            max_age,
            ring: vec![Bucket::default(); age_buckets.max(1)],
            current: 0,
            last_rotation: now,
            dirty: true,
            last_snapshot: None,
        }
    }

    pub fn quantiles(&self) -> &[f64] {
        &self.quantiles
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn age_buckets(&self) -> usize {
        self.ring.len()
    }

    /// Length of one ring position
    pub fn slot_duration(&self) -> Duration {
        self.max_age / self.ring.len() as u32
    }

    /// Number of samples currently in the window
    pub fn len(&self) -> u64 {
        self.ring.iter().map(|b| b.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance the ring for every whole slot elapsed since the last rotation
    ///
    /// Returns `true` when at least one rotation happened.
    pub fn rotate(&mut self, now: Duration) -> bool {
        let slot = self.slot_duration().as_nanos();
        if slot == 0 {
            return false;
        }
        let steps = now.saturating_sub(self.last_rotation).as_nanos() / slot;
        if steps == 0 {
            return false;
        }

        let size = self.ring.len();
        let clears = steps.min(size as u128) as usize;
        for i in 1..=clears {
            let index = (self.current + i) % size;
            self.ring[index].clear();
        }
        self.current = ((self.current as u128 + steps) % size as u128) as usize;

        let advanced = slot.saturating_mul(steps).min(u64::MAX as u128) as u64;
        self.last_rotation += Duration::from_nanos(advanced);
        self.dirty = true;
        true
    }

    /// Add an observation to the current sub-window
    pub fn add(&mut self, value: f64, now: Duration) {
        self.rotate(now);
        self.ring[self.current].add(value);
        self.dirty = true;
    }

    /// Statistics over the window, recomputed only when it changed
    pub fn snapshot(&mut self, now: Duration) -> QuantileSnapshot {
        self.rotate(now);
        if !self.dirty {
            if let Some(cached) = &self.last_snapshot {
                return cached.clone();
            }
        }

        let snapshot = self.compute();
        self.last_snapshot = Some(snapshot.clone());
        self.dirty = false;
        snapshot
    }

    fn compute(&self) -> QuantileSnapshot {
        let mut samples: Vec<f64> = self
            .ring
            .iter()
            .flat_map(|b| b.samples.iter().copied())
            .collect();
        samples.sort_by(f64::total_cmp);

        let n = samples.len();
        let quantiles = self
            .quantiles
            .iter()
            .map(|&q| (q, nearest_rank(&samples, q)))
            .collect();

        if n == 0 {
            return QuantileSnapshot {
                quantiles,
                ..Default::default()
            };
        }

        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;

        QuantileSnapshot {
            count: n as u64,
            min: samples.first().copied(),
            mean: Some(mean),
            variance: Some(variance),
            std_dev: Some(variance.sqrt()),
            max: samples.last().copied(),
            quantiles,
        }
    }
}

/// Nearest-rank estimate over sorted samples
fn nearest_rank(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    if q <= 0.0 {
        return sorted.first().copied();
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted.get(rank.clamp(1, sorted.len()) - 1).copied()
}
