//! Reservoir sample with global extremes
//!
//! Keeps a uniform random subset of at most `capacity` observations (Algorithm R) while
//! tracking count, min and max over every observation ever added.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Default reservoir size
pub const DEFAULT_SAMPLE_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct StreamingSample {
    capacity: usize,
    samples: Vec<f64>,
    count: u64,
    min: f64,
    max: f64,
    rng: StdRng,
}

/// Evenly spaced partition of `[min, max]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleHistogram {
    pub buckets: Vec<u64>,
    pub min: f64,
    pub max: f64,
    pub bucket_width: f64,
}

impl SampleHistogram {
    /// Lower bound of bucket `index`
    pub fn bucket_start(&self, index: usize) -> f64 {
        self.min + self.bucket_width * index as f64
    }
}

impl Default for StreamingSample {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SAMPLE_CAPACITY)
    }
}

impl StreamingSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of 0 is bumped to 1
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_rng(capacity, StdRng::from_entropy())
    }

    /// Deterministic replacement sequence
    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }

    fn with_rng(capacity: usize, rng: StdRng) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Vec::with_capacity(capacity),
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            rng,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        if self.samples.len() < self.capacity {
            self.samples.push(value);
            return;
        }

        // Replace with probability capacity / count
        let slot = self.rng.gen_range(0..self.count);
        if slot < self.capacity as u64 {
            self.samples[slot as usize] = value;
        }
    }

    /// Number of observations added, retained or not
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn retained(&self) -> &[f64] {
        &self.samples
    }

    /// Smallest observation, `None` when empty
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Bucket counts over the retained sample. A stream of one distinct value always yields a
    /// single bucket holding the full count.
    pub fn histogram(&self, bucket_count: usize) -> SampleHistogram {
        if self.count == 0 {
            return SampleHistogram {
                buckets: Vec::new(),
                min: 0.0,
                max: 0.0,
                bucket_width: 0.0,
            };
        }

        if self.min == self.max {
            return SampleHistogram {
                buckets: vec![self.count],
                min: self.min,
                max: self.max,
                bucket_width: 0.0,
            };
        }

        let bucket_count = bucket_count.max(1);
        let width = (self.max - self.min) / bucket_count as f64;
        let mut buckets = vec![0u64; bucket_count];
        for v in &self.samples {
            let index = ((v - self.min) / width) as usize;
            buckets[index.min(bucket_count - 1)] += 1;
        }

        SampleHistogram {
            buckets,
            min: self.min,
            max: self.max,
            bucket_width: width,
        }
    }
}
