//! Online mean and variance (Welford)

use serde::Serialize;

use super::norm::norm_inverse_cdf;

/// Single-pass mean/variance accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamingStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl StreamingStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean of all observations, 0 when empty
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Bessel-corrected variance, 0 below two observations
    pub fn sample_variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        self.m2 / (self.count - 1) as f64
    }

    pub fn sample_std_dev(&self) -> f64 {
        self.sample_variance().sqrt()
    }

    /// `mean ± z(level) * stddev / sqrt(count)`; `None` below two observations
    pub fn confidence_interval(&self, level: f64) -> Option<ConfidenceInterval> {
        if self.count < 2 {
            return None;
        }
        let margin =
            norm_inverse_cdf(level) * self.sample_std_dev() / (self.count as f64).sqrt();
        Some(ConfidenceInterval {
            level,
            lower: self.mean - margin,
            upper: self.mean + margin,
        })
    }
}

/// Confidence interval bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    /// Half the interval width
    pub fn margin(&self) -> f64 {
        (self.upper - self.lower) / 2.0
    }
}
