//! Streaming statistics
//! Bounded-memory accumulators for unbounded measurement streams

pub mod histogram;
pub mod norm;
pub mod sample;
pub mod streaming;

pub use histogram::{MagnitudeBucket, StreamingHistogram, HISTOGRAM_BUCKETS};
pub use norm::norm_inverse_cdf;
pub use sample::{SampleHistogram, StreamingSample, DEFAULT_SAMPLE_CAPACITY};
pub use streaming::{ConfidenceInterval, StreamingStats};
