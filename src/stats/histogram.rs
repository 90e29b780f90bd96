//! Order-of-magnitude histogram
//! Bucket k holds values with bit-length k, i.e. [2^(k-1), 2^k); bucket 0 holds 0

use serde::Serialize;

pub const HISTOGRAM_BUCKETS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingHistogram {
    pub buckets: [u64; HISTOGRAM_BUCKETS],
}

/// One non-empty bucket with its value range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MagnitudeBucket {
    pub index: usize,
    pub lower: u64,
    pub upper: u64,
    pub count: u64,
}

impl Default for StreamingHistogram {
    fn default() -> Self {
        Self {
            buckets: [0; HISTOGRAM_BUCKETS],
        }
    }
}

impl StreamingHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&mut self, value: u64) {
        self.buckets[Self::bucket_index(value)] += 1;
    }

    /// Bit-length of `value`, clamped so u64::MAX still lands in the last bucket
    #[inline(always)]
    pub fn bucket_index(value: u64) -> usize {
        ((u64::BITS - value.leading_zeros()) as usize).min(HISTOGRAM_BUCKETS - 1)
    }

    /// Inclusive lower and exclusive upper bound of bucket `index`
    pub fn bucket_range(index: usize) -> (u64, u64) {
        match index {
            0 => (0, 1),
            i if i >= HISTOGRAM_BUCKETS - 1 => (1 << (HISTOGRAM_BUCKETS - 2), u64::MAX),
            i => (1 << (i - 1), 1 << i),
        }
    }

    pub fn count(&self) -> u64 {
        self.buckets.iter().sum()
    }

    pub fn non_empty(&self) -> Vec<MagnitudeBucket> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(index, count)| {
                let (lower, upper) = Self::bucket_range(index);
                MagnitudeBucket {
                    index,
                    lower,
                    upper,
                    count: *count,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bucketing() {
        let cases: [(&[u64], &[(usize, u64)]); 3] = [
            (&[1], &[(1, 1)]),
            (&[0], &[(0, 1)]),
            (
                &[1, 3, 3, 3, 4, 16, 257],
                &[(1, 1), (2, 3), (3, 1), (5, 1), (9, 1)],
            ),
        ];

        for (values, expected) in cases {
            let mut histogram = StreamingHistogram::new();
            for v in values {
                histogram.add(*v);
            }

            let mut want = [0u64; HISTOGRAM_BUCKETS];
            for (index, count) in expected {
                want[*index] = *count;
            }
            assert_eq!(histogram.buckets, want, "for values {values:?}");
        }
    }

    #[test]
    fn test_extremes_stay_in_range() {
        let mut histogram = StreamingHistogram::new();
        histogram.add(u64::MAX);
        histogram.add(1 << 62);
        assert_eq!(histogram.buckets[63], 2);
        assert_eq!(histogram.count(), 2);
    }

    #[test]
    fn test_bucket_ranges_contain_members() {
        for v in [0u64, 1, 2, 3, 7, 8, 1000, 1 << 40] {
            let (lower, upper) = StreamingHistogram::bucket_range(StreamingHistogram::bucket_index(v));
            assert!(lower <= v && v < upper, "{v} not in [{lower}, {upper})");
        }
    }

    proptest! {
        #[test]
        fn prop_one_bucket_per_add_and_order_independent(mut values in prop::collection::vec(any::<u64>(), 0..300)) {
            let mut forward = StreamingHistogram::new();
            for v in &values {
                let before = forward.buckets;
                forward.add(*v);
                let changed = before.iter().zip(forward.buckets.iter()).filter(|(a, b)| a != b).count();
                prop_assert_eq!(changed, 1);
            }

            values.reverse();
            let mut backward = StreamingHistogram::new();
            for v in &values {
                backward.add(*v);
            }
            prop_assert_eq!(forward, backward);
            prop_assert_eq!(forward.count(), values.len() as u64);
        }
    }
}
