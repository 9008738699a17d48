//! Internal helper functions and types

use nalgebra::Vector2;
use rayon::prelude::*;

use crate::{Real, ThreadSafe};

/// Normalizes a vector, returning zero for vectors with tiny magnitude
pub fn normalize_or_zero<R: Real>(v: &Vector2<R>) -> Vector2<R> {
    let norm = v.norm();
    if norm.is_tiny() {
        Vector2::zeros()
    } else {
        v / norm
    }
}

/// Average of two values
pub fn avg<R: Real>(a: R, b: R) -> R {
    (a + b) * R::from_float(0.5)
}

/// Flat storage of a list of variable-length buckets (CSR layout)
#[derive(Clone, Debug)]
pub struct FlatMultiVec<T> {
    offsets: Vec<usize>,
    data: Vec<T>,
}

impl<T> Default for FlatMultiVec<T> {
    fn default() -> Self {
        Self {
            offsets: vec![0],
            data: Vec::new(),
        }
    }
}

impl<T: Copy + ThreadSafe> FlatMultiVec<T> {
    /// Constructs an empty multi-vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buckets
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Whether there are no buckets
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of stored elements
    pub fn total_len(&self) -> usize {
        self.data.len()
    }

    /// Contents of the bucket with the given index
    pub fn bucket(&self, index: usize) -> &[T] {
        assert!(index < self.len(), "bucket index out of range");
        &self.data[self.offsets[index]..self.offsets[index + 1]]
    }

    /// Replaces the contents with the given buckets, flattening them in parallel
    pub fn assign_from_buckets(&mut self, buckets: &[Vec<T>]) {
        self.offsets.clear();
        self.offsets.reserve(buckets.len() + 1);
        self.offsets.push(0);
        let mut total = 0;
        for bucket in buckets {
            total += bucket.len();
            self.offsets.push(total);
        }
        self.data = buckets
            .par_iter()
            .flat_map_iter(|bucket| bucket.iter().copied())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_multi_vec_preserves_bucket_contents() {
        let buckets = vec![vec![1usize, 2, 3], vec![], vec![4, 5]];
        let mut mv = FlatMultiVec::new();
        mv.assign_from_buckets(&buckets);
        assert_eq!(mv.len(), 3);
        assert_eq!(mv.total_len(), 5);
        assert_eq!(mv.bucket(0), &[1, 2, 3]);
        assert_eq!(mv.bucket(1), &[] as &[usize]);
        assert_eq!(mv.bucket(2), &[4, 5]);
    }

    #[test]
    fn normalize_or_zero_handles_degenerate_vectors() {
        assert_eq!(
            normalize_or_zero(&Vector2::new(0.0f64, 0.0)),
            Vector2::zeros()
        );
        let n = normalize_or_zero(&Vector2::new(3.0f64, 4.0));
        assert!((n.norm() - 1.0).abs() < 1e-14);
    }
}
