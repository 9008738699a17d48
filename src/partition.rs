//! Geometric partitioning of the particle set for block-parallel edge processing

use bytemuck_derive::{Pod, Zeroable};
use nalgebra::{Matrix2, Vector2};
use rayon::prelude::*;

use crate::linalg;
use crate::parallel::{as_sync_cells, SyncCell};
use crate::{MapType, Real};

/// Index of a partition
pub type PartIndex = u16;

/// Number of partitioning levels
pub const NUM_PARTITION_LEVELS: usize = 2;

/// Per-particle partition assignment, one part index per level
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
pub struct PartitionVector(pub [PartIndex; NUM_PARTITION_LEVELS]);

impl PartitionVector {
    /// Constructs a partition vector with the same part at every level
    pub fn splat(part: PartIndex) -> Self {
        Self([part; NUM_PARTITION_LEVELS])
    }

    /// Part index at the given level
    pub fn level(&self, level: usize) -> PartIndex {
        self.0[level]
    }

    /// Sets the part index at the given level
    pub fn set_level(&mut self, level: usize, part: PartIndex) {
        self.0[level] = part;
    }

    /// The first level at which both particles share a part, or `cross` if there is none
    ///
    /// This decides which edge block the pair `(a, b)` is processed in.
    pub fn common(&self, other: &Self, cross: PartIndex) -> PartIndex {
        for level in 0..NUM_PARTITION_LEVELS {
            if self.0[level] == other.0[level] {
                return self.0[level];
            }
        }
        cross
    }
}

/// Assigns part indices to a subset of the particle positions
pub trait PartitionFunction<R: Real>: Send + Sync {
    /// Assigns every particle in `subset` a part in `first_part .. first_part + num_parts`
    ///
    /// `parts` is the per-particle part array of one partitioning level; entries outside
    /// of `subset` are left untouched.
    fn partition(
        &self,
        positions: &[Vector2<R>],
        subset: &[usize],
        parts: &mut [PartIndex],
        num_parts: usize,
        first_part: PartIndex,
    );
}

/// Recursive inertial bisection
///
/// Recursively splits the point set along its principal inertia axis at the weighted
/// median, producing parts of near-equal size with compact shapes.
#[derive(Copy, Clone, Debug, Default)]
pub struct RecursiveInertialBisection;

impl RecursiveInertialBisection {
    fn principal_axis<R: Real>(positions: &[Vector2<R>], subset: &[usize]) -> Vector2<R> {
        let count = R::from_float(subset.len());
        let mean = subset
            .iter()
            .fold(Vector2::zeros(), |acc: Vector2<R>, &i| acc + positions[i])
            / count;
        let covariance = subset.iter().fold(Matrix2::zeros(), |acc: Matrix2<R>, &i| {
            let d = positions[i] - mean;
            acc + d * d.transpose()
        }) / count;

        match linalg::jacobi(covariance) {
            Ok(eig) => {
                let axis = if eig.values[0].abs() >= eig.values[1].abs() {
                    eig.vectors.row(0)
                } else {
                    eig.vectors.row(1)
                };
                Vector2::new(axis[0], axis[1])
            }
            // Degenerate point clouds fall back to a coordinate split.
            Err(_) => Vector2::x(),
        }
    }

    fn bisect<R: Real>(
        positions: &[Vector2<R>],
        subset: &mut [usize],
        parts: &[SyncCell<PartIndex>],
        num_parts: usize,
        first_part: PartIndex,
    ) {
        if subset.is_empty() {
            return;
        }
        if num_parts <= 1 || subset.len() == 1 {
            // SAFETY: recursion branches own disjoint subsets of the particle indices.
            for &i in subset.iter() {
                unsafe { *parts[i].get() = first_part };
            }
            return;
        }

        let axis = Self::principal_axis(positions, subset);
        let left_parts = num_parts / 2;
        let split = subset.len() * left_parts / num_parts;
        subset.select_nth_unstable_by(split, |&a, &b| {
            let pa = positions[a].dot(&axis);
            let pb = positions[b].dot(&axis);
            pa.partial_cmp(&pb).expect("positions must not contain NaN")
        });

        let (left, right) = subset.split_at_mut(split);
        rayon::join(
            || Self::bisect(positions, left, parts, left_parts, first_part),
            || {
                Self::bisect(
                    positions,
                    right,
                    parts,
                    num_parts - left_parts,
                    first_part + left_parts as PartIndex,
                )
            },
        );
    }
}

impl<R: Real> PartitionFunction<R> for RecursiveInertialBisection {
    fn partition(
        &self,
        positions: &[Vector2<R>],
        subset: &[usize],
        parts: &mut [PartIndex],
        num_parts: usize,
        first_part: PartIndex,
    ) {
        let mut indices = subset.to_vec();
        let cells = as_sync_cells(parts);
        Self::bisect(positions, &mut indices, cells, num_parts, first_part);
    }
}

/// Pixelated K-means clustering
///
/// Snaps the points onto a pixel raster, runs Lloyd iterations over the pixel centers
/// weighted by their occupancy, and maps every particle to the cluster of its pixel.
/// Seeding strides over the lexicographically sorted pixel list, so the result is
/// deterministic without a random source.
#[derive(Copy, Clone, Debug)]
pub struct PixelatedKMeans<R: Real> {
    /// Pixel edge length
    pub pixel_size: R,
    /// Maximum number of Lloyd iterations
    pub max_iterations: usize,
}

impl<R: Real> PixelatedKMeans<R> {
    /// Constructs the clustering with the given pixel size
    pub fn new(pixel_size: R) -> Self {
        assert!(pixel_size > R::zero(), "pixel size must be positive");
        Self {
            pixel_size,
            max_iterations: 16,
        }
    }
}

impl<R: Real> PartitionFunction<R> for PixelatedKMeans<R> {
    fn partition(
        &self,
        positions: &[Vector2<R>],
        subset: &[usize],
        parts: &mut [PartIndex],
        num_parts: usize,
        first_part: PartIndex,
    ) {
        if subset.is_empty() {
            return;
        }

        // Rasterize the subset onto pixels.
        let mut pixel_map: MapType<(i64, i64), Vec<usize>> = crate::new_map();
        for &i in subset {
            let px = (positions[i] / self.pixel_size).map(|c| c.floor());
            let key = (
                px.x.to_i64().expect("pixel coordinate out of range"),
                px.y.to_i64().expect("pixel coordinate out of range"),
            );
            pixel_map.entry(key).or_default().push(i);
        }

        let mut pixels: Vec<((i64, i64), Vec<usize>)> = pixel_map.into_iter().collect();
        pixels.sort_unstable_by_key(|&(key, _)| key);

        let half = R::from_float(0.5);
        let centers: Vec<Vector2<R>> = pixels
            .iter()
            .map(|&((x, y), _)| {
                Vector2::new(
                    (R::from_float(x) + half) * self.pixel_size,
                    (R::from_float(y) + half) * self.pixel_size,
                )
            })
            .collect();
        let weights: Vec<R> = pixels
            .iter()
            .map(|(_, indices)| R::from_float(indices.len()))
            .collect();

        // Seed the centroids by striding over the sorted pixel list.
        let k = num_parts.min(pixels.len()).max(1);
        let mut centroids: Vec<Vector2<R>> =
            (0..k).map(|c| centers[c * pixels.len() / k]).collect();
        let mut assignment = vec![0usize; pixels.len()];

        for _ in 0..self.max_iterations {
            let new_assignment: Vec<usize> = centers
                .par_iter()
                .map(|center| {
                    let mut best = 0;
                    let mut best_dist = (center - centroids[0]).norm_squared();
                    for (c, centroid) in centroids.iter().enumerate().skip(1) {
                        let dist = (center - centroid).norm_squared();
                        if dist < best_dist {
                            best = c;
                            best_dist = dist;
                        }
                    }
                    best
                })
                .collect();

            let converged = new_assignment == assignment;
            assignment = new_assignment;

            let mut sums = vec![Vector2::<R>::zeros(); k];
            let mut totals = vec![R::zero(); k];
            for (pixel, &cluster) in assignment.iter().enumerate() {
                sums[cluster] += centers[pixel] * weights[pixel];
                totals[cluster] += weights[pixel];
            }
            for c in 0..k {
                if !totals[c].is_tiny() {
                    centroids[c] = sums[c] / totals[c];
                }
            }

            if converged {
                break;
            }
        }

        for (pixel, (_, indices)) in pixels.iter().enumerate() {
            let part = first_part + assignment[pixel] as PartIndex;
            for &i in indices {
                parts[i] = part;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice(n: usize) -> Vec<Vector2<f64>> {
        let mut points = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                points.push(Vector2::new(i as f64, j as f64));
            }
        }
        points
    }

    #[test]
    fn inertial_bisection_balances_part_sizes() {
        let positions = lattice(16);
        let subset: Vec<usize> = (0..positions.len()).collect();
        let mut parts = vec![PartIndex::MAX; positions.len()];
        let num_parts = 4;
        RecursiveInertialBisection.partition(&positions, &subset, &mut parts, num_parts, 0);

        let mut sizes = vec![0usize; num_parts];
        for &p in &parts {
            assert!((p as usize) < num_parts);
            sizes[p as usize] += 1;
        }
        let expected = positions.len() / num_parts;
        for &size in &sizes {
            assert!(size >= expected / 2 && size <= expected * 2);
        }
    }

    #[test]
    fn inertial_bisection_respects_the_subset() {
        let positions = lattice(4);
        let subset = vec![0usize, 5, 10, 15];
        let mut parts = vec![PartIndex::MAX; positions.len()];
        RecursiveInertialBisection.partition(&positions, &subset, &mut parts, 2, 7);
        for (i, &p) in parts.iter().enumerate() {
            if subset.contains(&i) {
                assert!(p == 7 || p == 8);
            } else {
                assert_eq!(p, PartIndex::MAX);
            }
        }
    }

    #[test]
    fn pixelated_kmeans_assigns_whole_pixels() {
        let positions = vec![
            Vector2::new(0.1, 0.1),
            Vector2::new(0.2, 0.3),
            Vector2::new(5.1, 5.1),
            Vector2::new(5.3, 5.2),
        ];
        let subset: Vec<usize> = (0..positions.len()).collect();
        let mut parts = vec![PartIndex::MAX; positions.len()];
        PixelatedKMeans::new(1.0).partition(&positions, &subset, &mut parts, 2, 4);
        // Points sharing a pixel share a part, and the two far-apart pixels separate.
        assert_eq!(parts[0], parts[1]);
        assert_eq!(parts[2], parts[3]);
        assert_ne!(parts[0], parts[2]);
        assert!(parts.iter().all(|&p| p == 4 || p == 5));
    }

    #[test]
    fn common_part_selects_the_first_shared_level() {
        let a = PartitionVector([1, 9]);
        let b = PartitionVector([1, 8]);
        let c = PartitionVector([2, 9]);
        let d = PartitionVector([3, 4]);
        assert_eq!(a.common(&b, 99), 1);
        assert_eq!(a.common(&c, 99), 9);
        assert_eq!(a.common(&d, 99), 99);
    }
}
