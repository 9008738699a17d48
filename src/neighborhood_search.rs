//! Radius queries over a point set based on a uniform background grid

use itertools::Itertools;
use log::debug;
use nalgebra::Vector2;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::aabb::AxisAlignedBoundingBox2d;
use crate::utils::FlatMultiVec;
use crate::{ParallelMapType, Real};

/// Uniform-grid spatial index over a set of points
///
/// The grid is sized for the largest expected search radius: queries enumerate the cells
/// covered by the search box and filter candidates by exact squared distance. Results
/// are returned sorted ascending by point index.
pub struct GridSearch<'a, R: Real> {
    positions: &'a [Vector2<R>],
    aabb: Option<AxisAlignedBoundingBox2d<R>>,
    cell_size: Vector2<R>,
    num_cells: [usize; 2],
    cell_points: FlatMultiVec<usize>,
}

impl<'a, R: Real> GridSearch<'a, R> {
    /// Builds the grid over the given points with cells of roughly `spacing` edge length
    pub fn new(positions: &'a [Vector2<R>], spacing: R) -> Self {
        assert!(spacing > R::zero(), "grid spacing must be positive");

        let Some(mut aabb) = AxisAlignedBoundingBox2d::from_points_par(positions) else {
            return Self {
                positions,
                aabb: None,
                cell_size: Vector2::zeros(),
                num_cells: [0, 0],
                cell_points: FlatMultiVec::new(),
            };
        };
        aabb.grow_uniformly(spacing * R::from_float(0.5));

        let extents = aabb.extents();
        let num_cells = [
            (extents.x / spacing)
                .ceil()
                .to_usize()
                .expect("grid cell count out of range")
                .max(1),
            (extents.y / spacing)
                .ceil()
                .to_usize()
                .expect("grid cell count out of range")
                .max(1),
        ];
        let cell_size = Vector2::new(
            extents.x / R::from_float(num_cells[0]),
            extents.y / R::from_float(num_cells[1]),
        );

        let mut grid = Self {
            positions,
            aabb: Some(aabb),
            cell_size,
            num_cells,
            cell_points: FlatMultiVec::new(),
        };
        grid.assemble();
        debug!(
            "grid search: {}x{} cells over {} points",
            num_cells[0],
            num_cells[1],
            positions.len()
        );
        grid
    }

    fn assemble(&mut self) {
        let map: ParallelMapType<usize, SmallVec<[usize; 16]>> = ParallelMapType::default();
        self.positions.par_iter().enumerate().for_each(|(i, p)| {
            map.entry(self.flat_cell_index(p)).or_default().push(i);
        });

        let total_cells = self.num_cells[0] * self.num_cells[1];
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); total_cells];
        for (cell, mut points) in map.into_iter() {
            points.sort_unstable();
            buckets[cell] = points.into_vec();
        }
        self.cell_points.assign_from_buckets(&buckets);
    }

    fn cell_coords(&self, point: &Vector2<R>) -> [usize; 2] {
        let aabb = self.aabb.as_ref().expect("grid is empty");
        let rel = aabb.clamp(point) - aabb.min();
        let clamp_axis = |value: R, axis: usize| {
            (value / self.cell_size[axis])
                .floor()
                .to_usize()
                .unwrap_or(0)
                .min(self.num_cells[axis] - 1)
        };
        [clamp_axis(rel.x, 0), clamp_axis(rel.y, 1)]
    }

    fn flat_cell_index(&self, point: &Vector2<R>) -> usize {
        let [i, j] = self.cell_coords(point);
        i * self.num_cells[1] + j
    }

    /// Collects all point indices strictly within `radius` of `point` into `out`, sorted ascending
    pub fn search(&self, point: &Vector2<R>, radius: R, out: &mut Vec<usize>) {
        self.search_filtered(point, radius, out, |_| true);
    }

    /// Like [`GridSearch::search`], but only returns points accepted by the filter
    pub fn search_filtered<F: Fn(usize) -> bool>(
        &self,
        point: &Vector2<R>,
        radius: R,
        out: &mut Vec<usize>,
        filter: F,
    ) {
        assert!(radius > R::zero(), "search radius must be positive");
        out.clear();
        if self.aabb.is_none() {
            return;
        }

        let radius_sq = radius * radius;
        let offset = Vector2::new(radius, radius);
        let low = self.cell_coords(&(point - offset));
        let high = self.cell_coords(&(point + offset));
        for (i, j) in (low[0]..=high[0]).cartesian_product(low[1]..=high[1]) {
            for &k in self.cell_points.bucket(i * self.num_cells[1] + j) {
                if !filter(k) {
                    continue;
                }
                if (point - self.positions[k]).norm_squared() < radius_sq {
                    out.push(k);
                }
            }
        }
        out.sort_unstable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn brute_force(points: &[Vector2<f64>], center: &Vector2<f64>, radius: f64) -> Vec<usize> {
        points
            .iter()
            .enumerate()
            .filter(|(_, p)| (*p - center).norm() < radius)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn matches_brute_force_on_random_points() {
        let mut rng = StdRng::seed_from_u64(123);
        let points: Vec<Vector2<f64>> = (0..500)
            .map(|_| Vector2::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)))
            .collect();
        let radius = 0.13;
        let grid = GridSearch::new(&points, radius);

        let mut results = Vec::new();
        for (i, p) in points.iter().enumerate() {
            grid.search(p, radius, &mut results);
            let expected = brute_force(&points, p, radius);
            assert_eq!(results, expected, "mismatch for query point {}", i);
            assert!(results.windows(2).all(|w| w[0] < w[1]));
            // A point is always its own neighbor.
            assert!(results.contains(&i));
        }
    }

    #[test]
    fn mean_degree_of_uniformly_distributed_points() {
        // N uniformly distributed points in the unit square with r = 2 / sqrt(N) have a
        // mean degree of ~4*pi, slightly reduced by boundary truncation.
        let mut rng = StdRng::seed_from_u64(7);
        let n = 4096;
        let points: Vec<Vector2<f64>> = (0..n)
            .map(|_| Vector2::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)))
            .collect();
        let radius = 2.0 / (n as f64).sqrt();
        let grid = GridSearch::new(&points, radius);

        let mut results = Vec::new();
        let mut total = 0usize;
        for p in &points {
            grid.search(p, radius, &mut results);
            total += results.len() - 1;
        }
        let mean_degree = total as f64 / n as f64;
        assert!((mean_degree - 4.0 * PI).abs() < 0.1 * 4.0 * PI);
    }

    #[test]
    fn filtered_search_skips_rejected_points() {
        let points = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(0.1, 0.0),
            Vector2::new(0.2, 0.0),
        ];
        let grid = GridSearch::new(&points, 0.5);
        let mut results = Vec::new();
        grid.search_filtered(&Vector2::new(0.0, 0.0), 0.5, &mut results, |i| i != 1);
        assert_eq!(results, vec![0, 2]);
    }

    #[test]
    fn empty_point_set_yields_no_results() {
        let points: Vec<Vector2<f64>> = Vec::new();
        let grid = GridSearch::new(&points, 1.0);
        let mut results = vec![42];
        grid.search(&Vector2::new(0.0, 0.0), 1.0, &mut results);
        assert!(results.is_empty());
    }
}
