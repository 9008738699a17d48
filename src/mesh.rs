//! Particle adjacency mesh with block-partitioned edges
//!
//! The mesh owns three views of the particle neighborhood structure:
//!
//! - a symmetric, self-inclusive adjacency (`N[i]`, sorted),
//! - a one-sided interpolation adjacency for fixed particles (`IN[i]`, fluid-only
//!   neighbors of the mirrored search point),
//! - a flat edge list over unique pairs `(i, j > i)`, bucketed so that buckets processed
//!   in the same parallel wave never share a particle.
//!
//! The bucket of an edge is the first partitioning level at which both endpoints share a
//! part. Level-0 buckets form the first wave, level-1 buckets (the K-means refinement of
//! the inter-partition interface) the second, and edges without a common part land in a
//! reserved bucket that is processed serially. Because every particle belongs to exactly
//! one part per level, the endpoint sets of two same-wave buckets are disjoint, so the
//! pair loops can accumulate into per-particle storage without atomics.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use nalgebra::Vector2;
use rayon::prelude::*;

use crate::aabb::AxisAlignedBoundingBox2d;
use crate::kernel::SmoothingKernel;
use crate::neighborhood_search::GridSearch;
use crate::parallel::as_sync_cells;
use crate::partition::{
    PartIndex, PartitionFunction, PartitionVector, PixelatedKMeans, RecursiveInertialBisection,
    NUM_PARTITION_LEVELS,
};
use crate::particles::ParticleSet;
use crate::utils::FlatMultiVec;
use crate::Real;

/// Scale factor applied to the kernel radius for boundary interpolation searches
pub const RADIUS_SCALE: f64 = 3.0;

/// Particle adjacency mesh
///
/// Constructed empty and rebuilt from particle positions with [`ParticleMesh::update`];
/// between rebuilds it is used as a read-only spatial index and position drift is
/// absorbed.
#[derive(Default)]
pub struct ParticleMesh {
    adjacency: FlatMultiVec<usize>,
    interp_adjacency: FlatMultiVec<usize>,
    edges: Vec<(u32, u32)>,
    bucket_offsets: Vec<usize>,
    num_threads: usize,

    // Rebuild scratch, kept to reuse allocations
    adjacency_buckets: Vec<Vec<usize>>,
    interp_buckets: Vec<Vec<usize>>,
}

impl ParticleMesh {
    /// Constructs an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted neighbor indices of the particle, including the particle itself
    pub fn neighbors(&self, index: usize) -> &[usize] {
        self.adjacency.bucket(index)
    }

    /// Sorted fluid neighbor indices of the mirrored search point of a fixed particle
    ///
    /// `fixed_ordinal` counts from the first fixed particle.
    pub fn interp_neighbors(&self, fixed_ordinal: usize) -> &[usize] {
        self.interp_adjacency.bucket(fixed_ordinal)
    }

    /// Number of edge buckets (including the serial cross bucket)
    pub fn num_blocks(&self) -> usize {
        self.bucket_offsets.len().saturating_sub(1)
    }

    fn bucket_edges(&self, bucket: usize) -> &[(u32, u32)] {
        &self.edges[self.bucket_offsets[bucket]..self.bucket_offsets[bucket + 1]]
    }

    fn waves(&self) -> [Range<usize>; NUM_PARTITION_LEVELS] {
        let t = self.num_threads;
        [0..t, t..2 * t]
    }

    fn cross_bucket(&self) -> usize {
        NUM_PARTITION_LEVELS * self.num_threads
    }

    /// Rebuilds the adjacency graphs, the partitioning and the block edge list
    ///
    /// `radius_fn` maps a particle index to its search radius (the kernel support
    /// radius); `domain` is the pool bounding box used to mirror fixed particles for the
    /// interpolation adjacency.
    pub fn update<R: Real, F: Fn(usize) -> R + Sync>(
        &mut self,
        particles: &mut ParticleSet<R>,
        domain: &AxisAlignedBoundingBox2d<R>,
        radius_fn: F,
    ) {
        profile!("ParticleMesh::update");
        assert!(
            particles.len() < u32::MAX as usize,
            "particle count exceeds the edge index range"
        );

        let spacing = self.search(particles, domain, &radius_fn);
        self.partition(particles, spacing);
        self.assemble_block_edges(particles);
    }

    /// Builds the spatial index and populates both adjacency graphs, returning the grid spacing
    fn search<R: Real, F: Fn(usize) -> R + Sync>(
        &mut self,
        particles: &ParticleSet<R>,
        domain: &AxisAlignedBoundingBox2d<R>,
        radius_fn: &F,
    ) -> R {
        profile!("ParticleMesh::search");
        let positions = &particles.r;
        let num_fluid = particles.num_fluid();

        let max_radius = particles
            .all()
            .into_par_iter()
            .map(|i| {
                let radius = radius_fn(i);
                assert!(radius > R::zero(), "search radius must be positive");
                radius
            })
            .reduce(|| R::tiny(), |a, b| a.max(b));
        let index = GridSearch::new(positions, max_radius);

        self.adjacency_buckets
            .resize_with(particles.len(), Vec::new);
        self.adjacency_buckets
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, bucket)| {
                index.search(&positions[i], radius_fn(i), bucket);
            });
        self.adjacency.assign_from_buckets(&self.adjacency_buckets);

        let radius_scale = R::from_float(RADIUS_SCALE);
        self.interp_buckets
            .resize_with(particles.num_fixed(), Vec::new);
        self.interp_buckets
            .par_iter_mut()
            .enumerate()
            .for_each(|(ordinal, bucket)| {
                let i = num_fluid + ordinal;
                let clipped = domain.clamp(&positions[i]);
                let mirrored = clipped * R::from_float(2.0) - positions[i];
                index.search_filtered(
                    &mirrored,
                    radius_scale * radius_fn(i),
                    bucket,
                    |j| j < num_fluid,
                );
            });
        self.interp_adjacency
            .assign_from_buckets(&self.interp_buckets);

        max_radius
    }

    /// Assigns the multi-level partition vector of every particle
    ///
    /// Fluid particles are split by recursive inertial bisection at level 0; the
    /// inter-partition interface is re-clustered by pixelated K-means at level 1. Fixed
    /// particles are pinned to the reserved cross partition at every level.
    fn partition<R: Real>(&mut self, particles: &mut ParticleSet<R>, pixel_size: R) {
        profile!("ParticleMesh::partition");
        self.num_threads = rayon::current_num_threads();
        let num_parts = NUM_PARTITION_LEVELS * self.num_threads + 1;
        assert!(
            num_parts < PartIndex::MAX as usize,
            "partition count exceeds the part index range"
        );
        let cross = (num_parts - 1) as PartIndex;

        let num_fluid = particles.num_fluid();
        let positions = &particles.r;
        particles
            .parinfo
            .par_iter_mut()
            .for_each(|part| *part = PartitionVector::splat(cross));

        if num_fluid == 0 {
            return;
        }

        // Level 0: recursive inertial bisection of all fluid particles.
        let fluid: Vec<usize> = (0..num_fluid).collect();
        let mut level0 = vec![cross; particles.len()];
        RecursiveInertialBisection.partition(positions, &fluid, &mut level0, self.num_threads, 0);

        // The interface consists of fluid particles adjacent to a different level-0 part.
        let adjacency = &self.adjacency;
        let interface: Vec<usize> = (0..num_fluid)
            .into_par_iter()
            .filter(|&i| {
                adjacency
                    .bucket(i)
                    .iter()
                    .any(|&j| j < num_fluid && level0[j] != level0[i])
            })
            .collect();

        // Level 1: pixelated K-means over the interface particles.
        let mut level1 = vec![cross; particles.len()];
        PixelatedKMeans::new(pixel_size).partition(
            positions,
            &interface,
            &mut level1,
            self.num_threads,
            self.num_threads as PartIndex,
        );

        particles
            .parinfo
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, part)| {
                if i < num_fluid {
                    part.set_level(0, level0[i]);
                    part.set_level(1, level1[i]);
                }
            });
    }

    /// Buckets the unique adjacency pairs by the common part of their endpoints
    fn assemble_block_edges<R: Real>(&mut self, particles: &ParticleSet<R>) {
        profile!("ParticleMesh::assemble_block_edges");
        let parinfo = &particles.parinfo;
        let num_buckets = NUM_PARTITION_LEVELS * self.num_threads + 1;
        let cross = (num_buckets - 1) as PartIndex;
        let adjacency = &self.adjacency;

        let edge_bucket = |i: usize, j: usize| -> usize {
            parinfo[i].common(&parinfo[j], cross) as usize
        };

        let counts: Vec<AtomicUsize> = (0..num_buckets).map(|_| AtomicUsize::new(0)).collect();
        (0..particles.len()).into_par_iter().for_each(|i| {
            for &j in adjacency.bucket(i) {
                if j > i {
                    counts[edge_bucket(i, j)].fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        self.bucket_offsets.clear();
        self.bucket_offsets.push(0);
        let mut total = 0;
        for count in &counts {
            total += count.load(Ordering::Relaxed);
            self.bucket_offsets.push(total);
        }

        self.edges.clear();
        self.edges.resize(total, (0, 0));
        let cursors: Vec<AtomicUsize> = self.bucket_offsets[..num_buckets]
            .iter()
            .map(|&offset| AtomicUsize::new(offset))
            .collect();
        let edge_cells = as_sync_cells(&mut self.edges);
        (0..particles.len()).into_par_iter().for_each(|i| {
            for &j in adjacency.bucket(i) {
                if j > i {
                    let slot = cursors[edge_bucket(i, j)].fetch_add(1, Ordering::Relaxed);
                    // SAFETY: every slot index is handed out exactly once.
                    unsafe { *edge_cells[slot].get() = (i as u32, j as u32) };
                }
            }
        });

        let sizes: Vec<usize> = self
            .bucket_offsets
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect();
        debug!("block edge bucket sizes: {:?}", sizes);
    }

    /// Visits every unique adjacency pair in block-parallel order
    ///
    /// The kernel value and gradient are evaluated once per edge from the endpoint
    /// offset and the uniform smoothing length, and passed to the closure together with
    /// both endpoint indices. Closures may mutate per-particle data of both endpoints
    /// through [`crate::parallel::SyncCell`] columns; the block partitioning guarantees
    /// race-freedom.
    pub fn for_each_pair<R, K, F>(&self, positions: &[Vector2<R>], h: R, kernel: &K, f: F)
    where
        R: Real,
        K: SmoothingKernel<R>,
        F: Fn(usize, usize, R, Vector2<R>) + Sync,
    {
        let visit_bucket = |bucket: usize| {
            for &(a, b) in self.bucket_edges(bucket) {
                let (a, b) = (a as usize, b as usize);
                let offset = positions[a] - positions[b];
                f(a, b, kernel.value(&offset, h), kernel.gradient(&offset, h));
            }
        };

        if self.edges.is_empty() {
            return;
        }
        for wave in self.waves() {
            wave.into_par_iter().for_each(|bucket| visit_bucket(bucket));
        }
        visit_bucket(self.cross_bucket());
    }
}
