//!
//! Core simulation engine of a weakly-compressible SPH solver for free-surface flow in
//! two dimensions. Particles are advanced through discrete time by an explicit
//! integrator (see [`integrator::RungeKuttaIntegrator`]) driving the field operators of
//! [`equations::FluidEquations`] over the block-partitioned adjacency of a
//! [`mesh::ParticleMesh`].
//!

/// Re-export the version of coarse-prof used by this crate, if profiling is enabled
#[cfg(feature = "profiling")]
pub use coarse_prof;
/// Re-export the version of nalgebra used by this crate
pub use nalgebra;

#[cfg(feature = "profiling")]
/// Invokes coarse_prof::profile! with the given expression
macro_rules! profile {
    ($name:expr) => {
        coarse_prof::profile!($name);
    };
}

#[cfg(not(feature = "profiling"))]
/// No-op macro if profiling is disabled
macro_rules! profile {
    ($name:expr) => {};
}

mod aabb;
/// Reconstruction of the fixed-particle state from the fluid
mod boundary;
/// Heat conductivity pair terms
pub mod conductivity;
/// Equations of state
pub mod eos;
/// The fluid equation bundle driving the field operators
pub mod equations;
/// Explicit time integrators
pub mod integrator;
/// Persistence boundary for particle snapshots
pub mod io;
/// SPH kernel function implementations
pub mod kernel;
/// Dense factorizations and eigendecomposition for small matrices
pub mod linalg;
/// Particle adjacency mesh with block-partitioned edges
pub mod mesh;
/// Simple neighborhood search based on a uniform grid
pub mod neighborhood_search;
mod numeric_types;
pub(crate) mod parallel;
/// Columnar particle storage
pub mod particles;
/// Geometric partitioning of the particle set
pub mod partition;
/// Particle shifting with free-surface classification
pub mod shifting;
/// Internal helper functions and types
mod utils;
/// Physical and artificial viscosity pair terms
pub mod viscosity;

use nalgebra::Vector2;

pub use aabb::{AxisAlignedBoundingBox, AxisAlignedBoundingBox2d};
pub use numeric_types::{Real, ThreadSafe};

pub(crate) type HashState = fxhash::FxBuildHasher;
pub(crate) type MapType<K, V> = std::collections::HashMap<K, V, HashState>;
pub(crate) fn new_map<K, V>() -> MapType<K, V> {
    MapType::with_hasher(HashState::default())
}

pub(crate) type ParallelMapType<K, V> = dashmap::DashMap<K, V, HashState>;

/// Configuration of the fluid problem
///
/// Threaded through the equation set, the boundary procedure and the mesh so that the
/// reference constants live in exactly one place.
#[derive(Clone, Debug)]
pub struct FluidParameters<R: Real> {
    /// Axis-aligned pool domain; fixed particles are mirrored across its boundary
    pub domain: AxisAlignedBoundingBox2d<R>,
    /// Gravitational acceleration vector
    pub gravity: Vector2<R>,
    /// Reference (rest) density of the fluid
    pub rest_density: R,
    /// Reference sound speed of the weakly-compressible model
    pub sound_speed: R,
}

impl<R: Real> FluidParameters<R> {
    /// Tries to convert the parameters to another [`Real`] type, returns `None` if a conversion fails
    pub fn try_convert<T: Real>(&self) -> Option<FluidParameters<T>> {
        Some(FluidParameters {
            domain: self.domain.try_convert()?,
            gravity: Vector2::new(
                self.gravity.x.try_convert()?,
                self.gravity.y.try_convert()?,
            ),
            rest_density: self.rest_density.try_convert()?,
            sound_speed: self.sound_speed.try_convert()?,
        })
    }
}

/// Initializes the global thread pool used by this library with the given parameters.
///
/// Initialization of the global thread pool happens exactly once.
/// Therefore, if you call `initialize_thread_pool` a second time, it will return an error.
/// An `Ok` result indicates that this is the first initialization of the thread pool.
pub fn initialize_thread_pool(num_threads: usize) -> Result<(), anyhow::Error> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;
    Ok(())
}
