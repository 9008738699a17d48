//! Persistence boundary for particle snapshots
//!
//! The solver core does not dictate an on-disk encoding; it only requires that a sink
//! stores every array faithfully under its field name. Concrete formats live outside of
//! this crate behind the [`ParticleSink`] trait.

use crate::{MapType, Real};

/// ASCII identifiers under which particle fields are persisted
pub mod field_names {
    /// Smoothing length (uniform)
    pub const H: &str = "h";
    /// Particle mass (uniform)
    pub const M: &str = "m";
    /// Position
    pub const R: &str = "r";
    /// Velocity
    pub const V: &str = "v";
    /// Velocity time derivative
    pub const DV_DT: &str = "dv_dt";
    /// Density
    pub const RHO: &str = "rho";
    /// Density time derivative
    pub const DRHO_DT: &str = "drho_dt";
    /// Density gradient
    pub const GRAD_RHO: &str = "grad_rho";
    /// Pressure
    pub const P: &str = "p";
    /// Partition vector
    pub const PARINFO: &str = "parinfo";
    /// Sound speed
    pub const CS: &str = "cs";
    /// Shepard concentration
    pub const C: &str = "C";
    /// Unit normal
    pub const N: &str = "N";
    /// Renormalization matrix
    pub const L: &str = "L";
    /// Velocity divergence
    pub const DIV_V: &str = "div_v";
    /// Velocity curl
    pub const CURL_V: &str = "curl_v";
    /// Specific internal energy
    pub const U: &str = "u";
    /// Internal energy time derivative
    pub const DU_DT: &str = "du_dt";
    /// Artificial-viscosity switch
    pub const ALPHA: &str = "alpha";
    /// Artificial-viscosity switch time derivative
    pub const DALPHA_DT: &str = "dalpha_dt";
    /// Shifting displacement
    pub const DR: &str = "dr";
    /// Free-surface classification
    pub const FS: &str = "FS";
}

/// Sink receiving time-step records of particle data
///
/// Uniform fields arrive as length-1 arrays, varying fields as arrays of the particle
/// count (times the component count for flattened vector fields). Implementations
/// propagate their I/O errors; the solver core never recovers from them.
pub trait ParticleSink<R: Real> {
    /// Begins a new time-step record at the given time
    fn create_time_step(&mut self, time: R) -> Result<(), anyhow::Error>;

    /// Stores a uniform (array-wide) field of the current time step
    fn create_uniform_array(&mut self, name: &str, values: &[R]) -> Result<(), anyhow::Error>;

    /// Stores a varying (per-particle) field of the current time step
    fn create_varying_array(&mut self, name: &str, values: &[R]) -> Result<(), anyhow::Error>;
}

/// A single recorded time step of an [`InMemorySink`]
#[derive(Clone, Debug)]
pub struct InMemoryTimeStep<R: Real> {
    /// Record time
    pub time: R,
    /// Uniform fields by name
    pub uniforms: MapType<String, Vec<R>>,
    /// Varying fields by name
    pub varyings: MapType<String, Vec<R>>,
}

/// Sink keeping all records in memory, mainly useful for tests and inspection
#[derive(Clone, Debug, Default)]
pub struct InMemorySink<R: Real> {
    /// All recorded time steps, in insertion order
    pub time_steps: Vec<InMemoryTimeStep<R>>,
}

impl<R: Real> InMemorySink<R> {
    /// Constructs an empty sink
    pub fn new() -> Self {
        Self {
            time_steps: Vec::new(),
        }
    }

    fn current(&mut self) -> Result<&mut InMemoryTimeStep<R>, anyhow::Error> {
        self.time_steps
            .last_mut()
            .ok_or_else(|| anyhow::anyhow!("no time step was created"))
    }
}

impl<R: Real> ParticleSink<R> for InMemorySink<R> {
    fn create_time_step(&mut self, time: R) -> Result<(), anyhow::Error> {
        self.time_steps.push(InMemoryTimeStep {
            time,
            uniforms: crate::new_map(),
            varyings: crate::new_map(),
        });
        Ok(())
    }

    fn create_uniform_array(&mut self, name: &str, values: &[R]) -> Result<(), anyhow::Error> {
        self.current()?
            .uniforms
            .insert(name.to_string(), values.to_vec());
        Ok(())
    }

    fn create_varying_array(&mut self, name: &str, values: &[R]) -> Result<(), anyhow::Error> {
        self.current()?
            .varyings
            .insert(name.to_string(), values.to_vec());
        Ok(())
    }
}
