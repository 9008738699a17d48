//! Shared scenario builders for the solver integration tests

use nalgebra::Vector2;
use std::f64::consts::PI;

use wavetank::conductivity::NoHeatConductivity;
use wavetank::eos::LinearTait;
use wavetank::equations::FluidEquations;
use wavetank::kernel::WendlandC2Kernel;
use wavetank::particles::{FieldSet, ParticleKind, ParticleSet};
use wavetank::shifting::ParticleShifting;
use wavetank::viscosity::{DeltaSphViscosity, NoViscosity};
use wavetank::{AxisAlignedBoundingBox2d, FluidParameters};

/// Gravitational acceleration of the reference scenarios
pub const GRAVITY: f64 = 9.81;

/// Rest density of the reference scenarios
pub const REST_DENSITY: f64 = 1000.0;

/// Geometry of a dam-break pool scaled from the water column height
pub struct PoolGeometry {
    /// Water column height `H`
    pub column_height: f64,
    /// Water column length `L = 2 H`
    pub column_length: f64,
    /// Pool width
    pub pool_width: f64,
    /// Pool height
    pub pool_height: f64,
    /// Particle spacing
    pub spacing: f64,
    /// Number of fixed particle layers outside of the pool
    pub fixed_layers: usize,
}

impl PoolGeometry {
    /// The standard pool proportions for a given column height and resolution
    pub fn new(column_height: f64, particles_per_height: usize, fixed_layers: usize) -> Self {
        Self {
            column_height,
            column_length: 2.0 * column_height,
            pool_width: 5.366 * column_height,
            pool_height: 2.5 * column_height,
            spacing: column_height / particles_per_height as f64,
            fixed_layers,
        }
    }

    /// The configuration matching this geometry
    pub fn parameters(&self) -> FluidParameters<f64> {
        FluidParameters {
            domain: AxisAlignedBoundingBox2d::new(
                Vector2::new(0.0, 0.0),
                Vector2::new(self.pool_width, self.pool_height),
            ),
            gravity: Vector2::new(0.0, -GRAVITY),
            rest_density: REST_DENSITY,
            sound_speed: 20.0 * (GRAVITY * self.column_height).sqrt(),
        }
    }
}

/// Reference equation set: Wendland C2 kernel, linear Tait, δ-SPH, shifting enabled
pub type ReferenceEquations = FluidEquations<
    f64,
    WendlandC2Kernel,
    LinearTait<f64>,
    DeltaSphViscosity<f64>,
    NoViscosity,
    NoHeatConductivity,
>;

/// Builds the reference equation set for the given configuration
pub fn reference_equations(parameters: &FluidParameters<f64>) -> ReferenceEquations {
    FluidEquations::new(
        WendlandC2Kernel,
        LinearTait::new(parameters.sound_speed, parameters.rest_density),
        DeltaSphViscosity::new(parameters.sound_speed, parameters.rest_density),
        NoViscosity,
        NoHeatConductivity,
        Some(ParticleShifting::new()),
        parameters.clone(),
    )
}

/// Fills a particle set with the dam-break pool: a fluid column in the lower-left
/// corner and offset layers of fixed particles outside of the pool walls
pub fn fill_pool(geometry: &PoolGeometry, fields: FieldSet) -> ParticleSet<f64> {
    let dr = geometry.spacing;
    let mut particles = ParticleSet::new(fields);

    // Fluid column [0, L] x [0, H].
    let water_m = (geometry.column_length / dr).round() as usize;
    let water_n = (geometry.column_height / dr).round() as usize;
    particles.reserve(water_m * water_n);
    for i in 0..water_m {
        for j in 0..water_n {
            let a = particles.append(ParticleKind::Fluid);
            particles.positions_mut()[a] =
                Vector2::new((i as f64 + 0.5) * dr, (j as f64 + 0.5) * dr);
        }
    }

    // Fixed layers below the pool floor and outside of both side walls.
    let thickness = geometry.fixed_layers as f64 * dr;
    let nx = ((geometry.pool_width + 2.0 * thickness) / dr).round() as usize;
    let ny = ((geometry.pool_height + thickness) / dr).round() as usize;
    for i in 0..nx {
        for j in 0..ny {
            let x = -thickness + (i as f64 + 0.5) * dr;
            let y = -thickness + (j as f64 + 0.5) * dr;
            let inside_pool = x > 0.0 && x < geometry.pool_width && y > 0.0;
            if inside_pool {
                continue;
            }
            let b = particles.append(ParticleKind::Fixed);
            particles.positions_mut()[b] = Vector2::new(x, y);
        }
    }

    particles.set_smoothing_length(2.0 * dr);
    particles.set_particle_mass(REST_DENSITY * dr * dr);
    particles
}

/// Fills a particle set with a resting water body spanning the whole pool width up to
/// the column height, plus the fixed wall layers
pub fn fill_tank(geometry: &PoolGeometry, fields: FieldSet) -> ParticleSet<f64> {
    let dr = geometry.spacing;
    let mut particles = ParticleSet::new(fields);

    let water_m = (geometry.pool_width / dr).round() as usize;
    let water_n = (geometry.column_height / dr).round() as usize;
    particles.reserve(water_m * water_n);
    for i in 0..water_m {
        for j in 0..water_n {
            let a = particles.append(ParticleKind::Fluid);
            particles.positions_mut()[a] =
                Vector2::new((i as f64 + 0.5) * dr, (j as f64 + 0.5) * dr);
        }
    }

    let thickness = geometry.fixed_layers as f64 * dr;
    let nx = ((geometry.pool_width + 2.0 * thickness) / dr).round() as usize;
    let ny = ((geometry.pool_height + thickness) / dr).round() as usize;
    for i in 0..nx {
        for j in 0..ny {
            let x = -thickness + (i as f64 + 0.5) * dr;
            let y = -thickness + (j as f64 + 0.5) * dr;
            let inside_pool = x > 0.0 && x < geometry.pool_width && y > 0.0;
            if inside_pool {
                continue;
            }
            let b = particles.append(ParticleKind::Fixed);
            particles.positions_mut()[b] = Vector2::new(x, y);
        }
    }

    particles.set_smoothing_length(2.0 * dr);
    particles.set_particle_mass(REST_DENSITY * dr * dr);
    particles
}

/// Initializes the densities of a resting water body with the linear hydrostatic
/// profile; fixed particles start at the rest density
pub fn linear_hydrostatic_init(particles: &mut ParticleSet<f64>, geometry: &PoolGeometry) {
    let parameters = geometry.parameters();
    let cs_sq = parameters.sound_speed * parameters.sound_speed;
    for a in particles.all() {
        if particles.is_fixed(a) {
            particles.densities_mut()[a] = REST_DENSITY;
            continue;
        }
        let depth = (geometry.column_height - particles.positions()[a].y).max(0.0);
        particles.densities_mut()[a] = REST_DENSITY + REST_DENSITY * GRAVITY * depth / cs_sq;
    }
}

/// Initializes the densities with the closed-form hydrostatic series of the dam-break
/// column; fixed particles start at the rest density
pub fn hydrostatic_density_init(particles: &mut ParticleSet<f64>, geometry: &PoolGeometry) {
    let parameters = geometry.parameters();
    let h_col = geometry.column_height;
    let l_col = geometry.column_length;
    let cs_sq = parameters.sound_speed * parameters.sound_speed;

    for a in particles.all() {
        if particles.is_fixed(a) {
            particles.densities_mut()[a] = REST_DENSITY;
            continue;
        }

        let x = particles.positions()[a].x;
        let y = particles.positions()[a].y;
        let mut pressure = REST_DENSITY * GRAVITY * (h_col - y);
        for n in (1..100).step_by(2) {
            let n = n as f64;
            pressure -= 8.0 * REST_DENSITY * GRAVITY * h_col / (PI * PI)
                * ((n * PI * (x - l_col) / (2.0 * h_col)).exp()
                    * (n * PI * y / (2.0 * h_col)).cos())
                / (n * n);
        }
        particles.densities_mut()[a] = REST_DENSITY + pressure / cs_sq;
    }
}

/// Total mechanical energy (kinetic plus gravitational potential) of the fluid
pub fn total_fluid_energy(particles: &ParticleSet<f64>) -> f64 {
    let m = particles.particle_mass();
    particles
        .fluid()
        .map(|a| {
            let v = particles.velocities()[a];
            let y = particles.positions()[a].y;
            0.5 * m * v.norm_squared() + m * GRAVITY * y
        })
        .sum()
}
