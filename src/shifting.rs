//! Particle shifting with free-surface classification
//!
//! Shifting nudges fluid particles towards a more uniform distribution. Particles on or
//! near the free surface must not be shifted across it, so the particles are first
//! classified by the directional neighbor-deficit ("visibility") test of Marrone et al.
//! and the shifting magnitude is attenuated near the surface and suppressed entirely
//! next to walls.
//!
//! The classification that depends on neighbor classifications runs as a two-pass
//! update through a scratch copy of the previous values, so no field is read and
//! written concurrently.

use nalgebra::Vector2;
use numeric_literals::replace_float_literals;
use rayon::prelude::*;

use crate::kernel::SmoothingKernel;
use crate::mesh::ParticleMesh;
use crate::parallel::as_sync_cells;
use crate::particles::{FieldSet, ParticleSet};
use crate::Real;

/// Parameters of the particle-shifting technique
#[derive(Copy, Clone, Debug)]
pub struct ParticleShifting<R: Real> {
    /// Shifting strength coefficient
    pub strength: R,
    /// Mach number scale entering the far-from-surface magnitude
    pub mach: R,
    /// CFL number entering the far-from-surface magnitude
    pub cfl: R,
}

impl<R: Real> ParticleShifting<R> {
    /// Constructs the technique with the standard coefficients
    #[replace_float_literals(R::from_float(literal))]
    pub fn new() -> Self {
        Self {
            strength: 0.2,
            mach: 0.1,
            cfl: 0.8,
        }
    }
}

impl<R: Real> Default for ParticleShifting<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the shifting displacement `dr` of every fluid particle
#[replace_float_literals(R::from_float(literal))]
pub(crate) fn compute_shifts<R, K>(
    shifting: &ParticleShifting<R>,
    kernel: &K,
    mesh: &ParticleMesh,
    particles: &mut ParticleSet<R>,
) where
    R: Real,
    K: SmoothingKernel<R>,
{
    profile!("compute_shifts");
    assert!(
        particles.has(FieldSet::SHIFTING | FieldSet::NORMAL),
        "shifting requires the dr/FS and N columns"
    );

    let num_fluid = particles.num_fluid();
    let h = particles.smoothing_length();
    let m = particles.particle_mass();

    // Classification values: `fs_on` marks a particle on the free surface (a distinct
    // near-zero constant), `fs_far` a particle far from it; intermediate values scale
    // the shift near the surface.
    let fs_on = R::min_positive();
    let fs_far = 2.0 * shifting.cfl * shifting.mach * h * h;

    // Initialize the classification and clear the shifts.
    {
        let (fs_fluid, fs_fixed) = particles.fs.split_at_mut(num_fluid);
        fs_fluid.par_iter_mut().for_each(|fs| *fs = fs_on);
        fs_fixed.par_iter_mut().for_each(|fs| *fs = fs_far);
        particles
            .dr
            .par_iter_mut()
            .for_each(|dr| *dr = Vector2::zeros());
    }

    // Visibility test: a particle that sees a neighbor within a quarter-pi cone around
    // its outward normal is not on the free surface. The test is the optimized form of
    // `acos(dot(N, r_ab) / |r_ab|) <= fov`.
    {
        let fs_cells = as_sync_cells(&mut particles.fs);
        let normals = &particles.n;
        let positions = &particles.r;
        let dist_threshold = (2.0 * h) * (2.0 * h);
        let cos_fov = R::from_float(std::f64::consts::FRAC_1_SQRT_2);

        mesh.for_each_pair(positions, h, kernel, |a, b, _w, _grad_w| {
            let r_ab = positions[a] - positions[b];
            let dist_sq = r_ab.norm_squared();
            if dist_sq > dist_threshold {
                return;
            }
            let fov_threshold = cos_fov * dist_sq;

            // SAFETY: the block partitioning serializes access per particle.
            unsafe {
                if fs_cells[a].read() == fs_on {
                    let n_a = normals[a].dot(&r_ab);
                    if n_a > R::zero() && n_a * n_a >= fov_threshold {
                        *fs_cells[a].get() = fs_far;
                    }
                }
                if fs_cells[b].read() == fs_on {
                    let n_b = normals[b].dot(&r_ab);
                    if n_b < R::zero() && n_b * n_b >= fov_threshold {
                        *fs_cells[b].get() = fs_far;
                    }
                }
            }
        });
    }

    // Reclassify particles away from the surface: freeze the shift next to walls and
    // attenuate it for particles with a free-surface neighbor. This pass reads neighbor
    // classifications, so it works on a scratch copy of the previous values.
    {
        let fs_prev = particles.fs.clone();
        let normals = &particles.n;
        let positions = &particles.r;
        let kernel_radius = kernel.radius(h);

        let (fs_fluid, _) = particles.fs.split_at_mut(num_fluid);
        fs_fluid.par_iter_mut().enumerate().for_each(|(a, fs_a)| {
            if fs_prev[a] != fs_far {
                return;
            }

            // Do not shift particles adjacent to the walls.
            if mesh.neighbors(a).iter().any(|&j| j >= num_fluid) {
                *fs_a = 1.0e-30 * fs_far;
                return;
            }

            let on_surface = |j: usize| fs_prev[j] == fs_on;
            if mesh.neighbors(a).iter().any(|&j| on_surface(j)) {
                let closest = mesh
                    .neighbors(a)
                    .iter()
                    .copied()
                    .filter(|&j| on_surface(j))
                    .min_by(|&i, &j| {
                        let d_i = (positions[a] - positions[i]).norm_squared();
                        let d_j = (positions[a] - positions[j]).norm_squared();
                        d_i.partial_cmp(&d_j).expect("distances must not be NaN")
                    })
                    .expect("a surface neighbor exists");
                let r_ab = positions[a] - positions[closest];
                *fs_a *= normals[closest].dot(&r_ab).abs() / kernel_radius;
            }
        });
    }

    // Accumulate the displacements.
    {
        let dr_cells = as_sync_cells(&mut particles.dr);
        let fs = &particles.fs;
        let rho = &particles.rho;
        let positions = &particles.r;
        let w_0 = kernel.value(&Vector2::new(h * 0.5, R::zero()), h);
        let inv_w_0 = 1.0 / w_0;
        let strength = shifting.strength;

        mesh.for_each_pair(positions, h, kernel, |a, b, w, grad_w| {
            let chi_ab = strength * (w * inv_w_0).powi(4);
            let xi_a = if fs[a] == fs_far { R::one() } else { R::zero() };
            let xi_b = if fs[b] == fs_far { R::one() } else { R::zero() };

            // SAFETY: the block partitioning serializes writes per particle.
            unsafe {
                *dr_cells[a].get() -= grad_w * ((xi_a + chi_ab) * fs[a] * m / rho[b]);
                *dr_cells[b].get() += grad_w * ((xi_b + chi_ab) * fs[b] * m / rho[a]);
            }
        });
    }
}
