//! Reconstruction of density and velocity on fixed boundary particles
//!
//! Every fixed particle is mirrored across the closest point of the pool boundary and
//! its state is interpolated at the mirrored point from the surrounding fluid: first by
//! first-order moving least squares, falling back to a Shepard average when the moment
//! matrix is near-singular, and to the reference rest state when even the Shepard
//! denominator vanishes. The interpolated state then receives a hydrostatic density
//! correction and a slip-wall velocity reflection.

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use crate::kernel::SmoothingKernel;
use crate::linalg;
use crate::mesh::{ParticleMesh, RADIUS_SCALE};
use crate::parallel::as_sync_cells;
use crate::particles::{FieldSet, ParticleSet};
use crate::utils::normalize_or_zero;
use crate::{FluidParameters, Real};

/// Interpolates the state of every fixed particle from the fluid
pub(crate) fn setup_boundary<R, K>(
    kernel: &K,
    parameters: &FluidParameters<R>,
    mesh: &ParticleMesh,
    particles: &mut ParticleSet<R>,
) where
    R: Real,
    K: SmoothingKernel<R>,
{
    profile!("setup_boundary");

    let num_fluid = particles.num_fluid();
    let num_fixed = particles.num_fixed();
    let h = particles.smoothing_length();
    let m = particles.particle_mass();
    let has_u = particles.has(FieldSet::INTERNAL_ENERGY);
    let h_ghost = R::from_float(RADIUS_SCALE) * h;
    let two = R::from_float(2.0);

    let rho_cells = as_sync_cells(&mut particles.rho);
    let v_cells = as_sync_cells(&mut particles.v);
    let u_cells = as_sync_cells(&mut particles.u);
    let positions = &particles.r;

    (0..num_fixed).into_par_iter().for_each(|ordinal| {
        let b = num_fluid + ordinal;
        let search_point = positions[b];
        let clipped_point = parameters.domain.clamp(&search_point);
        let r_ghost = clipped_point * two - search_point;
        let surface_normal = normalize_or_zero(&(search_point - clipped_point));
        let surface_distance = (r_ghost - search_point).norm();

        // Interpolation weights for both the constant and the linear reconstruction.
        let mut shepard = R::zero();
        let mut moments = Matrix3::<R>::zeros();
        for &a in mesh.interp_neighbors(ordinal) {
            let r_delta = r_ghost - positions[a];
            let basis = Vector3::new(R::one(), r_delta.x, r_delta.y);
            // SAFETY: fluid entries are only read during this pass.
            let volume = m / unsafe { rho_cells[a].read() };
            let w_delta = kernel.value(&r_delta, h_ghost) * volume;
            shepard += w_delta;
            moments += basis * (basis * w_delta).transpose();
        }

        // SAFETY: the state of fixed particle `b` is written by this task alone.
        unsafe {
            if let Ok(fact) = linalg::ldlt(&moments) {
                // Linear interpolation succeeds, use it.
                let weights = fact.solve(Vector3::new(R::one(), R::zero(), R::zero()));
                *rho_cells[b].get() = R::zero();
                *v_cells[b].get() = nalgebra::Vector2::zeros();
                if has_u {
                    *u_cells[b].get() = R::zero();
                }
                for &a in mesh.interp_neighbors(ordinal) {
                    let r_delta = r_ghost - positions[a];
                    let basis = Vector3::new(R::one(), r_delta.x, r_delta.y);
                    let w_delta = weights.dot(&basis) * kernel.value(&r_delta, h_ghost);
                    let rho_a = rho_cells[a].read();
                    *rho_cells[b].get() += m * w_delta;
                    *v_cells[b].get() += v_cells[a].read() * (m / rho_a * w_delta);
                    if has_u {
                        *u_cells[b].get() += u_cells[a].read() * (m / rho_a * w_delta);
                    }
                }
            } else if !shepard.is_tiny() {
                // Constant interpolation succeeds, use it.
                let inv_shepard = R::one() / shepard;
                *rho_cells[b].get() = R::zero();
                *v_cells[b].get() = nalgebra::Vector2::zeros();
                if has_u {
                    *u_cells[b].get() = R::zero();
                }
                for &a in mesh.interp_neighbors(ordinal) {
                    let r_delta = r_ghost - positions[a];
                    let w_delta = inv_shepard * kernel.value(&r_delta, h_ghost);
                    let rho_a = rho_cells[a].read();
                    *rho_cells[b].get() += m * w_delta;
                    *v_cells[b].get() += v_cells[a].read() * (m / rho_a * w_delta);
                    if has_u {
                        *u_cells[b].get() += u_cells[a].read() * (m / rho_a * w_delta);
                    }
                }
            } else {
                // Both interpolations fail, fall back to the rest state.
                *rho_cells[b].get() = parameters.rest_density;
                *v_cells[b].get() = nalgebra::Vector2::zeros();
                if has_u {
                    *u_cells[b].get() = R::zero();
                }
                return;
            }

            // Hydrostatic correction: drho/dn = rho_0 / cs_0^2 * dot(g, n).
            let cs_sq = parameters.sound_speed * parameters.sound_speed;
            *rho_cells[b].get() += surface_distance * parameters.rest_density / cs_sq
                * parameters.gravity.dot(&surface_normal);

            // Slip wall: reflect the normal velocity component.
            let v_b = v_cells[b].read();
            let v_normal = surface_normal * v_b.dot(&surface_normal);
            let v_tangent = v_b - v_normal;
            *v_cells[b].get() = v_tangent - v_normal;
        }
    });
}
