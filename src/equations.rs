//! The fluid equation bundle and its field operators
//!
//! [`FluidEquations`] composes the plug points (kernel, equation of state, dissipative
//! terms, optional shifting) and implements the per-step phases the integrators drive:
//! boundary setup, density update, force update and particle shifting. All pair loops
//! run in block-parallel order over the mesh edges; per-particle passes are plain
//! parallel maps.

use nalgebra::Vector2;
use rayon::prelude::*;

use crate::boundary;
use crate::conductivity::HeatConductivity;
use crate::eos::EquationOfState;
use crate::kernel::SmoothingKernel;
use crate::mesh::ParticleMesh;
use crate::parallel::as_sync_cells;
use crate::particles::{FieldSet, PairFields, ParticleSet};
use crate::shifting::{self, ParticleShifting};
use crate::utils::normalize_or_zero;
use crate::viscosity::ArtificialViscosity;
use crate::viscosity::Viscosity;
use crate::{FluidParameters, Real};

/// Equation set advanced by the explicit time integrators
///
/// The integrators only see this interface; the SSPRK convergence tests instantiate it
/// with a trivial equation set.
pub trait ExplicitEquations<R: Real>: Send + Sync {
    /// One-time initialization of optional fields before the first step
    fn init(&self, particles: &mut ParticleSet<R>);

    /// Rebuilds the mesh from the current particle positions
    fn update_mesh(&self, mesh: &mut ParticleMesh, particles: &mut ParticleSet<R>);

    /// Reconstructs the state of the fixed particles
    fn setup_boundary(&self, mesh: &ParticleMesh, particles: &mut ParticleSet<R>);

    /// Updates the density-related fields
    fn compute_density(&self, mesh: &ParticleMesh, particles: &mut ParticleSet<R>);

    /// Updates the velocity- and energy-related fields
    fn compute_forces(&self, mesh: &ParticleMesh, particles: &mut ParticleSet<R>);

    /// Computes the particle-shifting displacement correction
    fn compute_shifts(&self, mesh: &ParticleMesh, particles: &mut ParticleSet<R>);

    /// Whether shifting is enabled and [`ExplicitEquations::compute_shifts`] should run
    fn has_shifting(&self) -> bool;
}

/// Weakly-compressible fluid equations with a fixed kernel width
pub struct FluidEquations<R, K, E, AV, V, HC>
where
    R: Real,
    K: SmoothingKernel<R>,
    E: EquationOfState<R>,
    AV: ArtificialViscosity<R>,
    V: Viscosity<R>,
    HC: HeatConductivity<R>,
{
    kernel: K,
    eos: E,
    artificial_viscosity: AV,
    viscosity: V,
    conductivity: HC,
    shifting: Option<ParticleShifting<R>>,
    parameters: FluidParameters<R>,
    extra_fields: FieldSet,
}

impl<R, K, E, AV, V, HC> FluidEquations<R, K, E, AV, V, HC>
where
    R: Real,
    K: SmoothingKernel<R>,
    E: EquationOfState<R>,
    AV: ArtificialViscosity<R>,
    V: Viscosity<R>,
    HC: HeatConductivity<R>,
{
    /// Composes the fluid equations from their plug points
    pub fn new(
        kernel: K,
        eos: E,
        artificial_viscosity: AV,
        viscosity: V,
        conductivity: HC,
        shifting: Option<ParticleShifting<R>>,
        parameters: FluidParameters<R>,
    ) -> Self {
        Self {
            kernel,
            eos,
            artificial_viscosity,
            viscosity,
            conductivity,
            shifting,
            parameters,
            extra_fields: FieldSet::empty(),
        }
    }

    /// Additionally enables the given optional particle columns
    pub fn enable_fields(mut self, fields: FieldSet) -> Self {
        self.extra_fields |= fields;
        self
    }

    /// The kernel of this equation set
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// The configuration of this equation set
    pub fn parameters(&self) -> &FluidParameters<R> {
        &self.parameters
    }

    /// Union of the optional particle columns required by all components
    ///
    /// A [`ParticleSet`] advanced by these equations must be constructed with at least
    /// this field set.
    pub fn required_fields(&self) -> FieldSet {
        let mut fields = self.eos.required_fields()
            | self.artificial_viscosity.required_fields()
            | self.viscosity.required_fields()
            | self.conductivity.required_fields()
            | self.extra_fields;
        if self.shifting.is_some() {
            fields |= FieldSet::SHIFTING | FieldSet::NORMAL;
        }
        fields
    }

}

/// Builds the read-only pair-field view from disjoint column borrows
///
/// A macro instead of a method so it can coexist with `SyncCell` borrows of the
/// derivative columns of the same particle set.
macro_rules! pair_fields {
    ($particles:expr, $h:expr, $m:expr) => {
        PairFields {
            h: $h,
            m: $m,
            r: &$particles.r,
            v: &$particles.v,
            rho: &$particles.rho,
            p: &$particles.p,
            grad_rho: &$particles.grad_rho,
            l: &$particles.l,
            cs: &$particles.cs,
            div_v: &$particles.div_v,
            curl_v: &$particles.curl_v,
            alpha: &$particles.alpha,
            u: &$particles.u,
        }
    };
}

impl<R, K, E, AV, V, HC> ExplicitEquations<R> for FluidEquations<R, K, E, AV, V, HC>
where
    R: Real,
    K: SmoothingKernel<R>,
    E: EquationOfState<R>,
    AV: ArtificialViscosity<R>,
    V: Viscosity<R>,
    HC: HeatConductivity<R>,
{
    fn init(&self, particles: &mut ParticleSet<R>) {
        profile!("FluidEquations::init");
        assert!(
            particles.has(self.required_fields()),
            "particle set is missing fields required by the equations"
        );
        if particles.has(FieldSet::VISCOSITY_SWITCH) {
            particles
                .alpha
                .par_iter_mut()
                .for_each(|alpha| *alpha = R::one());
        }
    }

    fn update_mesh(&self, mesh: &mut ParticleMesh, particles: &mut ParticleSet<R>) {
        let radius = self.kernel.radius(particles.smoothing_length());
        mesh.update(particles, &self.parameters.domain, |_| radius);
    }

    fn setup_boundary(&self, mesh: &ParticleMesh, particles: &mut ParticleSet<R>) {
        boundary::setup_boundary(&self.kernel, &self.parameters, mesh, particles);
    }

    fn compute_density(&self, mesh: &ParticleMesh, particles: &mut ParticleSet<R>) {
        profile!("FluidEquations::compute_density");

        let h = particles.smoothing_length();
        let m = particles.particle_mass();
        let has_c = particles.has(FieldSet::CONCENTRATION);
        let has_n = particles.has(FieldSet::NORMAL);
        let has_l = particles.has(FieldSet::RENORMALIZATION);

        // Clear the continuity fields. The continuity equation currently has no mass
        // sources, so drho_dt starts from zero.
        particles.drho_dt.par_iter_mut().for_each(|x| *x = R::zero());
        particles
            .grad_rho
            .par_iter_mut()
            .for_each(|x| *x = Vector2::zeros());
        particles.c.par_iter_mut().for_each(|x| *x = R::zero());
        particles
            .n
            .par_iter_mut()
            .for_each(|x| *x = Vector2::zeros());
        particles
            .l
            .par_iter_mut()
            .for_each(|x| *x = nalgebra::Matrix2::zeros());

        // Accumulate the density gradient and the renormalization fields.
        {
            let grad_rho_cells = as_sync_cells(&mut particles.grad_rho);
            let c_cells = as_sync_cells(&mut particles.c);
            let n_cells = as_sync_cells(&mut particles.n);
            let l_cells = as_sync_cells(&mut particles.l);
            let rho = &particles.rho;
            let positions = &particles.r;

            mesh.for_each_pair(positions, h, &self.kernel, |a, b, w, grad_w| {
                let vol_a = m / rho[a];
                let vol_b = m / rho[b];

                // SAFETY: the block partitioning serializes writes per particle.
                unsafe {
                    let grad_flux = grad_w * (rho[b] - rho[a]);
                    *grad_rho_cells[a].get() += grad_flux * vol_b;
                    *grad_rho_cells[b].get() += grad_flux * vol_a;

                    if has_c {
                        *c_cells[a].get() += vol_b * w;
                        *c_cells[b].get() += vol_a * w;
                    }

                    if has_n {
                        *n_cells[a].get() += grad_w * vol_b;
                        *n_cells[b].get() -= grad_w * vol_a;
                    }

                    if has_l {
                        let l_flux = (positions[b] - positions[a]) * grad_w.transpose();
                        *l_cells[a].get() += l_flux * vol_b;
                        *l_cells[b].get() += l_flux * vol_a;
                    }
                }
            });
        }

        // Renormalize the accumulated fields.
        {
            let rho_cells = as_sync_cells(&mut particles.rho);
            let grad_rho_cells = as_sync_cells(&mut particles.grad_rho);
            let n_cells = as_sync_cells(&mut particles.n);
            let c = &particles.c;
            let l = &particles.l;

            (0..rho_cells.len()).into_par_iter().for_each(|i| {
                // SAFETY: every index is visited by exactly one task.
                unsafe {
                    if has_c && !c[i].is_tiny() {
                        *rho_cells[i].get() /= c[i];
                    }

                    if has_l {
                        if let Ok(fact) = crate::linalg::ldlt(&l[i]) {
                            if has_n {
                                *n_cells[i].get() = fact.solve(n_cells[i].read());
                            }
                            *grad_rho_cells[i].get() = fact.solve(grad_rho_cells[i].read());
                        }
                    }

                    if has_n {
                        *n_cells[i].get() = normalize_or_zero(&n_cells[i].read());
                    }
                }
            });
        }

        // Accumulate the density time derivative with the diffusive term.
        {
            let drho_dt_cells = as_sync_cells(&mut particles.drho_dt);
            let fields = pair_fields!(particles, h, m);

            mesh.for_each_pair(fields.r, h, &self.kernel, |a, b, _w, grad_w| {
                let psi_ab = self.artificial_viscosity.density_term(&fields, a, b);
                let v_ba = fields.v[b] - fields.v[a];

                // SAFETY: the block partitioning serializes writes per particle.
                unsafe {
                    *drho_dt_cells[a].get() -= m * (v_ba - psi_ab / fields.rho[b]).dot(&grad_w);
                    *drho_dt_cells[b].get() -= m * (v_ba + psi_ab / fields.rho[a]).dot(&grad_w);
                }
            });
        }
    }

    fn compute_forces(&self, mesh: &ParticleMesh, particles: &mut ParticleSet<R>) {
        profile!("FluidEquations::compute_forces");

        let h = particles.smoothing_length();
        let m = particles.particle_mass();
        let has_cs = particles.has(FieldSet::SOUND_SPEED);
        let has_div = particles.has(FieldSet::DIVERGENCE);
        let has_curl = particles.has(FieldSet::CURL);
        let has_u = particles.has(FieldSet::INTERNAL_ENERGY);
        let gravity = self.parameters.gravity;

        // Clear the momentum and energy fields, apply the gravity source and evaluate
        // the equation of state.
        {
            let dv_dt_cells = as_sync_cells(&mut particles.dv_dt);
            let du_dt_cells = as_sync_cells(&mut particles.du_dt);
            let p_cells = as_sync_cells(&mut particles.p);
            let cs_cells = as_sync_cells(&mut particles.cs);
            let div_v_cells = as_sync_cells(&mut particles.div_v);
            let curl_v_cells = as_sync_cells(&mut particles.curl_v);
            let rho = &particles.rho;
            let v = &particles.v;
            let u = &particles.u;

            (0..rho.len()).into_par_iter().for_each(|i| {
                // SAFETY: every index is visited by exactly one task.
                unsafe {
                    *dv_dt_cells[i].get() = gravity;
                    if has_div {
                        *div_v_cells[i].get() = R::zero();
                    }
                    if has_curl {
                        *curl_v_cells[i].get() = R::zero();
                    }

                    let u_i = if has_u { u[i] } else { R::zero() };
                    if has_u {
                        *du_dt_cells[i].get() = gravity.dot(&v[i]);
                    }

                    let pressure = self.eos.pressure(rho[i], u_i);
                    *p_cells[i].get() = pressure;
                    if has_cs {
                        *cs_cells[i].get() = self.eos.sound_speed(rho[i], pressure, u_i);
                    }
                }
            });
        }

        // Velocity divergence and curl, needed by the switch-based viscosities.
        if has_div || has_curl {
            let div_v_cells = as_sync_cells(&mut particles.div_v);
            let curl_v_cells = as_sync_cells(&mut particles.curl_v);
            let rho = &particles.rho;
            let v = &particles.v;

            mesh.for_each_pair(&particles.r, h, &self.kernel, |a, b, _w, grad_w| {
                let vol_a = m / rho[a];
                let vol_b = m / rho[b];
                let v_ba = v[b] - v[a];

                // SAFETY: the block partitioning serializes writes per particle.
                unsafe {
                    if has_div {
                        let div_flux = v_ba.dot(&grad_w);
                        *div_v_cells[a].get() += vol_b * div_flux;
                        *div_v_cells[b].get() += vol_a * div_flux;
                    }
                    if has_curl {
                        let curl_flux = -v_ba.perp(&grad_w);
                        *curl_v_cells[a].get() += vol_b * curl_flux;
                        *curl_v_cells[b].get() += vol_a * curl_flux;
                    }
                }
            });
        }

        // Momentum and energy fluxes.
        {
            let dv_dt_cells = as_sync_cells(&mut particles.dv_dt);
            let du_dt_cells = as_sync_cells(&mut particles.du_dt);
            let fields = pair_fields!(particles, h, m);
            let half = R::from_float(0.5);

            mesh.for_each_pair(fields.r, h, &self.kernel, |a, b, _w, grad_w| {
                let p_a = fields.p[a] / (fields.rho[a] * fields.rho[a]);
                let p_b = fields.p[b] / (fields.rho[b] * fields.rho[b]);
                let pi_ab = self.viscosity.velocity_term(&fields, a, b)
                    + self.artificial_viscosity.velocity_term(&fields, a, b);
                let v_flux = grad_w * (-p_a - p_b + pi_ab);

                // SAFETY: the block partitioning serializes writes per particle.
                unsafe {
                    *dv_dt_cells[a].get() += v_flux * m;
                    *dv_dt_cells[b].get() -= v_flux * m;

                    if has_u {
                        let q_ab = self.conductivity.flux(&fields, a, b);
                        let v_ba = fields.v[b] - fields.v[a];
                        *du_dt_cells[a].get() -=
                            m * (v_ba * (p_a - pi_ab * half) - q_ab).dot(&grad_w);
                        *du_dt_cells[b].get() -=
                            m * (v_ba * (p_b - pi_ab * half) + q_ab).dot(&grad_w);
                    }
                }
            });
        }

        // Evolve the artificial-viscosity switch.
        if self.artificial_viscosity.has_switch() {
            let num_fluid = particles.num_fluid();
            let dalpha_dt_cells = as_sync_cells(&mut particles.dalpha_dt);
            let fields = pair_fields!(particles, h, m);

            (0..num_fluid).into_par_iter().for_each(|i| {
                // SAFETY: every index is visited by exactly one task.
                unsafe {
                    *dalpha_dt_cells[i].get() = self.artificial_viscosity.switch_source(&fields, i);
                }
            });
        }
    }

    fn compute_shifts(&self, mesh: &ParticleMesh, particles: &mut ParticleSet<R>) {
        let shifting = self
            .shifting
            .as_ref()
            .expect("shifting is not enabled on this equation set");
        shifting::compute_shifts(shifting, &self.kernel, mesh, particles);
    }

    fn has_shifting(&self) -> bool {
        self.shifting.is_some()
    }
}
