//! Explicit time integrators
//!
//! All integrators drive the same phase sequence per evaluation (boundary → density →
//! forces, with shifting after the last stage) and rebuild the mesh every
//! `mesh_update_freq` steps; between rebuilds the mesh is reused and position drift is
//! absorbed. The reference integrator is the three-stage strong-stability-preserving
//! Runge-Kutta method SSPRK(3,3).

use std::marker::PhantomData;

use numeric_literals::replace_float_literals;
use rayon::prelude::*;

use crate::equations::ExplicitEquations;
use crate::mesh::ParticleMesh;
use crate::parallel::as_sync_cells;
use crate::particles::{FieldSet, ParticleSet};
use crate::Real;

/// Default number of steps between mesh rebuilds
pub const DEFAULT_MESH_UPDATE_FREQ: usize = 10;

/// Stable time-step estimate `min(CFL * h / c_0, 0.25 * sqrt(h / g))` with `CFL = 0.8`
///
/// The integrators accept any positive time step; this formula is a helper for drivers.
#[replace_float_literals(R::from_float(literal))]
pub fn stable_time_step<R: Real>(h: R, sound_speed: R, gravity: R) -> R {
    assert!(h > 0.0 && sound_speed > 0.0 && gravity > 0.0);
    let cfl = 0.8;
    (cfl * h / sound_speed).min(0.25 * (h / gravity).sqrt())
}

/// Advances the integrated state of every fluid particle by one explicit Euler
/// increment, position before velocity (drift-kick)
fn drift_kick<R: Real>(particles: &mut ParticleSet<R>, dt: R) {
    let num_fluid = particles.num_fluid();
    let has_u = particles.has(FieldSet::INTERNAL_ENERGY);
    let has_alpha = particles.has(FieldSet::VISCOSITY_SWITCH);

    let r_cells = as_sync_cells(&mut particles.r);
    let v_cells = as_sync_cells(&mut particles.v);
    let rho_cells = as_sync_cells(&mut particles.rho);
    let u_cells = as_sync_cells(&mut particles.u);
    let alpha_cells = as_sync_cells(&mut particles.alpha);
    let dv_dt = &particles.dv_dt;
    let drho_dt = &particles.drho_dt;
    let du_dt = &particles.du_dt;
    let dalpha_dt = &particles.dalpha_dt;

    (0..num_fluid).into_par_iter().for_each(|i| {
        // SAFETY: every index is visited by exactly one task.
        unsafe {
            *r_cells[i].get() += v_cells[i].read() * dt;
            *v_cells[i].get() += dv_dt[i] * dt;
            *rho_cells[i].get() += drho_dt[i] * dt;
            if has_u {
                *u_cells[i].get() += du_dt[i] * dt;
            }
            if has_alpha {
                *alpha_cells[i].get() += dalpha_dt[i] * dt;
            }
        }
    });
}

/// Advances velocity, energy and switch of every fluid particle (kick only)
fn kick<R: Real>(particles: &mut ParticleSet<R>, dt: R) {
    let num_fluid = particles.num_fluid();
    let has_u = particles.has(FieldSet::INTERNAL_ENERGY);
    let has_alpha = particles.has(FieldSet::VISCOSITY_SWITCH);

    let v_cells = as_sync_cells(&mut particles.v);
    let u_cells = as_sync_cells(&mut particles.u);
    let alpha_cells = as_sync_cells(&mut particles.alpha);
    let dv_dt = &particles.dv_dt;
    let du_dt = &particles.du_dt;
    let dalpha_dt = &particles.dalpha_dt;

    (0..num_fluid).into_par_iter().for_each(|i| {
        // SAFETY: every index is visited by exactly one task.
        unsafe {
            *v_cells[i].get() += dv_dt[i] * dt;
            if has_u {
                *u_cells[i].get() += du_dt[i] * dt;
            }
            if has_alpha {
                *alpha_cells[i].get() += dalpha_dt[i] * dt;
            }
        }
    });
}

/// Advances the density of every fluid particle
fn advance_density<R: Real>(particles: &mut ParticleSet<R>, dt: R) {
    let num_fluid = particles.num_fluid();
    let (rho, _) = particles.rho.split_at_mut(num_fluid);
    rho.par_iter_mut()
        .zip(particles.drho_dt[..num_fluid].par_iter())
        .for_each(|(rho, &drho_dt)| *rho += drho_dt * dt);
}

/// Advances the position of every fluid particle by `dt * v`
fn drift<R: Real>(particles: &mut ParticleSet<R>, dt: R) {
    let num_fluid = particles.num_fluid();
    let (r, _) = particles.r.split_at_mut(num_fluid);
    r.par_iter_mut()
        .zip(particles.v[..num_fluid].par_iter())
        .for_each(|(r, v)| *r += v * dt);
}

/// Applies the shifting displacement to every fluid particle
fn apply_shifts<R: Real, E: ExplicitEquations<R>>(
    equations: &E,
    mesh: &ParticleMesh,
    particles: &mut ParticleSet<R>,
) {
    if !equations.has_shifting() {
        return;
    }
    equations.compute_shifts(mesh, particles);
    let num_fluid = particles.num_fluid();
    let (r, _) = particles.r.split_at_mut(num_fluid);
    r.par_iter_mut()
        .zip(particles.dr[..num_fluid].par_iter())
        .for_each(|(r, dr)| *r += dr);
}

/// Kick-drift Euler time integrator
pub struct EulerIntegrator<R: Real, E: ExplicitEquations<R>> {
    equations: E,
    mesh_update_freq: usize,
    step_index: usize,
    _real: PhantomData<R>,
}

impl<R: Real, E: ExplicitEquations<R>> EulerIntegrator<R, E> {
    /// Constructs the integrator with the default mesh-update cadence
    pub fn new(equations: E) -> Self {
        Self::with_mesh_update_freq(equations, DEFAULT_MESH_UPDATE_FREQ)
    }

    /// Constructs the integrator with an explicit mesh-update cadence
    pub fn with_mesh_update_freq(equations: E, mesh_update_freq: usize) -> Self {
        assert!(mesh_update_freq > 0, "mesh update frequency must be positive");
        Self {
            equations,
            mesh_update_freq,
            step_index: 0,
            _real: PhantomData,
        }
    }

    /// The embedded equation set
    pub fn equations(&self) -> &E {
        &self.equations
    }

    /// Advances the particles by one step of size `dt`
    pub fn step(&mut self, dt: R, mesh: &mut ParticleMesh, particles: &mut ParticleSet<R>) {
        profile!("EulerIntegrator::step");
        assert!(dt > R::zero(), "time step must be positive");

        if self.step_index == 0 {
            self.equations.init(particles);
        }
        if self.step_index % self.mesh_update_freq == 0 {
            self.equations.update_mesh(mesh, particles);
        }

        self.equations.setup_boundary(mesh, particles);

        self.equations.compute_density(mesh, particles);
        advance_density(particles, dt);

        self.equations.compute_forces(mesh, particles);
        kick(particles, dt);
        // Kick-drift: the position is updated with the new velocity.
        drift(particles, dt);

        apply_shifts(&self.equations, mesh, particles);
        self.step_index += 1;
    }
}

/// Kick-drift-kick leapfrog time integrator
pub struct LeapfrogIntegrator<R: Real, E: ExplicitEquations<R>> {
    equations: E,
    mesh_update_freq: usize,
    step_index: usize,
    _real: PhantomData<R>,
}

impl<R: Real, E: ExplicitEquations<R>> LeapfrogIntegrator<R, E> {
    /// Constructs the integrator with the default mesh-update cadence
    pub fn new(equations: E) -> Self {
        Self::with_mesh_update_freq(equations, DEFAULT_MESH_UPDATE_FREQ)
    }

    /// Constructs the integrator with an explicit mesh-update cadence
    pub fn with_mesh_update_freq(equations: E, mesh_update_freq: usize) -> Self {
        assert!(mesh_update_freq > 0, "mesh update frequency must be positive");
        Self {
            equations,
            mesh_update_freq,
            step_index: 0,
            _real: PhantomData,
        }
    }

    /// The embedded equation set
    pub fn equations(&self) -> &E {
        &self.equations
    }

    /// Advances the particles by one step of size `dt`
    #[replace_float_literals(R::from_float(literal))]
    pub fn step(&mut self, dt: R, mesh: &mut ParticleMesh, particles: &mut ParticleSet<R>) {
        profile!("LeapfrogIntegrator::step");
        assert!(dt > 0.0, "time step must be positive");

        if self.step_index == 0 {
            self.equations.init(particles);
        }
        if self.step_index % self.mesh_update_freq == 0 {
            self.equations.update_mesh(mesh, particles);
        }

        self.equations.setup_boundary(mesh, particles);

        // First half-kick and full drift.
        let dt_2 = dt / 2.0;
        self.equations.compute_forces(mesh, particles);
        kick(particles, dt_2);
        drift(particles, dt);

        // Full density update.
        self.equations.compute_density(mesh, particles);
        advance_density(particles, dt);

        // Second half-kick.
        self.equations.compute_forces(mesh, particles);
        kick(particles, dt_2);

        apply_shifts(&self.equations, mesh, particles);
        self.step_index += 1;
    }
}

/// Strong-stability-preserving Runge-Kutta time integrator, SSPRK(3,3)
pub struct RungeKuttaIntegrator<R: Real, E: ExplicitEquations<R>> {
    equations: E,
    mesh_update_freq: usize,
    step_index: usize,
    _real: PhantomData<R>,
}

impl<R: Real, E: ExplicitEquations<R>> RungeKuttaIntegrator<R, E> {
    /// Constructs the integrator with the default mesh-update cadence
    pub fn new(equations: E) -> Self {
        Self::with_mesh_update_freq(equations, DEFAULT_MESH_UPDATE_FREQ)
    }

    /// Constructs the integrator with an explicit mesh-update cadence
    pub fn with_mesh_update_freq(equations: E, mesh_update_freq: usize) -> Self {
        assert!(mesh_update_freq > 0, "mesh update frequency must be positive");
        Self {
            equations,
            mesh_update_freq,
            step_index: 0,
            _real: PhantomData,
        }
    }

    /// The embedded equation set
    pub fn equations(&self) -> &E {
        &self.equations
    }

    /// Advances the particles by one step of size `dt`
    #[replace_float_literals(R::from_float(literal))]
    pub fn step(&mut self, dt: R, mesh: &mut ParticleMesh, particles: &mut ParticleSet<R>) {
        profile!("RungeKuttaIntegrator::step");
        assert!(dt > 0.0, "time step must be positive");

        if self.step_index == 0 {
            self.equations.init(particles);
        }
        if self.step_index % self.mesh_update_freq == 0 {
            self.equations.update_mesh(mesh, particles);
        }

        // SSPRK(3,3) stages with their linear combinations.
        let old_state = particles.snapshot_state();
        self.substep(dt, mesh, particles);
        self.substep(dt, mesh, particles);
        particles.blend_state(0.75, &old_state, 0.25);
        self.substep(dt, mesh, particles);
        particles.blend_state(1.0 / 3.0, &old_state, 2.0 / 3.0);

        apply_shifts(&self.equations, mesh, particles);
        self.step_index += 1;
    }

    fn substep(&self, dt: R, mesh: &ParticleMesh, particles: &mut ParticleSet<R>) {
        self.equations.setup_boundary(mesh, particles);
        self.equations.compute_density(mesh, particles);
        self.equations.compute_forces(mesh, particles);
        drift_kick(particles, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::ParticleKind;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    /// Trivial equation set integrating `dv/dt = -v`
    struct DecayEquations;

    impl ExplicitEquations<f64> for DecayEquations {
        fn init(&self, _particles: &mut ParticleSet<f64>) {}
        fn update_mesh(&self, _mesh: &mut ParticleMesh, _particles: &mut ParticleSet<f64>) {}
        fn setup_boundary(&self, _mesh: &ParticleMesh, _particles: &mut ParticleSet<f64>) {}
        fn compute_density(&self, _mesh: &ParticleMesh, _particles: &mut ParticleSet<f64>) {}

        fn compute_forces(&self, _mesh: &ParticleMesh, particles: &mut ParticleSet<f64>) {
            for i in 0..particles.len() {
                particles.dv_dt[i] = -particles.v[i];
            }
        }

        fn compute_shifts(&self, _mesh: &ParticleMesh, _particles: &mut ParticleSet<f64>) {}

        fn has_shifting(&self) -> bool {
            false
        }
    }

    fn decay_error(dt: f64) -> f64 {
        let mut particles = ParticleSet::new(FieldSet::empty());
        let a = particles.append(ParticleKind::Fluid);
        particles.set_smoothing_length(1.0);
        particles.set_particle_mass(1.0);
        particles.velocities_mut()[a] = Vector2::new(1.0, 0.0);

        let mut mesh = ParticleMesh::new();
        let mut integrator = RungeKuttaIntegrator::new(DecayEquations);
        let steps = (1.0 / dt).round() as usize;
        for _ in 0..steps {
            integrator.step(dt, &mut mesh, &mut particles);
        }
        (particles.velocities()[a].x - (-1.0f64).exp()).abs()
    }

    #[test]
    fn ssprk33_is_third_order_on_exponential_decay() {
        let errors = [decay_error(0.2), decay_error(0.1), decay_error(0.05)];
        // Third order: every halving of dt reduces the error by at least 7.5x.
        assert!(errors[0] / errors[1] >= 7.5, "errors: {:?}", errors);
        assert!(errors[1] / errors[2] >= 7.5, "errors: {:?}", errors);
    }

    /// Equation set with no forces at all
    struct FreeStreaming;

    impl ExplicitEquations<f64> for FreeStreaming {
        fn init(&self, _particles: &mut ParticleSet<f64>) {}
        fn update_mesh(&self, _mesh: &mut ParticleMesh, _particles: &mut ParticleSet<f64>) {}
        fn setup_boundary(&self, _mesh: &ParticleMesh, _particles: &mut ParticleSet<f64>) {}
        fn compute_density(&self, _mesh: &ParticleMesh, _particles: &mut ParticleSet<f64>) {}
        fn compute_forces(&self, _mesh: &ParticleMesh, _particles: &mut ParticleSet<f64>) {}
        fn compute_shifts(&self, _mesh: &ParticleMesh, _particles: &mut ParticleSet<f64>) {}
        fn has_shifting(&self) -> bool {
            false
        }
    }

    #[test]
    fn all_integrators_advect_a_free_particle() {
        let make = || {
            let mut particles = ParticleSet::new(FieldSet::empty());
            let a = particles.append(ParticleKind::Fluid);
            particles.set_smoothing_length(1.0);
            particles.set_particle_mass(1.0);
            particles.velocities_mut()[a] = Vector2::new(2.0, -1.0);
            (particles, a)
        };
        let expected = Vector2::new(2.0, -1.0) * 0.5;

        let (mut particles, a) = make();
        let mut mesh = ParticleMesh::new();
        let mut euler = EulerIntegrator::new(FreeStreaming);
        for _ in 0..5 {
            euler.step(0.1, &mut mesh, &mut particles);
        }
        assert_relative_eq!(particles.positions()[a], expected, epsilon = 1e-12);

        let (mut particles, a) = make();
        let mut leapfrog = LeapfrogIntegrator::new(FreeStreaming);
        for _ in 0..5 {
            leapfrog.step(0.1, &mut mesh, &mut particles);
        }
        assert_relative_eq!(particles.positions()[a], expected, epsilon = 1e-12);

        let (mut particles, a) = make();
        let mut runge_kutta = RungeKuttaIntegrator::new(FreeStreaming);
        for _ in 0..5 {
            runge_kutta.step(0.1, &mut mesh, &mut particles);
        }
        assert_relative_eq!(particles.positions()[a], expected, epsilon = 1e-12);
    }

    #[test]
    #[should_panic]
    fn non_positive_time_steps_are_rejected() {
        let mut particles = ParticleSet::<f64>::new(FieldSet::empty());
        particles.set_smoothing_length(1.0);
        let mut mesh = ParticleMesh::new();
        let mut integrator = RungeKuttaIntegrator::new(FreeStreaming);
        integrator.step(0.0, &mut mesh, &mut particles);
    }
}
