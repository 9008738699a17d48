//! Columnar particle storage split into fluid and fixed populations

use bitflags::bitflags;
use bytemuck::Pod;
use nalgebra::{Matrix2, Vector2};
use rayon::prelude::*;
use std::ops::Range;

use crate::io::{field_names, ParticleSink};
use crate::partition::PartitionVector;
use crate::Real;

/// Type of a particle
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParticleKind {
    /// A fluid particle advanced by the integrator
    Fluid,
    /// A fixed (boundary) particle whose state is reconstructed from the fluid
    Fixed,
}

bitflags! {
    /// Optional per-particle columns of a [`ParticleSet`]
    ///
    /// The always-present columns (position, velocity and their derivatives, density,
    /// density gradient, pressure, partition info) are not represented here. Equation
    /// components report the optional columns they require and the particle set is
    /// constructed with the union, so a missing column is always a programming error.
    pub struct FieldSet: u32 {
        /// Per-particle sound speed `cs`
        const SOUND_SPEED = 0x001;
        /// Shepard concentration `C`
        const CONCENTRATION = 0x002;
        /// Unit normal `N`
        const NORMAL = 0x004;
        /// Renormalization matrix `L`
        const RENORMALIZATION = 0x008;
        /// Velocity divergence `div_v`
        const DIVERGENCE = 0x010;
        /// Signed velocity curl `curl_v`
        const CURL = 0x020;
        /// Specific internal energy `u` and its derivative `du_dt`
        const INTERNAL_ENERGY = 0x040;
        /// Artificial-viscosity switch `alpha` and its derivative `dalpha_dt`
        const VISCOSITY_SWITCH = 0x080;
        /// Shifting displacement `dr` and free-surface classification `FS`
        const SHIFTING = 0x100;
    }
}

/// Columnar container of all particle state
///
/// Fluid particles occupy the index range `0..num_fluid()`, fixed particles the rest;
/// [`ParticleSet::append`] maintains this layout. The smoothing length and the particle
/// mass are array-wide constants in the reference configuration and are stored as
/// uniform values behind the same accessor surface as the per-particle columns.
pub struct ParticleSet<R: Real> {
    fields: FieldSet,
    num_fluid: usize,

    // Uniform fields
    h: R,
    m: R,

    // Always-present varying fields
    pub(crate) r: Vec<Vector2<R>>,
    pub(crate) v: Vec<Vector2<R>>,
    pub(crate) dv_dt: Vec<Vector2<R>>,
    pub(crate) rho: Vec<R>,
    pub(crate) drho_dt: Vec<R>,
    pub(crate) grad_rho: Vec<Vector2<R>>,
    pub(crate) p: Vec<R>,
    pub(crate) parinfo: Vec<PartitionVector>,

    // Optional varying fields, allocated only when enabled
    pub(crate) cs: Vec<R>,
    pub(crate) c: Vec<R>,
    pub(crate) n: Vec<Vector2<R>>,
    pub(crate) l: Vec<Matrix2<R>>,
    pub(crate) div_v: Vec<R>,
    pub(crate) curl_v: Vec<R>,
    pub(crate) u: Vec<R>,
    pub(crate) du_dt: Vec<R>,
    pub(crate) alpha: Vec<R>,
    pub(crate) dalpha_dt: Vec<R>,
    pub(crate) dr: Vec<Vector2<R>>,
    pub(crate) fs: Vec<R>,
}

impl<R: Real> ParticleSet<R> {
    /// Constructs an empty particle set carrying the given optional columns
    pub fn new(fields: FieldSet) -> Self {
        Self {
            fields,
            num_fluid: 0,
            h: R::zero(),
            m: R::zero(),
            r: Vec::new(),
            v: Vec::new(),
            dv_dt: Vec::new(),
            rho: Vec::new(),
            drho_dt: Vec::new(),
            grad_rho: Vec::new(),
            p: Vec::new(),
            parinfo: Vec::new(),
            cs: Vec::new(),
            c: Vec::new(),
            n: Vec::new(),
            l: Vec::new(),
            div_v: Vec::new(),
            curl_v: Vec::new(),
            u: Vec::new(),
            du_dt: Vec::new(),
            alpha: Vec::new(),
            dalpha_dt: Vec::new(),
            dr: Vec::new(),
            fs: Vec::new(),
        }
    }

    /// The optional columns carried by this set
    pub fn fields(&self) -> FieldSet {
        self.fields
    }

    /// Whether all of the given optional columns are present
    pub fn has(&self, fields: FieldSet) -> bool {
        self.fields.contains(fields)
    }

    /// Total number of particles
    pub fn len(&self) -> usize {
        self.r.len()
    }

    /// Whether the set contains no particles
    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    /// Number of fluid particles
    pub fn num_fluid(&self) -> usize {
        self.num_fluid
    }

    /// Number of fixed particles
    pub fn num_fixed(&self) -> usize {
        self.len() - self.num_fluid
    }

    /// Index range of the fluid particles
    pub fn fluid(&self) -> Range<usize> {
        0..self.num_fluid
    }

    /// Index range of the fixed particles
    pub fn fixed(&self) -> Range<usize> {
        self.num_fluid..self.len()
    }

    /// Index range of all particles
    pub fn all(&self) -> Range<usize> {
        0..self.len()
    }

    /// Whether the particle at the given index is fluid
    pub fn is_fluid(&self, index: usize) -> bool {
        assert!(index < self.len(), "particle index out of range");
        index < self.num_fluid
    }

    /// Whether the particle at the given index is fixed
    pub fn is_fixed(&self, index: usize) -> bool {
        !self.is_fluid(index)
    }

    /// Kind of the particle at the given index
    pub fn kind(&self, index: usize) -> ParticleKind {
        if self.is_fluid(index) {
            ParticleKind::Fluid
        } else {
            ParticleKind::Fixed
        }
    }

    /// Reserves storage for `additional` more particles in every column
    pub fn reserve(&mut self, additional: usize) {
        self.r.reserve(additional);
        self.v.reserve(additional);
        self.dv_dt.reserve(additional);
        self.rho.reserve(additional);
        self.drho_dt.reserve(additional);
        self.grad_rho.reserve(additional);
        self.p.reserve(additional);
        self.parinfo.reserve(additional);
        if self.has(FieldSet::SOUND_SPEED) {
            self.cs.reserve(additional);
        }
        if self.has(FieldSet::CONCENTRATION) {
            self.c.reserve(additional);
        }
        if self.has(FieldSet::NORMAL) {
            self.n.reserve(additional);
        }
        if self.has(FieldSet::RENORMALIZATION) {
            self.l.reserve(additional);
        }
        if self.has(FieldSet::DIVERGENCE) {
            self.div_v.reserve(additional);
        }
        if self.has(FieldSet::CURL) {
            self.curl_v.reserve(additional);
        }
        if self.has(FieldSet::INTERNAL_ENERGY) {
            self.u.reserve(additional);
            self.du_dt.reserve(additional);
        }
        if self.has(FieldSet::VISCOSITY_SWITCH) {
            self.alpha.reserve(additional);
            self.dalpha_dt.reserve(additional);
        }
        if self.has(FieldSet::SHIFTING) {
            self.dr.reserve(additional);
            self.fs.reserve(additional);
        }
    }

    /// Appends a zero-initialized particle of the given kind, returning its index
    ///
    /// Appending a fluid particle after fixed particles shifts every fixed particle by
    /// one slot; generators should therefore insert fluids first or call
    /// [`ParticleSet::reserve`] up front.
    pub fn append(&mut self, kind: ParticleKind) -> usize {
        let index = match kind {
            ParticleKind::Fluid => self.num_fluid,
            ParticleKind::Fixed => self.len(),
        };
        self.insert_default_at(index);
        if kind == ParticleKind::Fluid {
            self.num_fluid += 1;
        }
        index
    }

    fn insert_default_at(&mut self, index: usize) {
        self.r.insert(index, Vector2::zeros());
        self.v.insert(index, Vector2::zeros());
        self.dv_dt.insert(index, Vector2::zeros());
        self.rho.insert(index, R::zero());
        self.drho_dt.insert(index, R::zero());
        self.grad_rho.insert(index, Vector2::zeros());
        self.p.insert(index, R::zero());
        self.parinfo.insert(index, PartitionVector::default());
        if self.has(FieldSet::SOUND_SPEED) {
            self.cs.insert(index, R::zero());
        }
        if self.has(FieldSet::CONCENTRATION) {
            self.c.insert(index, R::zero());
        }
        if self.has(FieldSet::NORMAL) {
            self.n.insert(index, Vector2::zeros());
        }
        if self.has(FieldSet::RENORMALIZATION) {
            self.l.insert(index, Matrix2::zeros());
        }
        if self.has(FieldSet::DIVERGENCE) {
            self.div_v.insert(index, R::zero());
        }
        if self.has(FieldSet::CURL) {
            self.curl_v.insert(index, R::zero());
        }
        if self.has(FieldSet::INTERNAL_ENERGY) {
            self.u.insert(index, R::zero());
            self.du_dt.insert(index, R::zero());
        }
        if self.has(FieldSet::VISCOSITY_SWITCH) {
            self.alpha.insert(index, R::zero());
            self.dalpha_dt.insert(index, R::zero());
        }
        if self.has(FieldSet::SHIFTING) {
            self.dr.insert(index, Vector2::zeros());
            self.fs.insert(index, R::zero());
        }
    }

    /// Uniform smoothing length `h`
    pub fn smoothing_length(&self) -> R {
        self.h
    }

    /// Sets the uniform smoothing length `h`
    pub fn set_smoothing_length(&mut self, h: R) {
        assert!(h > R::zero(), "smoothing length must be positive");
        self.h = h;
    }

    /// Uniform particle mass `m`
    pub fn particle_mass(&self) -> R {
        self.m
    }

    /// Sets the uniform particle mass `m`
    pub fn set_particle_mass(&mut self, m: R) {
        assert!(m > R::zero(), "particle mass must be positive");
        self.m = m;
    }

    /// Particle positions `r`
    pub fn positions(&self) -> &[Vector2<R>] {
        &self.r
    }

    /// Mutable particle positions `r`
    pub fn positions_mut(&mut self) -> &mut [Vector2<R>] {
        &mut self.r
    }

    /// Particle velocities `v`
    pub fn velocities(&self) -> &[Vector2<R>] {
        &self.v
    }

    /// Mutable particle velocities `v`
    pub fn velocities_mut(&mut self) -> &mut [Vector2<R>] {
        &mut self.v
    }

    /// Particle accelerations `dv_dt`
    pub fn accelerations(&self) -> &[Vector2<R>] {
        &self.dv_dt
    }

    /// Particle densities `rho`
    pub fn densities(&self) -> &[R] {
        &self.rho
    }

    /// Mutable particle densities `rho`
    pub fn densities_mut(&mut self) -> &mut [R] {
        &mut self.rho
    }

    /// Density time derivatives `drho_dt`
    pub fn density_derivs(&self) -> &[R] {
        &self.drho_dt
    }

    /// Density gradients `grad_rho`
    pub fn density_gradients(&self) -> &[Vector2<R>] {
        &self.grad_rho
    }

    /// Particle pressures `p`
    pub fn pressures(&self) -> &[R] {
        &self.p
    }

    /// Particle partition vectors `parinfo`
    pub fn partition_info(&self) -> &[PartitionVector] {
        &self.parinfo
    }

    /// Sound speeds `cs`, panics if the column is not enabled
    pub fn sound_speeds(&self) -> &[R] {
        assert!(self.has(FieldSet::SOUND_SPEED), "cs column is not enabled");
        &self.cs
    }

    /// Shepard concentrations `C`, panics if the column is not enabled
    pub fn concentrations(&self) -> &[R] {
        assert!(self.has(FieldSet::CONCENTRATION), "C column is not enabled");
        &self.c
    }

    /// Unit normals `N`, panics if the column is not enabled
    pub fn normals(&self) -> &[Vector2<R>] {
        assert!(self.has(FieldSet::NORMAL), "N column is not enabled");
        &self.n
    }

    /// Renormalization matrices `L`, panics if the column is not enabled
    pub fn renormalizations(&self) -> &[Matrix2<R>] {
        assert!(
            self.has(FieldSet::RENORMALIZATION),
            "L column is not enabled"
        );
        &self.l
    }

    /// Velocity divergences `div_v`, panics if the column is not enabled
    pub fn velocity_divergences(&self) -> &[R] {
        assert!(self.has(FieldSet::DIVERGENCE), "div_v column is not enabled");
        &self.div_v
    }

    /// Velocity curls `curl_v`, panics if the column is not enabled
    pub fn velocity_curls(&self) -> &[R] {
        assert!(self.has(FieldSet::CURL), "curl_v column is not enabled");
        &self.curl_v
    }

    /// Specific internal energies `u`, panics if the column is not enabled
    pub fn internal_energies(&self) -> &[R] {
        assert!(
            self.has(FieldSet::INTERNAL_ENERGY),
            "u column is not enabled"
        );
        &self.u
    }

    /// Mutable specific internal energies `u`, panics if the column is not enabled
    pub fn internal_energies_mut(&mut self) -> &mut [R] {
        assert!(
            self.has(FieldSet::INTERNAL_ENERGY),
            "u column is not enabled"
        );
        &mut self.u
    }

    /// Viscosity switches `alpha`, panics if the column is not enabled
    pub fn viscosity_switches(&self) -> &[R] {
        assert!(
            self.has(FieldSet::VISCOSITY_SWITCH),
            "alpha column is not enabled"
        );
        &self.alpha
    }

    /// Shifting displacements `dr`, panics if the column is not enabled
    pub fn shifts(&self) -> &[Vector2<R>] {
        assert!(self.has(FieldSet::SHIFTING), "dr column is not enabled");
        &self.dr
    }

    /// Free-surface classifications `FS`, panics if the column is not enabled
    pub fn surface_flags(&self) -> &[R] {
        assert!(self.has(FieldSet::SHIFTING), "FS column is not enabled");
        &self.fs
    }

    /// Writes a time-step record of all carried fields to the given sink
    ///
    /// Uniform fields are emitted as length-1 arrays, varying fields as length-N arrays;
    /// vector and matrix columns are flattened component-wise. I/O errors propagate to
    /// the caller.
    pub fn write<S: ParticleSink<R>>(&self, time: R, sink: &mut S) -> Result<(), anyhow::Error>
    where
        R: Pod,
        Vector2<R>: Pod,
        Matrix2<R>: Pod,
    {
        sink.create_time_step(time)?;

        sink.create_uniform_array(field_names::H, &[self.h])?;
        sink.create_uniform_array(field_names::M, &[self.m])?;

        sink.create_varying_array(field_names::R, bytemuck::cast_slice(&self.r))?;
        sink.create_varying_array(field_names::V, bytemuck::cast_slice(&self.v))?;
        sink.create_varying_array(field_names::DV_DT, bytemuck::cast_slice(&self.dv_dt))?;
        sink.create_varying_array(field_names::RHO, &self.rho)?;
        sink.create_varying_array(field_names::DRHO_DT, &self.drho_dt)?;
        sink.create_varying_array(field_names::GRAD_RHO, bytemuck::cast_slice(&self.grad_rho))?;
        sink.create_varying_array(field_names::P, &self.p)?;

        let parinfo: Vec<R> = bytemuck::cast_slice::<PartitionVector, u16>(&self.parinfo)
            .iter()
            .map(|&part| R::from_float(part))
            .collect();
        sink.create_varying_array(field_names::PARINFO, &parinfo)?;

        if self.has(FieldSet::SOUND_SPEED) {
            sink.create_varying_array(field_names::CS, &self.cs)?;
        }
        if self.has(FieldSet::CONCENTRATION) {
            sink.create_varying_array(field_names::C, &self.c)?;
        }
        if self.has(FieldSet::NORMAL) {
            sink.create_varying_array(field_names::N, bytemuck::cast_slice(&self.n))?;
        }
        if self.has(FieldSet::RENORMALIZATION) {
            sink.create_varying_array(field_names::L, bytemuck::cast_slice(&self.l))?;
        }
        if self.has(FieldSet::DIVERGENCE) {
            sink.create_varying_array(field_names::DIV_V, &self.div_v)?;
        }
        if self.has(FieldSet::CURL) {
            sink.create_varying_array(field_names::CURL_V, &self.curl_v)?;
        }
        if self.has(FieldSet::INTERNAL_ENERGY) {
            sink.create_varying_array(field_names::U, &self.u)?;
            sink.create_varying_array(field_names::DU_DT, &self.du_dt)?;
        }
        if self.has(FieldSet::VISCOSITY_SWITCH) {
            sink.create_varying_array(field_names::ALPHA, &self.alpha)?;
            sink.create_varying_array(field_names::DALPHA_DT, &self.dalpha_dt)?;
        }
        if self.has(FieldSet::SHIFTING) {
            sink.create_varying_array(field_names::DR, bytemuck::cast_slice(&self.dr))?;
            sink.create_varying_array(field_names::FS, &self.fs)?;
        }

        Ok(())
    }
}

/// Read-only particle columns available to pair terms
///
/// This is the cross-operator read set: positions, velocities, densities, pressures and
/// the uniform constants, plus the columns that dissipative terms declare as inputs.
/// Columns that are not enabled on the particle set are empty slices; a term indexing
/// into one without declaring it in its required fields is a programming error.
pub struct PairFields<'a, R: Real> {
    /// Uniform smoothing length
    pub h: R,
    /// Uniform particle mass
    pub m: R,
    /// Positions
    pub r: &'a [Vector2<R>],
    /// Velocities
    pub v: &'a [Vector2<R>],
    /// Densities
    pub rho: &'a [R],
    /// Pressures
    pub p: &'a [R],
    /// Density gradients
    pub grad_rho: &'a [Vector2<R>],
    /// Renormalization matrices (may be empty)
    pub l: &'a [Matrix2<R>],
    /// Sound speeds (may be empty)
    pub cs: &'a [R],
    /// Velocity divergences (may be empty)
    pub div_v: &'a [R],
    /// Velocity curls (may be empty)
    pub curl_v: &'a [R],
    /// Viscosity switches (may be empty)
    pub alpha: &'a [R],
    /// Specific internal energies (may be empty)
    pub u: &'a [R],
}

/// Copy of the integrated state subset `{r, v, rho, u?, alpha?}` used by the
/// Runge-Kutta blends
pub(crate) struct StateSnapshot<R: Real> {
    r: Vec<Vector2<R>>,
    v: Vec<Vector2<R>>,
    rho: Vec<R>,
    u: Option<Vec<R>>,
    alpha: Option<Vec<R>>,
}

impl<R: Real> ParticleSet<R> {
    /// Snapshots the integrated state subset
    pub(crate) fn snapshot_state(&self) -> StateSnapshot<R> {
        StateSnapshot {
            r: self.r.clone(),
            v: self.v.clone(),
            rho: self.rho.clone(),
            u: self.has(FieldSet::INTERNAL_ENERGY).then(|| self.u.clone()),
            alpha: self
                .has(FieldSet::VISCOSITY_SWITCH)
                .then(|| self.alpha.clone()),
        }
    }

    /// Blends the integrated state of every fluid particle as
    /// `state := old_weight * old + new_weight * state`
    pub(crate) fn blend_state(&mut self, old_weight: R, old: &StateSnapshot<R>, new_weight: R) {
        let num_fluid = self.num_fluid;
        let blend_vec = |current: &mut Vec<Vector2<R>>, old: &[Vector2<R>]| {
            current[..num_fluid]
                .par_iter_mut()
                .zip(old[..num_fluid].par_iter())
                .for_each(|(x, x_old)| *x = x_old * old_weight + *x * new_weight);
        };
        let blend_scalar = |current: &mut Vec<R>, old: &[R]| {
            current[..num_fluid]
                .par_iter_mut()
                .zip(old[..num_fluid].par_iter())
                .for_each(|(x, &x_old)| *x = x_old * old_weight + *x * new_weight);
        };

        blend_vec(&mut self.r, &old.r);
        blend_vec(&mut self.v, &old.v);
        blend_scalar(&mut self.rho, &old.rho);
        if let Some(u_old) = &old.u {
            blend_scalar(&mut self.u, u_old);
        }
        if let Some(alpha_old) = &old.alpha {
            blend_scalar(&mut self.alpha, alpha_old);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fluid_indices_precede_fixed_indices() {
        let mut particles = ParticleSet::<f64>::new(FieldSet::empty());
        let b0 = particles.append(ParticleKind::Fixed);
        let f0 = particles.append(ParticleKind::Fluid);
        let f1 = particles.append(ParticleKind::Fluid);
        let b1 = particles.append(ParticleKind::Fixed);
        assert_eq!((b0, f0, f1, b1), (0, 0, 1, 3));
        assert_eq!(particles.fluid(), 0..2);
        assert_eq!(particles.fixed(), 2..4);
        assert!(particles.is_fluid(0) && particles.is_fluid(1));
        assert!(particles.is_fixed(2) && particles.is_fixed(3));
    }

    #[test]
    fn appending_fluid_shifts_fixed_particles() {
        let mut particles = ParticleSet::<f64>::new(FieldSet::empty());
        let fixed = particles.append(ParticleKind::Fixed);
        particles.positions_mut()[fixed] = Vector2::new(7.0, 7.0);
        let fluid = particles.append(ParticleKind::Fluid);
        particles.positions_mut()[fluid] = Vector2::new(1.0, 1.0);
        // The fixed particle moved one slot to the right.
        assert_eq!(particles.positions()[0], Vector2::new(1.0, 1.0));
        assert_eq!(particles.positions()[1], Vector2::new(7.0, 7.0));
    }

    #[test]
    fn optional_columns_follow_the_field_set() {
        let mut particles = ParticleSet::<f64>::new(FieldSet::NORMAL | FieldSet::CONCENTRATION);
        particles.append(ParticleKind::Fluid);
        assert_eq!(particles.normals().len(), 1);
        assert_eq!(particles.concentrations().len(), 1);
        assert!(!particles.has(FieldSet::INTERNAL_ENERGY));
    }

    #[test]
    #[should_panic]
    fn accessing_a_disabled_column_panics() {
        let particles = ParticleSet::<f64>::new(FieldSet::empty());
        let _ = particles.internal_energies();
    }

    #[test]
    fn blend_state_only_touches_fluid_particles() {
        let mut particles = ParticleSet::<f64>::new(FieldSet::empty());
        let a = particles.append(ParticleKind::Fluid);
        let b = particles.append(ParticleKind::Fixed);
        particles.r[a] = Vector2::new(1.0, 0.0);
        particles.r[b] = Vector2::new(5.0, 0.0);
        let old = particles.snapshot_state();
        particles.r[a] = Vector2::new(3.0, 0.0);
        particles.r[b] = Vector2::new(9.0, 0.0);
        particles.blend_state(0.75, &old, 0.25);
        assert_eq!(particles.r[a], Vector2::new(1.5, 0.0));
        assert_eq!(particles.r[b], Vector2::new(9.0, 0.0));
    }
}
