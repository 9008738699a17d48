//! Physical and artificial viscosity pair terms

use nalgebra::Vector2;
use numeric_literals::replace_float_literals;

use crate::particles::{FieldSet, PairFields};
use crate::utils::avg;
use crate::Real;

/// Physical viscosity term of the momentum equation
pub trait Viscosity<R: Real>: Send + Sync {
    /// Optional particle columns required by this term
    fn required_fields(&self) -> FieldSet {
        FieldSet::empty()
    }

    /// Viscous contribution to the momentum flux of the pair `(a, b)`
    fn velocity_term(&self, fields: &PairFields<R>, a: usize, b: usize) -> R;
}

/// No physical viscosity, for inviscid flows
#[derive(Copy, Clone, Debug, Default)]
pub struct NoViscosity;

impl<R: Real> Viscosity<R> for NoViscosity {
    fn velocity_term(&self, _fields: &PairFields<R>, a: usize, b: usize) -> R {
        debug_assert!(a != b, "particles must be different");
        R::zero()
    }
}

/// Laplacian viscosity with a constant dynamic viscosity coefficient
#[derive(Copy, Clone, Debug)]
pub struct LaplacianViscosity<R: Real> {
    mu: R,
}

impl<R: Real> LaplacianViscosity<R> {
    /// Constructs the term from the dynamic viscosity `mu`
    pub fn new(mu: R) -> Self {
        assert!(mu > R::zero(), "dynamic viscosity must be positive");
        Self { mu }
    }
}

impl<R: Real> Viscosity<R> for LaplacianViscosity<R> {
    #[replace_float_literals(R::from_float(literal))]
    fn velocity_term(&self, fields: &PairFields<R>, a: usize, b: usize) -> R {
        debug_assert!(a != b, "particles must be different");
        let r_ab = fields.r[a] - fields.r[b];
        let v_ab = fields.v[a] - fields.v[b];
        2.0 * (2.0 + 2.0) * self.mu * r_ab.dot(&v_ab)
            / (fields.rho[a] * fields.rho[b] * r_ab.norm_squared())
    }
}

/// Artificial viscosity stabilizing the weakly-compressible equations
///
/// `density_term` is the diffusive flux `Psi` of the continuity equation,
/// `velocity_term` the diffusive flux `Pi` of the momentum equation. Schemes with an
/// evolved switch coefficient additionally produce `dalpha_dt` via `switch_source`.
pub trait ArtificialViscosity<R: Real>: Send + Sync {
    /// Optional particle columns required by this scheme
    fn required_fields(&self) -> FieldSet {
        FieldSet::empty()
    }

    /// Diffusive term of the continuity equation for the pair `(a, b)`
    fn density_term(&self, _fields: &PairFields<R>, a: usize, b: usize) -> Vector2<R> {
        debug_assert!(a != b, "particles must be different");
        Vector2::zeros()
    }

    /// Diffusive term of the momentum equation for the pair `(a, b)`
    fn velocity_term(&self, _fields: &PairFields<R>, a: usize, b: usize) -> R {
        debug_assert!(a != b, "particles must be different");
        R::zero()
    }

    /// Whether this scheme evolves the per-particle switch coefficient
    fn has_switch(&self) -> bool {
        false
    }

    /// Time derivative of the switch coefficient of the particle
    fn switch_source(&self, _fields: &PairFields<R>, _a: usize) -> R {
        R::zero()
    }
}

/// No artificial viscosity (for the braves)
#[derive(Copy, Clone, Debug, Default)]
pub struct NoArtificialViscosity;

impl<R: Real> ArtificialViscosity<R> for NoArtificialViscosity {}

/// α-β artificial viscosity (Monaghan, 1992)
#[derive(Copy, Clone, Debug)]
pub struct MonaghanViscosity<R: Real> {
    alpha: R,
    beta: R,
}

impl<R: Real> MonaghanViscosity<R> {
    /// Constructs the scheme from its linear and quadratic coefficients
    ///
    /// The quadratic coefficient is typically twice the linear one for compressible
    /// flows and zero for weakly-compressible flows.
    pub fn new(alpha: R, beta: R) -> Self {
        assert!(alpha > R::zero(), "linear coefficient must be positive");
        assert!(beta >= R::zero(), "quadratic coefficient must be non-negative");
        Self { alpha, beta }
    }
}

impl<R: Real> Default for MonaghanViscosity<R> {
    #[replace_float_literals(R::from_float(literal))]
    fn default() -> Self {
        Self::new(1.0, 2.0)
    }
}

impl<R: Real> ArtificialViscosity<R> for MonaghanViscosity<R> {
    fn required_fields(&self) -> FieldSet {
        FieldSet::SOUND_SPEED
    }

    fn velocity_term(&self, fields: &PairFields<R>, a: usize, b: usize) -> R {
        debug_assert!(a != b, "particles must be different");
        let r_ab = fields.r[a] - fields.r[b];
        let v_ab = fields.v[a] - fields.v[b];
        if v_ab.dot(&r_ab) >= R::zero() {
            return R::zero();
        }
        let rho_ab = avg(fields.rho[a], fields.rho[b]);
        let cs_ab = avg(fields.cs[a], fields.cs[b]);
        let mu_ab = fields.h * r_ab.dot(&v_ab) / r_ab.norm_squared();
        (-self.alpha * cs_ab + self.beta * mu_ab) * mu_ab / rho_ab
    }
}

/// Artificial viscosity with the Balsara limiter (Balsara, 1995)
///
/// Suppresses the base viscosity in shear-dominated regions using the ratio of the
/// velocity divergence to the velocity curl.
#[derive(Copy, Clone, Debug, Default)]
pub struct BalsaraSwitch<AV> {
    base: AV,
}

impl<AV> BalsaraSwitch<AV> {
    /// Wraps the given base viscosity
    pub fn new(base: AV) -> Self {
        Self { base }
    }
}

impl<R: Real, AV: ArtificialViscosity<R>> ArtificialViscosity<R> for BalsaraSwitch<AV> {
    fn required_fields(&self) -> FieldSet {
        self.base.required_fields()
            | FieldSet::SOUND_SPEED
            | FieldSet::DIVERGENCE
            | FieldSet::CURL
    }

    #[replace_float_literals(R::from_float(literal))]
    fn velocity_term(&self, fields: &PairFields<R>, a: usize, b: usize) -> R {
        let pi_ab = self.base.velocity_term(fields, a, b);
        if pi_ab.is_tiny() {
            return pi_ab;
        }
        let limiter = |c: usize| {
            fields.div_v[c].abs()
                / (fields.div_v[c].abs()
                    + fields.curl_v[c].abs()
                    + 0.0001 * fields.cs[c] / fields.h)
        };
        pi_ab * avg(limiter(a), limiter(b))
    }
}

/// Artificial viscosity with an evolved switch coefficient (Rosswog, 2000)
///
/// Scales the base viscosity by the per-particle switch `alpha`, which rises in
/// compression and decays towards its minimum on a timescale set by `sigma`.
#[derive(Copy, Clone, Debug)]
pub struct RosswogSwitch<R: Real, AV> {
    base: AV,
    alpha_min: R,
    alpha_max: R,
    sigma: R,
}

impl<R: Real, AV> RosswogSwitch<R, AV> {
    /// Wraps the given base viscosity with the default switch parameters
    #[replace_float_literals(R::from_float(literal))]
    pub fn new(base: AV) -> Self {
        Self::with_parameters(base, 0.1, 1.5, 0.1)
    }

    /// Wraps the given base viscosity with explicit switch parameters
    pub fn with_parameters(base: AV, alpha_min: R, alpha_max: R, sigma: R) -> Self {
        assert!(alpha_min > R::zero(), "switch minimum must be positive");
        assert!(
            alpha_max > alpha_min,
            "switch maximum must be greater than the minimum"
        );
        assert!(sigma > R::zero(), "switch decay factor must be positive");
        Self {
            base,
            alpha_min,
            alpha_max,
            sigma,
        }
    }
}

impl<R: Real, AV: ArtificialViscosity<R>> ArtificialViscosity<R> for RosswogSwitch<R, AV> {
    fn required_fields(&self) -> FieldSet {
        self.base.required_fields()
            | FieldSet::VISCOSITY_SWITCH
            | FieldSet::DIVERGENCE
            | FieldSet::SOUND_SPEED
    }

    fn velocity_term(&self, fields: &PairFields<R>, a: usize, b: usize) -> R {
        let pi_ab = self.base.velocity_term(fields, a, b);
        if pi_ab.is_tiny() {
            return pi_ab;
        }
        pi_ab * avg(fields.alpha[a], fields.alpha[b])
    }

    fn has_switch(&self) -> bool {
        true
    }

    fn switch_source(&self, fields: &PairFields<R>, a: usize) -> R {
        let compression = (-fields.div_v[a]).max(R::zero());
        let tau = fields.h / (self.sigma * fields.cs[a]);
        (self.alpha_max - fields.alpha[a]) * compression - (fields.alpha[a] - self.alpha_min) / tau
    }
}

/// δ-SPH artificial viscosity (Marrone, 2011)
///
/// Assumes the continuity equation and a weakly-compressible equation of state. The
/// density term diffuses the density field towards its renormalized gradient, the
/// velocity term is a linear inter-particle friction scaled by the reference state.
#[derive(Copy, Clone, Debug)]
pub struct DeltaSphViscosity<R: Real> {
    cs_0: R,
    rho_0: R,
    alpha: R,
    delta: R,
}

impl<R: Real> DeltaSphViscosity<R> {
    /// Constructs the scheme with the standard coefficients `alpha = 0.05`, `delta = 0.1`
    #[replace_float_literals(R::from_float(literal))]
    pub fn new(cs_0: R, rho_0: R) -> Self {
        Self::with_coefficients(cs_0, rho_0, 0.05, 0.1)
    }

    /// Constructs the scheme with explicit coefficients
    pub fn with_coefficients(cs_0: R, rho_0: R, alpha: R, delta: R) -> Self {
        assert!(cs_0 > R::zero(), "reference sound speed must be positive");
        assert!(rho_0 > R::zero(), "reference density must be positive");
        assert!(alpha > R::zero(), "velocity coefficient must be positive");
        assert!(delta > R::zero(), "density coefficient must be positive");
        Self {
            cs_0,
            rho_0,
            alpha,
            delta,
        }
    }
}

impl<R: Real> ArtificialViscosity<R> for DeltaSphViscosity<R> {
    fn required_fields(&self) -> FieldSet {
        FieldSet::RENORMALIZATION | FieldSet::SOUND_SPEED
    }

    #[replace_float_literals(R::from_float(literal))]
    fn density_term(&self, fields: &PairFields<R>, a: usize, b: usize) -> Vector2<R> {
        debug_assert!(a != b, "particles must be different");
        let r_ab = fields.r[a] - fields.r[b];
        let grad_sum = fields.l[a] * fields.grad_rho[a] + fields.l[b] * fields.grad_rho[b];
        let d_ab = 2.0 * (fields.rho[a] - fields.rho[b]) - grad_sum.dot(&r_ab);
        r_ab * (self.delta * fields.h * self.cs_0 * d_ab / r_ab.norm_squared())
    }

    fn velocity_term(&self, fields: &PairFields<R>, a: usize, b: usize) -> R {
        debug_assert!(a != b, "particles must be different");
        let r_ab = fields.r[a] - fields.r[b];
        let v_ab = fields.v[a] - fields.v[b];
        -self.alpha * fields.h * self.cs_0 * self.rho_0 * r_ab.dot(&v_ab)
            / (fields.rho[a] * fields.rho[b] * r_ab.norm_squared())
    }
}
