//! Equations of state

use numeric_literals::replace_float_literals;

use crate::particles::FieldSet;
use crate::Real;

/// Computes pressure and sound speed from the thermodynamic particle state
///
/// The internal energy argument is only read by state equations that declare the
/// `INTERNAL_ENERGY` column in their required fields; the weakly-compressible equations
/// ignore it.
pub trait EquationOfState<R: Real>: Send + Sync {
    /// Optional particle columns required by this equation of state
    fn required_fields(&self) -> FieldSet {
        FieldSet::empty()
    }

    /// Pressure of a particle with the given density and specific internal energy
    fn pressure(&self, rho: R, u: R) -> R;

    /// Sound speed of a particle with the given density, pressure and specific internal energy
    fn sound_speed(&self, rho: R, p: R, u: R) -> R;
}

/// Linear weakly-compressible equation of state (linear Tait)
///
/// `p = p_0 + c_0^2 * (rho - rho_0)` with the constant sound speed `c_0`. The reference
/// equation of state of the fluid scenarios.
#[derive(Copy, Clone, Debug)]
pub struct LinearTait<R: Real> {
    cs_0: R,
    rho_0: R,
    p_0: R,
}

impl<R: Real> LinearTait<R> {
    /// Constructs the equation of state from the reference sound speed and density
    pub fn new(cs_0: R, rho_0: R) -> Self {
        Self::with_background_pressure(cs_0, rho_0, R::zero())
    }

    /// Constructs the equation of state with a background pressure `p_0`
    pub fn with_background_pressure(cs_0: R, rho_0: R, p_0: R) -> Self {
        assert!(cs_0 > R::zero(), "reference sound speed must be positive");
        assert!(rho_0 > R::zero(), "reference density must be positive");
        Self { cs_0, rho_0, p_0 }
    }
}

impl<R: Real> EquationOfState<R> for LinearTait<R> {
    fn pressure(&self, rho: R, _u: R) -> R {
        self.p_0 + self.cs_0 * self.cs_0 * (rho - self.rho_0)
    }

    fn sound_speed(&self, _rho: R, _p: R, _u: R) -> R {
        self.cs_0
    }
}

/// Nonlinear weakly-compressible equation of state (Tait/Cole)
///
/// `p = p_0 + p_1 * ((rho / rho_0)^gamma - 1)` with `p_1 = rho_0 * c_0^2 / gamma`.
#[derive(Copy, Clone, Debug)]
pub struct Tait<R: Real> {
    cs_0: R,
    rho_0: R,
    p_0: R,
    gamma: R,
}

impl<R: Real> Tait<R> {
    /// Constructs the equation of state with the conventional water exponent `gamma = 7`
    #[replace_float_literals(R::from_float(literal))]
    pub fn new(cs_0: R, rho_0: R) -> Self {
        Self::with_exponent(cs_0, rho_0, 0.0, 7.0)
    }

    /// Constructs the equation of state with an explicit background pressure and exponent
    #[replace_float_literals(R::from_float(literal))]
    pub fn with_exponent(cs_0: R, rho_0: R, p_0: R, gamma: R) -> Self {
        assert!(cs_0 > R::zero(), "reference sound speed must be positive");
        assert!(rho_0 > R::zero(), "reference density must be positive");
        assert!(gamma > 1.0, "adiabatic exponent must be greater than one");
        Self {
            cs_0,
            rho_0,
            p_0,
            gamma,
        }
    }

    fn stiffness(&self) -> R {
        self.rho_0 * self.cs_0 * self.cs_0 / self.gamma
    }
}

impl<R: Real> EquationOfState<R> for Tait<R> {
    #[replace_float_literals(R::from_float(literal))]
    fn pressure(&self, rho: R, _u: R) -> R {
        self.p_0 + self.stiffness() * ((rho / self.rho_0).powf(self.gamma) - 1.0)
    }

    fn sound_speed(&self, rho: R, p: R, _u: R) -> R {
        (self.gamma * (p - self.p_0 + self.stiffness()) / rho).sqrt()
    }
}

/// Ideal gas equation of state
///
/// `p = (gamma - 1) * rho * u`; requires the internal energy column.
#[derive(Copy, Clone, Debug)]
pub struct IdealGas<R: Real> {
    gamma: R,
}

impl<R: Real> IdealGas<R> {
    /// Constructs the equation of state from the adiabatic index
    #[replace_float_literals(R::from_float(literal))]
    pub fn new(gamma: R) -> Self {
        assert!(gamma > 1.0, "adiabatic index must be greater than one");
        Self { gamma }
    }
}

impl<R: Real> EquationOfState<R> for IdealGas<R> {
    fn required_fields(&self) -> FieldSet {
        FieldSet::INTERNAL_ENERGY
    }

    #[replace_float_literals(R::from_float(literal))]
    fn pressure(&self, rho: R, u: R) -> R {
        (self.gamma - 1.0) * rho * u
    }

    // Same as sqrt(gamma * p / rho)
    #[replace_float_literals(R::from_float(literal))]
    fn sound_speed(&self, _rho: R, _p: R, u: R) -> R {
        (self.gamma * (self.gamma - 1.0) * u).sqrt()
    }
}
