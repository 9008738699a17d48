//! Heat conductivity pair term of the energy equation

use nalgebra::Vector2;
use numeric_literals::replace_float_literals;

use crate::particles::{FieldSet, PairFields};
use crate::Real;

/// Heat flux between a particle pair
///
/// The flux only contributes when the internal energy path is enabled; the reference
/// fluid scenario runs without it.
pub trait HeatConductivity<R: Real>: Send + Sync {
    /// Optional particle columns required by this term
    fn required_fields(&self) -> FieldSet {
        FieldSet::empty()
    }

    /// Heat flux of the pair `(a, b)`
    fn flux(&self, fields: &PairFields<R>, a: usize, b: usize) -> Vector2<R>;
}

/// No heat conduction
#[derive(Copy, Clone, Debug, Default)]
pub struct NoHeatConductivity;

impl<R: Real> HeatConductivity<R> for NoHeatConductivity {
    fn flux(&self, _fields: &PairFields<R>, a: usize, b: usize) -> Vector2<R> {
        debug_assert!(a != b, "particles must be different");
        Vector2::zeros()
    }
}

/// Heat conduction with constant conductivity and heat capacity
#[derive(Copy, Clone, Debug)]
pub struct Conduction<R: Real> {
    kappa: R,
    c_v: R,
}

impl<R: Real> Conduction<R> {
    /// Constructs the term from the heat conductivity and the specific heat capacity
    pub fn new(kappa: R, c_v: R) -> Self {
        assert!(kappa > R::zero(), "heat conductivity must be positive");
        assert!(c_v > R::zero(), "specific heat capacity must be positive");
        Self { kappa, c_v }
    }
}

impl<R: Real> HeatConductivity<R> for Conduction<R> {
    fn required_fields(&self) -> FieldSet {
        FieldSet::INTERNAL_ENERGY
    }

    #[replace_float_literals(R::from_float(literal))]
    fn flux(&self, fields: &PairFields<R>, a: usize, b: usize) -> Vector2<R> {
        debug_assert!(a != b, "particles must be different");
        let r_ab = fields.r[a] - fields.r[b];
        r_ab * (2.0 * self.kappa * (fields.u[b] - fields.u[a])
            / (self.c_v * fields.rho[a] * fields.rho[b] * r_ab.norm_squared()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flux_points_from_cold_to_hot_side() {
        let r = [Vector2::new(0.0, 0.0), Vector2::new(0.1, 0.0)];
        let u = [1.0, 2.0];
        let rho = [1000.0, 1000.0];
        let fields = PairFields {
            h: 0.1,
            m: 1.0,
            r: &r,
            v: &[],
            rho: &rho,
            p: &[],
            grad_rho: &[],
            l: &[],
            cs: &[],
            div_v: &[],
            curl_v: &[],
            alpha: &[],
            u: &u,
        };
        let conduction = Conduction::new(0.6, 4184.0);
        let q = conduction.flux(&fields, 0, 1);
        // u_b > u_a and r_ab = -x, so the flux points in -x.
        assert!(q.x < 0.0);
        assert_eq!(q.y, 0.0);
    }
}
