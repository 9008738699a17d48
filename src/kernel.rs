//! SPH smoothing kernel implementations
//!
//! A kernel evaluates as `W(r, h) = h^-D * ω_D * Ŵ(|r|/h)` with a dimension-dependent
//! normalization weight `ω_D` and a unit function `Ŵ` with compact support (the Gaussian
//! is truncated where it reaches the smallest representable positive value). The solver
//! itself is two-dimensional; the 1-D and 3-D weights are kept for verification of the
//! normalization property.

use arrayvec::ArrayVec;
use nalgebra::Vector2;
use numeric_literals::replace_float_literals;

use crate::utils::normalize_or_zero;
use crate::Real;

/// Trait for smoothing kernels used by the field operators
pub trait SmoothingKernel<R: Real>: Clone + Send + Sync {
    /// Support radius of the unit kernel
    fn unit_radius() -> R;

    /// Normalization weight for the given spatial dimension (1, 2 or 3)
    fn normalization(dim: usize) -> R;

    /// Value of the unit kernel at `q = |r| / h`
    fn unit_value(q: R) -> R;

    /// Derivative of the unit kernel at `q = |r| / h`
    fn unit_deriv(q: R) -> R;

    /// Support radius for the smoothing length `h`
    fn radius(&self, h: R) -> R {
        assert!(h > R::zero(), "kernel width must be positive");
        Self::unit_radius() * h
    }

    /// Kernel value at radial distance `r` for an arbitrary spatial dimension
    fn value_radial(&self, r: R, h: R, dim: usize) -> R {
        assert!(h > R::zero(), "kernel width must be positive");
        let h_inv = R::one() / h;
        let w = Self::normalization(dim) * h_inv.powi(dim as i32);
        w * Self::unit_value(r * h_inv)
    }

    /// Kernel value at the 2-D offset `x`
    fn value(&self, x: &Vector2<R>, h: R) -> R {
        self.value_radial(x.norm(), h, 2)
    }

    /// Spatial gradient of the kernel at the 2-D offset `x`
    fn gradient(&self, x: &Vector2<R>, h: R) -> Vector2<R> {
        assert!(h > R::zero(), "kernel width must be positive");
        let h_inv = R::one() / h;
        let w = Self::normalization(2) * h_inv * h_inv;
        let q = x.norm() * h_inv;
        normalize_or_zero(x) * (w * Self::unit_deriv(q) * h_inv)
    }

    /// Derivative of the kernel with respect to the smoothing length at the 2-D offset `x`
    fn width_deriv(&self, x: &Vector2<R>, h: R) -> R {
        assert!(h > R::zero(), "kernel width must be positive");
        let h_inv = R::one() / h;
        let w = Self::normalization(2) * h_inv * h_inv;
        let dw_dh = -R::from_float(2.0) * w * h_inv;
        let q = x.norm() * h_inv;
        let dq_dh = -q * h_inv;
        dw_dh * Self::unit_value(q) + w * Self::unit_deriv(q) * dq_dh
    }
}

/// Sums `w_i * max(q_i - q, 0)^k` over the spline segments
///
/// Segments with `q >= q_i` contribute exactly zero, so this is the branchless
/// active-segment sum of the B-spline kernels.
fn spline_sum<R: Real>(q: R, exponent: i32, segments: &ArrayVec<(R, R), 3>) -> R {
    segments.iter().fold(R::zero(), |acc, &(q_i, w_i)| {
        acc + w_i * (q_i - q).max(R::zero()).powi(exponent)
    })
}

fn segments<R: Real, const N: usize>(raw: [(f64, f64); N]) -> ArrayVec<(R, R), 3> {
    raw.iter()
        .map(|&(q, w)| (R::from_float(q), R::from_float(w)))
        .collect()
}

/// Gaussian smoothing kernel (Monaghan, 1992), truncated at the representable minimum
#[derive(Copy, Clone, Debug, Default)]
pub struct GaussianKernel;

impl<R: Real> SmoothingKernel<R> for GaussianKernel {
    fn unit_radius() -> R {
        (-R::min_positive().ln()).sqrt()
    }

    #[replace_float_literals(R::from_float(literal))]
    fn normalization(dim: usize) -> R {
        let inv_sqrt_pi = 1.0 / R::pi().sqrt();
        inv_sqrt_pi.powi(dim as i32)
    }

    fn unit_value(q: R) -> R {
        (-q * q).exp()
    }

    #[replace_float_literals(R::from_float(literal))]
    fn unit_deriv(q: R) -> R {
        -2.0 * q * (-q * q).exp()
    }
}

/// Cubic B-spline (M4) smoothing kernel
#[derive(Copy, Clone, Debug, Default)]
pub struct CubicSplineKernel;

impl<R: Real> SmoothingKernel<R> for CubicSplineKernel {
    #[replace_float_literals(R::from_float(literal))]
    fn unit_radius() -> R {
        2.0
    }

    #[replace_float_literals(R::from_float(literal))]
    fn normalization(dim: usize) -> R {
        match dim {
            1 => 2.0 / 3.0,
            2 => 10.0 / 7.0 / R::pi(),
            3 => 1.0 / R::pi(),
            _ => panic!("unsupported kernel dimension"),
        }
    }

    fn unit_value(q: R) -> R {
        spline_sum(q, 3, &segments([(2.0, 0.25), (1.0, -1.0)]))
    }

    fn unit_deriv(q: R) -> R {
        -spline_sum(q, 2, &segments([(2.0, 0.75), (1.0, -3.0)]))
    }
}

/// Quartic B-spline (M5) smoothing kernel
#[derive(Copy, Clone, Debug, Default)]
pub struct QuarticSplineKernel;

impl<R: Real> SmoothingKernel<R> for QuarticSplineKernel {
    #[replace_float_literals(R::from_float(literal))]
    fn unit_radius() -> R {
        2.5
    }

    #[replace_float_literals(R::from_float(literal))]
    fn normalization(dim: usize) -> R {
        match dim {
            1 => 1.0 / 24.0,
            2 => 96.0 / 1199.0 / R::pi(),
            3 => 1.0 / 20.0 / R::pi(),
            _ => panic!("unsupported kernel dimension"),
        }
    }

    fn unit_value(q: R) -> R {
        spline_sum(q, 4, &segments([(2.5, 1.0), (1.5, -5.0), (0.5, 10.0)]))
    }

    fn unit_deriv(q: R) -> R {
        -spline_sum(q, 3, &segments([(2.5, 4.0), (1.5, -20.0), (0.5, 40.0)]))
    }
}

/// Quintic B-spline (M6) smoothing kernel
#[derive(Copy, Clone, Debug, Default)]
pub struct QuinticSplineKernel;

impl<R: Real> SmoothingKernel<R> for QuinticSplineKernel {
    #[replace_float_literals(R::from_float(literal))]
    fn unit_radius() -> R {
        3.0
    }

    #[replace_float_literals(R::from_float(literal))]
    fn normalization(dim: usize) -> R {
        match dim {
            1 => 1.0 / 120.0,
            2 => 7.0 / 478.0 / R::pi(),
            3 => 1.0 / 120.0 / R::pi(),
            _ => panic!("unsupported kernel dimension"),
        }
    }

    fn unit_value(q: R) -> R {
        spline_sum(q, 5, &segments([(3.0, 1.0), (2.0, -6.0), (1.0, 15.0)]))
    }

    fn unit_deriv(q: R) -> R {
        -spline_sum(q, 4, &segments([(3.0, 5.0), (2.0, -30.0), (1.0, 75.0)]))
    }
}

/// Wendland's quartic (C²) smoothing kernel (Wendland, 1995)
///
/// The reference kernel of the fluid scenarios.
#[derive(Copy, Clone, Debug, Default)]
pub struct WendlandC2Kernel;

impl<R: Real> SmoothingKernel<R> for WendlandC2Kernel {
    #[replace_float_literals(R::from_float(literal))]
    fn unit_radius() -> R {
        2.0
    }

    #[replace_float_literals(R::from_float(literal))]
    fn normalization(dim: usize) -> R {
        match dim {
            1 => 3.0 / 4.0,
            2 => 7.0 / 4.0 / R::pi(),
            3 => 21.0 / 16.0 / R::pi(),
            _ => panic!("unsupported kernel dimension"),
        }
    }

    #[replace_float_literals(R::from_float(literal))]
    fn unit_value(q: R) -> R {
        if q < 2.0 {
            (1.0 + 2.0 * q) * (1.0 - 0.5 * q).powi(4)
        } else {
            0.0
        }
    }

    #[replace_float_literals(R::from_float(literal))]
    fn unit_deriv(q: R) -> R {
        // Same as -5 * q * (1 - q/2)^3, rescaled to save a multiplication
        if q < 2.0 {
            5.0 / 8.0 * q * (q - 2.0).powi(3)
        } else {
            0.0
        }
    }
}

/// Wendland's 6-th order (C⁴) smoothing kernel (Wendland, 1995)
#[derive(Copy, Clone, Debug, Default)]
pub struct WendlandC4Kernel;

impl<R: Real> SmoothingKernel<R> for WendlandC4Kernel {
    #[replace_float_literals(R::from_float(literal))]
    fn unit_radius() -> R {
        2.0
    }

    #[replace_float_literals(R::from_float(literal))]
    fn normalization(dim: usize) -> R {
        match dim {
            1 => 27.0 / 32.0,
            2 => 9.0 / 4.0 / R::pi(),
            3 => 495.0 / 256.0 / R::pi(),
            _ => panic!("unsupported kernel dimension"),
        }
    }

    #[replace_float_literals(R::from_float(literal))]
    fn unit_value(q: R) -> R {
        if q < 2.0 {
            (1.0 + q * (3.0 + q * (35.0 / 12.0))) * (1.0 - 0.5 * q).powi(6)
        } else {
            0.0
        }
    }

    #[replace_float_literals(R::from_float(literal))]
    fn unit_deriv(q: R) -> R {
        if q < 2.0 {
            7.0 / 96.0 * q * (2.0 + 5.0 * q) * (q - 2.0).powi(5)
        } else {
            0.0
        }
    }
}

/// Wendland's 8-th order (C⁶) smoothing kernel (Wendland, 1995)
#[derive(Copy, Clone, Debug, Default)]
pub struct WendlandC6Kernel;

impl<R: Real> SmoothingKernel<R> for WendlandC6Kernel {
    #[replace_float_literals(R::from_float(literal))]
    fn unit_radius() -> R {
        2.0
    }

    #[replace_float_literals(R::from_float(literal))]
    fn normalization(dim: usize) -> R {
        match dim {
            1 => 15.0 / 16.0,
            2 => 39.0 / 14.0 / R::pi(),
            3 => 1365.0 / 512.0 / R::pi(),
            _ => panic!("unsupported kernel dimension"),
        }
    }

    #[replace_float_literals(R::from_float(literal))]
    fn unit_value(q: R) -> R {
        if q < 2.0 {
            (1.0 + q * (4.0 + q * (25.0 / 4.0 + q * 4.0))) * (1.0 - 0.5 * q).powi(8)
        } else {
            0.0
        }
    }

    #[replace_float_literals(R::from_float(literal))]
    fn unit_deriv(q: R) -> R {
        if q < 2.0 {
            11.0 / 512.0 * q * (2.0 + q * (7.0 + q * 8.0)) * (q - 2.0).powi(7)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    /// Numerically integrates the kernel over all of space for the given dimension
    fn integrate<K: SmoothingKernel<f64>>(kernel: &K, dim: usize) -> f64 {
        let h = 0.8;
        let radius = kernel.radius(h);
        let n = 20_000;
        let dr = radius / n as f64;
        let mut sum = 0.0;
        for i in 0..n {
            let r = (i as f64 + 0.5) * dr;
            let shell = match dim {
                1 => 2.0,
                2 => 2.0 * PI * r,
                3 => 4.0 * PI * r * r,
                _ => unreachable!(),
            };
            sum += kernel.value_radial(r, h, dim) * shell * dr;
        }
        sum
    }

    fn check_kernel<K: SmoothingKernel<f64> + Default>(compact: bool) {
        let kernel = K::default();
        let h = 0.5;

        // Unit normalization in every supported dimension
        for dim in 1..=3 {
            assert_relative_eq!(integrate(&kernel, dim), 1.0, max_relative = 1e-2);
        }

        // Odd gradient symmetry
        let x = Vector2::new(0.3, -0.2);
        assert_relative_eq!(
            kernel.gradient(&x, h),
            -kernel.gradient(&(-x), h),
            epsilon = 1e-12
        );

        // Vanishing value and gradient outside of the support radius
        if compact {
            let outside = Vector2::new(kernel.radius(h) * 1.001, 0.0);
            assert_eq!(kernel.value(&outside, h), 0.0);
            assert_eq!(kernel.gradient(&outside, h), Vector2::zeros());
        }

        // Width derivative against a central finite difference
        let dh = 1e-5;
        let fd = (kernel.value(&x, h + dh) - kernel.value(&x, h - dh)) / (2.0 * dh);
        assert_relative_eq!(kernel.width_deriv(&x, h), fd, max_relative = 1e-2);
    }

    #[test]
    fn gaussian_kernel_properties() {
        check_kernel::<GaussianKernel>(false);
    }

    #[test]
    fn cubic_spline_kernel_properties() {
        check_kernel::<CubicSplineKernel>(true);
    }

    #[test]
    fn quartic_spline_kernel_properties() {
        check_kernel::<QuarticSplineKernel>(true);
    }

    #[test]
    fn quintic_spline_kernel_properties() {
        check_kernel::<QuinticSplineKernel>(true);
    }

    #[test]
    fn wendland_c2_kernel_properties() {
        check_kernel::<WendlandC2Kernel>(true);
    }

    #[test]
    fn wendland_c4_kernel_properties() {
        check_kernel::<WendlandC4Kernel>(true);
    }

    #[test]
    fn wendland_c6_kernel_properties() {
        check_kernel::<WendlandC6Kernel>(true);
    }

    #[test]
    fn spline_derivatives_match_finite_differences() {
        let dq = 1e-6;
        for q in [0.1, 0.4, 0.9, 1.4, 1.9, 2.4, 2.9] {
            let fd = (<QuinticSplineKernel as SmoothingKernel<f64>>::unit_value(q + dq)
                - <QuinticSplineKernel as SmoothingKernel<f64>>::unit_value(q - dq))
                / (2.0 * dq);
            let exact = <QuinticSplineKernel as SmoothingKernel<f64>>::unit_deriv(q);
            assert_relative_eq!(exact, fd, epsilon = 1e-4, max_relative = 1e-4);
        }
    }
}
