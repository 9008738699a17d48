//! LU, Cholesky and LDLᵀ factorizations of statically-sized matrices

use nalgebra::SMatrix;
use thiserror::Error as ThisError;

use super::part::{copy_part, part_solve_in_place, MatPart};
use crate::Real;

/// Error type returned when a factorization cannot be computed
#[derive(Copy, Clone, Debug, PartialEq, Eq, ThisError)]
pub enum FactorError {
    /// A pivot magnitude fell below the tiny-number threshold
    #[error("matrix is nearly singular")]
    NearSingular,
    /// A candidate diagonal square was negative (Cholesky only)
    #[error("matrix is not positive definite")]
    NotPositiveDefinite,
}

fn diagonal_product<R: Real, const D: usize>(a: &SMatrix<R, D, D>) -> R {
    (0..D).fold(R::one(), |acc, i| acc * a[(i, i)])
}

/// LU factorization `A = L * U` with unit-lower `L` and upper-triangular `U`
///
/// Both factors are packed into a single matrix; the unit diagonal of `L` is implicit.
#[derive(Copy, Clone, Debug)]
pub struct LuFactorization<R: Real, const D: usize> {
    lu: SMatrix<R, D, D>,
}

impl<R: Real, const D: usize> LuFactorization<R, D> {
    /// The unit-lower-triangular factor `L`
    pub fn l(&self) -> SMatrix<R, D, D> {
        copy_part(&self.lu, MatPart::LOWER_UNIT)
    }

    /// The upper-triangular factor `U`
    pub fn u(&self) -> SMatrix<R, D, D> {
        copy_part(&self.lu, MatPart::UPPER_DIAG)
    }

    /// Determinant of the factorized matrix
    pub fn det(&self) -> R {
        diagonal_product(&self.lu)
    }

    /// Solves `A * y = x` for any column count of the right-hand side
    pub fn solve<const C: usize>(&self, mut x: SMatrix<R, D, C>) -> SMatrix<R, D, C> {
        part_solve_in_place(&self.lu, MatPart::LOWER_UNIT, &mut x);
        part_solve_in_place(&self.lu, MatPart::UPPER_DIAG, &mut x);
        x
    }

    /// Inverse of the factorized matrix
    pub fn inverse(&self) -> SMatrix<R, D, D> {
        self.solve(SMatrix::identity())
    }
}

/// Computes the LU factorization of `a`
pub fn lu<R: Real, const D: usize>(
    a: &SMatrix<R, D, D>,
) -> Result<LuFactorization<R, D>, FactorError> {
    let mut f = SMatrix::<R, D, D>::zeros();
    for i in 0..D {
        for j in 0..i {
            let mut l_ij = a[(i, j)];
            for k in 0..j {
                l_ij -= f[(i, k)] * f[(k, j)];
            }
            f[(i, j)] = l_ij / f[(j, j)];
        }
        for j in i..D {
            let mut u_ij = a[(i, j)];
            for k in 0..i {
                u_ij -= f[(i, k)] * f[(k, j)];
            }
            f[(i, j)] = u_ij;
        }
        if f[(i, i)].is_tiny() {
            return Err(FactorError::NearSingular);
        }
    }
    Ok(LuFactorization { lu: f })
}

/// Cholesky factorization `A = L * Lᵀ` with lower-triangular `L`
///
/// Suitable for symmetric positive definite matrices. Only the lower triangle of the
/// input is accessed.
#[derive(Copy, Clone, Debug)]
pub struct CholeskyFactorization<R: Real, const D: usize> {
    l: SMatrix<R, D, D>,
}

impl<R: Real, const D: usize> CholeskyFactorization<R, D> {
    /// The lower-triangular factor `L`
    pub fn l(&self) -> &SMatrix<R, D, D> {
        &self.l
    }

    /// Determinant of the factorized matrix
    pub fn det(&self) -> R {
        let d = diagonal_product(&self.l);
        d * d
    }

    /// Solves `A * y = x` for any column count of the right-hand side
    pub fn solve<const C: usize>(&self, mut x: SMatrix<R, D, C>) -> SMatrix<R, D, C> {
        part_solve_in_place(&self.l, MatPart::LOWER_DIAG, &mut x);
        part_solve_in_place(&self.l, MatPart::UPPER_DIAG | MatPart::TRANSPOSED, &mut x);
        x
    }

    /// Inverse of the factorized matrix
    pub fn inverse(&self) -> SMatrix<R, D, D> {
        self.solve(SMatrix::identity())
    }
}

/// Computes the Cholesky factorization of `a`
pub fn cholesky<R: Real, const D: usize>(
    a: &SMatrix<R, D, D>,
) -> Result<CholeskyFactorization<R, D>, FactorError> {
    let mut l = SMatrix::<R, D, D>::zeros();
    for i in 0..D {
        for j in 0..i {
            let mut l_ij = a[(i, j)];
            for k in 0..j {
                l_ij -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = l_ij / l[(j, j)];
        }
        let mut d = a[(i, i)];
        for k in 0..i {
            d -= l[(i, k)] * l[(i, k)];
        }
        if d < R::zero() {
            return Err(FactorError::NotPositiveDefinite);
        }
        l[(i, i)] = d.sqrt();
        if l[(i, i)].is_tiny() {
            return Err(FactorError::NearSingular);
        }
    }
    Ok(CholeskyFactorization { l })
}

/// Modified Cholesky factorization `A = L * D * Lᵀ` with unit-lower `L` and diagonal `D`
///
/// Suitable for symmetric matrices that need not be positive definite. Only the lower
/// triangle of the input is accessed.
#[derive(Copy, Clone, Debug)]
pub struct LdltFactorization<R: Real, const D: usize> {
    ld: SMatrix<R, D, D>,
}

impl<R: Real, const D: usize> LdltFactorization<R, D> {
    /// The unit-lower-triangular factor `L`
    pub fn l(&self) -> SMatrix<R, D, D> {
        copy_part(&self.ld, MatPart::LOWER_UNIT)
    }

    /// The diagonal factor `D`
    pub fn d(&self) -> SMatrix<R, D, D> {
        copy_part(&self.ld, MatPart::DIAG)
    }

    /// Determinant of the factorized matrix
    pub fn det(&self) -> R {
        diagonal_product(&self.ld)
    }

    /// Solves `A * y = x` for any column count of the right-hand side
    pub fn solve<const C: usize>(&self, mut x: SMatrix<R, D, C>) -> SMatrix<R, D, C> {
        part_solve_in_place(&self.ld, MatPart::LOWER_UNIT, &mut x);
        part_solve_in_place(&self.ld, MatPart::DIAG, &mut x);
        part_solve_in_place(&self.ld, MatPart::UPPER_UNIT | MatPart::TRANSPOSED, &mut x);
        x
    }

    /// Inverse of the factorized matrix
    pub fn inverse(&self) -> SMatrix<R, D, D> {
        self.solve(SMatrix::identity())
    }
}

/// Computes the LDLᵀ factorization of `a`
pub fn ldlt<R: Real, const D: usize>(
    a: &SMatrix<R, D, D>,
) -> Result<LdltFactorization<R, D>, FactorError> {
    let mut f = SMatrix::<R, D, D>::zeros();
    for i in 0..D {
        for j in 0..i {
            let mut l_ij = a[(i, j)];
            for k in 0..j {
                l_ij -= f[(i, k)] * f[(k, k)] * f[(j, k)];
            }
            f[(i, j)] = l_ij / f[(j, j)];
        }
        let mut d = a[(i, i)];
        for k in 0..i {
            d -= f[(i, k)] * f[(k, k)] * f[(i, k)];
        }
        if d.is_tiny() {
            return Err(FactorError::NearSingular);
        }
        f[(i, i)] = d;
    }
    Ok(LdltFactorization { ld: f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn cholesky_reference_case() {
        // A = [[4, 1], [1, 3]], L = [[2, 0], [0.5, sqrt(2.75)]]
        let a = Matrix2::new(4.0, 1.0, 1.0, 3.0);
        let f = cholesky(&a).unwrap();
        let l = f.l();
        assert_relative_eq!(l[(0, 0)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(l[(1, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(l[(0, 1)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(l[(1, 1)], 2.75f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(f.det(), 11.0, epsilon = 1e-12);
        let x = f.solve(Vector2::new(1.0, 1.0));
        assert_relative_eq!(x, Vector2::new(2.0 / 11.0, 3.0 / 11.0), epsilon = 1e-12);
    }

    #[test]
    fn cholesky_roundtrip_on_random_spd_matrices() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..32 {
            let b = Matrix3::from_fn(|_, _| rng.gen_range(-1.0..1.0));
            let a = b * b.transpose() + Matrix3::identity() * 0.5;
            let f = cholesky(&a).unwrap();
            let x = Vector3::new(rng.gen(), rng.gen(), rng.gen());
            // solve(inverse().solve(x)) == x and L * L^T == A
            assert_relative_eq!(f.solve(f.inverse().solve(x)), x, epsilon = 1e-8);
            assert_relative_eq!(f.l() * f.l().transpose(), a, epsilon = 1e-10);
            assert_relative_eq!(
                f.det(),
                diagonal_product(f.l()) * diagonal_product(f.l()),
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn cholesky_rejects_indefinite_matrices() {
        let a = Matrix2::new(1.0, 2.0, 2.0, 1.0);
        assert_eq!(
            cholesky(&a).map(|_| ()),
            Err(FactorError::NotPositiveDefinite)
        );
    }

    #[test]
    fn lu_solves_random_systems() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let a = Matrix3::from_fn(|i, j| {
                rng.gen_range(-1.0..1.0) + if i == j { 3.0 } else { 0.0 }
            });
            let f = lu(&a).unwrap();
            let x = Vector3::new(rng.gen(), rng.gen(), rng.gen());
            assert_relative_eq!(f.solve(a * x), x, epsilon = 1e-9);
            assert_relative_eq!(f.l() * f.u(), a, epsilon = 1e-10);
            assert_relative_eq!(f.det(), diagonal_product(&(f.u())), epsilon = 1e-9);
            assert_relative_eq!(a * f.inverse(), Matrix3::identity(), epsilon = 1e-9);
        }
    }

    #[test]
    fn lu_reports_singular_matrices() {
        let a = Matrix2::new(1.0, 2.0, 2.0, 4.0);
        assert_eq!(lu(&a).map(|_| ()), Err(FactorError::NearSingular));
    }

    #[test]
    fn ldlt_solves_symmetric_indefinite_systems() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..32 {
            let b = Matrix2::from_fn(|_, _| rng.gen_range(-1.0..1.0));
            // Symmetric, possibly indefinite
            let a = (b + b.transpose()) + Matrix2::identity() * 2.0;
            let f = ldlt(&a).unwrap();
            let x = Vector2::new(rng.gen(), rng.gen());
            assert_relative_eq!(f.solve(a * x), x, epsilon = 1e-9);
            assert_relative_eq!(f.l() * f.d() * f.l().transpose(), a, epsilon = 1e-10);
        }
    }

    #[test]
    fn ldlt_reports_tiny_pivots() {
        let a = Matrix2::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(ldlt(&a).map(|_| ()), Err(FactorError::NearSingular));
    }
}
