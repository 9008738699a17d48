//! Jacobi eigendecomposition of symmetric matrices

use nalgebra::{SMatrix, SVector};
use thiserror::Error as ThisError;

use crate::Real;

/// Eigenvectors and eigenvalues of a symmetric matrix
///
/// The rows of `vectors` are the eigenvectors, so `vectors * A == diag(values) * vectors`.
#[derive(Copy, Clone, Debug)]
pub struct SymmetricEigen<R: Real, const D: usize> {
    /// Eigenvectors, stored as rows
    pub vectors: SMatrix<R, D, D>,
    /// Eigenvalues, in the order corresponding to the rows of `vectors`
    pub values: SVector<R, D>,
}

/// Error type returned when the eigensolver fails
#[derive(Copy, Clone, Debug, PartialEq, Eq, ThisError)]
pub enum EigenError {
    /// The largest off-diagonal element did not fall below the threshold within the sweep limit
    #[error("eigensolver failed to converge")]
    NotConverged,
}

/// Computes the eigendecomposition of a symmetric matrix with the Jacobi rotation algorithm
///
/// Only the lower triangle of the input is accessed. The iteration stops once the largest
/// off-diagonal magnitude falls below the tiny-number threshold and fails after `32 * D`
/// sweeps without convergence.
pub fn jacobi<R: Real, const D: usize>(
    mut a: SMatrix<R, D, D>,
) -> Result<SymmetricEigen<R, D>, EigenError> {
    let mut v = SMatrix::<R, D, D>::identity();
    if D == 1 {
        return Ok(SymmetricEigen {
            vectors: v,
            values: SVector::from_fn(|i, _| a[(i, i)]),
        });
    }

    // Mirror the lower triangle so the rotations below can address both halves.
    for i in 0..D {
        for j in 0..i {
            a[(j, i)] = a[(i, j)];
        }
    }

    let max_sweeps = 32 * D;
    for _ in 0..max_sweeps {
        // Find the largest off-diagonal element.
        let mut p = 1;
        let mut q = 0;
        for i in 2..D {
            for j in 0..i {
                if a[(i, j)].abs() > a[(p, q)].abs() {
                    p = i;
                    q = j;
                }
            }
        }

        if a[(p, q)].abs() <= R::tiny() {
            return Ok(SymmetricEigen {
                vectors: v,
                values: SVector::from_fn(|i, _| a[(i, i)]),
            });
        }

        let theta = R::from_float(0.5)
            * (R::from_float(2.0) * a[(p, q)]).atan2(a[(q, q)] - a[(p, p)]);
        let c = theta.cos();
        let s = theta.sin();

        for i in 0..D {
            if i == p || i == q {
                continue;
            }
            let a_pi = a[(p, i)];
            let a_qi = a[(q, i)];
            a[(p, i)] = c * a_pi - s * a_qi;
            a[(i, p)] = a[(p, i)];
            a[(q, i)] = s * a_pi + c * a_qi;
            a[(i, q)] = a[(q, i)];
        }
        let a_pp = a[(p, p)];
        let a_pq = a[(p, q)];
        let a_qq = a[(q, q)];
        a[(p, p)] = c * (c * a_pp - s * a_pq) - s * (c * a_pq - s * a_qq);
        a[(q, q)] = s * (s * a_pp + c * a_pq) + c * (s * a_pq + c * a_qq);
        a[(p, q)] = R::zero();
        a[(q, p)] = R::zero();

        for i in 0..D {
            let v_pi = v[(p, i)];
            let v_qi = v[(q, i)];
            v[(p, i)] = c * v_pi - s * v_qi;
            v[(q, i)] = s * v_pi + c * v_qi;
        }
    }

    Err(EigenError::NotConverged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Matrix2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn diagonalizes_symmetric_2x2_matrices() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..64 {
            let a = {
                let b = Matrix2::from_fn(|_, _| rng.gen_range(-2.0..2.0));
                b + b.transpose()
            };
            let eig = jacobi(a).unwrap();
            // V * A == diag(d) * V
            let lhs = eig.vectors * a;
            let rhs = Matrix2::from_diagonal(&eig.values) * eig.vectors;
            assert_relative_eq!(lhs, rhs, epsilon = 1e-9);
        }
    }

    #[test]
    fn diagonal_matrices_converge_immediately() {
        let a = Matrix2::new(3.0, 0.0, 0.0, -1.0);
        let eig = jacobi(a).unwrap();
        assert_relative_eq!(eig.values[0], 3.0, epsilon = 1e-12);
        assert_relative_eq!(eig.values[1], -1.0, epsilon = 1e-12);
        assert_relative_eq!(eig.vectors, Matrix2::identity(), epsilon = 1e-12);
    }
}
