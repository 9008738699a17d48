//! Dense factorizations and eigendecomposition for the small matrices used by the solver
//!
//! The field operators only ever factorize tiny systems (2×2 renormalization matrices,
//! 3×3 moving-least-squares moment matrices), so all routines here are written directly
//! against statically-sized [`nalgebra`] matrices. Numerical failure (near-singular
//! pivots, indefiniteness, missing convergence) is reported through typed errors instead
//! of panics so that callers inside parallel loops can fall back gracefully.

mod eig;
mod fact;
mod part;

pub use eig::{jacobi, EigenError, SymmetricEigen};
pub use fact::{
    cholesky, ldlt, lu, CholeskyFactorization, FactorError, LdltFactorization, LuFactorization,
};
pub use part::{copy_part, part_entry, part_solve_in_place, transpose, MatPart};
