//! Matrix part specifications for triangular copies and solves

use bitflags::bitflags;
use nalgebra::SMatrix;

use crate::Real;

bitflags! {
    /// Selects a part of a square matrix for masked reads, copies and triangular solves.
    ///
    /// Exactly one of [`MatPart::DIAG`] and [`MatPart::UNIT`] must be set for a solve,
    /// and at most one of [`MatPart::LOWER`] and [`MatPart::UPPER`]; violations are
    /// programming errors and are asserted.
    pub struct MatPart: u8 {
        /// The stored diagonal
        const DIAG = 0b0000_0001;
        /// An implicit unit diagonal
        const UNIT = 0b0000_0010;
        /// The strictly lower triangle
        const LOWER = 0b0000_0100;
        /// The strictly upper triangle
        const UPPER = 0b0000_1000;
        /// Read the selected part from the transposed matrix
        const TRANSPOSED = 0b1000_0000;

        /// Lower triangle including the stored diagonal
        const LOWER_DIAG = Self::LOWER.bits | Self::DIAG.bits;
        /// Lower triangle with a unit diagonal
        const LOWER_UNIT = Self::LOWER.bits | Self::UNIT.bits;
        /// Upper triangle including the stored diagonal
        const UPPER_DIAG = Self::UPPER.bits | Self::DIAG.bits;
        /// Upper triangle with a unit diagonal
        const UPPER_UNIT = Self::UPPER.bits | Self::UNIT.bits;
    }
}

/// Element `(i, j)` of the selected part of the matrix, zero outside of the part
pub fn part_entry<R: Real, const D: usize>(
    a: &SMatrix<R, D, D>,
    part: MatPart,
    i: usize,
    j: usize,
) -> R {
    assert!(i < D && j < D, "matrix part index out of range");
    assert!(
        !(part.contains(MatPart::DIAG) && part.contains(MatPart::UNIT)),
        "only one diagonal bit can be set"
    );

    if part.contains(MatPart::UNIT) && i == j {
        return R::one();
    }

    let in_part = (part.contains(MatPart::DIAG) && i == j)
        || (part.contains(MatPart::LOWER) && i > j)
        || (part.contains(MatPart::UPPER) && i < j);
    if !in_part {
        return R::zero();
    }

    if part.contains(MatPart::TRANSPOSED) {
        a[(j, i)]
    } else {
        a[(i, j)]
    }
}

/// Copies the selected part of the matrix, filling the remainder with zeros
pub fn copy_part<R: Real, const D: usize>(a: &SMatrix<R, D, D>, part: MatPart) -> SMatrix<R, D, D> {
    SMatrix::from_fn(|i, j| part_entry(a, part, i, j))
}

/// Transposes a square matrix through the part machinery
pub fn transpose<R: Real, const D: usize>(a: &SMatrix<R, D, D>) -> SMatrix<R, D, D> {
    copy_part(
        a,
        MatPart::LOWER | MatPart::DIAG | MatPart::UPPER | MatPart::TRANSPOSED,
    )
}

/// Solves `copy_part(a, part) * y = x` in place, for every column of `x`
pub fn part_solve_in_place<R: Real, const D: usize, const C: usize>(
    a: &SMatrix<R, D, D>,
    part: MatPart,
    x: &mut SMatrix<R, D, C>,
) {
    assert!(
        part.intersects(MatPart::DIAG | MatPart::UNIT),
        "a diagonal bit must be set"
    );
    assert!(
        !(part.contains(MatPart::LOWER) && part.contains(MatPart::UPPER)),
        "only one triangular bit can be set"
    );

    for c in 0..C {
        if part.contains(MatPart::LOWER) {
            for i in 0..D {
                for j in 0..i {
                    let correction = part_entry(a, part, i, j) * x[(j, c)];
                    x[(i, c)] -= correction;
                }
                let pivot = part_entry(a, part, i, i);
                x[(i, c)] /= pivot;
            }
        } else if part.contains(MatPart::UPPER) {
            for i in (0..D).rev() {
                for j in (i + 1)..D {
                    let correction = part_entry(a, part, i, j) * x[(j, c)];
                    x[(i, c)] -= correction;
                }
                let pivot = part_entry(a, part, i, i);
                x[(i, c)] /= pivot;
            }
        } else if part.contains(MatPart::DIAG) {
            for i in 0..D {
                let pivot = part_entry(a, part, i, i);
                x[(i, c)] /= pivot;
            }
        }
        // A pure unit diagonal leaves the right-hand side unchanged.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix2, Vector2};

    #[test]
    fn part_entry_masks_and_substitutes() {
        let a = Matrix2::new(4.0, 1.0, 2.0, 3.0);
        assert_eq!(part_entry(&a, MatPart::LOWER_UNIT, 0, 0), 1.0);
        assert_eq!(part_entry(&a, MatPart::LOWER_UNIT, 1, 0), 2.0);
        assert_eq!(part_entry(&a, MatPart::LOWER_UNIT, 0, 1), 0.0);
        assert_eq!(part_entry(&a, MatPart::UPPER_DIAG, 0, 1), 1.0);
        assert_eq!(
            part_entry(&a, MatPart::UPPER_DIAG | MatPart::TRANSPOSED, 0, 1),
            2.0
        );
    }

    #[test]
    fn triangular_solves_invert_their_part() {
        let a = Matrix2::new(2.0, 0.0, 1.0, 4.0);
        let x = Vector2::new(1.0, 3.0);
        let mut y = a * x;
        part_solve_in_place(&a, MatPart::LOWER_DIAG, &mut y);
        assert_relative_eq!(y, x, epsilon = 1e-14);

        let u = Matrix2::new(3.0, -1.0, 0.0, 2.0);
        let mut y = u * x;
        part_solve_in_place(&u, MatPart::UPPER_DIAG, &mut y);
        assert_relative_eq!(y, x, epsilon = 1e-14);
    }

    #[test]
    fn transpose_swaps_triangles() {
        let a = Matrix2::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(transpose(&a), a.transpose());
    }

    #[test]
    #[should_panic]
    fn conflicting_diagonal_bits_are_rejected() {
        let a = Matrix2::new(1.0, 0.0, 0.0, 1.0);
        let _ = part_entry(&a, MatPart::DIAG | MatPart::UNIT, 0, 0);
    }
}
