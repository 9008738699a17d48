//! Numeric type traits used throughout the crate

use std::fmt::Debug;

use num::{FromPrimitive, NumCast, ToPrimitive};

/// Convenience trait for types that can be shared between threads
pub trait ThreadSafe: Sync + Send {}
impl<T> ThreadSafe for T where T: Sync + Send {}

/// Trait for the scalar type used for all numeric work of the solver
///
/// The reference build instantiates everything with [`f64`]; `f32` is supported for
/// experiments where the reduced precision is acceptable.
pub trait Real:
    nalgebra::RealField
    + Copy
    + Default
    + Debug
    + FromPrimitive
    + ToPrimitive
    + NumCast
    + ThreadSafe
{
    /// Converts a value of another primitive numeric type to this type.
    ///
    /// Intended for compile-time constants and literals, therefore panics if the value
    /// cannot be represented (a programming error).
    fn from_float<T: ToPrimitive>(value: T) -> Self {
        Self::from_f64(
            value
                .to_f64()
                .expect("failed to convert literal to f64 representation"),
        )
        .expect("failed to convert value to target real type")
    }

    /// Tries to convert this value to another [`Real`] type, returns `None` if it cannot be represented
    fn try_convert<T: Real>(self) -> Option<T> {
        T::from_f64(self.to_f64()?)
    }

    /// Threshold below which a magnitude is treated as zero (cube root of the machine epsilon)
    fn tiny() -> Self;

    /// Smallest positive normal value of this type
    fn min_positive() -> Self;

    /// Whether the magnitude of this value is treated as zero
    fn is_tiny(self) -> bool {
        self.abs() <= Self::tiny()
    }
}

impl Real for f32 {
    fn tiny() -> Self {
        f32::EPSILON.cbrt()
    }

    fn min_positive() -> Self {
        f32::MIN_POSITIVE
    }
}

impl Real for f64 {
    fn tiny() -> Self {
        f64::EPSILON.cbrt()
    }

    fn min_positive() -> Self {
        f64::MIN_POSITIVE
    }
}
