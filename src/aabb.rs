//! Axis-aligned bounding boxes

use nalgebra::SVector;
use rayon::prelude::*;

use crate::Real;

/// Axis-aligned bounding box of dimension `D`
#[derive(Clone, Debug, PartialEq)]
pub struct AxisAlignedBoundingBox<R: Real, const D: usize> {
    min: SVector<R, D>,
    max: SVector<R, D>,
}

/// Convenience type alias for a two-dimensional bounding box
pub type AxisAlignedBoundingBox2d<R> = AxisAlignedBoundingBox<R, 2>;

impl<R: Real, const D: usize> AxisAlignedBoundingBox<R, D> {
    /// Constructs a bounding box with the given min and max coordinates, panics if a min coordinate is larger than the corresponding max coordinate
    pub fn new(min: SVector<R, D>, max: SVector<R, D>) -> Self {
        assert!(
            min.iter().zip(max.iter()).all(|(lo, hi)| lo <= hi),
            "invalid bounding box corners"
        );
        Self { min, max }
    }

    /// Constructs a degenerate bounding box containing only the given point
    pub fn from_point(point: SVector<R, D>) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Constructs the smallest bounding box enclosing all given points, `None` if the slice is empty
    pub fn from_points(points: &[SVector<R, D>]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = Self::from_point(*first);
        for p in rest {
            aabb.join_with_point(p);
        }
        Some(aabb)
    }

    /// Parallel version of [`Self::from_points`]
    pub fn from_points_par(points: &[SVector<R, D>]) -> Option<Self> {
        points
            .par_iter()
            .fold_with(None, |aabb: Option<Self>, p| match aabb {
                Some(mut aabb) => {
                    aabb.join_with_point(p);
                    Some(aabb)
                }
                None => Some(Self::from_point(*p)),
            })
            .reduce(
                || None,
                |a, b| match (a, b) {
                    (Some(mut a), Some(b)) => {
                        a.join(&b);
                        Some(a)
                    }
                    (a, None) => a,
                    (None, b) => b,
                },
            )
    }

    /// Lower corner of the bounding box
    pub fn min(&self) -> &SVector<R, D> {
        &self.min
    }

    /// Upper corner of the bounding box
    pub fn max(&self) -> &SVector<R, D> {
        &self.max
    }

    /// Center of the bounding box
    pub fn center(&self) -> SVector<R, D> {
        (self.min + self.max) * R::from_float(0.5)
    }

    /// Per-axis extents of the bounding box
    pub fn extents(&self) -> SVector<R, D> {
        self.max - self.min
    }

    /// Whether the given point is inside or on the surface of the bounding box
    pub fn contains_point(&self, point: &SVector<R, D>) -> bool {
        (0..D).all(|i| self.min[i] <= point[i] && point[i] <= self.max[i])
    }

    /// The point inside the bounding box that is closest to the given point
    pub fn clamp(&self, point: &SVector<R, D>) -> SVector<R, D> {
        SVector::from_fn(|i, _| point[i].clamp(self.min[i], self.max[i]))
    }

    /// Grows the bounding box on all sides by the given margin
    pub fn grow_uniformly(&mut self, margin: R) {
        self.min.iter_mut().for_each(|c| *c -= margin);
        self.max.iter_mut().for_each(|c| *c += margin);
    }

    /// Extends the bounding box to also contain the given point
    pub fn join_with_point(&mut self, point: &SVector<R, D>) {
        for i in 0..D {
            self.min[i] = self.min[i].min(point[i]);
            self.max[i] = self.max[i].max(point[i]);
        }
    }

    /// Extends the bounding box to also contain the other bounding box
    pub fn join(&mut self, other: &Self) {
        self.join_with_point(&other.min);
        self.join_with_point(&other.max);
    }

    /// Tries to convert the bounding box to another [`Real`] type, returns `None` if a conversion fails
    pub fn try_convert<T: Real>(&self) -> Option<AxisAlignedBoundingBox<T, D>> {
        let convert = |v: &SVector<R, D>| -> Option<SVector<T, D>> {
            let mut out = SVector::<T, D>::zeros();
            for i in 0..D {
                out[i] = v[i].try_convert()?;
            }
            Some(out)
        };
        Some(AxisAlignedBoundingBox {
            min: convert(&self.min)?,
            max: convert(&self.max)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    #[test]
    fn clamp_projects_outside_points_onto_the_box() {
        let aabb = AxisAlignedBoundingBox2d::new(Vector2::new(0.0, 0.0), Vector2::new(2.0, 1.0));
        assert_eq!(
            aabb.clamp(&Vector2::new(-1.0, 0.5)),
            Vector2::new(0.0, 0.5)
        );
        assert_eq!(aabb.clamp(&Vector2::new(3.0, 2.0)), Vector2::new(2.0, 1.0));
        assert_eq!(
            aabb.clamp(&Vector2::new(0.5, 0.25)),
            Vector2::new(0.5, 0.25)
        );
    }

    #[test]
    fn from_points_encloses_all_points() {
        let points = [
            Vector2::new(0.5, -1.0),
            Vector2::new(-0.25, 2.0),
            Vector2::new(1.0, 0.0),
        ];
        let aabb = AxisAlignedBoundingBox2d::from_points(&points).unwrap();
        assert_eq!(*aabb.min(), Vector2::new(-0.25, -1.0));
        assert_eq!(*aabb.max(), Vector2::new(1.0, 2.0));
        assert_eq!(
            AxisAlignedBoundingBox2d::from_points_par(&points).unwrap(),
            aabb
        );
        for p in &points {
            assert!(aabb.contains_point(p));
        }
    }

    #[test]
    fn grow_extends_all_sides() {
        let mut aabb =
            AxisAlignedBoundingBox2d::new(Vector2::new(0.0, 0.0), Vector2::new(1.0, 1.0));
        aabb.grow_uniformly(0.5);
        assert_eq!(*aabb.min(), Vector2::new(-0.5, -0.5));
        assert_eq!(*aabb.max(), Vector2::new(1.5, 1.5));
    }
}
