//! Geographic bounding rectangles in longitude/latitude radians.

use std::f64::consts::{FRAC_PI_2, PI};

use glam::DVec2;

use crate::error::{MeshError, MeshResult};

/// An axis-aligned rectangle in (longitude, latitude) radians.
///
/// `x` is longitude and `y` is latitude for both corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeographicBounds {
    /// South-west corner.
    pub min: DVec2,
    /// North-east corner.
    pub max: DVec2,
}

impl GeographicBounds {
    /// The whole globe.
    pub const WORLD: Self = Self {
        min: DVec2::new(-PI, -FRAC_PI_2),
        max: DVec2::new(PI, FRAC_PI_2),
    };

    /// Create bounds from two corners without validation.
    #[must_use]
    pub const fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    /// Create bounds from degree corners.
    #[must_use]
    pub fn from_degrees(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::new(
            DVec2::new(min_lon.to_radians(), min_lat.to_radians()),
            DVec2::new(max_lon.to_radians(), max_lat.to_radians()),
        )
    }

    /// Create bounds, rejecting inverted or non-finite corners.
    pub fn try_new(min: DVec2, max: DVec2) -> MeshResult<Self> {
        let bounds = Self::new(min, max);
        bounds.validate()?;
        Ok(bounds)
    }

    /// Check the `min <= max` invariant and finiteness.
    pub fn validate(&self) -> MeshResult<()> {
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err(MeshError::InvalidBounds {
                detail: format!("non-finite corner in {self:?}"),
            });
        }
        if self.min.x > self.max.x || self.min.y > self.max.y {
            return Err(MeshError::InvalidBounds {
                detail: format!("min {:?} exceeds max {:?}", self.min, self.max),
            });
        }
        Ok(())
    }

    /// The western hemisphere, root of the first quadtree.
    #[must_use]
    pub fn west_hemisphere() -> Self {
        Self::new(DVec2::new(-PI, -FRAC_PI_2), DVec2::new(0.0, FRAC_PI_2))
    }

    /// The eastern hemisphere, root of the second quadtree.
    #[must_use]
    pub fn east_hemisphere() -> Self {
        Self::new(DVec2::new(0.0, -FRAC_PI_2), DVec2::new(PI, FRAC_PI_2))
    }

    /// Longitude extent in radians.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Latitude extent in radians.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Angular area in square radians (not a surface area).
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    #[must_use]
    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    /// Whether `point` lies inside or on the border.
    #[must_use]
    pub fn contains(&self, point: DVec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    /// Whether `other` lies entirely inside these bounds.
    #[must_use]
    pub fn contains_bounds(&self, other: &Self) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    /// The overlapping rectangle, if the overlap has any extent at all.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min.x <= max.x && min.y <= max.y).then_some(Self::new(min, max))
    }

    /// Whether the two rectangles share any point, borders included.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.intersection(other).is_some()
    }

    /// Area of the overlap; zero when the rectangles only touch.
    #[must_use]
    pub fn intersection_area(&self, other: &Self) -> f64 {
        self.intersection(other).map_or(0.0, |b| b.area())
    }

    /// The smallest bounds containing both rectangles.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Whether the northern edge sits on the north pole.
    #[must_use]
    pub fn touches_north_pole(&self) -> bool {
        self.max.y >= FRAC_PI_2
    }

    /// Whether the southern edge sits on the south pole.
    #[must_use]
    pub fn touches_south_pole(&self) -> bool {
        self.min.y <= -FRAC_PI_2
    }

    /// Split into four quadrants: south-west, south-east, north-west, north-east.
    ///
    /// The quadrants share the exact midpoint values so their union is `self`.
    #[must_use]
    pub fn quadrants(&self) -> [Self; 4] {
        let mid = self.center();
        [
            Self::new(self.min, mid),
            Self::new(DVec2::new(mid.x, self.min.y), DVec2::new(self.max.x, mid.y)),
            Self::new(DVec2::new(self.min.x, mid.y), DVec2::new(mid.x, self.max.y)),
            Self::new(mid, self.max),
        ]
    }

    /// Split along the latitude midpoint into a southern and a northern half.
    #[must_use]
    pub fn latitude_halves(&self) -> [Self; 2] {
        let mid = self.center().y;
        [
            Self::new(self.min, DVec2::new(self.max.x, mid)),
            Self::new(DVec2::new(self.min.x, mid), self.max),
        ]
    }

    /// Bounds grown by `margin` radians on every side.
    #[must_use]
    pub fn expanded(&self, margin: DVec2) -> Self {
        Self::new(self.min - margin, self.max + margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hemispheres_partition_world() {
        let west = GeographicBounds::west_hemisphere();
        let east = GeographicBounds::east_hemisphere();
        assert_eq!(west.union(&east), GeographicBounds::WORLD);
        assert_eq!(west.intersection_area(&east), 0.0);
        assert!(west.touches_north_pole() && west.touches_south_pole());
    }

    #[test]
    fn test_validate_rejects_inverted() {
        let result = GeographicBounds::try_new(DVec2::new(1.0, 0.0), DVec2::new(0.0, 1.0));
        assert!(matches!(result, Err(MeshError::InvalidBounds { .. })));

        let result = GeographicBounds::try_new(DVec2::new(f64::NAN, 0.0), DVec2::ONE);
        assert!(matches!(result, Err(MeshError::InvalidBounds { .. })));
    }

    #[test]
    fn test_intersection_touching_has_no_area() {
        let a = GeographicBounds::new(DVec2::ZERO, DVec2::ONE);
        let b = GeographicBounds::new(DVec2::new(1.0, 0.0), DVec2::new(2.0, 1.0));
        assert!(a.intersects(&b));
        assert_eq!(a.intersection_area(&b), 0.0);

        let c = GeographicBounds::new(DVec2::new(3.0, 3.0), DVec2::new(4.0, 4.0));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_latitude_halves_of_root() {
        let [south, north] = GeographicBounds::west_hemisphere().latitude_halves();
        assert!(south.touches_south_pole() && !south.touches_north_pole());
        assert!(north.touches_north_pole() && !north.touches_south_pole());
        assert_eq!(south.max.y, 0.0);
        assert_eq!(north.min.y, 0.0);
    }

    fn arb_bounds() -> impl Strategy<Value = GeographicBounds> {
        (-3.0..3.0f64, -1.5..1.5f64, 1e-6..3.0f64, 1e-6..1.5f64).prop_map(|(x, y, w, h)| {
            GeographicBounds::new(DVec2::new(x, y), DVec2::new(x + w, y + h))
        })
    }

    proptest! {
        #[test]
        fn prop_quadrants_partition_parent(bounds in arb_bounds()) {
            let quads = bounds.quadrants();
            let union = quads.iter().skip(1).fold(quads[0], |acc, q| acc.union(q));
            prop_assert_eq!(union, bounds);

            for i in 0..4 {
                prop_assert!(bounds.contains_bounds(&quads[i]));
                for j in (i + 1)..4 {
                    prop_assert_eq!(quads[i].intersection_area(&quads[j]), 0.0);
                }
            }

            let total: f64 = quads.iter().map(GeographicBounds::area).sum();
            prop_assert!((total - bounds.area()).abs() <= 1e-12 * bounds.area().max(1.0));
        }

        #[test]
        fn prop_latitude_halves_partition_parent(bounds in arb_bounds()) {
            let [south, north] = bounds.latitude_halves();
            prop_assert_eq!(south.union(&north), bounds);
            prop_assert_eq!(south.intersection_area(&north), 0.0);
        }
    }
}
