//! Camera, view frustum and world-space bounding boxes.

use glam::{DMat4, DVec3};

/// A world-space axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    #[must_use]
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Smallest box around `points`, or `None` when there are none.
    pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |b, p| {
            Self::new(b.min.min(p), b.max.max(p))
        }))
    }

    #[must_use]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn half_extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    /// Distance from `point` to the nearest point of the box; zero inside.
    #[must_use]
    pub fn distance_to(&self, point: DVec3) -> f64 {
        let clamped = point.clamp(self.min, self.max);
        point.distance(clamped)
    }
}

/// A frustum for culling tiles by their bounding boxes.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    /// Left, right, bottom, top, near and far planes as (normal, distance).
    planes: [(DVec3, f64); 6],
}

impl Frustum {
    /// Extract the six planes of an OpenGL-style view-projection matrix.
    #[must_use]
    pub fn from_matrix(view_projection: DMat4) -> Self {
        let m = view_projection.to_cols_array_2d();
        let row = |i: usize| [m[0][i], m[1][i], m[2][i], m[3][i]];
        let (x, y, z, w) = (row(0), row(1), row(2), row(3));

        let combine = |a: [f64; 4], b: [f64; 4], sign: f64| {
            Self::normalize_plane(
                a[0] + sign * b[0],
                a[1] + sign * b[1],
                a[2] + sign * b[2],
                a[3] + sign * b[3],
            )
        };

        Self {
            planes: [
                combine(w, x, 1.0),
                combine(w, x, -1.0),
                combine(w, y, 1.0),
                combine(w, y, -1.0),
                combine(w, z, 1.0),
                combine(w, z, -1.0),
            ],
        }
    }

    /// A frustum that contains everything.
    #[must_use]
    pub fn infinite() -> Self {
        Self {
            planes: [(DVec3::ZERO, 0.0); 6],
        }
    }

    fn normalize_plane(a: f64, b: f64, c: f64, d: f64) -> (DVec3, f64) {
        let normal = DVec3::new(a, b, c);
        let length = normal.length();
        if length > 0.0 {
            (normal / length, d / length)
        } else {
            (DVec3::ZERO, 0.0)
        }
    }

    /// Test if a bounding box intersects the frustum.
    #[must_use]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let center = aabb.center();
        let extents = aabb.half_extents();
        self.planes.iter().all(|&(normal, distance)| {
            let r = extents.dot(normal.abs());
            normal.dot(center) + distance >= -r
        })
    }
}

/// The viewer, as far as tile selection is concerned.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    /// World-space position in meters.
    pub position: DVec3,
    /// Vertical field of view in radians.
    pub fov_y: f64,
    pub frustum: Frustum,
}

impl Camera {
    #[must_use]
    pub fn new(position: DVec3, fov_y: f64, frustum: Frustum) -> Self {
        Self {
            position,
            fov_y,
            frustum,
        }
    }

    /// Perspective camera at `position` looking at `target`.
    #[must_use]
    pub fn look_at(
        position: DVec3,
        target: DVec3,
        up: DVec3,
        fov_y: f64,
        aspect: f64,
        near: f64,
        far: f64,
    ) -> Self {
        let view = DMat4::look_at_rh(position, target, up);
        let projection = DMat4::perspective_rh_gl(fov_y, aspect, near, far);
        Self::new(position, fov_y, Frustum::from_matrix(projection * view))
    }

    /// Camera that sees in every direction, for headless refinement.
    #[must_use]
    pub fn omniscient(position: DVec3, fov_y: f64) -> Self {
        Self::new(position, fov_y, Frustum::infinite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_distance() {
        let b = Aabb::new(DVec3::ZERO, DVec3::ONE);
        assert_eq!(b.distance_to(DVec3::splat(0.5)), 0.0);
        assert!((b.distance_to(DVec3::new(3.0, 0.5, 0.5)) - 2.0).abs() < 1e-12);
        assert_eq!(b.distance_to(DVec3::splat(1.0)), 0.0);
    }

    #[test]
    fn test_from_points() {
        assert!(Aabb::from_points(Vec::<DVec3>::new()).is_none());
        let b = Aabb::from_points([DVec3::new(1.0, -2.0, 0.0), DVec3::new(-1.0, 2.0, 3.0)]).unwrap();
        assert_eq!(b.min, DVec3::new(-1.0, -2.0, 0.0));
        assert_eq!(b.max, DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_frustum_culls_behind_camera() {
        let camera = Camera::look_at(
            DVec3::ZERO,
            DVec3::NEG_Z,
            DVec3::Y,
            std::f64::consts::FRAC_PI_3,
            1.0,
            0.1,
            1000.0,
        );
        let ahead = Aabb::new(DVec3::new(-1.0, -1.0, -20.0), DVec3::new(1.0, 1.0, -10.0));
        let behind = Aabb::new(DVec3::new(-1.0, -1.0, 10.0), DVec3::new(1.0, 1.0, 20.0));
        let beyond = Aabb::new(DVec3::new(-1.0, -1.0, -3000.0), DVec3::new(1.0, 1.0, -2000.0));
        assert!(camera.frustum.intersects_aabb(&ahead));
        assert!(!camera.frustum.intersects_aabb(&behind));
        assert!(!camera.frustum.intersects_aabb(&beyond));
    }

    #[test]
    fn test_infinite_frustum() {
        let b = Aabb::new(DVec3::splat(1e9), DVec3::splat(1e9 + 1.0));
        assert!(Frustum::infinite().intersects_aabb(&b));
    }
}
