//! WGS84 geodetic conversions and great-circle helpers.
//!
//! Cartesian frame: `x` through (lon 0, lat 0), `y` through (lon 90°E, lat 0),
//! `z` through the north pole. Angles are radians, heights are meters above
//! the ellipsoid.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use glam::{DVec2, DVec3};

/// WGS84 semi-major axis (meters).
pub const WGS84_SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
/// WGS84 first eccentricity squared.
pub const WGS84_ECCENTRICITY_SQUARED: f64 = 0.006_694_384_442_042;

/// An ellipsoid of revolution around the `z` axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Equatorial radius in meters.
    pub semi_major_axis: f64,
    /// First eccentricity squared (zero for a sphere).
    pub eccentricity_squared: f64,
}

impl Ellipsoid {
    pub const WGS84: Self = Self {
        semi_major_axis: WGS84_SEMI_MAJOR_AXIS,
        eccentricity_squared: WGS84_ECCENTRICITY_SQUARED,
    };

    /// A perfect sphere with the given radius.
    #[must_use]
    pub const fn sphere(radius: f64) -> Self {
        Self {
            semi_major_axis: radius,
            eccentricity_squared: 0.0,
        }
    }

    /// Polar radius in meters.
    #[must_use]
    pub fn semi_minor_axis(&self) -> f64 {
        self.semi_major_axis * (1.0 - self.eccentricity_squared).sqrt()
    }

    /// Forward transform from longitude, latitude and height to cartesian.
    #[must_use]
    pub fn llh_to_cartesian(&self, lon: f64, lat: f64, height: f64) -> DVec3 {
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();

        let n = self.semi_major_axis
            / (1.0 - self.eccentricity_squared * sin_lat * sin_lat).sqrt();

        DVec3::new(
            (n + height) * cos_lat * cos_lon,
            (n + height) * cos_lat * sin_lon,
            (n * (1.0 - self.eccentricity_squared) + height) * sin_lat,
        )
    }

    /// Inverse transform, returned as `(lon, lat, height)`.
    ///
    /// Uses Bowring's closed-form approximation, accurate to well below a
    /// millimeter for terrestrial heights.
    #[must_use]
    pub fn cartesian_to_llh(&self, point: DVec3) -> DVec3 {
        let a = self.semi_major_axis;
        let b = self.semi_minor_axis();
        let e2 = self.eccentricity_squared;
        let ep2 = (a * a - b * b) / (b * b);

        let p = point.x.hypot(point.y);
        let lon = point.y.atan2(point.x);

        if p < 1e-9 {
            // On the polar axis.
            let lat = FRAC_PI_2.copysign(point.z);
            return DVec3::new(lon, lat, point.z.abs() - b);
        }

        let theta = (point.z * a).atan2(p * b);
        let (sin_theta, cos_theta) = theta.sin_cos();
        let lat = (point.z + ep2 * b * sin_theta.powi(3)).atan2(p - e2 * a * cos_theta.powi(3));

        let sin_lat = lat.sin();
        let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let height = p / lat.cos() - n;

        DVec3::new(lon, lat, height)
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::WGS84
    }
}

/// WGS84 forward transform.
#[must_use]
pub fn llh_to_cartesian(lon: f64, lat: f64, height: f64) -> DVec3 {
    Ellipsoid::WGS84.llh_to_cartesian(lon, lat, height)
}

/// WGS84 inverse transform, returned as `(lon, lat, height)`.
#[must_use]
pub fn cartesian_to_llh(point: DVec3) -> DVec3 {
    Ellipsoid::WGS84.cartesian_to_llh(point)
}

/// Unit vector along the geodetic vertical.
#[must_use]
pub fn geodetic_up(lon: f64, lat: f64) -> DVec3 {
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
}

/// Map a position that overshoots a pole back onto the globe.
///
/// A latitude past `+π/2` continues down the far meridian: longitude gains
/// `π` and latitude becomes `π/2 - (lat - π/2)`. The south pole mirrors this.
#[must_use]
pub fn reflect_over_pole(lon: f64, lat: f64) -> DVec2 {
    if lat > FRAC_PI_2 {
        DVec2::new(lon + PI, FRAC_PI_2 - (lat - FRAC_PI_2))
    } else if lat < -FRAC_PI_2 {
        DVec2::new(lon + PI, -FRAC_PI_2 - (lat + FRAC_PI_2))
    } else {
        DVec2::new(lon, lat)
    }
}

/// Wrap a longitude into `[-π, π)`.
#[must_use]
pub fn wrap_longitude(lon: f64) -> f64 {
    (lon + PI).rem_euclid(TAU) - PI
}

/// Great-circle distance between two lon/lat points on a sphere.
#[must_use]
pub fn great_circle_distance(a: DVec2, b: DVec2, radius: f64) -> f64 {
    let d_lat = b.y - a.y;
    let d_lon = b.x - a.x;
    let h = (d_lat * 0.5).sin().powi(2) + a.y.cos() * b.y.cos() * (d_lon * 0.5).sin().powi(2);
    2.0 * radius * h.sqrt().min(1.0).asin()
}

/// Interpolate along the great circle from `a` to `b` (lon/lat radians).
#[must_use]
pub fn interpolate(a: DVec2, b: DVec2, t: f64) -> DVec2 {
    let from = geodetic_up(a.x, a.y);
    let to = geodetic_up(b.x, b.y);
    let dot = from.dot(to).clamp(-1.0, 1.0);
    let theta = dot.acos();

    let direction = if theta.abs() < 1e-12 {
        from.lerp(to, t).normalize()
    } else if theta > PI - 1e-9 {
        // Antipodal: any great circle works, rotate through the pole-facing axis.
        let perp = if from.x.abs() < 0.9 {
            DVec3::X.cross(from).normalize()
        } else {
            DVec3::Y.cross(from).normalize()
        };
        let angle = t * PI;
        (from * angle.cos() + perp * angle.sin()).normalize()
    } else {
        let sin_theta = theta.sin();
        let wa = ((1.0 - t) * theta).sin() / sin_theta;
        let wb = (t * theta).sin() / sin_theta;
        (from * wa + to * wb).normalize()
    };

    DVec2::new(direction.y.atan2(direction.x), direction.z.clamp(-1.0, 1.0).asin())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn test_equator_prime_meridian() {
        let p = llh_to_cartesian(0.0, 0.0, 0.0);
        assert_close(p.x, WGS84_SEMI_MAJOR_AXIS, 1e-6);
        assert_close(p.y, 0.0, 1e-6);
        assert_close(p.z, 0.0, 1e-6);
    }

    #[test]
    fn test_north_pole_is_semi_minor() {
        let p = llh_to_cartesian(0.3, FRAC_PI_2, 0.0);
        assert_close(p.z, Ellipsoid::WGS84.semi_minor_axis(), 1e-6);
        assert_close(p.truncate().length(), 0.0, 1e-6);
    }

    #[test]
    fn test_round_trip() {
        let lon = -1.2;
        let lat = 0.7;
        let p = llh_to_cartesian(lon, lat, 1234.5);
        let llh = cartesian_to_llh(p);
        assert_close(llh.x, lon, 1e-9);
        assert_close(llh.y, lat, 1e-9);
        assert_close(llh.z, 1234.5, 1e-4);
    }

    #[test]
    fn test_reflection_reaches_same_point() {
        let lon = 0.4;
        let lat = FRAC_PI_2 + 0.05;
        let reflected = reflect_over_pole(lon, lat);
        assert_close(reflected.y, FRAC_PI_2 - 0.05, 1e-12);
        assert_close(reflected.x, lon + PI, 1e-12);

        // The unreflected formula continues smoothly over the pole, so both
        // forms describe the same cartesian point.
        let direct = llh_to_cartesian(lon, lat, 0.0);
        let via = llh_to_cartesian(reflected.x, reflected.y, 0.0);
        assert!(direct.distance(via) < 1e-6);

        let south = reflect_over_pole(lon, -FRAC_PI_2 - 0.05);
        assert_close(south.y, -FRAC_PI_2 + 0.05, 1e-12);

        let inside = reflect_over_pole(lon, 0.2);
        assert_eq!(inside, DVec2::new(lon, 0.2));
    }

    #[test]
    fn test_wrap_longitude() {
        assert_close(wrap_longitude(PI + 0.1), -PI + 0.1, 1e-12);
        assert_close(wrap_longitude(-PI - 0.1), PI - 0.1, 1e-12);
        assert_close(wrap_longitude(0.5), 0.5, 1e-12);
    }

    #[test]
    fn test_great_circle_quarter() {
        let d = great_circle_distance(DVec2::ZERO, DVec2::new(FRAC_PI_2, 0.0), 1.0);
        assert_close(d, FRAC_PI_2, 1e-12);
    }

    #[test]
    fn test_interpolate_midpoint_on_equator() {
        let mid = interpolate(DVec2::ZERO, DVec2::new(1.0, 0.0), 0.5);
        assert_close(mid.x, 0.5, 1e-12);
        assert_close(mid.y, 0.0, 1e-12);

        let start = interpolate(DVec2::new(0.2, 0.3), DVec2::new(0.4, -0.1), 0.0);
        assert_close(start.x, 0.2, 1e-12);
        assert_close(start.y, 0.3, 1e-12);
    }
}
