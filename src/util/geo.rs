//! Great-circle helpers on latitude/longitude pairs.
//!
//! Bearings follow the aviation convention: 0° is true north, angles grow clockwise and are
//! always reported in `[0, 360)`.

use std::fmt::{Display, Formatter};

/// Mean earth radius used for haversine distances, in meters.
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_000.0;
/// Equatorial earth radius used for flat-earth displacement, in meters.
pub const EQUATORIAL_EARTH_RADIUS_M: f64 = 6_378_137.0;

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    /// Latitude in degrees, positive north.
    lat: f64,
    /// Longitude in degrees, positive east.
    lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self { Self { lat, lon } }
    pub fn lat(&self) -> f64 { self.lat }
    pub fn lon(&self) -> f64 { self.lon }

    /// Initial great-circle bearing from `self` towards `other`.
    pub fn bearing_to(&self, other: GeoPoint) -> f64 { bearing(*self, other) }

    /// Haversine distance from `self` to `other` in meters.
    pub fn distance_to(&self, other: GeoPoint) -> f64 { distance(*self, other) }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(value: GeoPoint) -> Self { [value.lat, value.lon] }
}

impl From<[f64; 2]> for GeoPoint {
    fn from(value: [f64; 2]) -> Self { Self::new(value[0], value[1]) }
}

impl Display for GeoPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// Computes the initial great-circle bearing between two points.
///
/// # Arguments
/// * `from` – Start of the great circle segment.
/// * `to` – End of the great circle segment.
///
/// # Returns
/// * `f64` – Bearing in degrees, normalized to `[0, 360)`. Identical points yield `0.0`.
pub fn bearing(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lon = (to.lon - from.lon).to_radians();
    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    wrap_360(y.atan2(x).to_degrees())
}

/// Haversine great-circle distance in meters.
pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * MEAN_EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Displaces `origin` by `meters` along `bearing_deg` using an equirectangular approximation.
///
/// Only valid for short hops (one simulation tick), which is the only place it is used.
/// The resulting longitude is wrapped into `(-180, 180]`, so hops across the antimeridian stay
/// valid coordinates.
pub fn offset(origin: GeoPoint, bearing_deg: f64, meters: f64) -> GeoPoint {
    let bearing_rad = bearing_deg.to_radians();
    let d_lat = meters * bearing_rad.cos() / EQUATORIAL_EARTH_RADIUS_M;
    let d_lon =
        meters * bearing_rad.sin() / (EQUATORIAL_EARTH_RADIUS_M * origin.lat.to_radians().cos());
    let raw_lon = origin.lon + d_lon.to_degrees();
    let lon = if (-180.0..=180.0).contains(&raw_lon) { raw_lon } else { wrap_180(raw_lon) };
    GeoPoint::new(origin.lat + d_lat.to_degrees(), lon)
}

/// Normalizes an angle to `[0, 360)`.
pub fn wrap_360(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Signed shortest angular difference, normalized to `(-180, 180]`.
pub fn wrap_180(deg: f64) -> f64 {
    let wrapped = wrap_360(deg);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}
