// Great-circle helpers on a spherical earth (R = 6371 km)
//
// Angles in degrees at the API, radians inside. f64 for positions,
// f32 for headings and distances handed to the UI.

use libm::{asin, atan2, cos, sin, sqrt};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[inline]
fn rad(deg: f64) -> f64 {
    deg.to_radians()
}

// haversine distance in metres
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = rad(lat2 - lat1);
    let dlon = rad(lon2 - lon1);
    let a = sin(dlat / 2.0) * sin(dlat / 2.0)
        + cos(rad(lat1)) * cos(rad(lat2)) * sin(dlon / 2.0) * sin(dlon / 2.0);
    2.0 * EARTH_RADIUS_M * atan2(sqrt(a), sqrt(1.0 - a))
}

// initial bearing from point 1 to point 2, [0, 360)
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = rad(lat1);
    let phi2 = rad(lat2);
    let dlon = rad(lon2 - lon1);
    let y = sin(dlon) * cos(phi2);
    let x = cos(phi1) * sin(phi2) - sin(phi1) * cos(phi2) * cos(dlon);
    wrap_360_f64(atan2(y, x).to_degrees())
}

// signed distance of `p` from the great circle start -> end;
// positive when p lies right of the path
pub fn cross_track_m(start: (f64, f64), end: (f64, f64), p: (f64, f64)) -> f64 {
    let d13 = distance_m(start.0, start.1, p.0, p.1) / EARTH_RADIUS_M;
    let t13 = rad(bearing_deg(start.0, start.1, p.0, p.1));
    let t12 = rad(bearing_deg(start.0, start.1, end.0, end.1));
    asin(sin(d13) * sin(t13 - t12)) * EARTH_RADIUS_M
}

pub fn wrap_360_f64(deg: f64) -> f64 {
    let w = deg % 360.0;
    if w < 0.0 { w + 360.0 } else { w }
}

#[inline]
pub fn wrap_360(deg: f32) -> f32 {
    let w = deg % 360.0;
    let w = if w < 0.0 { w + 360.0 } else { w };
    // -1e-6 % 360 + 360 rounds to 360.0 in f32
    if w >= 360.0 { 0.0 } else { w }
}

#[inline]
pub fn wrap_180(deg: f32) -> f32 {
    let w = wrap_360(deg);
    if w > 180.0 { w - 360.0 } else { w }
}

// absolute angular difference, [0, 180]
#[inline]
pub fn angle_diff(a: f32, b: f32) -> f32 {
    libm::fabsf(wrap_180(a - b))
}
