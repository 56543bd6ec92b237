// Web Mercator ("slippy map") projection
//
// World pixel space at zoom z is 256 * 2^z pixels square, origin at
// the top-left (180 W, ~85.05 N). Zoom may be fractional.

use core::f64::consts::PI;
use core::fmt;

use libm::{atan, exp, floor, log, pow, sinh, tan};

pub const TILE_SIZE: f64 = 256.0;
pub const MAX_LAT: f64 = 85.051_128_78;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub const fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    // tiles per axis at this zoom
    #[inline]
    pub fn span(z: u8) -> u32 {
        1u32 << z.min(31)
    }

    // Chebyshev distance in tiles; other zooms sort after the same zoom
    pub fn distance(&self, other: &TileKey) -> u32 {
        let dz = (self.z as i32 - other.z as i32).unsigned_abs();
        let dx = (self.x as i64 - other.x as i64).unsigned_abs() as u32;
        let dy = (self.y as i64 - other.y as i64).unsigned_abs() as u32;
        dz * 1_000 + dx.max(dy)
    }
}

// "/tiles/{z}/{x}/{y}.png"
impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/tiles/{}/{}/{}.png", self.z, self.x, self.y)
    }
}

#[inline]
pub fn world_size(z: f64) -> f64 {
    TILE_SIZE * pow(2.0, z)
}

// lat/lon to world pixels at zoom z
pub fn to_pixel(lat: f64, lon: f64, z: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LAT, MAX_LAT);
    let size = world_size(z);
    let x = (lon + 180.0) / 360.0 * size;
    let y = (1.0 - log(tan(PI / 4.0 + lat * PI / 360.0)) / PI) / 2.0 * size;
    (x, y)
}

pub fn to_lat_lon(x: f64, y: f64, z: f64) -> (f64, f64) {
    let size = world_size(z);
    let lon = x / size * 360.0 - 180.0;
    let n = PI * (1.0 - 2.0 * y / size);
    let lat = atan(sinh(n)).to_degrees();
    (lat, lon)
}

pub fn tile_at(px: f64, py: f64, z: u8) -> TileKey {
    let max = TileKey::span(z) as f64 - 1.0;
    TileKey {
        z,
        x: floor(px / TILE_SIZE).clamp(0.0, max) as u32,
        y: floor(py / TILE_SIZE).clamp(0.0, max) as u32,
    }
}

// metres per pixel at a latitude, for scale bars and trail spacing
pub fn metres_per_pixel(lat: f64, z: f64) -> f64 {
    let circumference = 2.0 * PI * crate::nav::geo::EARTH_RADIUS_M;
    circumference * libm::cos(lat.to_radians()) / world_size(z)
}

// 2^x for zoom deltas without pulling pow into hot loops
#[inline]
pub fn zoom_scale(dz: f64) -> f64 {
    exp(dz * core::f64::consts::LN_2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_and_center() {
        let (x, y) = to_pixel(0.0, 0.0, 0.0);
        assert!((x - 128.0).abs() < 1e-9 && (y - 128.0).abs() < 1e-9);
        let (x, y) = to_pixel(MAX_LAT, -180.0, 1.0);
        assert!(x.abs() < 1e-9 && y.abs() < 1e-6, "top-left corner, got {} {}", x, y);
    }

    #[test]
    fn test_known_tile() {
        // Zurich main station at z=16
        let (px, py) = to_pixel(47.3779, 8.5403, 16.0);
        let t = tile_at(px, py, 16);
        assert_eq!((t.x, t.y), (34322, 22949));
        assert_eq!(alloc::format!("{}", t), "/tiles/16/34322/22949.png");
    }

    #[test]
    fn test_inverse() {
        let (px, py) = to_pixel(-33.8568, 151.2153, 14.5);
        let (lat, lon) = to_lat_lon(px, py, 14.5);
        assert!((lat + 33.8568).abs() < 1e-9 && (lon - 151.2153).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_scale_and_distance() {
        assert!((zoom_scale(1.0) - 2.0).abs() < 1e-12);
        assert!((zoom_scale(-0.5) - core::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        let a = TileKey::new(16, 10, 10);
        assert_eq!(a.distance(&TileKey::new(16, 12, 9)), 2);
        assert!(a.distance(&TileKey::new(15, 10, 10)) > a.distance(&TileKey::new(16, 20, 20)));
        assert!((metres_per_pixel(0.0, 0.0) - 156_367.87).abs() < 0.1);
    }
}
