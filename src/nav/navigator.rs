// Waypoint guidance
//
// Evaluated on every fresh fix. Arrival needs two consecutive
// evaluations inside 25 m and below 3 m/s so a single jittery fix
// passing the waypoint at speed does not count.
//
// Waypoints persist as "lat,lon" lines in /waypoints.txt.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write as _;

use log::info;

use crate::drivers::storage::Storage;
use crate::error::{Error, Result};
use crate::nav::geo;
use crate::state::{GpsFix, NavState, Waypoint};

pub const WAYPOINTS_FILE: &str = "/waypoints.txt";
pub const MAX_WAYPOINTS: usize = 32;

const ARRIVAL_RADIUS_M: f64 = 25.0;
const ARRIVAL_SPEED_MPS: f32 = 3.0;
const ARRIVAL_CONFIRMATIONS: u8 = 2;

pub struct WaypointBook {
    points: Vec<Waypoint>,
    dirty: bool,
}

impl WaypointBook {
    pub const fn new() -> Self {
        Self {
            points: Vec::new(),
            dirty: false,
        }
    }

    pub fn load<S: Storage>(storage: &mut S) -> Self {
        let mut book = Self::new();
        let mut buf = [0u8; 1024];
        let n = match storage.read(WAYPOINTS_FILE, 0, &mut buf) {
            Ok(n) => n,
            Err(_) => return book,
        };
        for line in buf[..n].split(|&b| b == b'\n') {
            let Ok(line) = core::str::from_utf8(line) else {
                continue;
            };
            let mut parts = line.trim().split(',');
            let lat = parts.next().and_then(|s| s.trim().parse::<f64>().ok());
            let lon = parts.next().and_then(|s| s.trim().parse::<f64>().ok());
            if let (Some(lat), Some(lon)) = (lat, lon) {
                if lat.abs() <= 90.0 && lon.abs() <= 180.0 && book.points.len() < MAX_WAYPOINTS {
                    book.points.push(Waypoint { lat, lon });
                }
            }
        }
        info!("nav: {} waypoints loaded", book.points.len());
        book
    }

    pub fn add(&mut self, wp: Waypoint) -> usize {
        if self.points.len() >= MAX_WAYPOINTS {
            self.points.remove(0);
        }
        self.points.push(wp);
        self.dirty = true;
        self.points.len() - 1
    }

    pub fn get(&self, idx: usize) -> Option<Waypoint> {
        self.points.get(idx).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn save<S: Storage>(&mut self, storage: &mut S) -> Result<()> {
        let mut text = String::new();
        for wp in &self.points {
            let _ = writeln!(text, "{:.7},{:.7}", wp.lat, wp.lon);
        }
        storage.write(WAYPOINTS_FILE, text.as_bytes())?;
        self.dirty = false;
        Ok(())
    }
}

impl Default for WaypointBook {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Navigator {
    target: Option<usize>,
    waypoint: Option<Waypoint>,
    // where guidance toward the current target began
    origin: Option<(f64, f64)>,
    confirmations: u8,
    state: NavState,
}

impl Navigator {
    pub const fn new() -> Self {
        Self {
            target: None,
            waypoint: None,
            origin: None,
            confirmations: 0,
            state: NavState::EMPTY,
        }
    }

    pub fn set_target(&mut self, idx: Option<usize>, book: &WaypointBook) {
        self.target = idx;
        self.waypoint = idx.and_then(|i| book.get(i));
        self.origin = None;
        self.confirmations = 0;
        self.state = NavState {
            waypoint: self.waypoint,
            ..NavState::EMPTY
        };
        match self.waypoint {
            Some(wp) => info!("nav: target {:.5},{:.5}", wp.lat, wp.lon),
            None => info!("nav: target cleared"),
        }
    }

    // next waypoint in the book, wrapping through "no target"
    pub fn cycle_target(&mut self, book: &WaypointBook) {
        let next = match self.target {
            None if !book.is_empty() => Some(0),
            Some(i) if i + 1 < book.len() => Some(i + 1),
            _ => None,
        };
        self.set_target(next, book);
    }

    pub fn target(&self) -> Option<usize> {
        self.target
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn update(&mut self, fix: &GpsFix) -> Result<NavState> {
        let Some(wp) = self.waypoint else {
            return Ok(self.state);
        };
        let (lat, lon) = fix.position().ok_or(Error::GpsUnhealthy)?;
        let origin = *self.origin.get_or_insert((lat, lon));

        let distance = geo::distance_m(lat, lon, wp.lat, wp.lon);
        let bearing = geo::bearing_deg(lat, lon, wp.lat, wp.lon) as f32;
        let cross_track = if geo::distance_m(origin.0, origin.1, wp.lat, wp.lon) > 1.0 {
            geo::cross_track_m(origin, (wp.lat, wp.lon), (lat, lon)) as f32
        } else {
            0.0
        };
        let cmg = if geo::distance_m(origin.0, origin.1, lat, lon) > 1.0 {
            geo::bearing_deg(origin.0, origin.1, lat, lon) as f32
        } else {
            fix.course_deg
        };
        let vmg = fix.speed_mps * libm::cosf((fix.course_deg - bearing).to_radians());

        if distance < ARRIVAL_RADIUS_M && fix.speed_mps < ARRIVAL_SPEED_MPS {
            self.confirmations = self.confirmations.saturating_add(1);
        } else {
            self.confirmations = 0;
        }
        let arrived = self.confirmations >= ARRIVAL_CONFIRMATIONS;
        if arrived && !self.state.arrived {
            info!("nav: arrived at {:.5},{:.5}", wp.lat, wp.lon);
        }

        self.state = NavState {
            waypoint: Some(wp),
            distance_m: distance as f32,
            bearing_deg: bearing,
            cross_track_m: cross_track,
            course_made_good_deg: cmg,
            vmg_mps: vmg,
            arrived,
        };
        Ok(self.state)
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::storage::MemStorage;
    use crate::state::FixQuality;
    use chrono::NaiveDate;

    fn fix(lat: f64, lon: f64, speed: f32) -> GpsFix {
        GpsFix {
            lat,
            lon,
            alt_m: 0.0,
            speed_mps: speed,
            course_deg: 0.0,
            course_stale: false,
            hdop: 1.0,
            sats: 8,
            utc: NaiveDate::from_ymd_opt(2026, 5, 1)
                .and_then(|d| d.and_hms_opt(10, 0, 0))
                .unwrap(),
            quality: FixQuality::Fix3D,
            at_ms: 0,
        }
    }

    fn book_with_target() -> WaypointBook {
        let mut book = WaypointBook::new();
        book.add(Waypoint { lat: 47.0010, lon: 8.0 });
        book
    }

    #[test]
    fn test_bearing_and_distance_to_target() {
        let book = book_with_target();
        let mut nav = Navigator::new();
        nav.set_target(Some(0), &book);
        let s = nav.update(&fix(47.0, 8.0, 10.0)).unwrap();
        assert!((s.distance_m - 111.2).abs() < 1.0, "got {}", s.distance_m);
        assert!(s.bearing_deg < 0.5 || s.bearing_deg > 359.5, "due north");
        assert!((s.vmg_mps - 10.0).abs() < 0.1, "heading straight at it");
        assert!(!s.arrived);
    }

    #[test]
    fn test_arrival_needs_two_consecutive() {
        let book = book_with_target();
        let mut nav = Navigator::new();
        nav.set_target(Some(0), &book);
        let near = fix(47.00095, 8.0, 1.0);
        assert!(!nav.update(&near).unwrap().arrived, "one evaluation is not enough");
        assert!(nav.update(&near).unwrap().arrived, "second evaluation confirms");
    }

    #[test]
    fn test_arrival_reset_by_speed() {
        let book = book_with_target();
        let mut nav = Navigator::new();
        nav.set_target(Some(0), &book);
        nav.update(&fix(47.00095, 8.0, 1.0)).unwrap();
        assert!(!nav.update(&fix(47.00095, 8.0, 5.0)).unwrap().arrived, "too fast");
        assert!(!nav.update(&fix(47.00095, 8.0, 1.0)).unwrap().arrived, "count restarted");
    }

    #[test]
    fn test_cycle_target_wraps_through_none() {
        let mut book = book_with_target();
        book.add(Waypoint { lat: 46.0, lon: 7.0 });
        let mut nav = Navigator::new();
        nav.cycle_target(&book);
        assert_eq!(nav.target(), Some(0));
        nav.cycle_target(&book);
        assert_eq!(nav.target(), Some(1));
        nav.cycle_target(&book);
        assert_eq!(nav.target(), None);
    }

    #[test]
    fn test_waypoints_persist() {
        let mut storage = MemStorage::new();
        let mut book = book_with_target();
        book.save(&mut storage).unwrap();
        let loaded = WaypointBook::load(&mut storage);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(0), Some(Waypoint { lat: 47.0010, lon: 8.0 }));
    }
}
