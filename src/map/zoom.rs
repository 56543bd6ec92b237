// Speed-coupled zoom with manual override
//
// Auto mode follows a piecewise-linear speed curve (km/h -> zoom):
//   0 -> 18, 20 -> 17, 50 -> 15, 90 -> 13, 120 -> 12, flat beyond.
// A zoom button switches to manual for override_ms; after that the
// controller falls back to auto. Every target change eases the drawn
// zoom over 300 ms with 1 - (1 - t)^2.

use log::debug;

use crate::state::{ZoomMode, ZoomState};

pub const Z_MIN: u8 = 10;
pub const Z_MAX: u8 = 18;
pub const EASE_MS: u64 = 300;
pub const DEFAULT_OVERRIDE_MS: u64 = 10_000;

const CURVE: [(f32, f32); 5] = [(0.0, 18.0), (20.0, 17.0), (50.0, 15.0), (90.0, 13.0), (120.0, 12.0)];

pub fn auto_zoom(speed_kmh: f32) -> f32 {
    let v = speed_kmh.max(0.0);
    for pair in CURVE.windows(2) {
        let ((v0, z0), (v1, z1)) = (pair[0], pair[1]);
        if v <= v1 {
            return z0 + (z1 - z0) * (v - v0) / (v1 - v0);
        }
    }
    CURVE[CURVE.len() - 1].1
}

#[inline]
fn ease_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t) * (1.0 - t)
}

pub struct ZoomController {
    mode: ZoomMode,
    // false: zoom.auto=0, manual never expires
    auto_enabled: bool,
    override_ms: u64,
    override_until: u64,
    target: u8,
    from: f32,
    ease_start: u64,
    z: f32,
}

impl ZoomController {
    pub fn new(auto_enabled: bool, override_ms: u64) -> Self {
        let start = 16;
        Self {
            mode: if auto_enabled {
                ZoomMode::Auto
            } else {
                ZoomMode::Manual
            },
            auto_enabled,
            override_ms,
            override_until: 0,
            target: start,
            from: start as f32,
            ease_start: 0,
            z: start as f32,
        }
    }

    pub fn configure(&mut self, auto_enabled: bool, override_ms: u64) {
        self.auto_enabled = auto_enabled;
        self.override_ms = override_ms;
        if !auto_enabled {
            self.mode = ZoomMode::Manual;
        }
    }

    pub fn state(&self) -> ZoomState {
        ZoomState {
            mode: self.mode,
            z: self.z,
            target: self.target,
        }
    }

    pub fn mode(&self) -> ZoomMode {
        self.mode
    }

    pub fn zoom_in(&mut self, now_ms: u64) {
        self.step(1, now_ms);
    }

    pub fn zoom_out(&mut self, now_ms: u64) {
        self.step(-1, now_ms);
    }

    // back to the speed curve right away
    pub fn set_auto(&mut self) {
        if self.auto_enabled {
            self.mode = ZoomMode::Auto;
            self.override_until = 0;
        }
    }

    fn step(&mut self, delta: i8, now_ms: u64) {
        self.mode = ZoomMode::Manual;
        self.override_until = now_ms + self.override_ms;
        let next = (self.target as i8 + delta).clamp(Z_MIN as i8, Z_MAX as i8) as u8;
        self.retarget(next, now_ms);
    }

    fn retarget(&mut self, target: u8, now_ms: u64) {
        if target != self.target {
            debug!("zoom: {} -> {}", self.target, target);
            self.from = self.z;
            self.ease_start = now_ms;
            self.target = target;
        }
    }

    // returns true when the drawn zoom or the target changed
    pub fn update(&mut self, speed_mps: f32, now_ms: u64) -> bool {
        let before = (self.z, self.target, self.mode);

        if self.mode == ZoomMode::Manual && self.auto_enabled && now_ms > self.override_until {
            self.mode = ZoomMode::Auto;
        }
        if self.mode == ZoomMode::Auto {
            let want = libm::roundf(auto_zoom(speed_mps * 3.6)) as u8;
            self.retarget(want.clamp(Z_MIN, Z_MAX), now_ms);
        }

        let t = now_ms.saturating_sub(self.ease_start) as f32 / EASE_MS as f32;
        self.z = self.from + (self.target as f32 - self.from) * ease_out(t);
        self.z = self.z.clamp(Z_MIN as f32, Z_MAX as f32);

        before != (self.z, self.target, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_points_and_saturation() {
        assert_eq!(auto_zoom(0.0), 18.0);
        assert_eq!(auto_zoom(20.0), 17.0);
        assert_eq!(auto_zoom(35.0), 16.0);
        assert_eq!(auto_zoom(120.0), 12.0);
        assert_eq!(auto_zoom(250.0), 12.0);
        assert!((auto_zoom(40.0) - 15.666_667).abs() < 1e-4);
    }

    #[test]
    fn test_manual_override_expires() {
        let kmh40 = 40.0 / 3.6;
        let mut zc = ZoomController::new(true, DEFAULT_OVERRIDE_MS);
        zc.update(kmh40, 0);
        assert_eq!(zc.state().target, 16);

        zc.zoom_out(1_000);
        assert_eq!(zc.state().target, 15);
        for t in (1_020..=11_000).step_by(20) {
            zc.update(kmh40, t);
            assert_eq!(zc.state().target, 15, "held at t={}", t);
        }
        zc.update(kmh40, 11_020);
        assert_eq!(zc.mode(), ZoomMode::Auto);
        assert_eq!(zc.state().target, 16);
        zc.update(kmh40, 11_170);
        let mid = zc.state().z;
        assert!(mid > 15.5 && mid < 16.0, "halfway through the ease: {}", mid);
        zc.update(kmh40, 11_320);
        assert_eq!(zc.state().z, 16.0);
    }

    #[test]
    fn test_bounds_hold() {
        let mut zc = ZoomController::new(true, 10_000);
        for i in 0..20 {
            zc.zoom_in(i * 10);
            zc.update(0.0, i * 10);
        }
        assert_eq!(zc.state().target, Z_MAX);
        for i in 20..60 {
            zc.zoom_out(i * 10);
            zc.update(0.0, i * 10);
            assert!(zc.state().z >= Z_MIN as f32 && zc.state().z <= Z_MAX as f32);
        }
        assert_eq!(zc.state().target, Z_MIN);
    }

    #[test]
    fn test_auto_disabled_stays_manual() {
        let mut zc = ZoomController::new(false, 10_000);
        zc.zoom_in(0);
        zc.update(30.0, 60_000);
        assert_eq!(zc.mode(), ZoomMode::Manual);
        assert_eq!(zc.state().target, 17);
        zc.set_auto();
        assert_eq!(zc.mode(), ZoomMode::Manual);
    }
}
