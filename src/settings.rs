// Runtime settings in /settings.txt
// Text key=value lines, # comments, unknown keys ignored for forward
// compat. Values are clamped on load. Floats are written in the
// shortest form that parses back to the same bits, so calibration
// survives a save/load cycle unchanged.

use alloc::string::String;
use core::fmt::Write as _;

use log::{info, warn};

use crate::drivers::storage::{Storage, read_to_vec};
use crate::error::Result;
use crate::power::PowerConfig;
use crate::state::CalibrationOffsets;

pub const SETTINGS_FILE: &str = "/settings.txt";
const MAX_BYTES: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub calib: CalibrationOffsets,
    pub zoom_auto: bool,
    pub zoom_override_secs: u32,
    pub night: bool,
    pub brightness_pct: u8,
    pub idle_secs: u32,
    pub sleep_secs: u32,
    pub min_hdop: f32,
    pub pause_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self::defaults()
    }
}

// non-empty key=value pairs, comments and junk skipped
pub fn kv_lines(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (k, v) = line.split_once('=')?;
        Some((k.trim(), v.trim()))
    })
}

fn parse_bool(v: &str) -> Option<bool> {
    match v {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    }
}

fn finite(v: &str) -> Option<f32> {
    v.parse::<f32>().ok().filter(|f| f.is_finite())
}

impl Settings {
    pub const fn defaults() -> Self {
        Self {
            calib: CalibrationOffsets::identity(),
            zoom_auto: true,
            zoom_override_secs: 10,
            night: false,
            brightness_pct: 100,
            idle_secs: 180,
            sleep_secs: 600,
            min_hdop: 5.0,
            pause_secs: 180,
        }
    }

    fn sanitize(&mut self) {
        self.zoom_override_secs = self.zoom_override_secs.clamp(1, 600);
        self.brightness_pct = self.brightness_pct.clamp(5, 100);
        self.idle_secs = self.idle_secs.clamp(10, 3_600);
        self.sleep_secs = self.sleep_secs.clamp(60, 86_400);
        self.min_hdop = self.min_hdop.clamp(0.5, 50.0);
        self.pause_secs = self.pause_secs.clamp(10, 3_600);
        let c = &mut self.calib;
        c.declination_deg = c.declination_deg.clamp(-90.0, 90.0);
        for s in c.scale.iter_mut() {
            if *s <= 0.0 {
                *s = 1.0;
            }
        }
    }

    fn apply(&mut self, key: &str, val: &str) {
        let c = &mut self.calib;
        match key {
            "calib.offsets.mx" => c.offset[0] = finite(val).unwrap_or(c.offset[0]),
            "calib.offsets.my" => c.offset[1] = finite(val).unwrap_or(c.offset[1]),
            "calib.offsets.mz" => c.offset[2] = finite(val).unwrap_or(c.offset[2]),
            "calib.scale.x" => c.scale[0] = finite(val).unwrap_or(c.scale[0]),
            "calib.scale.y" => c.scale[1] = finite(val).unwrap_or(c.scale[1]),
            "calib.scale.z" => c.scale[2] = finite(val).unwrap_or(c.scale[2]),
            "calib.declination" => c.declination_deg = finite(val).unwrap_or(c.declination_deg),
            "calib.valid" => c.valid = parse_bool(val).unwrap_or(c.valid),
            "calib.captured" => c.captured_ms = val.parse().unwrap_or(c.captured_ms),
            "zoom.auto" => self.zoom_auto = parse_bool(val).unwrap_or(self.zoom_auto),
            "zoom.override_secs" => {
                self.zoom_override_secs = val.parse().unwrap_or(self.zoom_override_secs)
            }
            "display.dayNight" => match val {
                "day" => self.night = false,
                "night" => self.night = true,
                _ => {}
            },
            "display.brightness" => self.brightness_pct = val.parse().unwrap_or(self.brightness_pct),
            "power.idle_secs" => self.idle_secs = val.parse().unwrap_or(self.idle_secs),
            "power.sleep_secs" => self.sleep_secs = val.parse().unwrap_or(self.sleep_secs),
            "tracker.min_hdop" => self.min_hdop = finite(val).unwrap_or(self.min_hdop),
            "tracker.no_motion_pause_secs" => self.pause_secs = val.parse().unwrap_or(self.pause_secs),
            _ => {}
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut s = Self::defaults();
        for (k, v) in kv_lines(text) {
            s.apply(k, v);
        }
        s.sanitize();
        s
    }

    pub fn to_text(&self) -> String {
        let c = &self.calib;
        let mut t = String::with_capacity(512);
        let _ = writeln!(t, "# ridenav settings");
        let _ = writeln!(t, "# lines starting with # are ignored\n");
        let _ = writeln!(t, "calib.offsets.mx={}", c.offset[0]);
        let _ = writeln!(t, "calib.offsets.my={}", c.offset[1]);
        let _ = writeln!(t, "calib.offsets.mz={}", c.offset[2]);
        let _ = writeln!(t, "calib.scale.x={}", c.scale[0]);
        let _ = writeln!(t, "calib.scale.y={}", c.scale[1]);
        let _ = writeln!(t, "calib.scale.z={}", c.scale[2]);
        let _ = writeln!(t, "calib.declination={}", c.declination_deg);
        let _ = writeln!(t, "calib.valid={}", c.valid as u8);
        let _ = writeln!(t, "calib.captured={}", c.captured_ms);
        let _ = writeln!(t, "zoom.auto={}", self.zoom_auto as u8);
        let _ = writeln!(t, "zoom.override_secs={}", self.zoom_override_secs);
        let _ = writeln!(t, "display.dayNight={}", if self.night { "night" } else { "day" });
        let _ = writeln!(t, "display.brightness={}", self.brightness_pct);
        let _ = writeln!(t, "power.idle_secs={}", self.idle_secs);
        let _ = writeln!(t, "power.sleep_secs={}", self.sleep_secs);
        let _ = writeln!(t, "tracker.min_hdop={}", self.min_hdop);
        let _ = writeln!(t, "tracker.no_motion_pause_secs={}", self.pause_secs);
        t
    }

    // missing or unreadable file means defaults
    pub fn load<S: Storage>(storage: &mut S) -> Self {
        match read_to_vec(storage, SETTINGS_FILE, MAX_BYTES) {
            Ok(bytes) => {
                let s = Self::parse(core::str::from_utf8(&bytes).unwrap_or(""));
                info!(
                    "settings: loaded (calibration {})",
                    if s.calib.valid { "valid" } else { "missing" }
                );
                s
            }
            Err(e) => {
                warn!("settings: {}, using defaults", e);
                Self::defaults()
            }
        }
    }

    pub fn save<S: Storage>(&self, storage: &mut S) -> Result<()> {
        storage.write(SETTINGS_FILE, self.to_text().as_bytes())?;
        info!("settings: saved");
        Ok(())
    }

    pub fn power_config(&self) -> PowerConfig {
        PowerConfig {
            idle_secs: self.idle_secs,
            sleep_secs: self.sleep_secs,
            brightness_pct: self.brightness_pct,
        }
    }
}
