// Power state machine
//
//   active      input, motion onset or recording start
//   dim         recording, 60 s without input (backlight 30 %)
//   idle        not recording, idle_secs without input (panel off,
//               GPS 1 Hz, compass 5 Hz)
//   light-sleep sleep_secs in idle (GPS standby, compass off); only
//               motion or recording start wakes it
//   deep-sleep  battery critical for 10 s, or the user asked; terminal
//
// The manager only decides; the system applies the plan to the GPS,
// the compass and the backlight.

use log::info;

use crate::state::{BatteryLevel, BatteryReading, GpsMode, PowerPlan, PowerState, PowerStatus};

pub const DIM_AFTER_MS: u64 = 60_000;
pub const DIM_BACKLIGHT_PCT: u8 = 30;
pub const CRITICAL_GRACE_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerConfig {
    pub idle_secs: u32,
    pub sleep_secs: u32,
    pub brightness_pct: u8,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            idle_secs: 180,
            sleep_secs: 600,
            brightness_pct: 100,
        }
    }
}

pub fn plan_for(state: PowerState, brightness_pct: u8) -> PowerPlan {
    match state {
        PowerState::Active => PowerPlan {
            backlight_pct: brightness_pct,
            gps: GpsMode::Rate(10),
            compass_hz: 20,
        },
        PowerState::Dim => PowerPlan {
            backlight_pct: DIM_BACKLIGHT_PCT.min(brightness_pct),
            gps: GpsMode::Rate(10),
            compass_hz: 20,
        },
        PowerState::Idle => PowerPlan {
            backlight_pct: 0,
            gps: GpsMode::Rate(1),
            compass_hz: 5,
        },
        PowerState::LightSleep | PowerState::DeepSleep => PowerPlan {
            backlight_pct: 0,
            gps: GpsMode::Standby,
            compass_hz: 0,
        },
    }
}

pub struct PowerManager {
    cfg: PowerConfig,
    state: PowerState,
    last_input_ms: u64,
    idle_since_ms: u64,
    critical_since_ms: Option<u64>,
    was_recording: bool,
    deep_sleep_requested: bool,
}

impl PowerManager {
    pub fn new(cfg: PowerConfig, now_ms: u64) -> Self {
        Self {
            cfg,
            state: PowerState::Active,
            last_input_ms: now_ms,
            idle_since_ms: now_ms,
            critical_since_ms: None,
            was_recording: false,
            deep_sleep_requested: false,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn config(&self) -> PowerConfig {
        self.cfg
    }

    pub fn set_config(&mut self, cfg: PowerConfig) {
        self.cfg = cfg;
    }

    // a button event; wakes dim and idle. Light sleep answers only the
    // motion interrupt, deep sleep only a reset.
    pub fn note_input(&mut self, now_ms: u64) {
        if self.state == PowerState::LightSleep {
            return;
        }
        self.last_input_ms = now_ms;
        self.wake(now_ms, "input");
    }

    // accelerometer motion onset (or its wake interrupt)
    pub fn note_motion(&mut self, now_ms: u64) {
        self.last_input_ms = now_ms;
        self.wake(now_ms, "motion");
    }

    pub fn request_deep_sleep(&mut self) {
        self.deep_sleep_requested = true;
    }

    fn wake(&mut self, now_ms: u64, why: &str) {
        if matches!(self.state, PowerState::Active | PowerState::DeepSleep) {
            return;
        }
        info!("power: {} -> active ({})", self.state, why);
        self.state = PowerState::Active;
        self.idle_since_ms = now_ms;
    }

    fn enter(&mut self, next: PowerState, now_ms: u64) {
        if next == self.state {
            return;
        }
        info!("power: {} -> {}", self.state, next);
        if next == PowerState::Idle {
            self.idle_since_ms = now_ms;
        }
        self.state = next;
    }

    pub fn evaluate(&mut self, recording: bool, battery: Option<&BatteryReading>, now_ms: u64) -> PowerStatus {
        if recording && !self.was_recording {
            self.last_input_ms = now_ms;
            self.wake(now_ms, "recording");
        }
        self.was_recording = recording;

        let critical = battery.is_some_and(|b| b.level == BatteryLevel::Critical);
        match (critical, self.critical_since_ms) {
            (true, None) => {
                log::warn!("power: battery critical, deep sleep in {} s", CRITICAL_GRACE_MS / 1000);
                self.critical_since_ms = Some(now_ms);
            }
            (false, Some(_)) => {
                info!("power: battery recovered");
                self.critical_since_ms = None;
            }
            _ => {}
        }

        let shutdown_due = self
            .critical_since_ms
            .is_some_and(|t| now_ms.saturating_sub(t) >= CRITICAL_GRACE_MS);

        if self.state != PowerState::DeepSleep {
            if self.deep_sleep_requested || shutdown_due {
                self.enter(PowerState::DeepSleep, now_ms);
            } else {
                let quiet = now_ms.saturating_sub(self.last_input_ms);
                let next = if recording {
                    if quiet >= DIM_AFTER_MS {
                        PowerState::Dim
                    } else {
                        PowerState::Active
                    }
                } else if quiet < self.cfg.idle_secs as u64 * 1000 {
                    PowerState::Active
                } else {
                    match self.state {
                        PowerState::Idle | PowerState::LightSleep
                            if now_ms.saturating_sub(self.idle_since_ms)
                                >= self.cfg.sleep_secs as u64 * 1000 =>
                        {
                            PowerState::LightSleep
                        }
                        _ => PowerState::Idle,
                    }
                };
                self.enter(next, now_ms);
            }
        }

        self.status(now_ms)
    }

    pub fn status(&self, now_ms: u64) -> PowerStatus {
        let shutdown_in_s = match (self.state, self.critical_since_ms) {
            (PowerState::DeepSleep, _) | (_, None) => None,
            (_, Some(t)) => {
                let left = CRITICAL_GRACE_MS.saturating_sub(now_ms.saturating_sub(t));
                Some(left.div_ceil(1000) as u8)
            }
        };
        PowerStatus {
            state: self.state,
            plan: plan_for(self.state, self.cfg.brightness_pct),
            shutdown_in_s,
        }
    }
}
