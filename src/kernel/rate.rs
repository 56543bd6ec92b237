// Rate dividers over the 10 ms base tick
//
// Every stage of the foreground loop runs on a divider of the base
// tick. Compass and GPS rates follow the power plan, so their
// dividers change at runtime; the others are fixed.

use core::fmt;

/// Base timer tick interval (ms)
pub const BASE_TICK_MS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Buttons,
    GpsDrain,
    Compass,
    Battery,
    Power,
    Tracker,
    Zoom,
    Render,
}

impl Stage {
    pub const fn default_hz(self) -> u16 {
        match self {
            Stage::Buttons => 100,
            Stage::GpsDrain | Stage::Tracker | Stage::Zoom => 50,
            Stage::Render => 25,
            Stage::Compass => 20,
            Stage::Power => 10,
            Stage::Battery => 1,
        }
    }
}

// Hz -> base ticks between runs; 0 Hz never fires
pub const fn divisor_for(hz: u16) -> u32 {
    if hz == 0 {
        0
    } else {
        let d = 1000 / (BASE_TICK_MS * hz as u32);
        if d == 0 { 1 } else { d }
    }
}

pub struct Divider {
    divisor: u32,
    count: u32,
}

impl Divider {
    pub const fn new(hz: u16) -> Self {
        Self {
            divisor: divisor_for(hz),
            count: 0,
        }
    }

    // true on the base tick this stage should run
    pub fn tick(&mut self) -> bool {
        if self.divisor == 0 {
            return false;
        }
        self.count += 1;
        if self.count >= self.divisor {
            self.count = 0;
            true
        } else {
            false
        }
    }

    pub fn set_hz(&mut self, hz: u16) {
        let d = divisor_for(hz);
        if d != self.divisor {
            self.divisor = d;
            self.count = 0;
        }
    }

    // run on the next tick regardless of phase
    pub fn fire_next(&mut self) {
        if self.divisor > 0 {
            self.count = self.divisor - 1;
        }
    }

    pub fn hz(&self) -> u16 {
        if self.divisor == 0 {
            0
        } else {
            (1000 / (self.divisor * BASE_TICK_MS)) as u16
        }
    }

    pub fn interval_ms(&self) -> u32 {
        self.divisor * BASE_TICK_MS
    }
}

impl fmt::Display for Divider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.divisor {
            0 => write!(f, "off"),
            _ => write!(f, "{}Hz({}ms)", self.hz(), self.interval_ms()),
        }
    }
}

pub struct Rates {
    pub buttons: Divider,
    pub gps: Divider,
    pub compass: Divider,
    pub battery: Divider,
    pub power: Divider,
    pub tracker: Divider,
    pub zoom: Divider,
    pub render: Divider,
}

impl Rates {
    pub const fn new() -> Self {
        Self {
            buttons: Divider::new(Stage::Buttons.default_hz()),
            gps: Divider::new(Stage::GpsDrain.default_hz()),
            compass: Divider::new(Stage::Compass.default_hz()),
            battery: Divider::new(Stage::Battery.default_hz()),
            power: Divider::new(Stage::Power.default_hz()),
            tracker: Divider::new(Stage::Tracker.default_hz()),
            zoom: Divider::new(Stage::Zoom.default_hz()),
            render: Divider::new(Stage::Render.default_hz()),
        }
    }
}

impl Default for Rates {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divisors() {
        assert_eq!(divisor_for(100), 1);
        assert_eq!(divisor_for(50), 2);
        assert_eq!(divisor_for(20), 5);
        assert_eq!(divisor_for(1), 100);
        assert_eq!(divisor_for(0), 0);
    }

    #[test]
    fn test_divider_fires_every_n() {
        let mut d = Divider::new(20);
        let fired: usize = (0..100).filter(|_| d.tick()).count();
        assert_eq!(fired, 20, "20 Hz over one second of base ticks");
    }

    #[test]
    fn test_off_never_fires_and_rate_change() {
        let mut d = Divider::new(0);
        assert!((0..500).all(|_| !d.tick()));
        d.set_hz(5);
        assert_eq!(d.hz(), 5);
        d.fire_next();
        assert!(d.tick());
    }
}
