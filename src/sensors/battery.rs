// Supply voltage monitor
//
// The rail reaches the ADC through a 220K/47K divider. Each sample is a
// burst of 16 conversions; the burst median feeds an EMA (alpha 0.1).
// Classification is hysteretic: leaving the current level needs the
// voltage to clear that band's edge by the hysteresis margin.

use log::{info, warn};

use crate::bus::StateBus;
use crate::drivers::hub::SensorHub;
use crate::error::Backoff;
use crate::state::{BatteryLevel, BatteryReading, PowerSource};

const R_TOP_K: f32 = 220.0;
const R_BOTTOM_K: f32 = 47.0;
pub const DIVIDER: f32 = (R_TOP_K + R_BOTTOM_K) / R_BOTTOM_K;

pub const BURST: usize = 16;
const EMA_ALPHA: f32 = 0.1;

struct Bands {
    // critical | low | ok | full edges
    edges: [f32; 3],
    hysteresis: f32,
}

const VEHICLE: Bands = Bands {
    edges: [11.8, 12.2, 13.0],
    hysteresis: 0.2,
};

const INTERNAL: Bands = Bands {
    edges: [3.4, 3.6, 4.0],
    hysteresis: 0.05,
};

fn bands(source: PowerSource) -> &'static Bands {
    match source {
        PowerSource::Vehicle => &VEHICLE,
        PowerSource::Internal => &INTERNAL,
    }
}

const LEVELS: [BatteryLevel; 4] = [
    BatteryLevel::Critical,
    BatteryLevel::Low,
    BatteryLevel::Ok,
    BatteryLevel::Full,
];

fn index(level: BatteryLevel) -> usize {
    match level {
        BatteryLevel::Critical => 0,
        BatteryLevel::Low => 1,
        BatteryLevel::Ok => 2,
        BatteryLevel::Full => 3,
    }
}

pub fn classify(volts: f32, source: PowerSource) -> BatteryLevel {
    let b = bands(source);
    let i = b.edges.iter().take_while(|&&e| volts >= e).count();
    LEVELS[i]
}

// hysteretic step from the current level
pub fn classify_from(current: BatteryLevel, volts: f32, source: PowerSource) -> BatteryLevel {
    let b = bands(source);
    let i = index(current);
    let lower = if i > 0 { Some(b.edges[i - 1]) } else { None };
    let upper = b.edges.get(i).copied();
    let leaves_down = lower.is_some_and(|e| volts < e - b.hysteresis);
    let leaves_up = upper.is_some_and(|e| volts >= e + b.hysteresis);
    if leaves_down || leaves_up {
        classify(volts, source)
    } else {
        current
    }
}

#[inline]
pub fn adc_to_volts(adc_mv: u16) -> f32 {
    adc_mv as f32 / 1000.0 * DIVIDER
}

fn median(samples: &mut [u16]) -> u16 {
    samples.sort_unstable();
    let n = samples.len();
    if n % 2 == 1 {
        samples[n / 2]
    } else {
        ((samples[n / 2 - 1] as u32 + samples[n / 2] as u32) / 2) as u16
    }
}

pub struct BatteryMonitor {
    ema: Option<f32>,
    reading: Option<BatteryReading>,
    backoff: Backoff,
}

impl BatteryMonitor {
    pub const fn new() -> Self {
        Self {
            ema: None,
            reading: None,
            backoff: Backoff::new(),
        }
    }

    pub fn reading(&self) -> Option<BatteryReading> {
        self.reading
    }

    pub fn poll<H: SensorHub>(&mut self, hub: &mut H, bus: &StateBus, now_ms: u64) {
        if !self.backoff.ready(now_ms) {
            return;
        }
        let mut burst = [0u16; BURST];
        let mut source = PowerSource::Vehicle;
        for slot in burst.iter_mut() {
            match hub.read_battery() {
                Ok(s) => {
                    *slot = s.adc_mv;
                    source = s.source;
                }
                Err(e) => {
                    if self.backoff.on_failure(now_ms) {
                        warn!("battery: degraded after {} failed reads ({})", self.backoff.failures(), e);
                        bus.set_health(|h| h.battery_degraded = true);
                    }
                    return;
                }
            }
        }
        if self.backoff.on_success() {
            info!("battery: sampling recovered");
            bus.set_health(|h| h.battery_degraded = false);
        }
        let reading = self.push(median(&mut burst), source);
        bus.battery.publish(reading);
    }

    // one burst median into the filter
    pub fn push(&mut self, adc_mv: u16, source: PowerSource) -> BatteryReading {
        let v = adc_to_volts(adc_mv);
        let volts = match self.ema {
            Some(prev) => prev + EMA_ALPHA * (v - prev),
            None => v,
        };
        self.ema = Some(volts);

        let level = match self.reading {
            Some(r) if r.source == source => classify_from(r.level, volts, source),
            _ => classify(volts, source),
        };
        if let Some(r) = self.reading {
            if r.level != level || r.source != source {
                info!("battery: {:.2} V {:?} -> {:?} ({:?})", volts, r.level, level, source);
            }
        }
        let reading = BatteryReading {
            volts,
            level,
            source,
        };
        self.reading = Some(reading);
        reading
    }
}

impl Default for BatteryMonitor {
    fn default() -> Self {
        Self::new()
    }
}
