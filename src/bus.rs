// Shared state bus
//
// One guarded slot per snapshot type. Producers publish a whole value
// (the swap happens inside a critical section), consumers read a copy
// and never hold the guard across anything else. take_fresh clears the
// fresh flag so a per-fix consumer sees each fix exactly once.
//
// The NMEA pipe is the only byte stream: the UART pump (ISR or second
// worker) writes into it, the GPS manager drains it on the foreground.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;

use crate::state::{
    BatteryReading, CalibrationStatus, CompassSample, GpsFix, Health, ImuSample, MotionState,
    NavState, PowerStatus, TrackingStatus, UiState, ZoomState,
};

pub const NMEA_PIPE_BYTES: usize = 1024;

#[derive(Clone, Copy)]
struct Entry<T: Copy> {
    value: Option<T>,
    fresh: bool,
    seq: u32,
}

pub struct Slot<T: Copy> {
    inner: Mutex<CriticalSectionRawMutex, Cell<Entry<T>>>,
}

impl<T: Copy> Slot<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(Entry {
                value: None,
                fresh: false,
                seq: 0,
            })),
        }
    }

    pub fn publish(&self, value: T) {
        self.inner.lock(|cell| {
            let e = cell.get();
            cell.set(Entry {
                value: Some(value),
                fresh: true,
                seq: e.seq.wrapping_add(1),
            });
        });
    }

    // copy of the latest value; leaves the fresh flag alone
    pub fn peek(&self) -> Option<T> {
        self.inner.lock(|cell| cell.get().value)
    }

    // latest value only if unread since the last publish
    pub fn take_fresh(&self) -> Option<T> {
        self.inner.lock(|cell| {
            let mut e = cell.get();
            if !e.fresh {
                return None;
            }
            e.fresh = false;
            cell.set(e);
            e.value
        })
    }

    // read-modify-write under the guard; publishes the result
    pub fn update(&self, default: T, f: impl FnOnce(&mut T)) -> T {
        self.inner.lock(|cell| {
            let e = cell.get();
            let mut v = e.value.unwrap_or(default);
            f(&mut v);
            cell.set(Entry {
                value: Some(v),
                fresh: true,
                seq: e.seq.wrapping_add(1),
            });
            v
        })
    }

    pub fn is_fresh(&self) -> bool {
        self.inner.lock(|cell| cell.get().fresh)
    }

    pub fn seq(&self) -> u32 {
        self.inner.lock(|cell| cell.get().seq)
    }
}

impl<T: Copy> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StateBus {
    pub gps: Slot<GpsFix>,
    pub imu: Slot<ImuSample>,
    pub compass: Slot<CompassSample>,
    pub motion: Slot<MotionState>,
    pub calibration: Slot<CalibrationStatus>,
    pub nav: Slot<NavState>,
    pub tracking: Slot<TrackingStatus>,
    pub power: Slot<PowerStatus>,
    pub battery: Slot<BatteryReading>,
    pub zoom: Slot<ZoomState>,
    pub ui: Slot<UiState>,
    pub health: Slot<Health>,
    pub nmea: Pipe<CriticalSectionRawMutex, NMEA_PIPE_BYTES>,
}

impl StateBus {
    pub const fn new() -> Self {
        Self {
            gps: Slot::new(),
            imu: Slot::new(),
            compass: Slot::new(),
            motion: Slot::new(),
            calibration: Slot::new(),
            nav: Slot::new(),
            tracking: Slot::new(),
            power: Slot::new(),
            battery: Slot::new(),
            zoom: Slot::new(),
            ui: Slot::new(),
            health: Slot::new(),
            nmea: Pipe::new(),
        }
    }

    pub fn health(&self) -> Health {
        self.health.peek().unwrap_or_default()
    }

    pub fn set_health(&self, f: impl FnOnce(&mut Health)) -> Health {
        self.health.update(Health::default(), f)
    }

    // byte pump side; returns how many bytes fit, the rest is dropped
    pub fn push_nmea(&self, bytes: &[u8]) -> usize {
        self.nmea.try_write(bytes).unwrap_or(0)
    }
}

impl Default for StateBus {
    fn default() -> Self {
        Self::new()
    }
}
