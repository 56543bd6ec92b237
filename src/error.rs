// Crate-wide error taxonomy and the retry schedule shared by sensors
//
// Transient sensor faults are retried with a doubling backoff
// (1, 2, 4, 8 s, capped). Five consecutive failures mark the component
// degraded; it keeps retrying and clears on the next success.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Io,
    NoMedia,
    MediaFull,
    NotFound,
    Parse,
    SensorTimeout,
    CalibrationFailed,
    InsufficientMotion,
    GpsUnhealthy,
    BatteryCritical,
    ButtonOverflow,
    CacheExhausted,
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

impl Error {
    // storage faults that end a recording session
    pub const fn is_media_fault(self) -> bool {
        matches!(self, Error::MediaFull | Error::NoMedia | Error::Io)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Error::Io => "io-error",
            Error::NoMedia => "no-media",
            Error::MediaFull => "media-full",
            Error::NotFound => "not-found",
            Error::Parse => "parse-error",
            Error::SensorTimeout => "sensor-timeout",
            Error::CalibrationFailed => "calibration-failed",
            Error::InsufficientMotion => "insufficient-motion",
            Error::GpsUnhealthy => "gps-unhealthy",
            Error::BatteryCritical => "battery-critical",
            Error::ButtonOverflow => "button-overflow",
            Error::CacheExhausted => "cache-exhausted",
        };
        f.write_str(s)
    }
}

const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 8_000;
pub const DEGRADED_AFTER: u8 = 5;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    failures: u8,
    retry_at_ms: u64,
}

impl Backoff {
    pub const fn new() -> Self {
        Self {
            failures: 0,
            retry_at_ms: 0,
        }
    }

    // true when the component may attempt the operation again
    #[inline]
    pub fn ready(&self, now_ms: u64) -> bool {
        self.failures == 0 || now_ms >= self.retry_at_ms
    }

    // record a failure; returns true when this failure crossed into degraded
    pub fn on_failure(&mut self, now_ms: u64) -> bool {
        self.failures = self.failures.saturating_add(1);
        self.retry_at_ms = now_ms + self.delay_ms();
        self.failures == DEGRADED_AFTER
    }

    // record a success; returns true if the component was degraded before
    pub fn on_success(&mut self) -> bool {
        let was_degraded = self.degraded();
        self.failures = 0;
        self.retry_at_ms = 0;
        was_degraded
    }

    pub fn delay_ms(&self) -> u64 {
        if self.failures == 0 {
            return 0;
        }
        let shift = (self.failures - 1).min(3) as u32;
        (BACKOFF_BASE_MS << shift).min(BACKOFF_CAP_MS)
    }

    #[inline]
    pub fn degraded(&self) -> bool {
        self.failures >= DEGRADED_AFTER
    }

    #[inline]
    pub fn failures(&self) -> u8 {
        self.failures
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut b = Backoff::new();
        let mut delays = [0u64; 6];
        for d in delays.iter_mut() {
            b.on_failure(0);
            *d = b.delay_ms();
        }
        assert_eq!(delays, [1_000, 2_000, 4_000, 8_000, 8_000, 8_000]);
    }

    #[test]
    fn test_backoff_degraded_after_five() {
        let mut b = Backoff::new();
        for i in 0..4 {
            assert!(!b.on_failure(i * 10_000), "not degraded before five failures");
        }
        assert!(b.on_failure(50_000), "fifth failure crosses into degraded");
        assert!(b.degraded());
        assert!(!b.on_failure(60_000), "crossing is reported once");
        assert!(b.on_success(), "success reports recovery from degraded");
        assert!(!b.degraded());
    }

    #[test]
    fn test_backoff_ready_respects_delay() {
        let mut b = Backoff::new();
        assert!(b.ready(0));
        b.on_failure(1_000);
        assert!(!b.ready(1_500));
        assert!(b.ready(2_000));
    }

    #[test]
    fn test_error_display_names() {
        assert_eq!(alloc::format!("{}", Error::MediaFull), "media-full");
        assert_eq!(alloc::format!("{}", Error::InsufficientMotion), "insufficient-motion");
    }
}
