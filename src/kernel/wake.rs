// Interrupt-to-loop wake latches
//
// The IMU and expander interrupt lines only latch a flag here; the
// foreground loop folds the flags into the next tick. Each source has
// its own latch so a motion edge and a button edge arriving together
// are both seen.

use core::sync::atomic::{AtomicBool, Ordering};

static WAKE_BUTTON: AtomicBool = AtomicBool::new(false);
static WAKE_MOTION: AtomicBool = AtomicBool::new(false);
static WAKE_TIMER: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WakeFlags {
    pub button: bool,
    pub motion: bool,
    pub timer: bool,
}

impl WakeFlags {
    // wakes that count as rider or vehicle activity
    #[inline]
    pub fn is_activity(&self) -> bool {
        self.button || self.motion
    }
}

pub fn try_wake() -> Option<WakeFlags> {
    critical_section::with(|_| {
        let flags = WakeFlags {
            button: WAKE_BUTTON.swap(false, Ordering::Relaxed),
            motion: WAKE_MOTION.swap(false, Ordering::Relaxed),
            timer: WAKE_TIMER.swap(false, Ordering::Relaxed),
        };
        (flags != WakeFlags::default()).then_some(flags)
    })
}

#[inline]
pub fn signal_button() {
    WAKE_BUTTON.store(true, Ordering::Release);
}

#[inline]
pub fn signal_motion() {
    WAKE_MOTION.store(true, Ordering::Release);
}

#[inline]
pub fn signal_timer() {
    WAKE_TIMER.store(true, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    // the latches are process-wide statics; one test owns them
    #[test]
    fn test_latches_are_independent_and_consumed() {
        while try_wake().is_some() {}
        signal_button();
        signal_motion();
        let w = try_wake().expect("two sources latched");
        assert!(w.button && w.motion && !w.timer);
        assert!(w.is_activity());
        assert_eq!(try_wake(), None, "flags clear on read");

        signal_timer();
        let w = try_wake().unwrap();
        assert!(w.timer && !w.is_activity(), "the tick alone is not activity");
    }
}
