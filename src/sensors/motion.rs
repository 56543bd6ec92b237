// Accelerometer motion detector
//
// Motion is a change in |a| of more than 0.05 g inside a sliding 200 ms
// window. Consumers use last_motion_ms for their own quiet timers and
// the rising edge (onset) as an activity event.

use libm::sqrtf;

use crate::state::MotionState;

pub const WINDOW_MS: u64 = 200;
pub const THRESHOLD_G: f32 = 0.05;

// (time, |a|) samples; 32 covers 200 ms even at 100 Hz
struct Window {
    buf: [(u64, f32); 32],
    head: usize,
    len: usize,
}

impl Window {
    const fn new() -> Self {
        Self {
            buf: [(0, 0.0); 32],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, at_ms: u64, g: f32) {
        let idx = (self.head + self.len) % self.buf.len();
        self.buf[idx] = (at_ms, g);
        if self.len == self.buf.len() {
            self.head = (self.head + 1) % self.buf.len();
        } else {
            self.len += 1;
        }
    }

    fn expire(&mut self, before_ms: u64) {
        while self.len > 0 && self.buf[self.head].0 < before_ms {
            self.head = (self.head + 1) % self.buf.len();
            self.len -= 1;
        }
    }

    fn clear(&mut self) {
        self.len = 0;
    }

    // max - min of the magnitudes held
    fn range(&self) -> f32 {
        let mut lo = f32::MAX;
        let mut hi = f32::MIN;
        for i in 0..self.len {
            let g = self.buf[(self.head + i) % self.buf.len()].1;
            lo = lo.min(g);
            hi = hi.max(g);
        }
        if self.len < 2 { 0.0 } else { hi - lo }
    }
}

pub struct MotionDetector {
    window: Window,
    state: MotionState,
}

impl MotionDetector {
    pub const fn new() -> Self {
        Self {
            window: Window::new(),
            state: MotionState {
                moving: false,
                last_motion_ms: 0,
                delta_g: 0.0,
            },
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    // returns true on motion onset (quiet -> moving)
    pub fn update(&mut self, accel: [f32; 3], now_ms: u64) -> bool {
        let [x, y, z] = accel;
        let g = sqrtf(x * x + y * y + z * z);
        self.window.expire(now_ms.saturating_sub(WINDOW_MS));
        self.window.push(now_ms, g);

        let delta = self.window.range();
        let was = self.state.moving;
        self.state.delta_g = delta;
        self.state.moving = delta > THRESHOLD_G;
        if self.state.moving {
            self.state.last_motion_ms = now_ms;
        }
        self.state.moving && !was
    }

    // hardware motion interrupt while sampling was off
    pub fn note_wake(&mut self, now_ms: u64) {
        self.window.clear();
        self.state.moving = true;
        self.state.last_motion_ms = now_ms;
    }

    pub fn quiet_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.state.last_motion_ms)
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_gravity_is_not_motion() {
        let mut m = MotionDetector::new();
        for t in (0..1_000).step_by(50) {
            assert!(!m.update([0.0, 0.0, 1.0], t));
        }
        assert!(!m.state().moving);
    }

    #[test]
    fn test_bump_is_motion_onset_once() {
        let mut m = MotionDetector::new();
        m.update([0.0, 0.0, 1.0], 0);
        assert!(m.update([0.0, 0.0, 1.08], 50), "0.08 g change is motion");
        assert!(!m.update([0.0, 0.0, 1.0], 100), "still moving, no second onset");
        assert_eq!(m.state().last_motion_ms, 100);
    }

    #[test]
    fn test_old_samples_leave_window() {
        let mut m = MotionDetector::new();
        m.update([0.0, 0.0, 1.1], 0);
        // 300 ms later the bump is outside the 200 ms window
        assert!(!m.update([0.0, 0.0, 1.0], 300));
        assert!(!m.state().moving);
        assert_eq!(m.quiet_for(1_300), 1_300);
    }

    #[test]
    fn test_small_change_below_threshold() {
        let mut m = MotionDetector::new();
        m.update([0.0, 0.0, 1.0], 0);
        assert!(!m.update([0.0, 0.03, 1.0], 50));
    }
}
