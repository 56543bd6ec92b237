// Debounced buttons from the I²C expander
//
// Eight buttons arrive as one bitmask per 10 ms poll. Each button runs
// its own debounce and gesture state:
//   20 ms debounce, 500 ms hold-start, 100 ms hold-tick,
//   double-click = press within 300 ms of a release whose cycle had no hold.
// At most one event per button per poll. Events go out through a
// bounded channel; a full channel drops the event and raises the
// overflow flag.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use crate::bus::StateBus;
use crate::drivers::hub::SensorHub;
use crate::error::Backoff;
use crate::state::{ButtonEvent, ButtonId, ButtonKind};

pub const DEBOUNCE_MS: u64 = 20;
pub const HOLD_MS: u64 = 500;
pub const HOLD_TICK_MS: u64 = 100;
pub const DOUBLE_CLICK_MS: u64 = 300;

pub const EVENT_QUEUE: usize = 16;

pub type ButtonChannel = Channel<CriticalSectionRawMutex, ButtonEvent, EVENT_QUEUE>;

#[derive(Clone, Copy)]
struct Button {
    stable: bool,
    candidate: bool,
    candidate_since: u64,
    press_since: u64,
    held: bool,
    // this cycle already completed a double-click
    paired: bool,
    last_tick: u64,
    // release time of a cycle that may start a double-click
    armed_release: Option<u64>,
}

impl Button {
    const fn new() -> Self {
        Self {
            stable: false,
            candidate: false,
            candidate_since: 0,
            press_since: 0,
            held: false,
            paired: false,
            last_tick: 0,
            armed_release: None,
        }
    }

    fn step(&mut self, raw: bool, now: u64) -> Option<ButtonKind> {
        if raw != self.candidate {
            self.candidate = raw;
            self.candidate_since = now;
        }

        if self.candidate != self.stable && now - self.candidate_since >= DEBOUNCE_MS {
            self.stable = self.candidate;
            if self.stable {
                self.press_since = now;
                self.held = false;
                let double = self
                    .armed_release
                    .take()
                    .is_some_and(|r| now - r <= DOUBLE_CLICK_MS);
                self.paired = double;
                return Some(if double {
                    ButtonKind::DoubleClick
                } else {
                    ButtonKind::Press
                });
            }
            // held or already-paired cycles never start a double-click
            self.armed_release = (!self.held && !self.paired).then_some(now);
            return Some(ButtonKind::Release);
        }

        if self.stable {
            let held_for = now - self.press_since;
            if !self.held && held_for >= HOLD_MS {
                self.held = true;
                self.last_tick = now;
                // holding out of a double-click cancels the pairing
                self.armed_release = None;
                return Some(ButtonKind::HoldStart);
            }
            if self.held && now - self.last_tick >= HOLD_TICK_MS {
                self.last_tick = now;
                return Some(ButtonKind::HoldTick);
            }
        }
        None
    }
}

pub struct ButtonManager {
    buttons: [Button; 8],
    backoff: Backoff,
    overflows: u32,
}

impl ButtonManager {
    pub const fn new() -> Self {
        Self {
            buttons: [Button::new(); 8],
            backoff: Backoff::new(),
            overflows: 0,
        }
    }

    pub fn overflows(&self) -> u32 {
        self.overflows
    }

    // any button currently held (after debounce)
    pub fn any_held(&self) -> bool {
        self.buttons.iter().any(|b| b.stable)
    }

    pub fn poll<H: SensorHub>(
        &mut self,
        hub: &mut H,
        bus: &StateBus,
        events: &ButtonChannel,
        now_ms: u64,
    ) -> usize {
        if !self.backoff.ready(now_ms) {
            return 0;
        }
        let mask = match hub.read_buttons() {
            Ok(m) => m,
            Err(e) => {
                if self.backoff.on_failure(now_ms) {
                    warn!("input: expander unreadable ({}), buttons degraded", e);
                    bus.set_health(|h| h.buttons_degraded = true);
                }
                return 0;
            }
        };
        if self.backoff.on_success() {
            info!("input: expander back");
            bus.set_health(|h| h.buttons_degraded = false);
        }
        self.feed(mask, bus, events, now_ms)
    }

    // one debounced step over a raw mask; returns events emitted
    pub fn feed(&mut self, mask: u8, bus: &StateBus, events: &ButtonChannel, now_ms: u64) -> usize {
        let mut sent = 0;
        for (i, btn) in self.buttons.iter_mut().enumerate() {
            let Some(kind) = btn.step(mask & (1 << i) != 0, now_ms) else {
                continue;
            };
            let ev = ButtonEvent {
                id: ButtonId::ALL[i],
                kind,
                at_ms: now_ms,
            };
            if events.try_send(ev).is_ok() {
                sent += 1;
            } else {
                self.overflows += 1;
                if self.overflows == 1 || self.overflows % 64 == 0 {
                    warn!("input: queue full, {} events dropped", self.overflows);
                }
                bus.set_health(|h| h.button_overflow = true);
            }
        }
        sent
    }
}

impl Default for ButtonManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    const CENTER: u8 = 1 << 4;

    struct Rig {
        bm: ButtonManager,
        bus: StateBus,
        ch: ButtonChannel,
        now: u64,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                bm: ButtonManager::new(),
                bus: StateBus::new(),
                ch: Channel::new(),
                now: 0,
            }
        }

        // hold mask for ms, polling every 10 ms
        fn run(&mut self, mask: u8, ms: u64) -> Vec<ButtonKind> {
            let mut out = Vec::new();
            let end = self.now + ms;
            while self.now < end {
                self.now += 10;
                self.bm.feed(mask, &self.bus, &self.ch, self.now);
                while let Ok(ev) = self.ch.try_receive() {
                    out.push(ev.kind);
                }
            }
            out
        }
    }

    #[test]
    fn test_bounce_is_filtered() {
        let mut r = Rig::new();
        let mut kinds = Vec::new();
        for m in [CENTER, 0, CENTER, 0] {
            kinds.extend(r.run(m, 10));
        }
        assert!(kinds.is_empty(), "10 ms blips never settle: {:?}", kinds);
        assert_eq!(r.run(CENTER, 30), [ButtonKind::Press]);
        assert_eq!(r.run(0, 30), [ButtonKind::Release]);
    }

    #[test]
    fn test_hold_start_then_ticks() {
        let mut r = Rig::new();
        let kinds = r.run(CENTER, 800);
        assert_eq!(kinds[0], ButtonKind::Press);
        assert_eq!(kinds[1], ButtonKind::HoldStart);
        let ticks = kinds.iter().filter(|k| **k == ButtonKind::HoldTick).count();
        // press at 30 ms, hold at 530 ms, ticks at 630, 730
        assert_eq!(ticks, 2, "{:?}", kinds);
    }

    #[test]
    fn test_double_click() {
        let mut r = Rig::new();
        assert_eq!(r.run(CENTER, 100), [ButtonKind::Press]);
        assert_eq!(r.run(0, 100), [ButtonKind::Release]);
        assert_eq!(r.run(CENTER, 100), [ButtonKind::DoubleClick]);
        assert_eq!(r.run(0, 100), [ButtonKind::Release]);
        // a third quick press starts a new pair
        assert_eq!(r.run(CENTER, 100), [ButtonKind::Press]);
    }

    #[test]
    fn test_slow_second_press_is_plain() {
        let mut r = Rig::new();
        r.run(CENTER, 100);
        r.run(0, 400);
        assert_eq!(r.run(CENTER, 100), [ButtonKind::Press]);
    }

    #[test]
    fn test_hold_cycle_does_not_arm_double_click() {
        let mut r = Rig::new();
        r.run(CENTER, 600);
        r.run(0, 100);
        assert_eq!(r.run(CENTER, 100), [ButtonKind::Press]);
    }

    #[test]
    fn test_overflow_raises_flag() {
        let mut r = Rig::new();
        // nobody drains the channel: 8 buttons press and release twice
        let mut t = 0;
        for _ in 0..2 {
            for mask in [0xFF, 0x00] {
                for _ in 0..5 {
                    t += 10;
                    r.bm.feed(mask, &r.bus, &r.ch, t);
                }
                t += 400;
            }
        }
        assert_eq!(r.ch.len(), EVENT_QUEUE);
        assert_eq!(r.bm.overflows(), 16);
        assert!(r.bus.health().button_overflow);
    }
}
