// Time budget for one slice of background work
//
// A job checks expired() between steps; on expiry it returns and is
// requeued with its state preserved. max_steps bounds work on hosts
// where the clock does not advance inside a tick.

pub const JOB_QUANTUM_MS: u64 = 5;

pub struct Quantum<'a> {
    clock: &'a dyn Fn() -> u64,
    deadline_ms: u64,
    steps: u32,
    max_steps: u32,
}

impl<'a> Quantum<'a> {
    pub fn new(clock: &'a dyn Fn() -> u64, budget_ms: u64, max_steps: u32) -> Self {
        Self {
            clock,
            deadline_ms: clock() + budget_ms,
            steps: 0,
            max_steps,
        }
    }

    // count one unit of work
    #[inline]
    pub fn step(&mut self) {
        self.steps += 1;
    }

    pub fn expired(&self) -> bool {
        self.steps >= self.max_steps || (self.clock)() >= self.deadline_ms
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn test_step_cap() {
        let clock = || 0u64;
        let mut q = Quantum::new(&clock, JOB_QUANTUM_MS, 3);
        q.step();
        q.step();
        assert!(!q.expired());
        q.step();
        assert!(q.expired());
    }

    #[test]
    fn test_deadline() {
        let now = Cell::new(100u64);
        let clock = || now.get();
        let q = Quantum::new(&clock, JOB_QUANTUM_MS, u32::MAX);
        now.set(104);
        assert!(!q.expired());
        now.set(105);
        assert!(q.expired());
    }
}
