// Foreground loop plumbing
// Single worker, no preemption: rate dividers pick the stages for each
// 10 ms tick, background jobs get one quantum each after render, and
// ISRs only latch wake flags.

pub mod quantum;
pub mod rate;
pub mod scheduler;
#[cfg(feature = "firmware")]
pub mod tasks;
pub mod wake;

pub use quantum::{JOB_QUANTUM_MS, Quantum};
pub use rate::{BASE_TICK_MS, Divider, Rates};
pub use scheduler::{Job, Priority, Scheduler};
