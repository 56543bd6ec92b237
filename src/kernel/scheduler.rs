// Card-side background jobs
//
// Everything that writes the card outside the tracker's own batch, or
// decodes a tile, is a Job. The system drains the queue after render,
// one Quantum per job, FlushTrack first. A job is pending at most once:
// asking again while it waits is a no-op, so "save settings" pressed
// five times is one write.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    // buffered track points to the open GPX file
    FlushTrack,
    WriteIndex,
    PersistSettings,
    SaveWaypoints,
    // one slice of the in-flight tile decode
    DecodeTile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High = 0,
    Normal = 1,
    Low = 2,
}

impl Job {
    pub const fn priority(&self) -> Priority {
        match self {
            Job::FlushTrack => Priority::High,
            Job::WriteIndex | Job::PersistSettings | Job::SaveWaypoints => Priority::Normal,
            Job::DecodeTile => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull(pub Job);

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job queue full, {:?} dropped", self.0)
    }
}

// every job fits in its lane at once
const LANE: usize = 4;

#[derive(Clone, Copy)]
struct Lane {
    ring: [Option<Job>; LANE],
    head: usize,
    len: usize,
}

impl Lane {
    const EMPTY: Self = Self {
        ring: [None; LANE],
        head: 0,
        len: 0,
    };

    fn push(&mut self, job: Job) -> Result<(), QueueFull> {
        if self.len == LANE {
            return Err(QueueFull(job));
        }
        self.ring[(self.head + self.len) % LANE] = Some(job);
        self.len += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<Job> {
        if self.len == 0 {
            return None;
        }
        let job = self.ring[self.head].take();
        self.head = (self.head + 1) % LANE;
        self.len -= 1;
        job
    }

    fn holds(&self, job: Job) -> bool {
        (0..self.len).any(|i| self.ring[(self.head + i) % LANE] == Some(job))
    }
}

pub struct Scheduler {
    lanes: [Lane; 3],
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            lanes: [Lane::EMPTY; 3],
        }
    }

    pub fn push_unique(&mut self, job: Job) -> Result<(), QueueFull> {
        let lane = &mut self.lanes[job.priority() as usize];
        if lane.holds(job) {
            return Ok(());
        }
        lane.push(job)
    }

    pub fn pop(&mut self) -> Option<Job> {
        self.lanes.iter_mut().find_map(Lane::pop)
    }

    pub fn is_pending(&self, job: Job) -> bool {
        self.lanes[job.priority() as usize].holds(job)
    }

    pub fn pending(&self) -> usize {
        self.lanes.iter().map(|l| l.len).sum()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
