// src/dag/scheduler_step.rs

//! Result types for scheduler steps.

/// Structured result of a single readiness scan.
///
/// The async shell turns this into executor launches and events; tests use
/// it to drive the scheduler by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStep<K> {
    /// Tasks that were marked `Running` and must be launched now.
    pub started: Vec<K>,
    /// Tasks that were newly marked `Skipped`.
    pub skipped: Vec<K>,
    /// New aggregate progress, if it changed during this step.
    pub progress: Option<u8>,
}

impl<K> SchedulerStep<K> {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.skipped.is_empty()
    }
}

/// What the shell should do after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutlook<K> {
    /// At least one task is running; wait for the next settlement.
    InFlight,
    /// Every task is completed or skipped.
    Finished,
    /// Nothing is running and the listed pending tasks can never start.
    Deadlocked(Vec<K>),
}
