//! Run log: ordered timeline of everything the engine did during the current run.
//!
//! Held in memory and reset at every run start. Served as-is by `GET /api/run-log`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use orgmind_common::Stage;

#[derive(Debug, Default)]
pub struct RunLog {
    pub run_id: Option<String>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub seq: u32,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    RunStarted {
        run_id: String,
        records: usize,
        batch_size: usize,
        interval_secs: u64,
    },
    BatchStarted {
        batch: usize,
        records: usize,
        queued_after: usize,
    },
    StageCompleted {
        batch: usize,
        stage: Stage,
        millis: u64,
    },
    StageSkipped {
        batch: usize,
        stage: Stage,
    },
    BatchFailed {
        batch: usize,
        stage: Stage,
        error: String,
    },
    BatchApplied {
        batch: usize,
        records: usize,
        topics_rewritten: usize,
        conflicts: usize,
        decisions: usize,
    },
    /// A tick fired while the previous batch was still in flight.
    TickDropped,
    RunCompleted {
        processed: usize,
        result_count: usize,
        error_count: usize,
    },
    RunFailed {
        error: String,
    },
    RunCancelled {
        queued: usize,
    },
}

impl RunLog {
    /// Start a fresh timeline for `run_id`, dropping the previous run's events.
    pub fn begin(&mut self, run_id: String) {
        self.run_id = Some(run_id);
        self.events.clear();
        self.seq = 0;
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }
}
