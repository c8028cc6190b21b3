//! Simulated jobs and the random helpers that drive them.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of a generated job id.
pub const JOB_ID_LEN: usize = 8;

/// URL-safe id alphabet (64 symbols).
const ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Progress value at which a job is finished.
pub const PROGRESS_MAX: u8 = 100;

/// Status of a simulated job. Always derived from progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
}

impl JobStatus {
    /// Total over every integer: `<= 0` is pending, `>= 100` is completed.
    pub fn from_progress(progress: i64) -> Self {
        if progress <= 0 {
            JobStatus::Pending
        } else if progress >= PROGRESS_MAX as i64 {
            JobStatus::Completed
        } else {
            JobStatus::InProgress
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in-progress",
            JobStatus::Completed => "completed",
        }
    }
}

/// A single simulated unit of work owned by one session.
///
/// `id` and `name` never change. `progress` only grows and is capped at
/// [`PROGRESS_MAX`]; status is computed on demand so it can never drift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    id: String,
    name: String,
    progress: u8,
}

impl Job {
    /// Create a pending job numbered `sequence` within its session.
    pub fn new<R: Rng + ?Sized>(sequence: u32, rng: &mut R) -> Self {
        Self::with_id(generate_job_id(rng), sequence)
    }

    pub(crate) fn with_id(id: String, sequence: u32) -> Self {
        Self {
            name: format!("Client Job #{sequence}"),
            id,
            progress: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::from_progress(self.progress as i64)
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= PROGRESS_MAX
    }

    /// Add `increment`, clamped to 100. Returns whether progress changed.
    pub fn advance(&mut self, increment: u8) -> bool {
        let next = self.progress.saturating_add(increment).min(PROGRESS_MAX);
        let changed = next != self.progress;
        self.progress = next;
        changed
    }

    /// Full record, as sent in the initial snapshot.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            progress: self.progress,
            status: self.status(),
        }
    }

    /// Partial record, as sent on every progress change.
    pub fn update(&self) -> JobUpdate {
        JobUpdate {
            id: self.id.clone(),
            progress: self.progress,
            status: self.status(),
        }
    }
}

/// Wire form of a job inside `initial-jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub name: String,
    pub progress: u8,
    pub status: JobStatus,
}

/// Wire form of a `job-update` payload. Clients already hold the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub id: String,
    pub progress: u8,
    pub status: JobStatus,
}

/// Uniform integer in `[min, max]`, both bounds inclusive.
///
/// Swapped bounds are tolerated rather than panicking.
pub fn random_int<R: Rng + ?Sized>(rng: &mut R, min: i64, max: i64) -> i64 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    rng.gen_range(lo..=hi)
}

/// Fresh `JOB_ID_LEN`-character id from the URL-safe alphabet.
pub fn generate_job_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..JOB_ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}
