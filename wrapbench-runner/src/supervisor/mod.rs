//! Supervisor Process
//!
//! Spawns worker processes (the current binary re-executed with
//! `WRAPBENCH_IPC_FD=3,4`) and collects job results over the pipe pair.
//!
//! A job that exceeds its timeout gets SIGTERM, 500 ms to flush, then
//! SIGKILL. Persistent workers are reused across jobs and respawned after a
//! crash or timeout; one-shot mode spawns a worker per job.
//!
//! Process control is Unix-only; the result and error types are not.

#[cfg(unix)]
mod process;

#[cfg(unix)]
pub use process::{IpcJob, Supervisor, WorkerHandle};

use std::time::Duration;
use thiserror::Error;
use wrapbench_ipc::{FailureKind, FrameError, Sample};

/// Errors from driving worker processes
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The worker process could not be started
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// Pipe failure or malformed frame
    #[error("IPC error: {0}")]
    Ipc(#[from] FrameError),

    /// The worker died or closed its pipe mid-job
    #[error("worker crashed: {0}")]
    WorkerCrashed(String),

    /// The job exceeded its timeout
    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    /// Unexpected message or protocol version
    #[error("worker protocol error: expected {expected}, got {got}")]
    Protocol {
        /// What the supervisor waited for
        expected: String,
        /// What arrived
        got: String,
    },

    /// The rayon pool for parallel workers could not be built
    #[error("failed to build worker pool: {0}")]
    Pool(String),
}

/// Result of one job run over IPC
#[derive(Debug, Clone)]
pub struct IpcJobResult {
    /// Job id
    pub job_id: String,
    /// Samples received before completion or failure
    pub samples: Vec<Sample>,
    /// Invocations including warmup
    pub total_iterations: u64,
    /// Invocations during measurement
    pub measured_iterations: u64,
    /// Measurement wall time, as reported by the worker
    pub total_duration_nanos: u64,
    /// Wall time the supervisor spent on the job, spawn included
    pub wall_time_nanos: u64,
    /// Stopped on relative-error convergence
    pub stabilized: bool,
    /// How the job ended
    pub status: IpcJobStatus,
}

/// How a job ended on the worker side
#[derive(Debug, Clone, PartialEq)]
pub enum IpcJobStatus {
    /// `Complete` received
    Success,
    /// `Failure` received, or the supervisor gave up on the job
    Failure {
        /// Failure category
        kind: FailureKind,
        /// Human-readable reason
        message: String,
    },
}

#[cfg_attr(not(unix), allow(dead_code))]
impl IpcJobResult {
    fn failure(job_id: &str, kind: FailureKind, message: String) -> Self {
        Self {
            job_id: job_id.to_string(),
            samples: Vec::new(),
            total_iterations: 0,
            measured_iterations: 0,
            total_duration_nanos: 0,
            wall_time_nanos: 0,
            stabilized: false,
            status: IpcJobStatus::Failure { kind, message },
        }
    }

    fn with_wall_time(mut self, elapsed: Duration) -> Self {
        self.wall_time_nanos = elapsed.as_nanos() as u64;
        self
    }

    /// Result for a job whose worker could not be driven to completion
    fn from_error(job_id: &str, error: &SupervisorError) -> Self {
        let kind = match error {
            SupervisorError::Timeout(_) => FailureKind::Timeout,
            _ => FailureKind::Crashed,
        };
        Self::failure(job_id, kind, error.to_string())
    }
}

