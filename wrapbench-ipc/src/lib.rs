#![warn(missing_docs)]
//! wrapbench IPC protocol
//!
//! Supervisor/worker messages for process-isolated execution, serialized
//! with rkyv and carried in length-prefixed frames over a pipe pair.
//!
//! ```text
//! supervisor                         worker
//!     |  <------- Hello(caps) -------   |
//!     |  ------ Run{job, config} --->   |
//!     |  <----- SampleBatch* --------   |
//!     |  <-- Complete | Failure -----   |
//!     |  -------- Shutdown --------->   |
//! ```

mod framing;
mod messages;

pub use framing::{FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE, read_frame, write_frame};
pub use messages::{
    BenchmarkConfig, FailureKind, Sample, SampleBatch, SupervisorCommand, WorkerCapabilities,
    WorkerMessage,
};

/// Protocol version, checked on `Hello`
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum samples per batch message
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Environment variable carrying the worker's `<read_fd>,<write_fd>` pair
pub const IPC_FD_ENV: &str = "WRAPBENCH_IPC_FD";

/// Environment variable carrying the CPU a worker pins itself to
pub const WORKER_CPU_ENV: &str = "WRAPBENCH_WORKER_CPU";
