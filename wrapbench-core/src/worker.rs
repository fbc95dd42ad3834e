//! Worker Process
//!
//! The worker side of process isolation. The supervisor re-executes the
//! benchmark binary with `WRAPBENCH_IPC_FD=<read>,<write>`; the binary calls
//! into [`WorkerMain::serve`] and answers `Run` commands for jobs of one suite
//! until `Shutdown` or end of stream.
//!
//! A SIGTERM sets a flag; the loop exits before the next command.
//! `WRAPBENCH_WORKER_CPU`, when set, names the core the worker pins to.

use crate::allocator::tracking_installed;
use crate::job::{JobOutcome, run_job};
use crate::measure::{HAS_CYCLE_COUNTER, pin_to_cpu};
use crate::suite::{BenchmarkSuite, DiscoveryError, Job, discover};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use wrapbench_ipc::{
    BenchmarkConfig, FailureKind, FrameError, FrameReader, FrameWriter, IPC_FD_ENV, SampleBatch,
    SupervisorCommand, WORKER_CPU_ENV, WorkerCapabilities, WorkerMessage,
};

#[cfg(unix)]
use std::os::unix::io::FromRawFd;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Whether a SIGTERM has asked the worker to stop
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

#[cfg(unix)]
fn install_sigterm_handler() {
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigterm_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

#[cfg(unix)]
extern "C" fn sigterm_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

#[cfg(not(unix))]
fn install_sigterm_handler() {}

/// Errors that end the worker loop
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Pipe failure or malformed frame
    #[error("IPC failure: {0}")]
    Frame(#[from] FrameError),

    /// The suite could not be expanded into jobs
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// `WRAPBENCH_IPC_FD` is malformed
    #[error("invalid WRAPBENCH_IPC_FD value {0:?} (expected <read_fd>,<write_fd>)")]
    InvalidTransport(String),
}

/// Whether this process was started as a worker
pub fn is_worker_process() -> bool {
    std::env::var_os(IPC_FD_ENV).is_some()
}

#[cfg_attr(not(unix), allow(dead_code))]
fn parse_fd_pair(value: &str) -> Option<(i32, i32)> {
    let (r, w) = value.split_once(',')?;
    Some((r.trim().parse().ok()?, w.trim().parse().ok()?))
}

/// CPU named by `WRAPBENCH_WORKER_CPU`; unset means no pinning
fn assigned_cpu() -> Option<usize> {
    parse_cpu(&std::env::var(WORKER_CPU_ENV).ok()?)
}

fn parse_cpu(value: &str) -> Option<usize> {
    value.trim().parse().ok()
}

/// Worker serving the jobs of suite `T`
pub struct WorkerMain<R: Read, W: Write> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

impl WorkerMain<Box<dyn Read>, Box<dyn Write>> {
    /// Worker over the inherited fd pair named by `WRAPBENCH_IPC_FD`,
    /// or stdin/stdout when the variable is absent.
    pub fn from_env() -> Result<Self, WorkerError> {
        match std::env::var(IPC_FD_ENV) {
            #[cfg(unix)]
            Ok(value) => {
                let (read_fd, write_fd) =
                    parse_fd_pair(&value).ok_or_else(|| WorkerError::InvalidTransport(value))?;
                // SAFETY: the supervisor hands these fds to us and nothing else owns them.
                let (read_file, write_file) = unsafe {
                    (
                        std::fs::File::from_raw_fd(read_fd),
                        std::fs::File::from_raw_fd(write_fd),
                    )
                };
                Ok(Self::new(Box::new(read_file), Box::new(write_file)))
            }
            _ => Ok(Self::new(
                Box::new(std::io::stdin()),
                Box::new(std::io::stdout()),
            )),
        }
    }

    /// Serve suite `T` over the environment's transport and return when the
    /// supervisor is done.
    pub fn serve<T: BenchmarkSuite>() -> Result<(), WorkerError> {
        Self::from_env()?.run::<T>()
    }
}

impl<R: Read, W: Write> WorkerMain<R, W> {
    /// Worker over an explicit reader/writer pair
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
        }
    }

    /// Handshake, then answer commands until shutdown
    pub fn run<T: BenchmarkSuite>(&mut self) -> Result<(), WorkerError> {
        install_sigterm_handler();

        let jobs = discover::<T>()?;

        self.writer.write(&WorkerMessage::Hello(WorkerCapabilities::current(
            HAS_CYCLE_COUNTER,
            tracking_installed(),
        )))?;

        if let Some(cpu) = assigned_cpu() {
            if let Err(e) = pin_to_cpu(cpu) {
                tracing::debug!(error = %e, cpu, "could not pin worker");
            }
        }

        while !shutdown_requested() {
            let command: SupervisorCommand = match self.reader.read() {
                Ok(command) => command,
                Err(FrameError::EndOfStream) => break,
                Err(e) => return Err(e.into()),
            };

            match command {
                SupervisorCommand::Run { job_id, config } => {
                    self.run_job(&jobs, &job_id, &config)?;
                }
                SupervisorCommand::Ping => self.writer.write(&WorkerMessage::Pong)?,
                SupervisorCommand::Shutdown => break,
            }
        }

        Ok(())
    }

    fn run_job<T: BenchmarkSuite>(
        &mut self,
        jobs: &[Job<T>],
        job_id: &str,
        config: &BenchmarkConfig,
    ) -> Result<(), WorkerError> {
        let Some(job) = jobs.iter().find(|j| j.id == job_id) else {
            self.writer.write(&WorkerMessage::Failure {
                job_id: job_id.to_string(),
                kind: FailureKind::UnknownJob,
                message: format!("unknown job: {job_id}"),
            })?;
            return Ok(());
        };

        match run_job(job, config) {
            JobOutcome::Completed(result) => {
                for batch in SampleBatch::chunked(job_id, &result.samples) {
                    self.writer.write(&WorkerMessage::SampleBatch(batch))?;
                }
                self.writer.write(&WorkerMessage::Complete {
                    job_id: job_id.to_string(),
                    total_iterations: result.iterations,
                    measured_iterations: result.measured_iterations,
                    total_duration_nanos: result.total_time_ns,
                    stabilized: result.stabilized,
                })?;
            }
            JobOutcome::Panicked { message } => {
                self.writer.write(&WorkerMessage::Failure {
                    job_id: job_id.to_string(),
                    kind: FailureKind::Panic,
                    message,
                })?;
            }
        }

        Ok(())
    }
}
