//! Worker processes over a pipe pair, driven with `poll(2)` and signals.

use super::{IpcJobResult, IpcJobStatus, SupervisorError};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::env;
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use wrapbench_ipc::{
    BenchmarkConfig, FrameError, FrameReader, FrameWriter, IPC_FD_ENV, PROTOCOL_VERSION,
    SupervisorCommand, WORKER_CPU_ENV, WorkerCapabilities, WorkerMessage,
};

/// How long a fresh worker has to send `Hello`
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Drain window between SIGTERM and SIGKILL
const DRAIN_WINDOW: Duration = Duration::from_millis(500);

/// Result of polling for data
#[derive(Debug)]
enum PollResult {
    DataAvailable,
    Timeout,
    PipeClosed,
    Error(std::io::Error),
}

/// Wait for data to be available on a file descriptor with timeout
fn wait_for_data(fd: RawFd, timeout: Duration) -> PollResult {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

    // SAFETY: pollfd is a valid, exclusively borrowed array of length 1.
    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if result < 0 {
        PollResult::Error(std::io::Error::last_os_error())
    } else if result == 0 {
        PollResult::Timeout
    } else if pollfd.revents & libc::POLLIN != 0 {
        // A closing pipe may still hold a final frame
        PollResult::DataAvailable
    } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        PollResult::PipeClosed
    } else {
        PollResult::Timeout
    }
}

/// Create a close-on-exec pipe, returning (read_fd, write_fd).
fn create_pipe() -> Result<(RawFd, RawFd), std::io::Error> {
    let mut fds = [0 as RawFd; 2];
    // SAFETY: fds has room for the two descriptors pipe(2) writes.
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    for &fd in &fds {
        // SAFETY: fd was just returned by pipe(2).
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
    Ok((fds[0], fds[1]))
}

fn close_fd(fd: RawFd) {
    // SAFETY: callers only pass descriptors they own and no longer use.
    unsafe {
        libc::close(fd);
    }
}

/// Child side of the fork: place `cmd_read` on fd 3 and `msg_write` on fd 4.
///
/// Any of the four pipe ends may already sit on 3 or 4, so both sources are
/// first copied above 4 before the `dup2` calls. The parent-side ends are
/// close-on-exec and only closed here when they do not alias 3 or 4.
///
/// # Safety
///
/// Must only run in a forked child before exec.
unsafe fn install_worker_fds(
    cmd_read: RawFd,
    msg_write: RawFd,
    parent_ends: [RawFd; 2],
) -> std::io::Result<()> {
    // SAFETY: plain fd syscalls, async-signal-safe.
    unsafe {
        let cmd_src = libc::fcntl(cmd_read, libc::F_DUPFD, 5);
        if cmd_src < 0 {
            return Err(std::io::Error::last_os_error());
        }
        let msg_src = libc::fcntl(msg_write, libc::F_DUPFD, 5);
        if msg_src < 0 {
            return Err(std::io::Error::last_os_error());
        }

        // dup2 clears FD_CLOEXEC on the target
        if libc::dup2(cmd_src, 3) < 0 || libc::dup2(msg_src, 4) < 0 {
            return Err(std::io::Error::last_os_error());
        }
        libc::close(cmd_src);
        libc::close(msg_src);

        for fd in [cmd_read, msg_write, parent_ends[0], parent_ends[1]] {
            if fd > 4 {
                libc::close(fd);
            }
        }
    }
    Ok(())
}

fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
    // SAFETY: kill(2) has no memory-safety preconditions.
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Worker process handle
pub struct WorkerHandle {
    child: Child,
    reader: FrameReader<std::fs::File>,
    writer: FrameWriter<std::fs::File>,
    capabilities: Option<WorkerCapabilities>,
    msg_read_fd: RawFd,
}

impl WorkerHandle {
    /// Spawn `binary` as a worker serving `suite`, pinned to `cpu` if given
    pub fn spawn_binary(
        binary: &Path,
        suite: &str,
        cpu: Option<usize>,
    ) -> Result<Self, SupervisorError> {
        // cmd pipe: supervisor writes, worker reads on fd 3
        let (cmd_read, cmd_write) = create_pipe()?;
        // msg pipe: worker writes on fd 4, supervisor reads
        let (msg_read, msg_write) = match create_pipe() {
            Ok(fds) => fds,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        let mut command = Command::new(binary);
        command
            .env(IPC_FD_ENV, "3,4")
            .env(crate::WORKER_SUITE_ENV, suite)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        match cpu {
            Some(cpu) => command.env(WORKER_CPU_ENV, cpu.to_string()),
            None => command.env_remove(WORKER_CPU_ENV),
        };

        // SAFETY: only async-signal-safe libc calls run between fork and exec.
        unsafe {
            command.pre_exec(move || install_worker_fds(cmd_read, msg_write, [cmd_write, msg_read]));
        }

        let child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                close_fd(msg_read);
                close_fd(msg_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        close_fd(cmd_read);
        close_fd(msg_write);

        // SAFETY: the parent-side ends are owned here and wrapped exactly once.
        let (writer_file, reader_file) = unsafe {
            (
                std::fs::File::from_raw_fd(cmd_write),
                std::fs::File::from_raw_fd(msg_read),
            )
        };

        let mut handle = Self {
            child,
            reader: FrameReader::new(reader_file),
            writer: FrameWriter::new(writer_file),
            capabilities: None,
            msg_read_fd: msg_read,
        };

        handle.wait_for_hello()?;
        if let Some(caps) = handle.capabilities() {
            tracing::debug!(
                pid = caps.pid,
                suite,
                cycles = caps.has_cycle_counter,
                allocations = caps.has_alloc_tracking,
                "worker ready"
            );
        }
        Ok(handle)
    }

    fn wait_for_hello(&mut self) -> Result<(), SupervisorError> {
        match wait_for_data(self.msg_read_fd, HELLO_TIMEOUT) {
            PollResult::DataAvailable => {}
            PollResult::Timeout => {
                self.kill();
                return Err(SupervisorError::Protocol {
                    expected: "Hello".to_string(),
                    got: format!("nothing within {HELLO_TIMEOUT:?}"),
                });
            }
            PollResult::PipeClosed => {
                return Err(SupervisorError::WorkerCrashed(
                    "worker exited before handshake".to_string(),
                ));
            }
            PollResult::Error(e) => return Err(SupervisorError::SpawnFailed(e)),
        }

        let msg: WorkerMessage = match self.reader.read() {
            Ok(msg) => msg,
            Err(FrameError::EndOfStream) => {
                return Err(SupervisorError::WorkerCrashed(
                    "worker exited before handshake".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        match msg {
            WorkerMessage::Hello(caps) => {
                if caps.protocol_version != PROTOCOL_VERSION {
                    return Err(SupervisorError::Protocol {
                        expected: format!("protocol version {PROTOCOL_VERSION}"),
                        got: format!("protocol version {}", caps.protocol_version),
                    });
                }
                self.capabilities = Some(caps);
                Ok(())
            }
            other => Err(SupervisorError::Protocol {
                expected: "Hello".to_string(),
                got: format!("{other:?}"),
            }),
        }
    }

    /// Capabilities announced in `Hello`
    pub fn capabilities(&self) -> Option<&WorkerCapabilities> {
        self.capabilities.as_ref()
    }

    /// Run one job, waiting at most `config.timeout_ns` (0 = no limit)
    pub fn run_job(
        &mut self,
        job_id: &str,
        config: &BenchmarkConfig,
    ) -> Result<IpcJobResult, SupervisorError> {
        self.writer.write(&SupervisorCommand::Run {
            job_id: job_id.to_string(),
            config: config.clone(),
        })?;

        let timeout = (config.timeout_ns > 0).then(|| Duration::from_nanos(config.timeout_ns));
        let mut samples = Vec::new();
        let start = Instant::now();

        loop {
            let remaining = match timeout {
                Some(limit) => {
                    let remaining = limit.saturating_sub(start.elapsed());
                    if remaining.is_zero() {
                        return self.handle_timeout(limit);
                    }
                    remaining
                }
                None => Duration::from_millis(100),
            };

            // Buffered bytes may be an incomplete frame that never completes,
            // so liveness is checked either way.
            if self.reader.has_buffered_data() {
                if !self.is_alive() {
                    return Err(SupervisorError::WorkerCrashed(
                        "worker exited with a partial frame buffered".to_string(),
                    ));
                }
            } else {
                match wait_for_data(self.msg_read_fd, remaining.min(Duration::from_millis(100))) {
                    PollResult::DataAvailable => {}
                    PollResult::Timeout => {
                        if !self.is_alive() {
                            return Err(SupervisorError::WorkerCrashed(self.exit_description()));
                        }
                        continue;
                    }
                    PollResult::PipeClosed => {
                        return Err(SupervisorError::WorkerCrashed(self.exit_description()));
                    }
                    PollResult::Error(e) => {
                        return Err(SupervisorError::WorkerCrashed(format!("pipe error: {e}")));
                    }
                }
            }

            let msg: WorkerMessage = match self.reader.read() {
                Ok(msg) => msg,
                Err(FrameError::EndOfStream) => {
                    return Err(SupervisorError::WorkerCrashed(self.exit_description()));
                }
                Err(e) => {
                    if !self.is_alive() {
                        return Err(SupervisorError::WorkerCrashed(self.exit_description()));
                    }
                    return Err(e.into());
                }
            };

            match msg {
                WorkerMessage::SampleBatch(batch) => samples.extend(batch.samples),
                WorkerMessage::Complete {
                    job_id: done,
                    total_iterations,
                    measured_iterations,
                    total_duration_nanos,
                    stabilized,
                } => {
                    if done != job_id {
                        return Err(SupervisorError::Protocol {
                            expected: format!("Complete for {job_id}"),
                            got: format!("Complete for {done}"),
                        });
                    }
                    return Ok(IpcJobResult {
                        job_id: job_id.to_string(),
                        samples,
                        total_iterations,
                        measured_iterations,
                        total_duration_nanos,
                        wall_time_nanos: 0,
                        stabilized,
                        status: IpcJobStatus::Success,
                    });
                }
                WorkerMessage::Failure { kind, message, .. } => {
                    return Ok(IpcJobResult::failure(job_id, kind, message));
                }
                WorkerMessage::Pong => continue,
                WorkerMessage::Hello(_) => {
                    return Err(SupervisorError::Protocol {
                        expected: "SampleBatch/Complete/Failure".to_string(),
                        got: "Hello".to_string(),
                    });
                }
            }
        }
    }

    /// SIGTERM, drain for [`DRAIN_WINDOW`], then SIGKILL
    fn handle_timeout(&mut self, limit: Duration) -> Result<IpcJobResult, SupervisorError> {
        tracing::warn!(pid = self.child.id(), ?limit, "job timed out; stopping worker");
        // The worker may already be gone
        let _ = send_sigterm(self.child.id());

        let drain_deadline = Instant::now() + DRAIN_WINDOW;
        loop {
            let remaining = drain_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match wait_for_data(self.msg_read_fd, remaining) {
                PollResult::DataAvailable => match self.reader.read::<WorkerMessage>() {
                    Ok(WorkerMessage::SampleBatch(_)) => continue,
                    _ => break,
                },
                _ => break,
            }
        }

        self.kill();
        Err(SupervisorError::Timeout(limit))
    }

    /// Liveness check
    pub fn ping(&mut self) -> Result<(), SupervisorError> {
        self.writer.write(&SupervisorCommand::Ping)?;
        match self.reader.read::<WorkerMessage>()? {
            WorkerMessage::Pong => Ok(()),
            other => Err(SupervisorError::Protocol {
                expected: "Pong".to_string(),
                got: format!("{other:?}"),
            }),
        }
    }

    /// Ask the worker to exit and reap it
    pub fn shutdown(mut self) -> Result<(), SupervisorError> {
        self.writer.write(&SupervisorCommand::Shutdown)?;
        let _ = self.child.wait();
        Ok(())
    }

    /// Whether the worker process is still running
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill and reap the worker
    pub fn kill(&mut self) {
        if self.is_alive() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }

    fn exit_description(&mut self) -> String {
        match self.child.try_wait() {
            Ok(Some(status)) => format!("worker exited with {status}"),
            _ => "worker closed its pipe".to_string(),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = send_sigterm(self.child.id());
            std::thread::sleep(Duration::from_millis(50));
            if self.is_alive() {
                let _ = self.child.kill();
            }
            let _ = self.child.wait();
        }
    }
}

/// A job to hand to a worker: its position in the plan, id and config
#[derive(Debug, Clone)]
pub struct IpcJob {
    /// Position in the plan
    pub index: usize,
    /// Job id
    pub job_id: String,
    /// Effective configuration
    pub config: BenchmarkConfig,
}

/// Distributes jobs over worker processes
pub struct Supervisor {
    binary: PathBuf,
    suite: String,
    num_workers: usize,
    persistent: bool,
}

impl Supervisor {
    /// Supervisor re-executing the current binary for `suite`
    pub fn new(suite: &str, num_workers: usize, persistent: bool) -> Result<Self, SupervisorError> {
        Ok(Self::with_binary(env::current_exe()?, suite, num_workers, persistent))
    }

    /// Supervisor spawning `binary` as the worker
    pub fn with_binary(binary: PathBuf, suite: &str, num_workers: usize, persistent: bool) -> Self {
        Self {
            binary,
            suite: suite.to_string(),
            num_workers: num_workers.max(1),
            persistent,
        }
    }

    /// Run every job, returning results in job order.
    ///
    /// With more than one worker, jobs are sharded round-robin and each shard
    /// runs on its own thread of a dedicated rayon pool.
    pub fn run_all(&self, jobs: &[IpcJob]) -> Result<Vec<IpcJobResult>, SupervisorError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let mut indexed = if self.num_workers == 1 || jobs.len() == 1 {
            self.run_shard(0, jobs.iter().collect())
        } else {
            let worker_count = self.num_workers.min(jobs.len());
            let mut shards: Vec<Vec<&IpcJob>> = vec![Vec::new(); worker_count];
            for (position, job) in jobs.iter().enumerate() {
                shards[position % worker_count].push(job);
            }

            let pool = ThreadPoolBuilder::new()
                .num_threads(worker_count)
                .build()
                .map_err(|e| SupervisorError::Pool(e.to_string()))?;

            let shard_results: Vec<Vec<(usize, IpcJobResult)>> = pool.install(|| {
                shards
                    .into_par_iter()
                    .enumerate()
                    .map(|(shard, jobs)| self.run_shard(shard, jobs))
                    .collect()
            });
            shard_results.into_iter().flatten().collect()
        };

        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, result)| result).collect())
    }

    fn spawn(&self, cpu: usize) -> Result<WorkerHandle, SupervisorError> {
        WorkerHandle::spawn_binary(&self.binary, &self.suite, Some(cpu))
    }

    /// Each shard's worker gets its own core, wrapping past the core count
    fn run_shard(&self, shard: usize, jobs: Vec<&IpcJob>) -> Vec<(usize, IpcJobResult)> {
        let cpu = cpu_for_shard(shard, available_cpus());
        let mut results = Vec::with_capacity(jobs.len());
        let mut worker: Option<WorkerHandle> = None;

        for job in jobs {
            let started = Instant::now();
            if let Some(mut reused) = worker.take() {
                match reused.ping() {
                    Ok(()) => worker = Some(reused),
                    Err(e) => {
                        tracing::debug!(error = %e, "worker failed health check; respawning");
                        reused.kill();
                    }
                }
            }
            if worker.is_none() {
                match self.spawn(cpu) {
                    Ok(w) => worker = Some(w),
                    Err(e) => {
                        tracing::warn!(job = %job.job_id, error = %e, "could not start worker");
                        let failed = IpcJobResult::from_error(&job.job_id, &e)
                            .with_wall_time(started.elapsed());
                        results.push((job.index, failed));
                        continue;
                    }
                }
            }
            let Some(active) = worker.as_mut() else {
                continue;
            };

            let result = match active.run_job(&job.job_id, &job.config) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(job = %job.job_id, error = %e, "worker lost during job");
                    if let Some(mut lost) = worker.take() {
                        lost.kill();
                    }
                    IpcJobResult::from_error(&job.job_id, &e)
                }
            };
            results.push((job.index, result.with_wall_time(started.elapsed())));

            if !self.persistent {
                if let Some(done) = worker.take() {
                    let _ = done.shutdown();
                }
            }
        }

        if let Some(worker) = worker {
            let _ = worker.shutdown();
        }
        results
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn cpu_for_shard(shard: usize, cpus: usize) -> usize {
    shard % cpus.max(1)
}
