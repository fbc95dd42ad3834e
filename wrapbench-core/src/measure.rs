//! High-Precision Timing
//!
//! Wall time from `std::time::Instant`, cycles from RDTSCP on x86_64 and
//! CNTVCT_EL0 on AArch64. Other targets report zero cycles.

use std::time::Duration;

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn read_cycles() -> u64 {
    // SAFETY: RDTSCP is present on every x86_64 CPU in service and waits for
    // prior instructions to retire before sampling the counter.
    unsafe {
        let mut aux: u32 = 0;
        std::arch::x86_64::__rdtscp(&mut aux)
    }
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
fn read_cycles() -> u64 {
    let cnt: u64;
    // SAFETY: CNTVCT_EL0 is readable from EL0 on all AArch64 implementations.
    unsafe {
        std::arch::asm!("mrs {}, cntvct_el0", out(reg) cnt, options(nostack, nomem));
    }
    cnt
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
fn read_cycles() -> u64 {
    0
}

/// Whether this platform provides a hardware cycle counter.
/// When `false`, cycle counts are always 0.
pub const HAS_CYCLE_COUNTER: bool = cfg!(target_arch = "x86_64") || cfg!(target_arch = "aarch64");

/// Point in time with its cycle counter reading
#[derive(Debug, Clone, Copy)]
pub struct Instant {
    wall: std::time::Instant,
    cycles: u64,
}

impl Instant {
    /// Capture the current instant
    #[inline(always)]
    pub fn now() -> Self {
        let cycles = read_cycles();
        Self {
            wall: std::time::Instant::now(),
            cycles,
        }
    }

    /// Wall time since this instant
    #[inline(always)]
    pub fn elapsed(&self) -> Duration {
        self.wall.elapsed()
    }

    /// Wall time since this instant, saturated to u64 nanoseconds
    #[inline(always)]
    pub fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.wall.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Raw cycle counter value at capture
    #[inline(always)]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

/// Time and cycles spent between `Timer::start` and `Timer::stop`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Elapsed {
    /// Wall nanoseconds
    pub nanos: u64,
    /// Cycle counter delta
    pub cycles: u64,
}

/// Stopwatch around a single timed region
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start timing
    #[inline(always)]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Stop timing
    #[inline(always)]
    pub fn stop(&self) -> Elapsed {
        let nanos = self.start.elapsed_nanos();
        let cycles = read_cycles().saturating_sub(self.start.cycles);
        Elapsed { nanos, cycles }
    }
}

/// Pin the current thread to `cpu` so cycle readings come from one core.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu: usize) -> Result<(), std::io::Error> {
    // SAFETY: cpu_set_t is plain data; zeroed is a valid empty set.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);

        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}

/// Pin the current thread to `cpu` (no-op on this platform).
#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_cpu: usize) -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_elapsed() {
        let start = Instant::now();
        std::thread::sleep(Duration::from_millis(10));
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(5));
        assert!(start.elapsed_nanos() >= 5_000_000);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(Duration::from_millis(10));
        let elapsed = timer.stop();

        assert!(elapsed.nanos >= 5_000_000);
        if !HAS_CYCLE_COUNTER {
            assert_eq!(elapsed.cycles, 0);
        }
    }

    #[test]
    fn test_cycle_counter_monotonic() {
        if HAS_CYCLE_COUNTER {
            let a = read_cycles();
            let b = read_cycles();
            assert!(b >= a);
        }
    }
}
