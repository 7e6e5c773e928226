//! Process statistics querying.
//!
//! This crate provides a cross-platform way to query the resource usage of the current process: the CPU time it has
//! consumed, its RSS (resident set size), and the host name of the machine it runs on.
//!
//! ## Linux
//!
//! RSS is read from [procfs](https://docs.kernel.org/filesystems/proc.html) via `/proc/self/statm`, which holds
//! lazily-updated memory statistics about the process. It is not the most accurate source, but is generally good enough
//! for periodic self-monitoring. CPU time is queried with `getrusage(2)`.
//!
//! ## macOS
//!
//! RSS is queried from the kernel via `proc_pidinfo(2)` task information. CPU time is queried with `getrusage(2)`.
//!
//! ## Other platforms
//!
//! No support yet. All queries return `None`.
#![deny(missing_docs)]

use std::time::{Duration, Instant};

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::resident_set_size;

#[cfg(target_os = "macos")]
mod darwin;

#[cfg(target_os = "macos")]
pub use darwin::resident_set_size;

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::{cpu_time, hostname};

/// Gets the resident set size of this process, in bytes.
#[cfg(all(not(target_os = "linux"), not(target_os = "macos")))]
pub fn resident_set_size() -> Option<usize> {
    None
}

/// Gets the total CPU time (user and system) consumed by this process so far.
#[cfg(not(unix))]
pub fn cpu_time() -> Option<Duration> {
    None
}

/// Gets the host name of this machine.
#[cfg(not(unix))]
pub fn hostname() -> Option<String> {
    None
}

/// A CPU usage querier.
///
/// CPU usage is expressed as a percentage of a single core, calculated from the CPU time consumed by the process
/// between two queries divided by the wall-clock time that elapsed between them. A process saturating two cores will
/// report roughly 200%.
///
/// The first query is measured against the point in time the querier was created.
pub struct CpuQuerier {
    last_cpu_time: Option<Duration>,
    last_instant: Instant,
}

impl CpuQuerier {
    /// Creates a new `CpuQuerier`, capturing the current CPU time as the baseline for the first query.
    pub fn new() -> Self {
        Self {
            last_cpu_time: cpu_time(),
            last_instant: Instant::now(),
        }
    }

    /// Gets the CPU usage of this process since the previous query, as a percentage.
    ///
    /// If the CPU time of the process cannot be determined, `None` is returned, and the baseline is left untouched.
    pub fn cpu_percent(&mut self) -> Option<f64> {
        let now = Instant::now();
        let current_cpu_time = cpu_time()?;

        let percent = match self.last_cpu_time {
            Some(last_cpu_time) => {
                usage_percent(current_cpu_time.saturating_sub(last_cpu_time), now - self.last_instant)
            }
            None => 0.0,
        };

        self.last_cpu_time = Some(current_cpu_time);
        self.last_instant = now;

        Some(percent)
    }
}

impl Default for CpuQuerier {
    fn default() -> Self {
        Self::new()
    }
}

fn usage_percent(cpu_elapsed: Duration, wall_elapsed: Duration) -> f64 {
    let wall_secs = wall_elapsed.as_secs_f64();
    if wall_secs <= 0.0 {
        return 0.0;
    }

    cpu_elapsed.as_secs_f64() / wall_secs * 100.0
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{usage_percent, CpuQuerier};

    #[test]
    fn usage_percent_scales_to_wall_time() {
        assert_eq!(usage_percent(Duration::from_millis(500), Duration::from_secs(1)), 50.0);
        assert_eq!(usage_percent(Duration::from_secs(2), Duration::from_secs(1)), 200.0);
        assert_eq!(usage_percent(Duration::from_secs(1), Duration::ZERO), 0.0);
    }

    #[cfg(unix)]
    #[test]
    fn cpu_percent_is_non_negative() {
        let mut querier = CpuQuerier::new();

        // Burn a little CPU so there's something to measure.
        let mut acc = 0u64;
        for i in 0..1_000_000u64 {
            acc = acc.wrapping_mul(31).wrapping_add(i);
        }
        std::hint::black_box(acc);

        let percent = querier.cpu_percent().expect("CPU time should be available");
        assert!(percent >= 0.0);
    }
}
