//! Heartbeat sampling.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    thread,
    time::{Duration, Instant},
};

use line_protocol::Point;
use metrics::counter;
use snafu::{OptionExt as _, ResultExt as _, Snafu};
use tracing::{debug, error, info};

use crate::{
    agent::Agent,
    error::EnqueueError,
    push::{Backpressure, PushOptions},
};

/// Measurement name of heartbeat points.
pub const HEARTBEAT_MEASUREMENT: &str = "heartbeat";

/// A sampling error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum SampleError {
    /// The CPU usage of the process could not be determined.
    #[snafu(display("Failed to query CPU usage of the process."))]
    CpuUsageUnavailable,

    /// The memory usage of the process could not be determined.
    #[snafu(display("Failed to query memory usage of the process."))]
    MemoryUsageUnavailable,
}

/// A single sample of process resource usage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessSample {
    /// CPU usage since the previous sample, as a percentage of a single core.
    pub cpu_percent: f64,

    /// Resident memory, in bytes.
    pub mem_usage: u64,
}

/// A process sampler.
///
/// Sampling must not block for any significant amount of time: the sampler loop drives the pacing between samples.
pub trait ProcessSampler: Send {
    /// Takes a sample of the current resource usage.
    ///
    /// # Errors
    ///
    /// If the resource usage cannot be determined, an error is returned.
    fn sample(&mut self) -> Result<ProcessSample, SampleError>;
}

/// Samples the resource usage of the current process.
pub struct SelfSampler {
    cpu: process_stats::CpuQuerier,
}

impl SelfSampler {
    /// Creates a new `SelfSampler`.
    ///
    /// CPU usage reported by the first sample is measured from the moment the sampler is created.
    pub fn new() -> Self {
        Self {
            cpu: process_stats::CpuQuerier::new(),
        }
    }
}

impl Default for SelfSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler for SelfSampler {
    fn sample(&mut self) -> Result<ProcessSample, SampleError> {
        let cpu_percent = self.cpu.cpu_percent().context(CpuUsageUnavailable)?;
        let mem_usage = process_stats::resident_set_size().context(MemoryUsageUnavailable)?;

        Ok(ProcessSample {
            cpu_percent,
            mem_usage: mem_usage as u64,
        })
    }
}

#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
enum TickError {
    #[snafu(display("Failed to sample process usage: {}", source))]
    Sample { source: SampleError },

    #[snafu(display("Failed to enqueue heartbeat: {}", source))]
    Enqueue { source: EnqueueError },
}

/// Periodically samples process usage and enqueues it as a heartbeat point.
pub(crate) struct SamplerLoop {
    agent: Agent,
    sampler: Box<dyn ProcessSampler>,
    interval: Duration,
    name: String,
    host: String,
}

impl SamplerLoop {
    pub(crate) fn new(
        agent: Agent, sampler: Box<dyn ProcessSampler>, interval: Duration, name: String, host: String,
    ) -> Self {
        Self {
            agent,
            sampler,
            interval,
            name,
            host,
        }
    }

    /// Runs the loop forever.
    ///
    /// Ticks are scheduled at fixed deadlines, so the time spent sampling and enqueueing does not skew the period. If
    /// a tick runs so late that the next deadline has already passed (e.g. when the queue is full and enqueueing
    /// blocks), the schedule is reset rather than firing a burst of catch-up ticks.
    pub(crate) fn run(mut self) {
        debug!(interval = ?self.interval, name = %self.name, host = %self.host, "Heartbeat sampler started.");

        let mut next_tick = Instant::now() + self.interval;
        loop {
            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            }

            let result = catch_unwind(AssertUnwindSafe(|| self.tick()));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Heartbeat tick failed."),
                Err(_) => error!("Heartbeat sampler panicked. Skipping tick."),
            }

            next_tick += self.interval;
            let now = Instant::now();
            if next_tick < now {
                next_tick = now + self.interval;
            }
        }
    }

    fn tick(&mut self) -> Result<(), TickError> {
        let sample = self.sampler.sample().context(Sample)?;
        counter!("tslog_samples_total").increment(1);

        info!(
            pid = std::process::id(),
            name = %self.name,
            host = %self.host,
            cpu_percent = sample.cpu_percent,
            mem_usage = sample.mem_usage,
            "Sampled process usage."
        );

        let point = heartbeat_point(&self.name, &self.host, &sample);
        self.agent
            .push_point(point, PushOptions::default().with_backpressure(Backpressure::Block))
            .context(Enqueue)
    }
}

fn heartbeat_point(name: &str, host: &str, sample: &ProcessSample) -> Point {
    Point::new(HEARTBEAT_MEASUREMENT)
        .with_tag("spider-name", name)
        .with_tag("host", host)
        .with_field("cpu_percent", sample.cpu_percent)
        .with_field("mem_usage", sample.mem_usage)
}
