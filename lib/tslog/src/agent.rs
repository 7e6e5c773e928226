//! Agent lifecycle and the enqueue API.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, OnceLock,
    },
    thread,
};

use arc_swap::ArcSwapOption;
use line_protocol::{encode_point, FieldValue, Point};
use metrics::counter;
use snafu::{OptionExt as _, ResultExt as _};
use tracing::{debug, info};

use crate::{
    config::AgentConfiguration,
    error::{Encode, EnqueueError, InstallError, NotInstalled, SpawnThread},
    push::{PushOptions, TransmissionRequest},
    queue::MeasurementQueue,
    sampler::{ProcessSampler, SamplerLoop, SelfSampler},
    time::unix_timestamp_nanos,
    transport::{HttpTransport, Transport, TransportError},
    worker::DispatchWorker,
};

type SamplerFactory = Arc<dyn Fn() -> Box<dyn ProcessSampler> + Send + Sync>;

/// Builder for [`Agent`].
#[derive(Default)]
pub struct AgentBuilder {
    transport: Option<Arc<dyn Transport>>,
    sampler_factory: Option<SamplerFactory>,
}

impl AgentBuilder {
    /// Sets the transport used to deliver measurements.
    ///
    /// Defaults to [`HttpTransport`].
    pub fn with_transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets the transport used to deliver measurements, from a shared reference.
    pub fn with_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the factory used to create a process sampler for each heartbeat sampler that is started.
    ///
    /// Defaults to creating a [`SelfSampler`].
    pub fn with_sampler_factory<F, S>(mut self, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: ProcessSampler + 'static,
    {
        self.sampler_factory = Some(Arc::new(move || Box::new(factory()) as Box<dyn ProcessSampler>));
        self
    }

    /// Builds the agent.
    ///
    /// The agent does nothing until it is installed.
    ///
    /// # Errors
    ///
    /// If no transport was given and the default HTTP transport cannot be created, an error is returned.
    pub fn build(self) -> Result<Agent, TransportError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };
        let sampler_factory = self
            .sampler_factory
            .unwrap_or_else(|| Arc::new(|| Box::new(SelfSampler::new()) as Box<dyn ProcessSampler>));

        Ok(Agent {
            inner: Arc::new(Inner {
                queue: OnceLock::new(),
                default_endpoint: ArcSwapOption::empty(),
                transport,
                sampler_factory,
                next_worker_id: AtomicUsize::new(0),
            }),
        })
    }
}

struct Inner {
    queue: OnceLock<Arc<MeasurementQueue<TransmissionRequest>>>,
    default_endpoint: ArcSwapOption<String>,
    transport: Arc<dyn Transport>,
    sampler_factory: SamplerFactory,
    next_worker_id: AtomicUsize,
}

/// A telemetry agent.
///
/// The agent accepts measurements from any number of threads, queues them, and ships them to an ingestion endpoint
/// from a pool of background dispatch workers. Optionally, a heartbeat sampler reports the CPU and memory usage of the
/// process through the same queue.
///
/// `Agent` is a cheap handle: clones share the same queue and configuration, so it can be handed out freely to any
/// code that needs to push measurements.
///
/// # Installation
///
/// An agent must be [installed][Agent::install] before measurements can be pushed. Installing creates the queue (only
/// the first time), records the default endpoint (every time), and starts the background threads. Background threads
/// are detached and run for the remaining lifetime of the process; they never prevent it from exiting.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<Inner>,
}

impl Agent {
    /// Creates a new `AgentBuilder`.
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    /// Installs the agent with the given configuration.
    ///
    /// - The queue is created with the configured capacity if it does not already exist. Once created, it is never
    ///   replaced, so the capacity given to later installs is ignored.
    /// - The default endpoint is always overwritten. Concurrent installs race on it, and the last one wins.
    /// - If enabled, a heartbeat sampler thread is started.
    /// - `worker_count` dispatch worker threads are started, in addition to any started by earlier installs.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, or a background thread cannot be spawned, an error is returned. Failures that
    /// occur later, inside the background threads, are logged and never propagate.
    pub fn install(&self, config: &AgentConfiguration) -> Result<(), InstallError> {
        config
            .validate()
            .map_err(|reason| InstallError::InvalidConfiguration { reason })?;

        let queue = self.inner.queue.get_or_init(|| {
            debug!(capacity = config.queue_capacity(), "Created measurement queue.");
            Arc::new(MeasurementQueue::with_capacity(config.queue_capacity()))
        });
        if queue.capacity() != config.queue_capacity() {
            debug!(
                capacity = queue.capacity(),
                requested_capacity = config.queue_capacity(),
                "Measurement queue already exists. Ignoring requested capacity."
            );
        }

        self.inner
            .default_endpoint
            .store(Some(Arc::new(config.endpoint().to_string())));

        if config.enable_sampler() {
            let sampler = SamplerLoop::new(
                self.clone(),
                (self.inner.sampler_factory)(),
                config.sample_interval(),
                config.name().to_string(),
                config.host().into_owned(),
            );
            spawn_detached("tslog-sampler".to_string(), move || sampler.run())?;
        }

        for _ in 0..config.worker_count() {
            let worker_id = self.inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
            let worker = DispatchWorker::new(
                worker_id,
                Arc::clone(queue),
                Arc::clone(&self.inner.transport),
                config.dispatch_timeout(),
            );
            spawn_detached(format!("tslog-dispatch-{}", worker_id), move || worker.run())?;
        }

        info!(
            name = config.name(),
            endpoint = config.endpoint(),
            workers = config.worker_count(),
            sampler = config.enable_sampler(),
            "Agent installed."
        );

        Ok(())
    }

    /// Returns the current default endpoint, if the agent has been installed.
    pub fn default_endpoint(&self) -> Option<String> {
        self.inner.default_endpoint.load_full().map(|endpoint| endpoint.to_string())
    }

    /// Returns the number of measurements waiting to be sent.
    pub fn queue_len(&self) -> usize {
        self.inner.queue.get().map_or(0, |queue| queue.len())
    }

    /// Pushes a measurement built from the given name, tags, and fields.
    ///
    /// See [`push_point`][Self::push_point] for details.
    ///
    /// # Errors
    ///
    /// See [`push_point`][Self::push_point].
    pub fn push_measurement<M>(
        &self, measurement: M, tags: BTreeMap<String, String>, fields: BTreeMap<String, FieldValue>,
        options: PushOptions,
    ) -> Result<(), EnqueueError>
    where
        M: Into<String>,
    {
        self.push_point(Point::from_parts(measurement, tags, fields, None), options)
    }

    /// Pushes a point.
    ///
    /// The point is timestamped (with the timestamp given in `options`, the point's own timestamp, or the current time,
    /// in that order of preference), encoded, bound to an endpoint (the one given in `options`, or the default
    /// endpoint), and placed on the queue. A timestamp of zero, or an empty endpoint, counts as not given.
    ///
    /// # Errors
    ///
    /// - [`EnqueueError::NotInstalled`] if the agent has not been installed.
    /// - [`EnqueueError::InvalidArgument`] if the measurement name is empty or no field value is truthy.
    /// - [`EnqueueError::Encode`] if the point cannot be encoded, such as when a float field is not finite.
    /// - [`EnqueueError::QueueFull`] if the queue is full and `options` asked to fail fast rather than block.
    ///
    /// On error, nothing is placed on the queue.
    pub fn push_point(&self, point: Point, options: PushOptions) -> Result<(), EnqueueError> {
        // Capture the time of the call up front, so that time spent waiting on the queue doesn't skew it.
        let now = unix_timestamp_nanos();

        let queue = self.inner.queue.get().context(NotInstalled)?;

        if let Err(e) = validate_point(&point) {
            counter!("tslog_points_rejected_total", "reason" => "invalid").increment(1);
            return Err(e);
        }

        let endpoint = match options.endpoint.filter(|endpoint| !endpoint.is_empty()) {
            Some(endpoint) => Arc::new(endpoint),
            None => self.inner.default_endpoint.load_full().context(NotInstalled)?,
        };

        let timestamp = [options.timestamp, point.timestamp()]
            .into_iter()
            .flatten()
            .find(|timestamp| *timestamp != 0)
            .unwrap_or(now);
        let point = point.with_timestamp(timestamp);
        let payload = encode_point(&point).context(Encode)?;

        let request = TransmissionRequest::new(endpoint, payload);
        if let Err(e) = queue.push(request, options.backpressure) {
            counter!("tslog_points_rejected_total", "reason" => "queue_full").increment(1);
            return Err(EnqueueError::QueueFull {
                capacity: e.capacity(),
            });
        }

        counter!("tslog_points_enqueued_total").increment(1);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pop_request(&self, timeout: std::time::Duration) -> Option<TransmissionRequest> {
        self.inner.queue.get().and_then(|queue| queue.pop(timeout))
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("default_endpoint", &self.default_endpoint())
            .field("queue_len", &self.queue_len())
            .finish_non_exhaustive()
    }
}

fn validate_point(point: &Point) -> Result<(), EnqueueError> {
    if point.measurement().is_empty() {
        return Err(EnqueueError::InvalidArgument {
            measurement: String::new(),
            reason: "measurement name must not be empty",
        });
    }

    if !point.has_truthy_field() {
        return Err(EnqueueError::InvalidArgument {
            measurement: point.measurement().to_string(),
            reason: "at least one field must have a non-empty value",
        });
    }

    Ok(())
}

fn spawn_detached<F>(thread_name: String, f: F) -> Result<(), InstallError>
where
    F: FnOnce() + Send + 'static,
{
    // Dropping the join handle detaches the thread.
    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(f)
        .context(SpawnThread { thread_name })?;

    Ok(())
}
