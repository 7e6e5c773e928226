//! An embeddable telemetry agent.
//!
//! `tslog` accepts time-series measurements from any thread of the host process, queues them in a bounded queue, and
//! ships them to an InfluxDB-compatible ingestion endpoint, encoded as line protocol, from a pool of background dispatch
//! workers. It can also report a periodic heartbeat with the CPU and memory usage of the process.
//!
//! Producers only ever see errors about the measurements they push: delivery happens in the background, on a
//! best-effort basis, and failures there are logged rather than reported.
#![deny(missing_docs)]

mod agent;
pub use self::agent::{Agent, AgentBuilder};

mod config;
pub use self::config::{AgentConfiguration, ConfigurationError, ConfigurationLoader, DEFAULT_ENDPOINT};

mod error;
pub use self::error::{EnqueueError, GenericError, InstallError};

mod push;
pub use self::push::{Backpressure, PushOptions, TransmissionRequest};

mod queue;
pub use self::queue::{MeasurementQueue, QueueFull, DEFAULT_QUEUE_CAPACITY};

mod sampler;
pub use self::sampler::{ProcessSample, ProcessSampler, SampleError, SelfSampler, HEARTBEAT_MEASUREMENT};

mod time;
pub use self::time::unix_timestamp_nanos;

mod transport;
pub use self::transport::{HttpTransport, Transport, TransportError, TransportResponse};

mod worker;

pub use line_protocol::{FieldValue, Point};
