//! Enqueue options and transmission requests.

use std::sync::Arc;

use bytes::Bytes;

pub use crate::queue::Backpressure;

/// Options for pushing a measurement.
#[derive(Clone, Debug, Default)]
pub struct PushOptions {
    pub(crate) timestamp: Option<i64>,
    pub(crate) endpoint: Option<String>,
    pub(crate) backpressure: Backpressure,
}

impl PushOptions {
    /// Sets the timestamp of the measurement, in nanoseconds since the Unix epoch.
    ///
    /// Defaults to the time at which the measurement is pushed. A timestamp of zero is treated as unset.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the endpoint the measurement is sent to.
    ///
    /// Defaults to the endpoint the agent was most recently installed with. An empty endpoint is treated as unset.
    pub fn with_endpoint<E>(mut self, endpoint: E) -> Self
    where
        E: Into<String>,
    {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the backpressure policy applied if the queue is full.
    ///
    /// Defaults to [`Backpressure::Block`].
    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    /// Shorthand for failing fast, instead of blocking, when the queue is full.
    pub fn non_blocking(self) -> Self {
        self.with_backpressure(Backpressure::FailFast)
    }
}

/// An encoded measurement, bound to the endpoint it will be sent to.
///
/// Requests are immutable once created, and each is consumed by exactly one dispatch worker.
#[derive(Clone, Debug)]
pub struct TransmissionRequest {
    endpoint: Arc<String>,
    payload: Bytes,
}

impl TransmissionRequest {
    pub(crate) fn new(endpoint: Arc<String>, payload: Bytes) -> Self {
        Self { endpoint, payload }
    }

    /// Returns the endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the encoded payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}
