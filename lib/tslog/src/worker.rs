//! Dispatch workers.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use metrics::counter;
use tracing::{debug, error, trace, warn};

use crate::{push::TransmissionRequest, queue::MeasurementQueue, transport::Transport};

/// Outcome of a single dispatch attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum DispatchOutcome {
    /// No request arrived before the timeout.
    Idle,

    /// The request was accepted by the endpoint.
    Delivered,

    /// The endpoint responded, but with a non-success status.
    Rejected,

    /// The request could not be sent at all.
    Failed,
}

/// Drains the measurement queue, sending each request through the transport.
///
/// Delivery is best-effort: a request that is rejected, or that fails to send, is logged and dropped. There are no
/// retries.
pub(crate) struct DispatchWorker {
    id: usize,
    queue: Arc<MeasurementQueue<TransmissionRequest>>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl DispatchWorker {
    pub(crate) fn new(
        id: usize, queue: Arc<MeasurementQueue<TransmissionRequest>>, transport: Arc<dyn Transport>, timeout: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            transport,
            timeout,
        }
    }

    /// Runs the worker forever.
    pub(crate) fn run(self) {
        debug!(worker_id = self.id, "Dispatch worker started.");

        loop {
            self.run_once();
        }
    }

    /// Waits for, and dispatches, a single request.
    pub(crate) fn run_once(&self) -> DispatchOutcome {
        let request = match self.queue.pop(self.timeout) {
            Some(request) => request,
            None => {
                trace!(worker_id = self.id, "No pending requests.");
                return DispatchOutcome::Idle;
            }
        };

        self.dispatch(request)
    }

    fn dispatch(&self, request: TransmissionRequest) -> DispatchOutcome {
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.transport
                .post(request.endpoint(), request.payload().clone(), self.timeout)
        }));

        match result {
            Ok(Ok(response)) if response.is_success() => {
                counter!("tslog_requests_sent_total").increment(1);
                DispatchOutcome::Delivered
            }
            Ok(Ok(response)) => {
                counter!("tslog_requests_failed_total", "reason" => "rejected").increment(1);
                warn!(
                    worker_id = self.id,
                    endpoint = request.endpoint(),
                    status = %response.status(),
                    headers = ?response.headers(),
                    "Ingestion endpoint rejected payload. Dropping."
                );
                DispatchOutcome::Rejected
            }
            Ok(Err(e)) => {
                counter!("tslog_requests_failed_total", "reason" => "transport").increment(1);
                error!(
                    worker_id = self.id,
                    endpoint = request.endpoint(),
                    error = %e,
                    "Failed to send payload. Dropping."
                );
                DispatchOutcome::Failed
            }
            Err(_) => {
                counter!("tslog_requests_failed_total", "reason" => "panic").increment(1);
                error!(
                    worker_id = self.id,
                    endpoint = request.endpoint(),
                    "Transport panicked while sending payload. Dropping."
                );
                DispatchOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};

    use super::*;
    use crate::{
        push::TransmissionRequest,
        queue::Backpressure,
        transport::{TransportError, TransportResponse},
    };

    /// Transport that answers requests according to a script, recording every payload it is given.
    struct ScriptedTransport {
        calls: AtomicUsize,
        payloads: Mutex<Vec<Bytes>>,
        timeouts: Mutex<Vec<Duration>>,
        script: fn(usize) -> Result<TransportResponse, TransportError>,
    }

    impl ScriptedTransport {
        fn new(script: fn(usize) -> Result<TransportResponse, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                payloads: Mutex::new(Vec::new()),
                timeouts: Mutex::new(Vec::new()),
                script,
            })
        }
    }

    impl Transport for ScriptedTransport {
        fn post(&self, _endpoint: &str, payload: Bytes, timeout: Duration) -> Result<TransportResponse, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.payloads.lock().unwrap().push(payload);
            self.timeouts.lock().unwrap().push(timeout);
            (self.script)(call)
        }
    }

    const WORKER_TIMEOUT: Duration = Duration::from_millis(20);

    fn request(payload: &'static [u8]) -> TransmissionRequest {
        TransmissionRequest::new(
            Arc::new("http://127.0.0.1:8086/write?db=spiders".to_string()),
            Bytes::from_static(payload),
        )
    }

    fn worker(transport: Arc<dyn Transport>) -> (DispatchWorker, Arc<MeasurementQueue<TransmissionRequest>>) {
        let queue = Arc::new(MeasurementQueue::with_capacity(8));
        let worker = DispatchWorker::new(0, Arc::clone(&queue), transport, WORKER_TIMEOUT);
        (worker, queue)
    }

    #[test]
    fn idle_when_queue_empty() {
        let transport = ScriptedTransport::new(|_| Ok(TransportResponse::new(StatusCode::NO_CONTENT, HeaderMap::new())));
        let (worker, _queue) = worker(transport.clone());

        assert_eq!(worker.run_once(), DispatchOutcome::Idle);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn keeps_going_after_failures() {
        // First request is rejected, second fails outright, third panics, fourth succeeds.
        let transport = ScriptedTransport::new(|call| match call {
            0 => Ok(TransportResponse::new(StatusCode::BAD_REQUEST, HeaderMap::new())),
            1 => Err(TransportError::Custom {
                message: "connection reset".to_string(),
            }),
            2 => panic!("transport exploded"),
            _ => Ok(TransportResponse::new(StatusCode::NO_CONTENT, HeaderMap::new())),
        });
        let (worker, queue) = worker(transport.clone());

        for payload in [&b"a v=1i\n"[..], b"b v=1i\n", b"c v=1i\n", b"d v=1i\n"] {
            queue.push(request(payload), Backpressure::FailFast).unwrap();
        }

        assert_eq!(worker.run_once(), DispatchOutcome::Rejected);
        assert_eq!(worker.run_once(), DispatchOutcome::Failed);
        assert_eq!(worker.run_once(), DispatchOutcome::Failed);
        assert_eq!(worker.run_once(), DispatchOutcome::Delivered);
        assert_eq!(worker.run_once(), DispatchOutcome::Idle);

        // Nothing is retried or requeued.
        assert!(queue.is_empty());
        let payloads = transport.payloads.lock().unwrap();
        assert_eq!(
            *payloads,
            vec![
                Bytes::from_static(b"a v=1i\n"),
                Bytes::from_static(b"b v=1i\n"),
                Bytes::from_static(b"c v=1i\n"),
                Bytes::from_static(b"d v=1i\n"),
            ]
        );
    }

    #[test]
    fn transport_gets_worker_timeout() {
        let transport = ScriptedTransport::new(|_| Ok(TransportResponse::new(StatusCode::NO_CONTENT, HeaderMap::new())));
        let (worker, queue) = worker(transport.clone());

        queue.push(request(b"a v=1i\n"), Backpressure::FailFast).unwrap();
        queue.push(request(b"b v=1i\n"), Backpressure::FailFast).unwrap();
        assert_eq!(worker.run_once(), DispatchOutcome::Delivered);
        assert_eq!(worker.run_once(), DispatchOutcome::Delivered);

        assert_eq!(*transport.timeouts.lock().unwrap(), vec![WORKER_TIMEOUT, WORKER_TIMEOUT]);
    }
}
