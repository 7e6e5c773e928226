//! Payload transport.

use std::time::Duration;

use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode};
use snafu::{ResultExt as _, Snafu};

const LINE_PROTOCOL_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// A transport error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum TransportError {
    /// The HTTP client could not be built.
    #[snafu(display("Failed to build HTTP client."))]
    BuildClient {
        /// Error source.
        source: reqwest::Error,
    },

    /// The request could not be sent, or no response was received before the timeout.
    #[snafu(display("Failed to send request to '{}'.", endpoint))]
    SendRequest {
        /// Endpoint the request was sent to.
        endpoint: String,

        /// Error source.
        source: reqwest::Error,
    },

    /// A custom transport failed.
    #[snafu(display("Transport failed: {}", message))]
    Custom {
        /// Description of the failure.
        message: String,
    },
}

/// The response to a transmitted payload.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    status: StatusCode,
    headers: HeaderMap,
}

impl TransportResponse {
    /// Creates a new `TransportResponse` from the given status code and response headers.
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    ///
    /// Ingestion endpoints generally describe why a write was rejected in the headers (InfluxDB uses
    /// `X-Influxdb-Error`), so these are what gets logged when a payload is rejected.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns `true` if the payload was accepted.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// A payload transport.
///
/// Transports deliver a single encoded payload to an endpoint, blocking the calling thread until a response is
/// received or the timeout elapses.
pub trait Transport: Send + Sync {
    /// Sends the payload to the given endpoint.
    ///
    /// A response with a non-success status is not an error: it is returned as-is so that the caller can log its
    /// diagnostics.
    ///
    /// # Errors
    ///
    /// If the payload could not be sent, or no response was received before `timeout` elapsed, an error is returned.
    fn post(&self, endpoint: &str, payload: Bytes, timeout: Duration) -> Result<TransportResponse, TransportError>;
}

/// HTTP transport.
///
/// POSTs payloads to the endpoint URL as `text/plain` line protocol.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Creates a new `HttpTransport`.
    ///
    /// # Errors
    ///
    /// If the underlying HTTP client cannot be built, such as when the TLS backend fails to initialize, an error is
    /// returned.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("tslog/", env!("CARGO_PKG_VERSION")))
            .build()
            .context(BuildClient)?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post(&self, endpoint: &str, payload: Bytes, timeout: Duration) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static(LINE_PROTOCOL_CONTENT_TYPE))
            .timeout(timeout)
            .body(payload)
            .send()
            .context(SendRequest { endpoint })?;

        Ok(TransportResponse::new(response.status(), response.headers().clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead as _, BufReader, Read as _, Write as _},
        net::TcpListener,
        sync::mpsc,
        thread,
        time::Duration,
    };

    use bytes::Bytes;
    use http::StatusCode;

    use super::{HttpTransport, Transport as _, TransportError};

    struct CapturedRequest {
        request_line: String,
        headers: Vec<String>,
        body: Vec<u8>,
    }

    /// Spawns a single-shot HTTP server on a loopback port that captures the first request it receives and answers it
    /// with the given raw response.
    fn spawn_server(response: &'static str) -> (String, mpsc::Receiver<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();

            let mut headers = Vec::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end().to_string();
                if line.is_empty() {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                headers.push(line);
            }

            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();

            let mut stream = stream;
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();

            tx.send(CapturedRequest {
                request_line: request_line.trim_end().to_string(),
                headers,
                body,
            })
            .unwrap();
        });

        (format!("http://{}/write?db=spiders", addr), rx)
    }

    #[test]
    fn posts_line_protocol() {
        let (endpoint, requests) =
            spawn_server("HTTP/1.1 204 No Content\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");

        let transport = HttpTransport::new().unwrap();
        let payload = Bytes::from_static(b"heartbeat cpu_percent=1.5 1\n");
        let response = transport
            .post(&endpoint, payload.clone(), Duration::from_secs(5))
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let request = requests.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(request.request_line, "POST /write?db=spiders HTTP/1.1");
        assert!(request
            .headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case("content-type: text/plain; charset=utf-8")));
        assert_eq!(request.body, payload.to_vec());
    }

    #[test]
    fn rejected_payload_returns_diagnostics() {
        let (endpoint, _requests) = spawn_server(
            "HTTP/1.1 400 Bad Request\r\nX-Influxdb-Error: unable to parse\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );

        let transport = HttpTransport::new().unwrap();
        let response = transport
            .post(&endpoint, Bytes::from_static(b"bogus\n"), Duration::from_secs(5))
            .unwrap();

        assert!(!response.is_success());
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["x-influxdb-error"], "unable to parse");
    }

    #[test]
    fn unreachable_endpoint_is_an_error() {
        // Bind and immediately drop a listener to find a port that nothing is listening on.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let endpoint = format!("http://127.0.0.1:{}/write", port);

        let transport = HttpTransport::new().unwrap();
        let err = transport
            .post(&endpoint, Bytes::from_static(b"m v=1i\n"), Duration::from_secs(1))
            .unwrap_err();

        assert!(matches!(err, TransportError::SendRequest { endpoint: e, .. } if *e == endpoint));
    }
}
