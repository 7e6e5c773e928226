//! Error types.

use line_protocol::EncodeError;
use snafu::Snafu;

/// A generic error.
///
/// Used at the edges of the agent, such as in binaries embedding it, where the exact error type matters less than the
/// context attached to it. Context is attached with [`anyhow::Context`].
pub type GenericError = anyhow::Error;

/// An enqueue error.
///
/// These are the only errors a producer will ever see: once a measurement has been accepted into the queue, any
/// failure to deliver it is handled, and logged, by the dispatch workers.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum EnqueueError {
    /// The agent has not been installed yet, so there is no queue to push into.
    #[snafu(display("Agent has not been installed."))]
    NotInstalled,

    /// The measurement was rejected before being encoded.
    #[snafu(display("Invalid measurement '{}': {}", measurement, reason))]
    InvalidArgument {
        /// Name of the rejected measurement.
        measurement: String,

        /// Reason the measurement was rejected.
        reason: &'static str,
    },

    /// The measurement could not be encoded.
    #[snafu(display("Failed to encode measurement."))]
    Encode {
        /// Error source.
        source: EncodeError,
    },

    /// The queue was full and the push was not allowed to wait.
    #[snafu(display("Measurement queue is full (capacity {}).", capacity))]
    QueueFull {
        /// Capacity of the queue.
        capacity: usize,
    },
}

/// An installation error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum InstallError {
    /// The configuration was invalid.
    #[snafu(display("Invalid agent configuration: {}", reason))]
    InvalidConfiguration {
        /// Reason the configuration was rejected.
        reason: String,
    },

    /// A background thread could not be spawned.
    #[snafu(display("Failed to spawn background thread '{}'.", thread_name))]
    SpawnThread {
        /// Name of the thread.
        thread_name: String,

        /// Error source.
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use line_protocol::{encode_point, Point};
    use snafu::ResultExt as _;

    use super::{Encode, EnqueueError, GenericError};

    #[test]
    fn enqueue_errors_carry_their_cause() {
        let err = encode_point(&Point::new("m")).context(Encode).unwrap_err();
        assert_eq!(err.to_string(), "Failed to encode measurement.");

        let err = GenericError::from(err).context("Failed to push heartbeat.");
        assert_eq!(err.to_string(), "Failed to push heartbeat.");
        assert_eq!(err.root_cause().to_string(), "Point for measurement 'm' has no fields.");

        let err = EnqueueError::QueueFull { capacity: 4 };
        assert_eq!(err.to_string(), "Measurement queue is full (capacity 4).");
    }
}
