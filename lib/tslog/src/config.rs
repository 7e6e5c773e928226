//! Agent configuration.

use std::{borrow::Cow, path::Path, time::Duration};

use figment::{
    error::Kind,
    providers::{Env, Format as _, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use snafu::{ResultExt as _, Snafu};
use tracing::debug;

use crate::queue::DEFAULT_QUEUE_CAPACITY;

/// Default ingestion endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8086/write?db=spiders";

const FALLBACK_HOST: &str = "unknown";

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

const fn default_sample_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

const fn default_worker_count() -> usize {
    1
}

const fn default_enable_sampler() -> bool {
    true
}

const fn default_dispatch_timeout() -> Duration {
    Duration::from_secs(1)
}

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// Configuration file could not be read.
    #[snafu(display("Failed to read configuration file '{}'.", path))]
    ReadFile {
        /// Path to the configuration file.
        path: String,

        /// Error source.
        source: std::io::Error,
    },

    /// Requested field was missing from the configuration.
    #[snafu(display("Missing field '{}' in configuration.", field))]
    MissingField {
        /// Name of the missing field.
        field: Cow<'static, str>,
    },

    /// Field's data type was not the expected data type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Name of the invalid field.
        ///
        /// This is a period-separated path to the field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to load configuration."))]
    Generic {
        /// Error source.
        source: figment::Error,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        match e.kind {
            Kind::MissingField(field) => Self::MissingField { field },
            Kind::InvalidType(actual_ty, expected_ty) => Self::InvalidFieldType {
                field: e.path.join("."),
                expected_ty,
                actual_ty: actual_ty.to_string(),
            },
            _ => Self::Generic { source: e },
        }
    }
}

/// A configuration loader that can pull from various sources.
///
/// Sources take precedence in the order they are added: values from sources added later override values from sources
/// added earlier.
///
/// # Supported sources
///
/// - YAML file
/// - environment variables (must be prefixed; see [`from_environment`][Self::from_environment])
/// - individual values set programmatically, such as from command-line flags
#[derive(Default)]
pub struct ConfigurationLoader {
    figment: Figment,
}

impl ConfigurationLoader {
    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, an error will be returned. Invalid YAML is reported when the configuration is
    /// extracted.
    pub fn from_yaml<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file_data = std::fs::read_to_string(path).context(ReadFile {
            path: path.to_string_lossy(),
        })?;

        self.figment = self.figment.merge(Yaml::string(&file_data));
        Ok(self)
    }

    /// Attempts to load the given YAML configuration file, ignoring it if it cannot be read.
    pub fn try_from_yaml<P>(self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        if let Ok(file_data) = std::fs::read_to_string(path) {
            return Self {
                figment: self.figment.merge(Yaml::string(&file_data)),
            };
        }

        debug!(file_path = %path.to_string_lossy(), "Unable to read YAML configuration file. Ignoring.");
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// The prefix given will have an underscore appended to it if it does not already end with one. For example, with a
    /// prefix of `tslog`, any environment variable starting with `TSLOG_` would be matched, and `TSLOG_WORKER_COUNT`
    /// would set `worker_count`.
    ///
    /// The prefix is case-insensitive.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, an error will be returned.
    pub fn from_environment(mut self, prefix: &str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = if prefix.ends_with('_') {
            prefix.to_string()
        } else {
            format!("{}_", prefix)
        };

        self.figment = self.figment.merge(Env::prefixed(&prefix));
        Ok(self)
    }

    /// Sets a single configuration value, overriding any value loaded so far.
    pub fn with_value<V>(mut self, key: &str, value: V) -> Self
    where
        V: Serialize,
    {
        self.figment = self.figment.merge(Serialized::default(key, value));
        self
    }

    /// Consumes the configuration loader, deserializing it as `T`.
    ///
    /// # Errors
    ///
    /// If the configuration could not be deserialized into `T`, an error will be returned.
    pub fn into_typed<T>(self) -> Result<T, ConfigurationError>
    where
        T: DeserializeOwned,
    {
        self.figment.extract().map_err(Into::into)
    }
}

/// Agent configuration.
///
/// Only `name` is required. Durations are expressed in (possibly fractional) seconds.
#[derive(Clone, Debug, Deserialize)]
pub struct AgentConfiguration {
    /// Unique name of the monitored process, reported as the `spider-name` tag on heartbeats.
    name: String,

    /// Host name reported as the `host` tag on heartbeats.
    ///
    /// Defaults to the host name of this machine.
    #[serde(default)]
    host: Option<String>,

    /// Default ingestion endpoint that measurements are sent to.
    ///
    /// Defaults to `http://127.0.0.1:8086/write?db=spiders`.
    #[serde(default = "default_endpoint")]
    endpoint: String,

    /// Interval between heartbeat samples.
    ///
    /// Defaults to 1 second.
    #[serde(
        default = "default_sample_interval",
        rename = "sample_interval",
        deserialize_with = "deserialize_secs"
    )]
    sample_interval: Duration,

    /// Maximum number of measurements waiting to be sent.
    ///
    /// Only takes effect on the first installation of an agent. Defaults to 4096.
    #[serde(default = "default_queue_capacity")]
    queue_capacity: usize,

    /// Number of dispatch workers to start.
    ///
    /// Defaults to 1.
    #[serde(default = "default_worker_count")]
    worker_count: usize,

    /// Whether or not to start the heartbeat sampler.
    ///
    /// Defaults to `true`.
    #[serde(default = "default_enable_sampler")]
    enable_sampler: bool,

    /// How long a dispatch worker waits for a measurement before polling again, and how long it waits for the
    /// ingestion endpoint to respond.
    ///
    /// Defaults to 1 second.
    #[serde(
        default = "default_dispatch_timeout",
        rename = "dispatch_timeout",
        deserialize_with = "deserialize_secs"
    )]
    dispatch_timeout: Duration,
}

impl AgentConfiguration {
    /// Creates a new `AgentConfiguration` with the given name and default values for everything else.
    pub fn new<N>(name: N) -> Self
    where
        N: Into<String>,
    {
        Self {
            name: name.into(),
            host: None,
            endpoint: default_endpoint(),
            sample_interval: default_sample_interval(),
            queue_capacity: default_queue_capacity(),
            worker_count: default_worker_count(),
            enable_sampler: default_enable_sampler(),
            dispatch_timeout: default_dispatch_timeout(),
        }
    }

    /// Loads the configuration from the given loader.
    ///
    /// # Errors
    ///
    /// If the configuration could not be deserialized, such as when `name` is missing, an error will be returned.
    pub fn from_loader(loader: ConfigurationLoader) -> Result<Self, ConfigurationError> {
        loader.into_typed()
    }

    /// Sets the host name.
    pub fn with_host<H>(mut self, host: H) -> Self
    where
        H: Into<String>,
    {
        self.host = Some(host.into());
        self
    }

    /// Sets the default endpoint.
    pub fn with_endpoint<E>(mut self, endpoint: E) -> Self
    where
        E: Into<String>,
    {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the interval between heartbeat samples.
    pub fn with_sample_interval(mut self, sample_interval: Duration) -> Self {
        self.sample_interval = sample_interval;
        self
    }

    /// Sets the queue capacity.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Sets the number of dispatch workers.
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Enables or disables the heartbeat sampler.
    pub fn with_sampler(mut self, enable_sampler: bool) -> Self {
        self.enable_sampler = enable_sampler;
        self
    }

    /// Sets the dispatch timeout.
    pub fn with_dispatch_timeout(mut self, dispatch_timeout: Duration) -> Self {
        self.dispatch_timeout = dispatch_timeout;
        self
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the host name, falling back to the host name of this machine, or `unknown` if that can't be determined.
    pub fn host(&self) -> Cow<'_, str> {
        match &self.host {
            Some(host) => Cow::Borrowed(host.as_str()),
            None => Cow::Owned(process_stats::hostname().unwrap_or_else(|| FALLBACK_HOST.to_string())),
        }
    }

    /// Returns the default endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the interval between heartbeat samples.
    pub const fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Returns the queue capacity.
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Returns the number of dispatch workers.
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Returns `true` if the heartbeat sampler is enabled.
    pub const fn enable_sampler(&self) -> bool {
        self.enable_sampler
    }

    /// Returns the dispatch timeout.
    pub const fn dispatch_timeout(&self) -> Duration {
        self.dispatch_timeout
    }

    /// Checks the configuration for values the agent cannot run with.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value found.
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("queue capacity must be at least 1".to_string());
        }

        if self.enable_sampler && self.sample_interval.is_zero() {
            return Err("sample interval must be non-zero".to_string());
        }

        if self.dispatch_timeout.is_zero() {
            return Err("dispatch timeout must be non-zero".to_string());
        }

        if let Err(e) = reqwest::Url::parse(&self.endpoint) {
            return Err(format!("endpoint '{}' is not a valid URL ({})", self.endpoint, e));
        }

        Ok(())
    }
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
