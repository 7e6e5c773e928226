//! Demonstration binary for the `tslog` agent.
//!
//! Installs the agent, with its heartbeat sampler, and then pushes a synthetic `responses` measurement every second,
//! the way a crawler would report the outcome of each request it makes.

#![deny(warnings)]
#![deny(missing_docs)]
use std::{path::PathBuf, thread, time::Duration};

use anyhow::Context as _;
use clap::Parser as _;
use tracing::{error, info, warn};
use tslog::{
    Agent, AgentConfiguration, ConfigurationLoader, EnqueueError, GenericError, Point, PushOptions,
};

mod logging;
use self::logging::initialize_logging;

/// Pushes synthetic measurements through the `tslog` agent.
#[derive(clap::Parser)]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Name of the monitored process.
    ///
    /// Overrides any name given in the configuration file or environment. Defaults to `test` if no name is given at all.
    #[arg(short = 'n', long = "name")]
    name: Option<String>,

    /// Ingestion endpoint to send measurements to.
    #[arg(short = 'e', long = "endpoint")]
    endpoint: Option<String>,

    /// Number of dispatch workers to start.
    #[arg(short = 'w', long = "workers")]
    workers: Option<usize>,

    /// Disables the heartbeat sampler.
    #[arg(long = "no-sampler")]
    no_sampler: bool,

    /// Interval between pushed measurements, in seconds.
    #[arg(short = 'i', long = "interval", default_value_t = 1.0)]
    interval: f64,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging() {
        eprintln!("FATAL: failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli) {
        error!("{:?}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), GenericError> {
    let config = load_configuration(&cli)?;
    let interval = Duration::try_from_secs_f64(cli.interval).context("Invalid push interval.")?;

    let agent = Agent::builder().build().context("Failed to create agent.")?;
    agent.install(&config).context("Failed to install agent.")?;

    info!(name = config.name(), "Pushing a measurement every {:?}.", interval);

    loop {
        let point = Point::new("responses")
            .with_tag("status_code", "222")
            .with_tag("spider-name", config.name())
            .with_field("reason", "HTTP OK")
            .with_field("cost", 12.3);

        match agent.push_point(point, PushOptions::default()) {
            Ok(()) => {}
            Err(e @ EnqueueError::QueueFull { .. }) => warn!(error = %e, "Dropped measurement."),
            Err(e) => return Err(e).context("Failed to push measurement."),
        }

        thread::sleep(interval);
    }
}

const DEFAULT_NAME: &str = "test";

fn load_configuration(cli: &Cli) -> Result<AgentConfiguration, GenericError> {
    let mut loader = ConfigurationLoader::default().with_value("name", DEFAULT_NAME);
    if let Some(path) = &cli.config {
        loader = loader
            .from_yaml(path)
            .with_context(|| format!("Failed to load configuration from '{}'.", path.display()))?;
    }
    loader = loader.from_environment("TSLOG")?;

    if let Some(name) = &cli.name {
        loader = loader.with_value("name", name);
    }
    if let Some(endpoint) = &cli.endpoint {
        loader = loader.with_value("endpoint", endpoint);
    }
    if let Some(workers) = cli.workers {
        loader = loader.with_value("worker_count", workers);
    }
    if cli.no_sampler {
        loader = loader.with_value("enable_sampler", false);
    }

    AgentConfiguration::from_loader(loader).context("Failed to load agent configuration.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(file_name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), file_name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn load(args: &[&str]) -> AgentConfiguration {
        let cli = Cli::try_parse_from(std::iter::once("tslog-demo").chain(args.iter().copied())).unwrap();
        load_configuration(&cli).unwrap()
    }

    #[test]
    fn name_precedence() {
        let path = write_config("tslog-demo-name.yaml", "name: from-file\nworker_count: 3\n");
        let path_arg = path.to_str().unwrap();

        // An explicit flag beats the file, which beats the built-in default.
        assert_eq!(load(&["-c", path_arg, "-n", "from-cli"]).name(), "from-cli");
        assert_eq!(load(&["-c", path_arg]).name(), "from-file");
        assert_eq!(load(&[]).name(), DEFAULT_NAME);

        let config = load(&["-c", path_arg, "-w", "5", "--no-sampler"]);
        assert_eq!(config.worker_count(), 5);
        assert!(!config.enable_sampler());

        std::fs::remove_file(path).unwrap();
    }
}
