//! Configuration of a load run.
//!
//! Configuration is merged from the following sources (highest precedence first):
//!
//! 1. Positional command line arguments `<node>... <workers> <duration_secs>`
//! 2. Environment variables (prefixed with `KVBENCH__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! # YAML Configuration File
//!
//! ```yaml
//! nodes: [10.0.0.1, 10.0.0.2, 10.0.0.3]
//! workers: 32
//! duration: 60s
//! request_timeout: 500ms
//! ```
//!
//! The merged configuration is validated once by [`Config::load`]. Everything downstream assumes a
//! valid configuration.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "KVBENCH__";

/// The client-facing port of every etcd member.
pub const DEFAULT_PORT: u16 = 2379;

/// Errors loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file or environment could not be read.
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Fewer positional arguments than `<node> <workers> <duration_secs>`.
    #[error("expected at least one node, the number of workers and the duration")]
    MissingArguments,

    /// The worker count is not a positive integer.
    #[error("invalid number of workers: {0}")]
    InvalidWorkers(String),

    /// The duration is not a positive number of seconds.
    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    /// No node to send requests to.
    #[error("no nodes configured")]
    NoNodes,

    /// The timeouts are zero or the request timeout is not below the connect timeout.
    #[error(
        "request timeout ({request:?}) must be non-zero and shorter than the connect timeout ({connect:?})"
    )]
    InvalidTimeouts {
        /// The configured connect timeout.
        connect: Duration,
        /// The configured request timeout.
        request: Duration,
    },
}

/// The run parameters given on the command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Positionals {
    /// Addresses of the cluster members.
    pub nodes: Vec<String>,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Length of the run.
    pub duration: Duration,
}

impl Positionals {
    /// Parses `<node>... <workers> <duration_secs>`.
    pub fn parse(args: &[String]) -> Result<Self, ConfigError> {
        let [nodes @ .., workers, duration] = args else {
            return Err(ConfigError::MissingArguments);
        };
        if nodes.is_empty() {
            return Err(ConfigError::MissingArguments);
        }

        let workers = workers
            .parse()
            .map_err(|_| ConfigError::InvalidWorkers(workers.clone()))?;
        let duration = duration
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidDuration(duration.clone()))?;

        Ok(Self {
            nodes: nodes.to_vec(),
            workers,
            duration,
        })
    }
}

/// Main configuration struct.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Addresses of the cluster members, with or without scheme and port.
    pub nodes: Vec<String>,

    /// Client port appended to nodes that do not carry one.
    ///
    /// # Default
    ///
    /// `2379`
    pub port: u16,

    /// Number of concurrent workers, each with its own session.
    pub workers: usize,

    /// Length of the run. Workers stop issuing new requests once it elapsed.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Upper bound for establishing a worker's session.
    ///
    /// # Default
    ///
    /// `5s`
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Upper bound for a single write. Must be shorter than `connect_timeout`.
    ///
    /// # Default
    ///
    /// `2s`
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Payload written under every key.
    pub value: String,

    /// Print a summary to stderr after the run.
    pub summary: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            port: DEFAULT_PORT,
            workers: 1,
            duration: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(2),
            value: "always the best".to_owned(),
            summary: true,
        }
    }
}

impl Config {
    /// Loads and validates the configuration.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if `path` is given)
    /// 3. Environment variables (prefixed with `KVBENCH__`)
    /// 4. Positional arguments (if given)
    pub fn load(
        path: Option<&Path>,
        positionals: Option<Positionals>,
    ) -> Result<Self, ConfigError> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file_exact(path));
        }
        let mut config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        if let Some(positionals) = positionals {
            config.nodes = positionals.nodes;
            config.workers = positionals.workers;
            config.duration = positionals.duration;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers(self.workers.to_string()));
        }
        if self.duration.is_zero() {
            return Err(ConfigError::InvalidDuration(format!("{:?}", self.duration)));
        }
        if self.connect_timeout.is_zero()
            || self.request_timeout.is_zero()
            || self.request_timeout >= self.connect_timeout
        {
            return Err(ConfigError::InvalidTimeouts {
                connect: self.connect_timeout,
                request: self.request_timeout,
            });
        }
        Ok(())
    }

    /// Returns the connectable address of every node, in configuration order.
    pub fn endpoints(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|node| endpoint(node, self.port))
            .collect()
    }
}

/// Builds `scheme://host:port` from a node address.
fn endpoint(node: &str, port: u16) -> String {
    let (scheme, host) = node.split_once("://").unwrap_or(("http", node));
    let host = host.trim_end_matches('/');

    if let Some(bracketed) = host.strip_prefix('[') {
        // IPv6 literal, with a port if anything follows the closing bracket.
        return if bracketed.contains("]:") {
            format!("{scheme}://{host}")
        } else {
            format!("{scheme}://{host}:{port}")
        };
    }

    match host.matches(':').count() {
        0 => format!("{scheme}://{host}:{port}"),
        1 => format!("{scheme}://{host}"),
        _ => format!("{scheme}://[{host}]:{port}"),
    }
}
