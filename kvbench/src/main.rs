//! Load generator for etcd clusters.
//!
//! Spawns a number of workers that write to the cluster for a fixed duration and prints one line
//! per write attempt to stdout. See the library documentation for the output format.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use argh::FromArgs;

use kvbench::config::{Config, ConfigError, Positionals};
use kvbench::summary::print_summary;
use kvbench::{Dispatcher, EtcdConnector, observability};

const USAGE: &str = "Usage: kvbench [-c <config>] <node1 ip> <node2 ip> ... <num_workers> <duration_secs>";

/// Load generator for etcd clusters
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// node addresses, followed by the number of workers and the duration in seconds
    #[argh(positional)]
    args: Vec<String>,
}

fn load_config(args: &Args) -> Result<Config, ConfigError> {
    let positionals = match args.args.as_slice() {
        [] => None,
        positionals => Some(Positionals::parse(positionals)?),
    };
    Config::load(args.config.as_deref(), positionals)
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            eprintln!("{USAGE}");
            process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("kvbench-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing();
    tracing::debug!(?config);

    runtime.block_on(async move {
        let summary = config.summary;
        let workers = config.workers;

        let dispatcher = Dispatcher::new(config, EtcdConnector::new(), io::stdout());
        let report = dispatcher.start().wait().await?;

        if summary {
            print_summary(&report.metrics, workers, report.duration);
        }

        Ok(())
    })
}
