//! A load generator for etcd clusters.
//!
//! A run spawns a fixed number of [`Worker`](worker::Worker)s. Each worker opens its own session
//! against the cluster and writes keys as fast as the cluster acknowledges them until the run
//! duration elapsed. Every attempt is timed against a clock shared by all workers and reported as
//! one line through the [`ResultSink`](sink::ResultSink):
//!
//! ```text
//! REQUEST: 2026/10/16 12:00:00 <worker> <seq> <submitted_us> <completed_us> <latency_us>
//! REQUEST: 2026/10/16 12:00:00 Error: worker <worker> failed to commit request <seq>
//! REQUEST: 2026/10/16 12:00:00 Error: worker <worker> failed to connect to cluster
//! Main: Completed
//! ```
//!
//! The cluster is reached through a [`Connector`](remote::Connector). [`EtcdConnector`] talks to
//! etcd's JSON gateway, any other implementation can be plugged into the [`Dispatcher`].
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod clock;
pub mod config;
pub mod dispatcher;
#[allow(missing_docs)]
pub mod observability;
pub mod record;
pub mod remote;
pub mod sink;
pub mod summary;
pub mod worker;

pub use crate::config::Config;
pub use crate::dispatcher::{Dispatcher, RunHandle, RunReport};
pub use crate::remote::EtcdConnector;
