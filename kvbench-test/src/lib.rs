//! Test utilities for kvbench.
//!
//! This crate provides utilities to facilitate testing of kvbench against something that behaves
//! like an etcd cluster. See the modules for all available utilities.

pub mod server;
pub mod tracing;
