//! Configuration loading for the freegpt gateway.
//!
//! Uses figment to layer built-in defaults, an optional YAML file, and the
//! process environment.

pub mod schema;

pub use schema::{Config, LogConfig, UpstreamConfig};
