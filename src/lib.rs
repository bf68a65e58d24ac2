//! mqprobe - batch message test runner for the RabbitMQ management API
//!
//! The [`executor`] module holds the engine: a bounded-concurrency worker
//! pool, a registry of executions, per-execution result aggregation and a
//! log bus fanning progress events out to live subscribers. The rest of the
//! crate stores message test cases, publishes them over HTTP and renders
//! the results.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod models;
pub mod output;
pub mod store;
pub mod utils;

pub use error::{EngineError, EngineResult};
