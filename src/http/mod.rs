//! HTTP client module for the broker management API
//!
//! Provides the message publisher used as the batch task executor.

mod client;

pub use client::{
    publish_body, HealthReport, HttpError, RabbitClient, DEFAULT_AUTH, DEFAULT_EXCHANGE,
    DEFAULT_HOST,
};
