//! Courier - inter-service request gateway
//!
//! Accepts a single action-tagged submission, validates it, and dispatches it
//! to exactly one downstream channel (auth, log, broker publish, mail) under a
//! single deadline. Every external dependency is acquired through a bounded
//! retry bootstrap and released in reverse order on shutdown.

pub mod adapters;
pub mod config;
pub mod connector;
pub mod deadline;
pub mod dispatch;
pub mod envelope;
pub mod lifecycle;
#[cfg(feature = "amqp")]
pub mod listener;
pub mod server;
pub mod submission;
pub mod utils;
