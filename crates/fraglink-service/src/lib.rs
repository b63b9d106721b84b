//! Execution façade: validates a fragment graph, compiles it for an entry
//! fragment and runs the result in the sandbox.
//!
//! All business logic flows through [`ExecutionService`]. Front ends (the
//! `fraglink` CLI, or an HTTP layer owned by a graph store) stay thin and
//! delegate to it.

pub mod config;
pub mod error;
pub mod schema;
pub mod service;
pub mod telemetry;

pub use config::{ConfigError, ServiceConfig};
pub use error::ServiceError;
pub use schema::ExecutionResponse;
pub use service::ExecutionService;
