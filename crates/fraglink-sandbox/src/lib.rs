//! Isolated execution of compiled units.
//!
//! Each execution gets its own QuickJS runtime with a memory ceiling, a
//! stack ceiling and a wall-clock deadline. Guest code sees a small
//! capability surface: a buffered `console`, `require` restricted to a
//! [`ModuleRegistry`] allowlist, and timers on a virtual clock. There is no
//! filesystem, network or process access.

pub mod config;
pub mod error;
pub mod executor;
mod host;
pub mod modules;
pub mod outcome;
pub mod state;

pub use config::SandboxLimits;
pub use error::SandboxError;
pub use executor::SandboxExecutor;
pub use modules::{ModuleRegistry, BUILTIN_MODULES};
pub use outcome::{ExecutionOutcome, ExecutionReport, ExecutionResult};
pub use state::ExecutionPhase;
