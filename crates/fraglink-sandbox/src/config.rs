//! Resource limits applied to every execution.

use std::time::Duration;

/// Limits for a single sandboxed execution.
///
/// Each execution gets a fresh runtime configured with these values; nothing
/// carries over between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Wall-clock budget, measured from context allocation.
    pub timeout: Duration,
    /// Heap ceiling for the runtime, in bytes. Zero allows no allocation.
    pub memory_limit: usize,
    /// Native stack ceiling for the interpreter, in bytes. Zero allows no
    /// calls.
    pub max_stack_size: usize,
    /// Cap on captured stdout and stderr, each, in bytes.
    pub max_output_bytes: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            memory_limit: 64 * 1024 * 1024,
            max_stack_size: 512 * 1024,
            max_output_bytes: 1024 * 1024,
        }
    }
}

impl SandboxLimits {
    /// Tighter limits for tests.
    pub fn testing() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            memory_limit: 32 * 1024 * 1024,
            max_stack_size: 256 * 1024,
            max_output_bytes: 64 * 1024,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = bytes;
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// The heap ceiling handed to the engine. QuickJS reads 0 as "no
    /// limit", so a zero limit becomes the smallest real one.
    pub fn memory_ceiling(&self) -> usize {
        self.memory_limit.max(1)
    }

    /// The stack ceiling handed to the engine; 0 is raised the same way.
    pub fn stack_ceiling(&self) -> usize {
        self.max_stack_size.max(1)
    }

    /// The timeout in whole milliseconds, as reported in outcomes.
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}
