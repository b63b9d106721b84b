//! Execution lifecycle.
//!
//! Every execution moves through
//! `Created -> ContextAllocated -> Running -> <terminal> -> Disposed`.
//! The terminal phase is one of `Completed`, `TimedOut`, `MemoryExceeded`
//! or `Threw`. `Disposed` is recorded when the isolate is dropped, so it is
//! present on every path, including early failures.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

/// One phase of an execution's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Created,
    ContextAllocated,
    Running,
    Completed,
    TimedOut,
    MemoryExceeded,
    Threw,
    Disposed,
}

impl ExecutionPhase {
    /// Whether this phase ends the running portion of an execution.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionPhase::Completed
                | ExecutionPhase::TimedOut
                | ExecutionPhase::MemoryExceeded
                | ExecutionPhase::Threw
        )
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionPhase::Created => "created",
            ExecutionPhase::ContextAllocated => "context_allocated",
            ExecutionPhase::Running => "running",
            ExecutionPhase::Completed => "completed",
            ExecutionPhase::TimedOut => "timed_out",
            ExecutionPhase::MemoryExceeded => "memory_exceeded",
            ExecutionPhase::Threw => "threw",
            ExecutionPhase::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Ordered record of the phases an execution passed through.
///
/// Shared between the executor and the isolate so the isolate's `Drop` can
/// append `Disposed` after the outcome has been decided.
#[derive(Debug, Clone, Default)]
pub(crate) struct PhaseLog(Rc<RefCell<Vec<ExecutionPhase>>>);

impl PhaseLog {
    pub(crate) fn new() -> Self {
        let log = Self::default();
        log.enter(ExecutionPhase::Created);
        log
    }

    pub(crate) fn enter(&self, phase: ExecutionPhase) {
        tracing::debug!(%phase, "execution phase");
        self.0.borrow_mut().push(phase);
    }

    pub(crate) fn last(&self) -> Option<ExecutionPhase> {
        self.0.borrow().last().copied()
    }

    pub(crate) fn snapshot(&self) -> Vec<ExecutionPhase> {
        self.0.borrow().clone()
    }

    /// Closes the log: records `Threw` if no terminal phase was reached, then
    /// `Disposed`. Calling it again is a no-op.
    pub(crate) fn dispose(&self) {
        match self.last() {
            Some(ExecutionPhase::Disposed) => return,
            Some(phase) if phase.is_terminal() => {}
            _ => self.enter(ExecutionPhase::Threw),
        }
        self.enter(ExecutionPhase::Disposed);
    }
}
