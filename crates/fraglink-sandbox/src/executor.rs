//! One-shot QuickJS isolates.
//!
//! Every call to [`SandboxExecutor::execute`] builds a fresh runtime and
//! context, installs the capability surface, launches the unit and pumps the
//! job queue and virtual timers until nothing is left to run or the deadline
//! passes. The isolate is dropped before the report is returned.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Function, Runtime};

use crate::config::SandboxLimits;
use crate::error::SandboxError;
use crate::host::{host_object, rejection_tracker, HostState, Settlement, SharedState};
use crate::modules::ModuleRegistry;
use crate::outcome::{ExecutionOutcome, ExecutionReport};
use crate::state::{ExecutionPhase, PhaseLog};

const BOOTSTRAP: &str = include_str!("bootstrap.js");
const TICK: &str = "__fl_tick";
const OUT_OF_MEMORY: &str = "out of memory";

/// Runs compiled units in isolated, resource-bounded contexts.
///
/// The executor is cheap to clone and holds no per-execution state, so one
/// instance can serve any number of threads.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    limits: SandboxLimits,
    modules: Arc<ModuleRegistry>,
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self::new(SandboxLimits::default())
    }
}

impl SandboxExecutor {
    /// An executor that allows the built-in modules only.
    pub fn new(limits: SandboxLimits) -> Self {
        Self::with_modules(limits, ModuleRegistry::with_builtins())
    }

    pub fn with_modules(limits: SandboxLimits, modules: ModuleRegistry) -> Self {
        Self {
            limits,
            modules: Arc::new(modules),
        }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Runs `unit` to completion, failure or timeout.
    ///
    /// Never panics and never fails: host-side problems are reported as
    /// [`ExecutionOutcome::Internal`].
    pub fn execute(&self, unit: &str) -> ExecutionReport {
        let started = Instant::now();
        let phases = PhaseLog::new();
        let state: SharedState =
            Rc::new(RefCell::new(HostState::new(self.limits.max_output_bytes)));

        tracing::debug!(unit_bytes = unit.len(), "starting sandboxed execution");

        let run = panic::catch_unwind(AssertUnwindSafe(|| self.run(unit, &phases, &state)));
        let outcome = match run {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => {
                tracing::warn!(%error, "sandbox setup failed");
                ExecutionOutcome::Internal {
                    error: format!("InternalError: {error}"),
                }
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::warn!(%reason, "sandbox host panicked");
                ExecutionOutcome::Internal {
                    error: format!("InternalError: sandbox host panicked: {reason}"),
                }
            }
        };
        phases.dispose();

        let HostState {
            stdout,
            mut stderr,
            settlement,
            ..
        } = state.replace(HostState::new(0));

        if !outcome.is_success() {
            let mut text = outcome.message();
            if let (
                ExecutionOutcome::Threw { .. } | ExecutionOutcome::CapabilityDenied { .. },
                Some(Settlement::Rejected { stack, .. }),
            ) = (&outcome, &settlement)
            {
                let stack = stack.trim_end();
                if !stack.is_empty() {
                    text.push('\n');
                    text.push_str(stack);
                }
            }
            stderr.push_unbounded(&text);
            stderr.push_unbounded("\n");
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(
            status = outcome.error_code().unwrap_or("OK"),
            elapsed_ms,
            truncated = stdout.is_truncated(),
            "sandboxed execution finished"
        );

        ExecutionReport {
            outcome,
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            phases: phases.snapshot(),
            elapsed_ms,
        }
    }

    fn run(
        &self,
        unit: &str,
        phases: &PhaseLog,
        state: &SharedState,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let isolate = Isolate::new(&self.limits, phases, state)?;
        let outcome = isolate.drive(unit, state, &self.modules, &self.limits);
        phases.enter(outcome.terminal_phase());
        Ok(outcome)
    }
}

/// Closes the phase log once the engine fields ahead of it are freed.
struct DisposalGuard(PhaseLog);

impl Drop for DisposalGuard {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

/// A live runtime and context. Field order matters: the context and runtime
/// are freed before the guard records `Disposed`.
struct Isolate {
    context: Context,
    runtime: Runtime,
    interrupted: Arc<AtomicBool>,
    deadline: Option<Instant>,
    phases: PhaseLog,
    _disposal: DisposalGuard,
}

/// Why the guest never got going.
#[derive(Debug)]
enum StartFailure {
    /// The bootstrap itself failed; a host problem.
    Bootstrap(String),
    /// Launching the unit raised before any handler was attached.
    Launch { message: String, allocation: bool },
}

#[derive(Debug, Default)]
struct PumpEnd {
    timed_out: bool,
    uncaught: Option<String>,
    /// Heap usage was within 10% of the limit when pumping stopped.
    near_memory_limit: bool,
}

impl Isolate {
    fn new(
        limits: &SandboxLimits,
        phases: &PhaseLog,
        state: &SharedState,
    ) -> Result<Self, SandboxError> {
        let runtime =
            Runtime::new().map_err(|e| SandboxError::RuntimeAllocation(e.to_string()))?;
        runtime.set_max_stack_size(limits.stack_ceiling());
        let context =
            Context::full(&runtime).map_err(|e| SandboxError::ContextAllocation(e.to_string()))?;
        runtime.set_memory_limit(limits.memory_ceiling());
        runtime.set_host_promise_rejection_tracker(Some(rejection_tracker(state)));

        let deadline = Instant::now().checked_add(limits.timeout);
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || {
            let expired = deadline.is_some_and(|d| Instant::now() >= d);
            if expired {
                flag.store(true, Ordering::Relaxed);
            }
            expired
        })));

        phases.enter(ExecutionPhase::ContextAllocated);
        Ok(Self {
            context,
            runtime,
            interrupted,
            deadline,
            phases: phases.clone(),
            _disposal: DisposalGuard(phases.clone()),
        })
    }

    fn expired(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn drive(
        &self,
        unit: &str,
        state: &SharedState,
        modules: &Arc<ModuleRegistry>,
        limits: &SandboxLimits,
    ) -> ExecutionOutcome {
        self.phases.enter(ExecutionPhase::Running);

        let started = self.start(unit, state, modules);
        let mut end = match started {
            Ok(()) => self.pump(),
            Err(_) => PumpEnd {
                timed_out: self.expired(),
                ..PumpEnd::default()
            },
        };
        if end.uncaught.is_none() {
            end.uncaught = state.borrow().unhandled.first().map(str::to_owned);
        }
        end.near_memory_limit = self.near_memory_limit(limits.memory_ceiling());

        let settlement = state.borrow().settlement.clone();
        classify(limits, end, started, settlement)
    }

    /// Installs the host surface and launches the unit.
    fn start(
        &self,
        unit: &str,
        state: &SharedState,
        modules: &Arc<ModuleRegistry>,
    ) -> Result<(), StartFailure> {
        self.context.with(|ctx| {
            let launch = install(&ctx, state, modules)
                .catch(&ctx)
                .map_err(|caught| StartFailure::Bootstrap(caught.to_string()))?;

            launch
                .call::<_, ()>((unit,))
                .catch(&ctx)
                .map_err(|caught| StartFailure::Launch {
                    allocation: matches!(caught, CaughtError::Error(rquickjs::Error::Allocation)),
                    message: caught.to_string(),
                })
        })
    }

    /// Drains jobs, then fires timers one at a time, until both are empty.
    fn pump(&self) -> PumpEnd {
        let mut end = PumpEnd::default();
        loop {
            if self.expired() {
                end.timed_out = true;
                return end;
            }
            match self.runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => match self.fire_timer() {
                    Ok(true) => continue,
                    Ok(false) => return end,
                    Err(message) => {
                        end.timed_out = self.expired();
                        end.uncaught.get_or_insert(message);
                        return end;
                    }
                },
                Err(_) => {
                    if self.expired() {
                        end.timed_out = true;
                        return end;
                    }
                    let message = self.context.with(|ctx| pending_exception(&ctx));
                    tracing::debug!(%message, "uncaught exception in job");
                    end.uncaught.get_or_insert(message);
                }
            }
        }
    }

    fn near_memory_limit(&self, limit: usize) -> bool {
        let used = self.runtime.memory_usage().malloc_size as u64;
        used.saturating_mul(10) >= (limit as u64).saturating_mul(9)
    }

    fn fire_timer(&self) -> Result<bool, String> {
        self.context.with(|ctx| {
            ctx.globals()
                .get::<_, Function>(TICK)
                .and_then(|tick| tick.call::<_, bool>(()))
                .catch(&ctx)
                .map_err(|caught| caught.to_string())
        })
    }
}

/// Evaluates the bootstrap and hands it the host object; returns the
/// launch function.
fn install<'js>(
    ctx: &Ctx<'js>,
    state: &SharedState,
    modules: &Arc<ModuleRegistry>,
) -> rquickjs::Result<Function<'js>> {
    let host = host_object(ctx, state, modules)?;
    let installer: Function = ctx.eval(BOOTSTRAP)?;
    installer.call((host,))
}

fn pending_exception(ctx: &Ctx<'_>) -> String {
    CaughtError::from_error(ctx, rquickjs::Error::Exception).to_string()
}

fn mentions_oom(text: &str) -> bool {
    text.contains(OUT_OF_MEMORY)
}

/// Decides the outcome from everything the run left behind.
///
/// A timeout wins over everything else, since later failures are usually
/// the interrupt surfacing through guest code.
fn classify(
    limits: &SandboxLimits,
    end: PumpEnd,
    started: Result<(), StartFailure>,
    settlement: Option<Settlement>,
) -> ExecutionOutcome {
    let memory_exceeded = ExecutionOutcome::MemoryExceeded {
        limit_bytes: limits.memory_ceiling(),
    };

    if end.timed_out {
        return ExecutionOutcome::TimedOut {
            limit_ms: limits.timeout_ms(),
        };
    }

    match started {
        Err(StartFailure::Bootstrap(message)) => {
            // Under a tiny ceiling the engine may not even manage to build
            // the out-of-memory error.
            if mentions_oom(&message) || end.near_memory_limit {
                return memory_exceeded;
            }
            return ExecutionOutcome::Internal {
                error: format!("InternalError: sandbox bootstrap failed: {message}"),
            };
        }
        Err(StartFailure::Launch {
            message,
            allocation,
        }) => {
            if allocation || mentions_oom(&message) {
                return memory_exceeded;
            }
            return ExecutionOutcome::Threw { error: message };
        }
        Ok(()) => {}
    }

    match settlement {
        Some(Settlement::Fulfilled { value }) => match end.uncaught {
            Some(error) if mentions_oom(&error) => memory_exceeded,
            Some(error) => ExecutionOutcome::Threw { error },
            None => ExecutionOutcome::Completed { value },
        },
        Some(Settlement::Rejected { kind, message, .. }) => {
            if kind == "InternalError" && mentions_oom(&message) {
                memory_exceeded
            } else if kind == "CapabilityError" {
                ExecutionOutcome::CapabilityDenied { error: message }
            } else {
                ExecutionOutcome::Threw { error: message }
            }
        }
        None => match end.uncaught {
            Some(error) if mentions_oom(&error) => memory_exceeded,
            Some(error) => ExecutionOutcome::Threw { error },
            // The rejection handler itself could not allocate.
            None if end.near_memory_limit => memory_exceeded,
            None => ExecutionOutcome::Threw {
                error: "Error: execution ended before the unit settled".to_string(),
            },
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(kind: &str, message: &str) -> Option<Settlement> {
        Some(Settlement::Rejected {
            kind: kind.into(),
            message: message.into(),
            stack: String::new(),
        })
    }

    #[test]
    fn timeout_wins_over_settlement() {
        let limits = SandboxLimits::testing();
        let end = PumpEnd {
            timed_out: true,
            ..PumpEnd::default()
        };
        let outcome = classify(&limits, end, Ok(()), rejected("InternalError", "interrupted"));
        assert_eq!(outcome, ExecutionOutcome::TimedOut { limit_ms: 1000 });
    }

    #[test]
    fn capability_errors_are_distinguished() {
        let outcome = classify(
            &SandboxLimits::testing(),
            PumpEnd::default(),
            Ok(()),
            rejected("CapabilityError", "CapabilityError: module 'fs' is not available"),
        );
        assert!(matches!(outcome, ExecutionOutcome::CapabilityDenied { .. }));
    }

    #[test]
    fn out_of_memory_rejection_is_a_memory_outcome() {
        let limits = SandboxLimits::testing();
        let outcome = classify(
            &limits,
            PumpEnd::default(),
            Ok(()),
            rejected("InternalError", "InternalError: out of memory"),
        );
        assert_eq!(
            outcome,
            ExecutionOutcome::MemoryExceeded {
                limit_bytes: limits.memory_limit
            }
        );
    }

    #[test]
    fn user_error_mentioning_memory_is_still_a_throw() {
        let outcome = classify(
            &SandboxLimits::testing(),
            PumpEnd::default(),
            Ok(()),
            rejected("Error", "Error: out of memory"),
        );
        assert!(matches!(outcome, ExecutionOutcome::Threw { .. }));
    }

    #[test]
    fn allocation_failure_at_launch_is_a_memory_outcome() {
        let outcome = classify(
            &SandboxLimits::testing(),
            PumpEnd::default(),
            Err(StartFailure::Launch {
                message: "Allocation failed".into(),
                allocation: true,
            }),
            None,
        );
        assert!(matches!(outcome, ExecutionOutcome::MemoryExceeded { .. }));
    }

    #[test]
    fn bootstrap_failure_is_internal() {
        let outcome = classify(
            &SandboxLimits::testing(),
            PumpEnd::default(),
            Err(StartFailure::Bootstrap("SyntaxError: nope".into())),
            None,
        );
        assert_eq!(outcome.error_code(), Some("INTERNAL_ERROR"));
    }

    #[test]
    fn bootstrap_failure_at_the_memory_ceiling_is_a_memory_outcome() {
        let limits = SandboxLimits::testing().with_memory_limit(0);
        let end = PumpEnd {
            near_memory_limit: true,
            ..PumpEnd::default()
        };
        let outcome = classify(
            &limits,
            end,
            Err(StartFailure::Bootstrap("null".into())),
            None,
        );
        assert_eq!(outcome, ExecutionOutcome::MemoryExceeded { limit_bytes: 1 });
    }

    #[test]
    fn missing_settlement_is_a_throw() {
        let outcome = classify(&SandboxLimits::testing(), PumpEnd::default(), Ok(()), None);
        assert!(outcome.message().contains("before the unit settled"));
    }

    #[test]
    fn silent_end_under_memory_pressure_is_a_memory_outcome() {
        let end = PumpEnd {
            near_memory_limit: true,
            ..PumpEnd::default()
        };
        let outcome = classify(&SandboxLimits::testing(), end, Ok(()), None);
        assert!(matches!(outcome, ExecutionOutcome::MemoryExceeded { .. }));
    }

    #[test]
    fn uncaught_job_error_fails_a_fulfilled_unit() {
        let end = PumpEnd {
            uncaught: Some("TypeError: boom".into()),
            ..PumpEnd::default()
        };
        let outcome = classify(
            &SandboxLimits::testing(),
            end,
            Ok(()),
            Some(Settlement::Fulfilled { value: "1".into() }),
        );
        assert_eq!(
            outcome,
            ExecutionOutcome::Threw {
                error: "TypeError: boom".into()
            }
        );
    }

    #[test]
    fn panic_payloads_are_described() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
