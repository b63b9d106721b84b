//! Host capabilities handed to the bootstrap script.
//!
//! The guest sees none of this directly. The bootstrap receives a host
//! object once, keeps private references to its functions and drops it, so
//! the only way guest code reaches the host is through `console`,
//! `require` and the final settlement of the unit. Promise rejections that
//! nothing handles are reported to the host by the runtime, not the guest.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use rquickjs::runtime::RejectionTracker;
use rquickjs::{Coerced, Ctx, Function, Object, Value};

use crate::modules::ModuleRegistry;

pub(crate) const TRUNCATION_MARKER: &str = "\n[output truncated]\n";

const STDERR: i32 = 2;

/// Captured text for one output stream, capped at a byte budget.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutputBuffer {
    text: String,
    limit: usize,
    truncated: bool,
}

impl OutputBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    /// Appends `chunk`, keeping at most `limit` bytes of guest output.
    /// The first overflow appends a marker; later writes are dropped.
    pub(crate) fn push(&mut self, chunk: &str) {
        if self.truncated {
            return;
        }
        let room = self.limit.saturating_sub(self.text.len());
        if chunk.len() <= room {
            self.text.push_str(chunk);
            return;
        }
        let mut cut = room;
        while !chunk.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&chunk[..cut]);
        self.text.push_str(TRUNCATION_MARKER);
        self.truncated = true;
    }

    /// Appends host-generated text, bypassing the guest budget.
    pub(crate) fn push_unbounded(&mut self, chunk: &str) {
        self.text.push_str(chunk);
    }

    pub(crate) fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub(crate) fn into_string(self) -> String {
        self.text
    }
}

/// How the unit's top-level promise settled, as reported by the bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Settlement {
    Fulfilled {
        value: String,
    },
    Rejected {
        kind: String,
        message: String,
        stack: String,
    },
}

impl Settlement {
    pub(crate) fn is_rejected(&self) -> bool {
        matches!(self, Settlement::Rejected { .. })
    }
}

/// Rejected promises without a handler, oldest first.
///
/// Promises are keyed by identity. A promise that gets a handler later is
/// removed again, so only rejections still unhandled when the run goes idle
/// fail it.
#[derive(Debug, Default)]
pub(crate) struct UnhandledRejections {
    pending: Vec<(u64, String)>,
}

impl UnhandledRejections {
    pub(crate) fn rejected(&mut self, promise: u64, message: String) {
        self.pending.push((promise, message));
    }

    pub(crate) fn handled(&mut self, promise: u64) {
        if let Some(index) = self.pending.iter().rposition(|(key, _)| *key == promise) {
            self.pending.remove(index);
        }
    }

    pub(crate) fn first(&self) -> Option<&str> {
        self.pending.first().map(|(_, message)| message.as_str())
    }
}

/// Mutable state shared between the host functions and the executor.
#[derive(Debug)]
pub(crate) struct HostState {
    pub(crate) stdout: OutputBuffer,
    pub(crate) stderr: OutputBuffer,
    pub(crate) settlement: Option<Settlement>,
    pub(crate) unhandled: UnhandledRejections,
}

impl HostState {
    pub(crate) fn new(max_output_bytes: usize) -> Self {
        Self {
            stdout: OutputBuffer::new(max_output_bytes),
            stderr: OutputBuffer::new(max_output_bytes),
            settlement: None,
            unhandled: UnhandledRejections::default(),
        }
    }

    pub(crate) fn write(&mut self, stream: i32, text: &str) {
        if stream == STDERR {
            self.stderr.push(text);
        } else {
            self.stdout.push(text);
        }
    }

    /// Records a settlement. The first rejection wins: an error raised from
    /// a timer after the unit resolved still fails the execution, and a late
    /// success never masks an earlier failure.
    pub(crate) fn settle(&mut self, settlement: Settlement) {
        if self
            .settlement
            .as_ref()
            .is_some_and(Settlement::is_rejected)
        {
            return;
        }
        self.settlement = Some(settlement);
    }
}

pub(crate) type SharedState = Rc<RefCell<HostState>>;

/// Builds the host object passed to the bootstrap's install function.
pub(crate) fn host_object<'js>(
    ctx: &Ctx<'js>,
    state: &SharedState,
    modules: &Arc<ModuleRegistry>,
) -> rquickjs::Result<Object<'js>> {
    let host = Object::new(ctx.clone())?;

    let writer = state.clone();
    host.set(
        "write",
        Function::new(ctx.clone(), move |stream: i32, text: String| {
            writer.borrow_mut().write(stream, &text);
        })?,
    )?;

    let registry = modules.clone();
    host.set(
        "load",
        Function::new(ctx.clone(), move |name: String| -> Option<String> {
            let source = registry.source(&name).map(str::to_owned);
            if source.is_none() {
                tracing::debug!(module = %name, "denied module request");
            }
            source
        })?,
    )?;

    let settler = state.clone();
    host.set(
        "settle",
        Function::new(
            ctx.clone(),
            move |ok: bool, kind: String, message: String, stack: String| {
                let settlement = if ok {
                    Settlement::Fulfilled { value: message }
                } else {
                    Settlement::Rejected {
                        kind,
                        message,
                        stack,
                    }
                };
                settler.borrow_mut().settle(settlement);
            },
        )?,
    )?;

    Ok(host)
}

/// Builds the runtime's promise rejection tracker, feeding `state.unhandled`.
pub(crate) fn rejection_tracker(state: &SharedState) -> RejectionTracker {
    let state = state.clone();
    Box::new(
        move |_ctx: Ctx<'_>, promise: Value<'_>, reason: Value<'_>, is_handled: bool| {
            let key = identity(&promise);
            if is_handled {
                state.borrow_mut().unhandled.handled(key);
            } else {
                let message = describe_rejection(&reason);
                tracing::debug!(%message, "unhandled promise rejection");
                state.borrow_mut().unhandled.rejected(key, message);
            }
        },
    )
}

fn identity(value: &Value<'_>) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// `Name: message` for errors, `Uncaught <value>` for anything else.
fn describe_rejection(reason: &Value<'_>) -> String {
    if let Some(error) = reason.as_exception() {
        let name = error
            .get::<_, Option<Coerced<String>>>("name")
            .ok()
            .flatten()
            .map(|name| name.0)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Error".to_string());
        return match error.message().filter(|message| !message.is_empty()) {
            Some(message) => format!("{name}: {message}"),
            None => name,
        };
    }
    let shown = reason
        .get::<Coerced<String>>()
        .map(|shown| shown.0)
        .unwrap_or_else(|_| "value".to_string());
    format!("Uncaught {shown}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_within_budget_is_kept_verbatim() {
        let mut buffer = OutputBuffer::new(16);
        buffer.push("hello\n");
        buffer.push("world\n");
        assert!(!buffer.is_truncated());
        assert_eq!(buffer.into_string(), "hello\nworld\n");
    }

    #[test]
    fn overflow_is_marked_once() {
        let mut buffer = OutputBuffer::new(4);
        buffer.push("abcdef");
        buffer.push("ghi");
        assert!(buffer.is_truncated());
        assert_eq!(buffer.into_string(), format!("abcd{TRUNCATION_MARKER}"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut buffer = OutputBuffer::new(2);
        buffer.push("é!");
        assert_eq!(buffer.into_string(), format!("é{TRUNCATION_MARKER}"));
    }

    #[test]
    fn first_rejection_is_kept() {
        let mut state = HostState::new(64);
        state.settle(Settlement::Rejected {
            kind: "Error".into(),
            message: "Error: first".into(),
            stack: String::new(),
        });
        state.settle(Settlement::Fulfilled { value: "ok".into() });
        state.settle(Settlement::Rejected {
            kind: "Error".into(),
            message: "Error: second".into(),
            stack: String::new(),
        });
        assert!(matches!(
            state.settlement,
            Some(Settlement::Rejected { ref message, .. }) if message == "Error: first"
        ));
    }

    #[test]
    fn a_late_rejection_overrides_success() {
        let mut state = HostState::new(64);
        state.settle(Settlement::Fulfilled { value: "ok".into() });
        state.settle(Settlement::Rejected {
            kind: "TypeError".into(),
            message: "TypeError: late".into(),
            stack: String::new(),
        });
        assert!(state.settlement.as_ref().is_some_and(Settlement::is_rejected));
    }

    #[test]
    fn streams_are_routed() {
        let mut state = HostState::new(64);
        state.write(1, "out");
        state.write(2, "err");
        assert_eq!(state.stdout.into_string(), "out");
        assert_eq!(state.stderr.into_string(), "err");
    }

    #[test]
    fn handled_rejections_are_forgotten() {
        let mut unhandled = UnhandledRejections::default();
        unhandled.rejected(1, "Error: one".into());
        unhandled.rejected(2, "Error: two".into());
        unhandled.handled(1);
        assert_eq!(unhandled.first(), Some("Error: two"));
        unhandled.handled(2);
        unhandled.handled(3);
        assert_eq!(unhandled.first(), None);
    }
}
