//! Repeat-N execution of a single command with per-call failure isolation.
//!
//! Each call is turned into an [`Invocation`] whether the action returned an
//! error or panicked. The first failure ends the dispatch: the remaining
//! repeats are skipped, a notice is written, and the caller carries on.

use std::any::Any;
use std::cell::Cell;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

/// How an action signalled failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The action returned `Err`.
    Error,
    /// The action panicked.
    Panic,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Error => f.write_str("error"),
            FailureKind::Panic => f.write_str("panic"),
        }
    }
}

/// A captured action failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    /// Message plus cause chain (and backtrace, when captured).
    pub description: String,
}

/// Result of calling an action once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Completed,
    Failed(Failure),
}

/// Summary of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub requested: u64,
    /// Calls made, the failing one included.
    pub attempted: u64,
    pub failure: Option<Failure>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs actions against an output stream.
pub struct ExecutionDriver<'w, W: Write> {
    out: &'w mut W,
}

impl<'w, W: Write> ExecutionDriver<'w, W> {
    pub fn new(out: &'w mut W) -> Self {
        Self { out }
    }

    /// Calls `action` up to `repeat` times, stopping at the first failure.
    ///
    /// The action receives the output stream so builtins can write to it.
    /// Only writing the failure notice can return an error.
    pub fn run<F>(&mut self, name: &str, repeat: u64, mut action: F) -> io::Result<Outcome>
    where
        F: FnMut(&mut W) -> anyhow::Result<()>,
    {
        let mut attempted = 0;
        let mut failure = None;

        while attempted < repeat {
            attempted += 1;
            if let Invocation::Failed(f) = invoke(&mut action, &mut *self.out) {
                failure = Some(f);
                break;
            }
        }

        if let Some(ref f) = failure {
            debug!("{}: {} on call {} of {}", name, f.kind, attempted, repeat);
            writeln!(self.out, "Exception caused!")?;
            writeln!(self.out, "{}: {}", f.kind, f.description)?;
        } else {
            debug!("{}: {} calls completed", name, attempted);
        }

        Ok(Outcome {
            requested: repeat,
            attempted,
            failure,
        })
    }
}

thread_local! {
    static IN_ACTION: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is inside an action run by [`invoke`].
///
/// Panic hooks use this to tell a caught action panic from a real crash.
pub fn in_action() -> bool {
    IN_ACTION.with(Cell::get)
}

/// Calls `action` once, converting an `Err` or a panic into a tagged result.
pub fn invoke<W, F>(action: &mut F, out: &mut W) -> Invocation
where
    F: FnMut(&mut W) -> anyhow::Result<()>,
{
    let outer = IN_ACTION.with(|flag| flag.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(|| action(out)));
    IN_ACTION.with(|flag| flag.set(outer));

    match result {
        Ok(Ok(())) => Invocation::Completed,
        Ok(Err(e)) => Invocation::Failed(Failure {
            kind: FailureKind::Error,
            description: format!("{:?}", e),
        }),
        Err(payload) => Invocation::Failed(Failure {
            kind: FailureKind::Panic,
            description: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};
    use std::cell::Cell;

    #[test]
    fn test_runs_exactly_repeat_times() {
        let calls = Cell::new(0);
        let mut out = Vec::new();
        let outcome = ExecutionDriver::new(&mut out)
            .run("probe", 7, |_| {
                calls.set(calls.get() + 1);
                Ok(())
            })
            .unwrap();

        assert_eq!(calls.get(), 7);
        assert_eq!(outcome.attempted, 7);
        assert!(outcome.is_success());
        assert!(out.is_empty());
    }

    #[test]
    fn test_failure_on_second_of_five_stops_repeats() {
        let calls = Cell::new(0);
        let mut out = Vec::new();
        let outcome = ExecutionDriver::new(&mut out)
            .run("flaky", 5, |_| {
                calls.set(calls.get() + 1);
                if calls.get() == 2 {
                    return Err(anyhow!("connection reset"));
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(calls.get(), 2);
        assert_eq!(outcome.requested, 5);
        assert_eq!(outcome.attempted, 2);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Error);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Exception caused!").count(), 1);
        assert!(text.contains("error: connection reset"));
    }

    #[test]
    fn test_panic_is_isolated() {
        let calls = Cell::new(0);
        let mut out = Vec::new();
        let outcome = ExecutionDriver::new(&mut out)
            .run("boom", 3, |_| {
                calls.set(calls.get() + 1);
                panic!("result freed twice");
            })
            .unwrap();

        assert_eq!(calls.get(), 1);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Panic);
        assert_eq!(failure.description, "result freed twice");

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Exception caused!\npanic: result freed twice\n"));
    }

    #[test]
    fn test_error_description_includes_cause_chain() {
        let mut out = Vec::new();
        let outcome = ExecutionDriver::new(&mut out)
            .run("chain", 1, |_| {
                Err(anyhow!("socket closed")).context("fetching rows")
            })
            .unwrap();

        let description = outcome.failure.unwrap().description;
        assert!(description.starts_with("fetching rows"));
        assert!(description.contains("Caused by:"));
        assert!(description.contains("socket closed"));
    }

    #[test]
    fn test_action_can_write_to_output() {
        let mut out = Vec::new();
        ExecutionDriver::new(&mut out)
            .run("echo", 2, |w: &mut Vec<u8>| {
                writeln!(w, "hi")?;
                Ok(())
            })
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "hi\nhi\n");
    }

    #[test]
    fn test_invoke_tags_results() {
        let mut out = Vec::new();
        assert_eq!(
            invoke(&mut |_: &mut Vec<u8>| -> anyhow::Result<()> { Ok(()) }, &mut out),
            Invocation::Completed
        );
        let failed = invoke(
            &mut |_: &mut Vec<u8>| -> anyhow::Result<()> { std::panic::panic_any(17_u32) },
            &mut out,
        );
        assert_eq!(
            failed,
            Invocation::Failed(Failure {
                kind: FailureKind::Panic,
                description: "non-string panic payload".to_string(),
            })
        );
    }

    #[test]
    fn test_in_action_marks_only_the_call() {
        let mut out = Vec::new();
        assert!(!in_action());

        let seen = Cell::new(false);
        invoke(
            &mut |_: &mut Vec<u8>| -> anyhow::Result<()> {
                seen.set(in_action());
                Ok(())
            },
            &mut out,
        );
        assert!(seen.get());
        assert!(!in_action());

        invoke(
            &mut |_: &mut Vec<u8>| -> anyhow::Result<()> { panic!("boom") },
            &mut out,
        );
        assert!(!in_action());
    }
}
