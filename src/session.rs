//! The interactive loop: read a line, dispatch it, report memory.
//!
//! ```text
//! start ──► welcome, gc, baseline report
//!   │
//!   ▼
//! AwaitingLine ──line──► Dispatching ──► report (unless help) ──┐
//!   ▲  │                                                        │
//!   │  ├─ empty line ─► re-prompt                               │
//!   │  ├─ unknown ────► notice + help listing                   │
//!   └──┴────────────────────────────────────────────────────────┘
//!      │
//!      ├─ quit ───────────► SessionExit::Quit (no final report)
//!      └─ interrupt / eof ─► final report ─► Closed
//! ```

use std::cell::OnceCell;
use std::io::{self, Write};

use tracing::{debug, info};

use crate::driver::ExecutionDriver;
use crate::input::{InputEvent, LineSource};
use crate::registry::{Action, Builtin, CommandRegistry};
use crate::sampler::{MemorySampler, MemorySnapshot, render_report};

/// Prompt shown before every line.
pub const PROMPT: &str = "mlf> ";

const WELCOME: &str = "Welcome to the memory leaks finder!\nType 'help' for options.\n";

/// One input line split into command and repeat count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub command_name: String,
    pub repeat_count: u64,
}

impl ParsedLine {
    /// Parses `<command> [count]`.
    ///
    /// The count takes the leading integer of the second token (`"3x"` is 3);
    /// missing, non-numeric, or non-positive counts become 1. Tokens after
    /// the second are ignored.
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        let command_name = tokens.next().unwrap_or("").to_string();
        let repeat_count = tokens
            .next()
            .and_then(parse_leading_int)
            .filter(|&n| n > 0)
            .map_or(1, |n| n as u64);
        Self {
            command_name,
            repeat_count,
        }
    }
}

/// Parses an optionally signed run of leading digits, saturating on overflow.
fn parse_leading_int(token: &str) -> Option<i64> {
    let (negative, digits) = match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The `quit` command: the owner should terminate the process now.
    Quit,
    /// Interrupt signal; closed through the normal teardown.
    Interrupted,
    /// The input stream ended.
    EndOfInput,
}

enum Dispatch {
    Continue,
    Quit,
}

/// An interactive session over a line source and an output stream.
///
/// Owns both streams; they are dropped when [`run`](Self::run) returns.
pub struct InteractiveSession<S, W, M>
where
    S: LineSource,
    W: Write,
    M: MemorySampler,
{
    registry: CommandRegistry,
    sampler: M,
    input: S,
    output: W,
    baseline: OnceCell<MemorySnapshot>,
}

impl<S, W, M> InteractiveSession<S, W, M>
where
    S: LineSource,
    W: Write,
    M: MemorySampler,
{
    pub fn new(registry: CommandRegistry, sampler: M, input: S, output: W) -> Self {
        Self {
            registry,
            sampler,
            input,
            output,
            baseline: OnceCell::new(),
        }
    }

    /// Runs until `quit`, an interrupt, or end-of-input.
    ///
    /// Returns an error only when the output stream or the line source fails.
    pub fn run(mut self) -> io::Result<SessionExit> {
        info!("Session started with {} commands", self.registry.len());
        self.output.write_all(WELCOME.as_bytes())?;
        self.sampler.collect_garbage();
        self.show_memory_usage()?;

        let exit = loop {
            self.output.write_all(PROMPT.as_bytes())?;
            self.output.flush()?;

            match self.input.next_line(PROMPT, &self.registry)? {
                InputEvent::Line(line) => {
                    if let Dispatch::Quit = self.handle_line(&line)? {
                        self.output.flush()?;
                        info!("Quit requested");
                        return Ok(SessionExit::Quit);
                    }
                }
                InputEvent::Interrupt => break SessionExit::Interrupted,
                InputEvent::Eof => break SessionExit::EndOfInput,
            }
        };

        self.output.write_all(b"\n")?;
        self.show_memory_usage()?;
        self.output.flush()?;
        info!("Session closed: {:?}", exit);
        Ok(exit)
    }

    fn handle_line(&mut self, line: &str) -> io::Result<Dispatch> {
        let parsed = ParsedLine::parse(line);
        if parsed.command_name.is_empty() {
            return Ok(Dispatch::Continue);
        }

        let registry = &self.registry;
        let sampler = &self.sampler;
        let baseline = &self.baseline;
        let output = &mut self.output;

        let Some(command) = registry.lookup(&parsed.command_name) else {
            writeln!(output, "Unrecognized command: {}", parsed.command_name)?;
            write_help(output, registry)?;
            return Ok(Dispatch::Continue);
        };

        let builtin = command.builtin();
        if builtin == Some(Builtin::Quit) {
            return Ok(Dispatch::Quit);
        }

        debug!("Dispatching {} x{}", command.name(), parsed.repeat_count);
        let mut driver = ExecutionDriver::new(&mut *output);
        let outcome = match command.action() {
            Action::External(action) => {
                driver.run(command.name(), parsed.repeat_count, |_| action())?
            }
            Action::Builtin(kind) => {
                driver.run(command.name(), parsed.repeat_count, |out| {
                    match kind {
                        Builtin::Help => write_help(out, registry)?,
                        Builtin::Gc => sampler.collect_garbage(),
                        Builtin::ShowMemoryUsage => report_into(out, sampler, baseline)?,
                        // Handled before dispatch.
                        Builtin::Quit => {}
                    }
                    Ok(())
                })?
            }
        };
        if !outcome.is_success() {
            debug!(
                "{} stopped after {} of {} calls",
                command.name(),
                outcome.attempted,
                outcome.requested
            );
        }

        if builtin != Some(Builtin::Help) {
            report_into(output, sampler, baseline)?;
        }
        Ok(Dispatch::Continue)
    }

    fn show_memory_usage(&mut self) -> io::Result<()> {
        report_into(&mut self.output, &self.sampler, &self.baseline)
    }
}

/// Writes one memory report, latching the baseline on first use.
fn report_into<W: Write, M: MemorySampler>(
    out: &mut W,
    sampler: &M,
    baseline: &OnceCell<MemorySnapshot>,
) -> io::Result<()> {
    let current = sampler.sample();
    out.write_all(render_report(baseline.get(), &current).as_bytes())?;
    // No-op once a baseline exists.
    let _ = baseline.set(current);
    Ok(())
}

fn write_help<W: Write>(out: &mut W, registry: &CommandRegistry) -> io::Result<()> {
    writeln!(out, "List of commands:")?;
    for name in registry.all_names() {
        writeln!(out, "{}", name)?;
    }
    Ok(())
}
