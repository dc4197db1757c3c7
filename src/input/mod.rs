//! Line sources for the interactive session.
//!
//! A source blocks until a line, an interrupt or end-of-input is available.
//! Interrupts arrive through an [`InterruptFlag`] set by the Ctrl-C handler
//! (or by the raw-mode editor reading Ctrl-C as a key).

mod channel;
mod editor;

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::registry::Completer;

pub use channel::ChannelSource;
pub use editor::{EditAction, LineBuffer, TerminalEditor};

/// What a line source produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A full line, without its terminator.
    Line(String),
    /// The operator asked to stop.
    Interrupt,
    /// The input stream ended.
    Eof,
}

/// Blocking source of input lines.
pub trait LineSource {
    /// Waits for the next event. `prompt` is only used by sources that
    /// redraw the current line; the session writes the prompt itself.
    fn next_line(&mut self, prompt: &str, completer: &dyn Completer) -> io::Result<InputEvent>;
}

/// Shared interrupt flag, set from a signal handler and consumed by sources.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether the flag was raised, clearing it.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    /// Routes Ctrl-C (SIGINT) to this flag.
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let flag = self.clone();
        ctrlc::set_handler(move || flag.raise())
    }
}

/// A fixed sequence of events, then end-of-input.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    events: VecDeque<InputEvent>,
    prompts: usize,
}

impl ScriptedInput {
    /// Feeds the given lines, then end-of-input.
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: lines
                .into_iter()
                .map(|l| InputEvent::Line(l.into()))
                .collect(),
            prompts: 0,
        }
    }

    /// Appends an event after the lines queued so far.
    pub fn then(mut self, event: InputEvent) -> Self {
        self.events.push_back(event);
        self
    }

    /// Number of times the session asked for a line.
    pub fn prompts(&self) -> usize {
        self.prompts
    }
}

impl LineSource for ScriptedInput {
    fn next_line(&mut self, _prompt: &str, _completer: &dyn Completer) -> io::Result<InputEvent> {
        self.prompts += 1;
        Ok(self.events.pop_front().unwrap_or(InputEvent::Eof))
    }
}

impl<S: LineSource + ?Sized> LineSource for &mut S {
    fn next_line(&mut self, prompt: &str, completer: &dyn Completer) -> io::Result<InputEvent> {
        (**self).next_line(prompt, completer)
    }
}

impl<S: LineSource + ?Sized> LineSource for Box<S> {
    fn next_line(&mut self, prompt: &str, completer: &dyn Completer) -> io::Result<InputEvent> {
        (**self).next_line(prompt, completer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;

    #[test]
    fn test_interrupt_flag_take_clears() {
        let flag = InterruptFlag::new();
        assert!(!flag.take());
        flag.clone().raise();
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn test_scripted_input_ends_with_eof() {
        let registry = RegistryBuilder::with_builtins().build();
        let mut input = ScriptedInput::lines(["gc", "help"]).then(InputEvent::Interrupt);

        assert_eq!(
            input.next_line("> ", &registry).unwrap(),
            InputEvent::Line("gc".to_string())
        );
        assert_eq!(
            input.next_line("> ", &registry).unwrap(),
            InputEvent::Line("help".to_string())
        );
        assert_eq!(input.next_line("> ", &registry).unwrap(), InputEvent::Interrupt);
        assert_eq!(input.next_line("> ", &registry).unwrap(), InputEvent::Eof);
        assert_eq!(input.next_line("> ", &registry).unwrap(), InputEvent::Eof);
        assert_eq!(input.prompts(), 5);
    }
}
