//! Raw-mode terminal line editor with Tab completion.
//!
//! Key handling lives in [`LineBuffer`], which is pure and tested without a
//! terminal. [`TerminalEditor`] only moves bytes between crossterm and it.

use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};

use super::{InputEvent, InterruptFlag, LineSource};
use crate::registry::Completer;

/// How often the editor checks the interrupt flag while waiting for keys.
const KEY_POLL: Duration = Duration::from_millis(100);

/// Result of handling a key event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditAction {
    /// Nothing visible changed.
    None,
    /// The line text changed and must be redrawn.
    Redraw,
    /// Enter was pressed.
    Submit(String),
    /// Ctrl-C.
    Interrupt,
    /// Ctrl-D on an empty line.
    Eof,
    /// Several completions share no longer prefix; show them.
    ListCandidates(Vec<String>),
}

/// Text typed so far on the current line. The cursor is always at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    text: String,
}

impl LineBuffer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn handle_key(&mut self, key: KeyEvent, completer: &dyn Completer) -> EditAction {
        if key.kind == KeyEventKind::Release {
            return EditAction::None;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => EditAction::Interrupt,
                KeyCode::Char('d') if self.text.is_empty() => EditAction::Eof,
                KeyCode::Char('u') => {
                    self.text.clear();
                    EditAction::Redraw
                }
                _ => EditAction::None,
            };
        }

        match key.code {
            KeyCode::Enter => EditAction::Submit(std::mem::take(&mut self.text)),
            KeyCode::Backspace => {
                if self.text.pop().is_some() {
                    EditAction::Redraw
                } else {
                    EditAction::None
                }
            }
            KeyCode::Tab => self.complete(completer),
            KeyCode::Char(c) => {
                self.text.push(c);
                EditAction::Redraw
            }
            _ => EditAction::None,
        }
    }

    fn complete(&mut self, completer: &dyn Completer) -> EditAction {
        let completion = completer.complete(&self.text);
        match completion.candidates.as_slice() {
            [] => EditAction::None,
            [only] => {
                self.text = only.clone();
                EditAction::Redraw
            }
            many => {
                let common = longest_common_prefix(many);
                if common.len() > completion.anchor.len() {
                    self.text = common.to_string();
                    EditAction::Redraw
                } else {
                    EditAction::ListCandidates(completion.candidates)
                }
            }
        }
    }
}

/// Longest prefix shared by every string, on char boundaries.
fn longest_common_prefix(items: &[String]) -> &str {
    let Some(first) = items.first() else {
        return "";
    };
    let mut end = first.len();
    for item in &items[1..] {
        end = first
            .char_indices()
            .zip(item.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map_or(0, |((i, a), _)| i + a.len_utf8())
            .min(end);
    }
    &first[..end]
}

/// Restores cooked mode when dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Reads lines from the controlling terminal.
///
/// Raw mode is held only while a line is being typed, so command output and
/// reports are written in normal (cooked) mode.
pub struct TerminalEditor {
    interrupt: InterruptFlag,
}

impl TerminalEditor {
    pub fn new(interrupt: InterruptFlag) -> Self {
        Self { interrupt }
    }

    fn redraw(out: &mut impl Write, prompt: &str, text: &str) -> io::Result<()> {
        queue!(
            out,
            Print("\r"),
            Clear(ClearType::CurrentLine),
            Print(prompt),
            Print(text)
        )?;
        out.flush()
    }
}

impl LineSource for TerminalEditor {
    fn next_line(&mut self, prompt: &str, completer: &dyn Completer) -> io::Result<InputEvent> {
        let _raw = RawModeGuard::enable()?;
        let mut out = io::stdout();
        let mut buffer = LineBuffer::default();

        loop {
            if self.interrupt.take() {
                write!(out, "\r\n")?;
                out.flush()?;
                return Ok(InputEvent::Interrupt);
            }
            if !event::poll(KEY_POLL)? {
                continue;
            }
            let Event::Key(key) = event::read()? else {
                continue;
            };

            match buffer.handle_key(key, completer) {
                EditAction::None => {}
                EditAction::Redraw => Self::redraw(&mut out, prompt, buffer.text())?,
                EditAction::Submit(line) => {
                    write!(out, "\r\n")?;
                    out.flush()?;
                    return Ok(InputEvent::Line(line));
                }
                EditAction::Interrupt => {
                    write!(out, "^C\r\n")?;
                    out.flush()?;
                    return Ok(InputEvent::Interrupt);
                }
                EditAction::Eof => {
                    write!(out, "\r\n")?;
                    out.flush()?;
                    return Ok(InputEvent::Eof);
                }
                EditAction::ListCandidates(candidates) => {
                    write!(out, "\r\n{}\r\n", candidates.join("  "))?;
                    Self::redraw(&mut out, prompt, buffer.text())?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CommandRegistry, RegistryBuilder};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn registry() -> CommandRegistry {
        let mut builder = RegistryBuilder::with_builtins();
        builder.register("fetch_all", || Ok(())).unwrap();
        builder.register("fetch_all_and_free", || Ok(())).unwrap();
        builder.register("error_in_connect", || Ok(())).unwrap();
        builder.register("error_in_query", || Ok(())).unwrap();
        builder.build()
    }

    fn type_text(buffer: &mut LineBuffer, text: &str, completer: &dyn Completer) {
        for c in text.chars() {
            assert_eq!(
                buffer.handle_key(key(KeyCode::Char(c)), completer),
                EditAction::Redraw
            );
        }
    }

    #[test]
    fn test_typing_and_submit() {
        let registry = registry();
        let mut buffer = LineBuffer::default();
        type_text(&mut buffer, "gc 10", &registry);

        assert_eq!(
            buffer.handle_key(key(KeyCode::Enter), &registry),
            EditAction::Submit("gc 10".to_string())
        );
        assert_eq!(buffer.text(), "");
    }

    #[test]
    fn test_backspace() {
        let registry = registry();
        let mut buffer = LineBuffer::default();
        assert_eq!(
            buffer.handle_key(key(KeyCode::Backspace), &registry),
            EditAction::None
        );
        type_text(&mut buffer, "gcc", &registry);
        assert_eq!(
            buffer.handle_key(key(KeyCode::Backspace), &registry),
            EditAction::Redraw
        );
        assert_eq!(buffer.text(), "gc");
    }

    #[test]
    fn test_control_keys() {
        let registry = registry();
        let mut buffer = LineBuffer::default();

        assert_eq!(buffer.handle_key(ctrl('d'), &registry), EditAction::Eof);
        type_text(&mut buffer, "he", &registry);
        assert_eq!(buffer.handle_key(ctrl('d'), &registry), EditAction::None);
        assert_eq!(buffer.handle_key(ctrl('u'), &registry), EditAction::Redraw);
        assert_eq!(buffer.text(), "");
        assert_eq!(buffer.handle_key(ctrl('c'), &registry), EditAction::Interrupt);
    }

    #[test]
    fn test_tab_single_candidate_replaces() {
        let registry = registry();
        let mut buffer = LineBuffer::default();
        type_text(&mut buffer, "sh", &registry);

        assert_eq!(buffer.handle_key(key(KeyCode::Tab), &registry), EditAction::Redraw);
        assert_eq!(buffer.text(), "show_memory_usage");
    }

    #[test]
    fn test_tab_extends_to_common_prefix_then_lists() {
        let registry = registry();
        let mut buffer = LineBuffer::default();
        type_text(&mut buffer, "er", &registry);

        assert_eq!(buffer.handle_key(key(KeyCode::Tab), &registry), EditAction::Redraw);
        assert_eq!(buffer.text(), "error_in_");

        assert_eq!(
            buffer.handle_key(key(KeyCode::Tab), &registry),
            EditAction::ListCandidates(vec![
                "error_in_connect".to_string(),
                "error_in_query".to_string(),
            ])
        );
        assert_eq!(buffer.text(), "error_in_");
    }

    #[test]
    fn test_tab_prefix_that_is_itself_a_command() {
        let registry = registry();
        let mut buffer = LineBuffer::default();
        type_text(&mut buffer, "fetch_all", &registry);

        assert_eq!(
            buffer.handle_key(key(KeyCode::Tab), &registry),
            EditAction::ListCandidates(vec![
                "fetch_all".to_string(),
                "fetch_all_and_free".to_string(),
            ])
        );
    }

    #[test]
    fn test_tab_without_match() {
        let registry = registry();
        let mut buffer = LineBuffer::default();
        type_text(&mut buffer, "zz", &registry);
        assert_eq!(buffer.handle_key(key(KeyCode::Tab), &registry), EditAction::None);
        assert_eq!(buffer.text(), "zz");
    }

    #[test]
    fn test_release_events_ignored() {
        let registry = registry();
        let mut buffer = LineBuffer::default();
        let mut release = key(KeyCode::Char('x'));
        release.kind = KeyEventKind::Release;
        assert_eq!(buffer.handle_key(release, &registry), EditAction::None);
        assert_eq!(buffer.text(), "");
    }

    #[test]
    fn test_longest_common_prefix() {
        let items = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(longest_common_prefix(&items(&["gc", "gcx"])), "gc");
        assert_eq!(longest_common_prefix(&items(&["abc", "xyz"])), "");
        assert_eq!(longest_common_prefix(&items(&["héllo", "hélp"])), "hél");
        assert_eq!(longest_common_prefix(&items(&["same"])), "same");
        assert_eq!(longest_common_prefix(&[]), "");
    }
}
