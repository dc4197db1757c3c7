//! Line source for non-terminal input (pipes, files).
//!
//! A background thread reads lines and forwards them over a channel, so the
//! session thread can wait with a timeout and notice interrupts.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::{InputEvent, InterruptFlag, LineSource};
use crate::registry::Completer;

/// How often the waiting thread checks the interrupt flag.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

enum ReadEvent {
    Line(String),
    Failed(io::Error),
    Eof,
}

/// Reads lines from a `BufRead` on a background thread.
pub struct ChannelSource {
    rx: Receiver<ReadEvent>,
    interrupt: InterruptFlag,
}

impl ChannelSource {
    /// Starts the reader thread.
    pub fn spawn<R>(reader: R, interrupt: InterruptFlag) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let mut reader = reader;
            let mut buf = Vec::new();
            loop {
                buf.clear();
                let event = match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => ReadEvent::Line(decode_line(&buf)),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(ReadEvent::Failed(e));
                        return;
                    }
                };
                // Receiver gone: the session has closed.
                if tx.send(event).is_err() {
                    return;
                }
            }
            debug!("Input reader reached end of stream");
            let _ = tx.send(ReadEvent::Eof);
        });

        Self { rx, interrupt }
    }
}

/// Strips the line terminator; invalid UTF-8 is replaced, not rejected.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

impl LineSource for ChannelSource {
    fn next_line(&mut self, _prompt: &str, _completer: &dyn Completer) -> io::Result<InputEvent> {
        loop {
            if self.interrupt.take() {
                return Ok(InputEvent::Interrupt);
            }
            match self.rx.recv_timeout(INTERRUPT_POLL) {
                Ok(ReadEvent::Line(line)) => return Ok(InputEvent::Line(line)),
                Ok(ReadEvent::Failed(e)) => {
                    warn!("Input read failed, closing: {}", e);
                    return Ok(InputEvent::Eof);
                }
                Ok(ReadEvent::Eof) | Err(RecvTimeoutError::Disconnected) => {
                    return Ok(InputEvent::Eof);
                }
                Err(RecvTimeoutError::Timeout) => continue,
            }
        }
    }
}
