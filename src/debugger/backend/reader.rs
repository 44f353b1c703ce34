//! gdb output reader.
//!
//! The reader runs on its own thread and forwards records to the scheduler thread. Async
//! records go out as soon as they are read. Result records and console text wait for the
//! prompt that ends the turn, so every event of a turn is delivered before its completions.

use crate::debugger::error::Error;
use crate::debugger::mi::Line;
use crate::debugger::scheduler::Port;
use crate::mi_trace;
use log::debug;
use std::io::BufRead;
use std::sync::mpsc;
use std::thread;
use std::thread::JoinHandle;

/// Result record waiting for its prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub token: u64,
    pub class: String,
    pub payload: String,
}

#[derive(Debug)]
pub enum ReaderEvent {
    /// `*` record without the leading character.
    Exec(String),
    /// `=` record without the leading character.
    Notify(String),
    /// Results of one turn with the console text read in the same turn.
    Turn {
        results: Vec<RawResult>,
        console: Vec<String>,
    },
    /// Output stream ended.
    Closed,
    /// Stream broken or a line that is not MI.
    Failed(Error),
}

/// Accumulates one turn of gdb output.
#[derive(Default)]
pub(super) struct TurnBuffer {
    results: Vec<RawResult>,
    console: Vec<String>,
}

impl TurnBuffer {
    /// Feed one line, return the events ready for dispatch.
    pub(super) fn feed(&mut self, line: &str) -> Result<Option<ReaderEvent>, Error> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        let event = match crate::debugger::mi::classify_line(line)? {
            Line::Console(text) => {
                self.console.push(text);
                None
            }
            Line::Exec(text) => Some(ReaderEvent::Exec(text)),
            Line::Notify(text) => Some(ReaderEvent::Notify(text)),
            Line::Status | Line::Log | Line::Target => None,
            Line::Result {
                token: Some(token),
                class,
                payload,
            } => {
                self.results.push(RawResult {
                    token,
                    class,
                    payload,
                });
                None
            }
            Line::Result { token: None, class, .. } => {
                debug!(target: "debugger", "result `{class}` without a token ignored");
                None
            }
            Line::Prompt => {
                let results = std::mem::take(&mut self.results);
                let console = std::mem::take(&mut self.console);
                if results.is_empty() {
                    if !console.is_empty() {
                        debug!(target: "debugger", "console output without a command: {}", console.concat().trim_end());
                    }
                    None
                } else {
                    Some(ReaderEvent::Turn { results, console })
                }
            }
        };
        Ok(event)
    }
}

pub(super) struct ReaderHandle {
    join: JoinHandle<()>,
    done: mpsc::Receiver<()>,
}

impl ReaderHandle {
    /// Wait for the reader thread to end. Return false on timeout, the thread is left alone.
    pub(super) fn join(self, timeout: std::time::Duration) -> bool {
        if self.done.recv_timeout(timeout).is_err() {
            return false;
        }
        _ = self.join.join();
        true
    }
}

pub(super) fn spawn(
    backend_id: u32,
    output: Box<dyn BufRead + Send>,
    port: Port<ReaderEvent>,
) -> Result<ReaderHandle, Error> {
    let (done_tx, done) = mpsc::channel();
    let join = thread::Builder::new()
        .name(format!("gdb-reader-{backend_id}"))
        .spawn(move || {
            let mut turn = TurnBuffer::default();
            for line in output.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        port.send(ReaderEvent::Failed(e.into()));
                        break;
                    }
                };
                mi_trace!("[{backend_id}] <<< {line}");
                match turn.feed(&line) {
                    Ok(Some(event)) => {
                        if !port.send(event) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        port.send(ReaderEvent::Failed(e));
                        break;
                    }
                }
            }
            port.send(ReaderEvent::Closed);
            _ = done_tx.send(());
        })?;
    Ok(ReaderHandle { join, done })
}
