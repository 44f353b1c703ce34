//! gdb transport abstraction layer.
//! A backend talks to anything that speaks GDB/MI over a pair of byte streams: a real gdb
//! subprocess or an in-process fake.

use crate::debugger::config::Config;
use crate::debugger::error::Error;
use log::{debug, warn};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::thread;

/// Streams of one MI session.
pub struct MiChannel {
    /// Commands are written here.
    pub input: Box<dyn Write + Send>,
    /// Records are read from here, line by line.
    pub output: Box<dyn BufRead + Send>,
    /// gdb subprocess, `None` for in-process transports.
    pub child: Option<Child>,
}

/// Trait for MI channel creation.
pub trait BackendFactory {
    /// Start a new MI session.
    fn spawn(&self, config: &Config) -> Result<MiChannel, Error>;
}

/// Spawns gdb subprocesses.
pub struct GdbFactory;

impl BackendFactory for GdbFactory {
    fn spawn(&self, config: &Config) -> Result<MiChannel, Error> {
        let gdb = config.locate_gdb()?;
        debug!(target: "debugger", "spawn {} {}", gdb.display(), config.gdb_args.join(" "));

        // stderr is not part of the MI stream, it goes to the log
        let (stderr_reader, stderr_writer) = os_pipe::pipe()?;
        let mut child = Command::new(gdb)
            .args(&config.gdb_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(stderr_writer)
            // terminal ctrl-c must reach the debugger only
            .process_group(0)
            .spawn()?;
        let pid = child.id();
        thread::Builder::new()
            .name(format!("gdb-stderr-{pid}"))
            .spawn(move || {
                for line in BufReader::new(stderr_reader).lines() {
                    let Ok(line) = line else {
                        break;
                    };
                    warn!(target: "gdb", "gdb {pid}: {line}");
                }
            })?;

        let input = child
            .stdin
            .take()
            .ok_or_else(|| Error::InvalidState("gdb stdin is not piped".to_string()))?;
        let output = child
            .stdout
            .take()
            .ok_or_else(|| Error::InvalidState("gdb stdout is not piped".to_string()))?;

        Ok(MiChannel {
            input: Box::new(input),
            output: Box::new(BufReader::new(output)),
            child: Some(child),
        })
    }
}
