//! Console command interpreter.
//!
//! Text typed by the user is matched against a table of gdb command phrases. Commands that
//! would break the process model are refused, commands about processes, threads and frames
//! are answered locally, everything else goes to the gdb of the active thread.

pub mod matcher;

use crate::debugger::command::matcher::PhraseMatcher;
use crate::debugger::error::Error;
use crate::debugger::mi::StackFrame;
use crate::debugger::thread::{Status, Thread};
use crate::debugger::waitable::Waitable;
use crate::debugger::Debugger;
use crate::weak_error;
use std::fmt::Write;
use std::rc::Rc;

type LocalHandler = fn(&Debugger, &[&str]) -> Result<String, Error>;

#[derive(Clone, Copy)]
enum Handler {
    Local(LocalHandler),
    /// Forwarded to gdb as typed.
    Raw,
    /// Breaks the process model.
    Disallowed,
    NotImplemented,
}

const LOCAL: &[(&str, LocalHandler)] = &[
    ("info procs", info_processes),
    ("info processes", info_processes),
    ("process", process),
    ("info threads", info_threads),
    ("thread", thread),
    ("f", frame),
    ("frame", frame),
    ("up", up),
    ("down", down),
    ("quit", quit),
    ("info breakpoints", info_breakpoints),
    ("kill", kill),
    ("debug", debug),
];

const RAW: &[&str] = &["p", "print"];

const DISALLOWED: &[&str] = &[
    "info inferiors",
    "inferior",
    "add-inferior",
    "remove-inferiors",
    "reverse",
    "start",
    "signal",
];

/// Execution control and breakpoints go through the debugger API. The single letter
/// aliases are gdb's own, without them a prefix like `c` is ambiguous and reaches gdb.
const NOT_IMPLEMENTED: &[&str] = &[
    "attach",
    "run",
    "r",
    "detach",
    "disconnect",
    "break",
    "b",
    "delete",
    "enable",
    "disable",
    "return",
    "next",
    "n",
    "nexti",
    "ni",
    "jump",
    "step",
    "s",
    "stepi",
    "si",
    "continue",
    "c",
    "finish",
    "advance",
    "exec",
    "target",
];

pub struct Interpreter {
    commands: PhraseMatcher<Handler>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let mut commands = PhraseMatcher::default();
        let table = LOCAL
            .iter()
            .map(|(phrase, f)| (*phrase, Handler::Local(*f)))
            .chain(RAW.iter().map(|phrase| (*phrase, Handler::Raw)))
            .chain(DISALLOWED.iter().map(|phrase| (*phrase, Handler::Disallowed)))
            .chain(
                NOT_IMPLEMENTED
                    .iter()
                    .map(|phrase| (*phrase, Handler::NotImplemented)),
            );
        for (phrase, handler) in table {
            weak_error!(commands.add(phrase, handler), "command table:");
            // gdb accepts `i` for `info` even though other commands start with it
            if let Some(rest) = phrase.strip_prefix("info ") {
                weak_error!(commands.add(&format!("i {rest}"), handler), "command table:");
            }
        }
        Self { commands }
    }

    /// Phrases the user may type, for completion.
    pub fn phrases(&self) -> Vec<String> {
        self.commands
            .phrases()
            .into_iter()
            .filter(|(phrase, h)| {
                matches!(h, Handler::Local(_) | Handler::Raw) && !phrase.starts_with("i ")
            })
            .map(|(phrase, _)| phrase)
            .collect()
    }

    /// Execute a line of console text, the result is the text to show.
    pub fn exec(&self, debugger: &Debugger, text: &str) -> Waitable<String> {
        let scheduler = debugger.session().scheduler();
        let text = text.trim();
        if let Some(raw) = text.strip_prefix('*') {
            return debugger.begin_console(raw.trim_start());
        }

        match self.commands.fuzzy_get(text) {
            Some((Handler::Local(handler), args)) => match handler(debugger, &args) {
                Ok(output) => Waitable::ready(scheduler, output),
                Err(e) => Waitable::failed(scheduler, e),
            },
            Some((Handler::Disallowed, _)) => {
                Waitable::failed(scheduler, Error::Interpreter("not allowed".to_string()))
            }
            Some((Handler::NotImplemented, _)) => {
                Waitable::failed(scheduler, Error::Interpreter("not implemented".to_string()))
            }
            Some((Handler::Raw, _)) | None => debugger.begin_console(text),
        }
    }
}

fn parse_id(arg: &str, what: &str) -> Result<u32, Error> {
    arg.parse()
        .map_err(|_| Error::Interpreter(format!("invalid {what} `{arg}`")))
}

fn active_thread(debugger: &Debugger) -> Result<Rc<Thread>, Error> {
    debugger
        .active_thread()
        .ok_or_else(|| Error::NotFound("active thread".to_string()))
}

fn marker(active: bool) -> char {
    if active {
        '*'
    } else {
        ' '
    }
}

pub fn frame_view(frame: &StackFrame) -> String {
    let mut view = format!("#{}", frame.level);
    if let Some(addr) = frame.addr {
        _ = write!(view, " {addr:#018x}");
    }
    if let Some(func) = &frame.func {
        _ = write!(view, " in {func}");
    }
    if let (Some(file), Some(line)) = (&frame.file, frame.line) {
        _ = write!(view, " at {file}:{line}");
    }
    view
}

fn info_processes(debugger: &Debugger, _: &[&str]) -> Result<String, Error> {
    let active = debugger.active_process();
    let mut out = String::new();
    for process in debugger.processes() {
        let is_active = active
            .as_ref()
            .map(|a| Rc::ptr_eq(a, &process))
            .unwrap_or_default();
        _ = writeln!(
            out,
            "{} {:>3} {}",
            marker(is_active),
            process.frontend_id().unwrap_or_default(),
            process.describe()
        );
    }
    Ok(out)
}

fn process(debugger: &Debugger, args: &[&str]) -> Result<String, Error> {
    let Some(arg) = args.first() else {
        return Ok(match debugger.active_process() {
            Some(p) => format!(
                "process {} {}\n",
                p.frontend_id().unwrap_or_default(),
                p.describe()
            ),
            None => "no active process\n".to_string(),
        });
    };

    let id = parse_id(arg, "process id")?;
    let process = debugger
        .process(id)
        .ok_or_else(|| Error::NotFound(format!("process {id}")))?;
    let thread = process
        .last_active_thread()
        .filter(|t| t.frontend_id().is_some())
        .or_else(|| process.threads().into_iter().next())
        .ok_or_else(|| Error::NotFound(format!("thread of process {id}")))?;
    debugger.set_active_thread(Some(thread));
    Ok(String::new())
}

fn info_threads(debugger: &Debugger, _: &[&str]) -> Result<String, Error> {
    let active = debugger.active_thread();
    let mut out = String::new();
    for thread in debugger.threads() {
        let is_active = active
            .as_ref()
            .map(|a| Rc::ptr_eq(a, &thread))
            .unwrap_or_default();
        let pid = thread.process().map(|p| p.pid()).unwrap_or_default();
        let place = match thread.status() {
            Status::Break => weak_error!(thread.frame(0))
                .map(|f| frame_view(&f))
                .unwrap_or_default(),
            Status::Running => String::new(),
        };
        _ = writeln!(
            out,
            "{} {:>3} {pid}:{} {} {place}",
            marker(is_active),
            thread.frontend_id().unwrap_or_default(),
            thread.backend_id(),
            thread.status(),
        );
    }
    Ok(out)
}

fn thread(debugger: &Debugger, args: &[&str]) -> Result<String, Error> {
    let Some(arg) = args.first() else {
        let thread = active_thread(debugger)?;
        return Ok(format!(
            "thread {} {}:{}\n",
            thread.frontend_id().unwrap_or_default(),
            thread.process().map(|p| p.pid()).unwrap_or_default(),
            thread.backend_id()
        ));
    };
    let id = parse_id(arg, "thread id")?;
    let thread = debugger
        .thread(id)
        .ok_or_else(|| Error::NotFound(format!("thread {id}")))?;
    debugger.set_active_thread(Some(thread));
    Ok(String::new())
}

fn frame(debugger: &Debugger, args: &[&str]) -> Result<String, Error> {
    let thread = active_thread(debugger)?;
    let n = match args.first() {
        Some(arg) => parse_id(arg, "frame number")? as usize,
        None => thread.active_frame(),
    };
    let frame = thread.frame(n)?;
    if n != thread.active_frame() {
        debugger.set_active_frame(n)?;
    }
    Ok(format!("{}\n", frame_view(&frame)))
}

fn move_frame(debugger: &Debugger, args: &[&str], up: bool) -> Result<String, Error> {
    let thread = active_thread(debugger)?;
    let count = match args.first() {
        Some(arg) => parse_id(arg, "frame count")? as usize,
        None => 1,
    };
    let stack = thread.call_stack()?;
    let deepest = stack.len().saturating_sub(1);
    let current = thread.active_frame();
    let n = if up {
        current.saturating_add(count).min(deepest)
    } else {
        current.saturating_sub(count)
    };
    debugger.set_active_frame(n)?;
    Ok(stack
        .get(n)
        .map(|f| format!("{}\n", frame_view(f)))
        .unwrap_or_default())
}

fn up(debugger: &Debugger, args: &[&str]) -> Result<String, Error> {
    move_frame(debugger, args, true)
}

fn down(debugger: &Debugger, args: &[&str]) -> Result<String, Error> {
    move_frame(debugger, args, false)
}

fn quit(debugger: &Debugger, _: &[&str]) -> Result<String, Error> {
    debugger.session().scheduler().quit();
    Ok(String::new())
}

fn info_breakpoints(debugger: &Debugger, _: &[&str]) -> Result<String, Error> {
    let mut out = format!("{:>4} {:>3} {}\n", "Num", "Enb", "What");
    for bp in debugger.breakpoints() {
        let enabled = if bp.is_enabled() { "Y" } else { "N" };
        _ = writeln!(out, "{:>4} {enabled:>3} {}", bp.id(), bp.location());
        for location in bp.actual_locations() {
            _ = writeln!(out, "{:>8} {location}", "");
        }
        if let Some(error) = bp.error() {
            for line in error.lines() {
                _ = writeln!(out, "{:>8} {line}", "");
            }
        }
    }
    Ok(out)
}

fn kill(debugger: &Debugger, _: &[&str]) -> Result<String, Error> {
    let process = debugger
        .active_process()
        .ok_or_else(|| Error::NotFound("active process".to_string()))?;
    debugger.kill(&process)?;
    Ok(format!("process {} killed\n", process.pid()))
}

fn debug(_: &Debugger, _: &[&str]) -> Result<String, Error> {
    let on = crate::log::toggle();
    Ok(format!("mi trace {}\n", if on { "on" } else { "off" }))
}
