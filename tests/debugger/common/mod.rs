//! In-process fake gdb speaking GDB/MI over pipes, plus hooks that record debugger events.
//!
//! The fake keeps a tiny model of every inferior: its pid, thread ids and the current
//! frame. Programs are picked by executable name:
//! * `looper` runs until a breakpoint or an interrupt,
//! * `exiter` exits with code 10 once continued past its entry point,
//! * `crasher` dies before reaching its entry point,
//! * `threads` starts a second thread at the first continue,
//! * `missing` does not exist.

use gdbmux::debugger::backend::transport::{BackendFactory, MiChannel};
use gdbmux::debugger::config::InterruptStrategy;
use gdbmux::debugger::{
    Breakpoint, Config, DebugSession, Debugger, Error, EventHook, Process, Status, Thread,
};
use once_cell::sync::Lazy;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Write};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Program {
    Looper,
    Exiter(i64),
    Crasher,
    Threads,
    /// Waits in the bootstrap launcher, execs a looper once released.
    Launcher,
}

fn program_for(exe: &str) -> Option<Program> {
    let name = exe.rsplit('/').next().unwrap_or(exe);
    match name {
        "missing" => None,
        "exiter" => Some(Program::Exiter(10)),
        "crasher" => Some(Program::Crasher),
        "threads" => Some(Program::Threads),
        _ => Some(Program::Looper),
    }
}

// far above any real pid, nothing is ever signalled with these
static NEXT_PID: AtomicU32 = AtomicU32::new(3_900_001);
static ATTACHABLE: Lazy<Mutex<HashMap<u32, Program>>> = Lazy::new(Default::default);
static STACK_QUERIES: AtomicU32 = AtomicU32::new(0);
static TRANSITIONS: Lazy<Mutex<HashMap<u32, Vec<Status>>>> = Lazy::new(Default::default);

/// Number of `stack-list-frames` commands served by every fake session so far.
pub fn stack_queries() -> u32 {
    STACK_QUERIES.load(Ordering::SeqCst)
}

/// Running and stopped records the fake emitted for a process, oldest first.
pub fn transitions(pid: u32) -> Vec<Status> {
    TRANSITIONS
        .lock()
        .unwrap()
        .get(&pid)
        .cloned()
        .unwrap_or_default()
}

pub fn clear_transitions() {
    TRANSITIONS.lock().unwrap().clear()
}

/// Register a running process the fake can attach to, return its pid.
pub fn spawn_attachable(program: Program) -> u32 {
    let pid = NEXT_PID.fetch_add(1, Ordering::SeqCst);
    ATTACHABLE.lock().unwrap().insert(pid, program);
    pid
}

/// Factory of fake gdb sessions, each one served by its own thread.
pub struct FakeGdb;

impl BackendFactory for FakeGdb {
    fn spawn(&self, _config: &Config) -> Result<MiChannel, Error> {
        let (cmd_reader, cmd_writer) = os_pipe::pipe()?;
        let (out_reader, out_writer) = os_pipe::pipe()?;
        thread::Builder::new()
            .name("fake-gdb".to_string())
            .spawn(move || FakeSession::new(out_writer).serve(BufReader::new(cmd_reader)))?;
        Ok(MiChannel {
            input: Box::new(cmd_writer),
            output: Box::new(BufReader::new(out_reader)),
            child: None,
        })
    }
}

#[derive(Default)]
struct Inferior {
    program: Option<Program>,
    exe: String,
    pid: Option<u32>,
    threads: Vec<u32>,
    func: String,
    addr: u64,
    line: u32,
    past_entry: bool,
    released: bool,
    spawned: bool,
}

struct FakeBreakpoint {
    number: u32,
    spec: String,
    enabled: bool,
}

/// Address, function and line a breakpoint spec resolves to.
fn resolve(spec: &str) -> (u64, String, u32) {
    match spec {
        "main" => (0x401126, "main".to_string(), 5),
        "get_a" | "*0x401136" => (0x401136, "get_a".to_string(), 43),
        s if s.ends_with(":43") => (0x401136, "get_a".to_string(), 43),
        s => (0x401300, s.trim_start_matches('*').to_string(), 10),
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Text of the first quoted argument, or the last word if nothing is quoted.
fn quoted_arg(command: &str) -> String {
    let Some(start) = command.find('"') else {
        return command
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .to_string();
    };
    let mut out = String::new();
    let mut chars = command[start + 1..].chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some(c) => out.push(c),
                None => break,
            },
            '"' => break,
            c => out.push(c),
        }
    }
    out
}

/// Value of a `--name N` option.
fn option(command: &str, name: &str) -> Option<u32> {
    let mut words = command.split_whitespace();
    words.find(|w| *w == name)?;
    words.next()?.parse().ok()
}

fn frame(level: u32, addr: u64, func: &str, line: u32) -> String {
    format!(
        "frame={{level=\"{level}\",addr=\"{addr:#018x}\",func=\"{func}\",args=[],file=\"test1.c\",fullname=\"/tmp/test1.c\",line=\"{line}\"}}"
    )
}

struct FakeSession {
    out: os_pipe::PipeWriter,
    inferiors: BTreeMap<u32, Inferior>,
    current: u32,
    next_thread: u32,
    next_breakpoint: u32,
    breakpoints: Vec<FakeBreakpoint>,
    running: bool,
}

impl FakeSession {
    fn new(out: os_pipe::PipeWriter) -> Self {
        let mut inferiors = BTreeMap::new();
        inferiors.insert(1, Inferior::default());
        Self {
            out,
            inferiors,
            current: 1,
            next_thread: 1,
            next_breakpoint: 1,
            breakpoints: vec![],
            running: false,
        }
    }

    fn serve(mut self, input: impl BufRead) {
        for line in input.lines() {
            let Ok(line) = line else {
                break;
            };
            let digits = line.chars().take_while(char::is_ascii_digit).count();
            let (token, command) = line.split_at(digits);
            let Some(command) = command.strip_prefix('-') else {
                continue;
            };
            if !self.handle(token, command) {
                break;
            }
        }
    }

    fn emit(&mut self, line: &str) {
        _ = writeln!(self.out, "{line}");
    }

    fn prompt(&mut self) {
        self.emit("(gdb) ");
    }

    fn console(&mut self, text: &str) {
        self.emit(&format!("~\"{}\\n\"", escape(text)));
    }

    fn done(&mut self, token: &str, payload: &str) {
        if payload.is_empty() {
            self.emit(&format!("{token}^done"));
        } else {
            self.emit(&format!("{token}^done,{payload}"));
        }
        self.prompt();
    }

    fn error(&mut self, token: &str, msg: &str) {
        self.emit(&format!("{token}^error,msg=\"{}\"", escape(msg)));
        self.prompt();
    }

    fn new_thread(&mut self) -> u32 {
        let id = self.next_thread;
        self.next_thread += 1;
        id
    }

    fn inferior_of_thread(&self, thread: u32) -> Option<u32> {
        self.inferiors
            .iter()
            .find(|(_, inf)| inf.threads.contains(&thread))
            .map(|(n, _)| *n)
    }

    fn record_transition(&self, status: Status) {
        let mut transitions = TRANSITIONS.lock().unwrap();
        for inferior in self.inferiors.values() {
            if let Some(pid) = inferior.pid {
                transitions.entry(pid).or_default().push(status);
            }
        }
    }

    fn live_inferiors(&self) -> Vec<u32> {
        self.inferiors
            .iter()
            .filter(|(_, inf)| inf.pid.is_some())
            .map(|(n, _)| *n)
            .collect()
    }

    /// Return false when the session ends.
    fn handle(&mut self, token: &str, command: &str) -> bool {
        let name = command.split_whitespace().next().unwrap_or_default();
        match name {
            "gdb-version" => {
                self.console("GNU gdb (Fake) 13.2");
                self.done(token, "");
            }
            "gdb-exit" => {
                self.emit(&format!("{token}^exit"));
                return false;
            }
            "inferior-tty-set" | "exec-arguments" => self.done(token, ""),
            "file-exec-and-symbols" => {
                let exe = quoted_arg(command);
                match program_for(&exe) {
                    Some(program) => {
                        let current = self.current;
                        let inferior = self.inferiors.entry(current).or_default();
                        inferior.program = Some(program);
                        inferior.exe = exe;
                        self.done(token, "");
                    }
                    None => self.error(token, &format!("{exe}: No such file or directory.")),
                }
            }
            "break-insert" => self.break_insert(token, &quoted_arg(command)),
            "break-delete" | "break-enable" | "break-disable" => {
                let number: u32 = quoted_arg(command).parse().unwrap_or_default();
                match self.breakpoints.iter().position(|b| b.number == number) {
                    Some(pos) => {
                        match name {
                            "break-delete" => {
                                self.breakpoints.remove(pos);
                            }
                            "break-enable" => self.breakpoints[pos].enabled = true,
                            _ => self.breakpoints[pos].enabled = false,
                        }
                        self.done(token, "");
                    }
                    None => self.error(token, &format!("No breakpoint number {number}.")),
                }
            }
            "exec-run" => self.exec_run(token),
            "exec-continue" => {
                if self.running {
                    self.error(token, "The program is running.");
                } else if self.live_inferiors().is_empty() {
                    self.error(token, "The program is not being run.");
                } else {
                    self.start_running(token);
                    self.advance();
                }
            }
            "exec-next" | "exec-step" | "exec-finish" => self.step(token, name, command),
            "exec-interrupt" => self.interrupt(token),
            "target-attach" => self.attach(token, quoted_arg(command).parse().unwrap_or_default()),
            "stack-list-frames" => self.stack(token, command),
            "data-evaluate-expression" => {
                let expression = quoted_arg(command);
                if expression == "missing_var" {
                    self.error(token, "No symbol \"missing_var\" in current context.");
                } else {
                    self.done(token, "value=\"42\"");
                }
            }
            "interpreter-exec" => self.console_command(token, &quoted_arg(command)),
            other => self.error(token, &format!("Undefined MI command: {other}")),
        }
        true
    }

    fn break_insert(&mut self, token: &str, spec: &str) {
        if spec.starts_with("nowhere") {
            self.error(token, &format!("Function \"{spec}\" not defined."));
            return;
        }
        let number = self.next_breakpoint;
        self.next_breakpoint += 1;
        self.breakpoints.push(FakeBreakpoint {
            number,
            spec: spec.to_string(),
            enabled: true,
        });
        let (addr, func, line) = resolve(spec);
        self.done(
            token,
            &format!(
                "bkpt={{number=\"{number}\",type=\"breakpoint\",disp=\"keep\",enabled=\"y\",addr=\"{addr:#018x}\",func=\"{func}\",file=\"test1.c\",fullname=\"/tmp/test1.c\",line=\"{line}\",times=\"0\"}}"
            ),
        );
    }

    fn start_running(&mut self, token: &str) {
        self.emit(&format!("{token}^running"));
        self.emit("*running,thread-id=\"all\"");
        self.prompt();
        self.running = true;
        self.record_transition(Status::Running);
    }

    fn stop(&mut self, record: String) {
        self.emit(&record);
        self.running = false;
        self.record_transition(Status::Break);
        self.prompt();
    }

    fn exec_run(&mut self, token: &str) {
        let n = self.current;
        let pid = NEXT_PID.fetch_add(1, Ordering::SeqCst);
        let tid = self.new_thread();
        {
            let inferior = self.inferiors.entry(n).or_default();
            inferior.pid = Some(pid);
            inferior.threads = vec![tid];
            inferior.func = "_start".to_string();
            inferior.past_entry = false;
            inferior.spawned = false;
        }
        self.emit(&format!("=thread-group-started,id=\"i{n}\",pid=\"{pid}\""));
        self.emit(&format!("=thread-created,id=\"{tid}\",group-id=\"i{n}\""));
        self.start_running(token);
        self.advance();
    }

    /// Let every live inferior run, the first one with a reason to stop stops the session.
    fn advance(&mut self) {
        for n in self.live_inferiors() {
            if let Some(stop) = self.advance_inferior(n) {
                self.stop(stop);
                return;
            }
        }
    }

    fn exit_inferior(&mut self, n: u32, code: Option<i64>) {
        let Some(inferior) = self.inferiors.get_mut(&n) else {
            return;
        };
        let threads = std::mem::take(&mut inferior.threads);
        inferior.pid = None;
        inferior.past_entry = false;
        inferior.released = false;
        for tid in threads {
            self.emit(&format!("=thread-exited,id=\"{tid}\",group-id=\"i{n}\""));
        }
        match code {
            Some(code) => self.emit(&format!(
                "=thread-group-exited,id=\"i{n}\",exit-code=\"{code:o}\""
            )),
            None => self.emit(&format!("=thread-group-exited,id=\"i{n}\"")),
        }
    }

    fn exit_record(code: i64) -> String {
        if code == 0 {
            "*stopped,reason=\"exited-normally\"".to_string()
        } else {
            format!("*stopped,reason=\"exited\",exit-code=\"{code:o}\"")
        }
    }

    fn advance_inferior(&mut self, n: u32) -> Option<String> {
        let (program, past_entry, released, spawned) = {
            let inferior = self.inferiors.get(&n)?;
            (
                inferior.program?,
                inferior.past_entry,
                inferior.released,
                inferior.spawned,
            )
        };

        if program == Program::Crasher {
            self.exit_inferior(n, Some(3));
            return Some(Self::exit_record(3));
        }
        if program == Program::Launcher {
            if !released {
                return None;
            }
            let inferior = self.inferiors.get_mut(&n)?;
            inferior.program = Some(Program::Looper);
            inferior.exe = "/tmp/looper".to_string();
            inferior.func = "_start".to_string();
            let tid = *inferior.threads.first()?;
            return Some(format!(
                "*stopped,reason=\"exec\",new-exec=\"/tmp/looper\",{},thread-id=\"{tid}\",stopped-threads=\"all\"",
                frame(0, 0x401000, "_start", 0)
            ));
        }
        if program == Program::Threads && past_entry && !spawned {
            let tid = self.new_thread();
            let inferior = self.inferiors.get_mut(&n)?;
            inferior.spawned = true;
            inferior.threads.push(tid);
            self.emit(&format!("=thread-created,id=\"{tid}\",group-id=\"i{n}\""));
        }

        let hit = self.breakpoints.iter().find(|b| {
            b.enabled && if past_entry { b.spec != "main" } else { b.spec == "main" }
        });
        if let Some(bp) = hit {
            let number = bp.number;
            let (addr, func, line) = resolve(&bp.spec);
            let inferior = self.inferiors.get_mut(&n)?;
            inferior.past_entry = true;
            inferior.func = func.clone();
            inferior.addr = addr;
            inferior.line = line;
            let tid = *inferior.threads.first()?;
            return Some(format!(
                "*stopped,reason=\"breakpoint-hit\",disp=\"keep\",bkptno=\"{number}\",{},thread-id=\"{tid}\",stopped-threads=\"all\"",
                frame(0, addr, &func, line)
            ));
        }
        if !past_entry {
            let inferior = self.inferiors.get_mut(&n)?;
            inferior.past_entry = true;
            inferior.func = "main".to_string();
            inferior.addr = 0x401126;
            inferior.line = 5;
        }
        if let Program::Exiter(code) = program {
            self.exit_inferior(n, Some(code));
            return Some(Self::exit_record(code));
        }
        None
    }

    fn step(&mut self, token: &str, name: &str, command: &str) {
        let Some(tid) = option(command, "--thread") else {
            self.error(token, "No thread selected.");
            return;
        };
        let Some(n) = self.inferior_of_thread(tid) else {
            self.error(token, &format!("Invalid thread id: {tid}"));
            return;
        };
        self.start_running(token);
        let Some(inferior) = self.inferiors.get_mut(&n) else {
            return;
        };
        let reason = if name == "exec-finish" {
            inferior.func = "main".to_string();
            inferior.addr = 0x401190;
            inferior.line = 50;
            "function-finished"
        } else {
            inferior.line += 1;
            inferior.addr += 4;
            "end-stepping-range"
        };
        let record = format!(
            "*stopped,reason=\"{reason}\",{},thread-id=\"{tid}\",stopped-threads=\"all\"",
            frame(0, inferior.addr, &inferior.func, inferior.line)
        );
        self.stop(record);
    }

    fn interrupt(&mut self, token: &str) {
        self.done(token, "");
        if !self.running {
            return;
        }
        let stopped = self.live_inferiors().into_iter().find_map(|n| {
            let inferior = self.inferiors.get(&n)?;
            let tid = *inferior.threads.first()?;
            Some(format!(
                "*stopped,reason=\"signal-received\",signal-name=\"SIGINT\",signal-meaning=\"Interrupt\",{},thread-id=\"{tid}\",stopped-threads=\"all\"",
                frame(0, inferior.addr, &inferior.func, inferior.line)
            ))
        });
        if let Some(record) = stopped {
            self.stop(record);
        }
    }

    fn attach(&mut self, token: &str, pid: u32) {
        let program = ATTACHABLE.lock().unwrap().get(&pid).copied();
        let Some(program) = program else {
            self.error(token, "ptrace: No such process.");
            return;
        };
        let n = self.current;
        let tid = self.new_thread();
        {
            let inferior = self.inferiors.entry(n).or_default();
            inferior.program = Some(program);
            inferior.exe = "/tmp/attached".to_string();
            inferior.pid = Some(pid);
            inferior.threads = vec![tid];
            inferior.func = "nanosleep".to_string();
            inferior.addr = 0x7f0000001000;
            inferior.line = 0;
            inferior.past_entry = program != Program::Launcher;
            inferior.released = false;
        }
        self.emit(&format!("=thread-group-started,id=\"i{n}\",pid=\"{pid}\""));
        self.emit(&format!("=thread-created,id=\"{tid}\",group-id=\"i{n}\""));
        self.done(token, "");
        self.stop(format!(
            "*stopped,{},thread-id=\"{tid}\",stopped-threads=\"all\"",
            frame(0, 0x7f0000001000, "nanosleep", 0)
        ));
    }

    fn stack(&mut self, token: &str, command: &str) {
        STACK_QUERIES.fetch_add(1, Ordering::SeqCst);
        let Some(n) = option(command, "--thread").and_then(|t| self.inferior_of_thread(t)) else {
            self.error(token, "Invalid thread id");
            return;
        };
        let Some(inferior) = self.inferiors.get(&n) else {
            return;
        };
        let mut frames = vec![(inferior.addr, inferior.func.clone(), inferior.line)];
        if inferior.func != "main" {
            frames.push((0x401190, "main".to_string(), 50));
        }
        // `--thread N low high`
        let bounds: Vec<usize> = command
            .split_whitespace()
            .skip(3)
            .filter_map(|w| w.parse().ok())
            .collect();
        let (low, high) = match bounds[..] {
            [low, high] => (low, high),
            _ => (0, frames.len()),
        };
        let stack = frames
            .iter()
            .enumerate()
            .filter(|(level, _)| *level >= low && *level <= high)
            .map(|(level, (addr, func, line))| frame(level as u32, *addr, func, *line))
            .collect::<Vec<_>>()
            .join(",");
        self.done(token, &format!("stack=[{stack}]"));
    }

    fn console_command(&mut self, token: &str, text: &str) {
        let words: Vec<&str> = text.split_whitespace().collect();
        match words.as_slice() {
            ["add-inferior", ..] => {
                let n = self.inferiors.keys().max().copied().unwrap_or_default() + 1;
                self.inferiors.insert(n, Inferior::default());
                self.console(&format!("[New inferior {n}]"));
                self.console(&format!("Added inferior {n}"));
                self.done(token, "");
            }
            ["inferior", n] => match n.parse() {
                Ok(n) if self.inferiors.contains_key(&n) => {
                    self.current = n;
                    self.done(token, "");
                }
                _ => self.error(token, &format!("Inferior ID {n} not known.")),
            },
            ["info", "proc", ..] => {
                let current = self.inferiors.get(&self.current);
                match current.and_then(|inf| inf.pid.map(|pid| (pid, inf.exe.clone()))) {
                    Some((pid, exe)) => {
                        self.console(&format!("process {pid}"));
                        self.console(&format!("cmdline = '{exe}'"));
                        self.console("cwd = '/tmp'");
                        self.console(&format!("exe = '{exe}'"));
                        self.done(token, "");
                    }
                    None => self.error(token, "No current process: you must name one."),
                }
            }
            ["info", "address", symbol] => {
                let waiting = self
                    .inferiors
                    .get(&self.current)
                    .map(|inf| inf.program == Some(Program::Launcher) && !inf.released)
                    .unwrap_or_default();
                if waiting {
                    self.console(&format!(
                        "Symbol \"{symbol}\" is static storage at address 0x4c6f10."
                    ));
                    self.done(token, "");
                } else {
                    self.error(token, &format!("No symbol \"{symbol}\" in current context."));
                }
            }
            ["set", "var", ..] => {
                let current = self.current;
                if let Some(inferior) = self.inferiors.get_mut(&current) {
                    inferior.released = true;
                }
                self.done(token, "");
            }
            ["kill", "inferior", n] | ["detach", "inferior", n] => {
                match n.parse().ok().filter(|n| self.live_inferiors().contains(n)) {
                    Some(n) => {
                        self.exit_inferior(n, None);
                        self.done(token, "");
                    }
                    None => self.error(token, "The program is not being run."),
                }
            }
            ["where", ..] => self.error(token, "No stack."),
            ["print", ..] | ["p", ..] => {
                self.console("$1 = 42");
                self.done(token, "");
            }
            _ => {
                self.console(&format!("fake: {text}"));
                self.done(token, "");
            }
        }
    }
}

/// Debugger event as seen by a user interface, entities by their user ids.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Status(Status),
    ActiveThread(Option<u32>),
    ActiveFrame(u32, usize),
    ProcessAdded(u32),
    ProcessRemoved(u32),
    ThreadAdded(u32),
    ThreadRemoved(u32),
    BreakpointHit(u32, Option<u32>),
    BreakpointsChanged,
}

#[derive(Clone, Default)]
pub struct TestHooks {
    events: Rc<RefCell<Vec<Event>>>,
    debugger: Rc<RefCell<Weak<Debugger>>>,
    hit_statuses: Rc<RefCell<Vec<Status>>>,
}

impl TestHooks {
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
        self.hit_statuses.borrow_mut().clear();
    }

    /// Aggregate debugger status at the moment of each breakpoint hit notification.
    pub fn hit_statuses(&self) -> Vec<Status> {
        self.hit_statuses.borrow().clone()
    }

    pub fn contains(&self, event: &Event) -> bool {
        self.events.borrow().contains(event)
    }

    pub fn count(&self, f: impl Fn(&Event) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| f(e)).count()
    }

    fn push(&self, event: Event) {
        self.events.borrow_mut().push(event)
    }
}

impl EventHook for TestHooks {
    fn on_status_changed(&self, status: Status) {
        self.push(Event::Status(status))
    }

    fn on_active_thread_changed(&self, thread: Option<&Rc<Thread>>) {
        self.push(Event::ActiveThread(thread.and_then(|t| t.frontend_id())))
    }

    fn on_active_frame_changed(&self, thread: &Rc<Thread>, frame: usize) {
        self.push(Event::ActiveFrame(
            thread.frontend_id().unwrap_or_default(),
            frame,
        ))
    }

    fn on_process_added(&self, process: &Rc<Process>) {
        self.push(Event::ProcessAdded(process.frontend_id().unwrap_or_default()))
    }

    fn on_process_removed(&self, process: &Rc<Process>) {
        self.push(Event::ProcessRemoved(
            process.frontend_id().unwrap_or_default(),
        ))
    }

    fn on_thread_added(&self, thread: &Rc<Thread>) {
        self.push(Event::ThreadAdded(thread.frontend_id().unwrap_or_default()))
    }

    fn on_thread_removed(&self, thread: &Rc<Thread>) {
        self.push(Event::ThreadRemoved(thread.frontend_id().unwrap_or_default()))
    }

    fn on_breakpoint_hit(&self, breakpoint: &Rc<Breakpoint>, thread: Option<&Rc<Thread>>) {
        if let Some(debugger) = self.debugger.borrow().upgrade() {
            self.hit_statuses.borrow_mut().push(debugger.status());
        }
        self.push(Event::BreakpointHit(
            breakpoint.id(),
            thread.and_then(|t| t.frontend_id()),
        ))
    }

    fn on_breakpoints_changed(&self) {
        self.push(Event::BreakpointsChanged)
    }
}

pub fn test_config() -> Config {
    Config {
        interrupt: InterruptStrategy::Mi,
        poll_interval_ms: 1,
        reader_shutdown_timeout_ms: 2000,
        ..Config::default()
    }
}

pub fn setup(config: Config) -> (Rc<Debugger>, TestHooks) {
    _ = env_logger::builder().is_test(true).try_init();
    let session = DebugSession::with_factory(config, Rc::new(FakeGdb));
    let hooks = TestHooks::default();
    let debugger = Debugger::new(session, hooks.clone());
    *hooks.debugger.borrow_mut() = Rc::downgrade(&debugger);
    (debugger, hooks)
}

/// Run the event loop until `cond` holds, panics after a few seconds.
pub fn run_until(debugger: &Debugger, cond: impl Fn() -> bool) {
    let scheduler = debugger.session().scheduler();
    let timed_out = Rc::new(Cell::new(false));
    let flag = timed_out.clone();
    let timer = scheduler.post_delayed(Duration::from_secs(5), move || flag.set(true));
    scheduler.run_until(|| cond() || timed_out.get()).unwrap();
    timer.cancel();
    assert!(cond(), "condition not reached in time");
}

/// Run pending callbacks for a short while.
pub fn settle(debugger: &Debugger) {
    let scheduler = debugger.session().scheduler();
    let done = Rc::new(Cell::new(false));
    let flag = done.clone();
    scheduler.post_delayed(Duration::from_millis(50), move || flag.set(true));
    scheduler.run_until(|| done.get()).unwrap();
}

pub fn launch(debugger: &Debugger, program: &str) -> Rc<Process> {
    debugger
        .begin_launch(&[program.to_string()])
        .wait()
        .unwrap()
}

pub fn active_frame_line(debugger: &Debugger) -> Option<u32> {
    let thread = debugger.active_thread()?;
    thread.frame(thread.active_frame()).ok()?.line
}

pub fn active_frame_func(debugger: &Debugger) -> Option<String> {
    let thread = debugger.active_thread()?;
    thread.frame(thread.active_frame()).ok()?.func
}
