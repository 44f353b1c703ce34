//! gdb driver.
//!
//! A [`Backend`] owns one gdb subprocess: it serializes commands, matches completions to
//! their callbacks and turns asynchronous records into the process/thread model. Everything
//! here runs on the scheduler thread, gdb output arrives through the reader thread.

mod creation;
pub mod reader;
pub mod transport;

use crate::debugger::backend::reader::{RawResult, ReaderEvent, ReaderHandle};
use crate::debugger::backend::transport::MiChannel;
use crate::debugger::breakpoint::Binding;
use crate::debugger::config::InterruptStrategy;
use crate::debugger::error::Error;
use crate::debugger::location::Location;
use crate::debugger::mi::console::parse_added_inferior;
use crate::debugger::mi::{
    parse_async, parse_console_location, parse_tabular_breakpoint_info, quote_console,
    BreakpointInfo, BreakpointTableLayout, ExecRecord, Notify, Response, ResultClass, StackFrame,
    StopEvent, StopReason, ThreadSet,
};
use crate::debugger::process::Process;
use crate::debugger::pty::Pty;
use crate::debugger::scheduler::Port;
use crate::debugger::session::DebugSession;
use crate::debugger::thread::{Status, Thread};
use crate::debugger::waitable::Waitable;
use crate::version::GdbVersion;
use crate::{mi_trace, weak_error};
use indexmap::IndexMap;
use log::{debug, error, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs::File;
use std::io::Write;
use std::process::Child;
use std::rc::{Rc, Weak};

/// Observer of a backend, implemented by the coordinator.
pub trait BackendListener {
    fn on_status_changed(&self, _backend: &Rc<Backend>) {}
    fn on_process_added(&self, _process: &Rc<Process>) {}
    fn on_process_removed(&self, _process: &Rc<Process>) {}
    fn on_thread_added(&self, _thread: &Rc<Thread>) {}
    fn on_thread_removed(&self, _thread: &Rc<Thread>) {}
    fn on_symbols_changed(&self, _backend: &Rc<Backend>) {}
}

type ResponseCallback = Box<dyn FnOnce(Result<Response, Error>)>;

struct PendingCommand {
    command: String,
    callback: ResponseCallback,
}

/// Reader output queued for dispatch.
enum Inbound {
    Exec(String),
    Notify(String),
    Completion {
        result: RawResult,
        console: Vec<String>,
    },
    Closed,
    Failed(Error),
}

/// Entities reported while a process is being launched or attached. They become public
/// only when the creation succeeds.
#[derive(Default)]
struct CreationState {
    process: Option<Rc<Process>>,
    threads: Vec<Rc<Thread>>,
    exited: bool,
    exit_code: Option<i64>,
}

/// Entities reported as exited while a kill command is in flight.
#[derive(Default)]
struct KillState {
    exited_threads: Vec<u32>,
    exited_process: Option<Rc<Process>>,
}

#[derive(Default)]
enum Phase {
    #[default]
    Idle,
    Creating(CreationState),
    Killing(KillState),
}

/// gdb inferior numbers owned by this backend.
struct InferiorSlots {
    current: u32,
    in_use: BTreeSet<u32>,
    free: BTreeSet<u32>,
}

impl Default for InferiorSlots {
    fn default() -> Self {
        Self {
            current: 1,
            in_use: BTreeSet::new(),
            free: BTreeSet::new(),
        }
    }
}

fn inferior_of(group: &str) -> Option<u32> {
    group.strip_prefix('i')?.parse().ok()
}

/// Argument as gdb expects it in an MI command, quoted only when necessary.
fn mi_arg(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
        quote_console(arg)
    } else {
        arg.to_string()
    }
}

/// Location argument of `break-insert`.
fn breakpoint_spec(location: &Location) -> String {
    if let Some(pc) = location.pc() {
        return format!("*{pc:#x}");
    }
    if let (Some(file), Some(line)) = (location.file(), location.line()) {
        return mi_arg(&format!("{file}:{line}"));
    }
    mi_arg(location.identifier().unwrap_or_default())
}

pub struct Backend {
    id: u32,
    session: DebugSession,
    this: Weak<Backend>,
    listener: Weak<dyn BackendListener>,
    port: Port<ReaderEvent>,
    input: RefCell<Option<Box<dyn Write + Send>>>,
    child: RefCell<Option<Child>>,
    reader: RefCell<Option<ReaderHandle>>,
    alive: Cell<bool>,
    inbox: RefCell<VecDeque<Inbound>>,
    next_token: Cell<u64>,
    pending: RefCell<HashMap<u64, PendingCommand>>,
    version: Cell<GdbVersion>,

    status: Cell<Status>,
    resume_count: Cell<u64>,
    interrupt: RefCell<Option<Waitable<()>>>,
    stopped_thread: RefCell<Option<Rc<Thread>>>,
    last_exit_code: Cell<Option<i64>>,
    run_when_stopped: RefCell<Vec<Box<dyn FnOnce()>>>,
    symbols_change_queued: Cell<bool>,

    phase: RefCell<Phase>,
    processes: RefCell<IndexMap<u32, Rc<Process>>>,
    threads: RefCell<IndexMap<u32, Rc<Thread>>>,
    inferiors: RefCell<InferiorSlots>,
    ptys: RefCell<HashMap<u32, Pty>>,
    breakpoint_hits: RefCell<HashMap<u32, Rc<dyn Fn()>>>,
}

impl Backend {
    /// Spawn gdb through the session factory and initialize it.
    pub fn start(
        session: &DebugSession,
        listener: Weak<dyn BackendListener>,
    ) -> Result<Rc<Backend>, Error> {
        let id = session.next_backend_id();
        let MiChannel {
            input,
            output,
            child,
        } = session.factory().spawn(session.config())?;

        let backend = Rc::new_cyclic(|this: &Weak<Backend>| {
            let weak = this.clone();
            let port = session.scheduler().open_port(move |event: ReaderEvent| {
                if let Some(backend) = weak.upgrade() {
                    backend.on_reader_event(event);
                }
            });
            Backend {
                id,
                session: session.clone(),
                this: this.clone(),
                listener,
                port,
                input: RefCell::new(Some(input)),
                child: RefCell::new(child),
                reader: RefCell::new(None),
                alive: Cell::new(true),
                inbox: RefCell::default(),
                next_token: Cell::new(id as u64 * 10000),
                pending: RefCell::default(),
                version: Cell::new(GdbVersion::default()),
                status: Cell::new(Status::Break),
                resume_count: Cell::new(0),
                interrupt: RefCell::new(None),
                stopped_thread: RefCell::new(None),
                last_exit_code: Cell::new(None),
                run_when_stopped: RefCell::default(),
                symbols_change_queued: Cell::new(false),
                phase: RefCell::default(),
                processes: RefCell::default(),
                threads: RefCell::default(),
                inferiors: RefCell::default(),
                ptys: RefCell::default(),
                breakpoint_hits: RefCell::default(),
            }
        });

        match reader::spawn(id, output, backend.port.clone()) {
            Ok(handle) => *backend.reader.borrow_mut() = Some(handle),
            Err(e) => {
                weak_error!(backend.shutdown());
                return Err(e);
            }
        }

        if let Err(e) = backend.initialize() {
            weak_error!(backend.shutdown());
            return Err(e);
        }
        debug!(target: "debugger", "backend {id} started, gdb {}", backend.version());
        Ok(backend)
    }

    fn initialize(&self) -> Result<(), Error> {
        for command in &self.session.config().init_commands {
            weak_error!(self.console(command), "init command:");
        }
        let version = self.run_cmd("gdb-version")?.expect_done("gdb-version")?;
        self.version
            .set(GdbVersion::parse(&version.console_text()).unwrap_or_default());
        Ok(())
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn version(&self) -> GdbVersion {
        self.version.get()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Number of `running` records seen so far.
    pub fn resume_count(&self) -> u64 {
        self.resume_count.get()
    }

    /// Thread reported by the last stop.
    pub fn stopped_thread(&self) -> Option<Rc<Thread>> {
        self.stopped_thread.borrow().clone()
    }

    /// Exit code of the last exited process.
    pub fn last_exit_code(&self) -> Option<i64> {
        self.last_exit_code.get()
    }

    pub fn processes(&self) -> Vec<Rc<Process>> {
        self.processes.borrow().values().cloned().collect()
    }

    pub fn has_processes(&self) -> bool {
        !self.processes.borrow().is_empty()
    }

    pub fn threads(&self) -> Vec<Rc<Thread>> {
        self.threads.borrow().values().cloned().collect()
    }

    /// Reading side of a launched process terminal.
    pub fn process_output(&self, process: &Process) -> Result<Option<File>, Error> {
        self.ptys
            .borrow()
            .get(&process.backend_id())
            .map(Pty::reader)
            .transpose()
    }

    fn listener(&self) -> Option<Rc<dyn BackendListener>> {
        self.listener.upgrade()
    }

    fn self_rc(&self) -> Result<Rc<Backend>, Error> {
        self.this.upgrade().ok_or(Error::BackendGone(self.id))
    }

    fn ensure_alive(&self) -> Result<(), Error> {
        if self.alive.get() {
            Ok(())
        } else {
            Err(Error::BackendGone(self.id))
        }
    }

    fn ensure_stopped(&self) -> Result<(), Error> {
        self.ensure_alive()?;
        if self.status.get() != Status::Break {
            return Err(Error::InvalidState(format!(
                "backend {} is running",
                self.id
            )));
        }
        Ok(())
    }

    // --------------------------------- commands --------------------------------------------------

    /// Send a command, `callback` receives its completion.
    pub fn run_cmd_async(
        &self,
        command: &str,
        callback: impl FnOnce(Result<Response, Error>) + 'static,
    ) -> Result<(), Error> {
        if command.starts_with('-') {
            return Err(Error::MalformedCommand(command.to_string()));
        }
        self.ensure_alive()?;

        let token = self.next_token.get();
        self.next_token.set(token + 1);
        self.pending.borrow_mut().insert(
            token,
            PendingCommand {
                command: command.to_string(),
                callback: Box::new(callback),
            },
        );

        let line = format!("{token}-{command}\n");
        mi_trace!("[{}] >>> {}", self.id, line.trim_end());
        let written = match self.input.borrow_mut().as_mut() {
            Some(input) => input.write_all(line.as_bytes()).and_then(|_| input.flush()),
            None => Err(std::io::ErrorKind::BrokenPipe.into()),
        };
        if let Err(e) = written {
            self.pending.borrow_mut().remove(&token);
            return Err(e.into());
        }
        Ok(())
    }

    /// Send a command, return a waitable for its completion.
    pub fn run_cmd_waitable(&self, command: &str) -> Waitable<Response> {
        let scheduler = self.session.scheduler();
        let (waitable, completer) = Waitable::pending(scheduler);
        match self.run_cmd_async(command, move |response| completer.finish(response)) {
            Ok(()) => waitable,
            Err(e) => Waitable::failed(scheduler, e),
        }
    }

    /// Send a command and run the scheduler until it completes.
    pub fn run_cmd(&self, command: &str) -> Result<Response, Error> {
        self.run_cmd_waitable(command).wait()
    }

    /// Execute a console command, an error result fails.
    pub fn console(&self, text: &str) -> Result<Response, Error> {
        self.run_cmd(&format!("interpreter-exec console {}", quote_console(text)))?
            .expect_done(text)
    }

    /// Execute a console command in the context of a thread and a frame.
    fn console_in(&self, thread: &Thread, frame: Option<u32>, text: &str) -> Result<Response, Error> {
        self.run_cmd(&console_in_command(thread, frame, text))?
            .expect_done(text)
    }

    // --------------------------------- reader events ---------------------------------------------

    fn on_reader_event(self: &Rc<Self>, event: ReaderEvent) {
        {
            let mut inbox = self.inbox.borrow_mut();
            match event {
                ReaderEvent::Exec(text) => inbox.push_back(Inbound::Exec(text)),
                ReaderEvent::Notify(text) => inbox.push_back(Inbound::Notify(text)),
                ReaderEvent::Turn { results, console } => {
                    for result in results {
                        inbox.push_back(Inbound::Completion {
                            result,
                            console: console.clone(),
                        });
                    }
                }
                ReaderEvent::Closed => inbox.push_back(Inbound::Closed),
                ReaderEvent::Failed(e) => inbox.push_back(Inbound::Failed(e)),
            }
        }
        self.drain_inbox();
    }

    /// Dispatch queued reader output in arrival order. A handler that re-enters the scheduler
    /// continues draining from the same queue, so later records never overtake earlier ones.
    fn drain_inbox(self: &Rc<Self>) {
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            let Some(next) = next else {
                break;
            };
            match next {
                Inbound::Exec(text) => self.on_exec(&text),
                Inbound::Notify(text) => self.on_notify(&text),
                Inbound::Completion { result, console } => self.on_completion(result, console),
                Inbound::Closed => self.on_lost(Error::BackendGone(self.id)),
                Inbound::Failed(e) => self.on_lost(e),
            }
        }
    }

    fn on_completion(&self, result: RawResult, console: Vec<String>) {
        let pending = self.pending.borrow_mut().remove(&result.token);
        let Some(PendingCommand { command, callback }) = pending else {
            warn!(target: "debugger", "backend {}: result for unknown token {}", self.id, result.token);
            return;
        };
        let response = Response::parse(&result.class, &result.payload).map(|mut response| {
            response.console = console;
            response
        });
        if let Ok(Some(msg)) = response.as_ref().map(Response::error_message) {
            debug!(target: "debugger", "backend {}: `{command}` failed: {msg}", self.id);
        }
        callback(response);
    }

    /// The reader stopped, gdb is unusable from now on.
    fn on_lost(self: &Rc<Self>, reason: Error) {
        if !self.alive.replace(false) {
            return;
        }
        error!(target: "debugger", "backend {} lost: {reason}", self.id);
        if reason.is_fatal() {
            if let Some(child) = self.child.borrow_mut().as_mut() {
                weak_error!(child.kill(), "kill gdb:");
            }
        }
        self.input.borrow_mut().take();
        self.fail_pending(reason);

        for process in self.processes() {
            self.retire_process(&process);
        }
        if self.status.replace(Status::Break) != Status::Break {
            self.fire_status_changed();
        }
    }

    fn fail_pending(&self, reason: Error) {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        let mut pending: Vec<_> = pending.into_iter().collect();
        pending.sort_by_key(|(token, _)| *token);
        for (_, cmd) in pending {
            (cmd.callback)(Err(reason.clone()));
        }
    }

    // --------------------------------- exec records ----------------------------------------------

    fn on_exec(self: &Rc<Self>, text: &str) {
        let record = match parse_async(text).and_then(|(class, t)| ExecRecord::decode(&class, &t)) {
            Ok(record) => record,
            Err(e) => {
                warn!(target: "debugger", "backend {}: bad exec record: {e}", self.id);
                return;
            }
        };
        match record {
            ExecRecord::Running(threads) => self.on_running(&threads),
            ExecRecord::Stopped(event) => self.on_stopped(event),
            ExecRecord::Other(class) => {
                debug!(target: "debugger", "backend {}: exec record `{class}` ignored", self.id)
            }
        }
    }

    pub(crate) fn is_creating(&self) -> bool {
        matches!(*self.phase.borrow(), Phase::Creating(_))
    }

    /// Public threads plus threads of a process under creation.
    fn known_threads(&self) -> Vec<Rc<Thread>> {
        let mut threads = self.threads();
        if let Phase::Creating(state) = &*self.phase.borrow() {
            threads.extend(state.threads.iter().cloned());
        }
        threads
    }

    fn find_thread(&self, backend_id: u32) -> Option<Rc<Thread>> {
        self.known_threads()
            .into_iter()
            .find(|t| t.backend_id() == backend_id)
    }

    fn on_running(self: &Rc<Self>, threads: &ThreadSet) {
        self.resume_count.set(self.resume_count.get() + 1);
        self.stopped_thread.borrow_mut().take();
        for thread in self.known_threads() {
            if threads.contains(thread.backend_id()) {
                thread.set_status(Status::Running);
            }
        }
        let changed = self.status.replace(Status::Running) != Status::Running;
        if changed && !self.is_creating() {
            self.fire_status_changed();
        }
    }

    fn on_stopped(self: &Rc<Self>, event: StopEvent) {
        match event.reason {
            StopReason::Exited { code } => self.last_exit_code.set(code),
            StopReason::ExitedNormally => self.last_exit_code.set(Some(0)),
            _ => {}
        }

        for thread in self.known_threads() {
            if event.stopped_threads.contains(thread.backend_id()) {
                thread.set_status(Status::Break);
            }
        }
        *self.stopped_thread.borrow_mut() = event.thread_id.and_then(|id| self.find_thread(id));
        let changed = self.status.replace(Status::Break) != Status::Break;
        self.interrupt.borrow_mut().take();

        let queued = std::mem::take(&mut *self.run_when_stopped.borrow_mut());
        for f in queued {
            f();
        }

        let creating = self.is_creating();
        if changed && !creating {
            self.fire_status_changed();
        }
        if let (StopReason::BreakpointHit { number }, false) = (event.reason, creating) {
            let hit = self.breakpoint_hits.borrow().get(&number).cloned();
            match hit {
                Some(hit) => hit(),
                None => debug!(target: "debugger", "backend {}: hit of unknown breakpoint {number}", self.id),
            }
        }
    }

    /// Run `f` at the next stop, at once if the backend is stopped.
    pub fn run_when_stopped(&self, f: impl FnOnce() + 'static) {
        if self.status.get() == Status::Break {
            f();
        } else {
            self.run_when_stopped.borrow_mut().push(Box::new(f));
        }
    }

    fn fire_status_changed(self: &Rc<Self>) {
        if let Some(listener) = self.listener() {
            listener.on_status_changed(self);
        }
    }

    fn symbols_changed(self: &Rc<Self>) {
        if self.status.get() == Status::Break {
            if let Some(listener) = self.listener() {
                listener.on_symbols_changed(self);
            }
            return;
        }
        if self.symbols_change_queued.replace(true) {
            return;
        }
        let weak = self.this.clone();
        self.run_when_stopped(move || {
            if let Some(backend) = weak.upgrade() {
                backend.symbols_change_queued.set(false);
                if let Some(listener) = backend.listener() {
                    listener.on_symbols_changed(&backend);
                }
            }
        });
    }

    // --------------------------------- notify records --------------------------------------------

    fn on_notify(self: &Rc<Self>, text: &str) {
        let notify = match parse_async(text).and_then(|(class, t)| Notify::decode(&class, &t)) {
            Ok(notify) => notify,
            Err(e) => {
                warn!(target: "debugger", "backend {}: bad notify record: {e}", self.id);
                return;
            }
        };
        match notify {
            Notify::ThreadGroupStarted { group, pid } => self.on_process_started(&group, pid),
            Notify::ThreadCreated { id, group } => self.on_thread_created(id, &group),
            Notify::ThreadExited { id, group } => self.on_thread_exited(id, &group),
            Notify::ThreadGroupExited { group, exit_code } => {
                self.on_process_exited(&group, exit_code)
            }
            Notify::LibraryLoaded | Notify::LibraryUnloaded => {
                if !self.is_creating() {
                    self.symbols_changed()
                }
            }
            Notify::ThreadGroupAdded { .. } | Notify::Other(_) => {}
        }
    }

    fn on_process_started(self: &Rc<Self>, group: &str, pid: u32) {
        let Some(inferior) = inferior_of(group) else {
            warn!(target: "debugger", "backend {}: unexpected thread group `{group}`", self.id);
            return;
        };
        let mut phase = self.phase.borrow_mut();
        match &mut *phase {
            Phase::Creating(state) => {
                if state.process.as_ref().map(|p| p.pid()) == Some(pid) {
                    return;
                }
                state.process = Some(Process::new(self, inferior, pid));
            }
            _ => {
                warn!(target: "debugger", "backend {}: process {pid} started outside of launch or attach, ignored", self.id)
            }
        }
    }

    fn on_thread_created(self: &Rc<Self>, id: u32, group: &str) {
        let inferior = inferior_of(group);
        {
            let mut phase = self.phase.borrow_mut();
            if let Phase::Creating(state) = &mut *phase {
                if let Some(process) = state
                    .process
                    .clone()
                    .filter(|p| Some(p.backend_id()) == inferior)
                {
                    let thread = Thread::new(id, &process, self.status.get());
                    process.add_thread(thread.clone());
                    state.threads.push(thread);
                    return;
                }
            }
        }

        let process = inferior.and_then(|n| self.processes.borrow().get(&n).cloned());
        let Some(process) = process else {
            warn!(target: "debugger", "backend {}: thread {id} of unknown group `{group}` ignored", self.id);
            return;
        };
        let thread = Thread::new(id, &process, self.status.get());
        process.add_thread(thread.clone());
        self.threads.borrow_mut().insert(id, thread.clone());
        if let Some(listener) = self.listener() {
            listener.on_thread_added(&thread);
        }
    }

    fn on_thread_exited(self: &Rc<Self>, id: u32, group: &str) {
        {
            let mut phase = self.phase.borrow_mut();
            match &mut *phase {
                Phase::Creating(state) => {
                    if let Some(pos) = state.threads.iter().position(|t| t.backend_id() == id) {
                        let thread = state.threads.remove(pos);
                        if let Some(process) = thread.process() {
                            process.remove_thread(id);
                        }
                        return;
                    }
                }
                Phase::Killing(state) => {
                    state.exited_threads.push(id);
                    return;
                }
                Phase::Idle => {}
            }
        }

        let thread = self.threads.borrow_mut().shift_remove(&id);
        let Some(thread) = thread else {
            debug!(target: "debugger", "backend {}: exit of unknown thread {id} (group `{group}`)", self.id);
            return;
        };
        self.forget_thread(&thread);
        if let Some(process) = thread.process() {
            process.remove_thread(id);
        }
        if let Some(listener) = self.listener() {
            listener.on_thread_removed(&thread);
        }
    }

    fn on_process_exited(self: &Rc<Self>, group: &str, exit_code: Option<i64>) {
        let Some(inferior) = inferior_of(group) else {
            return;
        };
        {
            let mut phase = self.phase.borrow_mut();
            match &mut *phase {
                Phase::Creating(state)
                    if state.process.as_ref().map(|p| p.backend_id()) == Some(inferior) =>
                {
                    state.exited = true;
                    state.exit_code = exit_code;
                    return;
                }
                Phase::Killing(state) => {
                    let process = self.processes.borrow().get(&inferior).cloned();
                    if let Some(process) = &process {
                        process.clear_metadata();
                    }
                    state.exited_process = process;
                    return;
                }
                _ => {}
            }
        }

        if exit_code.is_some() {
            self.last_exit_code.set(exit_code);
        }
        let process = self.processes.borrow().get(&inferior).cloned();
        let Some(process) = process else {
            debug!(target: "debugger", "backend {}: exit of unknown group `{group}`", self.id);
            return;
        };
        if !process.threads().is_empty() {
            warn!(target: "debugger", "backend {}: process {} exited with live threads", self.id, process.pid());
        }
        self.retire_process(&process);
        self.symbols_changed();
    }

    fn forget_thread(&self, thread: &Rc<Thread>) {
        let mut stopped = self.stopped_thread.borrow_mut();
        if stopped.as_ref().map(|t| Rc::ptr_eq(t, thread)) == Some(true) {
            stopped.take();
        }
    }

    /// Remove a process and its threads from the public tables and release its resources.
    fn retire_process(self: &Rc<Self>, process: &Rc<Process>) {
        let listener = self.listener();
        for thread in process.take_threads() {
            self.forget_thread(&thread);
            let removed = self.threads.borrow_mut().shift_remove(&thread.backend_id());
            if let (Some(thread), Some(listener)) = (removed, &listener) {
                listener.on_thread_removed(&thread);
            }
        }
        let removed = self
            .processes
            .borrow_mut()
            .shift_remove(&process.backend_id());
        self.ptys.borrow_mut().remove(&process.backend_id());
        self.free_inferior(process.backend_id());
        process.mark_gone();
        if let (Some(process), Some(listener)) = (removed, &listener) {
            listener.on_process_removed(&process);
        }
    }

    // --------------------------------- inferior slots --------------------------------------------

    fn allocate_inferior(&self) -> Result<u32, Error> {
        let reused = {
            let mut slots = self.inferiors.borrow_mut();
            if !slots.in_use.contains(&1) {
                Some(1)
            } else {
                slots.free.pop_first()
            }
        };
        let number = match reused {
            Some(number) => number,
            None => {
                let text = self.console("add-inferior")?.console_text();
                parse_added_inferior(&text).ok_or(Error::Parse {
                    text,
                    pos: 0,
                    msg: "no inferior number in add-inferior output",
                })?
            }
        };
        self.inferiors.borrow_mut().in_use.insert(number);
        Ok(number)
    }

    fn free_inferior(&self, number: u32) {
        let mut slots = self.inferiors.borrow_mut();
        if slots.in_use.remove(&number) && number != 1 {
            slots.free.insert(number);
        }
    }

    fn select_inferior(&self, number: u32) -> Result<(), Error> {
        if self.inferiors.borrow().current == number {
            return Ok(());
        }
        self.console(&format!("inferior {number}"))?;
        self.inferiors.borrow_mut().current = number;
        Ok(())
    }

    // --------------------------------- execution -------------------------------------------------

    fn set_status_and_notify(self: &Rc<Self>, status: Status) {
        for thread in self.threads() {
            thread.set_status(status);
        }
        if self.status.replace(status) != status {
            self.fire_status_changed();
        }
    }

    /// Waitable done when the backend stops after at least one `running` record, fails as soon
    /// as `error` is set.
    fn break_waitable(&self, error: Rc<RefCell<Option<Error>>>) -> Waitable<()> {
        let origin = self.resume_count.get();
        let id = self.id;
        let weak = self.this.clone();
        Waitable::poll(
            self.session.scheduler(),
            self.session.config().poll_interval(),
            move || {
                if let Some(e) = error.borrow_mut().take() {
                    return Err(e);
                }
                let backend = weak
                    .upgrade()
                    .filter(|b| b.alive.get())
                    .ok_or(Error::BackendGone(id))?;
                Ok((backend.resume_count.get() != origin && backend.status.get() == Status::Break)
                    .then_some(()))
            },
        )
    }

    /// Send a command that resumes execution. A failure restores `Break` and is stored in
    /// `error`.
    fn send_resume(
        self: &Rc<Self>,
        command: String,
        error: Rc<RefCell<Option<Error>>>,
    ) -> Result<(), Error> {
        let weak = self.this.clone();
        let cmd = command.clone();
        self.run_cmd_async(&command, move |response| {
            if let Err(e) = response.and_then(|r| r.expect_class(&cmd, ResultClass::Running)) {
                if let Some(backend) = weak.upgrade() {
                    backend.set_status_and_notify(Status::Break);
                }
                *error.borrow_mut() = Some(e);
            }
        })
    }

    /// Continue the whole backend or one thread. Done once gdb reports the target running.
    pub fn begin_resume(self: &Rc<Self>, thread: Option<&Thread>) -> Waitable<()> {
        let scheduler = self.session.scheduler();
        if let Err(e) = self.ensure_stopped() {
            return Waitable::failed(scheduler, e);
        }
        if !self.has_processes() {
            return Waitable::ready(scheduler, ());
        }

        let origin = self.resume_count.get();
        let error = Rc::new(RefCell::new(None));
        let command = match thread {
            Some(thread) => format!("exec-continue --thread {}", thread.backend_id()),
            None => "exec-continue".to_string(),
        };
        self.set_status_and_notify(Status::Running);
        if let Err(e) = self.send_resume(command, error.clone()) {
            self.set_status_and_notify(Status::Break);
            return Waitable::failed(scheduler, e);
        }

        let id = self.id;
        let weak = self.this.clone();
        Waitable::poll(scheduler, self.session.config().poll_interval(), move || {
            if let Some(e) = error.borrow_mut().take() {
                return Err(e);
            }
            let backend = weak
                .upgrade()
                .filter(|b| b.alive.get())
                .ok_or(Error::BackendGone(id))?;
            Ok((backend.resume_count.get() != origin).then_some(()))
        })
    }

    /// Stop the backend. Concurrent requests share one waitable.
    pub fn begin_interrupt(self: &Rc<Self>) -> Waitable<()> {
        let scheduler = self.session.scheduler();
        if let Err(e) = self.ensure_alive() {
            return Waitable::failed(scheduler, e);
        }
        if self.status.get() == Status::Break {
            return Waitable::ready(scheduler, ());
        }
        let in_flight = self.interrupt.borrow().clone();
        if let Some(waitable) = in_flight.filter(|w| !w.is_done()) {
            return waitable;
        }

        match self.session.config().interrupt {
            InterruptStrategy::Signal => {
                for process in self.processes() {
                    weak_error!(
                        kill(Pid::from_raw(process.pid() as i32), Signal::SIGINT)
                            .map_err(|e| Error::Syscall("kill", e)),
                        "interrupt:"
                    );
                }
            }
            InterruptStrategy::Mi => {
                let id = self.id;
                weak_error!(
                    self.run_cmd_async("exec-interrupt --all", move |response| {
                        if let Err(e) = response.and_then(|r| r.expect_done("exec-interrupt")) {
                            warn!(target: "debugger", "backend {id}: interrupt failed: {e}");
                        }
                    }),
                    "interrupt:"
                );
            }
        }

        let id = self.id;
        let weak = self.this.clone();
        let waitable = Waitable::poll(scheduler, self.session.config().poll_interval(), move || {
            let backend = weak
                .upgrade()
                .filter(|b| b.alive.get())
                .ok_or(Error::BackendGone(id))?;
            Ok((backend.status.get() == Status::Break).then_some(()))
        });
        *self.interrupt.borrow_mut() = Some(waitable.clone());
        waitable
    }

    fn begin_step(self: &Rc<Self>, thread: &Thread, command: &str) -> Waitable<()> {
        let scheduler = self.session.scheduler();
        if let Err(e) = self.ensure_stopped() {
            return Waitable::failed(scheduler, e);
        }
        let error = Rc::new(RefCell::new(None));
        let waitable = self.break_waitable(error.clone());
        self.set_status_and_notify(Status::Running);
        let command = format!("{command} --thread {}", thread.backend_id());
        if let Err(e) = self.send_resume(command, error) {
            self.set_status_and_notify(Status::Break);
            return Waitable::failed(scheduler, e);
        }
        waitable
    }

    /// Step over calls, done when the thread stops again.
    pub fn begin_step_over(self: &Rc<Self>, thread: &Thread) -> Waitable<()> {
        self.begin_step(thread, "exec-next")
    }

    pub fn begin_step_into(self: &Rc<Self>, thread: &Thread) -> Waitable<()> {
        self.begin_step(thread, "exec-step")
    }

    /// Run until the current function returns.
    pub fn begin_step_out(self: &Rc<Self>, thread: &Thread) -> Waitable<()> {
        self.begin_step(thread, "exec-finish")
    }

    // --------------------------------- process control -------------------------------------------

    fn ensure_owned(&self, process: &Process) -> Result<(), Error> {
        if !process.belongs_to(self) || !process.is_alive() {
            return Err(Error::InvalidState(format!(
                "process {} is not debugged by backend {}",
                process.pid(),
                self.id
            )));
        }
        Ok(())
    }

    /// Kill a stopped process, its entities are removed when the command returns.
    pub fn kill_process(self: &Rc<Self>, process: &Rc<Process>) -> Result<(), Error> {
        self.ensure_owned(process)?;
        self.ensure_stopped()?;
        self.select_inferior(process.backend_id())?;

        *self.phase.borrow_mut() = Phase::Killing(KillState::default());
        let text = format!("kill inferior {}", process.backend_id());
        let response = self.run_cmd(&format!("interpreter-exec console {}", quote_console(&text)));
        let state = match std::mem::take(&mut *self.phase.borrow_mut()) {
            Phase::Killing(state) => state,
            _ => KillState::default(),
        };

        let response = response?;
        if !matches!(response.class, ResultClass::Done | ResultClass::Exit) {
            return Err(response
                .expect_done(&text)
                .err()
                .unwrap_or(Error::InvalidState("unreachable kill result".to_string())));
        }
        let Some(exited) = state.exited_process else {
            return Err(Error::KillNoExitedProcess);
        };
        if state.exited_threads.is_empty() {
            warn!(target: "debugger", "backend {}: kill reported no exited threads", self.id);
        }
        self.retire_process(&exited);
        self.symbols_changed();
        Ok(())
    }

    /// Detach from a stopped process, it keeps running on its own.
    pub fn detach_process(self: &Rc<Self>, process: &Rc<Process>) -> Result<(), Error> {
        self.ensure_owned(process)?;
        self.ensure_stopped()?;
        self.select_inferior(process.backend_id())?;
        self.console(&format!("detach inferior {}", process.backend_id()))?;

        // older gdb reports no thread group exit on detach
        if self.processes.borrow().contains_key(&process.backend_id()) {
            self.retire_process(process);
            self.symbols_changed();
        }
        Ok(())
    }

    // --------------------------------- inspection ------------------------------------------------

    /// Frames of a thread, innermost first.
    pub fn call_stack(&self, thread: &Thread) -> Result<Vec<StackFrame>, Error> {
        self.ensure_stopped()?;
        let command = format!("stack-list-frames --thread {}", thread.backend_id());
        let response = self.run_cmd(&command)?.expect_done(&command)?;
        StackFrame::decode_stack(&response.payload)
    }

    pub fn frame(&self, thread: &Thread, n: usize) -> Result<StackFrame, Error> {
        self.ensure_stopped()?;
        let command = format!("stack-list-frames --thread {} {n} {n}", thread.backend_id());
        let response = self.run_cmd(&command)?.expect_done(&command)?;
        StackFrame::decode_stack(&response.payload)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("frame {n}")))
    }

    /// Execute console text, optionally in the context of a thread and frame. The result is
    /// the console output. `debug` toggles the wire trace instead.
    pub fn begin_interpreter_exec(
        &self,
        context: Option<(&Thread, usize)>,
        text: &str,
    ) -> Waitable<String> {
        let scheduler = self.session.scheduler();
        if text.trim() == "debug" {
            let on = crate::log::toggle();
            return Waitable::ready(
                scheduler,
                format!("mi trace {}", if on { "on" } else { "off" }),
            );
        }
        let command = match context {
            Some((thread, frame)) => console_in_command(thread, Some(frame as u32), text),
            None => format!("interpreter-exec console {}", quote_console(text)),
        };
        let text = text.to_string();
        self.run_cmd_waitable(&command)
            .map(move |response| Ok(response.expect_done(&text)?.console_text()))
    }

    pub fn begin_evaluate_expression(
        &self,
        thread: &Thread,
        frame: usize,
        expression: &str,
    ) -> Waitable<String> {
        let command = format!(
            "data-evaluate-expression --thread {} --frame {frame} {}",
            thread.backend_id(),
            quote_console(expression)
        );
        let expression = expression.to_string();
        self.run_cmd_waitable(&command).map(move |response| {
            response
                .expect_done(&expression)?
                .payload
                .text("value")
        })
    }

    // --------------------------------- breakpoints -----------------------------------------------

    /// Insert a breakpoint, gdb errors make an invalid binding.
    pub fn new_breakpoint(self: &Rc<Self>, location: &Location, on_hit: Rc<dyn Fn()>) -> Binding {
        let command = format!("break-insert {}", breakpoint_spec(location));
        let info = self
            .run_cmd(&command)
            .and_then(|r| r.expect_done(&command))
            .and_then(|r| BreakpointInfo::decode(r.payload.tuple("bkpt")?));
        let info = match info {
            Ok(info) => info,
            Err(e) => return Binding::invalid(self, e.to_string()),
        };

        self.breakpoint_hits.borrow_mut().insert(info.number, on_hit);
        let locations = if info.multiple {
            weak_error!(self.breakpoint_locations(info.number), "breakpoint locations:")
                .unwrap_or_default()
        } else {
            info.location().map(|l| vec![l]).unwrap_or_default()
        };
        Binding::valid(self, info.number, locations)
    }

    /// Locations of a multi-location breakpoint from the console table.
    fn breakpoint_locations(&self, number: u32) -> Result<Vec<Location>, Error> {
        let command = format!("break-info {number}");
        let response = self.run_cmd(&command)?.expect_done(&command)?;
        let table = self.console(&format!("info breakpoints {number}"))?;
        let lines = table.console_lines();

        // older gdbs omit the column widths, then the console header is the layout
        let layout = match response
            .payload
            .tuple("BreakpointTable")
            .and_then(BreakpointTableLayout::from_mi_header)
        {
            Ok(layout) => layout,
            Err(e) => {
                debug!(target: "debugger", "breakpoint table header: {e}");
                BreakpointTableLayout::from_console_header(
                    lines.first().map(String::as_str).unwrap_or_default(),
                )?
            }
        };
        let rows = parse_tabular_breakpoint_info(&layout, &lines)?;
        let Some((parent, children)) = rows.split_first() else {
            return Ok(vec![]);
        };
        if parent.str("type")? != "breakpoint" {
            return Err(Error::Parse {
                text: parent.to_string(),
                pos: 0,
                msg: "first row is not a breakpoint",
            });
        }
        Ok(children
            .iter()
            .filter_map(|row| weak_error!(row.str("addr").and_then(parse_console_location)))
            .collect())
    }

    pub fn set_breakpoint_enabled(&self, number: u32, enabled: bool) -> Result<(), Error> {
        let command = if enabled {
            format!("break-enable {number}")
        } else {
            format!("break-disable {number}")
        };
        self.run_cmd(&command)?.expect_done(&command)?;
        Ok(())
    }

    pub fn delete_breakpoint(&self, number: u32) -> Result<(), Error> {
        self.breakpoint_hits.borrow_mut().remove(&number);
        let command = format!("break-delete {number}");
        self.run_cmd(&command)?.expect_done(&command)?;
        Ok(())
    }

    // --------------------------------- shutdown --------------------------------------------------

    /// Stop gdb. Waits for the reader a bounded time, then kills the subprocess.
    pub fn shutdown(&self) -> Result<(), Error> {
        let was_alive = self.alive.replace(false);
        self.session.scheduler().close_port(&self.port);

        if was_alive {
            let token = self.next_token.get();
            self.next_token.set(token + 1);
            if let Some(input) = self.input.borrow_mut().as_mut() {
                mi_trace!("[{}] >>> {token}-gdb-exit", self.id);
                _ = writeln!(input, "{token}-gdb-exit").and_then(|_| input.flush());
            }
        }
        self.input.borrow_mut().take();

        let mut result = Ok(());
        let reader = self.reader.borrow_mut().take();
        if let Some(reader) = reader {
            if !reader.join(self.session.config().reader_shutdown_timeout()) {
                if let Some(child) = self.child.borrow_mut().as_mut() {
                    weak_error!(child.kill(), "kill gdb:");
                }
                result = Err(Error::ReaderTimeout(self.id));
            }
        }
        let child = self.child.borrow_mut().take();
        if let Some(mut child) = child {
            weak_error!(child.wait(), "reap gdb:");
        }

        self.fail_pending(Error::BackendGone(self.id));
        self.inbox.borrow_mut().clear();
        self.ptys.borrow_mut().clear();
        self.breakpoint_hits.borrow_mut().clear();
        self.status.set(Status::Break);
        self.stopped_thread.borrow_mut().take();
        for process in self.processes.borrow_mut().drain(..).map(|(_, p)| p) {
            process.mark_gone();
        }
        self.threads.borrow_mut().clear();
        debug!(target: "debugger", "backend {} shut down", self.id);
        result
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.get_mut().take() {
            _ = child.kill();
            _ = child.wait();
        }
    }
}

fn console_in_command(thread: &Thread, frame: Option<u32>, text: &str) -> String {
    match frame {
        Some(frame) => format!(
            "interpreter-exec --thread {} --frame {frame} console {}",
            thread.backend_id(),
            quote_console(text)
        ),
        None => format!(
            "interpreter-exec --thread {} console {}",
            thread.backend_id(),
            quote_console(text)
        ),
    }
}
