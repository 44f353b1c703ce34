pub mod backend;
pub mod breakpoint;
pub mod command;
pub mod config;
pub mod error;
pub mod location;
pub mod mi;
pub mod process;
pub mod pty;
pub mod scheduler;
pub mod session;
pub mod thread;
pub mod waitable;

pub use breakpoint::Breakpoint;
pub use config::Config;
pub use error::Error;
pub use location::Location;
pub use process::{Process, ProcessMetadata};
pub use session::DebugSession;
pub use thread::{Status, Thread};
pub use waitable::Waitable;

use crate::debugger::backend::{Backend, BackendListener};
use crate::debugger::command::Interpreter;
use crate::weak_error;
use indexmap::IndexMap;
use log::{debug, warn};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};

/// Observer of the debugger state, implemented by a user interface.
///
/// Hooks run on the scheduler thread, inside whatever operation caused them. A hook may
/// call back into the [`Debugger`] but must not expect the state it was notified about to
/// still hold afterwards.
pub trait EventHook {
    /// Aggregate status changed, `Break` means every process is stopped.
    fn on_status_changed(&self, _status: Status) {}
    fn on_active_thread_changed(&self, _thread: Option<&Rc<Thread>>) {}
    fn on_active_frame_changed(&self, _thread: &Rc<Thread>, _frame: usize) {}
    fn on_process_added(&self, _process: &Rc<Process>) {}
    fn on_process_removed(&self, _process: &Rc<Process>) {}
    fn on_thread_added(&self, _thread: &Rc<Thread>) {}
    fn on_thread_removed(&self, _thread: &Rc<Thread>) {}
    /// Called once everything is stopped after the hit.
    fn on_breakpoint_hit(&self, _breakpoint: &Rc<Breakpoint>, _thread: Option<&Rc<Thread>>) {}
    fn on_breakpoints_changed(&self) {}
}

/// Hook that ignores every event.
pub struct NopHook;

impl EventHook for NopHook {}

/// Smallest positive id absent from `map`.
fn smallest_unused<V>(map: &BTreeMap<u32, V>) -> u32 {
    let mut id = 1;
    for used in map.keys() {
        if *used != id {
            break;
        }
        id += 1;
    }
    id
}

/// Multi-process debugger on top of any number of gdb backends.
///
/// Processes and threads of every backend are shown to the user as one collection with
/// small numeric ids. The debugger is stopped (`Break`) only when every backend is, a stop
/// in one backend interrupts all the others.
pub struct Debugger {
    session: DebugSession,
    this: Weak<Debugger>,
    hooks: Box<dyn EventHook>,
    interpreter: Interpreter,

    backends: RefCell<Vec<Rc<Backend>>>,
    processes: RefCell<BTreeMap<u32, Rc<Process>>>,
    threads: RefCell<BTreeMap<u32, Rc<Thread>>>,
    breakpoints: RefCell<IndexMap<u32, Rc<Breakpoint>>>,
    active_thread: RefCell<Option<Rc<Thread>>>,

    /// Actions waiting for the aggregate `Break`.
    on_break: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    last_status: Cell<Status>,
    rebind_queued: Cell<bool>,
}

impl Debugger {
    pub fn new(session: DebugSession, hooks: impl EventHook + 'static) -> Rc<Debugger> {
        Rc::new_cyclic(|this| Debugger {
            session,
            this: this.clone(),
            hooks: Box::new(hooks),
            interpreter: Interpreter::new(),
            backends: RefCell::default(),
            processes: RefCell::default(),
            threads: RefCell::default(),
            breakpoints: RefCell::default(),
            active_thread: RefCell::default(),
            on_break: RefCell::default(),
            last_status: Cell::new(Status::Break),
            rebind_queued: Cell::new(false),
        })
    }

    pub fn session(&self) -> &DebugSession {
        &self.session
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn backends(&self) -> Vec<Rc<Backend>> {
        self.backends.borrow().clone()
    }

    /// Processes ordered by id.
    pub fn processes(&self) -> Vec<Rc<Process>> {
        self.processes.borrow().values().cloned().collect()
    }

    pub fn process(&self, id: u32) -> Option<Rc<Process>> {
        self.processes.borrow().get(&id).cloned()
    }

    /// Threads of every process ordered by id.
    pub fn threads(&self) -> Vec<Rc<Thread>> {
        self.threads.borrow().values().cloned().collect()
    }

    pub fn thread(&self, id: u32) -> Option<Rc<Thread>> {
        self.threads.borrow().get(&id).cloned()
    }

    pub fn breakpoints(&self) -> Vec<Rc<Breakpoint>> {
        self.breakpoints.borrow().values().cloned().collect()
    }

    pub fn breakpoint(&self, id: u32) -> Option<Rc<Breakpoint>> {
        self.breakpoints.borrow().get(&id).cloned()
    }

    pub fn active_thread(&self) -> Option<Rc<Thread>> {
        self.active_thread.borrow().clone()
    }

    pub fn active_process(&self) -> Option<Rc<Process>> {
        self.active_thread().and_then(|t| t.process())
    }

    /// `Break` if there are no threads or every backend is stopped.
    pub fn status(&self) -> Status {
        if self.threads.borrow().is_empty() {
            return Status::Break;
        }
        let all_stopped = self
            .backends
            .borrow()
            .iter()
            .all(|b| b.status() == Status::Break);
        if all_stopped {
            Status::Break
        } else {
            Status::Running
        }
    }

    fn failed<T: Clone + 'static>(&self, error: Error) -> Waitable<T> {
        Waitable::failed(self.session.scheduler(), error)
    }

    fn ensure_stopped(&self) -> Result<(), Error> {
        if self.status() != Status::Break {
            return Err(Error::InvalidState("debugger is running".to_string()));
        }
        Ok(())
    }

    // --------------------------------- backend selection -----------------------------------------

    /// Backend for a new process: a shared multi-inferior gdb if allowed, an idle gdb, or a
    /// new one.
    fn backend_for_new_process(&self) -> Result<Rc<Backend>, Error> {
        let backends = self.backends();
        if self.session.config().multi_inferior {
            let shared = backends
                .iter()
                .find(|b| b.is_alive() && b.version().supports_multi_inferior());
            if let Some(backend) = shared {
                return Ok(backend.clone());
            }
        }
        let idle = backends
            .iter()
            .find(|b| b.is_alive() && !b.has_processes() && !b.is_creating());
        match idle {
            Some(backend) => Ok(backend.clone()),
            None => self.add_backend(),
        }
    }

    fn add_backend(&self) -> Result<Rc<Backend>, Error> {
        let listener: Weak<dyn BackendListener> = self.this.clone();
        let backend = Backend::start(&self.session, listener)?;
        debug!(target: "debugger", "backend {} added", backend.id());
        let added = backend.clone();
        self.change_backends(move |backends| backends.push(added));
        Ok(backend)
    }

    /// Change the backend set, every breakpoint is reinstalled on the new set.
    fn change_backends(&self, change: impl FnOnce(&mut Vec<Rc<Backend>>)) {
        let breakpoints = self.breakpoints();
        let rebind = || {
            for bp in &breakpoints {
                bp.unbind();
            }
            change(&mut self.backends.borrow_mut());
            let backends = self.backends();
            for bp in &breakpoints {
                self.bind_breakpoint(bp, &backends);
            }
        };
        if breakpoints.is_empty() {
            rebind();
            return;
        }
        weak_error!(self.with_stopped(rebind), "breakpoints reinstall:");
        self.hooks.on_breakpoints_changed();
    }

    /// Shut down a backend that debugs nothing. The last live backend stays if configured so.
    fn collect_backend(&self, backend: &Rc<Backend>) {
        if backend.has_processes() || backend.is_creating() {
            return;
        }
        let (known, count) = {
            let backends = self.backends.borrow();
            (
                backends.iter().any(|b| Rc::ptr_eq(b, backend)),
                backends.len(),
            )
        };
        if !known {
            return;
        }
        if count == 1 && backend.is_alive() && self.session.config().keep_warm_backend {
            return;
        }

        debug!(target: "debugger", "backend {} collected", backend.id());
        self.change_backends(|backends| backends.retain(|b| !Rc::ptr_eq(b, backend)));
        weak_error!(backend.shutdown(), "backend shutdown:");
    }

    fn schedule_collect(&self, backend: Option<Rc<Backend>>) {
        let Some(backend) = backend else {
            return;
        };
        let this = self.this.clone();
        self.session.scheduler().post(move || {
            if let Some(debugger) = this.upgrade() {
                debugger.collect_backend(&backend);
            }
        });
    }

    // --------------------------------- stop coordination -----------------------------------------

    /// Run `f` once the aggregate status is `Break`, at once if it already is.
    pub fn run_on_status_break(&self, f: impl FnOnce() + 'static) {
        if self.status() == Status::Break {
            f();
        } else {
            self.on_break.borrow_mut().push_back(Box::new(f));
        }
    }

    fn drain_on_break(&self) {
        while self.status() == Status::Break {
            let next = self.on_break.borrow_mut().pop_front();
            match next {
                Some(f) => f(),
                None => break,
            }
        }
    }

    fn interrupt_others(&self, origin: &Rc<Backend>) {
        for backend in self.backends() {
            if Rc::ptr_eq(&backend, origin)
                || !backend.has_processes()
                || backend.status() != Status::Running
            {
                continue;
            }
            let id = backend.id();
            backend.begin_interrupt().on_done(move |result| {
                if let Err(e) = result {
                    warn!(target: "debugger", "backend {id}: interrupt failed: {e}");
                }
            });
        }
    }

    fn update_status(&self) {
        if self.status() == Status::Break {
            self.drain_on_break();
        }
        let status = self.status();
        if self.last_status.replace(status) != status {
            self.hooks.on_status_changed(status);
        }
    }

    /// Run `f` with every backend stopped. Execution resumes afterwards if it was running.
    /// A failed interrupt is logged and `f` runs anyway, only a quit cancels it.
    fn with_stopped<R>(&self, f: impl FnOnce() -> R) -> Result<R, Error> {
        let was_running = self.status() == Status::Running;
        if was_running {
            match self.begin_interrupt().wait() {
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => warn!(target: "debugger", "interrupt before change: {e}"),
                Ok(()) => {}
            }
        }
        let result = f();
        if was_running {
            if let Some(thread) = self.active_thread() {
                self.begin_resume(&thread).on_done(|result| {
                    if let Err(e) = result {
                        warn!(target: "debugger", "resume after breakpoint change: {e}");
                    }
                });
            }
        }
        Ok(result)
    }

    // --------------------------------- process control -------------------------------------------

    /// Start a program stopped at its entry point.
    pub fn begin_launch(&self, cmdline: &[String]) -> Waitable<Rc<Process>> {
        let backend = match self.backend_for_new_process() {
            Ok(backend) => backend,
            Err(e) => return self.failed(e),
        };
        let waitable = backend.begin_launch(cmdline);
        self.collect_on_failure(&waitable, backend);
        waitable
    }

    /// Attach to a running process, it ends up stopped.
    pub fn begin_attach(&self, pid: u32) -> Waitable<Rc<Process>> {
        if let Some(p) = self.processes().into_iter().find(|p| p.pid() == pid) {
            return self.failed(Error::InvalidState(format!(
                "process {pid} is already debugged as {}",
                p.frontend_id().unwrap_or_default()
            )));
        }
        let backend = match self.backend_for_new_process() {
            Ok(backend) => backend,
            Err(e) => return self.failed(e),
        };
        let waitable = backend.begin_attach(pid);
        self.collect_on_failure(&waitable, backend);
        waitable
    }

    fn collect_on_failure(&self, waitable: &Waitable<Rc<Process>>, backend: Rc<Backend>) {
        let this = self.this.clone();
        waitable.on_done(move |result| {
            if result.is_err() {
                if let Some(debugger) = this.upgrade() {
                    debugger.schedule_collect(Some(backend));
                }
            }
        });
    }

    pub fn kill(&self, process: &Rc<Process>) -> Result<(), Error> {
        let backend = process
            .backend()
            .ok_or_else(|| Error::NotFound(format!("backend of process {}", process.pid())))?;
        if backend.status() == Status::Running {
            backend.begin_interrupt().wait()?;
        }
        backend.kill_process(process)?;
        self.collect_backend(&backend);
        Ok(())
    }

    pub fn detach(&self, process: &Rc<Process>) -> Result<(), Error> {
        let backend = process
            .backend()
            .ok_or_else(|| Error::NotFound(format!("backend of process {}", process.pid())))?;
        if backend.status() == Status::Running {
            backend.begin_interrupt().wait()?;
        }
        backend.detach_process(process)?;
        self.collect_backend(&backend);
        Ok(())
    }

    // --------------------------------- execution -------------------------------------------------

    /// Stop every process, done when all of them are stopped.
    pub fn begin_interrupt(&self) -> Waitable<()> {
        let targets: Vec<_> = self
            .backends()
            .into_iter()
            .filter(|b| b.has_processes())
            .collect();
        let (waitable, counter) =
            Waitable::counter(self.session.scheduler(), targets.len() as i64, 0);
        for backend in targets {
            let counter = counter.clone();
            backend.begin_interrupt().on_done(move |result| match result {
                Ok(()) => counter.decrement(),
                Err(e) => counter.abort(e.clone()),
            });
        }
        waitable
    }

    /// Continue every process, `thread` is resumed explicitly in its backend.
    pub fn begin_resume(&self, thread: &Rc<Thread>) -> Waitable<()> {
        if let Err(e) = self.ensure_stopped() {
            return self.failed(e);
        }
        let Some(origin) = thread.backend() else {
            return self.failed(Error::NotFound("thread backend".to_string()));
        };
        let siblings = self.siblings(&origin);

        let (waitable, counter) =
            Waitable::counter(self.session.scheduler(), 1 + siblings.len() as i64, 0);
        let count_down = |w: Waitable<()>| {
            let counter = counter.clone();
            w.on_done(move |result| match result {
                Ok(()) => counter.decrement(),
                Err(e) => counter.abort(e.clone()),
            });
        };
        count_down(origin.begin_resume(Some(thread.as_ref())));
        for sibling in siblings {
            count_down(sibling.begin_resume(None));
        }
        waitable
    }

    fn siblings(&self, origin: &Rc<Backend>) -> Vec<Rc<Backend>> {
        self.backends()
            .into_iter()
            .filter(|b| !Rc::ptr_eq(b, origin) && b.has_processes())
            .collect()
    }

    /// Step `thread`, the other backends run until the step ends.
    fn begin_step(
        &self,
        thread: &Rc<Thread>,
        step: impl FnOnce(&Rc<Backend>, &Thread) -> Waitable<()>,
    ) -> Waitable<()> {
        if let Err(e) = self.ensure_stopped() {
            return self.failed(e);
        }
        let Some(origin) = thread.backend() else {
            return self.failed(Error::NotFound("thread backend".to_string()));
        };

        let stepping = step(&origin, thread.as_ref());
        if let Some(Err(e)) = stepping.result() {
            return self.failed(e);
        }
        for sibling in self.siblings(&origin) {
            let id = sibling.id();
            sibling.begin_resume(None).on_done(move |result| {
                if let Err(e) = result {
                    warn!(target: "debugger", "backend {id}: resume during step failed: {e}");
                }
            });
        }

        let this = self.this.clone();
        Waitable::poll(
            self.session.scheduler(),
            self.session.config().poll_interval(),
            move || {
                match stepping.result() {
                    None => return Ok(None),
                    Some(Err(e)) => return Err(e),
                    Some(Ok(())) => {}
                }
                let debugger = this.upgrade().ok_or(Error::Cancelled)?;
                Ok((debugger.status() == Status::Break).then_some(()))
            },
        )
    }

    pub fn begin_step_over(&self, thread: &Rc<Thread>) -> Waitable<()> {
        self.begin_step(thread, |backend, thread| backend.begin_step_over(thread))
    }

    pub fn begin_step_into(&self, thread: &Rc<Thread>) -> Waitable<()> {
        self.begin_step(thread, |backend, thread| backend.begin_step_into(thread))
    }

    pub fn begin_step_out(&self, thread: &Rc<Thread>) -> Waitable<()> {
        self.begin_step(thread, |backend, thread| backend.begin_step_out(thread))
    }

    // --------------------------------- selection -------------------------------------------------

    /// Make `thread` the target of frame and console commands. Unknown threads are ignored.
    pub fn set_active_thread(&self, thread: Option<Rc<Thread>>) {
        if let Some(t) = &thread {
            let known = t
                .frontend_id()
                .and_then(|id| self.thread(id))
                .map(|known| Rc::ptr_eq(&known, t))
                .unwrap_or_default();
            if !known {
                debug!(target: "debugger", "activation of unknown thread {} ignored", t.backend_id());
                return;
            }
        }

        let same = match (&*self.active_thread.borrow(), &thread) {
            (Some(current), Some(new)) => Rc::ptr_eq(current, new),
            (None, None) => true,
            _ => false,
        };
        if same {
            return;
        }
        if let Some(t) = &thread {
            if let Some(process) = t.process() {
                process.set_last_active_thread(t);
            }
        }
        *self.active_thread.borrow_mut() = thread.clone();
        self.hooks.on_active_thread_changed(thread.as_ref());
    }

    /// Select frame `n` of the active thread.
    pub fn set_active_frame(&self, n: usize) -> Result<(), Error> {
        let thread = self
            .active_thread()
            .ok_or_else(|| Error::NotFound("active thread".to_string()))?;
        thread.set_active_frame(n);
        self.hooks.on_active_frame_changed(&thread, n);
        Ok(())
    }

    // --------------------------------- breakpoints -----------------------------------------------

    fn bind_breakpoint(&self, breakpoint: &Rc<Breakpoint>, backends: &[Rc<Backend>]) {
        let this = self.this.clone();
        let weak_bp = Rc::downgrade(breakpoint);
        breakpoint.bind(backends, |backend| {
            let this = this.clone();
            let bp = weak_bp.clone();
            let backend = Rc::downgrade(backend);
            let hit: Rc<dyn Fn()> = Rc::new(move || {
                if let (Some(debugger), Some(bp), Some(backend)) =
                    (this.upgrade(), bp.upgrade(), backend.upgrade())
                {
                    debugger.on_breakpoint_hit(&backend, bp);
                }
            });
            hit
        });
    }

    fn rebind_breakpoint(&self, breakpoint: &Rc<Breakpoint>) {
        breakpoint.unbind();
        self.bind_breakpoint(breakpoint, &self.backends());
    }

    fn on_breakpoint_hit(&self, backend: &Rc<Backend>, breakpoint: Rc<Breakpoint>) {
        debug!(target: "debugger", "breakpoint {} hit in backend {}", breakpoint.id(), backend.id());
        self.interrupt_others(backend);
        let this = self.this.clone();
        let thread = backend.stopped_thread();
        self.run_on_status_break(move || {
            if let Some(debugger) = this.upgrade() {
                let thread = thread.filter(|t| t.frontend_id().is_some());
                debugger.hooks.on_breakpoint_hit(&breakpoint, thread.as_ref());
            }
        });
    }

    /// Create a breakpoint in every backend, current and future.
    pub fn new_breakpoint(&self, location: Location) -> Result<Rc<Breakpoint>, Error> {
        let breakpoint = Rc::new(Breakpoint::new(
            self.session.next_breakpoint_id(),
            location,
        ));
        self.with_stopped(|| self.bind_breakpoint(&breakpoint, &self.backends()))?;
        self.breakpoints
            .borrow_mut()
            .insert(breakpoint.id(), breakpoint.clone());
        self.hooks.on_breakpoints_changed();
        Ok(breakpoint)
    }

    pub fn set_breakpoint_enabled(
        &self,
        breakpoint: &Rc<Breakpoint>,
        enabled: bool,
    ) -> Result<(), Error> {
        if breakpoint.is_enabled() == enabled {
            return Ok(());
        }
        breakpoint.set_enabled(enabled);
        self.with_stopped(|| {
            for binding in breakpoint.bindings() {
                if let (Some(backend), Some(number)) = (binding.backend(), binding.number) {
                    weak_error!(
                        backend.set_breakpoint_enabled(number, enabled),
                        "breakpoint enable:"
                    );
                }
            }
        })?;
        self.hooks.on_breakpoints_changed();
        Ok(())
    }

    /// Move a breakpoint, it is enabled at the new location.
    pub fn set_breakpoint_location(
        &self,
        breakpoint: &Rc<Breakpoint>,
        location: Location,
    ) -> Result<(), Error> {
        breakpoint.set_location(location);
        breakpoint.set_enabled(true);
        self.with_stopped(|| self.rebind_breakpoint(breakpoint))?;
        self.hooks.on_breakpoints_changed();
        Ok(())
    }

    pub fn delete_breakpoint(&self, breakpoint: &Rc<Breakpoint>) -> Result<(), Error> {
        self.with_stopped(|| breakpoint.unbind())?;
        self.breakpoints.borrow_mut().shift_remove(&breakpoint.id());
        self.hooks.on_breakpoints_changed();
        Ok(())
    }

    // --------------------------------- console ---------------------------------------------------

    /// Execute a console command through the interpreter.
    pub fn begin_interpreter_exec(&self, text: &str) -> Waitable<String> {
        self.interpreter.exec(self, text)
    }

    /// Execute console text in gdb, in the active thread and frame if there is one.
    pub fn begin_console(&self, text: &str) -> Waitable<String> {
        if let Some(thread) = self.active_thread() {
            return match thread.backend() {
                Some(backend) => {
                    backend.begin_interpreter_exec(Some((&thread, thread.active_frame())), text)
                }
                None => self.failed(Error::NotFound("thread backend".to_string())),
            };
        }
        match self.backends().into_iter().find(|b| b.is_alive()) {
            Some(backend) => backend.begin_interpreter_exec(None, text),
            None => self.failed(Error::NotFound("active thread".to_string())),
        }
    }

    /// Value of an expression in the active frame.
    pub fn begin_evaluate(&self, expression: &str) -> Waitable<String> {
        let Some(thread) = self.active_thread() else {
            return self.failed(Error::NotFound("active thread".to_string()));
        };
        match thread.backend() {
            Some(backend) => {
                backend.begin_evaluate_expression(&thread, thread.active_frame(), expression)
            }
            None => self.failed(Error::NotFound("thread backend".to_string())),
        }
    }

    // --------------------------------- shutdown --------------------------------------------------

    /// Stop every gdb. Debugged processes are killed by their gdb.
    pub fn shutdown(&self) {
        let backends = std::mem::take(&mut *self.backends.borrow_mut());
        for backend in backends {
            weak_error!(backend.shutdown(), "backend shutdown:");
        }
        self.active_thread.borrow_mut().take();
        self.threads.borrow_mut().clear();
        self.processes.borrow_mut().clear();
        self.on_break.borrow_mut().clear();
    }
}

impl BackendListener for Debugger {
    fn on_status_changed(&self, backend: &Rc<Backend>) {
        match backend.status() {
            Status::Break => {
                if let Some(thread) = backend.stopped_thread() {
                    let this = self.this.clone();
                    self.run_on_status_break(move || {
                        if let Some(debugger) = this.upgrade() {
                            debugger.set_active_thread(Some(thread));
                        }
                    });
                }
                self.interrupt_others(backend);
            }
            Status::Running => {
                for thread in backend.threads() {
                    thread.set_active_frame(0);
                }
            }
        }
        self.update_status();
    }

    fn on_process_added(&self, process: &Rc<Process>) {
        let id = smallest_unused(&self.processes.borrow());
        process.set_frontend_id(Some(id));
        self.processes.borrow_mut().insert(id, process.clone());
        debug!(target: "debugger", "process {id} added: {}", process.describe());
        self.hooks.on_process_added(process);
    }

    fn on_process_removed(&self, process: &Rc<Process>) {
        if let Some(id) = process.frontend_id() {
            self.processes.borrow_mut().remove(&id);
        }
        debug!(target: "debugger", "process {} removed", process.describe());
        self.hooks.on_process_removed(process);
        process.set_frontend_id(None);
        self.schedule_collect(process.backend());
        self.update_status();
    }

    fn on_thread_added(&self, thread: &Rc<Thread>) {
        let id = smallest_unused(&self.threads.borrow());
        thread.set_frontend_id(Some(id));
        self.threads.borrow_mut().insert(id, thread.clone());
        self.hooks.on_thread_added(thread);
        if self.active_thread.borrow().is_none() {
            self.set_active_thread(Some(thread.clone()));
        }
    }

    fn on_thread_removed(&self, thread: &Rc<Thread>) {
        if let Some(id) = thread.frontend_id() {
            self.threads.borrow_mut().remove(&id);
        }
        self.hooks.on_thread_removed(thread);
        thread.set_frontend_id(None);

        let was_active = self
            .active_thread
            .borrow()
            .as_ref()
            .map(|t| Rc::ptr_eq(t, thread))
            .unwrap_or_default();
        if was_active {
            self.active_thread.borrow_mut().take();
            let replacement = thread
                .process()
                .and_then(|p| p.threads().into_iter().find(|t| t.frontend_id().is_some()))
                .or_else(|| self.threads().into_iter().next());
            match replacement {
                Some(t) => self.set_active_thread(Some(t)),
                None => self.hooks.on_active_thread_changed(None),
            }
        }
    }

    fn on_symbols_changed(&self, backend: &Rc<Backend>) {
        debug!(target: "debugger", "symbols of backend {} changed", backend.id());
        if self.breakpoints.borrow().is_empty() || self.rebind_queued.replace(true) {
            return;
        }
        let this = self.this.clone();
        self.run_on_status_break(move || {
            let Some(debugger) = this.upgrade() else {
                return;
            };
            debugger.rebind_queued.set(false);
            for bp in debugger.breakpoints() {
                debugger.rebind_breakpoint(&bp);
            }
            debugger.hooks.on_breakpoints_changed();
        });
    }
}
