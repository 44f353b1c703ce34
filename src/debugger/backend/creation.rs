//! Launch and attach.
//!
//! Creating a process takes several gdb round trips with stops in between. Each creation is a
//! task object that keeps its progress in fields and advances from waitable callbacks, so the
//! scheduler stays free while the debuggee runs to its entry point.

use super::{mi_arg, Backend, CreationState, Phase};
use crate::debugger::error::Error;
use crate::debugger::mi::console::{parse_compilation_dir, parse_last_frame_number};
use crate::debugger::mi::{parse_loose_dict, BreakpointInfo, ResultClass};
use crate::debugger::process::{os_cmdline, Process, ProcessMetadata};
use crate::debugger::pty::Pty;
use crate::debugger::thread::{Status, Thread};
use crate::debugger::waitable::{Completer, Waitable};
use crate::{muted_error, weak_error};
use itertools::Itertools;
use log::debug;
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

impl Backend {
    fn check_can_create(&self) -> Result<(), Error> {
        self.ensure_stopped()?;
        if self.is_creating() {
            return Err(Error::InvalidState(format!(
                "backend {} is already creating a process",
                self.id
            )));
        }
        if self.has_processes() && !self.session.config().multi_inferior {
            return Err(Error::InvalidState(format!(
                "backend {} already debugs a process",
                self.id
            )));
        }
        Ok(())
    }

    fn take_creation(&self) -> CreationState {
        let mut phase = self.phase.borrow_mut();
        match std::mem::take(&mut *phase) {
            Phase::Creating(state) => state,
            other => {
                *phase = other;
                CreationState::default()
            }
        }
    }

    /// Forget a failed creation. A process that already started is killed or detached.
    fn abort_creation(&self, inferior: Option<u32>, attached: bool) {
        let state = self.take_creation();
        if let Some(process) = state.process.filter(|_| !state.exited) {
            let text = if attached {
                format!("detach inferior {}", process.backend_id())
            } else {
                format!("kill inferior {}", process.backend_id())
            };
            muted_error!(self.console(&text));
            process.mark_gone();
        }
        if let Some(inferior) = inferior {
            self.free_inferior(inferior);
        }
        self.status.set(Status::Break);
    }

    /// Continue a process under creation, done at the next stop.
    fn continue_until_stop(self: &Rc<Self>) -> Result<Waitable<()>, Error> {
        let error = Rc::new(RefCell::new(None));
        let waitable = self.break_waitable(error.clone());
        self.send_resume("exec-continue".to_string(), error)?;
        Ok(waitable)
    }

    fn compilation_dir(&self, thread: &Thread) -> Result<Option<String>, Error> {
        let frames = self.console_in(thread, None, "where")?.console_lines();
        let outermost = parse_last_frame_number(&frames);
        let source = self.console_in(thread, outermost, "info source")?;
        Ok(parse_compilation_dir(&source.console_lines()))
    }

    fn query_metadata(
        &self,
        process: &Process,
        thread: Option<&Rc<Thread>>,
        pty: Option<PathBuf>,
    ) -> ProcessMetadata {
        let info = weak_error!(self.console("info proc"), "info proc:")
            .map(|r| r.console_lines())
            .unwrap_or_default();
        let dict = weak_error!(parse_loose_dict(&info), "info proc:").unwrap_or_default();
        let pid = dict
            .get("process")
            .and_then(|p| p.parse().ok())
            .unwrap_or(process.pid());
        let compilation_dir = thread
            .and_then(|t| weak_error!(self.compilation_dir(t), "compilation dir:"))
            .flatten();
        let cmdline = os_cmdline(pid)
            .or_else(|| {
                dict.get("cmdline")
                    .map(|c| c.split_whitespace().map(ToString::to_string).collect())
            })
            .unwrap_or_default();

        ProcessMetadata {
            pid,
            exe: dict.get("exe").cloned(),
            cwd: dict.get("cwd").cloned(),
            compilation_dir,
            cmdline,
            inferior: process.backend_id(),
            pty,
        }
    }

    /// Move a created process into the public tables and tell the listener.
    fn publish_process(
        self: &Rc<Self>,
        process: &Rc<Process>,
        threads: Vec<Rc<Thread>>,
        metadata: ProcessMetadata,
        launched: bool,
        pty: Option<Pty>,
    ) {
        process.set_metadata(metadata);
        process.set_was_launched(launched);
        if let Some(pty) = pty {
            self.ptys.borrow_mut().insert(process.backend_id(), pty);
        }
        self.processes
            .borrow_mut()
            .insert(process.backend_id(), process.clone());
        for thread in &threads {
            self.threads
                .borrow_mut()
                .insert(thread.backend_id(), thread.clone());
        }
        debug!(target: "debugger", "backend {}: process {} ready with {} thread(s)", self.id, process.pid(), threads.len());

        if let Some(listener) = self.listener() {
            listener.on_process_added(process);
            for thread in &threads {
                listener.on_thread_added(thread);
            }
        }
        self.fire_status_changed();
        self.symbols_changed();
    }

    /// Start a program stopped at the entry symbol. `cmdline[0]` is the executable.
    pub fn begin_launch(self: &Rc<Self>, cmdline: &[String]) -> Waitable<Rc<Process>> {
        let (waitable, completer) = Waitable::pending(self.session.scheduler());
        let task = Rc::new(LaunchTask {
            backend: self.clone(),
            cmdline: cmdline.to_vec(),
            step: Cell::new(LaunchStep::LoadingSymbols),
            inferior: Cell::new(None),
            pty: RefCell::new(None),
            entry_breakpoint: Cell::new(None),
            completer,
        });
        if let Err(e) = task.start() {
            task.fail(e);
        }
        waitable
    }

    /// Attach to a running process. A process waiting in the launcher is released and run to
    /// its entry symbol first.
    pub fn begin_attach(self: &Rc<Self>, pid: u32) -> Waitable<Rc<Process>> {
        let (waitable, completer) = Waitable::pending(self.session.scheduler());
        let task = Rc::new(AttachTask {
            backend: self.clone(),
            pid,
            step: Cell::new(AttachStep::Attaching),
            inferior: Cell::new(None),
            entry_breakpoint: Cell::new(None),
            completer,
        });
        if let Err(e) = task.start() {
            task.fail(e);
        }
        waitable
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum LaunchStep {
    LoadingSymbols,
    Running,
    Finalizing,
    Done,
}

struct LaunchTask {
    backend: Rc<Backend>,
    cmdline: Vec<String>,
    step: Cell<LaunchStep>,
    inferior: Cell<Option<u32>>,
    pty: RefCell<Option<Pty>>,
    entry_breakpoint: Cell<Option<u32>>,
    completer: Completer<Rc<Process>>,
}

impl LaunchTask {
    fn start(self: &Rc<Self>) -> Result<(), Error> {
        let backend = &self.backend;
        let exe = self
            .cmdline
            .first()
            .ok_or_else(|| Error::InvalidState("empty command line".to_string()))?;
        backend.check_can_create()?;

        let inferior = backend.allocate_inferior()?;
        self.inferior.set(Some(inferior));
        backend.select_inferior(inferior)?;

        let pty = Pty::open()?;
        let command = format!(
            "inferior-tty-set {}",
            mi_arg(&pty.slave_path().to_string_lossy())
        );
        backend.run_cmd(&command)?.expect_done(&command)?;
        *self.pty.borrow_mut() = Some(pty);

        let command = format!("file-exec-and-symbols {}", mi_arg(exe));
        let task = self.clone();
        let cmd = command.clone();
        backend.run_cmd_async(&command, move |response| {
            let result = response
                .and_then(|r| r.expect_done(&cmd))
                .and_then(|_| task.run());
            if let Err(e) = result {
                task.fail(e);
            }
        })
    }

    /// Symbols are loaded: run to the entry breakpoint.
    fn run(self: &Rc<Self>) -> Result<(), Error> {
        self.step.set(LaunchStep::Running);
        let backend = &self.backend;

        let args = &self.cmdline[1..];
        if !args.is_empty() {
            let command = format!("exec-arguments {}", args.iter().map(|a| mi_arg(a)).join(" "));
            backend.run_cmd(&command)?.expect_done(&command)?;
        }

        *backend.phase.borrow_mut() = Phase::Creating(CreationState::default());
        let command = format!(
            "break-insert {}",
            mi_arg(&backend.session.config().entry_symbol)
        );
        let response = backend.run_cmd(&command)?.expect_done(&command)?;
        let entry = BreakpointInfo::decode(response.payload.tuple("bkpt")?)?;
        self.entry_breakpoint.set(Some(entry.number));

        let stop = backend.break_waitable(Rc::default());
        backend
            .run_cmd("exec-run")?
            .expect_class("exec-run", ResultClass::Running)?;

        let task = self.clone();
        stop.on_done(move |result| {
            match result.clone().and_then(|_| task.finalize()) {
                Ok(process) => {
                    task.step.set(LaunchStep::Done);
                    task.completer.complete(process);
                }
                Err(e) => task.fail(e),
            }
        });
        Ok(())
    }

    fn finalize(&self) -> Result<Rc<Process>, Error> {
        self.step.set(LaunchStep::Finalizing);
        let backend = &self.backend;
        let state = backend.take_creation();
        if let Some(number) = self.entry_breakpoint.take() {
            weak_error!(backend.delete_breakpoint(number), "entry breakpoint:");
        }

        let process = state.process.ok_or(Error::NoProcessCreated)?;
        if state.exited || state.threads.is_empty() {
            process.mark_gone();
            return Err(Error::LaunchFailed(
                state.exit_code.or(backend.last_exit_code()),
            ));
        }

        let pty = self.pty.borrow_mut().take();
        let metadata = backend.query_metadata(
            &process,
            state.threads.first(),
            pty.as_ref().map(|p| p.slave_path().to_path_buf()),
        );
        backend.publish_process(&process, state.threads, metadata, true, pty);
        Ok(process)
    }

    fn fail(&self, error: Error) {
        if self.completer.is_done() {
            return;
        }
        debug!(target: "debugger", "backend {}: launch failed at {:?}: {error}", self.backend.id, self.step.get());
        let backend = &self.backend;
        if backend.is_alive() {
            if let Some(number) = self.entry_breakpoint.take() {
                muted_error!(backend.delete_breakpoint(number));
            }
            backend.abort_creation(self.inferior.take(), false);
        }
        self.pty.borrow_mut().take();
        self.step.set(LaunchStep::Done);
        self.completer.fail(error);
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum AttachStep {
    Attaching,
    UnblockingLauncher,
    AtExec,
    AtEntry,
    Done,
}

struct AttachTask {
    backend: Rc<Backend>,
    pid: u32,
    step: Cell<AttachStep>,
    inferior: Cell<Option<u32>>,
    entry_breakpoint: Cell<Option<u32>>,
    completer: Completer<Rc<Process>>,
}

impl AttachTask {
    fn start(self: &Rc<Self>) -> Result<(), Error> {
        let backend = &self.backend;
        backend.check_can_create()?;
        let inferior = backend.allocate_inferior()?;
        self.inferior.set(Some(inferior));
        backend.select_inferior(inferior)?;

        *backend.phase.borrow_mut() = Phase::Creating(CreationState::default());
        // the stop that ends the attach flips it back
        backend.status.set(Status::Running);

        let error = Rc::new(RefCell::new(None));
        let attached = Rc::new(Cell::new(false));
        let command = format!("target-attach {}", self.pid);
        {
            let error = error.clone();
            let attached = attached.clone();
            let cmd = command.clone();
            backend.run_cmd_async(&command, move |response| {
                match response.and_then(|r| r.expect_done(&cmd)) {
                    Ok(_) => attached.set(true),
                    Err(e) => *error.borrow_mut() = Some(e),
                }
            })?;
        }

        let id = backend.id;
        let weak = Rc::downgrade(backend);
        let stop = Waitable::poll(
            backend.session.scheduler(),
            backend.session.config().poll_interval(),
            move || {
                if let Some(e) = error.borrow_mut().take() {
                    return Err(e);
                }
                let backend = weak
                    .upgrade()
                    .filter(|b| b.is_alive())
                    .ok_or(Error::BackendGone(id))?;
                let has_process =
                    matches!(&*backend.phase.borrow(), Phase::Creating(s) if s.process.is_some());
                Ok((attached.get() && has_process && backend.status() == Status::Break)
                    .then_some(()))
            },
        );
        let task = self.clone();
        stop.on_done(move |result| task.advance(result.clone()));
        Ok(())
    }

    fn advance(self: &Rc<Self>, stopped: Result<(), Error>) {
        match stopped.and_then(|_| self.next_step()) {
            Ok(Some(next_stop)) => {
                let task = self.clone();
                next_stop.on_done(move |result| task.advance(result.clone()));
            }
            Ok(None) => {}
            Err(e) => self.fail(e),
        }
    }

    /// Act on a stop, return the waitable of the next stop or `None` when attached.
    fn next_step(self: &Rc<Self>) -> Result<Option<Waitable<()>>, Error> {
        let backend = &self.backend;
        let config = backend.session.config();
        match self.step.get() {
            AttachStep::Attaching => {
                let sentinel = &config.launcher_sentinel;
                if muted_error!(backend.console(&format!("info address {sentinel}"))).is_none() {
                    return self.publish();
                }
                self.step.set(AttachStep::UnblockingLauncher);
                backend.console(&format!("set var *(int *)&{sentinel} = 0"))?;
                backend.console("tcatch exec")?;
                self.step.set(AttachStep::AtExec);
                Ok(Some(backend.continue_until_stop()?))
            }
            AttachStep::AtExec => {
                let command = format!("break-insert {}", mi_arg(&config.entry_symbol));
                let response = backend.run_cmd(&command)?.expect_done(&command)?;
                let entry = BreakpointInfo::decode(response.payload.tuple("bkpt")?)?;
                self.entry_breakpoint.set(Some(entry.number));
                self.step.set(AttachStep::AtEntry);
                Ok(Some(backend.continue_until_stop()?))
            }
            AttachStep::AtEntry => {
                if let Some(number) = self.entry_breakpoint.take() {
                    backend.delete_breakpoint(number)?;
                }
                self.publish()
            }
            step @ (AttachStep::UnblockingLauncher | AttachStep::Done) => Err(
                Error::InvalidState(format!("attach advanced from {step:?}")),
            ),
        }
    }

    fn publish(self: &Rc<Self>) -> Result<Option<Waitable<()>>, Error> {
        let backend = &self.backend;
        let state = backend.take_creation();
        let process = state.process.ok_or(Error::NoProcessCreated)?;
        if state.exited || state.threads.is_empty() {
            process.mark_gone();
            return Err(Error::NoProcessCreated);
        }
        let metadata = backend.query_metadata(&process, state.threads.first(), None);
        backend.publish_process(&process, state.threads, metadata, false, None);
        self.step.set(AttachStep::Done);
        self.completer.complete(process);
        Ok(None)
    }

    fn fail(&self, error: Error) {
        if self.completer.is_done() {
            return;
        }
        debug!(target: "debugger", "backend {}: attach to {} failed at {:?}: {error}", self.backend.id, self.pid, self.step.get());
        let backend = &self.backend;
        if backend.is_alive() {
            if let Some(number) = self.entry_breakpoint.take() {
                muted_error!(backend.delete_breakpoint(number));
            }
            backend.abort_creation(self.inferior.take(), true);
        }
        self.step.set(AttachStep::Done);
        self.completer.fail(error);
    }
}
