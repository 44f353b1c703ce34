use crate::debugger::backend::Backend;
use crate::debugger::thread::Thread;
use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use sysinfo::{RefreshKind, System};

/// Facts about a debuggee collected once it is stopped for the first time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessMetadata {
    pub pid: u32,
    pub exe: Option<String>,
    pub cwd: Option<String>,
    pub compilation_dir: Option<String>,
    /// Command line as the OS reports it, gdb's view if the OS has none.
    pub cmdline: Vec<String>,
    /// gdb inferior number.
    pub inferior: u32,
    /// Terminal of a launched process.
    pub pty: Option<PathBuf>,
}

/// Debuggee process, one gdb inferior.
pub struct Process {
    inferior: u32,
    pid: u32,
    frontend_id: Cell<Option<u32>>,
    backend: Weak<Backend>,
    threads: RefCell<Vec<Rc<Thread>>>,
    metadata: RefCell<Option<ProcessMetadata>>,
    exe: RefCell<Option<String>>,
    was_launched: Cell<bool>,
    last_active_thread: RefCell<Weak<Thread>>,
    alive: Cell<bool>,
}

impl Debug for Process {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("inferior", &self.inferior)
            .field("pid", &self.pid)
            .field("frontend_id", &self.frontend_id.get())
            .field("threads", &self.threads.borrow().len())
            .finish()
    }
}

impl Process {
    pub(crate) fn new(backend: &Rc<Backend>, inferior: u32, pid: u32) -> Rc<Self> {
        Rc::new(Self {
            inferior,
            pid,
            frontend_id: Cell::new(None),
            backend: Rc::downgrade(backend),
            threads: RefCell::default(),
            metadata: RefCell::new(None),
            exe: RefCell::new(None),
            was_launched: Cell::new(false),
            last_active_thread: RefCell::new(Weak::new()),
            alive: Cell::new(true),
        })
    }

    /// Inferior number, unique inside the owning backend.
    pub fn backend_id(&self) -> u32 {
        self.inferior
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn frontend_id(&self) -> Option<u32> {
        self.frontend_id.get()
    }

    pub(crate) fn set_frontend_id(&self, id: Option<u32>) {
        self.frontend_id.set(id)
    }

    pub fn backend(&self) -> Option<Rc<Backend>> {
        self.backend.upgrade()
    }

    pub(crate) fn belongs_to(&self, backend: &Backend) -> bool {
        self.backend
            .upgrade()
            .map(|b| std::ptr::eq(Rc::as_ptr(&b), backend))
            .unwrap_or_default()
    }

    pub fn threads(&self) -> Vec<Rc<Thread>> {
        self.threads.borrow().clone()
    }

    pub(crate) fn add_thread(&self, thread: Rc<Thread>) {
        self.threads.borrow_mut().push(thread)
    }

    pub(crate) fn remove_thread(&self, backend_id: u32) -> Option<Rc<Thread>> {
        let mut threads = self.threads.borrow_mut();
        let idx = threads.iter().position(|t| t.backend_id() == backend_id)?;
        Some(threads.remove(idx))
    }

    pub(crate) fn take_threads(&self) -> Vec<Rc<Thread>> {
        std::mem::take(&mut *self.threads.borrow_mut())
    }

    /// Collected metadata, `None` before the first stop and once the process is exiting.
    pub fn metadata(&self) -> Option<ProcessMetadata> {
        self.metadata.borrow().clone()
    }

    pub(crate) fn set_metadata(&self, metadata: ProcessMetadata) {
        *self.exe.borrow_mut() = metadata.exe.clone();
        *self.metadata.borrow_mut() = Some(metadata)
    }

    pub(crate) fn clear_metadata(&self) {
        self.metadata.borrow_mut().take();
    }

    /// True for a process started by the debugger, false for an attached one.
    pub fn was_launched(&self) -> bool {
        self.was_launched.get()
    }

    pub(crate) fn set_was_launched(&self, launched: bool) {
        self.was_launched.set(launched)
    }

    pub fn last_active_thread(&self) -> Option<Rc<Thread>> {
        self.last_active_thread.borrow().upgrade()
    }

    pub(crate) fn set_last_active_thread(&self, thread: &Rc<Thread>) {
        *self.last_active_thread.borrow_mut() = Rc::downgrade(thread)
    }

    /// False once the process exited, was killed or detached.
    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    pub(crate) fn mark_gone(&self) {
        self.alive.set(false);
        self.clear_metadata();
        *self.last_active_thread.borrow_mut() = Weak::new();
    }

    /// Short description, `exe:pid`.
    pub fn describe(&self) -> String {
        let exe = self.exe.borrow().clone().unwrap_or_else(|| "?".to_string());
        format!("{exe}:{}", self.pid)
    }
}

/// Command line of a running process as the OS reports it.
pub(crate) fn os_cmdline(pid: u32) -> Option<Vec<String>> {
    let sys = System::new_with_specifics(RefreshKind::everything().without_cpu().without_memory());
    let process = sys.process(sysinfo::Pid::from_u32(pid))?;
    let cmd = process.cmd();
    (!cmd.is_empty()).then(|| cmd.to_vec())
}
