use crate::debugger::backend::Backend;
use crate::debugger::error::Error;
use crate::debugger::mi::StackFrame;
use crate::debugger::process::Process;
use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use strum_macros::Display;

/// Execution status of a thread, a backend or the whole debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Status {
    Running,
    Break,
}

/// Debuggee thread as gdb reports it.
pub struct Thread {
    backend_id: u32,
    frontend_id: Cell<Option<u32>>,
    process: Weak<Process>,
    status: Cell<Status>,
    active_frame: Cell<usize>,
    /// Frames fetched since the last status change.
    call_stack: RefCell<Option<Vec<StackFrame>>>,
}

impl Debug for Thread {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("backend_id", &self.backend_id)
            .field("frontend_id", &self.frontend_id.get())
            .field("status", &self.status.get())
            .finish()
    }
}

impl Thread {
    pub(crate) fn new(backend_id: u32, process: &Rc<Process>, status: Status) -> Rc<Self> {
        Rc::new(Self {
            backend_id,
            frontend_id: Cell::new(None),
            process: Rc::downgrade(process),
            status: Cell::new(status),
            active_frame: Cell::new(0),
            call_stack: RefCell::new(None),
        })
    }

    /// Global thread number inside gdb.
    pub fn backend_id(&self) -> u32 {
        self.backend_id
    }

    /// Number shown to the user, `None` until the thread is published.
    pub fn frontend_id(&self) -> Option<u32> {
        self.frontend_id.get()
    }

    pub(crate) fn set_frontend_id(&self, id: Option<u32>) {
        self.frontend_id.set(id)
    }

    pub fn process(&self) -> Option<Rc<Process>> {
        self.process.upgrade()
    }

    pub fn backend(&self) -> Option<Rc<Backend>> {
        self.process().and_then(|p| p.backend())
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.call_stack.borrow_mut().take();
        self.status.set(status)
    }

    pub fn active_frame(&self) -> usize {
        self.active_frame.get()
    }

    pub(crate) fn set_active_frame(&self, n: usize) {
        self.active_frame.set(n)
    }

    fn live_backend(&self) -> Result<Rc<Backend>, Error> {
        self.backend()
            .ok_or_else(|| Error::NotFound(format!("backend of thread {}", self.backend_id)))
    }

    /// Frames of the thread, innermost first. The backend must be stopped.
    ///
    /// The stack is fetched once per stop and served from the cache until the thread status
    /// changes.
    pub fn call_stack(&self) -> Result<Vec<StackFrame>, Error> {
        if let Some(stack) = self.call_stack.borrow().as_ref() {
            return Ok(stack.clone());
        }
        let backend = self.live_backend()?;
        let stack = backend.call_stack(self)?;
        // the fetch may drive the event loop, keep the result only if nothing ran meanwhile
        if backend.status() == Status::Break && self.status() == Status::Break {
            *self.call_stack.borrow_mut() = Some(stack.clone());
        }
        Ok(stack)
    }

    pub fn frame(&self, n: usize) -> Result<StackFrame, Error> {
        if let Some(stack) = self.call_stack.borrow().as_ref() {
            return stack
                .get(n)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("frame {n}")));
        }
        self.live_backend()?.frame(self, n)
    }
}
