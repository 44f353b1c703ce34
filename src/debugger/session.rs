use crate::debugger::backend::transport::{BackendFactory, GdbFactory};
use crate::debugger::config::Config;
use crate::debugger::scheduler::Scheduler;
use std::cell::Cell;
use std::rc::Rc;

struct Inner {
    scheduler: Scheduler,
    config: Config,
    factory: Rc<dyn BackendFactory>,
    next_backend_id: Cell<u32>,
    next_breakpoint_id: Cell<u32>,
}

/// Context shared by every component of one debugger: the event loop, the configuration,
/// the way gdb is spawned and the id counters.
#[derive(Clone)]
pub struct DebugSession {
    inner: Rc<Inner>,
}

impl DebugSession {
    pub fn new(config: Config) -> Self {
        Self::with_factory(config, Rc::new(GdbFactory))
    }

    pub fn with_factory(config: Config, factory: Rc<dyn BackendFactory>) -> Self {
        Self {
            inner: Rc::new(Inner {
                scheduler: Scheduler::new(),
                config,
                factory,
                next_backend_id: Cell::new(1),
                next_breakpoint_id: Cell::new(1),
            }),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn factory(&self) -> &Rc<dyn BackendFactory> {
        &self.inner.factory
    }

    pub(crate) fn next_backend_id(&self) -> u32 {
        let id = self.inner.next_backend_id.get();
        self.inner.next_backend_id.set(id + 1);
        id
    }

    pub(crate) fn next_breakpoint_id(&self) -> u32 {
        let id = self.inner.next_breakpoint_id.get();
        self.inner.next_breakpoint_id.set(id + 1);
        id
    }
}
