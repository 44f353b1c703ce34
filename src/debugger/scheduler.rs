//! Single threaded cooperative event loop.
//!
//! All debugger state lives on the thread that owns the [`Scheduler`]. Other threads (gdb
//! readers, the console reader, signal handlers) talk to it only through [`Port`] senders and
//! the [`QuitHandle`]. Each message or timer callback runs to completion, callbacks may re-enter
//! the loop through [`Scheduler::run_until`].

use crate::debugger::error::Error;
use log::debug;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

/// Port id reserved for wake up messages.
const WAKE_PORT: u64 = 0;

struct Envelope {
    port: u64,
    msg: Box<dyn Any + Send>,
}

type PortHandler = Rc<dyn Fn(Box<dyn Any + Send>)>;

enum TimerTask {
    Once(Box<dyn FnOnce()>),
    Periodic(Duration, Rc<RefCell<Box<dyn FnMut()>>>),
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct TimerKey {
    deadline: Instant,
    id: u64,
}

struct Inner {
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
    ports: RefCell<HashMap<u64, PortHandler>>,
    next_port: Cell<u64>,
    local: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    timers: RefCell<BinaryHeap<Reverse<TimerKey>>>,
    timer_tasks: RefCell<HashMap<u64, TimerTask>>,
    next_timer: Cell<u64>,
    quit: Arc<AtomicBool>,
}

/// Handle to the event loop, cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

/// Thread safe sending side of a port opened by [`Scheduler::open_port`].
pub struct Port<M> {
    id: u64,
    tx: mpsc::Sender<Envelope>,
    _msg: PhantomData<fn(M)>,
}

impl<M> Clone for Port<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
            _msg: PhantomData,
        }
    }
}

impl<M: Send + 'static> Port<M> {
    /// Queue a message for the scheduler thread. Return false if the scheduler is gone.
    pub fn send(&self, msg: M) -> bool {
        self.tx
            .send(Envelope {
                port: self.id,
                msg: Box::new(msg),
            })
            .is_ok()
    }
}

/// Thread safe handle that stops every running loop of a scheduler.
#[derive(Clone)]
pub struct QuitHandle {
    quit: Arc<AtomicBool>,
    tx: mpsc::Sender<Envelope>,
}

impl QuitHandle {
    pub fn quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
        _ = self.tx.send(Envelope {
            port: WAKE_PORT,
            msg: Box::new(()),
        });
    }

    pub fn is_quit(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}

/// Cancels a delayed or periodic callback.
pub struct TimerHandle {
    id: u64,
    scheduler: Weak<Inner>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        if let Some(inner) = self.scheduler.upgrade() {
            inner.timer_tasks.borrow_mut().remove(&self.id);
        }
    }

    /// True if the callback may still fire.
    pub fn is_active(&self) -> bool {
        self.scheduler
            .upgrade()
            .map(|inner| inner.timer_tasks.borrow().contains_key(&self.id))
            .unwrap_or_default()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            inner: Rc::new(Inner {
                tx,
                rx,
                ports: RefCell::default(),
                next_port: Cell::new(WAKE_PORT + 1),
                local: RefCell::default(),
                timers: RefCell::default(),
                timer_tasks: RefCell::default(),
                next_timer: Cell::new(1),
                quit: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Register a handler for messages of type `M`, return the sending side.
    pub fn open_port<M: Send + 'static>(&self, handler: impl Fn(M) + 'static) -> Port<M> {
        let id = self.inner.next_port.get();
        self.inner.next_port.set(id + 1);
        let handler: PortHandler = Rc::new(move |msg: Box<dyn Any + Send>| match msg.downcast::<M>() {
            Ok(msg) => handler(*msg),
            Err(_) => debug!(target: "debugger", "port {id}: message of unexpected type dropped"),
        });
        self.inner.ports.borrow_mut().insert(id, handler);
        Port {
            id,
            tx: self.inner.tx.clone(),
            _msg: PhantomData,
        }
    }

    /// Unregister a port handler, messages still in flight are dropped.
    pub fn close_port<M>(&self, port: &Port<M>) {
        self.inner.ports.borrow_mut().remove(&port.id);
    }

    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle {
            quit: self.inner.quit.clone(),
            tx: self.inner.tx.clone(),
        }
    }

    pub fn quit(&self) {
        self.quit_handle().quit()
    }

    pub fn is_quit(&self) -> bool {
        self.inner.quit.load(Ordering::SeqCst)
    }

    /// Queue a callback to run on the next loop iteration.
    pub fn post(&self, f: impl FnOnce() + 'static) {
        self.inner.local.borrow_mut().push_back(Box::new(f));
    }

    pub fn post_delayed(&self, delay: Duration, f: impl FnOnce() + 'static) -> TimerHandle {
        self.add_timer(delay, TimerTask::Once(Box::new(f)))
    }

    /// Run `f` every `period` until the returned handle is cancelled.
    pub fn post_periodic(&self, period: Duration, f: impl FnMut() + 'static) -> TimerHandle {
        self.add_timer(
            period,
            TimerTask::Periodic(period, Rc::new(RefCell::new(Box::new(f)))),
        )
    }

    fn add_timer(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let id = self.inner.next_timer.get();
        self.inner.next_timer.set(id + 1);
        self.inner.timer_tasks.borrow_mut().insert(id, task);
        self.inner.timers.borrow_mut().push(Reverse(TimerKey {
            deadline: Instant::now() + delay,
            id,
        }));
        TimerHandle {
            id,
            scheduler: Rc::downgrade(&self.inner),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let mut timers = self.inner.timers.borrow_mut();
        let tasks = self.inner.timer_tasks.borrow();
        while let Some(Reverse(key)) = timers.peek() {
            if tasks.contains_key(&key.id) {
                return Some(key.deadline);
            }
            timers.pop();
        }
        None
    }

    /// Run every timer whose deadline passed, return true if something ran.
    fn run_timers(&self) -> bool {
        let now = Instant::now();
        let mut ran = false;
        loop {
            let due = {
                let mut timers = self.inner.timers.borrow_mut();
                match timers.peek() {
                    Some(Reverse(key)) if key.deadline <= now => timers.pop().map(|r| r.0),
                    _ => None,
                }
            };
            let Some(key) = due else {
                return ran;
            };
            let task = self.inner.timer_tasks.borrow_mut().remove(&key.id);
            match task {
                None => continue,
                Some(TimerTask::Once(f)) => {
                    ran = true;
                    f();
                }
                Some(TimerTask::Periodic(period, f)) => {
                    ran = true;
                    self.inner
                        .timer_tasks
                        .borrow_mut()
                        .insert(key.id, TimerTask::Periodic(period, f.clone()));
                    // a periodic callback that re-entered the loop is not called recursively
                    if let Ok(mut f) = f.try_borrow_mut() {
                        f();
                    }
                    if self.inner.timer_tasks.borrow().contains_key(&key.id) {
                        self.inner.timers.borrow_mut().push(Reverse(TimerKey {
                            deadline: Instant::now() + period,
                            id: key.id,
                        }));
                    }
                }
            }
        }
    }

    /// Run callbacks posted before this call, return true if something ran.
    fn run_local(&self) -> bool {
        let count = self.inner.local.borrow().len();
        for _ in 0..count {
            let f = self.inner.local.borrow_mut().pop_front();
            match f {
                Some(f) => f(),
                None => break,
            }
        }
        count > 0
    }

    fn dispatch(&self, envelope: Envelope) {
        if envelope.port == WAKE_PORT {
            return;
        }
        let handler = self.inner.ports.borrow().get(&envelope.port).cloned();
        match handler {
            Some(handler) => handler(envelope.msg),
            None => debug!(target: "debugger", "message for closed port {} dropped", envelope.port),
        }
    }

    /// One loop iteration: due timers, posted callbacks, then queued messages. Blocks until
    /// the next timer deadline if there was nothing to do.
    pub fn run_once(&self) {
        let mut ran = self.run_timers();
        ran |= self.run_local();

        let mut received = 0;
        while let Ok(envelope) = self.inner.rx.try_recv() {
            self.dispatch(envelope);
            received += 1;
            if self.is_quit() {
                return;
            }
        }
        if ran || received > 0 || !self.inner.local.borrow().is_empty() {
            return;
        }

        let envelope = match self.next_deadline() {
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                self.inner.rx.recv_timeout(timeout).ok()
            }
            None => self.inner.rx.recv().ok(),
        };
        if let Some(envelope) = envelope {
            self.dispatch(envelope);
        }
    }

    /// Run the loop until `predicate` is true. Fails with [`Error::Cancelled`] once quit is set.
    pub fn run_until(&self, mut predicate: impl FnMut() -> bool) -> Result<(), Error> {
        loop {
            if self.is_quit() {
                return Err(Error::Cancelled);
            }
            if predicate() {
                return Ok(());
            }
            self.run_once();
        }
    }

    /// Run the loop while `predicate` is true.
    pub fn run_while(&self, mut predicate: impl FnMut() -> bool) -> Result<(), Error> {
        self.run_until(|| !predicate())
    }

    /// Run the loop until quit.
    pub fn run(&self) {
        while !self.is_quit() {
            self.run_once();
        }
    }
}
