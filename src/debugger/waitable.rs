//! Single assignment results of asynchronous operations.
//!
//! A [`Waitable`] moves once from pending to a value or an error. Completion callbacks run
//! exactly once in registration order, a callback registered after completion runs at once.
//! Three ways to drive a waitable exist:
//! * poll: a predicate re-checked on a timer ([`Waitable::poll`]),
//! * callback: a producer completes it through a [`Completer`] ([`Waitable::pending`]),
//! * counter: completes when a [`Counter`] reaches its goal ([`Waitable::counter`]).

use crate::debugger::error::Error;
use crate::debugger::scheduler::{Scheduler, TimerHandle};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Default period for polled predicates and abort checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

type Callback<T> = Box<dyn FnOnce(&Result<T, Error>)>;
type Predicate<T> = Box<dyn FnMut() -> Result<Option<T>, Error>>;
type AbortCheck = Box<dyn Fn() -> Option<Error>>;

struct State<T> {
    scheduler: Scheduler,
    result: RefCell<Option<Result<T, Error>>>,
    callbacks: RefCell<Vec<Callback<T>>>,
    predicate: RefCell<Option<Predicate<T>>>,
    abort_check: RefCell<Option<AbortCheck>>,
    ticker: RefCell<Option<TimerHandle>>,
}

pub struct Waitable<T> {
    state: Rc<State<T>>,
}

impl<T> Clone for Waitable<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

/// Producer side of a callback driven waitable.
pub struct Completer<T> {
    waitable: Waitable<T>,
}

impl<T: Clone + 'static> Completer<T> {
    pub fn complete(&self, value: T) {
        self.waitable.finish(Ok(value))
    }

    pub fn fail(&self, error: Error) {
        self.waitable.finish(Err(error))
    }

    pub fn finish(&self, result: Result<T, Error>) {
        self.waitable.finish(result)
    }

    pub fn is_done(&self) -> bool {
        self.waitable.state.result.borrow().is_some()
    }
}

/// Producer side of a counter waitable.
#[derive(Clone)]
pub struct Counter {
    value: Rc<Cell<i64>>,
    goal: i64,
    waitable: Waitable<()>,
}

impl Counter {
    pub fn increment(&self) {
        self.add(1)
    }

    pub fn decrement(&self) {
        self.add(-1)
    }

    fn add(&self, delta: i64) {
        self.value.set(self.value.get() + delta);
        if self.value.get() == self.goal {
            self.waitable.finish(Ok(()));
        }
    }

    pub fn value(&self) -> i64 {
        self.value.get()
    }

    pub fn abort(&self, error: Error) {
        self.waitable.finish(Err(error))
    }
}

impl<T: Clone + 'static> Waitable<T> {
    fn new(scheduler: &Scheduler) -> Self {
        Self {
            state: Rc::new(State {
                scheduler: scheduler.clone(),
                result: RefCell::new(None),
                callbacks: RefCell::default(),
                predicate: RefCell::new(None),
                abort_check: RefCell::new(None),
                ticker: RefCell::new(None),
            }),
        }
    }

    /// Already completed waitable.
    pub fn ready(scheduler: &Scheduler, value: T) -> Self {
        let w = Self::new(scheduler);
        w.finish(Ok(value));
        w
    }

    /// Already failed waitable.
    pub fn failed(scheduler: &Scheduler, error: Error) -> Self {
        let w = Self::new(scheduler);
        w.finish(Err(error));
        w
    }

    /// Callback driven waitable and its producer side.
    pub fn pending(scheduler: &Scheduler) -> (Self, Completer<T>) {
        let w = Self::new(scheduler);
        (w.clone(), Completer { waitable: w })
    }

    /// Waitable driven by a predicate that is re-checked every `interval` until it returns a
    /// value or an error.
    pub fn poll(
        scheduler: &Scheduler,
        interval: Duration,
        predicate: impl FnMut() -> Result<Option<T>, Error> + 'static,
    ) -> Self {
        let w = Self::new(scheduler);
        *w.state.predicate.borrow_mut() = Some(Box::new(predicate));
        w.start_ticker(interval);
        w
    }

    /// Fail the waitable with the returned error as soon as `check` returns one.
    pub fn abort_when(self, check: impl Fn() -> Option<Error> + 'static) -> Self {
        if self.is_done() {
            return self;
        }
        *self.state.abort_check.borrow_mut() = Some(Box::new(check));
        if self.state.ticker.borrow().is_none() {
            self.start_ticker(POLL_INTERVAL);
        }
        self
    }

    fn start_ticker(&self, interval: Duration) {
        // the timer holds a strong reference until completion
        let state = self.state.clone();
        let handle = self.state.scheduler.post_periodic(interval, move || {
            Waitable {
                state: state.clone(),
            }
            .is_done();
        });
        *self.state.ticker.borrow_mut() = Some(handle);
    }

    fn finish(&self, result: Result<T, Error>) {
        if self.state.result.borrow().is_some() {
            return;
        }
        *self.state.result.borrow_mut() = Some(result.clone());
        if let Some(ticker) = self.state.ticker.borrow_mut().take() {
            ticker.cancel();
        }
        self.state.predicate.borrow_mut().take();
        self.state.abort_check.borrow_mut().take();

        let callbacks = std::mem::take(&mut *self.state.callbacks.borrow_mut());
        for cb in callbacks {
            cb(&result);
        }
    }

    /// True once completed. Re-checks the predicate and the abort check of a pending waitable.
    pub fn is_done(&self) -> bool {
        if self.state.result.borrow().is_some() {
            return true;
        }

        let abort = self
            .state
            .abort_check
            .borrow()
            .as_ref()
            .and_then(|check| check());
        if let Some(e) = abort {
            self.finish(Err(e));
            return true;
        }

        let predicate = self.state.predicate.borrow_mut().take();
        if let Some(mut predicate) = predicate {
            match predicate() {
                Ok(Some(v)) => self.finish(Ok(v)),
                Ok(None) => {
                    if self.state.result.borrow().is_none() {
                        *self.state.predicate.borrow_mut() = Some(predicate);
                    }
                }
                Err(e) => self.finish(Err(e)),
            }
        }
        self.state.result.borrow().is_some()
    }

    /// Result of a completed waitable.
    pub fn result(&self) -> Option<Result<T, Error>> {
        self.state.result.borrow().clone()
    }

    /// Run the scheduler until the waitable completes, return its result.
    pub fn wait(&self) -> Result<T, Error> {
        self.state.scheduler.run_until(|| self.is_done())?;
        self.result()
            .unwrap_or_else(|| Err(Error::InvalidState("waitable without result".to_string())))
    }

    /// Fail a pending waitable.
    pub fn abort(&self, error: Error) {
        self.finish(Err(error))
    }

    /// Register a completion callback, it runs immediately if the waitable is already done.
    pub fn on_done(&self, cb: impl FnOnce(&Result<T, Error>) + 'static) {
        let result = self.state.result.borrow().clone();
        match result {
            Some(result) => cb(&result),
            None => self.state.callbacks.borrow_mut().push(Box::new(cb)),
        }
    }

    /// Waitable with the value transformed by `f`.
    pub fn map<U: Clone + 'static>(
        &self,
        f: impl FnOnce(T) -> Result<U, Error> + 'static,
    ) -> Waitable<U> {
        let (w, completer) = Waitable::pending(&self.state.scheduler);
        let source = self.clone();
        self.on_done(move |result| {
            completer.finish(result.clone().and_then(f));
            drop(source);
        });
        w
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.state.scheduler
    }
}

impl Waitable<()> {
    /// Waitable that completes when its [`Counter`] moves from `initial` to `goal`.
    pub fn counter(scheduler: &Scheduler, initial: i64, goal: i64) -> (Self, Counter) {
        let w = Self::new(scheduler);
        if initial == goal {
            w.finish(Ok(()));
        }
        let counter = Counter {
            value: Rc::new(Cell::new(initial)),
            goal,
            waitable: w.clone(),
        };
        (w, counter)
    }
}
