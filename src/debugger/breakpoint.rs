use crate::debugger::backend::Backend;
use crate::debugger::location::Location;
use crate::weak_error;
use itertools::Itertools;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// State of one breakpoint inside one gdb.
#[derive(Clone, Debug)]
pub struct Binding {
    pub(crate) backend: Weak<Backend>,
    /// gdb breakpoint number, `None` if gdb rejected the breakpoint.
    pub number: Option<u32>,
    pub valid: bool,
    pub error: Option<String>,
    /// Resolved locations, several for an inlined function or a template.
    pub locations: Vec<Location>,
}

impl Binding {
    pub(crate) fn valid(backend: &Rc<Backend>, number: u32, locations: Vec<Location>) -> Self {
        Self {
            backend: Rc::downgrade(backend),
            number: Some(number),
            valid: true,
            error: None,
            locations,
        }
    }

    pub(crate) fn invalid(backend: &Rc<Backend>, error: impl Into<String>) -> Self {
        Self {
            backend: Rc::downgrade(backend),
            number: None,
            valid: false,
            error: Some(error.into()),
            locations: vec![],
        }
    }

    pub fn backend(&self) -> Option<Rc<Backend>> {
        self.backend.upgrade()
    }
}

/// User breakpoint, bound to every live backend.
#[derive(Debug)]
pub struct Breakpoint {
    id: u32,
    location: RefCell<Location>,
    enabled: Cell<bool>,
    bindings: RefCell<Vec<Binding>>,
}

impl Breakpoint {
    pub(crate) fn new(id: u32, location: Location) -> Self {
        Self {
            id,
            location: RefCell::new(location),
            enabled: Cell::new(true),
            bindings: RefCell::default(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Location as the user requested it.
    pub fn location(&self) -> Location {
        self.location.borrow().clone()
    }

    pub(crate) fn set_location(&self, location: Location) {
        *self.location.borrow_mut() = location
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled)
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.bindings.borrow().clone()
    }

    /// True if every backend accepted the breakpoint, vacuously true with no backends.
    pub fn all_valid(&self) -> bool {
        self.bindings.borrow().iter().all(|b| b.valid)
    }

    pub fn some_valid(&self) -> bool {
        self.bindings.borrow().iter().any(|b| b.valid)
    }

    /// Distinct error messages of all backends joined by newlines.
    pub fn error(&self) -> Option<String> {
        let errors = self
            .bindings
            .borrow()
            .iter()
            .filter_map(|b| b.error.clone())
            .unique()
            .join("\n");
        (!errors.is_empty()).then_some(errors)
    }

    /// Union of resolved locations over all backends.
    pub fn actual_locations(&self) -> Vec<Location> {
        let mut result: Vec<Location> = vec![];
        for loc in self.bindings.borrow().iter().flat_map(|b| b.locations.iter()) {
            if !result.contains(loc) {
                result.push(loc.clone());
            }
        }
        result
    }

    /// Delete the breakpoint from every backend it is bound to.
    pub(crate) fn unbind(&self) {
        let bindings = std::mem::take(&mut *self.bindings.borrow_mut());
        for binding in bindings {
            if let (Some(backend), Some(number)) = (binding.backend(), binding.number) {
                if backend.is_alive() {
                    weak_error!(backend.delete_breakpoint(number), "breakpoint unbind:");
                }
            }
        }
    }

    /// Create the breakpoint in every backend. `make_hit` builds the hit callback for a backend.
    pub(crate) fn bind(&self, backends: &[Rc<Backend>], make_hit: impl Fn(&Rc<Backend>) -> Rc<dyn Fn()>) {
        let location = self.location();
        let mut bindings = Vec::with_capacity(backends.len());
        for backend in backends.iter().filter(|b| b.is_alive()) {
            let binding = backend.new_breakpoint(&location, make_hit(backend));
            if let (false, Some(number)) = (self.is_enabled(), binding.number) {
                weak_error!(backend.set_breakpoint_enabled(number, false), "breakpoint disable:");
            }
            bindings.push(binding);
        }
        *self.bindings.borrow_mut() = bindings;
    }
}
