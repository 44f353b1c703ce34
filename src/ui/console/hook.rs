use crate::debugger::command::frame_view;
use crate::debugger::{Breakpoint, EventHook, Process, Status, Thread};
use crate::ui::console::print::style::{IdView, KeywordView, LocationView};
use crate::ui::console::print::ExternalPrinter;
use crate::weak_error;
use std::rc::Rc;

/// Prints debugger events to the terminal.
pub struct TerminalHook {
    printer: ExternalPrinter,
}

impl TerminalHook {
    pub fn new(printer: ExternalPrinter) -> Self {
        Self { printer }
    }
}

fn thread_view(thread: &Thread) -> String {
    format!(
        "{} ({}:{})",
        IdView::from(thread.frontend_id()),
        thread.process().map(|p| p.pid()).unwrap_or_default(),
        thread.backend_id()
    )
}

impl EventHook for TerminalHook {
    fn on_status_changed(&self, status: Status) {
        log::debug!(target: "debugger", "status: {status}");
    }

    fn on_active_thread_changed(&self, thread: Option<&Rc<Thread>>) {
        if let Some(thread) = thread {
            self.printer
                .println(format!("[Switching to thread {}]", thread_view(thread)));
        }
    }

    fn on_process_added(&self, process: &Rc<Process>) {
        self.printer.println(format!(
            "[Process {} {}]",
            IdView::from(process.frontend_id()),
            process.describe()
        ));
    }

    fn on_process_removed(&self, process: &Rc<Process>) {
        let code = process
            .backend()
            .and_then(|b| b.last_exit_code())
            .map(|c| c.to_string());
        self.printer.println(format!(
            "[Process {} {} exited with code {}]",
            IdView::from(process.frontend_id()),
            process.describe(),
            KeywordView::from(code)
        ));
    }

    fn on_thread_added(&self, thread: &Rc<Thread>) {
        self.printer
            .println(format!("[New thread {}]", thread_view(thread)));
    }

    fn on_thread_removed(&self, thread: &Rc<Thread>) {
        self.printer
            .println(format!("[Thread {} exited]", thread_view(thread)));
    }

    fn on_breakpoint_hit(&self, breakpoint: &Rc<Breakpoint>, thread: Option<&Rc<Thread>>) {
        let place = thread
            .and_then(|t| weak_error!(t.frame(0)))
            .map(|f| frame_view(&f));
        match thread {
            Some(thread) => self.printer.println(format!(
                "Hit breakpoint {} in thread {}: {}",
                IdView::from(breakpoint.id()),
                thread_view(thread),
                LocationView::from(place)
            )),
            None => self.printer.println(format!(
                "Hit breakpoint {} at {}",
                IdView::from(breakpoint.id()),
                LocationView::from(breakpoint.location())
            )),
        }
    }
}
