use crate::debugger::command::frame_view;
use crate::debugger::{Config, DebugSession, Debugger, Error, Process, Status, Thread};
use crate::ui::console::command::{Command, CommandError, COMMANDS};
use crate::ui::console::editor::{create_editor, CommandCompleter, RLHelper};
use crate::ui::console::help::help_for_command;
use crate::ui::console::hook::TerminalHook;
use crate::ui::console::print::style::{IdView, KeywordView, LocationView, StatusView};
use crate::ui::console::print::ExternalPrinter;
use crossterm::style::Stylize;
use log::warn;
use rustyline::error::ReadlineError;
use rustyline::history::MemHistory;
use rustyline::Editor;
use std::io::{BufRead, BufReader};
use std::rc::Rc;
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{mpsc, Arc, Mutex, Once};
use std::thread;

pub mod command;
mod editor;
mod help;
pub mod hook;
pub mod print;

const WELCOME_TEXT: &str = r#"
gdbmux greets
"#;
const PROMPT: &str = "(gmx) ";

type GmxEditor = Editor<RLHelper, MemHistory>;

pub struct AppBuilder {
    config: Config,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn build(self) -> anyhow::Result<TerminalApplication> {
        let session = DebugSession::new(self.config.clone());
        self.build_with_session(session)
    }

    /// Build over an existing session, with a custom gdb factory for example.
    pub fn build_with_session(self, session: DebugSession) -> anyhow::Result<TerminalApplication> {
        let phrases = crate::debugger::command::Interpreter::new()
            .phrases()
            .into_iter()
            .chain(COMMANDS.iter().map(ToString::to_string))
            .chain(["quit".to_string()]);
        let mut editor = create_editor(PROMPT, phrases)?;
        let printer = ExternalPrinter::new(&mut editor)?;
        let debugger = Debugger::new(session, TerminalHook::new(printer.clone()));

        Ok(TerminalApplication {
            debugger,
            editor,
            printer,
        })
    }
}

/// Messages from the terminal threads to the debugger thread.
enum Control {
    /// New command from user received, the sender waits for the ack.
    Cmd(String),
    /// Ctrl-C, stop everything.
    Interrupt,
    /// Terminate application
    Terminate,
}

pub struct TerminalApplication {
    debugger: Rc<Debugger>,
    editor: GmxEditor,
    printer: ExternalPrinter,
}

pub static HELLO_ONCE: Once = Once::new();

impl TerminalApplication {
    /// Run the console until the user quits. `program` is launched and `pids` are attached
    /// first.
    pub fn run(mut self, program: Vec<String>, pids: Vec<u32>) -> anyhow::Result<()> {
        let completer = Arc::clone(
            &self
                .editor
                .helper_mut()
                .ok_or_else(|| anyhow::anyhow!("editor helper must exist"))?
                .completer,
        );
        let (ack_tx, ack_rx) = mpsc::sync_channel::<()>(0);
        let app_loop = Rc::new(AppLoop {
            debugger: self.debugger.clone(),
            printer: self.printer.clone(),
            completer,
            ack_tx,
        });

        let scheduler = self.debugger.session().scheduler().clone();
        let port = {
            let app_loop = app_loop.clone();
            scheduler.open_port(move |control: Control| app_loop.on_control(control))
        };
        {
            let port = port.clone();
            ctrlc::set_handler(move || {
                port.send(Control::Interrupt);
            })?;
        }

        if !program.is_empty() {
            app_loop.handle_and_report(Command::Launch(program));
        }
        for pid in pids {
            app_loop.handle_and_report(Command::Attach(pid));
        }

        let mut editor = self.editor;
        thread::spawn(move || {
            HELLO_ONCE.call_once(|| {
                println!("{WELCOME_TEXT}");
            });
            readline_loop(&mut editor, &port, &ack_rx);
        });

        scheduler.run();
        self.debugger.shutdown();
        Ok(())
    }
}

fn readline_loop(editor: &mut GmxEditor, port: &crate::debugger::scheduler::Port<Control>, ack_rx: &Receiver<()>) {
    loop {
        match editor.readline(PROMPT) {
            Ok(input) => {
                let input = input.trim().to_string();
                if input == "q" || input == "quit" {
                    port.send(Control::Terminate);
                    break;
                }
                if input.is_empty() {
                    continue;
                }
                _ = editor.add_history_entry(&input);
                if !port.send(Control::Cmd(input)) || ack_rx.recv().is_err() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                port.send(Control::Interrupt);
            }
            Err(ReadlineError::Eof) => {
                port.send(Control::Terminate);
                break;
            }
            Err(err) => {
                println!("error: {:#}", err);
                port.send(Control::Terminate);
                break;
            }
        }
    }
}

struct AppLoop {
    debugger: Rc<Debugger>,
    printer: ExternalPrinter,
    completer: Arc<Mutex<CommandCompleter>>,
    ack_tx: SyncSender<()>,
}

impl AppLoop {
    fn on_control(&self, control: Control) {
        match control {
            Control::Cmd(command) => {
                match Command::parse(&command) {
                    Ok(command) => self.handle_and_report(command),
                    Err(e) => self.printer.error(e),
                }
                _ = self.ack_tx.send(());
            }
            Control::Interrupt => {
                if self.debugger.status() == Status::Break {
                    return;
                }
                let weak = Rc::downgrade(&self.debugger);
                let printer = self.printer.clone();
                self.debugger.begin_interrupt().on_done(move |result| {
                    match result {
                        Ok(()) => {
                            if let Some(debugger) = weak.upgrade() {
                                print_active_location(&debugger, &printer);
                            }
                        }
                        Err(e) => printer.error(format!("interrupt: {e}")),
                    }
                });
            }
            Control::Terminate => self.debugger.session().scheduler().quit(),
        }
    }

    fn handle_and_report(&self, command: Command) {
        if let Err(e) = self.handle_command(command) {
            if e.is_fatal() {
                self.printer.error(format!("fatal debugger error: {e:#}"));
                self.debugger.session().scheduler().quit();
            } else {
                self.printer.error(format!("error: {e:#}"));
            }
        }
        self.update_completer();
    }

    fn update_completer(&self) {
        if let Ok(mut completer) = self.completer.lock() {
            completer.replace_breakpoint_hints(self.debugger.breakpoints().iter().map(|bp| bp.id()));
        }
    }

    fn active_thread(&self) -> Result<Rc<Thread>, Error> {
        self.debugger
            .active_thread()
            .ok_or_else(|| Error::NotFound("active thread".to_string()))
    }

    fn active_process(&self) -> Result<Rc<Process>, Error> {
        self.debugger
            .active_process()
            .ok_or_else(|| Error::NotFound("active process".to_string()))
    }

    fn breakpoint(&self, id: u32) -> Result<Rc<crate::debugger::Breakpoint>, Error> {
        self.debugger
            .breakpoint(id)
            .ok_or_else(|| Error::NotFound(format!("breakpoint {id}")))
    }

    /// Copy the terminal of a launched process to the console.
    fn watch_output(&self, process: &Process) {
        let Some(backend) = process.backend() else {
            return;
        };
        let output = match backend.process_output(process) {
            Ok(Some(output)) => output,
            Ok(None) => return,
            Err(e) => {
                warn!(target: "debugger", "process output unavailable: {e}");
                return;
            }
        };
        let printer = self.printer.clone();
        let pid = process.pid();
        let spawned = thread::Builder::new()
            .name(format!("pty-{pid}"))
            .spawn(move || {
                for line in BufReader::new(output).lines() {
                    let Ok(line) = line else {
                        break;
                    };
                    printer.program_output(pid, &line);
                }
            });
        if let Err(e) = spawned {
            warn!(target: "debugger", "process output thread: {e}");
        }
    }

    fn handle_command(&self, command: Command) -> Result<(), CommandError> {
        match command {
            Command::Launch(cmdline) => {
                let process = self.debugger.begin_launch(&cmdline).wait()?;
                self.watch_output(&process);
                print_active_location(&self.debugger, &self.printer);
            }
            Command::Attach(pid) => {
                self.debugger.begin_attach(pid).wait()?;
                print_active_location(&self.debugger, &self.printer);
            }
            Command::Detach => {
                let process = self.active_process()?;
                self.debugger.detach(&process)?;
                self.printer
                    .println(format!("detached from {}", process.describe()));
            }
            Command::Continue => {
                let thread = self.active_thread()?;
                self.debugger.begin_resume(&thread).wait()?;
                self.printer
                    .println(format!("[{}]", StatusView::from(self.debugger.status())));
            }
            Command::Interrupt => {
                self.debugger.begin_interrupt().wait()?;
                print_active_location(&self.debugger, &self.printer);
            }
            Command::StepOver => {
                let thread = self.active_thread()?;
                self.debugger.begin_step_over(&thread).wait()?;
                print_active_location(&self.debugger, &self.printer);
            }
            Command::StepInto => {
                let thread = self.active_thread()?;
                self.debugger.begin_step_into(&thread).wait()?;
                print_active_location(&self.debugger, &self.printer);
            }
            Command::StepOut => {
                let thread = self.active_thread()?;
                self.debugger.begin_step_out(&thread).wait()?;
                print_active_location(&self.debugger, &self.printer);
            }
            Command::Break(location) => {
                let bp = self.debugger.new_breakpoint(location)?;
                self.printer.println(format!(
                    "New breakpoint {} at {}",
                    IdView::from(bp.id()),
                    LocationView::from(bp.location())
                ));
                for location in bp.actual_locations() {
                    self.printer.println(format!("  {}", LocationView::from(location)));
                }
                if let Some(error) = bp.error() {
                    self.printer.error(error);
                }
            }
            Command::Enable(id) => {
                let bp = self.breakpoint(id)?;
                self.debugger.set_breakpoint_enabled(&bp, true)?;
            }
            Command::Disable(id) => {
                let bp = self.breakpoint(id)?;
                self.debugger.set_breakpoint_enabled(&bp, false)?;
            }
            Command::Delete(id) => {
                let bp = self.breakpoint(id)?;
                self.debugger.delete_breakpoint(&bp)?;
                self.printer
                    .println(format!("Remove breakpoint {}", IdView::from(id)));
            }
            Command::Move(id, location) => {
                let bp = self.breakpoint(id)?;
                self.debugger.set_breakpoint_location(&bp, location)?;
                self.printer.println(format!(
                    "Breakpoint {} moved to {}",
                    IdView::from(id),
                    LocationView::from(bp.location())
                ));
            }
            Command::Backtrace => {
                let thread = self.active_thread()?;
                let active = thread.active_frame();
                for (n, frame) in thread.call_stack()?.iter().enumerate() {
                    let view = frame_view(frame);
                    if n == active {
                        self.printer.println(view.bold());
                    } else {
                        self.printer.println(view);
                    }
                }
            }
            Command::Eval(expression) => {
                let value = self.debugger.begin_evaluate(&expression).wait()?;
                self.printer
                    .println(format!("{} = {value}", KeywordView::from(expression)));
            }
            Command::Help(topic) => {
                self.printer.print(help_for_command(topic.as_deref()));
            }
            Command::Gdb(text) => {
                let output = self.debugger.begin_interpreter_exec(&text).wait()?;
                if !output.is_empty() {
                    self.printer.print(output);
                }
            }
        }
        Ok(())
    }
}

fn print_active_location(debugger: &Debugger, printer: &ExternalPrinter) {
    let Some(thread) = debugger.active_thread() else {
        return;
    };
    if thread.status() != Status::Break {
        return;
    }
    match thread.frame(thread.active_frame()) {
        Ok(frame) => printer.println(format!(
            "thread {}: {}",
            IdView::from(thread.frontend_id()),
            LocationView::from(frame_view(&frame))
        )),
        Err(e) => warn!(target: "debugger", "active frame: {e}"),
    }
}
