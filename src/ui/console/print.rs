use crate::ui::console::print::style::{ErrorView, ProgramOutputView};
use rustyline::history::History;
use rustyline::{Editor, ExternalPrinter as RLExternalPrinter, Helper};
use std::fmt::Display;
use std::sync::{Arc, Mutex};

type SharedPrinter = Arc<Mutex<Box<dyn RLExternalPrinter>>>;

/// Console output that keeps the prompt line intact.
///
/// Debuggee terminals are copied from their own threads, so the printer is cloned into each
/// of them. In `int_test` builds everything goes to stdout, the rustyline printer does not
/// work without a terminal (<https://github.com/kkawakam/rustyline/issues/703>).
#[derive(Clone)]
pub struct ExternalPrinter {
    printer: Option<SharedPrinter>,
}

unsafe impl Send for ExternalPrinter {}
unsafe impl Sync for ExternalPrinter {}

impl ExternalPrinter {
    #[cfg(not(feature = "int_test"))]
    pub fn new<H: Helper, I: History>(editor: &mut Editor<H, I>) -> rustyline::Result<Self> {
        let printer: Box<dyn RLExternalPrinter> = Box::new(editor.create_external_printer()?);
        Ok(Self {
            printer: Some(Arc::new(Mutex::new(printer))),
        })
    }

    #[cfg(feature = "int_test")]
    pub fn new<H: Helper, I: History>(_editor: &mut Editor<H, I>) -> rustyline::Result<Self> {
        Ok(Self::stdout())
    }

    pub fn stdout() -> Self {
        Self { printer: None }
    }

    pub fn print(&self, msg: impl Display) {
        let msg = msg.to_string();
        let Some(printer) = &self.printer else {
            print!("{msg}");
            return;
        };
        if let Ok(mut printer) = printer.lock() {
            _ = printer.print(msg);
        }
    }

    pub fn println(&self, msg: impl Display) {
        self.print(format!("{msg}\n"))
    }

    pub fn error(&self, msg: impl Display) {
        self.println(ErrorView::from(msg))
    }

    /// A line written by a debuggee to its terminal.
    pub fn program_output(&self, pid: u32, line: &str) {
        self.println(format!("{pid}| {}", ProgramOutputView::from(line)))
    }
}

pub mod style {
    use crate::debugger::Status;
    use crossterm::style::{Color, Stylize};
    use std::fmt::{Display, Formatter};

    const UNKNOWN_PLACEHOLDER: &str = "???";

    struct View<T: Display> {
        inner: Option<T>,
        color: Color,
    }

    impl<T: Display> Display for View<T> {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            let text = match &self.inner {
                Some(inner) => inner.to_string(),
                None => UNKNOWN_PLACEHOLDER.to_string(),
            };
            if cfg!(feature = "int_test") {
                f.write_str(&text)
            } else {
                write!(f, "{}", text.with(self.color))
            }
        }
    }

    /// Colored view of values of one kind, plain text in `int_test` builds.
    macro_rules! view_struct {
        ($name: ident, $color: expr) => {
            pub struct $name<T: Display>(View<T>);

            impl<T: Display> From<T> for $name<T> {
                fn from(value: T) -> Self {
                    Self(View {
                        inner: Some(value),
                        color: $color,
                    })
                }
            }

            impl<T: Display> From<Option<T>> for $name<T> {
                fn from(value: Option<T>) -> Self {
                    Self(View {
                        inner: value,
                        color: $color,
                    })
                }
            }

            impl<T: Display> Display for $name<T> {
                fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                    self.0.fmt(f)
                }
            }
        };
    }

    view_struct!(LocationView, Color::Green);
    view_struct!(IdView, Color::Yellow);
    view_struct!(KeywordView, Color::Magenta);
    view_struct!(ProgramOutputView, Color::Grey);
    view_struct!(ErrorView, Color::Red);

    pub struct StatusView(View<Status>);

    impl From<Status> for StatusView {
        fn from(status: Status) -> Self {
            let color = match status {
                Status::Running => Color::Cyan,
                Status::Break => Color::Yellow,
            };
            Self(View {
                inner: Some(status),
                color,
            })
        }
    }

    impl Display for StatusView {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            self.0.fmt(f)
        }
    }
}
