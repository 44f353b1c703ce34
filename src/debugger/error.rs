use std::sync::Arc;

fn exit_code_view(code: &Option<i64>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// All errors of the debugger core.
///
/// Errors are `Clone` because a failed [`crate::debugger::waitable::Waitable`] hands the same
/// error to every waiter and every registered callback.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(Arc<std::io::Error>),
    #[error("{0} syscall error: {1}")]
    Syscall(&'static str, nix::Error),
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation aborted: {0}")]
    Aborted(String),
    #[error("invalid state: {0}")]
    InvalidState(String),

    // --------------------------------- protocol errors -------------------------------------------
    #[error("mi parse error at {pos}: {msg} (`{text}`)")]
    Parse {
        text: String,
        pos: usize,
        msg: &'static str,
    },
    #[error("unrecognized mi line `{0}`")]
    UnrecognizedLine(String),
    #[error("malformed command `{0}`, commands must not start with '-'")]
    MalformedCommand(String),
    #[error("field `{0}` missing or has unexpected type")]
    MissingField(&'static str),
    #[error("unexpected result `{class}` for `{command}`")]
    UnexpectedResult { command: String, class: String },

    // --------------------------------- command errors --------------------------------------------
    #[error("{message}")]
    Command { command: String, message: String },

    // --------------------------------- sequencing errors -----------------------------------------
    #[error("a process wasn't created")]
    NoProcessCreated,
    #[error("process launch failed, exit code {}", exit_code_view(.0))]
    LaunchFailed(Option<i64>),
    #[error("process kill succeeded but no exited process found")]
    KillNoExitedProcess,

    // --------------------------------- backend errors --------------------------------------------
    #[error("backend {0} is gone")]
    BackendGone(u32),
    #[error("backend {0} reader did not stop in time, gdb killed")]
    ReaderTimeout(u32),

    // --------------------------------- entity errors ---------------------------------------------
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid location `{0}`")]
    Location(String),

    // --------------------------------- interpreter errors ----------------------------------------
    #[error("{0}")]
    Interpreter(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IO(Arc::new(e))
    }
}

impl Error {
    /// Return a hint to an interface - continue debugging after error or stop whole process.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::IO(_) => false,
            Error::Cancelled => false,
            Error::Aborted(_) => false,
            Error::InvalidState(_) => false,
            Error::Parse { .. } => false,
            Error::MalformedCommand(_) => false,
            Error::MissingField(_) => false,
            Error::UnexpectedResult { .. } => false,
            Error::Command { .. } => false,
            Error::NoProcessCreated => false,
            Error::LaunchFailed(_) => false,
            Error::KillNoExitedProcess => false,
            Error::BackendGone(_) => false,
            Error::NotFound(_) => false,
            Error::Location(_) => false,
            Error::Interpreter(_) => false,

            // currently fatal errors
            Error::Syscall(_, _) => true,
            Error::UnrecognizedLine(_) => true,
            Error::ReaderTimeout(_) => true,
        }
    }

    /// Error text of a failed command, `None` for any other error.
    pub fn command_message(&self) -> Option<&str> {
        match self {
            Error::Command { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
