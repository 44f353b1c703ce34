use crate::debugger::error::Error;
use crate::debugger::location::Location;
use crate::debugger::mi::value::{parse_c_string, parse_tuple, Tuple, Value};
use strum_macros::{Display, EnumString};

/// One classified output line of gdb.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// `~"text"`, already unescaped.
    Console(String),
    /// `*class,payload`
    Exec(String),
    /// `=class,payload`
    Notify(String),
    /// `+...`
    Status,
    /// `&"..."`
    Log,
    /// `@"..."`
    Target,
    /// `[token]^class[,payload]`
    Result {
        token: Option<u64>,
        class: String,
        payload: String,
    },
    /// `(gdb) `
    Prompt,
}

/// Classify a raw line by its leading character. Unknown lines are an error.
pub fn classify_line(line: &str) -> Result<Line, Error> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim_end() == "(gdb)" {
        return Ok(Line::Prompt);
    }
    let Some(first) = line.chars().next() else {
        return Err(Error::UnrecognizedLine(line.to_string()));
    };
    match first {
        '~' => Ok(Line::Console(parse_c_string(&line[1..])?)),
        '*' => Ok(Line::Exec(line[1..].to_string())),
        '=' => Ok(Line::Notify(line[1..].to_string())),
        '+' => Ok(Line::Status),
        '&' => Ok(Line::Log),
        '@' => Ok(Line::Target),
        '0'..='9' | '^' => {
            let Some(caret) = line.find('^') else {
                return Err(Error::UnrecognizedLine(line.to_string()));
            };
            let token = if caret == 0 {
                None
            } else {
                Some(
                    line[..caret]
                        .parse::<u64>()
                        .map_err(|_| Error::UnrecognizedLine(line.to_string()))?,
                )
            };
            let rest = &line[caret + 1..];
            let (class, payload) = rest.split_once(',').unwrap_or((rest, ""));
            Ok(Line::Result {
                token,
                class: class.to_string(),
                payload: payload.to_string(),
            })
        }
        _ => Err(Error::UnrecognizedLine(line.to_string())),
    }
}

/// Split `class,payload` of an async record and parse the payload.
pub fn parse_async(text: &str) -> Result<(String, Tuple), Error> {
    let (class, payload) = text.split_once(',').unwrap_or((text, ""));
    Ok((class.to_string(), parse_tuple(payload)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

/// Completion of a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub class: ResultClass,
    pub payload: Tuple,
    /// Console stream lines received in the same turn.
    pub console: Vec<String>,
}

impl Response {
    /// Decode `class` and `payload` of a result record.
    pub fn parse(class: &str, payload: &str) -> Result<Response, Error> {
        let class = class.parse::<ResultClass>().map_err(|_| Error::Parse {
            text: class.to_string(),
            pos: 0,
            msg: "unknown result class",
        })?;
        Ok(Response {
            class,
            payload: parse_tuple(payload)?,
            console: vec![],
        })
    }

    /// `msg` of an error result.
    pub fn error_message(&self) -> Option<&str> {
        if self.class == ResultClass::Error {
            self.payload.get("msg").and_then(Value::as_str).or(Some(""))
        } else {
            None
        }
    }

    /// Turn an error result into [`Error::Command`], any other unexpected class into
    /// [`Error::UnexpectedResult`].
    pub fn expect_class(self, command: &str, class: ResultClass) -> Result<Response, Error> {
        if self.class == class {
            return Ok(self);
        }
        if let Some(msg) = self.error_message() {
            return Err(Error::Command {
                command: command.to_string(),
                message: msg.to_string(),
            });
        }
        Err(Error::UnexpectedResult {
            command: command.to_string(),
            class: self.class.to_string(),
        })
    }

    pub fn expect_done(self, command: &str) -> Result<Response, Error> {
        self.expect_class(command, ResultClass::Done)
    }

    /// All console text of the turn joined in one string.
    pub fn console_text(&self) -> String {
        self.console.concat()
    }

    /// Console text split into lines without trailing newlines.
    pub fn console_lines(&self) -> Vec<String> {
        self.console_text().lines().map(ToString::to_string).collect()
    }
}

/// A set of backend thread ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadSet {
    All,
    Ids(Vec<u32>),
}

impl ThreadSet {
    fn decode(v: Option<&Value>) -> ThreadSet {
        match v {
            None => ThreadSet::All,
            Some(Value::Str(s)) if s == "all" => ThreadSet::All,
            Some(Value::List(items)) => {
                ThreadSet::Ids(items.iter().filter_map(Value::as_int).map(|v| v as u32).collect())
            }
            Some(other) => match other.as_int() {
                Some(id) => ThreadSet::Ids(vec![id as u32]),
                None => ThreadSet::All,
            },
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        match self {
            ThreadSet::All => true,
            ThreadSet::Ids(ids) => ids.contains(&id),
        }
    }
}

/// Exit codes are printed in octal by gdb.
fn decode_exit_code(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Str(s) => i64::from_str_radix(s, 8).ok(),
        Value::Int(i) => i64::from_str_radix(&i.to_string(), 8).ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    BreakpointHit { number: u32 },
    EndSteppingRange,
    FunctionFinished,
    SignalReceived { signal: String },
    Exited { code: Option<i64> },
    ExitedNormally,
    ExitedSignalled { signal: String },
    Exec,
    Other(String),
    /// Attach reports a bare stop.
    Unspecified,
}

impl StopReason {
    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            StopReason::Exited { .. } | StopReason::ExitedNormally | StopReason::ExitedSignalled { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopEvent {
    pub reason: StopReason,
    pub thread_id: Option<u32>,
    pub stopped_threads: ThreadSet,
    pub frame: Option<StackFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecRecord {
    Running(ThreadSet),
    Stopped(StopEvent),
    Other(String),
}

impl ExecRecord {
    pub fn decode(class: &str, t: &Tuple) -> Result<ExecRecord, Error> {
        match class {
            "running" => Ok(ExecRecord::Running(ThreadSet::decode(t.get("thread-id")))),
            "stopped" => {
                let signal = || {
                    t.get("signal-name")
                        .map(Value::to_text)
                        .unwrap_or_default()
                };
                let reason = match t.get("reason").map(Value::to_text).as_deref() {
                    None => StopReason::Unspecified,
                    Some("breakpoint-hit") => StopReason::BreakpointHit {
                        number: t.int("bkptno")? as u32,
                    },
                    Some("end-stepping-range") => StopReason::EndSteppingRange,
                    Some("function-finished") => StopReason::FunctionFinished,
                    Some("signal-received") => StopReason::SignalReceived { signal: signal() },
                    Some("exited") => StopReason::Exited {
                        code: decode_exit_code(t.get("exit-code")),
                    },
                    Some("exited-normally") => StopReason::ExitedNormally,
                    Some("exited-signalled") => StopReason::ExitedSignalled { signal: signal() },
                    Some("exec") => StopReason::Exec,
                    Some(other) => StopReason::Other(other.to_string()),
                };
                let frame = match t.get("frame").and_then(Value::as_tuple) {
                    Some(f) => Some(StackFrame::decode(f)?),
                    None => None,
                };
                Ok(ExecRecord::Stopped(StopEvent {
                    reason,
                    thread_id: t.get("thread-id").and_then(Value::as_int).map(|v| v as u32),
                    stopped_threads: ThreadSet::decode(t.get("stopped-threads")),
                    frame,
                }))
            }
            other => Ok(ExecRecord::Other(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notify {
    ThreadGroupAdded {
        group: String,
    },
    ThreadGroupStarted {
        group: String,
        pid: u32,
    },
    ThreadGroupExited {
        group: String,
        exit_code: Option<i64>,
    },
    ThreadCreated {
        id: u32,
        group: String,
    },
    ThreadExited {
        id: u32,
        group: String,
    },
    LibraryLoaded,
    LibraryUnloaded,
    Other(String),
}

impl Notify {
    pub fn decode(class: &str, t: &Tuple) -> Result<Notify, Error> {
        let notify = match class {
            "thread-group-added" => Notify::ThreadGroupAdded {
                group: t.text("id")?,
            },
            "thread-group-started" => Notify::ThreadGroupStarted {
                group: t.text("id")?,
                pid: t.int("pid")? as u32,
            },
            "thread-group-exited" => Notify::ThreadGroupExited {
                group: t.text("id")?,
                exit_code: decode_exit_code(t.get("exit-code")),
            },
            "thread-created" => Notify::ThreadCreated {
                id: t.int("id")? as u32,
                group: t.text("group-id")?,
            },
            "thread-exited" => Notify::ThreadExited {
                id: t.int("id")? as u32,
                group: t.text("group-id")?,
            },
            "library-loaded" => Notify::LibraryLoaded,
            "library-unloaded" => Notify::LibraryUnloaded,
            other => Notify::Other(other.to_string()),
        };
        Ok(notify)
    }
}

/// One frame of `stack-list-frames` or of a stop record.
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub level: u32,
    pub addr: Option<u64>,
    pub func: Option<String>,
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    pub fn decode(t: &Tuple) -> Result<StackFrame, Error> {
        Ok(StackFrame {
            level: t.get("level").and_then(Value::as_int).unwrap_or_default() as u32,
            addr: t.get("addr").and_then(Value::as_int),
            func: t
                .get("func")
                .map(Value::to_text)
                .filter(|f| f != "??"),
            file: t.get("file").map(Value::to_text),
            fullname: t.get("fullname").map(Value::to_text),
            line: t.get("line").and_then(Value::as_int).map(|l| l as u32),
        })
    }

    /// Decode a `stack=[frame={..},..]` list.
    pub fn decode_stack(t: &Tuple) -> Result<Vec<StackFrame>, Error> {
        t.list("stack")?
            .iter()
            .map(|f| {
                f.as_tuple()
                    .ok_or(Error::MissingField("frame"))
                    .and_then(StackFrame::decode)
            })
            .collect()
    }

    pub fn location(&self) -> Result<Location, Error> {
        let place = match (&self.file, self.line) {
            (Some(f), Some(l)) => Some((f.clone(), l)),
            _ => None,
        };
        Location::new(self.func.clone(), place, self.addr)
    }
}

/// `bkpt={...}` of `break-insert` and `break-info`.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointInfo {
    pub number: u32,
    pub multiple: bool,
    pub addr: Option<u64>,
    pub func: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub enabled: bool,
}

impl BreakpointInfo {
    pub fn decode(t: &Tuple) -> Result<BreakpointInfo, Error> {
        let addr = t.get("addr");
        Ok(BreakpointInfo {
            number: t.int("number")? as u32,
            multiple: matches!(addr, Some(Value::Str(s)) if s == "<MULTIPLE>"),
            addr: addr.and_then(Value::as_int),
            func: t.get("func").map(Value::to_text),
            file: t.get("file").map(Value::to_text),
            line: t.get("line").and_then(Value::as_int).map(|l| l as u32),
            enabled: t.get("enabled").map(Value::to_text).as_deref() != Some("n"),
        })
    }

    pub fn location(&self) -> Result<Location, Error> {
        let place = match (&self.file, self.line) {
            (Some(f), Some(l)) => Some((f.clone(), l)),
            _ => None,
        };
        Location::new(self.func.clone(), place, self.addr)
    }
}
