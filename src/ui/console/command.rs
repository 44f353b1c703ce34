//! Console commands handled by the application itself. Everything else is console text for
//! the debugger interpreter.

use crate::debugger::{Error, Location};

pub const LAUNCH_COMMAND: &str = "launch";
pub const ATTACH_COMMAND: &str = "attach";
pub const DETACH_COMMAND: &str = "detach";
pub const CONTINUE_COMMAND: &str = "continue";
pub const CONTINUE_COMMAND_SHORT: &str = "c";
pub const INTERRUPT_COMMAND: &str = "interrupt";
pub const STEP_OVER_COMMAND: &str = "next";
pub const STEP_OVER_COMMAND_SHORT: &str = "n";
pub const STEP_INTO_COMMAND: &str = "step";
pub const STEP_INTO_COMMAND_SHORT: &str = "s";
pub const STEP_OUT_COMMAND: &str = "finish";
pub const BREAK_COMMAND: &str = "break";
pub const BREAK_COMMAND_SHORT: &str = "b";
pub const ENABLE_COMMAND: &str = "enable";
pub const DISABLE_COMMAND: &str = "disable";
pub const DELETE_COMMAND: &str = "delete";
pub const MOVE_COMMAND: &str = "move";
pub const BACKTRACE_COMMAND: &str = "backtrace";
pub const BACKTRACE_COMMAND_SHORT: &str = "bt";
pub const EVAL_COMMAND: &str = "eval";
pub const HELP_COMMAND: &str = "help";
pub const HELP_COMMAND_SHORT: &str = "h";

/// Every console command word, for completion.
pub const COMMANDS: &[&str] = &[
    LAUNCH_COMMAND,
    ATTACH_COMMAND,
    DETACH_COMMAND,
    CONTINUE_COMMAND,
    INTERRUPT_COMMAND,
    STEP_OVER_COMMAND,
    STEP_INTO_COMMAND,
    STEP_OUT_COMMAND,
    BREAK_COMMAND,
    ENABLE_COMMAND,
    DISABLE_COMMAND,
    DELETE_COMMAND,
    MOVE_COMMAND,
    BACKTRACE_COMMAND,
    EVAL_COMMAND,
    HELP_COMMAND,
];

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Parse(String),
    #[error(transparent)]
    Debugger(#[from] Error),
}

impl CommandError {
    pub fn is_fatal(&self) -> bool {
        match self {
            CommandError::Parse(_) => false,
            CommandError::Debugger(e) => e.is_fatal(),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Launch(Vec<String>),
    Attach(u32),
    Detach,
    Continue,
    Interrupt,
    StepOver,
    StepInto,
    StepOut,
    Break(Location),
    Enable(u32),
    Disable(u32),
    Delete(u32),
    Move(u32, Location),
    Backtrace,
    Eval(String),
    Help(Option<String>),
    /// Text for the debugger interpreter.
    Gdb(String),
}

fn number(arg: Option<&str>, what: &str) -> Result<u32, CommandError> {
    let arg = arg.ok_or_else(|| CommandError::Parse(format!("{what} expected")))?;
    arg.parse()
        .map_err(|_| CommandError::Parse(format!("invalid {what} `{arg}`")))
}

fn location(text: &str) -> Result<Location, CommandError> {
    if text.is_empty() {
        return Err(CommandError::Parse("location expected".to_string()));
    }
    Ok(Location::parse(text)?)
}

impl Command {
    pub fn parse(input: &str) -> Result<Command, CommandError> {
        let input = input.trim();
        let (word, rest) = match input.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (input, ""),
        };
        let mut args = rest.split_whitespace();

        let command = match word {
            LAUNCH_COMMAND => {
                let cmdline: Vec<String> = args.map(ToString::to_string).collect();
                if cmdline.is_empty() {
                    return Err(CommandError::Parse("program expected".to_string()));
                }
                Command::Launch(cmdline)
            }
            ATTACH_COMMAND => Command::Attach(number(args.next(), "pid")?),
            DETACH_COMMAND => Command::Detach,
            CONTINUE_COMMAND | CONTINUE_COMMAND_SHORT => Command::Continue,
            INTERRUPT_COMMAND => Command::Interrupt,
            STEP_OVER_COMMAND | STEP_OVER_COMMAND_SHORT => Command::StepOver,
            STEP_INTO_COMMAND | STEP_INTO_COMMAND_SHORT => Command::StepInto,
            STEP_OUT_COMMAND => Command::StepOut,
            BREAK_COMMAND | BREAK_COMMAND_SHORT => Command::Break(location(rest)?),
            ENABLE_COMMAND => Command::Enable(number(args.next(), "breakpoint id")?),
            DISABLE_COMMAND => Command::Disable(number(args.next(), "breakpoint id")?),
            DELETE_COMMAND => Command::Delete(number(args.next(), "breakpoint id")?),
            MOVE_COMMAND => {
                let id = number(args.next(), "breakpoint id")?;
                let place = args.collect::<Vec<_>>().join(" ");
                Command::Move(id, location(&place)?)
            }
            BACKTRACE_COMMAND | BACKTRACE_COMMAND_SHORT => Command::Backtrace,
            EVAL_COMMAND => {
                if rest.is_empty() {
                    return Err(CommandError::Parse("expression expected".to_string()));
                }
                Command::Eval(rest.to_string())
            }
            HELP_COMMAND | HELP_COMMAND_SHORT => Command::Help(args.next().map(ToString::to_string)),
            _ => Command::Gdb(input.to_string()),
        };
        Ok(command)
    }
}
