//! GDB/MI protocol codec.
//!
//! [`value`] holds the generic value grammar, [`record`] classifies output lines and decodes
//! typed records, [`console`] parses the console text that gdb has no MI form for.

pub mod console;
pub mod record;
pub mod value;

pub use console::{
    parse_console_location, parse_loose_dict, parse_tabular_breakpoint_info, quote_console,
    BreakpointTableLayout,
};
pub use record::{
    classify_line, parse_async, BreakpointInfo, ExecRecord, Line, Notify, Response, ResultClass,
    StackFrame, StopEvent, StopReason, ThreadSet,
};
pub use value::{parse_tuple, Tuple, Value};

/// Parse a result record payload, `parse_result("done", "value=\"1\"")`.
pub fn parse_result(class: &str, payload: &str) -> Result<Response, crate::debugger::Error> {
    Response::parse(class, payload)
}
