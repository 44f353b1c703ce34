use crate::ui::console::command::*;

pub const HELP: &str = r#"
Available debugger commands:

launch <program> [args]                     -- start a program stopped at its entry point
attach <pid>                                -- attach to a running process
detach                                      -- detach from the active process, it keeps running
c, continue                                 -- continue every process
interrupt                                   -- stop every process (Ctrl-C does the same)
n, next                                     -- step the active thread over calls
s, step                                     -- step the active thread into calls
finish                                      -- run the active thread until its frame returns
b, break <file:line>|<function>|<0xaddr>    -- set a breakpoint in every process
enable|disable|delete <id>                  -- manage breakpoints
move <id> <location>                        -- move a breakpoint
bt, backtrace                               -- print the active thread stack
eval <expression>                           -- evaluate an expression in the active frame
h, help <>|<command>                        -- show help
q, quit                                     -- exit, debugged processes are killed

Any other text goes to gdb in the context of the active thread and frame, for example
`info threads`, `thread 2`, `up`, `print x`, `x/4x $sp`. Start a line with `*` to send it to
gdb without interpretation.
"#;

pub const HELP_LAUNCH: &str = "\
\x1b[32;1mlaunch\x1b[0m
Start a program in a new inferior and stop it at its entry point. Program output is printed
above the prompt.

Examples of usage:
launch ./server --port 8080
";

pub const HELP_ATTACH: &str = "\
\x1b[32;1mattach\x1b[0m
Attach to a running process. A process started by `gmx-launcher` is released from the
launcher, followed through exec and stopped at the entry point of the real program.
";

pub const HELP_CONTINUE: &str = "\
\x1b[32;1mc, continue\x1b[0m
Continue every process. Once any process stops, all others are interrupted.
";

pub const HELP_STEP: &str = "\
\x1b[32;1mnext, step, finish\x1b[0m
Step the active thread. Other processes keep running until the step ends, then they are
interrupted.
";

pub const HELP_BREAK: &str = "\
\x1b[32;1mb, break\x1b[0m
Set a breakpoint in every debugged process, current and future.

Examples of usage:
break main.c:42 - break at line 42 of main.c
break handle_request - break at function entry
break 0x401136 - break at address
";

pub const HELP_QUIT: &str = "\
\x1b[32;1mq, quit\x1b[0m
Exit the debugger, gdb kills launched processes and detaches from attached ones.
";

pub fn help_for_command(command: Option<&str>) -> &str {
    match command {
        None => HELP,
        Some(LAUNCH_COMMAND) => HELP_LAUNCH,
        Some(ATTACH_COMMAND) => HELP_ATTACH,
        Some(CONTINUE_COMMAND) | Some(CONTINUE_COMMAND_SHORT) => HELP_CONTINUE,
        Some(STEP_OVER_COMMAND)
        | Some(STEP_OVER_COMMAND_SHORT)
        | Some(STEP_INTO_COMMAND)
        | Some(STEP_INTO_COMMAND_SHORT)
        | Some(STEP_OUT_COMMAND) => HELP_STEP,
        Some(BREAK_COMMAND) | Some(BREAK_COMMAND_SHORT) => HELP_BREAK,
        Some("q") | Some("quit") => HELP_QUIT,
        _ => "unknown command",
    }
}
