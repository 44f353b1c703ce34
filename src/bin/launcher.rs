//! Bootstrap launcher: `gmx-launcher <program> [args]`.
//!
//! Prints its pid and waits until a debugger attaches and clears the sentinel, then executes the
//! program. A debugger following the exec stops the program at its entry point, so nothing of it
//! runs undebugged.

use anyhow::{anyhow, bail};
use nix::unistd::{execvp, getpid};
use std::ffi::CString;
use std::ptr::addr_of;
use std::time::Duration;

/// Cleared by the debugger.
#[no_mangle]
#[used]
#[allow(non_upper_case_globals)]
static mut __gdbmux_launcher_waiting: i32 = 1;

fn waiting() -> bool {
    unsafe { std::ptr::read_volatile(addr_of!(__gdbmux_launcher_waiting)) != 0 }
}

fn main() -> anyhow::Result<()> {
    let args = std::env::args()
        .skip(1)
        .map(CString::new)
        .collect::<Result<Vec<_>, _>>()?;
    let Some(program) = args.first() else {
        bail!("usage: gmx-launcher <program> [args]");
    };

    println!("{}", getpid());
    while waiting() {
        std::thread::sleep(Duration::from_millis(10));
    }

    execvp(program, &args).map_err(|e| anyhow!("execute {program:?}: {e}"))?;
    Ok(())
}
