use crate::common::{launch, run_until, setup, test_config, Event};
use crate::LOOPER;
use gdbmux::debugger::{Error, Location};
use serial_test::serial;

#[test]
#[serial]
fn test_info_threads_and_switch() {
    let (debugger, _) = setup(test_config());
    let first = launch(&debugger, LOOPER);
    let second = launch(&debugger, LOOPER);

    debugger.begin_interpreter_exec("thread 1").wait().unwrap();
    let out = debugger.begin_interpreter_exec("info threads").wait().unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("*   1"));
    assert!(lines[0].contains(&format!("{}:1 BREAK", first.pid())));
    assert!(lines[0].contains("in main at test1.c:5"));
    assert!(lines[1].starts_with("    2"));

    let out = debugger.begin_interpreter_exec("thread 2").wait().unwrap();
    assert!(out.is_empty());
    assert_eq!(debugger.active_thread().unwrap().frontend_id(), Some(2));
    let out = debugger.begin_interpreter_exec("thread").wait().unwrap();
    assert_eq!(out, format!("thread 2 {}:1\n", second.pid()));

    // `i` is short for `info`
    let out = debugger.begin_interpreter_exec("i th").wait().unwrap();
    assert!(out.lines().nth(1).unwrap().starts_with("*   2"));

    let out = debugger.begin_interpreter_exec("thread 7").wait();
    assert!(matches!(out, Err(Error::NotFound(_))));

    debugger.shutdown();
}

#[test]
#[serial]
fn test_processes() {
    let (debugger, _) = setup(test_config());
    let first = launch(&debugger, LOOPER);
    launch(&debugger, LOOPER);

    let out = debugger.begin_interpreter_exec("info procs").wait().unwrap();
    assert_eq!(out.lines().count(), 2);
    assert!(out.contains(&first.describe()));

    debugger.begin_interpreter_exec("process 1").wait().unwrap();
    assert_eq!(debugger.active_process().unwrap().frontend_id(), Some(1));
    let out = debugger.begin_interpreter_exec("process").wait().unwrap();
    assert_eq!(out, format!("process 1 {}\n", first.describe()));

    let out = debugger.begin_interpreter_exec("kill").wait().unwrap();
    assert_eq!(out, format!("process {} killed\n", first.pid()));
    assert_eq!(debugger.processes().len(), 1);

    debugger.shutdown();
}

#[test]
#[serial]
fn test_frame_navigation() {
    let (debugger, hooks) = setup(test_config());
    launch(&debugger, LOOPER);
    debugger
        .new_breakpoint(Location::from_identifier("get_a"))
        .unwrap();
    let thread = debugger.active_thread().unwrap();
    debugger.begin_resume(&thread).wait().unwrap();
    run_until(&debugger, || hooks.contains(&Event::BreakpointHit(1, Some(1))));
    assert_eq!(thread.call_stack().unwrap().len(), 2);

    let out = debugger.begin_interpreter_exec("up").wait().unwrap();
    assert!(out.starts_with("#1"));
    assert!(out.contains("in main at test1.c:50"));
    assert_eq!(thread.active_frame(), 1);

    // the outermost frame is a limit
    debugger.begin_interpreter_exec("up").wait().unwrap();
    assert_eq!(thread.active_frame(), 1);

    let out = debugger.begin_interpreter_exec("down 5").wait().unwrap();
    assert!(out.contains("in get_a at test1.c:43"));
    assert_eq!(thread.active_frame(), 0);

    let out = debugger.begin_interpreter_exec("frame 1").wait().unwrap();
    assert!(out.starts_with("#1"));
    assert_eq!(thread.active_frame(), 1);
    let out = debugger.begin_interpreter_exec("f").wait().unwrap();
    assert!(out.starts_with("#1"));

    let out = debugger.begin_interpreter_exec("frame x").wait();
    assert!(matches!(out, Err(Error::Interpreter(_))));

    debugger.shutdown();
}

#[test]
#[serial]
fn test_refused_commands() {
    let (debugger, _) = setup(test_config());
    launch(&debugger, LOOPER);

    let out = debugger.begin_interpreter_exec("start").wait();
    assert!(matches!(out, Err(Error::Interpreter(msg)) if msg == "not allowed"));
    let out = debugger.begin_interpreter_exec("inferior 2").wait();
    assert!(matches!(out, Err(Error::Interpreter(msg)) if msg == "not allowed"));
    let out = debugger.begin_interpreter_exec("r").wait();
    assert!(matches!(out, Err(Error::Interpreter(msg)) if msg == "not implemented"));
    let out = debugger.begin_interpreter_exec("break main").wait();
    assert!(matches!(out, Err(Error::Interpreter(msg)) if msg == "not implemented"));

    debugger.shutdown();
}

#[test]
#[serial]
fn test_forwarded_commands() {
    let (debugger, _) = setup(test_config());
    launch(&debugger, LOOPER);

    let out = debugger
        .begin_interpreter_exec("info sharedlibrary")
        .wait()
        .unwrap();
    assert_eq!(out, "fake: info sharedlibrary\n");
    let out = debugger.begin_interpreter_exec("print x").wait().unwrap();
    assert_eq!(out, "$1 = 42\n");
    // a leading star skips the local table
    let out = debugger
        .begin_interpreter_exec("*info threads")
        .wait()
        .unwrap();
    assert_eq!(out, "fake: info threads\n");

    let out = debugger.begin_interpreter_exec("where").wait();
    assert!(matches!(out, Err(Error::Command { .. })));

    debugger.shutdown();
}

#[test]
#[serial]
fn test_console_without_processes() {
    let (debugger, _) = setup(test_config());
    let out = debugger.begin_interpreter_exec("info threads").wait().unwrap();
    assert!(out.is_empty());
    // no gdb to forward to yet
    let out = debugger.begin_interpreter_exec("show version").wait();
    assert!(matches!(out, Err(Error::NotFound(_))));
    debugger.shutdown();
}

#[test]
#[serial]
fn test_evaluate() {
    let (debugger, _) = setup(test_config());
    assert!(matches!(
        debugger.begin_evaluate("a + b").wait(),
        Err(Error::NotFound(_))
    ));

    launch(&debugger, LOOPER);
    assert_eq!(debugger.begin_evaluate("a + b").wait().unwrap(), "42");
    let missing = debugger.begin_evaluate("missing_var").wait();
    assert!(matches!(missing, Err(Error::Command { .. })));

    debugger.shutdown();
}

#[test]
#[serial]
fn test_info_breakpoints() {
    let (debugger, _) = setup(test_config());
    launch(&debugger, LOOPER);
    debugger
        .new_breakpoint(Location::from_file_line("test1.c", 43))
        .unwrap();
    debugger
        .new_breakpoint(Location::from_identifier("nowhere"))
        .unwrap();

    let out = debugger
        .begin_interpreter_exec("info breakpoints")
        .wait()
        .unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0].split_whitespace().collect::<Vec<_>>(), ["Num", "Enb", "What"]);
    assert!(lines[1].contains("test1.c:43"));
    assert!(lines[1].contains('Y'));
    assert!(lines[2].contains("get_a at test1.c:43"));
    assert!(lines[3].contains("nowhere"));
    assert!(lines[4].contains("not defined"));

    debugger.shutdown();
}

#[test]
#[serial]
fn test_debug_toggle() {
    let (debugger, _) = setup(test_config());
    let first = debugger.begin_interpreter_exec("debug").wait().unwrap();
    let second = debugger.begin_interpreter_exec("debug").wait().unwrap();
    assert!(first.starts_with("mi trace "));
    assert!(second.starts_with("mi trace "));
    assert_ne!(first, second);
    debugger.shutdown();
}
