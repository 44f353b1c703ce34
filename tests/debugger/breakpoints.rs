use crate::common::{active_frame_func, active_frame_line, launch, run_until, setup, test_config, Event};
use crate::LOOPER;
use gdbmux::debugger::{Location, Status};
use serial_test::serial;

#[test]
#[serial]
fn test_breakpoint_hit() {
    let (debugger, hooks) = setup(test_config());
    launch(&debugger, LOOPER);

    let bp = debugger
        .new_breakpoint(Location::from_file_line("test1.c", 43))
        .unwrap();
    assert_eq!(bp.id(), 1);
    assert!(bp.all_valid());
    assert!(bp.error().is_none());
    assert!(hooks.contains(&Event::BreakpointsChanged));
    let actual = bp.actual_locations();
    assert_eq!(actual.len(), 1);
    assert_eq!(actual[0].identifier(), Some("get_a"));
    assert_eq!(actual[0].pc(), Some(0x401136));

    let thread = debugger.active_thread().unwrap();
    debugger.begin_resume(&thread).wait().unwrap();
    run_until(&debugger, || hooks.contains(&Event::BreakpointHit(1, Some(1))));

    assert_eq!(debugger.status(), Status::Break);
    assert_eq!(active_frame_func(&debugger).as_deref(), Some("get_a"));
    assert_eq!(active_frame_line(&debugger), Some(43));

    debugger.shutdown();
}

#[test]
#[serial]
fn test_invalid_breakpoint() {
    let (debugger, _) = setup(test_config());
    launch(&debugger, LOOPER);

    let bp = debugger
        .new_breakpoint(Location::from_identifier("nowhere"))
        .unwrap();
    assert!(!bp.some_valid());
    assert!(!bp.all_valid());
    assert!(bp.error().unwrap().contains("not defined"));
    assert!(bp.actual_locations().is_empty());
    // still listed, the user may move it somewhere valid
    assert_eq!(debugger.breakpoints().len(), 1);

    debugger
        .set_breakpoint_location(&bp, Location::from_identifier("get_a"))
        .unwrap();
    assert!(bp.all_valid());
    assert!(bp.error().is_none());

    debugger.shutdown();
}

#[test]
#[serial]
fn test_breakpoint_before_launch() {
    let (debugger, hooks) = setup(test_config());
    let bp = debugger
        .new_breakpoint(Location::from_identifier("get_a"))
        .unwrap();
    assert!(bp.bindings().is_empty());
    assert!(bp.all_valid());
    assert!(!bp.some_valid());

    launch(&debugger, LOOPER);
    run_until(&debugger, || bp.bindings().len() == 1);
    assert!(bp.some_valid());
    assert!(bp.all_valid());
    assert_eq!(bp.actual_locations().len(), 1);
    // the entry stop is not a hit of the user breakpoint
    assert_eq!(active_frame_func(&debugger).as_deref(), Some("main"));

    let thread = debugger.active_thread().unwrap();
    debugger.begin_resume(&thread).wait().unwrap();
    run_until(&debugger, || hooks.contains(&Event::BreakpointHit(1, Some(1))));
    assert_eq!(active_frame_func(&debugger).as_deref(), Some("get_a"));

    debugger.shutdown();
}

#[test]
#[serial]
fn test_disable_enable_move_delete() {
    let (debugger, hooks) = setup(test_config());
    launch(&debugger, LOOPER);
    let thread = debugger.active_thread().unwrap();
    let bp = debugger
        .new_breakpoint(Location::from_identifier("get_a"))
        .unwrap();

    debugger.set_breakpoint_enabled(&bp, false).unwrap();
    assert!(!bp.is_enabled());
    debugger.begin_resume(&thread).wait().unwrap();
    crate::common::settle(&debugger);
    assert_eq!(debugger.status(), Status::Running);
    debugger.begin_interrupt().wait().unwrap();
    assert!(!hooks.contains(&Event::BreakpointHit(1, Some(1))));

    debugger.set_breakpoint_enabled(&bp, true).unwrap();
    debugger
        .set_breakpoint_location(&bp, Location::from_identifier("get_b"))
        .unwrap();
    assert_eq!(bp.location(), Location::from_identifier("get_b"));
    assert!(bp.is_enabled());
    debugger.begin_resume(&thread).wait().unwrap();
    run_until(&debugger, || hooks.contains(&Event::BreakpointHit(1, Some(1))));
    assert_eq!(active_frame_func(&debugger).as_deref(), Some("get_b"));
    assert_eq!(active_frame_line(&debugger), Some(10));

    debugger.delete_breakpoint(&bp).unwrap();
    assert!(debugger.breakpoints().is_empty());
    assert!(bp.bindings().is_empty());
    hooks.clear();
    debugger.begin_resume(&thread).wait().unwrap();
    crate::common::settle(&debugger);
    assert_eq!(debugger.status(), Status::Running);
    assert_eq!(hooks.count(|e| matches!(e, Event::BreakpointHit(..))), 0);
    debugger.begin_interrupt().wait().unwrap();

    debugger.shutdown();
}

#[test]
#[serial]
fn test_breakpoint_change_while_running() {
    let (debugger, hooks) = setup(test_config());
    let process = launch(&debugger, LOOPER);
    let backend = process.backend().unwrap();
    let thread = debugger.active_thread().unwrap();
    debugger.begin_resume(&thread).wait().unwrap();
    let resumes = backend.resume_count();

    // the debugger stops to insert the breakpoint and continues afterwards
    let bp = debugger
        .new_breakpoint(Location::from_identifier("get_a"))
        .unwrap();
    assert!(bp.all_valid());
    run_until(&debugger, || hooks.contains(&Event::BreakpointHit(1, Some(1))));
    assert!(backend.resume_count() > resumes);
    assert_eq!(debugger.status(), Status::Break);

    debugger.shutdown();
}

#[test]
#[serial]
fn test_new_backend_gets_breakpoints() {
    let (debugger, _) = setup(test_config());
    launch(&debugger, LOOPER);
    let bp = debugger
        .new_breakpoint(Location::from_identifier("get_a"))
        .unwrap();
    assert_eq!(bp.bindings().len(), 1);

    launch(&debugger, LOOPER);
    run_until(&debugger, || bp.bindings().len() == 2);
    assert!(bp.all_valid());
    // both gdbs resolve to the same place
    assert_eq!(bp.actual_locations().len(), 1);

    debugger.shutdown();
}

#[test]
#[serial]
fn test_hits_in_two_backends() {
    let (debugger, hooks) = setup(test_config());
    launch(&debugger, LOOPER);
    launch(&debugger, LOOPER);
    debugger
        .new_breakpoint(Location::from_identifier("get_a"))
        .unwrap();
    hooks.clear();

    let thread = debugger.active_thread().unwrap();
    debugger.begin_resume(&thread).wait().unwrap();
    run_until(&debugger, || {
        hooks.count(|e| matches!(e, Event::BreakpointHit(..))) == 2
    });

    assert_eq!(debugger.status(), Status::Break);
    assert!(hooks.contains(&Event::BreakpointHit(1, Some(1))));
    assert!(hooks.contains(&Event::BreakpointHit(1, Some(2))));
    // hits are only reported once everything is stopped
    assert_eq!(hooks.hit_statuses(), vec![Status::Break, Status::Break]);
    for backend in debugger.backends() {
        assert_eq!(backend.status(), Status::Break);
    }

    debugger.shutdown();
}
