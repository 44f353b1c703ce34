use crate::common::{
    active_frame_func, active_frame_line, clear_transitions, launch, run_until, setup,
    stack_queries, test_config, transitions, Event,
};
use crate::LOOPER;
use gdbmux::debugger::{Error, Location, Status};
use serial_test::serial;

#[test]
#[serial]
fn test_continue_and_interrupt() {
    let (debugger, hooks) = setup(test_config());
    launch(&debugger, LOOPER);
    let thread = debugger.active_thread().unwrap();

    debugger.begin_resume(&thread).wait().unwrap();
    assert_eq!(debugger.status(), Status::Running);
    assert_eq!(thread.status(), Status::Running);
    assert!(hooks.contains(&Event::Status(Status::Running)));

    // a running debugger refuses another resume
    let again = debugger.begin_resume(&thread).wait();
    assert!(matches!(again, Err(Error::InvalidState(_))));

    debugger.begin_interrupt().wait().unwrap();
    assert_eq!(debugger.status(), Status::Break);
    assert_eq!(thread.status(), Status::Break);
    assert!(hooks.contains(&Event::Status(Status::Break)));
    assert_eq!(active_frame_func(&debugger).as_deref(), Some("main"));

    debugger.shutdown();
}

#[test]
#[serial]
fn test_interrupt_when_stopped() {
    let (debugger, _) = setup(test_config());
    debugger.begin_interrupt().wait().unwrap();
    launch(&debugger, LOOPER);
    debugger.begin_interrupt().wait().unwrap();
    assert_eq!(debugger.status(), Status::Break);
    debugger.shutdown();
}

#[test]
#[serial]
fn test_continue_resumes_every_process() {
    let (debugger, _) = setup(test_config());
    launch(&debugger, LOOPER);
    launch(&debugger, LOOPER);
    let thread = debugger.active_thread().unwrap();

    debugger.begin_resume(&thread).wait().unwrap();
    for backend in debugger.backends() {
        assert_eq!(backend.status(), Status::Running);
    }
    for thread in debugger.threads() {
        assert_eq!(thread.status(), Status::Running);
    }

    debugger.begin_interrupt().wait().unwrap();
    for backend in debugger.backends() {
        assert_eq!(backend.status(), Status::Break);
    }

    debugger.shutdown();
}

#[test]
#[serial]
fn test_steps() {
    let (debugger, _) = setup(test_config());
    launch(&debugger, LOOPER);
    let thread = debugger.active_thread().unwrap();
    assert_eq!(active_frame_line(&debugger), Some(5));

    debugger.begin_step_over(&thread).wait().unwrap();
    assert_eq!(debugger.status(), Status::Break);
    assert_eq!(active_frame_line(&debugger), Some(6));

    debugger.begin_step_into(&thread).wait().unwrap();
    assert_eq!(active_frame_line(&debugger), Some(7));

    debugger.new_breakpoint(Location::from_identifier("get_a")).unwrap();
    debugger.begin_resume(&thread).wait().unwrap();
    run_until(&debugger, || debugger.status() == Status::Break);
    assert_eq!(active_frame_func(&debugger).as_deref(), Some("get_a"));

    debugger.begin_step_out(&thread).wait().unwrap();
    assert_eq!(active_frame_func(&debugger).as_deref(), Some("main"));
    assert_eq!(active_frame_line(&debugger), Some(50));

    debugger.shutdown();
}

#[test]
#[serial]
fn test_step_stops_other_processes() {
    let (debugger, _) = setup(test_config());
    let first = launch(&debugger, LOOPER);
    let second = launch(&debugger, LOOPER);
    let other = second.backend().unwrap();
    let resumes = other.resume_count();
    clear_transitions();

    let thread = first.threads()[0].clone();
    debugger.begin_step_over(&thread).wait().unwrap();

    // the other process ran during the step and was interrupted after it, exactly once
    assert_eq!(other.resume_count(), resumes + 1);
    assert_eq!(transitions(second.pid()), vec![Status::Running, Status::Break]);
    assert_eq!(transitions(first.pid()), vec![Status::Running, Status::Break]);
    assert_eq!(other.status(), Status::Break);
    assert_eq!(debugger.status(), Status::Break);
    assert_eq!(
        debugger.active_thread().unwrap().frontend_id(),
        thread.frontend_id()
    );

    debugger.shutdown();
}

#[test]
#[serial]
fn test_new_thread() {
    let (debugger, hooks) = setup(test_config());
    let process = launch(&debugger, "/tmp/threads");
    let thread = debugger.active_thread().unwrap();

    debugger.begin_resume(&thread).wait().unwrap();
    run_until(&debugger, || debugger.threads().len() == 2);
    assert!(hooks.contains(&Event::ThreadAdded(2)));
    assert_eq!(process.threads().len(), 2);
    assert_eq!(debugger.thread(2).unwrap().status(), Status::Running);

    debugger.begin_interrupt().wait().unwrap();
    assert_eq!(debugger.thread(2).unwrap().status(), Status::Break);

    debugger.shutdown();
}

#[test]
#[serial]
fn test_active_thread_selection() {
    let (debugger, hooks) = setup(test_config());
    launch(&debugger, LOOPER);
    launch(&debugger, LOOPER);

    let first = debugger.thread(1).unwrap();
    debugger.set_active_thread(Some(first.clone()));
    assert_eq!(debugger.active_thread().unwrap().frontend_id(), Some(1));
    assert_eq!(
        debugger.active_process().unwrap().frontend_id(),
        Some(1)
    );
    assert!(hooks.contains(&Event::ActiveThread(Some(1))));

    debugger.set_active_frame(1).unwrap();
    assert_eq!(first.active_frame(), 1);
    assert!(hooks.contains(&Event::ActiveFrame(1, 1)));

    // a resume resets frame selection
    debugger.begin_resume(&first).wait().unwrap();
    assert_eq!(first.active_frame(), 0);
    debugger.begin_interrupt().wait().unwrap();

    debugger.shutdown();
}

#[test]
#[serial]
fn test_call_stack_cached_until_resume() {
    let (debugger, _) = setup(test_config());
    launch(&debugger, LOOPER);
    debugger
        .new_breakpoint(Location::from_identifier("get_a"))
        .unwrap();
    let thread = debugger.active_thread().unwrap();
    debugger.begin_resume(&thread).wait().unwrap();
    run_until(&debugger, || debugger.status() == Status::Break);

    let queries = stack_queries();
    let stack = thread.call_stack().unwrap();
    assert_eq!(stack.len(), 2);
    assert_eq!(thread.call_stack().unwrap(), stack);
    assert_eq!(thread.frame(1).unwrap(), stack[1]);
    assert_eq!(stack_queries(), queries + 1);

    // a status change drops the cached frames
    debugger.begin_step_out(&thread).wait().unwrap();
    let queries = stack_queries();
    let stack = thread.call_stack().unwrap();
    assert_eq!(stack.len(), 1);
    assert_eq!(stack[0].func.as_deref(), Some("main"));
    assert_eq!(stack_queries(), queries + 1);

    debugger.shutdown();
}
