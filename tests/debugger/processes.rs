use crate::common::{
    active_frame_func, launch, run_until, settle, setup, spawn_attachable, test_config, Event,
    Program,
};
use crate::LOOPER;
use gdbmux::debugger::{Config, Error, Status};
use serial_test::serial;

#[test]
#[serial]
fn test_launch_stops_at_entry() {
    let (debugger, hooks) = setup(test_config());
    let process = launch(&debugger, LOOPER);

    assert_eq!(process.frontend_id(), Some(1));
    assert!(process.was_launched());
    assert!(process.is_alive());
    let metadata = process.metadata().unwrap();
    assert_eq!(metadata.exe.as_deref(), Some(LOOPER));
    assert_eq!(metadata.cwd.as_deref(), Some("/tmp"));
    assert_eq!(metadata.inferior, 1);
    assert!(metadata.pty.is_some());
    assert_eq!(process.describe(), format!("{LOOPER}:{}", process.pid()));

    assert_eq!(debugger.status(), Status::Break);
    assert_eq!(debugger.backends().len(), 1);
    assert_eq!(debugger.active_thread().unwrap().frontend_id(), Some(1));
    assert_eq!(active_frame_func(&debugger).as_deref(), Some("main"));
    // the entry breakpoint is internal
    assert!(debugger.breakpoints().is_empty());

    let events = hooks.events();
    assert!(events.contains(&Event::ProcessAdded(1)));
    assert!(events.contains(&Event::ThreadAdded(1)));
    assert!(events.contains(&Event::ActiveThread(Some(1))));

    debugger.shutdown();
}

#[test]
#[serial]
fn test_launch_missing_program() {
    let config = Config {
        keep_warm_backend: false,
        ..test_config()
    };
    let (debugger, hooks) = setup(config);
    let result = debugger.begin_launch(&["/tmp/missing".to_string()]).wait();
    assert!(matches!(result, Err(Error::Command { .. })));

    assert!(debugger.processes().is_empty());
    assert!(hooks.count(|e| matches!(e, Event::ProcessAdded(_))) == 0);
    run_until(&debugger, || debugger.backends().is_empty());

    debugger.shutdown();
}

#[test]
#[serial]
fn test_launch_empty_command_line() {
    let (debugger, _) = setup(test_config());
    let waitable = debugger.begin_launch(&[]);
    assert!(waitable.is_done());
    assert!(matches!(waitable.wait(), Err(Error::InvalidState(_))));
    assert!(debugger.processes().is_empty());

    settle(&debugger);
    launch(&debugger, LOOPER);
    assert_eq!(debugger.processes().len(), 1);

    debugger.shutdown();
}

#[test]
#[serial]
fn test_failed_launch_keeps_warm_backend() {
    let (debugger, _) = setup(test_config());
    let result = debugger.begin_launch(&["/tmp/crasher".to_string()]).wait();
    assert!(matches!(result, Err(Error::LaunchFailed(Some(3)))));
    assert!(debugger.processes().is_empty());

    settle(&debugger);
    assert_eq!(debugger.backends().len(), 1);

    // the warm backend is reused
    launch(&debugger, LOOPER);
    assert_eq!(debugger.backends().len(), 1);

    debugger.shutdown();
}

#[test]
#[serial]
fn test_process_exit() {
    let (debugger, hooks) = setup(test_config());
    let process = launch(&debugger, "/tmp/exiter");
    let backend = process.backend().unwrap();
    let thread = debugger.active_thread().unwrap();
    assert!(process.metadata().is_some());

    debugger.begin_resume(&thread).wait().unwrap();
    run_until(&debugger, || debugger.processes().is_empty());

    assert!(!process.is_alive());
    assert!(process.metadata().is_none());
    // the name outlives the metadata for exit messages
    assert_eq!(process.describe(), format!("/tmp/exiter:{}", process.pid()));
    assert_eq!(backend.last_exit_code(), Some(10));
    assert!(debugger.threads().is_empty());
    assert!(debugger.active_thread().is_none());
    assert_eq!(debugger.status(), Status::Break);

    let events = hooks.events();
    assert!(events.contains(&Event::ThreadRemoved(1)));
    assert!(events.contains(&Event::ProcessRemoved(1)));
    assert!(events.contains(&Event::ActiveThread(None)));

    debugger.shutdown();
}

#[test]
#[serial]
fn test_attach() {
    let (debugger, hooks) = setup(test_config());
    let pid = spawn_attachable(Program::Looper);

    let process = debugger.begin_attach(pid).wait().unwrap();
    assert_eq!(process.pid(), pid);
    assert!(!process.was_launched());
    assert_eq!(process.frontend_id(), Some(1));
    assert!(process.metadata().unwrap().pty.is_none());
    assert_eq!(debugger.status(), Status::Break);
    assert_eq!(active_frame_func(&debugger).as_deref(), Some("nanosleep"));
    assert!(hooks.contains(&Event::ProcessAdded(1)));

    let again = debugger.begin_attach(pid).wait();
    assert!(matches!(again, Err(Error::InvalidState(_))));
    assert_eq!(debugger.processes().len(), 1);

    debugger.shutdown();
}

#[test]
#[serial]
fn test_attach_to_unknown_pid() {
    let (debugger, _) = setup(test_config());
    let result = debugger.begin_attach(1).wait();
    assert!(matches!(result, Err(Error::Command { .. })));
    assert!(debugger.processes().is_empty());
    assert_eq!(debugger.status(), Status::Break);
    debugger.shutdown();
}

#[test]
#[serial]
fn test_attach_through_launcher() {
    let (debugger, _) = setup(test_config());
    let pid = spawn_attachable(Program::Launcher);

    let process = debugger.begin_attach(pid).wait().unwrap();
    assert_eq!(process.pid(), pid);
    // released from the launcher and stopped at the entry of the real program
    assert_eq!(active_frame_func(&debugger).as_deref(), Some("main"));
    assert_eq!(
        process.metadata().unwrap().exe.as_deref(),
        Some("/tmp/looper")
    );
    assert!(process.backend().unwrap().resume_count() >= 2);
    assert!(debugger.breakpoints().is_empty());

    debugger.shutdown();
}

#[test]
#[serial]
fn test_one_backend_per_process() {
    let (debugger, _) = setup(test_config());
    let first = launch(&debugger, LOOPER);
    let second = launch(&debugger, LOOPER);

    assert_eq!(debugger.backends().len(), 2);
    assert_eq!(first.frontend_id(), Some(1));
    assert_eq!(second.frontend_id(), Some(2));
    assert_eq!(debugger.threads().len(), 2);
    assert!(!std::rc::Rc::ptr_eq(
        &first.backend().unwrap(),
        &second.backend().unwrap()
    ));
    // both are inferior 1 of their own gdb
    assert_eq!(first.backend_id(), 1);
    assert_eq!(second.backend_id(), 1);

    debugger.shutdown();
}

#[test]
#[serial]
fn test_multi_inferior_backend() {
    let config = Config {
        multi_inferior: true,
        ..test_config()
    };
    let (debugger, _) = setup(config);
    let first = launch(&debugger, LOOPER);
    let second = launch(&debugger, LOOPER);

    assert_eq!(debugger.backends().len(), 1);
    assert_eq!(first.backend_id(), 1);
    assert_eq!(second.backend_id(), 2);
    assert_eq!(second.frontend_id(), Some(2));
    assert_eq!(debugger.threads().len(), 2);

    debugger.shutdown();
}

#[test]
#[serial]
fn test_kill_reuses_ids_and_collects_backend() {
    let (debugger, hooks) = setup(test_config());
    let first = launch(&debugger, LOOPER);
    launch(&debugger, LOOPER);
    assert_eq!(debugger.backends().len(), 2);

    debugger.kill(&first).unwrap();
    assert!(!first.is_alive());
    assert!(first.metadata().is_none());
    assert!(hooks.contains(&Event::ProcessRemoved(1)));
    run_until(&debugger, || debugger.backends().len() == 1);
    assert_eq!(debugger.processes().len(), 1);
    assert_eq!(debugger.active_thread().unwrap().frontend_id(), Some(2));

    let third = launch(&debugger, LOOPER);
    assert_eq!(third.frontend_id(), Some(1));
    assert_eq!(
        debugger.threads().iter().filter_map(|t| t.frontend_id()).collect::<Vec<_>>(),
        vec![1, 2]
    );

    debugger.shutdown();
}

#[test]
#[serial]
fn test_kill_running_process() {
    let (debugger, _) = setup(test_config());
    let process = launch(&debugger, LOOPER);
    let thread = debugger.active_thread().unwrap();
    debugger.begin_resume(&thread).wait().unwrap();
    assert_eq!(debugger.status(), Status::Running);

    debugger.kill(&process).unwrap();
    assert!(debugger.processes().is_empty());
    assert_eq!(debugger.status(), Status::Break);

    debugger.shutdown();
}

#[test]
#[serial]
fn test_detach() {
    let (debugger, hooks) = setup(test_config());
    let pid = spawn_attachable(Program::Looper);
    let process = debugger.begin_attach(pid).wait().unwrap();

    debugger.detach(&process).unwrap();
    assert!(!process.is_alive());
    assert!(debugger.processes().is_empty());
    assert!(hooks.contains(&Event::ProcessRemoved(1)));

    settle(&debugger);
    // the last backend stays warm
    assert_eq!(debugger.backends().len(), 1);

    debugger.shutdown();
}
