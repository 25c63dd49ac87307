// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::cotask::{
    current_task_id,
    current_thread_id,
    ensure_eq,
    ensure_neq,
    runtime::logging,
    suspend,
    yield_now,
    Config,
    EventSource,
    Fail,
    ManualClock,
    Millis,
    SharedClock,
    SharedEventBus,
    SharedTasks,
    Task,
    TaskId,
    TriggerId,
};
use ::std::{
    cell::RefCell,
    rc::Rc,
    sync::{
        atomic::{
            AtomicU32,
            Ordering,
        },
        Arc,
        Mutex,
    },
    thread::{
        self,
        ThreadId,
    },
    time::Duration,
};

//======================================================================================================================
// Helpers
//======================================================================================================================

fn new_tasks() -> (SharedEventBus, SharedTasks<SharedEventBus>, Arc<ManualClock>) {
    logging::initialize();
    let bus: SharedEventBus = SharedEventBus::new();
    let clock: Arc<ManualClock> = Arc::new(ManualClock::new(Millis(1000)));
    let shared: SharedClock = clock.clone();
    (bus.clone(), SharedTasks::with_clock(bus, shared), clock)
}

/// Creates a task on `trigger` that counts its runs, forever.
fn counting(tasks: &mut SharedTasks<SharedEventBus>, trigger: &TriggerId) -> Result<Arc<AtomicU32>> {
    let runs: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));
    let runs_: Arc<AtomicU32> = runs.clone();
    tasks.create(trigger.clone(), move || -> Result<(), Fail> {
        loop {
            yield_now()?;
            runs_.fetch_add(1, Ordering::SeqCst);
        }
    })?;
    Ok(runs)
}

//======================================================================================================================
// Tests
//======================================================================================================================

/// Each firing of a trigger dispatches its own scheduler once and no other.
#[test]
fn triggers_dispatch_only_their_scheduler() -> Result<()> {
    let (mut bus, mut tasks, _clock) = new_tasks();
    let x: TriggerId = TriggerId::from("X");
    let y: TriggerId = TriggerId::new(String::from("Y"));

    let x_runs: Arc<AtomicU32> = counting(&mut tasks, &x)?;
    let y_runs: Arc<AtomicU32> = counting(&mut tasks, &y)?;

    bus.fire(&x);
    bus.fire(&x);

    ensure_eq!(tasks.get_scheduler(&x).map(|s| s.get_pass_count()), Some(2));
    ensure_eq!(tasks.get_scheduler(&y).map(|s| s.get_pass_count()), Some(0));
    ensure_eq!(x_runs.load(Ordering::SeqCst), 2);
    ensure_eq!(y_runs.load(Ordering::SeqCst), 0);
    Ok(())
}

/// Tasks created without a trigger run on every update tick.
#[test]
fn update_tasks_run_on_update_ticks() -> Result<()> {
    let (mut bus, mut tasks, clock) = new_tasks();
    let trace: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    let trace_: Arc<Mutex<Vec<u32>>> = trace.clone();

    tasks.create_on_update(move || -> Result<(), Fail> {
        for step in 0..3 {
            suspend(Duration::from_millis(16))?;
            if let Ok(mut trace) = trace_.lock() {
                trace.push(step);
            }
        }
        Ok(())
    })?;

    // Ticks before the deadline do not run the task.
    bus.fire(&TriggerId::UPDATE);
    ensure_eq!(trace.lock().map(|t| t.len()).unwrap_or(usize::MAX), 0);

    for _ in 0..3 {
        clock.advance_clock(Duration::from_millis(16));
        bus.fire(&TriggerId::default());
    }
    ensure_eq!(trace.lock().map(|t| t.clone()).unwrap_or_default(), vec![0, 1, 2]);

    bus.fire(&TriggerId::UPDATE);
    ensure_eq!(tasks.get_active_task_count(), 0);
    Ok(())
}

/// Tasks see their own identity and the thread that created them.
#[test]
fn task_identity_is_visible_from_inside() -> Result<()> {
    let (_bus, mut tasks, _clock) = new_tasks();
    let seen: Arc<Mutex<Option<(Option<TaskId>, ThreadId)>>> = Arc::new(Mutex::new(None));
    let seen_: Arc<Mutex<Option<(Option<TaskId>, ThreadId)>>> = seen.clone();

    let task: Arc<Task> = tasks.create_on_update(move || -> Result<(), Fail> {
        if let Ok(mut seen) = seen_.lock() {
            *seen = Some((current_task_id(), current_thread_id()));
        }
        Ok(())
    })?;

    let seen: Option<(Option<TaskId>, ThreadId)> = seen.lock().map(|s| *s).unwrap_or(None);
    ensure_eq!(seen, Some((Some(task.get_id()), thread::current().id())));
    ensure_eq!(current_task_id(), None);
    Ok(())
}

/// Distinct tasks get distinct identifiers.
#[test]
fn task_ids_are_unique() -> Result<()> {
    let (_bus, mut tasks, _clock) = new_tasks();
    let a: Arc<Task> = tasks.create_on_update(yield_now)?;
    let b: Arc<Task> = tasks.create_on_update(yield_now)?;
    ensure_neq!(a.get_id(), b.get_id());
    Ok(())
}

/// A failing or panicking task finishes without disturbing the tasks next to it.
#[test]
fn faulty_tasks_do_not_affect_siblings() -> Result<()> {
    let (mut bus, mut tasks, _clock) = new_tasks();
    let runs: Arc<AtomicU32> = counting(&mut tasks, &TriggerId::UPDATE)?;

    let failing: Arc<Task> = tasks.create_on_update(|| -> Result<(), Fail> {
        yield_now()?;
        Err(Fail::new(libc::EIO, "broken"))
    })?;
    let panicking: Arc<Task> = tasks.create_on_update(|| -> Result<(), Fail> {
        yield_now()?;
        panic!("task panicked");
    })?;

    bus.fire(&TriggerId::UPDATE);
    ensure_eq!(failing.is_alive(), false);
    ensure_eq!(panicking.is_alive(), false);
    ensure_eq!(runs.load(Ordering::SeqCst), 1);

    bus.fire(&TriggerId::UPDATE);
    ensure_eq!(runs.load(Ordering::SeqCst), 2);
    ensure_eq!(tasks.get_active_task_count(), 1);
    Ok(())
}

/// Terminating every task lets the façade drain on the next ticks.
#[test]
fn terminate_all_finishes_every_task() -> Result<()> {
    let (mut bus, mut tasks, _clock) = new_tasks();
    let frame: TriggerId = TriggerId::from("frame");
    counting(&mut tasks, &frame)?;
    counting(&mut tasks, &TriggerId::UPDATE)?;
    ensure_eq!(tasks.get_active_task_count(), 2);

    tasks.terminate_all();
    bus.fire(&frame);
    bus.fire(&TriggerId::UPDATE);
    bus.fire(&frame);
    bus.fire(&TriggerId::UPDATE);
    ensure_eq!(tasks.get_active_task_count(), 0);
    ensure_eq!(tasks.get_scheduler_count(), 2);
    Ok(())
}

/// The façade may be driven by any event source.
#[test]
fn custom_event_source_is_subscribed_once_per_trigger() -> Result<()> {
    struct Recorder(Rc<RefCell<Vec<TriggerId>>>);

    impl EventSource for Recorder {
        fn subscribe(&mut self, trigger: TriggerId, _listener: ::cotask::tasks::events::Listener) {
            self.0.borrow_mut().push(trigger);
        }
    }

    let subscriptions: Rc<RefCell<Vec<TriggerId>>> = Rc::new(RefCell::new(Vec::new()));
    let mut tasks: SharedTasks<Recorder> = SharedTasks::new(Recorder(subscriptions.clone()));
    tasks.create(TriggerId::from("a"), yield_now)?;
    tasks.create(TriggerId::from("a"), yield_now)?;
    tasks.create(TriggerId::from("b"), yield_now)?;
    ensure_eq!(*subscriptions.borrow(), vec![TriggerId::from("a"), TriggerId::from("b")]);
    ensure_eq!(tasks.get_scheduler_count(), 2);
    ensure_eq!(tasks.get_active_task_count(), 3);
    Ok(())
}

/// Stack size and drain interval are read from the configuration.
#[test]
fn tasks_are_built_from_config() -> Result<()> {
    let config: Config = Config::from_str("tasks:\n  stack_size: 131072\n")?;
    ensure_eq!(config.stack_size()?, 131072);

    let mut tasks: SharedTasks<SharedEventBus> = SharedTasks::from_config(SharedEventBus::new(), &config)?;
    tasks.create_on_update(yield_now)?;
    ensure_eq!(tasks.get_active_task_count(), 1);

    let small: Config = Config::from_str("tasks:\n  stack_size: 1024\n")?;
    ensure_eq!(
        SharedTasks::from_config(SharedEventBus::new(), &small).err().map(|e| e.errno),
        Some(libc::EINVAL)
    );

    ensure_eq!(Config::new("/nonexistent/cotask.yaml").is_err(), true);
    Ok(())
}

/// A task asking for a stack below the minimum is rejected.
#[test]
fn tiny_stacks_are_rejected() -> Result<()> {
    let (bus, mut tasks, _clock) = new_tasks();
    match tasks.create_with_stack_size(TriggerId::UPDATE, || Ok(()), 1024) {
        Err(e) => ensure_eq!(e.errno, libc::EINVAL),
        Ok(_) => anyhow::bail!("task should not have been created"),
    }

    // A rejected task leaves no scheduler behind.
    ensure_eq!(tasks.get_scheduler_count(), 0);
    ensure_eq!(bus.get_listener_count(&TriggerId::UPDATE), 0);

    tasks.create_on_update(yield_now)?;
    ensure_eq!(tasks.get_scheduler_count(), 1);
    ensure_eq!(bus.get_listener_count(&TriggerId::UPDATE), 1);
    Ok(())
}
