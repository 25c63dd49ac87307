// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Yield points for the task running on the current thread.
//!
//! The task trampoline installs its task in a thread-local slot before running the task function, so [suspend] can
//! be called from anywhere in the task's call stack without threading a handle through. The slot never owns the
//! task itself, only its shared state and the switch endpoint.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::{
        context::{
            Signal,
            Yielder,
        },
        task::{
            TaskCore,
            TaskId,
        },
    },
};
use ::std::{
    cell::{
        Cell,
        RefCell,
    },
    panic,
    sync::Arc,
    thread::{
        self,
        ThreadId,
    },
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Payload used to unwind a task stack on termination. Caught by the task trampoline.
pub(crate) struct Termination;

/// The task running on this thread.
struct CurrentTask {
    core: Arc<TaskCore>,
    /// Thread that owns the task. Reported as the current thread while the task runs.
    owner: ThreadId,
    yielder: Yielder,
    /// Set once the task has been handed its termination error.
    cancelled: Cell<bool>,
}

//======================================================================================================================
// Thread Local Variables
//======================================================================================================================

thread_local! {
    static CURRENT_TASK: RefCell<Option<CurrentTask>> = const { RefCell::new(None) };
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl CurrentTask {
    /// Returns [Signal::Abandon] when the task stack must be unwound.
    fn suspend(&self, duration: Duration) -> Result<Signal, Fail> {
        if self.core.is_terminating() {
            // A task that ignored its termination error must not run again.
            if self.cancelled.replace(true) {
                return Ok(Signal::Abandon);
            }
            return Err(Fail::terminated());
        }

        self.core.set_sleep(duration);
        trace!(
            "suspend(): id={:?}, next_run_time={:?}",
            self.core.get_id(),
            self.core.get_next_run_time()
        );
        let signal: Signal = self.yielder.suspend();

        // Termination may have been requested while we were switched out.
        if signal == Signal::Resume && self.core.is_terminating() {
            self.cancelled.set(true);
            return Err(Fail::terminated());
        }
        Ok(signal)
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Installs the task that is about to run on this thread.
pub(crate) fn enter(core: Arc<TaskCore>, owner: ThreadId, yielder: Yielder) {
    CURRENT_TASK.with(|slot| *slot.borrow_mut() = Some(CurrentTask {
            core,
            owner,
            yielder,
            cancelled: Cell::new(false),
        }));
}

/// Removes the task installed on this thread, handing back its switch endpoint for the final switch out.
pub(crate) fn leave() -> Option<Yielder> {
    CURRENT_TASK
        .with(|slot| slot.borrow_mut().take())
        .map(|current: CurrentTask| current.yielder)
}

/// Suspends the running task for `duration` and switches back to whoever switched into it. A zero duration makes the
/// task ready again on the next dispatch pass.
///
/// Returns an error carrying `ECANCELED` once termination of the task has been requested, which the task function is
/// expected to propagate with `?`. Calling it again after that error unwinds the task stack. Fails with `EPERM` when
/// not called from inside a task.
pub fn suspend(duration: Duration) -> Result<(), Fail> {
    let outcome: Result<Signal, Fail> = CURRENT_TASK.with(|slot| match slot.borrow().as_ref() {
        Some(current) => current.suspend(duration),
        None => {
            let cause: &str = "suspend() must be called from inside a task";
            error!("suspend(): {}", cause);
            Err(Fail::new(libc::EPERM, cause))
        },
    });

    match outcome? {
        Signal::Resume => Ok(()),
        // The owner dropped this task, or the task ignored its termination error.
        Signal::Abandon => panic::resume_unwind(Box::new(Termination)),
    }
}

/// Yields to the next dispatch pass.
pub fn yield_now() -> Result<(), Fail> {
    suspend(Duration::ZERO)
}

/// Same as [suspend], but termination unwinds the task stack straight to the task trampoline instead of returning an
/// error. Task functions using it do not need to check for termination. The unwind must not be caught by the task.
pub fn suspend_or_unwind(duration: Duration) {
    if let Err(e) = suspend(duration) {
        if e.is_terminated() {
            panic::resume_unwind(Box::new(Termination));
        }
    }
}

/// Returns the identifier of the task running on this thread, if any.
pub fn current_task_id() -> Option<TaskId> {
    CURRENT_TASK.with(|slot| slot.borrow().as_ref().map(|current: &CurrentTask| current.core.get_id()))
}

/// Returns the logical thread identity: the thread that owns the running task when called from inside a task, or the
/// calling thread otherwise.
pub fn current_thread_id() -> ThreadId {
    CURRENT_TASK
        .with(|slot| slot.borrow().as_ref().map(|current: &CurrentTask| current.owner))
        .unwrap_or_else(|| thread::current().id())
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
