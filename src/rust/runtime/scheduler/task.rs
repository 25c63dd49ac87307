// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::{
        context::{
            ExecutionContext,
            Exit,
            Signal,
            Yielder,
        },
        yielder::{
            self,
            Termination,
        },
    },
    timer::{
        Millis,
        SharedClock,
    },
};
use ::std::{
    any::Any,
    panic::{
        self,
        AssertUnwindSafe,
    },
    sync::{
        atomic::{
            AtomicBool,
            AtomicU32,
            AtomicU64,
            AtomicU8,
            Ordering,
        },
        Arc,
    },
    thread::ThreadId,
    time::Duration,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Stack size used when the caller does not pick one.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Smallest stack a task may be created with.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Source of task identifiers.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

//======================================================================================================================
// Structures
//======================================================================================================================

/// Externally visible task identifier.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub struct TaskId(pub u64);

/// Lifecycle of a task.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Constructed but never switched into.
    Created = 0,
    /// Switched into at least once and not finished.
    Executing = 1,
    /// The task function returned or was unwound. The task never runs again.
    Finished = 2,
    /// Termination was requested; the task observes it at its next suspend.
    TerminateRequested = 3,
}

/// Task state shared between the owner and the task's own stack.
pub(crate) struct TaskCore {
    id: TaskId,
    state: AtomicU8,
    next_run_time: AtomicU32,
    /// Set while the task is switched into.
    running: AtomicBool,
    clock: SharedClock,
}

/// Task runs a single function on its own execution context. The function gives up control by calling
/// [crate::suspend], and is resumed by [Task::switch_to].
pub struct Task {
    core: Arc<TaskCore>,
    /// Thread that created the task. The only thread allowed to switch into it.
    owner: ThreadId,
    context: ExecutionContext,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl TaskCore {
    pub fn get_id(&self) -> TaskId {
        self.id
    }

    pub fn get_state(&self) -> TaskState {
        TaskState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_terminating(&self) -> bool {
        self.get_state() == TaskState::TerminateRequested
    }

    pub fn get_next_run_time(&self) -> Millis {
        Millis(self.next_run_time.load(Ordering::Acquire))
    }

    pub fn set_sleep(&self, duration: Duration) {
        let next_run_time: Millis = self.clock.now().after(duration);
        self.next_run_time.store(next_run_time.0, Ordering::Release);
    }

    /// Moves the task from `from` to `to`. Returns false if the task was not in `from`.
    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Requests termination unless the task already finished.
    fn request_termination(&self) -> bool {
        self.transition(TaskState::Created, TaskState::TerminateRequested)
            || self.transition(TaskState::Executing, TaskState::TerminateRequested)
            || self.is_terminating()
    }

    fn finish(&self) {
        self.state.store(TaskState::Finished as u8, Ordering::Release);
    }
}

impl Task {
    /// Creates a task running `function` on a stack of `stack_size` bytes, and primes it: the function runs up to its
    /// first suspend point before this returns. A function that never suspends is already finished on return.
    pub fn new<F>(function: F, stack_size: usize, clock: SharedClock) -> Result<Self, Fail>
    where
        F: FnOnce() -> Result<(), Fail> + Send + 'static,
    {
        if stack_size < MIN_STACK_SIZE {
            let cause: String = format!(
                "stack size is too small (stack_size={:?}, min={:?})",
                stack_size, MIN_STACK_SIZE
            );
            error!("new(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }

        let id: TaskId = TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed));
        let owner: ThreadId = yielder::current_thread_id();
        let core: Arc<TaskCore> = Arc::new(TaskCore {
            id,
            state: AtomicU8::new(TaskState::Created as u8),
            next_run_time: AtomicU32::new(clock.now().0),
            running: AtomicBool::new(false),
            clock,
        });

        let entry_core: Arc<TaskCore> = core.clone();
        let context: ExecutionContext = ExecutionContext::new(
            format!("task-{}", id.0),
            stack_size,
            move |yielder: Yielder| Self::trampoline(entry_core, owner, yielder, function),
        )?;

        let task: Task = Self { core, owner, context };
        trace!("new(): id={:?}, stack_size={:?}", id, stack_size);

        // Priming.
        task.switch_to();
        Ok(task)
    }

    /// Entry point of every task stack. Runs the task function, records the outcome and performs the final switch
    /// out. It never returns before that final switch.
    fn trampoline<F>(core: Arc<TaskCore>, owner: ThreadId, yielder: Yielder, function: F)
    where
        F: FnOnce() -> Result<(), Fail>,
    {
        let id: TaskId = core.get_id();
        yielder::enter(core.clone(), owner, yielder);

        match panic::catch_unwind(AssertUnwindSafe(function)) {
            Ok(Ok(())) => debug!("trampoline(): task finished (id={:?})", id),
            Ok(Err(e)) if e.is_terminated() => debug!("trampoline(): task terminated (id={:?})", id),
            Ok(Err(e)) => warn!("trampoline(): task failed (id={:?}, error={:?})", id, e),
            Err(payload) if payload.is::<Termination>() => debug!("trampoline(): task unwound (id={:?})", id),
            Err(payload) => error!(
                "trampoline(): task panicked (id={:?}, cause={:?})",
                id,
                panic_message(payload.as_ref())
            ),
        }

        core.finish();
        match yielder::leave() {
            Some(yielder) => yielder.finish(),
            None => error!("trampoline(): task slot vanished before the final switch (id={:?})", id),
        }
    }

    pub fn get_id(&self) -> TaskId {
        self.core.get_id()
    }

    pub fn get_state(&self) -> TaskState {
        self.core.get_state()
    }

    /// Returns the time at which the task becomes ready again.
    pub fn get_next_run_time(&self) -> Millis {
        self.core.get_next_run_time()
    }

    pub fn is_alive(&self) -> bool {
        self.get_state() != TaskState::Finished
    }

    pub fn is_terminating(&self) -> bool {
        self.core.is_terminating()
    }

    /// Checks whether the task may run at time `now`.
    pub fn is_ready(&self, now: Millis) -> bool {
        self.get_next_run_time().is_reached_at(now)
    }

    /// Delays the next run of this task until `duration` from now.
    pub fn set_sleep(&self, duration: Duration) {
        self.core.set_sleep(duration)
    }

    /// Requests termination. The task observes it at its next suspend point; a task that never suspends again is
    /// never terminated.
    pub fn terminate(&self) {
        if self.core.request_termination() {
            debug!("terminate(): id={:?}", self.get_id());
        } else {
            debug!("terminate(): task already finished (id={:?})", self.get_id());
        }
    }

    /// Switches into the task and returns once it suspends or finishes. Returns false without touching the task when
    /// called from a thread other than the one that created it, when the task has finished, or from inside the task
    /// itself.
    pub fn switch_to(&self) -> bool {
        let caller: ThreadId = yielder::current_thread_id();
        if caller != self.owner {
            error!(
                "switch_to(): cannot switch into a task from another thread (id={:?}, owner={:?}, caller={:?})",
                self.get_id(),
                self.owner,
                caller
            );
            return false;
        }
        if !self.is_alive() {
            error!("switch_to(): cannot switch into a finished task (id={:?})", self.get_id());
            return false;
        }
        if self.core.running.swap(true, Ordering::AcqRel) {
            error!("switch_to(): task is already running (id={:?})", self.get_id());
            return false;
        }

        self.core.transition(TaskState::Created, TaskState::Executing);
        let result: Result<Exit, Fail> = self.context.switch_into(Signal::Resume);
        self.core.running.store(false, Ordering::Release);

        match result {
            Ok(Exit::Suspended) => true,
            Ok(Exit::Finished) => {
                self.core.finish();
                true
            },
            Err(e) => {
                warn!("switch_to(): task is lost (id={:?}, error={:?})", self.get_id(), e);
                self.core.finish();
                false
            },
        }
    }

    /// Unwinds an unfinished task so that its stack can be released.
    fn abandon(&self) {
        if self.core.running.load(Ordering::Acquire) {
            warn!("abandon(): task dropped while running (id={:?})", self.get_id());
            return;
        }
        if yielder::current_thread_id() != self.owner {
            warn!("abandon(): task dropped from another thread (id={:?})", self.get_id());
            return;
        }

        self.core.request_termination();
        self.core.running.store(true, Ordering::Release);
        match self.context.switch_into(Signal::Abandon) {
            Ok(Exit::Finished) => debug!("abandon(): id={:?}", self.get_id()),
            Ok(Exit::Suspended) => warn!("abandon(): task kept running (id={:?})", self.get_id()),
            Err(e) => warn!("abandon(): id={:?}, error={:?}", self.get_id(), e),
        }
        self.core.running.store(false, Ordering::Release);
        self.core.finish();
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<TaskId> for u64 {
    fn from(value: TaskId) -> Self {
        value.0
    }
}

impl From<u8> for TaskState {
    fn from(value: u8) -> Self {
        match value {
            0 => TaskState::Created,
            1 => TaskState::Executing,
            2 => TaskState::Finished,
            _ => TaskState::TerminateRequested,
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if !self.context.is_finished() {
            self.abandon();
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
