// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Implementation of our single-threaded, tick-driven task scheduler.
//!
//! The scheduler keeps its tasks in a slab so that their keys stay stable, and rebuilds an ordered run queue of those
//! keys at the start of every dispatch pass. Tasks that finish during a pass keep their slot until the next pass, so
//! the run queue is never invalidated while it is being walked.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::task::{
        Task,
        DEFAULT_STACK_SIZE,
    },
    timer::{
        Millis,
        SharedClock,
        SystemClock,
    },
};
use ::slab::Slab;
use ::std::{
    sync::Arc,
    thread,
    time::Duration,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Pause between two passes of [TaskScheduler::execute_all_tasks].
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(1);

//======================================================================================================================
// Structures
//======================================================================================================================

/// Internal offset into the slab that holds the task.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct InternalId(usize);

/// Task Scheduler
pub struct TaskScheduler {
    /// Stores all the tasks that are held by the scheduler.
    tasks: Slab<Arc<Task>>,
    /// Slab offsets of the tasks, ordered by next run time. Rebuilt on every pass.
    run_queue: Vec<InternalId>,
    /// Time source handed to every task.
    clock: SharedClock,
    /// Stack size of tasks created without an explicit one.
    stack_size: usize,
    drain_interval: Duration,
    /// Number of dispatch passes so far.
    passes: u64,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl TaskScheduler {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_stack_size(clock, DEFAULT_STACK_SIZE)
    }

    /// Creates a scheduler whose tasks get stacks of `stack_size` bytes unless told otherwise.
    pub fn with_stack_size(clock: SharedClock, stack_size: usize) -> Self {
        Self {
            tasks: Slab::new(),
            run_queue: Vec::new(),
            clock,
            stack_size,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            passes: 0,
        }
    }

    /// Sets the pause between two passes of [TaskScheduler::execute_all_tasks].
    pub fn set_drain_interval(&mut self, drain_interval: Duration) {
        self.drain_interval = drain_interval;
    }

    /// Creates a task with the default stack size. See [TaskScheduler::create_with_stack_size].
    pub fn create<F>(&mut self, function: F) -> Result<Arc<Task>, Fail>
    where
        F: FnOnce() -> Result<(), Fail> + Send + 'static,
    {
        self.create_with_stack_size(function, self.stack_size)
    }

    /// Creates a task, runs it up to its first suspend point and adds it to the scheduler. The returned handle shares
    /// the task with the scheduler, which lets go of it once the task finishes.
    pub fn create_with_stack_size<F>(&mut self, function: F, stack_size: usize) -> Result<Arc<Task>, Fail>
    where
        F: FnOnce() -> Result<(), Fail> + Send + 'static,
    {
        let task: Arc<Task> = Arc::new(Task::new(function, stack_size, self.clock.clone())?);
        let internal_id: InternalId = self.tasks.insert(task.clone()).into();
        trace!("create(): id={:?}, internal_id={:?}", task.get_id(), internal_id);
        Ok(task)
    }

    /// Runs one dispatch pass: every task whose next run time has been reached at `now` is switched into once, in
    /// order of next run time. Meant to be called once per external tick.
    pub fn execute_tasks(&mut self, now: Millis) {
        self.passes += 1;
        self.prune();

        // Rebuild the run queue.
        let tasks: &Slab<Arc<Task>> = &self.tasks;
        self.run_queue.clear();
        self.run_queue.extend(tasks.iter().map(|(offset, _)| InternalId(offset)));
        self.run_queue.sort_unstable_by(|a: &InternalId, b: &InternalId| {
            let a: Millis = tasks[a.0].get_next_run_time();
            let b: Millis = tasks[b.0].get_next_run_time();
            a.cmp_at(b, now)
        });

        for internal_id in self.run_queue.iter() {
            let task: &Arc<Task> = &tasks[internal_id.0];
            // No task past this one can be ready either.
            if !task.is_ready(now) {
                break;
            }
            if task.switch_to() && !task.is_alive() {
                trace!("execute_tasks(): finished id={:?}", task.get_id());
            }
        }
    }

    /// Runs dispatch passes until every task has finished. Tasks that never finish keep this from returning.
    pub fn execute_all_tasks(&mut self) {
        while !self.tasks.is_empty() {
            let now: Millis = self.clock.now();
            self.execute_tasks(now);
            if self.tasks.is_empty() {
                break;
            }
            thread::sleep(self.drain_interval);
        }
    }

    /// Requests termination of every task in this scheduler.
    pub fn terminate_all(&mut self) {
        for (_, task) in self.tasks.iter() {
            if task.is_alive() {
                task.terminate();
            }
        }
    }

    /// Returns the number of tasks held by the scheduler. Tasks that finished during the last pass are still counted
    /// until the next one.
    pub fn get_active_task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Returns the number of dispatch passes run so far.
    pub fn get_pass_count(&self) -> u64 {
        self.passes
    }

    pub fn get_clock(&self) -> SharedClock {
        self.clock.clone()
    }

    /// Lets go of finished tasks.
    fn prune(&mut self) {
        self.tasks.retain(|offset: usize, task: &mut Arc<Task>| {
            if task.is_alive() {
                return true;
            }
            trace!("prune(): id={:?}, internal_id={:?}", task.get_id(), offset);
            false
        });
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(SystemClock::shared())
    }
}

impl From<usize> for InternalId {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl From<InternalId> for usize {
    fn from(value: InternalId) -> Self {
        value.0
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
