// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Task façade: one [TaskScheduler] per trigger, dispatched by the host's event source.

pub mod config;
pub mod events;
pub mod trigger;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::{
        fail::Fail,
        scheduler::{
            Task,
            TaskScheduler,
            DEFAULT_DRAIN_INTERVAL,
            DEFAULT_STACK_SIZE,
        },
        timer::{
            Millis,
            SharedClock,
            SystemClock,
        },
        SharedObject,
        WeakObject,
    },
    tasks::{
        config::Config,
        events::EventSource,
        trigger::TriggerId,
    },
};
use ::std::{
    collections::HashMap,
    ops::{
        Deref,
        DerefMut,
    },
    sync::Arc,
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

pub struct Tasks<E: EventSource> {
    /// One scheduler per trigger, created on first use.
    schedulers: HashMap<TriggerId, TaskScheduler>,
    events: E,
    clock: SharedClock,
    /// Stack size of tasks created without an explicit one.
    stack_size: usize,
    drain_interval: Duration,
}

/// Shared handle to the task façade. Clones refer to the same schedulers.
pub struct SharedTasks<E: EventSource>(SharedObject<Tasks<E>>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<E: EventSource + 'static> SharedTasks<E> {
    pub fn new(events: E) -> Self {
        Self::with_clock(events, SystemClock::shared())
    }

    /// Creates a façade whose schedulers read time from `clock`.
    pub fn with_clock(events: E, clock: SharedClock) -> Self {
        Self(SharedObject::new(Tasks {
            schedulers: HashMap::new(),
            events,
            clock,
            stack_size: DEFAULT_STACK_SIZE,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
        }))
    }

    /// Creates a façade with the stack size and drain interval read from `config`.
    pub fn from_config(events: E, config: &Config) -> Result<Self, Fail> {
        let mut tasks: Self = Self::new(events);
        tasks.stack_size = config.stack_size()?;
        tasks.drain_interval = config.drain_interval()?;
        debug!(
            "from_config(): stack_size={}, drain_interval={:?}",
            tasks.stack_size, tasks.drain_interval
        );
        Ok(tasks)
    }

    /// Creates a task run on every `trigger` tick. The first task created for a trigger also creates its scheduler
    /// and subscribes it to the event source.
    pub fn create<F>(&mut self, trigger: TriggerId, function: F) -> Result<Arc<Task>, Fail>
    where
        F: FnOnce() -> Result<(), Fail> + Send + 'static,
    {
        let stack_size: usize = self.stack_size;
        self.create_with_stack_size(trigger, function, stack_size)
    }

    /// Same as [SharedTasks::create], with a dedicated stack size for this task.
    pub fn create_with_stack_size<F>(&mut self, trigger: TriggerId, function: F, stack_size: usize) -> Result<Arc<Task>, Fail>
    where
        F: FnOnce() -> Result<(), Fail> + Send + 'static,
    {
        if let Some(scheduler) = self.schedulers.get_mut(&trigger) {
            return scheduler.create_with_stack_size(function, stack_size);
        }

        // The scheduler is only kept, and subscribed, once its first task exists.
        let mut scheduler: TaskScheduler = TaskScheduler::with_stack_size(self.clock.clone(), self.stack_size);
        scheduler.set_drain_interval(self.drain_interval);
        let task: Arc<Task> = scheduler.create_with_stack_size(function, stack_size)?;
        self.add_scheduler(trigger, scheduler);
        Ok(task)
    }

    /// Creates a task run on every [TriggerId::UPDATE] tick.
    pub fn create_on_update<F>(&mut self, function: F) -> Result<Arc<Task>, Fail>
    where
        F: FnOnce() -> Result<(), Fail> + Send + 'static,
    {
        self.create(TriggerId::UPDATE, function)
    }

    /// Runs one dispatch pass of the scheduler bound to `trigger`.
    pub(crate) fn dispatch(&mut self, trigger: &TriggerId) {
        let now: Millis = self.clock.now();
        match self.schedulers.get_mut(trigger) {
            Some(scheduler) => scheduler.execute_tasks(now),
            None => warn!("dispatch(): no scheduler for trigger (trigger={:?})", trigger),
        }
    }

    /// Requests termination of the tasks of every scheduler.
    pub fn terminate_all(&mut self) {
        for scheduler in self.schedulers.values_mut() {
            scheduler.terminate_all();
        }
    }

    /// Returns the number of tasks held across all schedulers.
    pub fn get_active_task_count(&self) -> usize {
        self.schedulers
            .values()
            .map(|scheduler: &TaskScheduler| scheduler.get_active_task_count())
            .sum()
    }

    pub fn get_scheduler_count(&self) -> usize {
        self.schedulers.len()
    }

    /// Returns the scheduler bound to `trigger`, if any task was ever created for it.
    pub fn get_scheduler(&self, trigger: &TriggerId) -> Option<&TaskScheduler> {
        self.schedulers.get(trigger)
    }

    pub fn get_clock(&self) -> SharedClock {
        self.clock.clone()
    }

    fn add_scheduler(&mut self, trigger: TriggerId, scheduler: TaskScheduler) {
        debug!("add_scheduler(): trigger={:?}", trigger);
        self.schedulers.insert(trigger.clone(), scheduler);

        // The listener must not keep the façade alive, as the façade owns the event source.
        let weak: WeakObject<Tasks<E>> = self.0.downgrade();
        self.events.subscribe(
            trigger,
            Box::new(move |trigger: &TriggerId| match weak.upgrade() {
                Some(tasks) => SharedTasks(tasks).dispatch(trigger),
                None => trace!("dispatch(): tasks dropped (trigger={:?})", trigger),
            }),
        );
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<E: EventSource> Clone for SharedTasks<E> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<E: EventSource> Deref for SharedTasks<E> {
    type Target = Tasks<E>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<E: EventSource> DerefMut for SharedTasks<E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
