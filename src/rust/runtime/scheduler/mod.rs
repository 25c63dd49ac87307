// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod context;
#[allow(clippy::module_inception)]
mod scheduler;
mod task;
mod yielder;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    scheduler::{
        InternalId,
        TaskScheduler,
        DEFAULT_DRAIN_INTERVAL,
    },
    task::{
        Task,
        TaskId,
        TaskState,
        DEFAULT_STACK_SIZE,
        MIN_STACK_SIZE,
    },
    yielder::{
        current_task_id,
        current_thread_id,
        suspend,
        suspend_or_unwind,
        yield_now,
    },
};
