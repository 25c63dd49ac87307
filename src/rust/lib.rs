// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Cooperative, tick-driven task scheduling.
//!
//! Task functions are written as straight-line code that calls [suspend] whenever it wants to wait. Every task runs
//! on its own execution context with a dedicated stack, and a [TaskScheduler] switches into the ready tasks once per
//! external tick. The [SharedTasks] façade owns one scheduler per [TriggerId] and subscribes it to the host's event
//! source on first use.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

#[macro_use]
extern crate log;

pub mod runtime;
pub mod tasks;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    runtime::{
        fail::Fail,
        scheduler::{
            current_task_id,
            current_thread_id,
            suspend,
            suspend_or_unwind,
            yield_now,
            Task,
            TaskId,
            TaskScheduler,
            TaskState,
        },
        timer::{
            Clock,
            ManualClock,
            Millis,
            SharedClock,
            SystemClock,
        },
    },
    tasks::{
        config::Config,
        events::{
            EventSource,
            SharedEventBus,
        },
        trigger::TriggerId,
        SharedTasks,
    },
};

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, bailing out of the enclosing `anyhow::Result` function otherwise.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    anyhow::bail!(r#"ensure failed: `(left == right)` left: `{:?}`, right: `{:?}`"#, left_val, right_val)
                }
            }
        }
    });
    ($left:expr, $right:expr,) => ({
        $crate::ensure_eq!($left, $right)
    });
}

/// Ensures that two expressions are not equal, bailing out of the enclosing `anyhow::Result` function otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    anyhow::bail!(r#"ensure failed: `(left != right)` left: `{:?}`, right: `{:?}`"#, left_val, right_val)
                }
            }
        }
    });
    ($left:expr, $right:expr,) => ({
        $crate::ensure_neq!($left, $right)
    });
}
