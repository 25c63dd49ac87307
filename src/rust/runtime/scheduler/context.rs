// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Resumable execution contexts.
//!
//! A context owns a dedicated stack and runs an entry function on it. Switching into a context blocks the caller
//! until the context switches out again, so the caller and the context never run at the same time. Each context is
//! backed by an OS thread that stays parked on a rendezvous channel while it is switched out; the thread's stack is
//! the context's stack. This trades the cheap register swap of a native fiber for memory safety, without changing
//! any scheduling semantics.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::crossbeam_channel::{
    self as channel,
    Receiver,
    Sender,
};
use ::std::{
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    thread::{
        self,
        JoinHandle,
        ThreadId,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Command delivered to a context when switching into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Continue running from the last switch out.
    Resume,
    /// The owner is going away. The context must unwind and perform its final switch out.
    Abandon,
}

/// How a context switched out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    /// The context can be switched into again.
    Suspended,
    /// The context performed its final switch out and will never run again.
    Finished,
}

/// Caller side of an execution context.
pub struct ExecutionContext {
    name: String,
    resume_tx: Sender<Signal>,
    yield_rx: Receiver<Exit>,
    finished: Arc<AtomicBool>,
    thread_id: ThreadId,
    thread: Option<JoinHandle<()>>,
}

/// Context side of an execution context. Handed to the entry function, which uses it to switch back out.
pub struct Yielder {
    resume_rx: Receiver<Signal>,
    yield_tx: Sender<Exit>,
    finished: Arc<AtomicBool>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl ExecutionContext {
    /// Prepares a context that runs `entry` on a stack of `stack_size` bytes. Nothing runs until the first
    /// [ExecutionContext::switch_into].
    pub fn new<F>(name: String, stack_size: usize, entry: F) -> Result<Self, Fail>
    where
        F: FnOnce(Yielder) + Send + 'static,
    {
        let (resume_tx, resume_rx): (Sender<Signal>, Receiver<Signal>) = channel::bounded(1);
        let (yield_tx, yield_rx): (Sender<Exit>, Receiver<Exit>) = channel::bounded(1);
        let finished: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
        let yielder: Yielder = Yielder {
            resume_rx,
            yield_tx,
            finished: finished.clone(),
        };

        let thread: JoinHandle<()> = thread::Builder::new()
            .name(name.clone())
            .stack_size(stack_size)
            .spawn(move || {
                // Park until the first switch into this context.
                let signal: Result<Signal, channel::RecvError> = yielder.resume_rx.recv();
                match signal {
                    Ok(Signal::Resume) => entry(yielder),
                    // Abandoned before it ever ran: there is no stack to unwind.
                    Ok(Signal::Abandon) | Err(_) => yielder.finish(),
                }
            })
            .map_err(|e| {
                let cause: String = format!("failed to allocate context stack (name={:?}, error={:?})", name, e);
                error!("new(): {}", cause);
                Fail::new(e.raw_os_error().unwrap_or(libc::ENOMEM), &cause)
            })?;

        trace!("new(): name={:?}, stack_size={:?}", name, stack_size);
        Ok(Self {
            name,
            resume_tx,
            yield_rx,
            finished,
            thread_id: thread.thread().id(),
            thread: Some(thread),
        })
    }

    /// Switches into this context and blocks until it switches out.
    pub fn switch_into(&self, signal: Signal) -> Result<Exit, Fail> {
        if self.is_finished() {
            let cause: String = format!("cannot switch into a finished context (name={:?})", self.name);
            error!("switch_into(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }

        if self.resume_tx.send(signal).is_err() {
            return Err(self.vanished());
        }
        match self.yield_rx.recv() {
            Ok(exit) => Ok(exit),
            Err(_) => Err(self.vanished()),
        }
    }

    /// Checks whether this context has performed its final switch out.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Checks whether the calling thread is the one executing this context.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// The context went away without its final switch out. This only happens if its entry function returned without
    /// calling [Yielder::finish].
    fn vanished(&self) -> Fail {
        self.finished.store(true, Ordering::Release);
        let cause: String = format!("context exited without a final switch (name={:?})", self.name);
        error!("switch_into(): {}", cause);
        Fail::new(libc::ECONNRESET, &cause)
    }
}

impl Yielder {
    /// Switches out of the running context and blocks until it is switched into again. A caller that went away is
    /// reported as [Signal::Abandon].
    pub fn suspend(&self) -> Signal {
        if self.yield_tx.send(Exit::Suspended).is_err() {
            return Signal::Abandon;
        }
        self.resume_rx.recv().unwrap_or(Signal::Abandon)
    }

    /// Performs the final switch out of the running context.
    pub fn finish(self) {
        self.finished.store(true, Ordering::Release);
        // Nobody may be listening anymore if the caller was dropped.
        let _ = self.yield_tx.send(Exit::Finished);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Releases the context. A finished context has its thread joined. An unfinished one is detached: its thread reads the
/// closed channel as [Signal::Abandon] and unwinds on its own, concurrently with whoever dropped the context. Owners
/// that need the one-side-runs guarantee until the very end must abandon the context before dropping it.
impl Drop for ExecutionContext {
    fn drop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        if !self.is_finished() {
            warn!("drop(): detaching context that did not finish (name={:?})", self.name);
            return;
        }
        // A context that drops itself cannot wait for its own thread.
        if self.is_current() {
            return;
        }
        if thread.join().is_err() {
            warn!("drop(): context thread panicked after its final switch (name={:?})", self.name);
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
