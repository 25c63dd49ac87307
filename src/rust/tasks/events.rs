// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::SharedObject,
    tasks::trigger::TriggerId,
};
use ::std::{
    collections::HashMap,
    mem,
    ops::{
        Deref,
        DerefMut,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Callback invoked each time the trigger it was subscribed to fires.
pub type Listener = Box<dyn FnMut(&TriggerId)>;

/// Minimal host event source: listeners subscribe to a trigger and are called, in subscription order, every time the
/// host fires that trigger.
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<TriggerId, Vec<Listener>>,
}

#[derive(Clone)]
pub struct SharedEventBus(SharedObject<EventBus>);

//======================================================================================================================
// Traits
//======================================================================================================================

/// Source of external ticks consumed by the task façade.
pub trait EventSource {
    /// Registers `listener` to be called every time `trigger` fires.
    fn subscribe(&mut self, trigger: TriggerId, listener: Listener);
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SharedEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires `trigger`, calling every listener subscribed to it. Returns the number of listeners called.
    pub fn fire(&mut self, trigger: &TriggerId) -> usize {
        // Listeners may subscribe while they run, so they are taken out of the table for the duration of the call.
        let mut listeners: Vec<Listener> = match self.listeners.get_mut(trigger) {
            Some(listeners) => mem::take(listeners),
            None => {
                trace!("fire(): no listeners (trigger={:?})", trigger);
                return 0;
            },
        };

        for listener in listeners.iter_mut() {
            listener(trigger);
        }
        let count: usize = listeners.len();

        let slot: &mut Vec<Listener> = self.listeners.entry(trigger.clone()).or_default();
        let added: Vec<Listener> = mem::replace(slot, listeners);
        slot.extend(added);
        count
    }

    /// Returns the number of listeners subscribed to `trigger`.
    pub fn get_listener_count(&self, trigger: &TriggerId) -> usize {
        self.listeners.get(trigger).map_or(0, |listeners: &Vec<Listener>| listeners.len())
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl EventSource for SharedEventBus {
    fn subscribe(&mut self, trigger: TriggerId, listener: Listener) {
        trace!("subscribe(): trigger={:?}", trigger);
        self.listeners.entry(trigger).or_default().push(listener);
    }
}

impl Default for SharedEventBus {
    fn default() -> Self {
        Self(SharedObject::new(EventBus::default()))
    }
}

impl Deref for SharedEventBus {
    type Target = EventBus;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SharedEventBus {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
