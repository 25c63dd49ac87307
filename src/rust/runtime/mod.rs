// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod fail;
pub mod logging;
pub mod scheduler;
pub mod timer;

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    ops::{
        Deref,
        DerefMut,
    },
    rc::{
        Rc,
        Weak,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// The SharedObject wraps an object that is shared between the host and the listeners it registers. Shared objects
/// never leave the thread that created them.
pub struct SharedObject<T>(Rc<T>);

/// Non-owning reference to a [SharedObject]. Listeners hold these so that they do not keep their owner alive.
pub struct WeakObject<T>(Weak<T>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<T> SharedObject<T> {
    pub fn new(object: T) -> Self {
        Self(Rc::new(object))
    }

    /// Creates a non-owning reference to this object.
    pub fn downgrade(&self) -> WeakObject<T> {
        WeakObject(Rc::downgrade(&self.0))
    }
}

impl<T> WeakObject<T> {
    /// Returns the shared object if it is still alive.
    pub fn upgrade(&self) -> Option<SharedObject<T>> {
        self.0.upgrade().map(SharedObject)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Dereferences a shared object for use.
impl<T> Deref for SharedObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

/// Dereferences a mutable reference to a shared object for use. This breaks Rust's ownership model because it allows
/// more than one mutable dereference of a shared object at a time. Shared objects are only touched from the thread
/// that owns the schedulers, and that thread is blocked whenever a task runs, so no two mutable dereferences are ever
/// active at the same time.
impl<T> DerefMut for SharedObject<T> {
    fn deref_mut<'a>(&'a mut self) -> &'a mut Self::Target {
        let ptr: *mut T = Rc::as_ptr(&self.0) as *mut T;
        unsafe { &mut *ptr }
    }
}

impl<T> AsRef<T> for SharedObject<T> {
    fn as_ref(&self) -> &T {
        self.0.as_ref()
    }
}

impl<T> Clone for SharedObject<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Clone for WeakObject<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
