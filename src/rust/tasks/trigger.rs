// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    borrow::Cow,
    fmt,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Identity of an external periodic event that drives a scheduler, e.g. "once per rendered frame".
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TriggerId(Cow<'static, str>);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl TriggerId {
    /// Fired once per host update. Used by tasks created without an explicit trigger.
    pub const UPDATE: TriggerId = TriggerId(Cow::Borrowed("update"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl From<&'static str> for TriggerId {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for TriggerId {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl Default for TriggerId {
    fn default() -> Self {
        Self::UPDATE
    }
}

impl fmt::Debug for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
