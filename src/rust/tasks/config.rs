// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::{
        DEFAULT_DRAIN_INTERVAL,
        DEFAULT_STACK_SIZE,
        MIN_STACK_SIZE,
    },
};
use ::std::{
    fs::File,
    io::Read,
    ops::Index,
    str::FromStr,
    time::Duration,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Task options. Every option may be overridden by an environment variable with the upper-cased option name.
mod tasks_config {
    pub const SECTION_NAME: &str = "tasks";
    // Size of the stack of each task, in bytes.
    pub const STACK_SIZE: &str = "stack_size";
    // Sleep between dispatch passes when draining a scheduler.
    pub const DRAIN_INTERVAL_MS: &str = "drain_interval_ms";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Task configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)?.read_to_string(&mut config_s)?;
        Self::from_str(&config_s)
    }

    /// Parses a configuration document. An empty document yields an empty configuration, where every option takes its
    /// default value.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = match YamlLoader::load_from_str(config_s) {
            Ok(config) => config,
            Err(e) => {
                let cause: String = format!("failed to parse configuration: {}", e);
                error!("from_str(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        match &config[..] {
            [] => Ok(Self(Yaml::Null)),
            [c] => Ok(Self(c.clone())),
            _ => Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        }
    }

    /// Returns the "tasks" section, if present.
    fn get_tasks_config(&self) -> Result<Option<&Yaml>, Fail> {
        match self.0.index(tasks_config::SECTION_NAME) {
            Yaml::BadValue | Yaml::Null => Ok(None),
            _ => Ok(Some(Self::get_subsection(&self.0, tasks_config::SECTION_NAME)?)),
        }
    }

    /// Reads the stack size of a task from the environment variable first and then the underlying configuration file.
    /// Falls back to [DEFAULT_STACK_SIZE] when neither sets it.
    pub fn stack_size(&self) -> Result<usize, Fail> {
        let stack_size: usize = if let Some(stack_size) = Self::get_typed_env_option(tasks_config::STACK_SIZE)? {
            stack_size
        } else {
            match self.get_tasks_config()? {
                Some(section) if Self::has_option(section, tasks_config::STACK_SIZE) => {
                    Self::get_int_option(section, tasks_config::STACK_SIZE)?
                },
                _ => DEFAULT_STACK_SIZE,
            }
        };

        if stack_size < MIN_STACK_SIZE {
            let cause: String = format!("stack size must be at least {} bytes (got {})", MIN_STACK_SIZE, stack_size);
            error!("stack_size(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(stack_size)
    }

    /// Reads the interval between dispatch passes of a draining scheduler from the environment variable first and then
    /// the underlying configuration file.
    pub fn drain_interval(&self) -> Result<Duration, Fail> {
        let interval: Option<u64> = if let Some(interval) = Self::get_typed_env_option(tasks_config::DRAIN_INTERVAL_MS)? {
            Some(interval)
        } else {
            match self.get_tasks_config()? {
                Some(section) if Self::has_option(section, tasks_config::DRAIN_INTERVAL_MS) => {
                    Some(Self::get_int_option(section, tasks_config::DRAIN_INTERVAL_MS)?)
                },
                _ => None,
            }
        };
        Ok(interval.map_or(DEFAULT_DRAIN_INTERVAL, Duration::from_millis))
    }

    //======================================================================================================================
    // Static Functions
    //======================================================================================================================

    fn has_option(yaml: &Yaml, index: &str) -> bool {
        !yaml.index(index).is_badvalue()
    }

    /// Similar to `get_typed_option` using `Yaml::as_hash` receiver. This method returns a `&Yaml` instead of
    /// yaml::Hash, and Yaml is more natural for indexing.
    fn get_subsection<'a>(yaml: &'a Yaml, index: &str) -> Result<&'a Yaml, Fail> {
        let section: &'a Yaml = Self::get_option(yaml, index)?;
        match section {
            Yaml::Hash(_) => Ok(section),
            _ => {
                let message: String = format!("parameter \"{}\" has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Index `yaml` to find the value at `index`, validating that the index exists.
    fn get_option<'a>(yaml: &'a Yaml, index: &str) -> Result<&'a Yaml, Fail> {
        match yaml.index(index) {
            Yaml::BadValue => {
                let message: String = format!("missing configuration option \"{}\"", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
            value => Ok(value),
        }
    }

    /// Index `yaml` to find the value at `index`, validating that it exists and that the receiver returns Some(_).
    fn get_typed_option<'a, T, Fn>(yaml: &'a Yaml, index: &str, receiver: Fn) -> Result<T, Fail>
    where
        Fn: FnOnce(&'a Yaml) -> Option<T>,
    {
        let option: &'a Yaml = Self::get_option(yaml, index)?;
        match receiver(option) {
            Some(value) => Ok(value),
            None => {
                let message: String = format!("parameter {} has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Get value where the environment value overrides the config file if it exists.
    fn get_typed_env_option<T: FromStr>(index: &str) -> Result<Option<T>, Fail> {
        if let Ok(var) = ::std::env::var(index.to_uppercase()) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("parameter {} has unexpected type", index);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            }
        }
        Ok(None)
    }

    /// Similar to `get_typed_option` using `Yaml::as_i64` as the receiver, but additionally verifies that the
    /// destination type may hold the i64 value.
    fn get_int_option<T: TryFrom<i64>>(yaml: &Yaml, index: &str) -> Result<T, Fail> {
        let val: i64 = Self::get_typed_option(yaml, index, &Yaml::as_i64)?;
        match T::try_from(val) {
            Ok(val) => Ok(val),
            _ => {
                let message: String = format!("parameter \"{}\" is out of range", index);
                Err(Fail::new(libc::ERANGE, message.as_str()))
            },
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
