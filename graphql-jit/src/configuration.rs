//! Configuration for plan compilation, execution and caching.
//!
//! Can be created through `serde::Deserialize` from various formats (YAML through
//! [`FromStr`]), or inline in Rust code with the builders.

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use displaydoc::Display;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),
}

/// The engine configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Compiled plan cache.
    pub cache: Cache,

    /// Execution options, applied to the plans at compile time.
    pub execution: Execution,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder]
    pub fn new(cache: Option<Cache>, execution: Option<Execution>) -> Self {
        Self {
            cache: cache.unwrap_or_default(),
            execution: execution.unwrap_or_default(),
        }
    }

    /// Checks values serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.execution.recursion_limit == 0 {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "execution.recursion_limit",
                error: "must be greater than zero".to_string(),
            });
        }
        if self.cache.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "cache.ttl",
                error: "must be greater than zero, leave it unset to disable expiry".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse configuration from a string in YAML syntax
impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let configuration: Configuration =
            serde_yaml::from_str(s).map_err(ConfigurationError::DeserializeConfigError)?;
        configuration.validate()?;
        Ok(configuration)
    }
}

/// Compiled plan cache configuration.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Cache {
    /// Maximum number of plans kept, the least recently used plan is evicted first.
    /// `null` keeps every plan.
    #[schemars(with = "Option<usize>")]
    pub capacity: Option<NonZeroUsize>,

    /// How long a plan stays usable after it was compiled (e.g. `10m`).
    /// Expired plans are recompiled on their next lookup. Unset plans never expire.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "Option<String>")]
    pub ttl: Option<Duration>,
}

pub(crate) const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(128) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

impl Default for Cache {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_CACHE_CAPACITY),
            ttl: None,
        }
    }
}

#[buildstructor::buildstructor]
impl Cache {
    #[builder]
    pub fn new(capacity: Option<NonZeroUsize>, ttl: Option<Duration>) -> Self {
        Self {
            capacity: capacity.or(Some(DEFAULT_CACHE_CAPACITY)),
            ttl,
        }
    }

    /// A cache without a size bound.
    pub fn unbounded(ttl: Option<Duration>) -> Self {
        Self {
            capacity: None,
            ttl,
        }
    }
}

/// Execution configuration.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Execution {
    /// Resolve sibling asynchronous fields concurrently. Mutation root fields always run
    /// one after the other.
    pub parallel: bool,

    /// Maximum depth of nested selection sets, fragments included.
    pub recursion_limit: usize,
}

pub(crate) const DEFAULT_RECURSION_LIMIT: usize = 128;

impl Default for Execution {
    fn default() -> Self {
        Self {
            parallel: true,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

#[buildstructor::buildstructor]
impl Execution {
    #[builder]
    pub fn new(parallel: Option<bool>, recursion_limit: Option<usize>) -> Self {
        Self {
            parallel: parallel.unwrap_or(true),
            recursion_limit: recursion_limit.unwrap_or(DEFAULT_RECURSION_LIMIT),
        }
    }
}
