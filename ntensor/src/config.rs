/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Configuration for ntensor.
//!
//! Settings have compiled-in defaults that can be overridden from
//! environment variables or from a JSON document. Only performance
//! heuristics are configurable; layout decisions (alignment, stride
//! computation) are fixed so that shapes are reproducible.

use std::env;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;

use crate::shape::ALIGNMENT;

/// Environment variable overriding [`Config::execute_batch_bytes`].
pub const EXECUTE_BATCH_BYTES_ENV: &str = "NTENSOR_EXECUTE_BATCH_BYTES";

/// Environment variable overriding [`Config::sparse_reserve_limit`].
pub const SPARSE_RESERVE_LIMIT_ENV: &str = "NTENSOR_SPARSE_RESERVE_LIMIT";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{key} must be positive")]
    NotPositive { key: &'static str },
}

/// Engine settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Width in bytes of the innermost runs handed out by the execute
    /// engine. Mirrors a SIMD register; defaults to [`ALIGNMENT`].
    pub execute_batch_bytes: usize,

    /// Upper bound on the number of entries a sparse buffer reserves
    /// up front.
    pub sparse_reserve_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            execute_batch_bytes: ALIGNMENT,
            sparse_reserve_limit: 1024,
        }
    }
}

impl Config {
    /// Checks invariants that deserialization alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execute_batch_bytes == 0 {
            return Err(ConfigError::NotPositive {
                key: "execute_batch_bytes",
            });
        }
        Ok(())
    }

    /// Parses a JSON document; absent keys keep their defaults.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(text).context("parsing ntensor config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads [`Config::from_json`] input from a file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading ntensor config {}", path.display()))?;
        Self::from_json(&text)
    }
}

/// Values explicitly provided by some source; `None` keeps whatever
/// the target configuration already holds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    pub execute_batch_bytes: Option<usize>,
    pub sparse_reserve_limit: Option<usize>,
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<usize>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

/// Collect overrides from a variable lookup keyed by the `NTENSOR_*`
/// names.
pub fn overrides_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Overrides, ConfigError> {
    let overrides = Overrides {
        execute_batch_bytes: parse_var(&lookup, EXECUTE_BATCH_BYTES_ENV)?,
        sparse_reserve_limit: parse_var(&lookup, SPARSE_RESERVE_LIMIT_ENV)?,
    };
    if overrides.execute_batch_bytes == Some(0) {
        return Err(ConfigError::NotPositive {
            key: EXECUTE_BATCH_BYTES_ENV,
        });
    }
    Ok(overrides)
}

/// Collect overrides from environment variables.
pub fn overrides_from_env() -> Result<Overrides, ConfigError> {
    overrides_from(|key| env::var(key).ok())
}

/// Defaults merged with the overrides found through `lookup`.
/// Malformed values are logged and ignored.
pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Config {
    let mut config = Config::default();
    match overrides_from(lookup) {
        Ok(overrides) => merge(&mut config, &overrides),
        Err(err) => tracing::warn!(%err, "ignoring ntensor environment configuration"),
    }
    config
}

/// Load configuration from environment variables. Malformed values
/// are logged and ignored.
pub fn from_env() -> Config {
    from_lookup(|key| env::var(key).ok())
}

/// Merge overrides into a configuration, with the overrides taking
/// precedence.
pub fn merge(config: &mut Config, other: &Overrides) {
    if let Some(bytes) = other.execute_batch_bytes {
        config.execute_batch_bytes = bytes;
    }
    if let Some(limit) = other.sparse_reserve_limit {
        config.sparse_reserve_limit = limit;
    }
}

/// Global configuration functions
pub mod global {
    use std::sync::Arc;
    use std::sync::LazyLock;

    use parking_lot::Mutex;
    use parking_lot::MutexGuard;
    use parking_lot::RwLock;

    use super::*;

    /// Global configuration instance, initialized from environment variables.
    static CONFIG: LazyLock<Arc<RwLock<Config>>> =
        LazyLock::new(|| Arc::new(RwLock::new(from_env())));

    /// Serializes tests that modify the global configuration.
    static LOCK: Mutex<()> = parking_lot::const_mutex(());

    /// A snapshot of the global configuration.
    pub fn get() -> Config {
        CONFIG.read().clone()
    }

    /// Replace the global configuration.
    ///
    /// # Panics
    ///
    /// Panics if `config` is invalid.
    pub fn set(config: Config) {
        if let Err(err) = config.validate() {
            panic!("invalid ntensor config: {err}");
        }
        *CONFIG.write() = config;
    }

    /// Reset the global configuration to defaults (for testing only)
    pub fn reset_to_defaults() {
        *CONFIG.write() = Config::default();
    }

    /// Acquire the global configuration lock for testing.
    pub fn lock() -> ConfigLock {
        ConfigLock { _guard: LOCK.lock() }
    }

    /// Exclusive access to the global configuration for the lifetime
    /// of the lock.
    pub struct ConfigLock {
        _guard: MutexGuard<'static, ()>,
    }

    impl ConfigLock {
        /// Temporarily override the execute batch width; the previous
        /// configuration is restored when the guard drops.
        pub fn override_batch_bytes(&self, bytes: usize) -> OverrideGuard<'_> {
            let previous = get();
            set(Config {
                execute_batch_bytes: bytes,
                ..previous.clone()
            });
            OverrideGuard {
                previous,
                _lock: self,
            }
        }
    }

    pub struct OverrideGuard<'a> {
        previous: Config,
        _lock: &'a ConfigLock,
    }

    impl Drop for OverrideGuard<'_> {
        fn drop(&mut self) {
            *CONFIG.write() = self.previous.clone();
        }
    }
}
