//! # Pooling Configuration
//!
//! Loaded once at session start from TOML. Everything here is external
//! configuration; the core never writes it back.
//!
//! ```toml
//! default_max_pool_size = 100
//! auto_name_objects = true
//!
//! [[pools]]
//! prototype = "Projectiles/Orb"
//! category = "ReplicatedRpc"
//! max_size = 64
//! preload = 16
//! ```

use std::path::Path;

use revenant_shared::Category;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default per-owner token range (`owner * 10000 + n`).
pub const DEFAULT_TOKEN_CAPACITY: u32 = 10_000;

/// Default per-owner sub-component id range.
pub const DEFAULT_SUB_COMPONENT_CAPACITY: u32 = 1_000;

/// Default capacity of lazily created pools.
pub const DEFAULT_MAX_POOL_SIZE: usize = 100;

/// A pool created eagerly at session start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadedPool {
    /// Prototype path.
    pub prototype: String,
    /// Category of the pool.
    pub category: Category,
    /// Capacity of the pool.
    pub max_size: usize,
    /// Inactive entities materialized up front.
    #[serde(default)]
    pub preload: usize,
}

/// Configuration for one pooling session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolingConfig {
    /// Size of each owner's token range.
    pub token_capacity: u32,
    /// Size of each owner's sub-component id range.
    pub sub_component_capacity: u32,
    /// Capacity used for pools created on first use.
    pub default_max_pool_size: usize,
    /// Name leased entities `"<prototype>.<owner>.<token>"`.
    pub auto_name_objects: bool,
    /// Pools created at session start.
    pub pools: Vec<PreloadedPool>,
}

impl Default for PoolingConfig {
    fn default() -> Self {
        Self {
            token_capacity: DEFAULT_TOKEN_CAPACITY,
            sub_component_capacity: DEFAULT_SUB_COMPONENT_CAPACITY,
            default_max_pool_size: DEFAULT_MAX_POOL_SIZE,
            auto_name_objects: true,
            pools: Vec::new(),
        }
    }
}

impl PoolingConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`PoolingConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.token_capacity == 0 {
            return Err(ConfigError::Invalid("token_capacity must be greater than zero".into()));
        }
        if self.sub_component_capacity == 0 {
            return Err(ConfigError::Invalid(
                "sub_component_capacity must be greater than zero".into(),
            ));
        }
        if self.default_max_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "default_max_pool_size must be greater than zero".into(),
            ));
        }
        for pool in &self.pools {
            if pool.max_size == 0 {
                return Err(ConfigError::Invalid(format!(
                    "pool {} ({}) has max_size 0",
                    pool.prototype, pool.category
                )));
            }
            if pool.preload > pool.max_size {
                return Err(ConfigError::Invalid(format!(
                    "pool {} ({}) preloads {} but holds at most {}",
                    pool.prototype, pool.category, pool.preload, pool.max_size
                )));
            }
        }
        Ok(())
    }
}
