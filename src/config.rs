//! Manager configuration and prewarm plans, loaded from TOML.

use crate::ConfigError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fs, path::Path};

/// Order in which idle instances of a group are reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReuseOrder {
    /// Last returned, first reused.
    #[default]
    Lifo,
    /// First returned, first reused.
    Fifo,
}

/// Behaviour knobs of a [`PoolManager`](crate::PoolManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Construct a new instance when [`acquire`](crate::PoolManager::acquire)
    /// finds the group empty.
    pub create_if_empty: bool,
    /// Activate instances handed out by `acquire`.
    pub activate_on_acquire: bool,
    /// Deactivate instances handed back by `release`.
    pub deactivate_on_release: bool,
    /// Destroy everything when a context change is received.
    pub drain_on_context_change: bool,
    /// Reuse order inside each group.
    pub reuse_order: ReuseOrder,
    /// Maximum idle instances kept per group. Releases beyond it destroy the
    /// instance instead. Unbounded when `None`.
    pub max_idle_per_group: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            create_if_empty: true,
            activate_on_acquire: true,
            deactivate_on_release: true,
            drain_on_context_change: true,
            reuse_order: ReuseOrder::Lifo,
            max_idle_per_group: None,
        }
    }
}

impl PoolConfig {
    /// Parses a config from TOML. Missing keys take their default.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read(path.as_ref())?)
    }
}

/// How many instances of one template to build up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrewarmEntry<K> {
    /// Template to prewarm.
    pub template: K,
    /// Number of idle instances to construct.
    pub count: usize,
}

/// A list of templates to prewarm, read from `[[prewarm]]` tables.
///
/// ```toml
/// [[prewarm]]
/// template = "coin"
/// count = 32
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "K: Deserialize<'de>"))]
pub struct PrewarmPlan<K> {
    /// Entries applied in order.
    #[serde(default)]
    pub prewarm: Vec<PrewarmEntry<K>>,
}

impl<K> Default for PrewarmPlan<K> {
    fn default() -> Self {
        PrewarmPlan {
            prewarm: Vec::new(),
        }
    }
}

impl<K> PrewarmPlan<K> {
    /// Adds an entry.
    pub fn with(mut self, template: K, count: usize) -> Self {
        self.prewarm.push(PrewarmEntry { template, count });
        self
    }

    /// Iterates entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &PrewarmEntry<K>> {
        self.prewarm.iter()
    }
}

impl<K: DeserializeOwned> PrewarmPlan<K> {
    /// Parses a plan from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses a plan file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read(path.as_ref())?)
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
