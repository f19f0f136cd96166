//! Error types for pool operations and configuration loading.

use crate::InstanceId;
use thiserror::Error;

/// Errors reported by [`PoolManager`](crate::PoolManager) operations.
///
/// None of these are fatal. Every variant describes a condition the manager
/// has already recovered from locally.
#[derive(Error, Debug)]
pub enum PoolError {
    /// An invalid template or instance was passed to a public operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Acquire with creation disabled found no idle instance.
    #[error("pool for template {template} is empty")]
    PoolEmpty {
        /// Debug rendering of the template.
        template: String,
    },

    /// Release target was not vended by this manager. It has been destroyed.
    #[error("instance {id} did not originate from this pool and was destroyed")]
    UnknownInstance {
        /// Identity of the foreign instance.
        id: InstanceId,
    },

    /// The allocator failed to construct an instance.
    #[error("failed to construct instance of template {template}")]
    ConstructionFailure {
        /// Debug rendering of the template.
        template: String,
        /// Error reported by the allocator.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PoolError {
    /// Returns true for [`PoolError::PoolEmpty`].
    pub fn is_pool_empty(&self) -> bool {
        matches!(self, PoolError::PoolEmpty { .. })
    }

    /// Returns true for [`PoolError::UnknownInstance`].
    pub fn is_unknown_instance(&self) -> bool {
        matches!(self, PoolError::UnknownInstance { .. })
    }
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors from loading a [`PoolConfig`](crate::PoolConfig) or
/// [`PrewarmPlan`](crate::PrewarmPlan).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read pool config at '{path}': {source}")]
    Io {
        /// Path that failed to load.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML content is malformed.
    #[error("invalid pool config: {0}")]
    Parse(#[from] toml::de::Error),
}
