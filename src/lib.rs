#![doc = include_str!("../README.md")]
#![warn(missing_docs, missing_debug_implementations)]
mod concurrent;
mod config;
mod deferred;
mod error;
mod group;
mod instance;
mod lifecycle;
mod manager;
mod membership;
mod pool_allocator;
mod return_path;

pub use concurrent::*;
pub use config::*;
pub use deferred::{Completion, DeferredTicket};
pub use error::*;
pub use group::{GroupId, PoolGroup};
pub use instance::*;
pub use lifecycle::*;
pub use manager::*;
pub use membership::Holder;
pub use pool_allocator::*;
