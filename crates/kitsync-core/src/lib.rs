//! # kitsync-core
//!
//! Reconciliation engine for tool-managed files.
//!
//! Given a set of candidate items (agents, commands, skills, rules, config
//! files) and the hashes this tool last wrote for their target paths, the
//! engine decides per item whether to install, update, skip, delete or flag
//! a conflict, resolves conflicts one at a time, and applies the resulting
//! plan to the filesystem.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Core error types for the kitsync library
pub mod error;

/// Content hashing, change classification inputs, and diff generation
pub mod comparison;

/// Configuration file parsing and management
pub mod config;

/// Candidate item descriptors
pub mod item;

/// Persisted record of tool-written content hashes
pub mod baseline;

/// Current on-disk state of target paths
pub mod local;

/// Candidate discovery from a source tree
pub mod scanner;

/// Planning, conflict resolution and plan execution
pub mod sync;

/// Named advisory lock between tool invocations
pub mod lock;

/// Explicit engine context shared by operations
pub mod context;

pub use context::EngineContext;
pub use error::{Result, SyncError};
