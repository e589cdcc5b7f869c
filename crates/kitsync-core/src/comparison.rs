//! Content comparison primitives
//!
//! This module provides read-only analysis of content:
//! - Content identity via SHA-256 hashing of files and directory trees
//! - Unified diffs between two versions of an item
//! - Sanitized, optionally colored rendering of diffs for terminals

mod diff;
mod hash;


pub use diff::{DiffGenerator, DiffRenderer, sanitize_for_terminal};
pub use hash::{ContentHash, DEFAULT_IGNORED_DIRS, Hasher};
