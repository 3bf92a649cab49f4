//! Utilities for cyclerun.
//!
//! Submodules:
//! - `fs`: Filesystem helpers (atomic write-then-replace).

pub mod fs;
