#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Cyclerun — a cycle-based pointer automation sequencer built on Enigo.
//!
//! Users assemble ordered sequences of clicks and timed pauses, save them as
//! named cycles, and replay a sequence repeatedly with fixed pacing. Most
//! implementation details live under the internal modules:
//! - `cycles`: Action/cycle data model and the persisted cycle store.
//! - `display`: Display metadata and logical-to-physical coordinate mapping.
//! - `executor`: Pointer driver, run engine, and progress events.
//! - `utils`: Utilities such as atomic file replacement.
//!
//! Use `cyclerun::prelude::*` to bring commonly used items into scope quickly.

/// Public module: cycle data model and persistence.
pub mod cycles;
/// Public module: display geometry and coordinate normalization.
pub mod display;
/// Public module: execution engine (driver, engine, events).
pub mod executor;
/// Public module: utilities (atomic file writes, etc.).
pub mod utils;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Initialize tracing (logging) with a reasonable default.
/// - Honors the `RUST_LOG` environment variable if set.
/// - Falls back to `info` level.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing() {
    use tracing::Level;
    use tracing_subscriber::fmt;

    // Parse RUST_LOG as a simple level (trace|debug|info|warn|error)
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| match s.to_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        })
        .unwrap_or(Level::INFO);

    // Ignore the error if the global subscriber was already set.
    let _ = fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use cyclerun::prelude::*;`
pub mod prelude {
    // Common result/error handling
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};

    // Serialization
    pub use serde::{Deserialize, Serialize};

    // Tracing macros
    pub use tracing::{debug, error, info, instrument, trace, warn};

    // Timing helpers
    pub use std::time::Duration;
    pub use tokio::time::sleep;

    // External crates (namespaced) if callers want direct access
    pub use crate as cyclerun;
    pub use enigo;

    // Frequently used internal modules
    pub use crate::{cycles, display, executor, utils};
}
