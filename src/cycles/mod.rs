//! Cycle data model and persistence.
//!
//! A `Cycle` is a named, ordered list of actions; the whole collection lives
//! in a single JSON file owned by [`CycleStore`]. Import from here for a
//! convenient, stable API.
//!
//! Example:
//! use cyclerun::cycles::{Action, CycleStore};
//!
//! let mut store = CycleStore::open("cycles.json");
//! store.add("demo", &[Action::Click { x: 10, y: 20 }])?;

pub mod models;
pub mod store;

// Re-export core data models
pub use models::{Action, ActionError, Cycle, CycleCollection};

// Re-export store types and helpers
pub use store::{CycleStore, LoadIssue, StoreError, collection_schema};
