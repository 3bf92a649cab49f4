//! Persisted cycle store.
//!
//! One JSON file holds the whole ordered collection of saved cycles; every
//! mutation rewrites it in full. The expected collection size is tens to low
//! hundreds of cycles, so a full rewrite stays cheap.
//!
//! Behavior:
//! - A missing file is the normal first-run state and loads as an empty
//!   collection with no issue recorded.
//! - An unreadable, malformed, or invariant-violating file also loads as an
//!   empty collection, but the cause is kept as a [`LoadIssue`] and logged,
//!   so callers can tell corruption apart from "no saved cycles".
//! - Writes go through a tempfile in the target directory followed by an
//!   atomic rename; a failed write leaves the previous file intact.
//! - `delete`/`rename` with an out-of-range index are successful no-ops that
//!   do not touch the file.
//!
//! The store is only ever driven from the single owning context, so it does
//! no internal locking.

use schemars::{Schema, schema_for};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::models::{Action, ActionError, Cycle, CycleCollection};
use crate::utils::fs::atomic_write;

/// Failure while mutating or persisting the collection.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid action: {0}")]
    Action(#[from] ActionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Why a load degraded to the empty collection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadIssue {
    #[error("cycle file could not be read: {0}")]
    Unreadable(String),

    #[error("cycle file is not valid JSON: {0}")]
    Malformed(String),

    #[error("cycle file contains an invalid action: {0}")]
    InvalidAction(String),
}

/// Owns the persisted [`CycleCollection`] and its backing file.
#[derive(Debug)]
pub struct CycleStore {
    path: PathBuf,
    cycles: CycleCollection,
    load_issue: Option<LoadIssue>,
}

impl CycleStore {
    /// Open the store at `path`, loading whatever is there.
    ///
    /// Never fails: any problem reading or parsing the file yields an empty
    /// collection, with the cause retrievable via [`CycleStore::load_issue`].
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (cycles, load_issue) = load_collection(&path);
        match &load_issue {
            Some(issue) => warn!(
                target: "cyclerun::store",
                path = %path.display(), %issue,
                "Falling back to an empty cycle collection"
            ),
            None => debug!(
                target: "cyclerun::store",
                path = %path.display(), cycles = cycles.len(),
                "Loaded cycle collection"
            ),
        }
        Self {
            path,
            cycles,
            load_issue,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current in-memory collection, in persisted order.
    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    pub fn get(&self, index: usize) -> Option<&Cycle> {
        self.cycles.get(index)
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Whether the last load degraded to empty, and why.
    pub fn load_issue(&self) -> Option<&LoadIssue> {
        self.load_issue.as_ref()
    }

    /// Append a new cycle built from a deep copy of `actions`, then persist.
    ///
    /// Every action is validated first; an invalid one rejects the whole call
    /// before any state changes.
    pub fn add(&mut self, name: impl Into<String>, actions: &[Action]) -> Result<(), StoreError> {
        for action in actions {
            action.validate()?;
        }
        let name = name.into();
        info!(
            target: "cyclerun::store",
            %name, actions = actions.len(),
            "Saving cycle"
        );
        self.cycles.push(Cycle {
            name,
            actions: actions.to_vec(),
        });
        self.persist()
    }

    /// Remove the cycle at `index` and persist. Out-of-range is a no-op.
    pub fn delete(&mut self, index: usize) -> Result<(), StoreError> {
        if index >= self.cycles.len() {
            debug!(target: "cyclerun::store", index, "delete: index out of range; ignoring");
            return Ok(());
        }
        let removed = self.cycles.remove(index);
        info!(target: "cyclerun::store", index, name = %removed.name, "Deleted cycle");
        self.persist()
    }

    /// Rename the cycle at `index` and persist. Out-of-range is a no-op.
    pub fn rename(
        &mut self,
        index: usize,
        new_name: impl Into<String>,
    ) -> Result<(), StoreError> {
        let Some(cycle) = self.cycles.get_mut(index) else {
            debug!(target: "cyclerun::store", index, "rename: index out of range; ignoring");
            return Ok(());
        };
        let new_name = new_name.into();
        info!(
            target: "cyclerun::store",
            index, from = %cycle.name, to = %new_name,
            "Renamed cycle"
        );
        cycle.name = new_name;
        self.persist()
    }

    /// Rewrite the backing file from the in-memory collection.
    fn persist(&self) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&self.cycles)?;
        atomic_write(&self.path, &json)?;
        debug!(
            target: "cyclerun::store",
            path = %self.path.display(), cycles = self.cycles.len(),
            "Persisted cycle collection"
        );
        Ok(())
    }
}

/// Load the collection from `path` with the soft-fail policy.
fn load_collection(path: &Path) -> (CycleCollection, Option<LoadIssue>) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return (Vec::new(), None),
        Err(err) => return (Vec::new(), Some(LoadIssue::Unreadable(err.to_string()))),
    };

    let cycles: CycleCollection = match serde_json::from_slice(&bytes) {
        Ok(cycles) => cycles,
        Err(err) => return (Vec::new(), Some(LoadIssue::Malformed(err.to_string()))),
    };

    // A file that parses but violates the action invariants is treated the
    // same as a corrupt one: all or nothing, never a partial collection.
    for cycle in &cycles {
        for action in &cycle.actions {
            if let Err(err) = action.validate() {
                return (Vec::new(), Some(LoadIssue::InvalidAction(err.to_string())));
            }
        }
    }

    (cycles, None)
}

/// JSON Schema for the persisted cycle file.
pub fn collection_schema() -> Schema {
    schema_for!(CycleCollection)
}
