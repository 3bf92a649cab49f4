#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

/*!
Executor module for cyclerun.

This module wires together:
- `driver`: the OS pointer-automation seam (Enigo-backed, with dry-run)
- `events`: typed run-progress events and the channel policy
- `engine`: the run state machine that replays action snapshots

Typical usage:
- Construct an [`Engine`] with the driver it should replay through.
- Subscribe consumers via [`Engine::subscribe`].
- Call [`Engine::start`] with a [`RunRequest`] snapshot; cancel or await the
  returned [`RunHandle`].

Example:
```no_run
use cyclerun::cycles::Action;
use cyclerun::executor::{Engine, EnigoDriver, RunRequest};
use std::time::Duration;

# async fn demo() {
let engine = Engine::new(Box::new(EnigoDriver::new(true))); // dry-run
let actions = [Action::Click { x: 10, y: 20 }, Action::Sleep { seconds: 1.0 }];
let mut handle = engine
    .start(RunRequest::new(&actions, 2, Duration::from_millis(500)))
    .expect("engine was idle");
let outcome = handle.wait().await;
# }
```
*/

pub mod driver;
pub mod engine;
pub mod events;

// Re-exports for convenient access from `cyclerun::executor::*`
pub use driver::{DriverError, EnigoDriver, PointerDriver};
pub use engine::{Engine, RunHandle, RunOutcome, RunRequest, RunState, StartError};
pub use events::{EVENT_CAPACITY, RunEvent};
