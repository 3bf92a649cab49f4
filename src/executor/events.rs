//! Run progress events.
//!
//! The engine publishes these on a bounded `tokio::sync::broadcast` channel.
//! Publishing never blocks the run: a consumer that falls more than
//! [`EVENT_CAPACITY`] events behind loses the oldest ones and observes a
//! `Lagged` error on its next receive.

use std::fmt;

use crate::cycles::Action;

/// Events the broadcast channel buffers per subscriber before the oldest are
/// dropped for a lagging consumer.
pub const EVENT_CAPACITY: usize = 256;

/// Progress event emitted by a run, in production order.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Announced before each action is performed.
    Step { cycle: u32, action: Action },

    /// Where a click is about to land; meant for transient visual markers.
    Marker { x: i32, y: i32 },

    /// Pointer position reported by the automation layer right after a
    /// click. Diagnostic only: it may legitimately differ from the requested
    /// point if something intercepted the click.
    Clicked { x: i32, y: i32 },

    /// The run finished every requested cycle.
    Finished { cycles: u32 },

    /// The run was cancelled before completing.
    Cancelled { cycle: u32 },

    /// The pointer automation layer failed and the run was aborted.
    Failed { cycle: u32, message: String },
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunEvent::Step { cycle, action } => write!(f, "cycle {cycle}: {action}"),
            RunEvent::Marker { x, y } => write!(f, "marker at ({x}, {y})"),
            RunEvent::Clicked { x, y } => write!(f, "pointer reported at ({x}, {y})"),
            RunEvent::Finished { cycles } => write!(f, "finished after {cycles} cycle(s)"),
            RunEvent::Cancelled { cycle } => write!(f, "cancelled during cycle {cycle}"),
            RunEvent::Failed { cycle, message } => {
                write!(f, "failed during cycle {cycle}: {message}")
            }
        }
    }
}
