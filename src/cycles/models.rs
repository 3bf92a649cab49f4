use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single replayable step.
///
/// Actions are immutable values; editing a sequence replaces whole actions
/// rather than mutating fields in place. The serialized shape is the wire
/// format of the cycle file:
/// - `{"type":"click","x":10,"y":20}`
/// - `{"type":"sleep","seconds":1.5}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Fire one primary click at an absolute physical-pixel position.
    Click { x: i32, y: i32 },

    /// Pause the run for a number of seconds.
    Sleep { seconds: f64 },
}

impl Action {
    /// Check the model invariants: click coordinates are non-negative and
    /// sleep durations are positive, finite seconds.
    pub fn validate(&self) -> Result<(), ActionError> {
        match *self {
            Action::Click { x, y } => {
                if x < 0 || y < 0 {
                    return Err(ActionError::NegativeCoordinates { x, y });
                }
            }
            Action::Sleep { seconds } => {
                if !seconds.is_finite() || seconds <= 0.0 {
                    return Err(ActionError::NonPositiveSleep { seconds });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Action::Click { x, y } => write!(f, "click({x}, {y})"),
            Action::Sleep { seconds } => write!(f, "sleep({seconds}s)"),
        }
    }
}

/// Violation of an `Action` invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("click coordinates must be non-negative (got {x}, {y})")]
    NegativeCoordinates { x: i32, y: i32 },

    #[error("sleep duration must be a positive number of seconds (got {seconds})")]
    NonPositiveSleep { seconds: f64 },
}

/// A named, persisted snapshot of an action sequence.
///
/// Names are free-form labels; cycles are selected by position, so names are
/// not required to be unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Cycle {
    pub name: String,
    pub actions: Vec<Action>,
}

/// The full ordered list of saved cycles — the sole unit of persistence.
pub type CycleCollection = Vec<Cycle>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn click_wire_format() {
        let action = Action::Click { x: 10, y: 20 };
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({"type": "click", "x": 10, "y": 20})
        );
    }

    #[test]
    fn sleep_wire_format() {
        let action = Action::Sleep { seconds: 1.5 };
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({"type": "sleep", "seconds": 1.5})
        );
    }

    #[test]
    fn sleep_accepts_integer_seconds() {
        let action: Action = serde_json::from_str(r#"{"type":"sleep","seconds":2}"#).unwrap();
        assert_eq!(action, Action::Sleep { seconds: 2.0 });
    }

    #[test]
    fn cycle_round_trips_through_json() {
        let cycle = Cycle {
            name: "login".into(),
            actions: vec![
                Action::Click { x: 100, y: 250 },
                Action::Sleep { seconds: 0.75 },
                Action::Click { x: 0, y: 0 },
            ],
        };
        let text = serde_json::to_string(&cycle).unwrap();
        let back: Cycle = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cycle);
    }

    #[test]
    fn validate_rejects_negative_coordinates() {
        let err = Action::Click { x: -1, y: 5 }.validate().unwrap_err();
        assert_eq!(err, ActionError::NegativeCoordinates { x: -1, y: 5 });
        assert!(Action::Click { x: 0, y: 0 }.validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_positive_sleep() {
        assert!(Action::Sleep { seconds: 0.0 }.validate().is_err());
        assert!(Action::Sleep { seconds: -2.0 }.validate().is_err());
        assert!(Action::Sleep { seconds: f64::NAN }.validate().is_err());
        assert!(Action::Sleep { seconds: f64::INFINITY }.validate().is_err());
        assert!(Action::Sleep { seconds: 0.001 }.validate().is_ok());
    }

    #[test]
    fn display_rendering() {
        assert_eq!(Action::Click { x: 10, y: 20 }.to_string(), "click(10, 20)");
        assert_eq!(Action::Sleep { seconds: 1.5 }.to_string(), "sleep(1.5s)");
    }
}
