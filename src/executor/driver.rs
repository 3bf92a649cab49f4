use enigo::Mouse as _;
use enigo::{Button, Coordinate, Direction, Enigo, Settings};
use thiserror::Error;
use tracing::{info, trace};

/// Failure in the OS pointer-automation layer.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to initialize input backend: {0}")]
    Init(#[from] enigo::NewConError),

    #[error("pointer input failed: {0}")]
    Input(#[from] enigo::InputError),

    #[error("pointer automation failed: {0}")]
    Backend(String),
}

/// The OS pointer-automation collaborator, behind a trait so the engine can
/// run against a scripted driver in tests.
pub trait PointerDriver: Send {
    /// Fire one primary click at an absolute physical-pixel position.
    fn click(&mut self, x: i32, y: i32) -> Result<(), DriverError>;

    /// Report the pointer's current physical-pixel location.
    fn position(&mut self) -> Result<(i32, i32), DriverError>;
}

/// Enigo-backed driver with optional dry-run mode.
/// In dry-run mode, clicks are only logged and no real input is simulated;
/// `position` then reports the last requested point.
pub struct EnigoDriver {
    dry_run: bool,
    enigo: Option<Enigo>,
    last_target: (i32, i32),
}

impl EnigoDriver {
    /// Create a new driver.
    /// - dry_run: when true, only logs instead of simulating real input.
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            enigo: None,
            last_target: (0, 0),
        }
    }

    /// Returns whether the driver is currently in dry-run mode.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn ensure_enigo(&mut self) -> Result<&mut Enigo, DriverError> {
        if self.enigo.is_none() {
            trace!(target: "cyclerun::driver", "Initializing Enigo");
            self.enigo = Some(Enigo::new(&Settings::default())?);
        }
        Ok(self.enigo.as_mut().expect("Enigo must be initialized"))
    }
}

impl PointerDriver for EnigoDriver {
    fn click(&mut self, x: i32, y: i32) -> Result<(), DriverError> {
        if self.dry_run {
            info!(target: "cyclerun::driver", x, y, "DRY-RUN click");
            self.last_target = (x, y);
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "cyclerun::driver", x, y, "click");
        enigo.move_mouse(x, y, Coordinate::Abs)?;
        enigo.button(Button::Left, Direction::Click)?;
        self.last_target = (x, y);
        Ok(())
    }

    fn position(&mut self) -> Result<(i32, i32), DriverError> {
        if self.dry_run {
            return Ok(self.last_target);
        }
        let enigo = self.ensure_enigo()?;
        Ok(enigo.location()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_reports_last_requested_point() {
        let mut driver = EnigoDriver::new(true);
        assert!(driver.is_dry_run());
        assert_eq!(driver.position().unwrap(), (0, 0));

        driver.click(5, 7).unwrap();
        assert_eq!(driver.position().unwrap(), (5, 7));

        driver.click(300, 40).unwrap();
        assert_eq!(driver.position().unwrap(), (300, 40));
    }
}
