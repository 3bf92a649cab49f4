//! Run state machine.
//!
//! The [`Engine`] replays an action snapshot for a fixed number of cycles on
//! a dedicated worker task, publishing [`RunEvent`]s as it goes. At most one
//! run exists engine-wide; a `start` while running is rejected without
//! touching the active run. Suspensions block only the worker, and every one
//! of them races the run's cancellation token, so cancel latency is bounded
//! by a single event emission.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cycles::{Action, ActionError};
use crate::executor::driver::PointerDriver;
use crate::executor::events::{EVENT_CAPACITY, RunEvent};

/// Synchronous rejection of a `start` call. No state changes when one of
/// these is returned.
#[derive(Debug, PartialEq, Error)]
pub enum StartError {
    #[error("action list is empty")]
    EmptyActions,

    #[error("cycle count must be at least 1")]
    ZeroCycles,

    #[error("invalid action at index {index}: {source}")]
    InvalidAction {
        index: usize,
        #[source]
        source: ActionError,
    },

    #[error("a run is already in progress")]
    AlreadyRunning,
}

/// Everything one run needs, snapshotted at `start` time.
#[derive(Debug, Clone)]
pub struct RunRequest {
    actions: Vec<Action>,
    cycles: u32,
    inter_step_delay: Duration,
}

impl RunRequest {
    /// Snapshot `actions` into a request. The deep copy is deliberate: edits
    /// to the source sequence after `start` must not affect an in-flight run.
    pub fn new(actions: &[Action], cycles: u32, inter_step_delay: Duration) -> Self {
        Self {
            actions: actions.to_vec(),
            cycles,
            inter_step_delay,
        }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn inter_step_delay(&self) -> Duration {
        self.inter_step_delay
    }
}

/// Engine-level state, observable from any context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Handle to an in-flight run: carries its cancellation signal and resolves
/// to the run's outcome.
#[derive(Debug)]
pub struct RunHandle {
    cancel: CancellationToken,
    join: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Request cancellation. The worker notices before its next action or
    /// mid-suspension, emits `Cancelled`, and stops.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clone of the cancellation token, e.g. to wire into a signal handler.
    pub fn canceller(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to end.
    pub async fn wait(&mut self) -> RunOutcome {
        match (&mut self.join).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(target: "cyclerun::engine", error = %err, "Run worker task failed");
                RunOutcome::Failed
            }
        }
    }
}

/// Owns the run state machine and the event channel.
///
/// An explicit instance, not a singleton: construct one with the pointer
/// driver it should replay through, subscribe consumers, then `start` runs.
pub struct Engine {
    driver: Arc<Mutex<Box<dyn PointerDriver>>>,
    events: broadcast::Sender<RunEvent>,
    running: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(driver: Box<dyn PointerDriver>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            driver: Arc::new(Mutex::new(driver)),
            events,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to run events. Any number of consumers may subscribe; each
    /// receives every event in production order.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> RunState {
        if self.running.load(Ordering::Acquire) {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    /// Validate `request` and begin replaying it on a worker task.
    ///
    /// Rejected synchronously — leaving the engine state untouched — when the
    /// action list is empty, the cycle count is zero, an action violates the
    /// model invariants, or a run is already in progress.
    pub fn start(&self, request: RunRequest) -> Result<RunHandle, StartError> {
        if request.actions.is_empty() {
            return Err(StartError::EmptyActions);
        }
        if request.cycles == 0 {
            return Err(StartError::ZeroCycles);
        }
        for (index, action) in request.actions.iter().enumerate() {
            action
                .validate()
                .map_err(|source| StartError::InvalidAction { index, source })?;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StartError::AlreadyRunning);
        }

        info!(
            target: "cyclerun::engine",
            actions = request.actions.len(),
            cycles = request.cycles,
            delay_ms = request.inter_step_delay.as_millis() as u64,
            "Starting run"
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let driver = Arc::clone(&self.driver);
        let events = self.events.clone();
        let running = Arc::clone(&self.running);

        let join = tokio::spawn(async move {
            let outcome = run_loop(&driver, &events, &token, &request).await;
            running.store(false, Ordering::Release);
            outcome
        });

        Ok(RunHandle { cancel, join })
    }
}

async fn run_loop(
    driver: &Mutex<Box<dyn PointerDriver>>,
    events: &broadcast::Sender<RunEvent>,
    cancel: &CancellationToken,
    request: &RunRequest,
) -> RunOutcome {
    for cycle in 1..=request.cycles {
        for action in &request.actions {
            if cancel.is_cancelled() {
                return finish_cancelled(events, cycle);
            }
            publish(events, RunEvent::Step {
                cycle,
                action: action.clone(),
            });

            match *action {
                Action::Click { x, y } => {
                    publish(events, RunEvent::Marker { x, y });
                    let reported = {
                        let mut driver = driver.lock().await;
                        driver.click(x, y).and_then(|()| driver.position())
                    };
                    match reported {
                        Ok((x, y)) => publish(events, RunEvent::Clicked { x, y }),
                        Err(err) => {
                            error!(
                                target: "cyclerun::engine",
                                cycle, error = %err,
                                "Pointer automation failed; aborting run"
                            );
                            publish(events, RunEvent::Failed {
                                cycle,
                                message: err.to_string(),
                            });
                            return RunOutcome::Failed;
                        }
                    }
                }
                Action::Sleep { seconds } => {
                    if !pause(cancel, Duration::from_secs_f64(seconds)).await {
                        return finish_cancelled(events, cycle);
                    }
                }
            }

            // Fixed pacing after every action, the last one of the last
            // cycle included.
            if !pause(cancel, request.inter_step_delay).await {
                return finish_cancelled(events, cycle);
            }
        }
        debug!(target: "cyclerun::engine", cycle, "Cycle complete");
    }

    publish(events, RunEvent::Finished {
        cycles: request.cycles,
    });
    info!(target: "cyclerun::engine", cycles = request.cycles, "Run complete");
    RunOutcome::Completed
}

fn finish_cancelled(events: &broadcast::Sender<RunEvent>, cycle: u32) -> RunOutcome {
    info!(target: "cyclerun::engine", cycle, "Run cancelled");
    publish(events, RunEvent::Cancelled { cycle });
    RunOutcome::Cancelled
}

/// Suspend for `duration`, racing the cancellation token.
/// Returns false if the run was cancelled before the suspension elapsed.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        () = cancel.cancelled() => false,
        () = sleep(duration) => true,
    }
}

fn publish(events: &broadcast::Sender<RunEvent>, event: RunEvent) {
    // Sending only fails with no subscribers, which is a supported state
    // (e.g. no visualizer attached).
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::driver::DriverError;
    use std::sync::Mutex as StdMutex;

    /// Records clicks and reports the last one as the pointer position;
    /// optionally fails on the nth click.
    #[derive(Default)]
    struct RecordingDriver {
        clicks: Arc<StdMutex<Vec<(i32, i32)>>>,
        fail_on: Option<usize>,
    }

    impl PointerDriver for RecordingDriver {
        fn click(&mut self, x: i32, y: i32) -> Result<(), DriverError> {
            let mut clicks = self.clicks.lock().unwrap();
            if self.fail_on == Some(clicks.len()) {
                return Err(DriverError::Backend("scripted failure".into()));
            }
            clicks.push((x, y));
            Ok(())
        }

        fn position(&mut self) -> Result<(i32, i32), DriverError> {
            Ok(self.clicks.lock().unwrap().last().copied().unwrap_or((0, 0)))
        }
    }

    fn recording_engine() -> (Engine, Arc<StdMutex<Vec<(i32, i32)>>>) {
        let driver = RecordingDriver::default();
        let clicks = Arc::clone(&driver.clicks);
        (Engine::new(Box::new(driver)), clicks)
    }

    fn drain(rx: &mut broadcast::Receiver<RunEvent>) -> Vec<RunEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn emits_the_exact_event_sequence() {
        let (engine, clicks) = recording_engine();
        let mut rx = engine.subscribe();

        let click = Action::Click { x: 10, y: 20 };
        let nap = Action::Sleep { seconds: 0.01 };
        let request = RunRequest::new(&[click.clone(), nap.clone()], 2, Duration::ZERO);

        let outcome = engine.start(request).unwrap().wait().await;
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(engine.status(), RunState::Idle);

        let expected = vec![
            RunEvent::Step { cycle: 1, action: click.clone() },
            RunEvent::Marker { x: 10, y: 20 },
            RunEvent::Clicked { x: 10, y: 20 },
            RunEvent::Step { cycle: 1, action: nap.clone() },
            RunEvent::Step { cycle: 2, action: click.clone() },
            RunEvent::Marker { x: 10, y: 20 },
            RunEvent::Clicked { x: 10, y: 20 },
            RunEvent::Step { cycle: 2, action: nap },
            RunEvent::Finished { cycles: 2 },
        ];
        assert_eq!(drain(&mut rx), expected);
        assert_eq!(*clicks.lock().unwrap(), vec![(10, 20), (10, 20)]);
    }

    #[tokio::test]
    async fn emits_len_times_cycles_steps_in_input_order() {
        let (engine, _) = recording_engine();
        let mut rx = engine.subscribe();

        let actions = vec![
            Action::Click { x: 1, y: 1 },
            Action::Click { x: 2, y: 2 },
            Action::Sleep { seconds: 0.001 },
        ];
        let outcome = engine
            .start(RunRequest::new(&actions, 4, Duration::ZERO))
            .unwrap()
            .wait()
            .await;
        assert_eq!(outcome, RunOutcome::Completed);

        let steps: Vec<Action> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                RunEvent::Step { action, .. } => Some(action),
                _ => None,
            })
            .collect();
        assert_eq!(steps.len(), actions.len() * 4);
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step, &actions[i % actions.len()]);
        }
    }

    #[tokio::test]
    async fn rejects_empty_action_list_without_events() {
        let (engine, _) = recording_engine();
        let mut rx = engine.subscribe();

        let err = engine
            .start(RunRequest::new(&[], 1, Duration::ZERO))
            .unwrap_err();
        assert_eq!(err, StartError::EmptyActions);
        assert_eq!(engine.status(), RunState::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn rejects_zero_cycles() {
        let (engine, _) = recording_engine();
        let err = engine
            .start(RunRequest::new(
                &[Action::Click { x: 1, y: 1 }],
                0,
                Duration::ZERO,
            ))
            .unwrap_err();
        assert_eq!(err, StartError::ZeroCycles);
        assert_eq!(engine.status(), RunState::Idle);
    }

    #[tokio::test]
    async fn rejects_invalid_actions_at_the_boundary() {
        let (engine, _) = recording_engine();
        let err = engine
            .start(RunRequest::new(
                &[Action::Sleep { seconds: 0.0 }],
                1,
                Duration::ZERO,
            ))
            .unwrap_err();
        assert!(matches!(err, StartError::InvalidAction { index: 0, .. }));
        assert_eq!(engine.status(), RunState::Idle);
    }

    #[tokio::test]
    async fn rejects_concurrent_start_without_disturbing_the_active_run() {
        let (engine, _) = recording_engine();
        let mut rx = engine.subscribe();

        let mut handle = engine
            .start(RunRequest::new(
                &[Action::Sleep { seconds: 0.2 }],
                1,
                Duration::ZERO,
            ))
            .unwrap();
        assert_eq!(engine.status(), RunState::Running);

        let err = engine
            .start(RunRequest::new(
                &[Action::Click { x: 9, y: 9 }],
                1,
                Duration::ZERO,
            ))
            .unwrap_err();
        assert_eq!(err, StartError::AlreadyRunning);

        assert_eq!(handle.wait().await, RunOutcome::Completed);
        // The active run kept its full step/finished sequence, nothing more.
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RunEvent::Step { cycle: 1, .. }));
        assert_eq!(events[1], RunEvent::Finished { cycles: 1 });
    }

    #[tokio::test]
    async fn cancel_stops_a_run_mid_sleep() {
        let (engine, _) = recording_engine();
        let mut rx = engine.subscribe();

        let mut handle = engine
            .start(RunRequest::new(
                &[Action::Sleep { seconds: 30.0 }],
                1,
                Duration::ZERO,
            ))
            .unwrap();

        // Let the worker get into the sleep before cancelling.
        sleep(Duration::from_millis(50)).await;
        handle.cancel();
        assert_eq!(handle.wait().await, RunOutcome::Cancelled);
        assert_eq!(engine.status(), RunState::Idle);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RunEvent::Step { cycle: 1, .. }));
        assert_eq!(events[1], RunEvent::Cancelled { cycle: 1 });
    }

    #[tokio::test]
    async fn driver_failure_aborts_with_an_explicit_event() {
        let driver = RecordingDriver {
            fail_on: Some(0),
            ..RecordingDriver::default()
        };
        let engine = Engine::new(Box::new(driver));
        let mut rx = engine.subscribe();

        let outcome = engine
            .start(RunRequest::new(
                &[Action::Click { x: 3, y: 4 }],
                3,
                Duration::ZERO,
            ))
            .unwrap()
            .wait()
            .await;
        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(engine.status(), RunState::Idle);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], RunEvent::Step { cycle: 1, .. }));
        assert_eq!(events[1], RunEvent::Marker { x: 3, y: 4 });
        assert!(matches!(events[2], RunEvent::Failed { cycle: 1, .. }));

        // The engine is idle again and accepts a new run.
        let mut handle = engine
            .start(RunRequest::new(
                &[Action::Sleep { seconds: 0.001 }],
                1,
                Duration::ZERO,
            ))
            .unwrap();
        assert_eq!(handle.wait().await, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn lagging_consumer_loses_the_oldest_events() {
        let (engine, _) = recording_engine();
        let mut rx = engine.subscribe();

        // 90 clicks emit 3 events each, plus the finished event: 271 > 256.
        let actions: Vec<Action> = (0..90).map(|i| Action::Click { x: i, y: i }).collect();
        let outcome = engine
            .start(RunRequest::new(&actions, 1, Duration::ZERO))
            .unwrap()
            .wait()
            .await;
        assert_eq!(outcome, RunOutcome::Completed);

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
        let remaining = drain(&mut rx);
        assert_eq!(remaining.len(), EVENT_CAPACITY);
        assert_eq!(remaining.last(), Some(&RunEvent::Finished { cycles: 1 }));
    }
}
