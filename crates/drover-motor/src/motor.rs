//! ---
//! drover_section: "05-motor-runtime"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "The per-thread dispense/block/execute motor loop."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, trace, warn};

use drover_op::{OpDispenser, OpExecutor};
use drover_rate::RateLimiter;

use crate::input::CycleSource;
use crate::slot::SlotTracker;
use crate::state::RunState;

/// Rate limiter slot shared by all motors of an activity. `None` means the
/// activity runs unrated; a controller may install or swap a limiter while
/// motors are live.
pub type SharedLimiter = Arc<RwLock<Option<Arc<RateLimiter>>>>;

/// One activity thread: pulls cycles, synthesizes operations, paces on the
/// rate limiter, and hands operations to the executor.
///
/// Per cycle the order is fixed: dispense, then block on the limiter, then
/// execute. The limiter is the loop's only suspension point; the motor's
/// stop flag is passed into it so a stop request unblocks the wait as a
/// spurious, tickless wakeup, re-checked right after the limiter returns.
/// Executor failures are logged and
/// counted; they never abort this motor or its siblings. A panic out of
/// the loop body marks the slot `Errored`.
pub struct Motor {
    slot: Arc<SlotTracker>,
    input: Arc<CycleSource>,
    dispenser: Arc<OpDispenser>,
    limiter: SharedLimiter,
    executor: Arc<dyn OpExecutor>,
    stop: Arc<AtomicBool>,
    op_errors: Arc<AtomicU64>,
}

impl Motor {
    /// Assemble a motor around its shared collaborators.
    pub fn new(
        slot: Arc<SlotTracker>,
        input: Arc<CycleSource>,
        dispenser: Arc<OpDispenser>,
        limiter: SharedLimiter,
        executor: Arc<dyn OpExecutor>,
    ) -> Self {
        Self {
            slot,
            input,
            dispenser,
            limiter,
            executor,
            stop: Arc::new(AtomicBool::new(false)),
            op_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The flag a controller raises to request cooperative stop.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Running count of executor-reported failures.
    pub fn op_errors(&self) -> Arc<AtomicU64> {
        self.op_errors.clone()
    }

    /// Run the motor to a terminal state. This is the thread's entire body.
    pub fn run(self) {
        if let Err(err) = self
            .slot
            .enter_state(RunState::Starting)
            .and_then(|_| self.slot.enter_state(RunState::Running))
        {
            error!(slot = self.slot.slot(), error = %err, "motor failed to start");
            let _ = self.slot.enter_state(RunState::Errored);
            return;
        }

        match catch_unwind(AssertUnwindSafe(|| self.run_cycles())) {
            Ok(terminal) => {
                if let Err(err) = self.slot.enter_state(terminal) {
                    error!(slot = self.slot.slot(), error = %err, "motor exit transition failed");
                }
                debug!(slot = self.slot.slot(), state = %terminal, "motor exited");
            }
            Err(_) => {
                error!(slot = self.slot.slot(), "motor panicked, marking slot errored");
                let _ = self.slot.enter_state(RunState::Errored);
            }
        }
    }

    fn run_cycles(&self) -> RunState {
        loop {
            if self.stop.load(Ordering::Acquire) {
                let _ = self.slot.enter_state(RunState::Stopping);
                return RunState::Stopped;
            }

            let Some(cycle) = self.input.next_cycle() else {
                return RunState::Finished;
            };
            let op = self.dispenser.dispense(cycle);

            let limiter = self.limiter.read().clone();
            if let Some(limiter) = limiter {
                limiter.block(&self.stop);
                if self.stop.load(Ordering::Acquire) {
                    let _ = self.slot.enter_state(RunState::Stopping);
                    return RunState::Stopped;
                }
            }

            match self.executor.execute(&op) {
                Ok(service_time) => {
                    trace!(
                        slot = self.slot.slot(),
                        cycle,
                        service_micros = service_time.as_micros() as u64,
                        "op complete"
                    );
                }
                Err(err) => {
                    self.op_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(slot = self.slot.slot(), cycle, error = %err, "op failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::Tally;
    use drover_op::{MapOpTemplate, NoopExecutor, OpExecError, Operation, FIELD_OP_TYPE};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn send_dispenser() -> Arc<OpDispenser> {
        let tpl = MapOpTemplate::builder()
            .with_static(FIELD_OP_TYPE, "send")
            .with_static("msg_type", "telemetry")
            .with_dynamic("msg_body", |cycle| format!("body-{cycle}"))
            .build();
        Arc::new(OpDispenser::new(&tpl).unwrap())
    }

    fn unrated() -> SharedLimiter {
        Arc::new(RwLock::new(None))
    }

    struct Recorder {
        cycles: Mutex<Vec<u64>>,
    }

    impl OpExecutor for Recorder {
        fn execute(&self, op: &Operation) -> Result<Duration, OpExecError> {
            self.cycles.lock().push(op.cycle);
            Ok(Duration::from_micros(1))
        }
    }

    struct FailEven;

    impl OpExecutor for FailEven {
        fn execute(&self, op: &Operation) -> Result<Duration, OpExecError> {
            if op.cycle % 2 == 0 {
                Err(OpExecError::new("even cycles are unlucky"))
            } else {
                Ok(Duration::ZERO)
            }
        }
    }

    #[test]
    fn motor_finishes_its_range() {
        let tally = Arc::new(Tally::new());
        let slot = Arc::new(SlotTracker::new(0, tally.clone()));
        let recorder = Arc::new(Recorder {
            cycles: Mutex::new(Vec::new()),
        });
        let motor = Motor::new(
            slot.clone(),
            Arc::new(CycleSource::new(0, 25)),
            send_dispenser(),
            unrated(),
            recorder.clone(),
        );
        motor.run();

        assert_eq!(slot.state(), RunState::Finished);
        assert_eq!(tally.count(RunState::Finished), 1);
        let cycles = recorder.cycles.lock();
        assert_eq!(cycles.len(), 25);
        // Single motor: assignment is in claim order.
        assert_eq!(*cycles, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn stop_request_wins_over_remaining_cycles() {
        let tally = Arc::new(Tally::new());
        let slot = Arc::new(SlotTracker::new(0, tally.clone()));
        let motor = Motor::new(
            slot.clone(),
            Arc::new(CycleSource::new(0, u64::MAX)),
            send_dispenser(),
            unrated(),
            Arc::new(NoopExecutor),
        );
        let stop = motor.stop_flag();
        let handle = std::thread::spawn(move || motor.run());
        std::thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Release);
        handle.join().unwrap();

        assert_eq!(slot.state(), RunState::Stopped);
        assert_eq!(tally.count(RunState::Stopped), 1);
    }

    #[test]
    fn executor_failures_are_counted_not_fatal() {
        let tally = Arc::new(Tally::new());
        let slot = Arc::new(SlotTracker::new(0, tally));
        let motor = Motor::new(
            slot.clone(),
            Arc::new(CycleSource::new(0, 10)),
            send_dispenser(),
            unrated(),
            Arc::new(FailEven),
        );
        let errors = motor.op_errors();
        motor.run();

        assert_eq!(slot.state(), RunState::Finished);
        assert_eq!(errors.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn panic_in_executor_marks_slot_errored() {
        struct Bomb;
        impl OpExecutor for Bomb {
            fn execute(&self, _op: &Operation) -> Result<Duration, OpExecError> {
                panic!("boom");
            }
        }
        let tally = Arc::new(Tally::new());
        let slot = Arc::new(SlotTracker::new(0, tally.clone()));
        let motor = Motor::new(
            slot.clone(),
            Arc::new(CycleSource::new(0, 3)),
            send_dispenser(),
            unrated(),
            Arc::new(Bomb),
        );
        motor.run();
        assert_eq!(slot.state(), RunState::Errored);
        assert_eq!(tally.count(RunState::Errored), 1);
    }
}
