//! ---
//! drover_section: "06-engine"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "The activity runner: motors, limiter, and live retuning."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::ActivityError;
use drover_config::{ActivitySpec, ConfigMap, ListenerId};
use drover_motor::{CycleSource, Motor, SharedLimiter, SlotTracker, Tally, TallyView};
use drover_op::{OpDispenser, OpExecutor, OpTemplate};
use drover_rate::{RateLimiter, RateSpec, Verb};

/// Parameter key carrying the activity's rate spec string.
pub const FIELD_RATE: &str = "rate";

struct MotorHandle {
    slot: Arc<SlotTracker>,
    stop: Arc<AtomicBool>,
    errors: Arc<AtomicU64>,
    thread: JoinHandle<()>,
}

/// Owns everything one activity needs to run: the parameter map (through
/// its [`ActivitySpec`] view), the op dispenser, the optional rate limiter,
/// the shared cycle source, and the motor threads.
///
/// Construction validates everything that can fail: cycle range, thread
/// spec, rate spec, and dispenser construction all surface errors before a
/// single thread exists. After [`start`](Self::start), a parameter-map
/// listener retunes the running activity in place: a new `rate` value is
/// applied to the limiter, and a new `threads` value grows or shrinks the
/// motor pool.
pub struct ActivityRunner {
    weak_self: Weak<Self>,
    spec: ActivitySpec,
    dispenser: Arc<OpDispenser>,
    executor: Arc<dyn OpExecutor>,
    limiter: SharedLimiter,
    input: Arc<CycleSource>,
    tally: Arc<Tally>,
    motors: Mutex<Vec<MotorHandle>>,
    retiring: Mutex<Vec<MotorHandle>>,
    listener: Mutex<Option<ListenerId>>,
    next_slot: AtomicUsize,
    started: AtomicBool,
    drained_errors: AtomicU64,
}

impl ActivityRunner {
    /// Validate the configuration and build the runner. No threads are
    /// started; errors here are always early and fatal for the activity.
    pub fn new(
        config: ConfigMap,
        template: &dyn OpTemplate,
        executor: Arc<dyn OpExecutor>,
    ) -> Result<Arc<Self>, ActivityError> {
        let spec = ActivitySpec::new(config);
        let start = spec.start_cycle()?;
        let end = spec.end_cycle()?;
        spec.threads()?;
        let dispenser = Arc::new(OpDispenser::new(template)?);

        let limiter: Option<Arc<RateLimiter>> = match spec.params().get(FIELD_RATE) {
            Some(encoded) => {
                let rate_spec: RateSpec = encoded.parse()?;
                Some(Arc::new(RateLimiter::new(
                    format!("{}-cycles", spec.alias()),
                    rate_spec,
                )))
            }
            None => None,
        };

        info!(
            alias = %spec.alias(),
            cycles = %spec.cycle_summary()?,
            rated = limiter.is_some(),
            "activity runner ready"
        );

        Ok(Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            spec,
            dispenser,
            executor,
            limiter: Arc::new(RwLock::new(limiter)),
            input: Arc::new(CycleSource::new(start, end)),
            tally: Arc::new(Tally::new()),
            motors: Mutex::new(Vec::new()),
            retiring: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
            next_slot: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            drained_errors: AtomicU64::new(0),
        }))
    }

    /// Spawn the motor pool and begin reacting to parameter changes.
    pub fn start(&self) -> Result<(), ActivityError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ActivityError::AlreadyStarted(self.spec.alias()));
        }
        let threads = self.spec.threads()?;
        info!(alias = %self.spec.alias(), threads, "starting motors");
        {
            let mut motors = self.motors.lock();
            for _ in 0..threads {
                motors.push(self.spawn_motor());
            }
        }

        let weak = self.weak_self.clone();
        let id = self.spec.params().add_listener(move |map| {
            if let Some(runner) = weak.upgrade() {
                runner.on_config_change(map);
            }
        });
        *self.listener.lock() = Some(id);
        Ok(())
    }

    /// Request cooperative stop on every motor, wake limiter waiters, join
    /// all threads, and halt the limiter's refill thread. Idempotent.
    pub fn stop(&self) {
        if let Some(id) = self.listener.lock().take() {
            self.spec.params().remove_listener(id);
        }

        let mut handles: Vec<MotorHandle> = self.motors.lock().drain(..).collect();
        handles.extend(self.retiring.lock().drain(..));
        for handle in &handles {
            handle.stop.store(true, Ordering::Release);
        }
        if let Some(limiter) = self.limiter.read().as_ref() {
            limiter.interrupt_waiters();
        }
        for handle in handles {
            let slot = handle.slot.slot();
            self.drained_errors
                .fetch_add(handle.errors.load(Ordering::Relaxed), Ordering::Relaxed);
            if handle.thread.join().is_err() {
                warn!(slot, "motor thread terminated abnormally");
            }
        }

        let limiter = self.limiter.read().clone();
        if let Some(limiter) = limiter {
            if limiter.is_running() {
                let current = limiter.spec();
                match RateSpec::with_verb(current.ops_per_sec(), current.burst_ratio(), Verb::Stop)
                {
                    Ok(halt) => limiter.apply_rate_spec(halt),
                    Err(err) => warn!(error = %err, "could not halt rate limiter"),
                }
            }
        }
        info!(alias = %self.spec.alias(), "activity stopped");
    }

    /// Wait until every motor has reached a terminal state, or the timeout
    /// passes. Check [`TallyView::timed_out`] and the `Errored` count on
    /// the returned view. Only meaningful after [`start`](Self::start).
    pub fn await_completion(&self, timeout: Duration) -> TallyView {
        self.tally.wait_until(|view| view.live() == 0, timeout)
    }

    /// The activity's alias.
    pub fn alias(&self) -> String {
        self.spec.alias()
    }

    /// The activity's typed parameter view.
    pub fn spec(&self) -> &ActivitySpec {
        &self.spec
    }

    /// The shared lifecycle tally.
    pub fn tally(&self) -> Arc<Tally> {
        self.tally.clone()
    }

    /// The rate limiter, when the activity is rated.
    pub fn limiter(&self) -> Option<Arc<RateLimiter>> {
        self.limiter.read().clone()
    }

    /// Motors currently intended to be running.
    pub fn motor_count(&self) -> usize {
        self.motors.lock().len()
    }

    /// Total executor-reported failures across all motors, past and present.
    pub fn op_errors(&self) -> u64 {
        let live: u64 = self
            .motors
            .lock()
            .iter()
            .chain(self.retiring.lock().iter())
            .map(|h| h.errors.load(Ordering::Relaxed))
            .sum();
        self.drained_errors.load(Ordering::Relaxed) + live
    }

    fn spawn_motor(&self) -> MotorHandle {
        let slot_id = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(SlotTracker::new(slot_id, self.tally.clone()));
        let motor = Motor::new(
            slot.clone(),
            self.input.clone(),
            self.dispenser.clone(),
            self.limiter.clone(),
            self.executor.clone(),
        );
        let stop = motor.stop_flag();
        let errors = motor.op_errors();
        let thread = std::thread::Builder::new()
            .name(format!("{}-motor-{}", self.spec.alias(), slot_id))
            .spawn(move || motor.run())
            .unwrap_or_else(|err| panic!("unable to spawn motor thread: {err}"));
        MotorHandle {
            slot,
            stop,
            errors,
            thread,
        }
    }

    // Runs on the mutating thread, synchronously with the parameter change.
    fn on_config_change(&self, map: &ConfigMap) {
        if let Some(encoded) = map.get(FIELD_RATE) {
            match encoded.parse::<RateSpec>() {
                Ok(rate_spec) => self.apply_rate(rate_spec),
                Err(err) => warn!(alias = %self.spec.alias(), error = %err, "ignoring bad rate parameter"),
            }
        }
        match self.spec.threads() {
            Ok(desired) => self.rescale(desired),
            Err(err) => warn!(alias = %self.spec.alias(), error = %err, "ignoring bad threads parameter"),
        }
    }

    fn apply_rate(&self, rate_spec: RateSpec) {
        let mut slot = self.limiter.write();
        match slot.as_ref() {
            Some(limiter) => {
                let current = limiter.spec();
                if rate_spec == current && rate_spec.verb() == current.verb() {
                    debug!(alias = %self.spec.alias(), "rate parameter unchanged");
                    return;
                }
                limiter.apply_rate_spec(rate_spec);
            }
            None => {
                info!(alias = %self.spec.alias(), spec = %rate_spec, "installing rate limiter");
                *slot = Some(Arc::new(RateLimiter::new(
                    format!("{}-cycles", self.spec.alias()),
                    rate_spec,
                )));
            }
        }
    }

    fn rescale(&self, desired: usize) {
        let mut motors = self.motors.lock();
        let current = motors.len();
        if desired == current {
            return;
        }
        if desired > current {
            info!(alias = %self.spec.alias(), from = current, to = desired, "growing motor pool");
            for _ in current..desired {
                motors.push(self.spawn_motor());
            }
        } else {
            info!(alias = %self.spec.alias(), from = current, to = desired, "shrinking motor pool");
            let mut retiring = self.retiring.lock();
            while motors.len() > desired {
                if let Some(handle) = motors.pop() {
                    handle.stop.store(true, Ordering::Release);
                    retiring.push(handle);
                }
            }
            if let Some(limiter) = self.limiter.read().as_ref() {
                limiter.interrupt_waiters();
            }
        }
    }
}
