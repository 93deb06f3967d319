//! ---
//! drover_section: "07-testing-qa"
//! drover_subsection: "integration-tests"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Live rate and thread retuning against a running activity."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use drover_config::ConfigMap;
use drover_engine::{ActivityRunner, FIELD_RATE};
use drover_motor::RunState;
use drover_op::{MapOpTemplate, NoopExecutor, FIELD_OP_TYPE};
use drover_rate::Verb;

fn open_ended_config(alias: &str, extra: &str) -> ConfigMap {
    ConfigMap::parse_params(&format!(
        "alias={alias};cycles=0..1000000000;threads=2;{extra}"
    ))
    .expect("valid params")
}

fn send_template() -> MapOpTemplate {
    MapOpTemplate::builder()
        .with_static(FIELD_OP_TYPE, "send")
        .with_dynamic("msg_body", |cycle| cycle.to_string())
        .build()
}

#[test]
fn rate_retarget_lands_while_motors_run() {
    let config = open_ended_config("retarget", "rate=500,1.1,start;");
    let runner = ActivityRunner::new(config.clone(), &send_template(), Arc::new(NoopExecutor))
        .expect("valid activity");
    runner.start().expect("first start");

    let limiter = runner.limiter().expect("rated activity");
    assert!(limiter.is_running());
    assert_eq!(limiter.spec().ops_per_sec(), 500.0);

    std::thread::sleep(Duration::from_millis(50));
    config.set(FIELD_RATE, "2000,1.5,configure");

    // The listener runs synchronously with the mutation, so the new spec is
    // already in force here.
    let spec = limiter.spec();
    assert_eq!(spec.ops_per_sec(), 2000.0);
    assert_eq!(spec.burst_ratio(), 1.5);
    assert!(limiter.is_running(), "configure keeps a running filler running");

    runner.stop();
    assert!(!limiter.is_running());
}

#[test]
fn stop_verb_halts_pacing_and_checkpoints_debt() {
    let config = open_ended_config("halting", "rate=500,1.0,start;");
    let runner = ActivityRunner::new(config.clone(), &send_template(), Arc::new(NoopExecutor))
        .expect("valid activity");
    runner.start().expect("first start");
    let limiter = runner.limiter().expect("rated activity");

    std::thread::sleep(Duration::from_millis(50));
    config.set(FIELD_RATE, "500,1.0,stop");
    assert!(!limiter.is_running());
    assert_eq!(limiter.spec().verb(), Verb::Stop);
    // Live debt was folded into the cumulative total at the checkpoint.
    assert!(limiter.total_wait_time() >= limiter.wait_time());

    runner.stop();
}

#[test]
fn thread_rescale_grows_and_shrinks_a_rated_pool() {
    let config = open_ended_config("elastic", "rate=1000,1.1,start;");
    let runner = ActivityRunner::new(config.clone(), &send_template(), Arc::new(NoopExecutor))
        .expect("valid activity");
    runner.start().expect("first start");
    assert_eq!(runner.motor_count(), 2);

    config.set("threads", "6");
    assert_eq!(runner.motor_count(), 6);

    config.set("threads", "3");
    assert_eq!(runner.motor_count(), 3);

    // Surplus motors wind down cooperatively even while rate limited.
    let tally = runner.tally();
    let view = tally.wait_until(
        |v| v.count(RunState::Stopped) == 3,
        Duration::from_secs(10),
    );
    assert!(!view.timed_out(), "retired motors should reach Stopped");

    runner.stop();
}

#[test]
fn await_completion_reports_deadline_expiry() {
    let config = open_ended_config("patience", "");
    let runner = ActivityRunner::new(config, &send_template(), Arc::new(NoopExecutor))
        .expect("valid activity");
    runner.start().expect("first start");

    let view = runner.await_completion(Duration::from_millis(50));
    assert!(view.timed_out());
    assert!(view.count(RunState::Running) > 0);

    runner.stop();
    let view = runner.await_completion(Duration::from_secs(10));
    assert!(!view.timed_out());
    assert_eq!(view.count(RunState::Stopped), 2);
}
