//! ---
//! drover_section: "02-rate-limiting"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Rate limiter specification value object and grammar."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use std::str::FromStr;

use strum::{Display, EnumString};
use tracing::debug;

use crate::error::RateSpecError;

/// Default burst ratio applied when the spec string omits one.
pub const DEFAULT_BURST_RATIO: f64 = 1.1;

/// Lifecycle verb carried by a rate spec.
///
/// A rate spec is the event carrier for applying changes to a running
/// limiter, so the verb selects how the change takes effect rather than
/// only what the new rate is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Default)]
#[strum(serialize_all = "lowercase")]
pub enum Verb {
    /// Apply the configuration without affecting running/stopped state.
    Configure,
    /// Apply the configuration and ensure the limiter is running.
    #[default]
    Start,
    /// Re-initialize as if started for the first time, zeroing accumulated
    /// wait time.
    Restart,
    /// Halt the refill process, checkpointing accumulated debt.
    Stop,
}

/// Resolution of one tick of time accounting inside the limiter.
///
/// The unit is chosen per rate so that the tick cost of one operation, plus
/// 100% burst headroom, stays comfortably within a signed 32-bit range.
/// Very low rates would otherwise need per-op tick counts that overflow at
/// nanosecond resolution (0.01 ops/s is 10^11 nanoseconds per op).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TickUnit {
    /// Nanosecond ticks, for rates above 1 op/s.
    #[strum(serialize = "ns")]
    Nanos,
    /// Microsecond ticks, for rates above 0.001 op/s.
    #[strum(serialize = "us")]
    Micros,
    /// Millisecond ticks, for rates above 0.000001 op/s.
    #[strum(serialize = "ms")]
    Millis,
    /// Second ticks, for anything slower.
    #[strum(serialize = "s")]
    Seconds,
}

impl TickUnit {
    /// Select the coarsest unit that still resolves the given rate.
    pub fn for_rate(ops_per_sec: f64) -> Self {
        if ops_per_sec > 1.0 {
            TickUnit::Nanos
        } else if ops_per_sec > 0.001 {
            TickUnit::Micros
        } else if ops_per_sec > 0.000_001 {
            TickUnit::Millis
        } else {
            TickUnit::Seconds
        }
    }

    /// Ticks in one second at this resolution.
    pub fn ticks_per_second(&self) -> u64 {
        match self {
            TickUnit::Nanos => 1_000_000_000,
            TickUnit::Micros => 1_000_000,
            TickUnit::Millis => 1_000,
            TickUnit::Seconds => 1,
        }
    }

    /// Convert elapsed wall nanoseconds into ticks at this resolution.
    pub fn nanos_to_ticks(&self, nanos: u64) -> u64 {
        match self {
            TickUnit::Nanos => nanos,
            TickUnit::Micros => nanos / 1_000,
            TickUnit::Millis => nanos / 1_000_000,
            TickUnit::Seconds => nanos / 1_000_000_000,
        }
    }

    /// Convert ticks at this resolution back into nanoseconds.
    pub fn ticks_to_nanos(&self, ticks: u64) -> u128 {
        match self {
            TickUnit::Nanos => ticks as u128,
            TickUnit::Micros => ticks as u128 * 1_000,
            TickUnit::Millis => ticks as u128 * 1_000_000,
            TickUnit::Seconds => ticks as u128 * 1_000_000_000,
        }
    }
}

/// Immutable-per-instance rate limiter specification.
///
/// Parsed from the `rate[,burstRatio[,verb]]` grammar, e.g. `"5000"`,
/// `"5000,1.2"`, `"5000,1.2,restart"`. Separators `,`, `:` and `;` are
/// interchangeable. The rate accepts SI-suffixed counts (`"5k"`).
///
/// Equality compares only the rate and burst ratio: the verb describes how a
/// spec is applied, not what the limiter converges to, and the tick unit is
/// derived from the rate. This is what makes repeated `configure`
/// applications of an unchanged spec a no-op.
#[derive(Debug, Clone)]
pub struct RateSpec {
    ops_per_sec: f64,
    burst_ratio: f64,
    verb: Verb,
    unit: TickUnit,
}

impl RateSpec {
    /// Build a spec with the default verb (`start`).
    pub fn new(ops_per_sec: f64, burst_ratio: f64) -> Result<Self, RateSpecError> {
        Self::with_verb(ops_per_sec, burst_ratio, Verb::default())
    }

    /// Build a fully-specified spec.
    ///
    /// A burst ratio below 1.0 is a fatal configuration error. A rate of
    /// exactly zero is accepted but yields undefined (infinite-wait)
    /// behavior, which is logged at the point of application.
    pub fn with_verb(ops_per_sec: f64, burst_ratio: f64, verb: Verb) -> Result<Self, RateSpecError> {
        if ops_per_sec < 0.0 {
            return Err(RateSpecError::NegativeRate(ops_per_sec));
        }
        if burst_ratio < 1.0 {
            return Err(RateSpecError::InvalidBurstRatio(burst_ratio));
        }
        Ok(Self {
            ops_per_sec,
            burst_ratio,
            verb,
            unit: TickUnit::for_rate(ops_per_sec),
        })
    }

    /// Target rate in operations per second.
    pub fn ops_per_sec(&self) -> f64 {
        self.ops_per_sec
    }

    /// Multiplier over nominal rate allowed while paying down debt.
    pub fn burst_ratio(&self) -> f64 {
        self.burst_ratio
    }

    /// Lifecycle verb carried by this spec.
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Tick resolution chosen for this rate.
    pub fn unit(&self) -> TickUnit {
        self.unit
    }

    /// Tick cost of admitting one operation.
    ///
    /// `1 time-unit / opsPerSec`, truncated. A zero rate saturates to
    /// `i32::MAX` ticks, which in practice never becomes available.
    pub fn ticks_per_op(&self) -> u32 {
        if self.ops_per_sec <= 0.0 {
            return i32::MAX as u32;
        }
        let ticks = self.unit.ticks_per_second() as f64 / self.ops_per_sec;
        if ticks >= i32::MAX as f64 {
            i32::MAX as u32
        } else {
            ticks as u32
        }
    }

    /// Whether applying this spec should leave the limiter running.
    pub fn is_auto_start(&self) -> bool {
        matches!(self.verb, Verb::Start | Verb::Restart)
    }

    /// Whether applying this spec re-initializes accumulated state.
    pub fn is_restart(&self) -> bool {
        self.verb == Verb::Restart
    }
}

impl PartialEq for RateSpec {
    fn eq(&self, other: &Self) -> bool {
        self.ops_per_sec == other.ops_per_sec && self.burst_ratio == other.burst_ratio
    }
}

impl FromStr for RateSpec {
    type Err = RateSpecError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = spec
            .split(|c| matches!(c, ',' | ':' | ';'))
            .map(str::trim)
            .collect();

        let mut verb = Verb::default();
        let mut burst_ratio = DEFAULT_BURST_RATIO;

        match parts.len() {
            3 => {
                verb = Verb::from_str(&parts[2].to_ascii_lowercase())
                    .map_err(|_| RateSpecError::UnknownVerb(parts[2].to_owned()))?;
                debug!(%verb, "selected rate limiter verb");
                burst_ratio = parse_burst(parts[1], spec)?;
            }
            2 => {
                burst_ratio = parse_burst(parts[1], spec)?;
            }
            1 => {}
            _ => return Err(RateSpecError::Unparsable(spec.to_owned())),
        }

        let ops_per_sec = drover_common::double_count_for(parts[0])
            .ok_or_else(|| RateSpecError::Unparsable(spec.to_owned()))?;

        Self::with_verb(ops_per_sec, burst_ratio, verb)
    }
}

fn parse_burst(raw: &str, whole: &str) -> Result<f64, RateSpecError> {
    let burst: f64 = raw
        .parse()
        .map_err(|_| RateSpecError::Unparsable(whole.to_owned()))?;
    if burst < 1.0 {
        return Err(RateSpecError::InvalidBurstRatio(burst));
    }
    Ok(burst)
}

impl std::fmt::Display for RateSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{ rate:{}, burstRatio:{:.3}, unit:{}, verb:{} }}",
            self.ops_per_sec, self.burst_ratio, self.unit, self.verb
        )
    }
}
