//! ---
//! drover_section: "04-configuration-orchestration"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Typed activity parameter view over a ConfigMap."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use tracing::debug;

use crate::error::ConfigError;
use crate::params::ConfigMap;

/// A runtime definition for an activity.
///
/// `ActivitySpec` is a type-aware wrapper around one [`ConfigMap`], which
/// remains the canonical store for every parameter. Accessors re-parse the
/// live map on every call so that concurrent parameter updates are always
/// visible; nothing is cached here.
#[derive(Clone, Debug)]
pub struct ActivitySpec {
    params: ConfigMap,
}

/// Parameter key for the activity alias.
pub const FIELD_ALIAS: &str = "alias";
/// Parameter key for the cycle range, in `M` or `N..M` form.
pub const FIELD_CYCLES: &str = "cycles";
/// Parameter key for the worker thread count.
pub const FIELD_THREADS: &str = "threads";

/// Alias reported when none has been configured.
pub const DEFAULT_ALIAS: &str = "ALIAS_UNSET";
const DEFAULT_CYCLES: &str = "0";
const DEFAULT_THREADS: usize = 1;
const AUTO_THREADS_PER_CORE: usize = 10;

impl ActivitySpec {
    /// Wrap an existing parameter map.
    pub fn new(params: ConfigMap) -> Self {
        Self { params }
    }

    /// Parse a `key=value;...` encoded definition into a spec.
    pub fn parse(encoded: &str) -> Option<Self> {
        ConfigMap::parse_params(encoded).map(Self::new)
    }

    /// The backing parameter map.
    pub fn params(&self) -> &ConfigMap {
        &self.params
    }

    /// The alias by which the activity is known while running.
    pub fn alias(&self) -> String {
        self.params.get_or(FIELD_ALIAS, DEFAULT_ALIAS)
    }

    /// First cycle of the assigned range, inclusive.
    ///
    /// A bare `M` cycles value implies a start of zero.
    pub fn start_cycle(&self) -> Result<u64, ConfigError> {
        let cycles = self.params.get_or(FIELD_CYCLES, DEFAULT_CYCLES);
        let raw = match cycles.split_once("..") {
            Some((start, _)) => start.to_owned(),
            None => "0".to_owned(),
        };
        parse_cycle_value(&raw)
    }

    /// End cycle of the assigned range, exclusive.
    pub fn end_cycle(&self) -> Result<u64, ConfigError> {
        let cycles = self.params.get_or(FIELD_CYCLES, DEFAULT_CYCLES);
        let raw = match cycles.split_once("..") {
            Some((_, end)) => end.to_owned(),
            None => cycles,
        };
        parse_cycle_value(&raw)
    }

    /// Number of cycles in the assigned range.
    pub fn cycle_count(&self) -> Result<u64, ConfigError> {
        Ok(self.end_cycle()?.saturating_sub(self.start_cycle()?))
    }

    /// Render the range as `[start..end)=count`.
    pub fn cycle_summary(&self) -> Result<String, ConfigError> {
        Ok(format!(
            "[{}..{})={}",
            self.start_cycle()?,
            self.end_cycle()?,
            self.cycle_count()?
        ))
    }

    /// Replace the cycle range. `"M"` is shorthand for `"0..M"`.
    ///
    /// The `start < end` invariant is re-checked on every mutation.
    pub fn set_cycles(&self, cycles: &str) -> Result<(), ConfigError> {
        self.params.set(FIELD_CYCLES, cycles);
        self.check_invariants()
    }

    /// Replace only the start cycle.
    pub fn set_start_cycle(&self, start: u64) -> Result<(), ConfigError> {
        let end = self.end_cycle()?;
        self.params.set(FIELD_CYCLES, format!("{start}..{end}"));
        self.check_invariants()
    }

    /// Replace only the end cycle.
    pub fn set_end_cycle(&self, end: u64) -> Result<(), ConfigError> {
        let start = self.start_cycle()?;
        self.params.set(FIELD_CYCLES, format!("{start}..{end}"));
        self.check_invariants()
    }

    /// Target worker thread count.
    ///
    /// Accepts a positive integer literal, `auto` (ten workers per hardware
    /// core, capped at the cycle count), or `<N>x` (N workers per core).
    pub fn threads(&self) -> Result<usize, ConfigError> {
        let spec = match self.params.get(FIELD_THREADS) {
            None => return Ok(DEFAULT_THREADS),
            Some(spec) => spec,
        };
        let trimmed = spec.trim();

        if trimmed.eq_ignore_ascii_case("auto") {
            let auto = cores() * AUTO_THREADS_PER_CORE;
            let cap = usize::try_from(self.cycle_count()?).unwrap_or(usize::MAX);
            let threads = auto.min(cap).max(1);
            debug!(threads, "auto-sized thread count");
            return Ok(threads);
        }

        if let Some(per_core) = trimmed.strip_suffix(['x', 'X']) {
            let n: usize = per_core.trim().parse().map_err(|_| invalid_threads(trimmed))?;
            if n == 0 {
                return Err(invalid_threads(trimmed));
            }
            return Ok(n * cores());
        }

        let literal: usize = trimmed.parse().map_err(|_| invalid_threads(trimmed))?;
        if literal == 0 {
            return Err(invalid_threads(trimmed));
        }
        Ok(literal)
    }

    /// Replace the worker thread count.
    pub fn set_threads(&self, threads: usize) {
        self.params.set(FIELD_THREADS, threads);
    }

    fn check_invariants(&self) -> Result<(), ConfigError> {
        let start = self.start_cycle()?;
        let end = self.end_cycle()?;
        if start >= end {
            return Err(ConfigError::BadCycleRange { start, end });
        }
        Ok(())
    }
}

fn parse_cycle_value(raw: &str) -> Result<u64, ConfigError> {
    drover_common::long_count_for(raw).ok_or_else(|| ConfigError::Parse {
        key: FIELD_CYCLES.to_owned(),
        value: raw.to_owned(),
        wanted: "cycle count",
    })
}

fn invalid_threads(spec: &str) -> ConfigError {
    ConfigError::InvalidThreads {
        spec: spec.to_owned(),
    }
}

fn cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
