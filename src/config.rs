//! Pipeline configuration and profiles.
//!
//! This module provides:
//! - [`PipelineConfig`]: buffer capacity, item target, thread counts, flavor
//! - [`PipelineProfile`]: named presets (the paced demo, unpaced testing)
//! - [`ConfigLoader`]: layered loading (profile + env + overrides)
//!
//! Configuration is read once before the pipeline starts and never changes
//! afterwards.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ConfigError;
use crate::payload::PayloadRng;
use crate::sync::SemaphoreFlavor;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SEMPIPE_";

/// Sleep schedule applied by workers before each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Fixed pause before each producer step.
    pub producer: Duration,
    /// Shortest pause before a consumer step.
    pub consumer_min: Duration,
    /// Longest pause before a consumer step.
    pub consumer_max: Duration,
}

impl Pacing {
    /// No pauses at all.
    pub const NONE: Self = Self {
        producer: Duration::ZERO,
        consumer_min: Duration::ZERO,
        consumer_max: Duration::ZERO,
    };

    /// Returns true if workers never sleep.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.producer.is_zero() && self.consumer_max.is_zero()
    }

    /// Picks a consumer pause, uniform at millisecond granularity.
    pub fn consumer_pause(&self, rng: &mut PayloadRng) -> Duration {
        let min = millis(self.consumer_min);
        let max = millis(self.consumer_max);
        if max <= min {
            return self.consumer_min;
        }
        Duration::from_millis(min + rng.next_below(max - min + 1))
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            producer: Duration::from_secs(1),
            consumer_min: Duration::from_secs(1),
            consumer_max: Duration::from_secs(3),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Everything the coordinator needs to run a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of slots in the circular buffer.
    pub capacity: usize,
    /// Items to consume before shutting down.
    pub target: usize,
    /// Producer thread count.
    pub producers: usize,
    /// Consumer thread count.
    pub consumers: usize,
    /// Semaphore implementation for `empty`, `full` and the role locks.
    pub flavor: SemaphoreFlavor,
    /// Worker sleep schedule.
    pub pacing: Pacing,
    /// Payload seed. `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            target: 32,
            producers: 2,
            consumers: 4,
            flavor: SemaphoreFlavor::LockFree,
            pacing: Pacing::default(),
            seed: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a config from a named profile.
    #[must_use]
    pub fn from_profile(profile: PipelineProfile) -> Self {
        match profile {
            PipelineProfile::Demo => Self::default(),
            PipelineProfile::Testing => Self {
                pacing: Pacing::NONE,
                seed: Some(0x5E3A_F00D),
                ..Self::default()
            },
        }
    }

    /// Sets the buffer capacity.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the number of items to consume.
    #[must_use]
    pub fn target(mut self, target: usize) -> Self {
        self.target = target;
        self
    }

    /// Sets the producer and consumer thread counts.
    #[must_use]
    pub fn workers(mut self, producers: usize, consumers: usize) -> Self {
        self.producers = producers;
        self.consumers = consumers;
        self
    }

    /// Sets the semaphore flavor.
    #[must_use]
    pub fn flavor(mut self, flavor: SemaphoreFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Sets the pacing.
    #[must_use]
    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Sets a fixed payload seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Returns the payload seed, drawing one from the clock and storing it
    /// first if none was configured. Later calls return the same value, so
    /// one logged seed reproduces the whole run.
    pub fn resolve_seed(&mut self) -> u64 {
        *self
            .seed
            .get_or_insert_with(|| PayloadRng::from_clock().next_u64())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.producers == 0 {
            return Err(ConfigError::NoProducers);
        }
        if self.consumers == 0 {
            return Err(ConfigError::NoConsumers);
        }
        if self.pacing.consumer_min > self.pacing.consumer_max {
            return Err(ConfigError::InvalidPauseRange {
                min_ms: self.pacing.consumer_min.as_millis(),
                max_ms: self.pacing.consumer_max.as_millis(),
            });
        }
        Ok(())
    }
}

/// Named configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineProfile {
    /// Paced run with the classic 16-slot, 32-item, 2x4 layout.
    #[default]
    Demo,
    /// Same layout, no pauses, fixed seed.
    Testing,
}

/// Layered configuration loader.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    profile: PipelineProfile,
    read_env: bool,
    overrides: BTreeMap<String, String>,
}

impl ConfigLoader {
    /// Creates a loader with the default profile.
    #[must_use]
    pub fn new() -> Self {
        Self {
            profile: PipelineProfile::default(),
            read_env: true,
            overrides: BTreeMap::new(),
        }
    }

    /// Sets the base profile.
    #[must_use]
    pub fn profile(mut self, profile: PipelineProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Skips `SEMPIPE_*` environment variables.
    #[must_use]
    pub fn ignore_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    /// Adds a programmatic override (highest precedence).
    #[must_use]
    pub fn override_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Loads configuration with precedence:
    /// 1. Profile defaults (lowest)
    /// 2. Environment variables
    /// 3. Programmatic overrides (highest)
    pub fn load(&self) -> Result<PipelineConfig, ConfigError> {
        let mut config = PipelineConfig::from_profile(self.profile);
        if self.read_env {
            let from_env: BTreeMap<_, _> = std::env::vars()
                .filter(|(key, _)| key.starts_with(ENV_PREFIX))
                .collect();
            apply_overrides(&mut config, &from_env)?;
        }
        apply_overrides(&mut config, &self.overrides)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_overrides(
    config: &mut PipelineConfig,
    overrides: &BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    for (key, value) in overrides {
        apply_override(config, key, value)?;
    }
    Ok(())
}

fn apply_override(config: &mut PipelineConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        "SEMPIPE_CAPACITY" => config.capacity = parse_usize(value, key)?,
        "SEMPIPE_TARGET" => config.target = parse_usize(value, key)?,
        "SEMPIPE_PRODUCERS" => config.producers = parse_usize(value, key)?,
        "SEMPIPE_CONSUMERS" => config.consumers = parse_usize(value, key)?,
        "SEMPIPE_FLAVOR" => {
            config.flavor = value
                .parse()
                .map_err(|err| ConfigError::Parse(format!("{key}: {err}")))?;
        }
        "SEMPIPE_SEED" => config.seed = Some(parse_u64(value, key)?),
        "SEMPIPE_PRODUCER_PAUSE_MS" => config.pacing.producer = parse_duration_ms(value, key)?,
        "SEMPIPE_CONSUMER_PAUSE_MIN_MS" => {
            config.pacing.consumer_min = parse_duration_ms(value, key)?;
        }
        "SEMPIPE_CONSUMER_PAUSE_MAX_MS" => {
            config.pacing.consumer_max = parse_duration_ms(value, key)?;
        }
        _ => return Err(ConfigError::InvalidOverride(key.to_string())),
    }
    Ok(())
}

fn parse_usize(value: &str, key: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Parse(format!("invalid integer for {key}: {value}")))
}

fn parse_u64(value: &str, key: &str) -> Result<u64, ConfigError> {
    let trimmed = value.trim();
    let parsed = match trimmed.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|_| ConfigError::Parse(format!("invalid integer for {key}: {value}")))
}

fn parse_duration_ms(value: &str, key: &str) -> Result<Duration, ConfigError> {
    parse_u64(value, key).map(Duration::from_millis)
}
