//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Intervals and cutoffs of the maintenance jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between stale-sensor sweeps.
    #[serde(default = "SchedulerConfig::default_sensor_interval")]
    pub sensor_interval_seconds: u64,

    /// Age of the latest reading after which a sensor counts as offline.
    #[serde(default = "SchedulerConfig::default_sensor_cutoff")]
    pub sensor_cutoff_seconds: u64,

    /// Seconds between watering plan reconciliations.
    #[serde(default = "SchedulerConfig::default_plan_interval")]
    pub plan_interval_seconds: u64,
}

impl SchedulerConfig {
    const fn default_sensor_interval() -> u64 {
        3600
    }

    const fn default_sensor_cutoff() -> u64 {
        72 * 3600
    }

    const fn default_plan_interval() -> u64 {
        3600
    }

    /// Stale-sensor sweep interval.
    #[must_use]
    pub const fn sensor_interval(&self) -> Duration {
        Duration::from_secs(self.sensor_interval_seconds)
    }

    /// Stale-sensor cutoff.
    #[must_use]
    pub const fn sensor_cutoff(&self) -> Duration {
        Duration::from_secs(self.sensor_cutoff_seconds)
    }

    /// Plan reconciliation interval.
    #[must_use]
    pub const fn plan_interval(&self) -> Duration {
        Duration::from_secs(self.plan_interval_seconds)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sensor_interval_seconds: Self::default_sensor_interval(),
            sensor_cutoff_seconds: Self::default_sensor_cutoff(),
            plan_interval_seconds: Self::default_plan_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.sensor_cutoff(), Duration::from_secs(259_200));
        assert_eq!(config.sensor_interval(), Duration::from_secs(3600));
        assert_eq!(config.plan_interval(), Duration::from_secs(3600));
    }
}
