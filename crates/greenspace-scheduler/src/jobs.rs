//! The maintenance jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use greenspace_control::{PlanService, SensorService};
use greenspace_core::{Result, SensorStatus, ServiceError, WateringPlanStatus};
use greenspace_store::Store;

use crate::runner::Job;

// ============================================================================
// Stale sensors
// ============================================================================

/// Demotes sensors that stopped reporting to `offline`.
pub struct StaleSensorJob<S: Store> {
    sensors: Arc<SensorService<S>>,
    cutoff: Duration,
}

impl<S: Store> StaleSensorJob<S> {
    /// Create the job. Sensors whose latest reading is older than `cutoff`
    /// are demoted.
    #[must_use]
    pub fn new(sensors: Arc<SensorService<S>>, cutoff: Duration) -> Self {
        Self { sensors, cutoff }
    }
}

#[async_trait]
impl<S: Store> Job for StaleSensorJob<S> {
    fn name(&self) -> &'static str {
        "stale-sensors"
    }

    async fn tick(&self) -> Result<usize> {
        let cutoff = TimeDelta::from_std(self.cutoff)
            .map_err(|e| ServiceError::internal(format!("sensor cutoff out of range: {e}")))?;
        let threshold = Utc::now() - cutoff;

        let mut demoted = 0;
        for sensor in self.sensors.get_all().await? {
            if sensor.status == SensorStatus::Offline {
                continue;
            }
            // Never reported: nothing to judge staleness by.
            let Some(latest) = sensor.latest_data else {
                continue;
            };
            if latest.created_at >= threshold {
                continue;
            }
            match self
                .sensors
                .update_status(&sensor.id, SensorStatus::Offline)
                .await
            {
                Ok(_) => {
                    tracing::info!(
                        sensor_id = %sensor.id,
                        last_seen = %latest.created_at,
                        "Sensor marked offline"
                    );
                    demoted += 1;
                }
                Err(e) => {
                    tracing::warn!(sensor_id = %sensor.id, error = %e, "Failed to mark sensor offline");
                }
            }
        }
        Ok(demoted)
    }
}

// ============================================================================
// Overdue watering plans
// ============================================================================

/// Marks planned watering plans whose date has passed as `not_completed`.
pub struct PlanReconcileJob<S: Store> {
    plans: Arc<PlanService<S>>,
}

impl<S: Store> PlanReconcileJob<S> {
    /// Create the job.
    #[must_use]
    pub fn new(plans: Arc<PlanService<S>>) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl<S: Store> Job for PlanReconcileJob<S> {
    fn name(&self) -> &'static str {
        "overdue-plans"
    }

    async fn tick(&self) -> Result<usize> {
        let now = Utc::now();
        let mut updated = 0;
        for plan in self
            .plans
            .get_all_by_status(WateringPlanStatus::Planned)
            .await?
        {
            if plan.date >= now {
                continue;
            }
            match self
                .plans
                .update_status(plan.id, WateringPlanStatus::NotCompleted)
                .await
            {
                Ok(_) => {
                    tracing::info!(plan_id = %plan.id, date = %plan.date, "Watering plan not completed");
                    updated += 1;
                }
                Err(e) => {
                    tracing::warn!(plan_id = %plan.id, error = %e, "Failed to reconcile watering plan");
                }
            }
        }
        Ok(updated)
    }
}
