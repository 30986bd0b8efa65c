//! Periodic maintenance for the greenspace backend.
//!
//! Two jobs run next to the request-driven services:
//!
//! - [`StaleSensorJob`] demotes sensors whose latest reading is older than
//!   a cutoff to `offline`.
//! - [`PlanReconcileJob`] moves `planned` watering plans whose date has
//!   passed to `not_completed`.
//!
//! Each job is driven by [`run_periodic`]: one tick immediately, then one
//! per interval until the cancellation token fires. A failed tick is logged
//! and the loop carries on.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use greenspace_control::{ControlConfig, Services};
//! use greenspace_events::EventBus;
//! use greenspace_scheduler::{Scheduler, SchedulerConfig};
//! use greenspace_store::RocksStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/greenspace")?);
//! let bus = Arc::new(EventBus::with_all_types());
//! let services = Services::new(store, bus, ControlConfig::default());
//!
//! let cancel = CancellationToken::new();
//! let handles = Scheduler::new(&services, SchedulerConfig::default()).spawn(&cancel);
//! cancel.cancel();
//! for handle in handles {
//!     handle.await?;
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod jobs;
mod runner;

use std::sync::Arc;

use greenspace_control::Services;
use greenspace_store::Store;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use config::SchedulerConfig;
pub use jobs::{PlanReconcileJob, StaleSensorJob};
pub use runner::{run_periodic, Job};

/// Both maintenance jobs with their intervals.
pub struct Scheduler<S: Store> {
    config: SchedulerConfig,
    sensors: Arc<StaleSensorJob<S>>,
    plans: Arc<PlanReconcileJob<S>>,
}

impl<S: Store> Scheduler<S> {
    /// Build the jobs on top of `services`.
    #[must_use]
    pub fn new(services: &Services<S>, config: SchedulerConfig) -> Self {
        Self {
            sensors: Arc::new(StaleSensorJob::new(
                Arc::clone(&services.sensors),
                config.sensor_cutoff(),
            )),
            plans: Arc::new(PlanReconcileJob::new(Arc::clone(&services.plans))),
            config,
        }
    }

    /// Spawn one task per job. The tasks end when `cancel` fires.
    #[must_use]
    pub fn spawn(self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let sensors = {
            let job = Arc::clone(&self.sensors);
            let interval = self.config.sensor_interval();
            let cancel = cancel.clone();
            tokio::spawn(async move { run_periodic(job.as_ref(), interval, cancel).await })
        };
        let plans = {
            let job = Arc::clone(&self.plans);
            let interval = self.config.plan_interval();
            let cancel = cancel.clone();
            tokio::spawn(async move { run_periodic(job.as_ref(), interval, cancel).await })
        };
        tracing::info!(
            sensor_interval_secs = self.config.sensor_interval_seconds,
            sensor_cutoff_secs = self.config.sensor_cutoff_seconds,
            plan_interval_secs = self.config.plan_interval_seconds,
            "Scheduler started"
        );
        vec![sensors, plans]
    }
}
