//! Domain services for the greenspace backend.
//!
//! This crate holds the business logic: tree, cluster, sensor, vehicle,
//! region, image and watering plan services, the telemetry ingestion
//! pipeline, route orchestration and the plugin registry. Services share
//! one [`Store`](greenspace_store::Store) and one
//! [`EventBus`](greenspace_events::EventBus).
//!
//! # Architecture
//!
//! ```text
//!   MQTT ──► SensorService ──► NewSensorData ─┬─► TreeSubscriber ──► UpdateTree
//!                                             └─► ClusterSubscriber
//!   TreeService ──► CreateTree / UpdateTree / DeleteTree ──► ClusterSubscriber
//!   PlanService ──► UpdateWateringPlan ──► ClusterSubscriber
//!   ClusterSubscriber ──► UpdateTreeCluster
//! ```
//!
//! Every service writes inside one storage transaction and publishes its
//! events only after that transaction committed. Events raised by the
//! handlers go through the bus's follow-up lane.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use greenspace_control::{spawn_subscribers, ControlConfig, Services, TreeRequest};
//! use greenspace_events::EventBus;
//! use greenspace_store::RocksStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/greenspace")?);
//! let bus = Arc::new(EventBus::with_all_types());
//! let cancel = CancellationToken::new();
//!
//! let services = Services::new(store, Arc::clone(&bus), ControlConfig::default());
//! let dispatcher = Arc::clone(&bus);
//! let token = cancel.clone();
//! tokio::spawn(async move { dispatcher.run(token).await });
//! spawn_subscribers(&bus, &services, &cancel);
//!
//! let tree = services.trees.create(TreeRequest::new("A-17", 2023, 54.79, 9.43)).await?;
//! println!("Created tree {}", tree.id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cluster;
pub mod image;
pub mod lifecycle;
pub mod locator;
pub mod plan;
pub mod plugin;
pub mod region;
pub mod route;
pub mod sensor;
pub mod subscribers;
pub mod tree;
pub mod types;
pub mod vehicle;

use std::sync::Arc;

use greenspace_events::{Event, EventBus};
use greenspace_store::Store;

pub use cluster::ClusterService;
pub use image::ImageService;
pub use plan::PlanService;
pub use plugin::PluginRegistry;
pub use region::RegionService;
pub use route::RouteService;
pub use sensor::SensorService;
pub use subscribers::{spawn_subscribers, ClusterSubscriber, TreeSubscriber};
pub use tree::TreeService;
pub use types::{
    ClusterRequest, ControlConfig, CreatePlanRequest, ImageRequest, Plugin, PluginAuth,
    RouteRequest, TreeRequest, UpdatePlanRequest, VehicleRequest,
};
pub use vehicle::VehicleService;

/// The store-backed services, sharing one store and one bus.
pub struct Services<S: Store> {
    /// Trees.
    pub trees: Arc<TreeService<S>>,
    /// Tree clusters.
    pub clusters: Arc<ClusterService<S>>,
    /// Sensors and the ingestion pipeline.
    pub sensors: Arc<SensorService<S>>,
    /// Watering plans.
    pub plans: Arc<PlanService<S>>,
    /// Vehicles.
    pub vehicles: Arc<VehicleService<S>>,
    /// Regions.
    pub regions: Arc<RegionService<S>>,
    /// Images.
    pub images: Arc<ImageService<S>>,
}

impl<S: Store> Services<S> {
    /// Build every service on `store` and `bus`.
    #[must_use]
    pub fn new(store: Arc<S>, bus: Arc<EventBus>, config: ControlConfig) -> Self {
        Self {
            trees: Arc::new(TreeService::new(Arc::clone(&store), Arc::clone(&bus))),
            clusters: Arc::new(ClusterService::new(Arc::clone(&store), Arc::clone(&bus))),
            sensors: Arc::new(SensorService::new(Arc::clone(&store), Arc::clone(&bus), config)),
            plans: Arc::new(PlanService::new(Arc::clone(&store), bus)),
            vehicles: Arc::new(VehicleService::new(Arc::clone(&store))),
            regions: Arc::new(RegionService::new(Arc::clone(&store))),
            images: Arc::new(ImageService::new(store)),
        }
    }
}

/// Publish after commit. A failed publish is logged; the write stands.
pub(crate) async fn publish(bus: &EventBus, event: Event) {
    let event_type = event.event_type();
    if let Err(e) = bus.publish(event).await {
        tracing::warn!(%event_type, error = %e, "Failed to publish event");
    }
}

/// Publish from inside an event handler. Never waits on the bus intake.
pub(crate) fn publish_follow_up(bus: &EventBus, event: Event) {
    let event_type = event.event_type();
    if let Err(e) = bus.publish_follow_up(event) {
        tracing::warn!(%event_type, error = %e, "Failed to publish follow-up event");
    }
}
