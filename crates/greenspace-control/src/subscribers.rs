//! Event bus subscribers wiring the services together.
//!
//! | Event                | Subscriber                                  |
//! |----------------------|---------------------------------------------|
//! | `NewSensorData`      | tree status, cluster status                 |
//! | `CreateTree`         | cluster geometry and status                 |
//! | `UpdateTree`         | cluster geometry and status                 |
//! | `DeleteTree`         | cluster geometry and status                 |
//! | `UpdateWateringPlan` | mark clusters and trees watered on finish   |
//!
//! Handler failures are logged and the subscription keeps running.

use std::sync::Arc;

use async_trait::async_trait;
use greenspace_events::{Event, EventBus, EventType, Subscriber};
use greenspace_store::Store;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cluster::ClusterService;
use crate::tree::TreeService;
use crate::Services;

/// Updates a tree's status from its sensor's readings.
pub struct TreeSubscriber<S: Store> {
    trees: Arc<TreeService<S>>,
}

impl<S: Store> TreeSubscriber<S> {
    /// Create the subscriber.
    #[must_use]
    pub fn new(trees: Arc<TreeService<S>>) -> Self {
        Self { trees }
    }
}

#[async_trait]
impl<S: Store> Subscriber for TreeSubscriber<S> {
    fn name(&self) -> &'static str {
        "tree-sensor-data"
    }

    fn event_type(&self) -> EventType {
        EventType::NewSensorData
    }

    async fn handle(&self, event: &Event) -> greenspace_core::Result<()> {
        if let Event::NewSensorData { new } = event {
            if let Err(e) = self.trees.handle_new_sensor_data(new).await {
                tracing::error!(subscriber = self.name(), sensor_id = %new.sensor_id, error = %e, "Handler failed");
            }
        }
        Ok(())
    }
}

/// Keeps one aspect of the clusters current. One instance per event type.
pub struct ClusterSubscriber<S: Store> {
    clusters: Arc<ClusterService<S>>,
    event_type: EventType,
}

impl<S: Store> ClusterSubscriber<S> {
    /// Event types a cluster subscriber can consume.
    pub const EVENT_TYPES: [EventType; 5] = [
        EventType::CreateTree,
        EventType::UpdateTree,
        EventType::DeleteTree,
        EventType::NewSensorData,
        EventType::UpdateWateringPlan,
    ];

    /// Create the subscriber for `event_type`.
    #[must_use]
    pub fn new(clusters: Arc<ClusterService<S>>, event_type: EventType) -> Self {
        Self {
            clusters,
            event_type,
        }
    }
}

#[async_trait]
impl<S: Store> Subscriber for ClusterSubscriber<S> {
    fn name(&self) -> &'static str {
        match self.event_type {
            EventType::CreateTree => "cluster-create-tree",
            EventType::UpdateTree => "cluster-update-tree",
            EventType::DeleteTree => "cluster-delete-tree",
            EventType::NewSensorData => "cluster-sensor-data",
            EventType::UpdateWateringPlan => "cluster-watering-plan",
            EventType::UpdateTreeCluster => "cluster-unused",
        }
    }

    fn event_type(&self) -> EventType {
        self.event_type
    }

    async fn handle(&self, event: &Event) -> greenspace_core::Result<()> {
        let result = match event {
            Event::CreateTree { new } => self.clusters.handle_create_tree(new).await,
            Event::UpdateTree { prev, new } => self.clusters.handle_update_tree(prev, new).await,
            Event::DeleteTree { prev } => self.clusters.handle_delete_tree(prev).await,
            Event::NewSensorData { new } => self.clusters.handle_new_sensor_data(new).await,
            Event::UpdateWateringPlan { prev, new } => {
                self.clusters.handle_update_watering_plan(prev, new).await
            }
            Event::UpdateTreeCluster { .. } => Ok(()),
        };
        if let Err(e) = result {
            tracing::error!(
                subscriber = self.name(),
                event_type = %event.event_type(),
                error = %e,
                "Handler failed"
            );
        }
        Ok(())
    }
}

/// Spawn one task per subscription. Each task ends when `cancel` fires or
/// the bus shuts down.
pub fn spawn_subscribers<S: Store>(
    bus: &Arc<EventBus>,
    services: &Services<S>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut subscribers: Vec<Arc<dyn Subscriber>> =
        vec![Arc::new(TreeSubscriber::new(Arc::clone(&services.trees)))];
    subscribers.extend(ClusterSubscriber::<S>::EVENT_TYPES.into_iter().map(|event_type| {
        Arc::new(ClusterSubscriber::new(Arc::clone(&services.clusters), event_type))
            as Arc<dyn Subscriber>
    }));

    subscribers
        .into_iter()
        .map(|subscriber| {
            let bus = Arc::clone(bus);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = bus.run_subscription(cancel, subscriber.as_ref()).await {
                    tracing::error!(subscriber = subscriber.name(), error = %e, "Subscription ended");
                }
            })
        })
        .collect()
}
