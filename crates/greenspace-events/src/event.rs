//! Domain events carried by the bus.
//!
//! Every variant carries full snapshots of the affected entity so that a
//! subscriber observes one consistent point in time.

use std::fmt;

use greenspace_store::{SensorData, Tree, TreeCluster, WateringPlan};

/// Discriminant of an [`Event`], used to route subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    /// A tree was created.
    CreateTree,
    /// A tree was updated.
    UpdateTree,
    /// A tree was deleted.
    DeleteTree,
    /// A sensor delivered a new reading.
    NewSensorData,
    /// A tree cluster was recomputed or edited.
    UpdateTreeCluster,
    /// A watering plan changed.
    UpdateWateringPlan,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::CreateTree,
        Self::UpdateTree,
        Self::DeleteTree,
        Self::NewSensorData,
        Self::UpdateTreeCluster,
        Self::UpdateWateringPlan,
    ];

    /// Stable snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateTree => "create_tree",
            Self::UpdateTree => "update_tree",
            Self::DeleteTree => "delete_tree",
            Self::NewSensorData => "new_sensor_data",
            Self::UpdateTreeCluster => "update_tree_cluster",
            Self::UpdateWateringPlan => "update_watering_plan",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain change.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A tree was created.
    CreateTree {
        /// The created tree.
        new: Tree,
    },
    /// A tree was updated.
    UpdateTree {
        /// The tree before the update.
        prev: Tree,
        /// The tree after the update.
        new: Tree,
    },
    /// A tree was deleted.
    DeleteTree {
        /// The tree as it was before deletion.
        prev: Tree,
    },
    /// A sensor delivered a new reading.
    NewSensorData {
        /// The stored reading.
        new: SensorData,
    },
    /// A tree cluster changed.
    UpdateTreeCluster {
        /// The cluster before the change.
        prev: TreeCluster,
        /// The cluster after the change.
        new: TreeCluster,
    },
    /// A watering plan changed.
    UpdateWateringPlan {
        /// The plan before the change.
        prev: WateringPlan,
        /// The plan after the change.
        new: WateringPlan,
    },
}

impl Event {
    /// The routing discriminant of this event.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::CreateTree { .. } => EventType::CreateTree,
            Self::UpdateTree { .. } => EventType::UpdateTree,
            Self::DeleteTree { .. } => EventType::DeleteTree,
            Self::NewSensorData { .. } => EventType::NewSensorData,
            Self::UpdateTreeCluster { .. } => EventType::UpdateTreeCluster,
            Self::UpdateWateringPlan { .. } => EventType::UpdateWateringPlan,
        }
    }
}
