//! `RocksDB` storage layer for greenspace.
//!
//! This crate defines the repository contracts the domain services consume
//! and implements them on an embedded transactional `RocksDB`.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `trees`, `trees_by_cluster`, `trees_by_sensor`: tree rows and the
//!   cluster membership and sensor binding indexes
//! - `sensors`, `sensor_data`, `sensor_data_by_sensor`: sensors and readings
//! - `tree_clusters`, `regions`: clusters and region polygons
//! - `vehicles`, `vehicles_by_plate`: vehicles and the unique plate index
//! - `watering_plans`, `plans_by_status`: plans and the status index
//! - `images`: image references
//! - `meta`: identifier sequences
//!
//! # Example
//!
//! ```no_run
//! use greenspace_store::{RocksStore, Store, TreeRepository};
//!
//! let store = RocksStore::open("/tmp/greenspace-db").unwrap();
//! let trees = store.with_tx(|tx| tx.get_all_trees()).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod geometry;
pub mod keys;
pub mod repository;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use repository::{
    ImageRepository, RegionRepository, Repositories, SensorRepository, TreeClusterRepository,
    TreeRepository, VehicleRepository, WateringPlanRepository,
};
pub use rocks::{RocksStore, StoreTx};
pub use types::{
    Image, Region, RegionPlanCount, Sensor, SensorData, Tree, TreeCluster, Vehicle, WateringPlan,
};

/// The storage trait: a transactional source of repositories.
///
/// Reads and writes made through the handle passed to [`Store::with_tx`]
/// commit together when the closure returns `Ok` and roll back otherwise.
pub trait Store: Send + Sync + 'static {
    /// The transaction handle type.
    type Tx<'a>: Repositories;

    /// Run `f` inside a transaction.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a conflict or database error if the
    /// commit fails.
    fn with_tx<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&Self::Tx<'_>) -> std::result::Result<T, E>;
}
