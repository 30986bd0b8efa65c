//! Route planning for greenspace watering runs.
//!
//! A route is produced in two stages:
//!
//! 1. [`OptimizationClient`] asks a VROOM-compatible solver for the order in
//!    which a vehicle should load water and visit the tree clusters.
//! 2. A [`Router`] ([`OrsRouter`] or [`ValhallaRouter`]) turns the ordered
//!    stops into GeoJSON, GPX or a distance/duration summary.
//!
//! [`RoutePlanner`] combines both behind [`RoutingRepository`]. Generated GPX
//! files are kept in a [`GpxBucket`].
//!
//! # Example
//!
//! ```no_run
//! use greenspace_routing::{
//!     OptimizationClient, OrsRouter, RouteEndpoints, RoutePlanner, RoutingRepository,
//! };
//!
//! # async fn example(
//! #     vehicle: greenspace_store::Vehicle,
//! #     clusters: Vec<greenspace_store::TreeCluster>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let planner = RoutePlanner::new(
//!     OptimizationClient::new("http://localhost:3000"),
//!     OrsRouter::new("http://localhost:8080/ors"),
//!     RouteEndpoints {
//!         start_point: [9.43, 54.77],
//!         end_point: [9.43, 54.77],
//!         watering_point: [9.44, 54.78],
//!     },
//! );
//!
//! let info = planner.generate_route_information(&vehicle, &clusters).await?;
//! println!("{} refills, {:.0} m", info.refills, info.distance);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bucket;
pub mod error;
pub mod gpx;
pub mod optimizer;
pub mod ors;
pub mod planner;
pub mod router;
pub mod types;
pub mod valhalla;

pub use bucket::{FsBucket, GpxBucket};
pub use error::{Result, RoutingError};
pub use optimizer::{OptimizationClient, OptimizationRequest};
pub use ors::OrsRouter;
pub use planner::{DisabledRouting, RoutePlanner, RoutingRepository};
pub use router::Router;
pub use types::{GeoJson, LonLat, RouteEndpoints, RouteMetadata, RouteSummary};
pub use valhalla::ValhallaRouter;

#[cfg(any(test, feature = "test-utils"))]
pub use bucket::MemoryBucket;
#[cfg(any(test, feature = "test-utils"))]
pub use router::MockRouter;
