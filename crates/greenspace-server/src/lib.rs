//! Composition root for the greenspace backend.
//!
//! Loads the YAML configuration, installs tracing, opens the database and
//! runs every long-lived task under one cancellation token:
//!
//! ```text
//!   MQTT broker ──► MqttIngress ──► SensorService
//!                                        │
//!   EventBus::run ◄──────────────────────┘
//!        │
//!        ├──► subscriber tasks (trees, clusters)
//!   Scheduler (stale sensors, overdue plans)
//!   PluginRegistry::start_cleanup
//!   HTTP: GET /health, GET /ready
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod config;
pub mod health;
pub mod mqtt;
pub mod telemetry;

pub use app::{App, AppError};
pub use config::{Config, ConfigError};
