//! In-process event bus for greenspace.
//!
//! Services publish [`Event`]s after their storage transaction commits;
//! subscribers receive them asynchronously through [`EventBus::subscribe`]
//! or a [`Subscriber`] driven by [`EventBus::run_subscription`].
//!
//! # Delivery
//!
//! - Per subscriber, events arrive in publish order within a lane.
//!   Follow-ups raised by handlers through [`EventBus::publish_follow_up`]
//!   are dispatched ahead of the publisher intake.
//! - Delivery is at most once and best effort. A subscriber that does not
//!   accept an event within [`BusConfig::delivery_timeout`] misses it.
//! - Cancelling the dispatcher closes every subscription channel.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use greenspace_events::{EventBus, EventType};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = Arc::new(EventBus::with_all_types());
//! let cancel = CancellationToken::new();
//!
//! let dispatcher = Arc::clone(&bus);
//! let token = cancel.clone();
//! tokio::spawn(async move { dispatcher.run(token).await });
//!
//! let (_id, mut rx) = bus.subscribe(EventType::UpdateTree).await?;
//! while let Some(event) = rx.recv().await {
//!     println!("{:?}", event.event_type());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bus;
pub mod error;
pub mod event;
pub mod subscriber;

pub use bus::{BusConfig, EventBus, EventReceiver, SubscriptionId};
pub use error::{EventError, Result};
pub use event::{Event, EventType};
pub use subscriber::Subscriber;
