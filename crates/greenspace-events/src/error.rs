//! Event bus error types.

use greenspace_core::ServiceError;
use thiserror::Error;

use crate::event::EventType;
use crate::SubscriptionId;

/// A result type using `EventError`.
pub type Result<T> = std::result::Result<T, EventError>;

/// Errors raised by the event bus.
#[derive(Debug, Error)]
pub enum EventError {
    /// The event type was not declared when the bus was built.
    #[error("unknown event type: {0}")]
    UnknownEventType(EventType),

    /// No subscription with this id exists for the event type.
    #[error("subscription {id} not found for {event_type}")]
    NotSubscribed {
        /// The event type.
        event_type: EventType,
        /// The subscription id.
        id: SubscriptionId,
    },

    /// `run` was called while another dispatcher owns the intake.
    #[error("event bus dispatcher already running")]
    AlreadyRunning,

    /// The dispatcher has stopped and no longer accepts events.
    #[error("event bus closed")]
    Closed,

    /// A subscriber's handler failed.
    #[error("subscriber {subscriber} failed: {source}")]
    Handler {
        /// The subscriber name.
        subscriber: &'static str,
        /// The handler error.
        #[source]
        source: ServiceError,
    },
}

impl From<EventError> for ServiceError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Handler { source, .. } => source,
            other => Self::internal(other.to_string()),
        }
    }
}
