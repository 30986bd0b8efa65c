//! Routing error types.

use greenspace_core::{ServiceError, VehicleType};
use thiserror::Error;

/// A result type using `RoutingError`.
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Errors raised while planning or rendering a route.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The vehicle type has no routing profile.
    #[error("vehicle type not supported: {0}")]
    UnsupportedVehicleType(VehicleType),

    /// None of the requested clusters has a position.
    #[error("no tree cluster with coordinates to route")]
    NoRoutableClusters,

    /// The optimizer returned no route.
    #[error("optimizer returned no route")]
    EmptyRoute,

    /// Routing is switched off.
    #[error("routing is disabled")]
    Disabled,

    /// The shipment optimizer failed.
    #[error("optimizer error: {0}")]
    Optimizer(String),

    /// The turn-by-turn router failed.
    #[error("router error: {0}")]
    Router(String),

    /// The GPX bucket failed.
    #[error("bucket error: {0}")]
    Bucket(String),

    /// The requested object does not exist.
    #[error("object not found: {0}")]
    ObjectNotFound(String),
}

impl RoutingError {
    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Optimizer(_) | Self::Router(_) | Self::Bucket(_))
    }
}

impl From<RoutingError> for ServiceError {
    fn from(err: RoutingError) -> Self {
        let message = err.to_string();
        match err {
            RoutingError::UnsupportedVehicleType(_) | RoutingError::ObjectNotFound(_) => {
                Self::not_found(message)
            }
            RoutingError::NoRoutableClusters => Self::bad_request(message),
            RoutingError::Disabled => Self::gone(message),
            RoutingError::EmptyRoute
            | RoutingError::Optimizer(_)
            | RoutingError::Router(_)
            | RoutingError::Bucket(_) => Self::internal(message),
        }
    }
}
