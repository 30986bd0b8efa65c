//! Authentication error types.

use greenspace_core::ServiceError;
use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while talking to the identity provider.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password was rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The token is malformed or was rejected.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The token is well formed but no longer active.
    #[error("token is not active")]
    TokenInactive,

    /// Too many requests.
    #[error("rate limited")]
    RateLimited,

    /// Authentication is switched off.
    #[error("authentication is disabled")]
    Disabled,

    /// The identity provider returned something unexpected.
    #[error("identity provider error: {0}")]
    Provider(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns `true` if retrying the same request may succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Provider(_) | Self::Internal(_)
        )
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidCredentials | Self::InvalidToken(_) | Self::TokenInactive => 401,
            Self::RateLimited => 403,
            Self::Disabled => 410,
            Self::Provider(_) | Self::Internal(_) => 500,
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidToken(_) | AuthError::TokenInactive => {
                Self::unauthorized(message)
            }
            AuthError::RateLimited => Self::forbidden(message),
            AuthError::Disabled => Self::gone(message),
            AuthError::Provider(_) | AuthError::Internal(_) => Self::internal(message),
        }
    }
}
