use service_core::error::AppError;
use thiserror::Error;

/// Failures of the relationship state machine, the credential vault and the
/// session authenticator. Every variant except `StoreUnavailable` is terminal
/// for the current operation.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("A member cannot target themselves")]
    InvalidTarget,

    #[error("This member already belongs to your friends")]
    AlreadyFriends,

    #[error("A friend request is already pending")]
    AlreadyPending,

    #[error("No pending friend request from this member")]
    NotPending,

    #[error("This member is not your friend")]
    NotFriends,

    #[error("Access to this member is blocked")]
    AccessBlocked,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Member is denied access")]
    Denied,

    #[error("Invalid token")]
    Invalid,

    #[error("Request forgery check failed")]
    Forbidden,

    #[error("Store unavailable")]
    StoreUnavailable,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Corrupt stored entry: {0}")]
    Corrupt(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Only transient infrastructure failures may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::StoreUnavailable)
    }

    /// Stable machine-readable kind, used in logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidTarget => "invalid_target",
            ServiceError::AlreadyFriends => "already_friends",
            ServiceError::AlreadyPending => "already_pending",
            ServiceError::NotPending => "not_pending",
            ServiceError::NotFriends => "not_friends",
            ServiceError::AccessBlocked => "access_blocked",
            ServiceError::AuthenticationFailed => "authentication_failed",
            ServiceError::Denied => "denied",
            ServiceError::Invalid => "invalid",
            ServiceError::Forbidden => "forbidden",
            ServiceError::StoreUnavailable => "store_unavailable",
            ServiceError::ValidationError(_) => "validation",
            ServiceError::Corrupt(_) => "corrupt",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                tracing::warn!(error = %err, "Relational store unavailable");
                ServiceError::StoreUnavailable
            }
            other => ServiceError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_timeout() || err.is_connection_dropped() {
            tracing::warn!(error = %err, "Redis unavailable");
            ServiceError::StoreUnavailable
        } else {
            ServiceError::Internal(anyhow::Error::new(err))
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::InvalidTarget => AppError::BadRequest(anyhow::anyhow!(message)),
            ServiceError::AlreadyFriends | ServiceError::AlreadyPending => {
                AppError::Conflict(anyhow::anyhow!(message))
            }
            ServiceError::NotPending => AppError::NotFound(anyhow::anyhow!(message)),
            ServiceError::NotFriends => AppError::Conflict(anyhow::anyhow!(message)),
            ServiceError::AccessBlocked | ServiceError::Denied | ServiceError::Forbidden => {
                AppError::Forbidden(anyhow::anyhow!(message))
            }
            ServiceError::AuthenticationFailed => AppError::AuthError(anyhow::anyhow!(message)),
            ServiceError::Invalid => AppError::Unauthorized(anyhow::anyhow!(message)),
            ServiceError::StoreUnavailable => AppError::ServiceUnavailable,
            ServiceError::ValidationError(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::Corrupt(e) => AppError::InternalError(anyhow::anyhow!(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
