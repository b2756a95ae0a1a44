use http::StatusCode;
use thiserror::Error;

/// Errors surfaced by the orchestration core.
///
/// Every variant has a fixed HTTP mapping so route handlers can translate a failure
/// without inspecting its contents: `NotFound` is 404, input/state problems are 400,
/// everything that went wrong on our side or in a collaborator is 500.
#[derive(Debug, Error)]
pub enum Error {
    /// An application, vacancy, credential, document or transaction does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The requested action is not allowed in the application's current lifecycle state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Malformed or incomplete input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A credential of this type has already been issued and claimed for the application.
    #[error("already issued: {0}")]
    AlreadyIssued(String),

    /// A wallet-submitted payload could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The Verifier, Issuer or signing provider failed or was unreachable.
    #[error("{service} unavailable")]
    ExternalService {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    /// Unexpected internal failure (store, serialization, ...).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// The HTTP status code a route handler should respond with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_)
            | Self::Validation(_)
            | Self::AlreadyIssued(_)
            | Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::ExternalService { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            Error::NotFound("application".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::InvalidTransition("SIGNED -> CREATED".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::AlreadyIssued("employee id".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::ExternalService {
                service: "verifier".into(),
                source: anyhow::anyhow!("connection refused"),
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
