//! Error types shared by the podchaos controllers.

use thiserror::Error;

/// Result type alias for controller operations.
pub type ChaosResult<T> = Result<T, ChaosError>;

/// Failures a controller operation can surface to its caller.
///
/// Bad readiness threshold overrides and process termination failures are
/// recovered inside the controllers and never appear here.
#[derive(Debug, Error)]
pub enum ChaosError {
    /// Rejected input; no state was changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operating system refused a request (e.g. process spawn).
    #[error("system error: {0}")]
    SystemError(String),
}

impl ChaosError {
    /// Whether the caller is to blame (as opposed to the host).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChaosError::InvalidArgument(_))
    }
}

impl From<std::io::Error> for ChaosError {
    fn from(e: std::io::Error) -> Self {
        ChaosError::SystemError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_is_client_error() {
        assert!(ChaosError::InvalidArgument("x".into()).is_client_error());
        assert!(!ChaosError::SystemError("x".into()).is_client_error());
    }

    #[test]
    fn io_error_maps_to_system_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "stress: not found");
        let err: ChaosError = io.into();
        assert!(matches!(err, ChaosError::SystemError(_)));
        assert_eq!(err.to_string(), "system error: stress: not found");
    }
}
