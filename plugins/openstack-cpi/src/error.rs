//! Method-level errors
//!
//! Each variant maps onto one error type of the CPI protocol.

use crate::rpc::Response;
use cpi_core::CpiError;
use thiserror::Error;

/// Errors returned by CPI methods
#[derive(Debug, Error)]
pub enum MethodError {
    /// Unknown method
    #[error("Method '{0}' is not implemented")]
    NotImplemented(String),

    /// Arguments could not be parsed
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// VM does not exist
    #[error("VM '{0}' not found")]
    VmNotFound(String),

    /// Disk does not exist
    #[error("Disk '{0}' not found")]
    DiskNotFound(String),

    /// Server was created but could not be completed; it has been cleaned up
    #[error("{0}")]
    VmCreationFailed(String),

    /// Any other failure
    #[error(transparent)]
    Cloud(#[from] CpiError),
}

impl MethodError {
    /// Error type reported to the director
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotImplemented(_) => "Bosh::Clouds::NotImplemented",
            Self::InvalidArguments(_) => "Bosh::Clouds::CpiError",
            Self::VmNotFound(_) => "Bosh::Clouds::VMNotFound",
            Self::DiskNotFound(_) => "Bosh::Clouds::DiskNotFound",
            Self::VmCreationFailed(_) => "Bosh::Clouds::VMCreationFailed",
            Self::Cloud(_) => "Bosh::Clouds::CloudError",
        }
    }

    /// Whether the director may retry the call
    pub fn ok_to_retry(&self) -> bool {
        matches!(self, Self::VmCreationFailed(_))
    }

    /// Error response envelope for this failure
    pub fn to_response(&self) -> Response {
        Response::error(self.error_type(), self.to_string(), self.ok_to_retry())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types() {
        let err = MethodError::VmCreationFailed("server 'vm-1' did not join pool 'web'".to_string());
        let response = err.to_response();
        let error = response.error.unwrap();
        assert_eq!(error.error_type, "Bosh::Clouds::VMCreationFailed");
        assert!(error.ok_to_retry);

        let err = MethodError::from(CpiError::Timeout("timeout while waiting for volume 'v' to become available".to_string()));
        assert_eq!(err.error_type(), "Bosh::Clouds::CloudError");
        assert!(!err.ok_to_retry());
        assert_eq!(err.to_string(), "timeout while waiting for volume 'v' to become available");
    }
}
