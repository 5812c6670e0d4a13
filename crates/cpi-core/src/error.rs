//! CPI core error types
//!
//! Service methods wrap whatever failed underneath with a "failed to X"
//! context, so a chain of errors reads like a stack of intents.

use openstack_client::OpenStackError;
use thiserror::Error;

/// Errors raised by the CPI core services
#[derive(Debug, Error)]
pub enum CpiError {
    /// OpenStack call failed
    #[error("{context}: {source}")]
    OpenStack {
        /// What the service was trying to do
        context: String,
        /// Underlying client error
        #[source]
        source: OpenStackError,
    },

    /// A nested core operation failed
    #[error("{context}: {source}")]
    Context {
        /// What the service was trying to do
        context: String,
        /// Underlying core error
        #[source]
        source: Box<CpiError>,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid cloud properties or network settings
    #[error("{0}")]
    Validation(String),

    /// A required resource does not exist
    #[error("{0}")]
    NotFound(String),

    /// More than one resource matched where exactly one is required
    #[error("{0}")]
    Ambiguous(String),

    /// A resource reached a terminal failure state
    #[error("{0}")]
    ResourceState(String),

    /// A wait exceeded its deadline
    #[error("{0}")]
    Timeout(String),

    /// Local I/O error (config file, stemcell tarball)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CpiError {
    /// The OpenStack error at the bottom of the chain, if any
    #[must_use]
    pub fn openstack_source(&self) -> Option<&OpenStackError> {
        match self {
            Self::OpenStack { source, .. } => Some(source),
            Self::Context { source, .. } => source.openstack_source(),
            _ => None,
        }
    }

    /// True when the chain ends in an HTTP 404
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Context { source, .. } => source.is_not_found(),
            _ => self.openstack_source().is_some_and(OpenStackError::is_not_found),
        }
    }

    /// True when the chain ends in a timeout while waiting
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Context { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Conversion of lower-level errors into a contextual `CpiError`
pub trait IntoCpiError {
    /// Wrap `self` under `context`
    fn into_cpi_error(self, context: String) -> CpiError;
}

impl IntoCpiError for OpenStackError {
    fn into_cpi_error(self, context: String) -> CpiError {
        CpiError::OpenStack {
            context,
            source: self,
        }
    }
}

impl IntoCpiError for CpiError {
    fn into_cpi_error(self, context: String) -> CpiError {
        CpiError::Context {
            context,
            source: Box::new(self),
        }
    }
}

/// `anyhow`-style context helpers for results of client and core calls
pub trait ResultExt<T> {
    /// Wrap the error with a fixed context
    fn context(self, context: impl Into<String>) -> Result<T, CpiError>;

    /// Wrap the error with a lazily built context
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T, CpiError>;
}

impl<T, E: IntoCpiError> ResultExt<T> for Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T, CpiError> {
        self.map_err(|e| e.into_cpi_error(context.into()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T, CpiError> {
        self.map_err(|e| e.into_cpi_error(f()))
    }
}
