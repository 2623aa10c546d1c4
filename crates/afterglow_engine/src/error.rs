//! Engine-wide error type
//!
//! Every fallible operation in the crate returns [`EngineResult`]. Callers that
//! need to tell a transient device condition apart from a setup bug ask the
//! error for its [`ErrorKind`] instead of matching on individual variants.

use ash::vk;
use thiserror::Error;

use crate::config::ConfigError;

/// How the caller is expected to react to an [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programmer or setup error, or an unrecoverable device failure. Log and exit.
    Fatal,
    /// Transient condition, skip the current frame and try again on the next one.
    Retryable,
}

/// Errors produced by the render graph, framebuffer management and resource pools
#[derive(Error, Debug)]
pub enum EngineError {
    /// Raw Vulkan API failure
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// An operation was called out of order or with invalid arguments
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of the violation
        reason: String,
    },

    /// A subpass name could not be resolved inside a subpass graph
    #[error("Unknown subpass: {0}")]
    UnknownSubpass(String),

    /// A pass name could not be resolved by the pass manager
    #[error("Unknown pass: {0}")]
    UnknownPass(String),

    /// Extent query that does not match the pass extent mode
    #[error("Extent mode mismatch on pass {pass}: {reason}")]
    ExtentMode {
        /// Name of the pass
        pass: String,
        /// What was attempted
        reason: String,
    },

    /// The swapchain no longer matches the surface and has been rebuilt
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    /// Asset could not be imported or decoded
    #[error("Asset error: {0}")]
    Asset(String),

    /// Model cache file is malformed or was used in the wrong mode
    #[error("Model cache error ({path}): {reason}")]
    Cache {
        /// Cache file path
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SwapchainOutOfDate | Self::Api(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                ErrorKind::Retryable
            }
            _ => ErrorKind::Fatal,
        }
    }

    /// Shorthand for `kind() == ErrorKind::Retryable`
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }
}

impl From<vk::Result> for EngineError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Result alias used throughout the crate
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_date_is_retryable() {
        assert!(EngineError::SwapchainOutOfDate.is_retryable());
        assert!(EngineError::Api(vk::Result::ERROR_OUT_OF_DATE_KHR).is_retryable());
    }

    #[test]
    fn test_setup_errors_are_fatal() {
        assert_eq!(EngineError::UnknownPass("Bloom0".into()).kind(), ErrorKind::Fatal);
        assert_eq!(EngineError::Api(vk::Result::ERROR_DEVICE_LOST).kind(), ErrorKind::Fatal);
        assert_eq!(EngineError::invalid("draw before begin").kind(), ErrorKind::Fatal);
    }
}
