//! Domain-specific error types for isolation backend operations.
//!
//! Typed errors enable callers to match on specific failure modes
//! rather than parsing error message strings.

use std::time::Duration;

/// Errors that can occur while talking to an isolation backend.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The isolation backend could not be reached (or is disabled).
    #[error("execution unavailable: {message}")]
    Unavailable {
        /// Why the backend is unavailable.
        message: String,
    },

    /// Container image was not found.
    #[error("Container image not found: {image}")]
    ImageNotFound {
        /// Image reference that could not be resolved.
        image: String,
    },

    /// Execution exceeded the configured timeout.
    #[error("Timeout: execution exceeded {timeout:?}")]
    Timeout {
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// The environment crashed or could not be observed while running.
    #[error("Runtime fault: {message}")]
    RuntimeFault {
        /// Description of the fault.
        message: String,
    },

    /// Best-effort teardown of an environment failed.
    #[error("Failed to destroy sandbox {id}: {message}")]
    DestroyFailed {
        /// Identifier of the environment that could not be destroyed.
        id: String,
        /// Backend error text.
        message: String,
    },

    /// Container operation failed (create, start, inspect, etc.).
    #[error("Container operation failed: {message}")]
    ContainerFailed {
        /// Backend error text.
        message: String,
    },
}

impl SandboxError {
    /// Creates an `Unavailable` error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates an `ImageNotFound` error.
    pub fn image_not_found(image: impl Into<String>) -> Self {
        Self::ImageNotFound {
            image: image.into(),
        }
    }

    /// Creates a `Timeout` error from a `Duration`.
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    /// Creates a `RuntimeFault` error.
    pub fn runtime_fault(message: impl Into<String>) -> Self {
        Self::RuntimeFault {
            message: message.into(),
        }
    }

    /// Creates a `DestroyFailed` error.
    pub fn destroy_failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DestroyFailed {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Creates a `ContainerFailed` error.
    pub fn container_failed(message: impl Into<String>) -> Self {
        Self::ContainerFailed {
            message: message.into(),
        }
    }

    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if the backend is unreachable or disabled.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns true if this is an image not found error.
    pub fn is_image_not_found(&self) -> bool {
        matches!(self, Self::ImageNotFound { .. })
    }

    /// Short, stable name of the failure class, used in log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "unavailable",
            Self::ImageNotFound { .. } => "image_not_found",
            Self::Timeout { .. } => "timeout",
            Self::RuntimeFault { .. } => "runtime_fault",
            Self::DestroyFailed { .. } => "cleanup_failure",
            Self::ContainerFailed { .. } => "container_failed",
        }
    }
}
