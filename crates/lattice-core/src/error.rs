use crate::shape::Shape;

/// All errors that can occur within Lattice.
///
/// Device translation, runtime services, variable-tree routing and trace
/// capture share this one enum so `?` works across crate boundaries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The runtime exposes no devices for this platform.
    #[error("no devices found for platform '{platform}'")]
    PlatformNotFound { platform: String },

    /// A buffer names a device that the runtime does not expose.
    #[error("device '{device}' is not known to this runtime")]
    DeviceNotFound { device: String },

    /// The platform exists but has fewer devices than the requested index.
    #[error("device index {index} out of range for platform '{platform}' ({available} available)")]
    DeviceIndexOutOfRange {
        platform: String,
        index: usize,
        available: usize,
    },

    /// The index part of a device identifier is not a non-negative integer.
    #[error("invalid device index in '{device}': {source}")]
    InvalidDeviceIndex {
        device: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// A supplied variable tree lacks the entry for a child that owns variables.
    #[error(
        "variables passed to Sequential must have key chains in the form of \
         \"submodules/v{{i}}\", where {{i}} is the child index; missing \"submodules/v{index}\""
    )]
    MissingSubmoduleVariables { index: usize },

    /// Shape mismatch between two arrays.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Concrete data was requested from a traced placeholder.
    #[error("traced array of shape {shape} has no concrete value during {op}")]
    TracedValue { op: &'static str, shape: Shape },

    /// Trace capture was started twice or stopped without being started.
    #[error("trace capture: {0}")]
    Trace(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Whether this error means "the runtime has no such platform".
    pub fn is_platform_not_found(&self) -> bool {
        matches!(self, Error::PlatformNotFound { .. })
    }
}

/// Convenience Result type used throughout Lattice.
pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_submodule_message_names_key_chain() {
        let msg = Error::MissingSubmoduleVariables { index: 3 }.to_string();
        assert!(msg.contains("submodules/v{i}"));
        assert!(msg.contains("submodules/v3"));
    }

    #[test]
    fn test_invalid_index_keeps_source() {
        let source = "x".parse::<usize>().unwrap_err();
        let err = Error::InvalidDeviceIndex {
            device: "gpu:x".into(),
            source,
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("invalid device index in 'gpu:x'"));
    }
}
