//! Error types for armada-jupyter

use thiserror::Error;

/// Main error type for translation and submission
///
/// Translation variants are raised while a YAML document is turned into
/// submission objects and always abort the whole batch. The remaining
/// variants come from the file system, the Armada client, or the event watch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Timeout string is not `<integer>s`, `<integer>m` or `<integer>h`
    #[error("invalid timeout '{value}': must be in the form of [x]h, [x]m or [x]s")]
    InvalidTimeoutFormat {
        /// The rejected input
        value: String,
    },

    /// Both an NVIDIA and an AMD accelerator count were requested
    #[error("nvidia_gpu and amd_gpu are mutually exclusive")]
    ConflictingAccelerators,

    /// Only one of `limits`/`requests` was given under `resources`
    #[error("resources must specify both limits and requests: missing '{missing}'")]
    MissingResourceSection {
        /// The section that was absent
        missing: &'static str,
    },

    /// A required key is absent
    #[error("missing mandatory key '{key}' in {context}")]
    MissingMandatoryKey {
        /// Key name as written in YAML
        key: String,
        /// Where the key was expected (e.g. `jobs[2]`)
        context: String,
    },

    /// A value does not have the expected YAML shape
    #[error("type mismatch for '{field}': expected {expected}")]
    TypeMismatch {
        /// Dotted path of the offending field
        field: String,
        /// Human-readable description of the accepted shape
        expected: &'static str,
    },

    /// `schema_version` names a layout this crate does not know
    #[error("unsupported schema_version {0}: expected 1 (legacy) or 2")]
    UnsupportedSchemaVersion(u64),

    /// File system error while reading an input document
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML syntax or structure error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON encoding/decoding error on the wire
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Armada API call failed
    #[error("armada client error: {0}")]
    Client(String),

    /// A submitted job reached a terminal failure state
    #[error("job {job_id} failed: {reason}")]
    JobFailed {
        /// Armada job id
        job_id: String,
        /// Reason reported by Armada
        reason: String,
    },

    /// Jobs did not start before the watch deadline
    #[error("timeout waiting for {0}")]
    WatchTimeout(String),
}

impl Error {
    /// Create an invalid-timeout error for the given input
    pub fn invalid_timeout(value: impl Into<String>) -> Self {
        Self::InvalidTimeoutFormat {
            value: value.into(),
        }
    }

    /// Create a missing-key error
    pub fn missing_key(key: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingMandatoryKey {
            key: key.into(),
            context: context.into(),
        }
    }

    /// Create a type-mismatch error
    pub fn type_mismatch(field: impl Into<String>, expected: &'static str) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected,
        }
    }

    /// Create a client error with the given message
    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }

    /// Returns true if this error was raised while translating a document
    ///
    /// Translation errors are deterministic: resubmitting the same file will
    /// fail the same way.
    pub fn is_translation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimeoutFormat { .. }
                | Self::ConflictingAccelerators
                | Self::MissingResourceSection { .. }
                | Self::MissingMandatoryKey { .. }
                | Self::TypeMismatch { .. }
                | Self::UnsupportedSchemaVersion(_)
                | Self::Yaml(_)
        )
    }
}
