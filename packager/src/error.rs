//! Error types for the release pipeline.
//!
//! Variants fall into the four families of release failures (configuration,
//! I/O, cryptography, packaging) plus refusals from the stage machine. The
//! binary maps any of them to a single diagnostic line and exit code 1.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Coarse classification of a [`ReleaseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unreadable descriptor, version string, or configuration.
    Config,
    /// A copy, write, rename, or remove failed.
    Io,
    /// Key generation, encoding, or signing failed.
    Crypto,
    /// An archive or package encoder failed.
    Packaging,
    /// A step was invoked out of order.
    Pipeline,
}

/// Errors that can occur while versioning, building, or publishing a release.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// A descriptor file could not be read.
    #[error("cannot read {path}: {reason}")]
    DescriptorUnreadable {
        /// Path to the descriptor.
        path: Utf8PathBuf,
        /// Description of the underlying failure.
        reason: String,
    },

    /// A descriptor was read but its contents are unusable.
    #[error("invalid descriptor {path}: {reason}")]
    InvalidDescriptor {
        /// Path to the descriptor.
        path: Utf8PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// A version string is not three dot-separated non-negative integers.
    #[error("invalid version \"{value}\": {reason}")]
    InvalidVersion {
        /// The rejected string.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The release configuration is malformed.
    #[error("invalid configuration {path}: {reason}")]
    InvalidConfig {
        /// Path to the configuration file, or the repository root.
        path: Utf8PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// A filesystem operation failed.
    #[error("failed to {action} {path}: {source}")]
    Io {
        /// The operation that failed (`read`, `copy`, `remove`, ...).
        action: &'static str,
        /// The path the operation targeted.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The persisted signing key exists but cannot be used.
    #[error("signing key {path} is unusable: {reason}")]
    UnusableKey {
        /// Path to the key file.
        path: Utf8PathBuf,
        /// Description of the decoding failure.
        reason: String,
    },

    /// A cryptographic operation failed.
    #[error("{operation} failed: {reason}")]
    Crypto {
        /// The operation that failed.
        operation: &'static str,
        /// Description of the failure.
        reason: String,
    },

    /// An archive or package encoder failed.
    #[error("{backend} encoder failed: {reason}")]
    Packaging {
        /// Name of the encoder backend.
        backend: &'static str,
        /// Description of the failure.
        reason: String,
    },

    /// The stage machine refused a step.
    #[error("{step} refused: {reason} (pass --force to override)")]
    OutOfOrder {
        /// The refused step.
        step: &'static str,
        /// Why the step is not allowed yet.
        reason: String,
    },
}

impl ReleaseError {
    /// Return the family this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DescriptorUnreadable { .. }
            | Self::InvalidDescriptor { .. }
            | Self::InvalidVersion { .. }
            | Self::InvalidConfig { .. } => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
            Self::UnusableKey { .. } | Self::Crypto { .. } => ErrorKind::Crypto,
            Self::Packaging { .. } => ErrorKind::Packaging,
            Self::OutOfOrder { .. } => ErrorKind::Pipeline,
        }
    }

    /// Build a closure that wraps an [`std::io::Error`] with its action and path.
    ///
    /// Intended for `map_err`:
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use extension_release::error::{ErrorKind, ReleaseError};
    ///
    /// let path = Utf8Path::new("/definitely/missing/file");
    /// let err = std::fs::read(path)
    ///     .map_err(ReleaseError::io("read", path))
    ///     .expect_err("file does not exist");
    /// assert_eq!(err.kind(), ErrorKind::Io);
    /// assert!(err.to_string().contains("failed to read"));
    /// ```
    pub fn io(action: &'static str, path: &Utf8Path) -> impl FnOnce(std::io::Error) -> Self {
        let owned = path.to_owned();
        move |source| Self::Io {
            action,
            path: owned,
            source,
        }
    }

    /// Build a packaging error from any displayable cause.
    pub fn packaging(backend: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Packaging {
            backend,
            reason: reason.to_string(),
        }
    }

    /// Build a crypto error from any displayable cause.
    pub fn crypto(operation: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Crypto {
            operation,
            reason: reason.to_string(),
        }
    }
}

/// Result type alias using [`ReleaseError`].
pub type Result<T> = std::result::Result<T, ReleaseError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::version(
        ReleaseError::InvalidVersion { value: "1.x".to_owned(), reason: "bad".to_owned() },
        ErrorKind::Config
    )]
    #[case::key(
        ReleaseError::UnusableKey { path: Utf8PathBuf::from("k.pem"), reason: "bad".to_owned() },
        ErrorKind::Crypto
    )]
    #[case::packaging(ReleaseError::packaging("zip", "disk full"), ErrorKind::Packaging)]
    #[case::order(
        ReleaseError::OutOfOrder { step: "publish", reason: "nothing built".to_owned() },
        ErrorKind::Pipeline
    )]
    fn kind_matches_family(#[case] err: ReleaseError, #[case] expected: ErrorKind) {
        assert_eq!(err.kind(), expected);
    }

    #[test]
    fn io_error_names_action_and_path() {
        let wrap = ReleaseError::io("copy", Utf8Path::new("popup.js"));
        let err = wrap(std::io::Error::other("permission denied"));
        let msg = err.to_string();
        assert!(msg.contains("copy"));
        assert!(msg.contains("popup.js"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn out_of_order_mentions_force() {
        let err = ReleaseError::OutOfOrder {
            step: "build-package",
            reason: "version 1.2.4 has not been bumped".to_owned(),
        };
        assert!(err.to_string().contains("--force"));
    }
}
