//! Error types for the push protection pipeline.

use thiserror::Error;

use crate::git::BackendError;

/// Errors raised while evaluating a push.
///
/// The capacity variants mean the push was too large to scan safely and
/// must be turned into an accepted push with a warning. [`Forbidden`]
/// carries the rendered block message for the pushing user.
///
/// [`Forbidden`]: PushProtectionError::Forbidden
#[derive(Error, Debug)]
pub enum PushProtectionError {
    /// The push touches more paths than the configured ceiling.
    #[error(
        "Too many changed paths to scan: {changed_paths_count} exceeds the limit of {changed_paths_threshold}"
    )]
    TooManyChangedPaths {
        /// Number of changed paths left after exclusions.
        changed_paths_count: usize,
        /// Configured ceiling.
        changed_paths_threshold: usize,
    },

    /// The diffs of the push contain more lines than the configured ceiling.
    #[error("Too many diff lines to scan: {diff_lines_count} exceeds the limit of {diff_lines_threshold}")]
    TooManyLines {
        /// Total number of lines across all fetched patches.
        diff_lines_count: usize,
        /// Configured ceiling.
        diff_lines_threshold: usize,
    },

    /// Secrets were found and the push must be rejected.
    #[error("{0}")]
    Forbidden(String),

    /// The git backend failed in a way that cannot be skipped per batch.
    #[error("Git backend error: {0}")]
    Backend(#[from] BackendError),
}

impl PushProtectionError {
    /// Returns true for the errors that mean "too large to scan".
    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            Self::TooManyChangedPaths { .. } | Self::TooManyLines { .. }
        )
    }
}
