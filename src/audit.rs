//! Audit trail and error tracking boundary.
//!
//! Persisting audit records is the host's concern; the pipeline only
//! reports events through the [`Auditor`] trait. [`TracingAuditor`] emits
//! them as structured `tracing` events under the `audit` target.

use std::error::Error;
use std::fmt;

use tracing::{error, info};

/// An auditable decision taken while evaluating a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    /// The scan was skipped because of the commit message marker.
    SkippedByCommitMessage,
    /// The scan was skipped because of the push option.
    SkippedByPushOption,
    /// A path was excluded by a configured rule.
    PathExcluded {
        /// The rule's glob pattern.
        rule: String,
        /// The excluded path.
        path: String,
    },
    /// A secret was reported to the user.
    SecretDetected {
        /// Description of the detected secret type.
        description: String,
    },
}

impl AuditEvent {
    /// Stable machine-readable name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SkippedByCommitMessage => "skip_secret_push_protection_commit_message",
            Self::SkippedByPushOption => "skip_secret_push_protection_push_option",
            Self::PathExcluded { .. } => "project_security_exclusion_applied",
            Self::SecretDetected { .. } => "detect_secret_type",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkippedByCommitMessage => {
                write!(f, "Secret push protection skipped via commit message")
            }
            Self::SkippedByPushOption => {
                write!(f, "Secret push protection skipped via push option")
            }
            Self::PathExcluded { rule, path } => {
                write!(f, "Excluded path '{path}' from scanning by rule '{rule}'")
            }
            Self::SecretDetected { description } => {
                write!(f, "Secret push protection detected: {description}")
            }
        }
    }
}

/// Sink for audit events and tracked errors.
pub trait Auditor: Send + Sync {
    /// Records an audit event.
    fn audit(&self, event: AuditEvent);

    /// Reports an error that was handled without failing the push.
    fn track_error(&self, context: &str, error: &dyn Error);
}

/// Auditor that writes to the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditor;

impl Auditor for TracingAuditor {
    fn audit(&self, event: AuditEvent) {
        info!(target: "audit", event = event.name(), "{event}");
    }

    fn track_error(&self, context: &str, err: &dyn Error) {
        error!(target: "audit", context = context, error = %err, "Tracked exception");
    }
}
