//! Decides whether a push is scanned at all.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::audit::{AuditEvent, Auditor};
use crate::config::ScanConfig;
use crate::git::is_blank_oid;

/// Push option that disables scanning for the whole push.
pub const SKIP_PUSH_OPTION: &str = "secret_push_protection.skip_all";

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static SKIP_MARKER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[skip secret push protection\]").unwrap());

/// One ref update received by the hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefChange {
    /// Previous tip (all zeros when the ref is created).
    pub old_rev: String,
    /// New tip (all zeros when the ref is deleted).
    pub new_rev: String,
    /// Fully qualified ref name.
    pub ref_name: String,
}

impl RefChange {
    /// Creates a ref change.
    pub fn new(
        old_rev: impl Into<String>,
        new_rev: impl Into<String>,
        ref_name: impl Into<String>,
    ) -> Self {
        Self {
            old_rev: old_rev.into(),
            new_rev: new_rev.into(),
            ref_name: ref_name.into(),
        }
    }

    /// Returns true when the ref is being deleted.
    pub fn is_deletion(&self) -> bool {
        is_blank_oid(&self.new_rev)
    }
}

/// Everything known about the push being evaluated.
#[derive(Debug, Clone, Default)]
pub struct PushContext {
    /// Ref updates in the push.
    pub changes: Vec<RefChange>,
    /// Push options given with `git push -o`.
    pub push_options: Vec<String>,
    /// Message of the newest pushed commit.
    pub latest_commit_message: Option<String>,
}

impl PushContext {
    /// New tips of every non-deleting ref change.
    pub fn new_revisions(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter(|change| !change.is_deletion())
            .map(|change| change.new_rev.clone())
            .collect()
    }

    /// Returns true when `option` was given, ignoring surrounding whitespace.
    pub fn has_push_option(&self, option: &str) -> bool {
        self.push_options.iter().any(|o| o.trim() == option)
    }
}

/// Why a push was not scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The project is not entitled to push protection.
    NotLicensed,
    /// Push protection is turned off.
    Disabled,
    /// The push only deletes refs.
    DeletionsOnly,
    /// The latest commit message carries the skip marker.
    CommitMessage,
    /// The skip push option was given.
    PushOption,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotLicensed => "secret push protection is not licensed",
            Self::Disabled => "secret push protection is disabled",
            Self::DeletionsOnly => "push only deletes refs",
            Self::CommitMessage => "skipped via commit message",
            Self::PushOption => "skipped via push option",
        };
        f.write_str(text)
    }
}

/// Policy gate evaluated once per push.
pub struct EligibilityChecker<'a> {
    config: &'a ScanConfig,
    context: &'a PushContext,
    auditor: Arc<dyn Auditor>,
}

impl<'a> EligibilityChecker<'a> {
    /// Creates a checker for one push.
    pub fn new(
        config: &'a ScanConfig,
        context: &'a PushContext,
        auditor: Arc<dyn Auditor>,
    ) -> Self {
        Self {
            config,
            context,
            auditor,
        }
    }

    /// Returns why the push should be skipped, without side effects.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        if !self.config.licensed {
            return Some(SkipReason::NotLicensed);
        }
        if !self.config.enabled {
            return Some(SkipReason::Disabled);
        }
        if self.context.changes.iter().all(RefChange::is_deletion) {
            return Some(SkipReason::DeletionsOnly);
        }
        if self
            .context
            .latest_commit_message
            .as_deref()
            .is_some_and(|message| SKIP_MARKER_PATTERN.is_match(message))
        {
            return Some(SkipReason::CommitMessage);
        }
        if self.context.has_push_option(SKIP_PUSH_OPTION) {
            return Some(SkipReason::PushOption);
        }
        None
    }

    /// Evaluates the gate, auditing user-requested skips.
    pub fn evaluate(&self) -> Option<SkipReason> {
        let reason = self.skip_reason()?;
        debug!(%reason, "Skipping secret push protection");
        match reason {
            SkipReason::CommitMessage => self.auditor.audit(AuditEvent::SkippedByCommitMessage),
            SkipReason::PushOption => self.auditor.audit(AuditEvent::SkippedByPushOption),
            _ => {}
        }
        Some(reason)
    }

    /// Returns true when the push must be scanned.
    pub fn should_scan(&self) -> bool {
        self.evaluate().is_none()
    }
}
