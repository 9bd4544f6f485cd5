//! Evaluation of one push from policy gate to verdict.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::audit::Auditor;
use crate::config::ScanConfig;
use crate::eligibility::{EligibilityChecker, PushContext, SkipReason};
use crate::error::PushProtectionError;
use crate::exclusions::ExclusionsManager;
use crate::git::{short_id, GitBackend};
use crate::payload::PayloadProcessor;
use crate::response::ResponseHandler;
use crate::service::{RequestType, ScanServiceClient, ScanTransport};

/// Which ceiling a push exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityLimit {
    /// Number of changed paths.
    ChangedPaths,
    /// Number of diff lines.
    DiffLines,
}

impl fmt::Display for CapacityLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChangedPaths => f.write_str("changed paths"),
            Self::DiffLines => f.write_str("diff lines"),
        }
    }
}

/// Verdict for a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Not scanned by policy or request; accepted.
    Skipped(SkipReason),
    /// Too large to scan; accepted with a warning.
    TooLarge {
        /// Ceiling that was exceeded.
        limit: CapacityLimit,
        /// Observed value.
        count: usize,
        /// Configured ceiling.
        threshold: usize,
    },
    /// No scanner answered; accepted with a warning.
    Unavailable,
    /// Secrets found; the push must be rejected with `message`.
    Blocked {
        /// Message for the pushing user.
        message: String,
    },
    /// Scanned, nothing to report; accepted.
    Passed,
}

impl ScanOutcome {
    /// Returns true when the push must be rejected.
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// Runs the push protection pipeline against a git backend.
pub struct SecretPushProtection<'a> {
    config: &'a ScanConfig,
    backend: &'a dyn GitBackend,
    auditor: Arc<dyn Auditor>,
    service: ScanServiceClient,
    local_scanner: Option<ScanServiceClient>,
}

impl<'a> SecretPushProtection<'a> {
    /// Creates a pipeline using the configured remote service, if any.
    pub fn new(
        config: &'a ScanConfig,
        backend: &'a dyn GitBackend,
        auditor: Arc<dyn Auditor>,
    ) -> Self {
        let service = ScanServiceClient::new(&config.service, auditor.clone());
        Self {
            config,
            backend,
            auditor,
            service,
            local_scanner: None,
        }
    }

    /// Replaces the remote service client.
    pub fn with_service_client(mut self, service: ScanServiceClient) -> Self {
        self.service = service;
        self
    }

    /// Scanner used when the remote service does not qualify.
    pub fn with_local_scanner(mut self, transport: Arc<dyn ScanTransport>) -> Self {
        self.local_scanner = Some(
            ScanServiceClient::new(&self.config.service, self.auditor.clone())
                .with_transport(transport),
        );
        self
    }

    /// Evaluates one push.
    pub async fn evaluate(&self, context: &PushContext) -> ScanOutcome {
        let context = self.with_latest_commit_message(context);
        let checker = EligibilityChecker::new(self.config, &context, self.auditor.clone());
        if let Some(reason) = checker.evaluate() {
            info!(%reason, "Secret push protection skipped");
            return ScanOutcome::Skipped(reason);
        }

        let exclusions = ExclusionsManager::new(self.config, self.auditor.clone());
        let processor =
            PayloadProcessor::new(self.backend, self.config, &exclusions, self.auditor.clone());

        let standardized = match processor.standardize_payloads(&context.new_revisions()) {
            Ok(standardized) => standardized,
            Err(PushProtectionError::TooManyChangedPaths {
                changed_paths_count,
                changed_paths_threshold,
            }) => {
                info!(changed_paths_count, changed_paths_threshold, "Push too large to scan");
                return ScanOutcome::TooLarge {
                    limit: CapacityLimit::ChangedPaths,
                    count: changed_paths_count,
                    threshold: changed_paths_threshold,
                };
            }
            Err(PushProtectionError::TooManyLines {
                diff_lines_count,
                diff_lines_threshold,
            }) => {
                info!(diff_lines_count, diff_lines_threshold, "Push too large to scan");
                return ScanOutcome::TooLarge {
                    limit: CapacityLimit::DiffLines,
                    count: diff_lines_count,
                    threshold: diff_lines_threshold,
                };
            }
            Err(e) => {
                error!(error = %e, "Failed to prepare scan payloads");
                self.auditor.track_error("standardize_payloads", &e);
                return ScanOutcome::Unavailable;
            }
        };

        let Some(payloads) = standardized.payloads else {
            debug!("Nothing to scan in this push");
            return ScanOutcome::Passed;
        };

        let scanner = if self.service.use_remote_service() {
            &self.service
        } else if let Some(local) = &self.local_scanner {
            local
        } else {
            debug!("No scanner available for this push");
            return ScanOutcome::Unavailable;
        };

        let Some(mut response) = scanner
            .send(payloads, &exclusions, RequestType::Blocking, &[])
            .await
        else {
            return ScanOutcome::Unavailable;
        };

        let handler = ResponseHandler::new(self.config.docs_url.clone(), self.auditor.clone());
        match handler.format_response(&mut response, &standardized.lookup_map) {
            Ok(()) => ScanOutcome::Passed,
            Err(PushProtectionError::Forbidden(message)) => ScanOutcome::Blocked { message },
            Err(e) => {
                error!(error = %e, "Unexpected error handling scan response");
                ScanOutcome::Unavailable
            }
        }
    }

    /// Fills in the latest commit message from the newest pushed tip.
    fn with_latest_commit_message(&self, context: &PushContext) -> PushContext {
        let mut context = context.clone();
        if context.latest_commit_message.is_some() {
            return context;
        }
        let Some(tip) = context.new_revisions().pop() else {
            return context;
        };
        match self.backend.commit_message(&tip) {
            Ok(message) => context.latest_commit_message = message,
            Err(e) => debug!(commit = %short_id(&tip), error = %e, "Could not read commit message"),
        }
        context
    }
}
