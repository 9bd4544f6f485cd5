//! Turns a scan response into a pass/block decision.
//!
//! Findings only know the blob they were found in. They are mapped back to
//! the commits and paths that introduced each blob through the
//! [`LookupMap`] built while standardizing payloads, then rendered into the
//! message shown to the pushing user.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::audit::{AuditEvent, Auditor};
use crate::eligibility::SKIP_PUSH_OPTION;
use crate::error::PushProtectionError;
use crate::payload::LookupMap;
use crate::service::{Finding, FindingStatus, ScanResponse, ScanStatus};

const BLOCKED_BANNER: &str = "PUSH BLOCKED: Secrets detected in code changes";
const RULE: &str = "==================================================";
const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// Returns true when the scanner gave up because of its deadline.
pub fn timed_out(response: &ScanResponse) -> bool {
    response.status == ScanStatus::ScanError
        && response
            .message
            .as_deref()
            .is_some_and(|message| message.to_lowercase().contains(DEADLINE_EXCEEDED))
}

/// Findings keyed by commit and path, plus findings with no commit or path.
#[derive(Debug, Default, PartialEq)]
struct Correlation {
    commits: Vec<(String, Vec<(String, Vec<Finding>)>)>,
    blobs: Vec<(String, Vec<Finding>)>,
}

impl Correlation {
    fn is_empty(&self) -> bool {
        self.commits.is_empty() && self.blobs.is_empty()
    }
}

/// Returns the value stored under `key`, appending a default one if absent.
fn slot<'v, V: Default>(items: &'v mut Vec<(String, V)>, key: &str) -> &'v mut V {
    let index = match items.iter().position(|(k, _)| k == key) {
        Some(index) => index,
        None => {
            items.push((key.to_string(), V::default()));
            items.len() - 1
        }
    };
    &mut items[index].1
}

fn correlate(findings: &[Finding], lookup_map: &LookupMap) -> Correlation {
    let mut by_payload: Vec<(String, Vec<Finding>)> = Vec::new();
    for finding in findings {
        slot(&mut by_payload, &finding.payload_id).push(finding.clone());
    }

    let mut correlation = Correlation::default();
    for (blob_id, group) in by_payload {
        let entries = lookup_map.get(&blob_id);
        if entries.is_empty() {
            warn!(blob_id = %blob_id, "Could not map blob to a commit and path");
            continue;
        }

        for entry in entries {
            if entry.is_complete() {
                let paths = slot(&mut correlation.commits, &entry.commit_id);
                slot(paths, &entry.path).extend(group.iter().cloned());
            } else {
                slot(&mut correlation.blobs, &blob_id).extend(group.iter().cloned());
            }
        }
    }
    correlation
}

/// Decides the fate of a push from its scan response.
pub struct ResponseHandler {
    docs_url: String,
    auditor: Arc<dyn Auditor>,
}

impl ResponseHandler {
    /// Creates a handler linking to `docs_url` in block messages.
    pub fn new(docs_url: impl Into<String>, auditor: Arc<dyn Auditor>) -> Self {
        Self {
            docs_url: docs_url.into(),
            auditor,
        }
    }

    /// Accepts or rejects the push.
    ///
    /// Returns [`PushProtectionError::Forbidden`] with the rendered message
    /// when secrets map to the push. When every finding of a `found` or
    /// `found_with_errors` response is unmappable, the status is rewritten
    /// to `not_found`. Every other status fails open.
    pub fn format_response(
        &self,
        response: &mut ScanResponse,
        lookup_map: &LookupMap,
    ) -> Result<(), PushProtectionError> {
        match response.status {
            ScanStatus::NotFound => {
                info!("Secret detection scan found no secrets");
                Ok(())
            }
            ScanStatus::Found | ScanStatus::FoundWithErrors => {
                if response.status == ScanStatus::FoundWithErrors {
                    warn!("Secret detection scan completed with errors");
                }
                let correlation = correlate(&response.results, lookup_map);
                if correlation.is_empty() {
                    response.status = ScanStatus::NotFound;
                    return Ok(());
                }
                Err(PushProtectionError::Forbidden(self.render(&correlation)))
            }
            ScanStatus::ScanTimeout => {
                error!("Secret detection scan timed out");
                Ok(())
            }
            ScanStatus::InputError => {
                error!(message = ?response.message, "Secret detection scan rejected its input");
                Ok(())
            }
            _ if timed_out(response) => {
                error!(message = ?response.message, "Secret detection scan hit its deadline");
                Ok(())
            }
            status => {
                error!(?status, message = ?response.message, "Secret detection scan failed");
                Ok(())
            }
        }
    }

    fn render(&self, correlation: &Correlation) -> String {
        let mut message = format!("{RULE}\n{BLOCKED_BANNER}\n{RULE}\n");

        for (commit_id, paths) in &correlation.commits {
            message.push_str(&format!(
                "\nSecret push protection found the following secrets in commit: {commit_id}\n"
            ));
            for (path, findings) in paths {
                message.push_str(&format!("\n  -- {path}:\n"));
                for finding in findings {
                    if let Some(line) = self.finding_line(finding) {
                        message.push_str(&format!("  {line}\n"));
                    }
                }
            }
        }

        for (blob_id, findings) in &correlation.blobs {
            message.push_str(&format!("\nSecret leaked in blob: {blob_id}\n"));
            for finding in findings {
                if let Some(line) = self.finding_line(finding) {
                    message.push_str(&format!("  -- {line}\n"));
                }
            }
        }

        message.push_str(
            "\nTo push your changes you must remove the identified secrets.\n\
             \nTo skip secret push protection for this push, use the push option:\n",
        );
        message.push_str(&format!("  git push -o {SKIP_PUSH_OPTION}\n"));
        message.push_str(&format!(
            "\nFor help with this, please refer to our documentation: {}\n",
            self.docs_url
        ));
        message.push_str(RULE);
        message
    }

    fn finding_line(&self, finding: &Finding) -> Option<String> {
        match finding.status {
            FindingStatus::Found => {
                let description = finding.description.clone().unwrap_or_default();
                self.auditor.audit(AuditEvent::SecretDetected {
                    description: description.clone(),
                });
                let line = finding
                    .line_number
                    .map_or_else(|| "?".to_string(), |n| n.to_string());
                Some(format!("{line} | {description}"))
            }
            FindingStatus::ScanError => Some(format!(
                "Failed to scan blob(id: {}) due to regex error.",
                finding.payload_id
            )),
            FindingStatus::PayloadTimeout => Some(format!(
                "Scanning blob(id: {}) timed out.",
                finding.payload_id
            )),
            FindingStatus::Unknown => {
                warn!(blob_id = %finding.payload_id, "Skipping finding with unknown status");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::payload::LookupEntry;
    use crate::test_utils::RecordingAuditor;

    const DOCS: &str = "https://docs.example.com/push-protection";

    fn handler() -> (ResponseHandler, Arc<RecordingAuditor>) {
        let auditor = Arc::new(RecordingAuditor::default());
        (ResponseHandler::new(DOCS, auditor.clone()), auditor)
    }

    fn entry(commit: &str, path: &str) -> LookupEntry {
        LookupEntry {
            commit_id: commit.to_string(),
            path: path.to_string(),
        }
    }

    fn lookup(entries: &[(&str, LookupEntry)]) -> LookupMap {
        let mut map = LookupMap::default();
        for (blob, e) in entries {
            map.insert(*blob, e.clone());
        }
        map
    }

    fn blocked_message(result: Result<(), PushProtectionError>) -> String {
        match result {
            Err(PushProtectionError::Forbidden(message)) => message,
            other => panic!("expected a blocked push, got {other:?}"),
        }
    }

    // ── status table ────────────────────────────────────────────────

    #[test]
    fn non_finding_statuses_fail_open() {
        let (handler, _) = handler();
        let map = lookup(&[("b1", entry("c1", "a.txt"))]);
        for status in [
            ScanStatus::NotFound,
            ScanStatus::ScanTimeout,
            ScanStatus::InputError,
            ScanStatus::ScanError,
            ScanStatus::Unknown,
        ] {
            let mut response = ScanResponse::new(status, vec![Finding::found("b1", 1, "Token")]);
            assert!(handler.format_response(&mut response, &map).is_ok());
            assert_eq!(response.status, status);
        }
    }

    #[test]
    fn found_and_found_with_errors_block() {
        let (handler, _) = handler();
        let map = lookup(&[("b1", entry("c1", "a.txt"))]);
        for status in [ScanStatus::Found, ScanStatus::FoundWithErrors] {
            let mut response = ScanResponse::new(status, vec![Finding::found("b1", 1, "Token")]);
            let message = blocked_message(handler.format_response(&mut response, &map));
            assert!(message.contains(BLOCKED_BANNER));
        }
    }

    #[test]
    fn deadline_exceeded_is_a_timeout() {
        let mut response = ScanResponse::new(ScanStatus::ScanError, vec![]);
        response.message = Some("rpc error: DEADLINE EXCEEDED after 10s".to_string());
        assert!(timed_out(&response));

        response.message = Some("connection reset".to_string());
        assert!(!timed_out(&response));

        response.status = ScanStatus::ScanTimeout;
        response.message = Some("deadline exceeded".to_string());
        assert!(!timed_out(&response));
    }

    // ── correlation ─────────────────────────────────────────────────

    #[test]
    fn findings_are_reported_under_every_commit_that_introduced_the_blob() {
        let (handler, auditor) = handler();
        let map = lookup(&[
            ("b1", entry("c1", "config/a.yml")),
            ("b1", entry("c2", "config/b.yml")),
        ]);
        let mut response =
            ScanResponse::new(ScanStatus::Found, vec![Finding::found("b1", 4, "AWS token")]);

        let message = blocked_message(handler.format_response(&mut response, &map));

        let first = message.find("in commit: c1").unwrap();
        let second = message.find("in commit: c2").unwrap();
        assert!(first < second);
        assert!(message.contains("-- config/a.yml:"));
        assert!(message.contains("-- config/b.yml:"));
        assert_eq!(message.matches("4 | AWS token").count(), 2);
        assert_eq!(auditor.events().len(), 2);
    }

    #[test]
    fn unmappable_blob_is_dropped() {
        let (handler, _) = handler();
        let map = lookup(&[("b1", entry("c1", "a.txt"))]);
        let mut response = ScanResponse::new(
            ScanStatus::Found,
            vec![
                Finding::found("b1", 1, "Mapped"),
                Finding::found("unknown", 2, "Unmapped"),
            ],
        );
        let message = blocked_message(handler.format_response(&mut response, &map));
        assert!(message.contains("Mapped"));
        assert!(!message.contains("Unmapped"));
    }

    #[test]
    fn fully_unmappable_found_with_errors_downgrades_to_not_found() {
        let (handler, auditor) = handler();
        let mut response = ScanResponse::new(
            ScanStatus::FoundWithErrors,
            vec![Finding::found("ghost", 1, "Token")],
        );
        assert!(handler
            .format_response(&mut response, &LookupMap::default())
            .is_ok());
        assert_eq!(response.status, ScanStatus::NotFound);
        assert!(auditor.events().is_empty());
    }

    #[test]
    fn incomplete_entries_land_in_the_blob_bucket() {
        let (handler, _) = handler();
        let map = lookup(&[("b1", entry("", "a.txt"))]);
        let mut response =
            ScanResponse::new(ScanStatus::Found, vec![Finding::found("b1", 9, "Key")]);
        let message = blocked_message(handler.format_response(&mut response, &map));
        assert!(message.contains("Secret leaked in blob: b1"));
        assert!(message.contains("-- 9 | Key"));
        assert!(!message.contains("in commit:"));
    }

    #[test]
    fn findings_for_one_payload_keep_their_order() {
        let map = lookup(&[("b1", entry("c1", "a.txt")), ("b2", entry("c1", "b.txt"))]);
        let correlation = correlate(
            &[
                Finding::found("b2", 1, "first"),
                Finding::found("b1", 2, "second"),
                Finding::found("b2", 3, "third"),
            ],
            &map,
        );
        let paths = &correlation.commits[0].1;
        assert_eq!(paths[0].0, "b.txt");
        let lines: Vec<_> = paths[0].1.iter().map(|f| f.line_number).collect();
        assert_eq!(lines, vec![Some(1), Some(3)]);
        assert_eq!(paths[1].0, "a.txt");
    }

    // ── rendering ───────────────────────────────────────────────────

    #[test]
    fn per_status_finding_lines() {
        let (handler, auditor) = handler();
        let map = lookup(&[("b1", entry("c1", "a.txt"))]);
        let mut response = ScanResponse::new(
            ScanStatus::FoundWithErrors,
            vec![
                Finding::failed("b1", FindingStatus::ScanError),
                Finding::failed("b1", FindingStatus::PayloadTimeout),
                Finding::failed("b1", FindingStatus::Unknown),
            ],
        );
        let message = blocked_message(handler.format_response(&mut response, &map));
        assert!(message.contains("Failed to scan blob(id: b1) due to regex error."));
        assert!(message.contains("Scanning blob(id: b1) timed out."));
        assert!(auditor.events().is_empty());
    }

    #[test]
    fn message_ends_with_remediation_and_docs() {
        let (handler, _) = handler();
        let map = lookup(&[("b1", entry("c1", "a.txt"))]);
        let mut response =
            ScanResponse::new(ScanStatus::Found, vec![Finding::found("b1", 1, "Token")]);
        let message = blocked_message(handler.format_response(&mut response, &map));
        assert!(message.contains("git push -o secret_push_protection.skip_all"));
        assert!(message.contains(DOCS));
        assert!(message.ends_with(RULE));
    }
}
