//! Messages shown after a push that was accepted without a full scan.

use crate::pipeline::ScanOutcome;

/// Returns the warning to print for `outcome`, if any.
///
/// Only pushes that were accepted without being scanned get a warning:
/// oversized pushes and pushes no scanner could evaluate.
pub fn post_push_warning(outcome: &ScanOutcome) -> Option<String> {
    match outcome {
        ScanOutcome::TooLarge {
            limit,
            count,
            threshold,
        } => Some(format!(
            "Secret push protection did not scan this push: it contains {count} {limit}, \
             more than the limit of {threshold}. Your push was accepted; \
             review the changes for secrets before sharing them."
        )),
        ScanOutcome::Unavailable => Some(
            "Secret push protection could not scan this push because the scanner is \
             unavailable. Your push was accepted without being scanned for secrets."
                .to_string(),
        ),
        ScanOutcome::Skipped(_) | ScanOutcome::Blocked { .. } | ScanOutcome::Passed => None,
    }
}
