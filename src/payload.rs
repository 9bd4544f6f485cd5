//! Turns the changes of a push into bounded scan payloads.
//!
//! The processor lists the paths touched by every new commit, drops the
//! excluded ones, enforces the path and line ceilings, fetches the diff of
//! each remaining blob pair in batches and splits every diff into runs of
//! added lines. Alongside the payloads it records which commits and paths
//! introduced each blob so that findings can be reported in terms the
//! pushing user recognizes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::Auditor;
use crate::config::ScanConfig;
use crate::error::PushProtectionError;
use crate::exclusions::ExclusionsManager;
use crate::git::hunk::line_count;
use crate::git::{
    is_blank_oid, parse_added_runs, short_id, BackendError, BlobPair, ChangedPath,
    ChangedPathsOptions, DiffBlob, GitBackend,
};

const UTF8_BOM: char = '\u{feff}';

/// A unit of text sent to the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPayload {
    /// Id of the blob the text was added to.
    pub id: String,
    /// The added text.
    pub data: String,
    /// 1-based line number in the blob where `data` starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

/// Where a blob was introduced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEntry {
    /// Commit that introduced the blob.
    pub commit_id: String,
    /// Path of the blob in that commit.
    pub path: String,
}

impl LookupEntry {
    /// Returns true when both the commit and the path are known.
    pub fn is_complete(&self) -> bool {
        !self.commit_id.trim().is_empty() && !self.path.trim().is_empty()
    }
}

/// Blob id to the commits and paths that introduced it, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct LookupMap {
    entries: HashMap<String, Vec<LookupEntry>>,
}

impl LookupMap {
    /// Records that `blob_id` was introduced at `entry`.
    pub fn insert(&mut self, blob_id: impl Into<String>, entry: LookupEntry) {
        self.entries.entry(blob_id.into()).or_default().push(entry);
    }

    /// Entries recorded for `blob_id`, empty when unknown.
    pub fn get(&self, blob_id: &str) -> &[LookupEntry] {
        self.entries.get(blob_id).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct blobs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no blob was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Payloads ready for scanning and the lookup map to correlate findings.
#[derive(Debug, Default)]
pub struct StandardizedPayloads {
    /// `None` when nothing in the push is scannable.
    pub payloads: Option<Vec<ScanPayload>>,
    /// Blob to commit/path index for the push.
    pub lookup_map: LookupMap,
}

/// Builds scan payloads for one push.
pub struct PayloadProcessor<'a> {
    backend: &'a dyn GitBackend,
    config: &'a ScanConfig,
    exclusions: &'a ExclusionsManager,
    auditor: Arc<dyn Auditor>,
}

impl<'a> PayloadProcessor<'a> {
    /// Creates a processor over `backend`.
    pub fn new(
        backend: &'a dyn GitBackend,
        config: &'a ScanConfig,
        exclusions: &'a ExclusionsManager,
        auditor: Arc<dyn Auditor>,
    ) -> Self {
        Self {
            backend,
            config,
            exclusions,
            auditor,
        }
    }

    /// Produces the payloads for the commits introduced by `revisions`.
    pub fn standardize_payloads(
        &self,
        revisions: &[String],
    ) -> Result<StandardizedPayloads, PushProtectionError> {
        let limits = &self.config.limits;

        let commits = self.backend.new_commits(revisions)?;
        if commits.is_empty() {
            debug!("Push introduces no new commits");
            return Ok(StandardizedPayloads::default());
        }

        let changed_paths: Vec<ChangedPath> = self
            .backend
            .find_changed_paths(&commits, &ChangedPathsOptions::default())?
            .into_iter()
            .filter(|changed| !self.exclusions.matches_excluded_path(&changed.path))
            .collect();
        info!(
            commits = commits.len(),
            changed_paths = changed_paths.len(),
            "Changed paths after exclusions"
        );

        if changed_paths.len() > limits.max_changed_paths {
            return Err(PushProtectionError::TooManyChangedPaths {
                changed_paths_count: changed_paths.len(),
                changed_paths_threshold: limits.max_changed_paths,
            });
        }

        let mut lookup_map = LookupMap::default();
        for changed in &changed_paths {
            if !is_blank_oid(&changed.new_blob_id) {
                lookup_map.insert(
                    changed.new_blob_id.clone(),
                    LookupEntry {
                        commit_id: changed.commit_id.clone(),
                        path: changed.path.clone(),
                    },
                );
            }
        }

        let diff_blobs = self.fetch_diff_blobs(&changed_paths)?;

        let diff_lines: usize = diff_blobs.iter().map(|blob| line_count(&blob.patch)).sum();
        if diff_lines > limits.max_diff_lines {
            return Err(PushProtectionError::TooManyLines {
                diff_lines_count: diff_lines,
                diff_lines_threshold: limits.max_diff_lines,
            });
        }

        let payloads: Vec<ScanPayload> = diff_blobs.iter().flat_map(build_payloads).collect();
        debug!(payloads = payloads.len(), "Standardized payloads");

        Ok(StandardizedPayloads {
            payloads: (!payloads.is_empty()).then_some(payloads),
            lookup_map,
        })
    }

    /// Fetches diffs for every distinct blob pair, skipping unusable ones.
    fn fetch_diff_blobs(
        &self,
        changed_paths: &[ChangedPath],
    ) -> Result<Vec<DiffBlob>, PushProtectionError> {
        let limits = &self.config.limits;
        let mut seen = HashSet::new();
        let candidates: Vec<&ChangedPath> = changed_paths
            .iter()
            .filter(|changed| {
                !is_blank_oid(&changed.new_blob_id) && changed.old_blob_id != changed.new_blob_id
            })
            .filter(|changed| {
                seen.insert((changed.old_blob_id.as_str(), changed.new_blob_id.as_str()))
            })
            .collect();

        let mut diff_blobs = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(limits.diff_blobs_batch_size.max(1)) {
            let result = if self.config.use_raw_info_diffs {
                let records: Vec<ChangedPath> = batch.iter().map(|c| (*c).clone()).collect();
                self.backend
                    .diff_blobs_with_raw_info(&records, limits.patch_bytes_limit)
            } else {
                let pairs: Vec<BlobPair> = batch.iter().map(|c| BlobPair::from(*c)).collect();
                self.backend.diff_blobs(&pairs, limits.patch_bytes_limit)
            };

            match result {
                Ok(blobs) => diff_blobs.extend(blobs.into_iter().filter(is_scannable)),
                Err(e @ BackendError::InvalidArgument(_)) => {
                    warn!(batch_size = batch.len(), error = %e, "Skipping diff batch");
                    self.auditor.track_error("diff_blobs", &e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(diff_blobs)
    }
}

fn is_scannable(blob: &DiffBlob) -> bool {
    if blob.binary {
        debug!(blob_id = %short_id(&blob.right_blob_id), "Skipping binary blob");
        return false;
    }
    if blob.over_patch_bytes_limit {
        debug!(blob_id = %short_id(&blob.right_blob_id), "Skipping oversized patch");
        return false;
    }
    true
}

fn build_payloads(blob: &DiffBlob) -> Vec<ScanPayload> {
    let runs = match parse_added_runs(&blob.patch) {
        Ok(runs) => runs,
        Err(e) => {
            warn!(
                blob_id = %blob.right_blob_id,
                error = %e,
                "Dropping diff with malformed hunk header"
            );
            return Vec::new();
        }
    };

    runs.into_iter()
        .filter_map(|run| match String::from_utf8(run.data) {
            Ok(mut data) => {
                if data.starts_with(UTF8_BOM) {
                    data.drain(..UTF8_BOM.len_utf8());
                }
                Some(ScanPayload {
                    id: blob.right_blob_id.clone(),
                    data,
                    offset: Some(run.offset),
                })
            }
            Err(e) => {
                warn!(
                    blob_id = %blob.right_blob_id,
                    offset = run.offset,
                    error = %e,
                    "Dropping payload that is not valid UTF-8"
                );
                None
            }
        })
        .collect()
}
