//! Types and trait describing what the pipeline needs from a git backend.

use thiserror::Error;

/// Errors returned by a [`GitBackend`].
#[derive(Error, Debug)]
pub enum BackendError {
    /// The request referenced objects or revisions the backend rejects.
    ///
    /// Batch callers skip the affected batch instead of failing the push.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other git failure.
    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),
}

impl BackendError {
    /// Returns true for the invalid-argument class.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

/// Kind of change a [`ChangedPath`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeStatus {
    /// New file.
    Added,
    /// Content change.
    Modified,
    /// File removed.
    Deleted,
    /// File moved, possibly with edits.
    Renamed,
    /// File copied, possibly with edits.
    Copied,
    /// Type change (e.g. file to symlink).
    TypeChanged,
}

impl ChangeStatus {
    /// Maps a libgit2 delta status onto a change status.
    pub fn from_delta(delta: git2::Delta) -> Option<Self> {
        match delta {
            git2::Delta::Added => Some(Self::Added),
            git2::Delta::Modified => Some(Self::Modified),
            git2::Delta::Deleted => Some(Self::Deleted),
            git2::Delta::Renamed => Some(Self::Renamed),
            git2::Delta::Copied => Some(Self::Copied),
            git2::Delta::Typechange => Some(Self::TypeChanged),
            _ => None,
        }
    }

    /// Statuses whose new side can introduce content worth scanning.
    pub const SCANNABLE: [Self; 5] = [
        Self::Added,
        Self::Modified,
        Self::TypeChanged,
        Self::Copied,
        Self::Renamed,
    ];
}

/// A file touched by a single commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedPath {
    /// Path on the new side.
    pub path: String,
    /// Path on the old side for renames and copies.
    pub old_path: Option<String>,
    /// Kind of change.
    pub status: ChangeStatus,
    /// Blob id before the change (all zeros when added).
    pub old_blob_id: String,
    /// Blob id after the change.
    pub new_blob_id: String,
    /// File mode before the change.
    pub old_mode: u32,
    /// File mode after the change.
    pub new_mode: u32,
    /// Commit that introduced the change.
    pub commit_id: String,
}

/// How merge commits are diffed when listing changed paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeCommitDiffMode {
    /// Diff merges against their first parent only.
    FirstParent,
    /// Diff merges against every parent.
    #[default]
    AllParents,
}

/// Options for [`GitBackend::find_changed_paths`].
#[derive(Debug, Clone)]
pub struct ChangedPathsOptions {
    /// Merge commit handling.
    pub merge_commit_diff_mode: MergeCommitDiffMode,
    /// Whether to detect renames and copies.
    pub find_renames: bool,
    /// Statuses to keep; empty keeps everything.
    pub diff_filters: Vec<ChangeStatus>,
}

impl Default for ChangedPathsOptions {
    fn default() -> Self {
        Self {
            merge_commit_diff_mode: MergeCommitDiffMode::AllParents,
            find_renames: true,
            diff_filters: ChangeStatus::SCANNABLE.to_vec(),
        }
    }
}

/// Old/new blob ids to diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPair {
    /// Blob id on the old side (blank for additions).
    pub left_blob_id: String,
    /// Blob id on the new side.
    pub right_blob_id: String,
}

impl From<&ChangedPath> for BlobPair {
    fn from(changed: &ChangedPath) -> Self {
        Self {
            left_blob_id: changed.old_blob_id.clone(),
            right_blob_id: changed.new_blob_id.clone(),
        }
    }
}

/// Patch text for one blob pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffBlob {
    /// Blob id on the old side.
    pub left_blob_id: String,
    /// Blob id on the new side.
    pub right_blob_id: String,
    /// Unified diff hunks (no file header); empty when binary or over the limit.
    pub patch: Vec<u8>,
    /// The patch exceeded the requested byte limit.
    pub over_patch_bytes_limit: bool,
    /// Either side is binary.
    pub binary: bool,
}

/// What the pipeline needs from the git object store.
pub trait GitBackend {
    /// Returns commits reachable from `revisions` but not from any existing ref.
    ///
    /// Blank revisions (ref deletions) are ignored.
    fn new_commits(&self, revisions: &[String]) -> Result<Vec<String>, BackendError>;

    /// Lists files changed by each of `commits`.
    fn find_changed_paths(
        &self,
        commits: &[String],
        options: &ChangedPathsOptions,
    ) -> Result<Vec<ChangedPath>, BackendError>;

    /// Returns patches for blob pairs, each capped at `patch_bytes_limit`.
    fn diff_blobs(
        &self,
        pairs: &[BlobPair],
        patch_bytes_limit: usize,
    ) -> Result<Vec<DiffBlob>, BackendError>;

    /// Same as [`diff_blobs`](Self::diff_blobs) but with full path metadata.
    fn diff_blobs_with_raw_info(
        &self,
        changed_paths: &[ChangedPath],
        patch_bytes_limit: usize,
    ) -> Result<Vec<DiffBlob>, BackendError> {
        let pairs: Vec<BlobPair> = changed_paths.iter().map(BlobPair::from).collect();
        self.diff_blobs(&pairs, patch_bytes_limit)
    }

    /// Returns the message of a commit, if it exists.
    fn commit_message(&self, commit_id: &str) -> Result<Option<String>, BackendError>;
}
