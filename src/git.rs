//! Git backend boundary, its git2 implementation and diff parsing.

pub mod backend;
pub mod hunk;
pub mod repository;

pub use backend::{
    BackendError, BlobPair, ChangeStatus, ChangedPath, ChangedPathsOptions, DiffBlob, GitBackend,
    MergeCommitDiffMode,
};
pub use hunk::{parse_added_runs, AddedRun, HunkHeaderError};
pub use repository::GitRepository;

/// Number of hex characters to show in abbreviated object ids.
pub const SHORT_HASH_LEN: usize = 8;

/// The all-zero object id git uses for "no object".
pub const BLANK_OID: &str = "0000000000000000000000000000000000000000";

/// Returns true when `id` is empty or the all-zero object id.
pub fn is_blank_oid(id: &str) -> bool {
    let id = id.trim();
    id.is_empty() || id.bytes().all(|b| b == b'0')
}

/// Abbreviates an object id for display.
pub fn short_id(id: &str) -> &str {
    id.get(..SHORT_HASH_LEN).unwrap_or(id)
}
