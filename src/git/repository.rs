//! [`GitBackend`] implemented on a local repository with git2.

use std::path::Path;

use anyhow::{Context, Result};
use git2::{Blob, DiffFindOptions, DiffOptions, ErrorCode, Oid, Patch, Repository, Sort, Tree};
use tracing::debug;

use super::backend::{
    BackendError, BlobPair, ChangeStatus, ChangedPath, ChangedPathsOptions, DiffBlob, GitBackend,
    MergeCommitDiffMode,
};
use super::is_blank_oid;

/// Line git appends when the last line of a side lacks a trailing newline.
const NO_NEWLINE_MARKER: &[u8] = b"\\ No newline at end of file\n";

/// Git repository wrapper
pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    /// Open the repository described by the environment.
    ///
    /// Honors `GIT_DIR`, `GIT_OBJECT_DIRECTORY` and
    /// `GIT_ALTERNATE_OBJECT_DIRECTORIES`, so a pre-receive hook sees the
    /// quarantined objects of the push it is evaluating.
    pub fn open() -> Result<Self> {
        let repo = Repository::open_from_env().context("Failed to open git repository")?;

        Ok(Self { repo })
    }

    /// Open repository at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::open(path).context("Failed to open git repository")?;

        Ok(Self { repo })
    }

    /// Get access to the underlying git2::Repository
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    fn parse_oid(id: &str) -> Result<Oid, BackendError> {
        Oid::from_str(id.trim())
            .map_err(|e| BackendError::InvalidArgument(format!("invalid object id '{id}': {e}")))
    }

    fn not_found_as_invalid(id: &str, err: git2::Error) -> BackendError {
        if err.code() == ErrorCode::NotFound {
            BackendError::InvalidArgument(format!("object not found: {id}"))
        } else {
            BackendError::Git(err)
        }
    }

    /// Resolves a revision (object id or ref name) to a commit id.
    fn resolve_commit(&self, revision: &str) -> Result<Oid, BackendError> {
        let object = self
            .repo
            .revparse_single(revision.trim())
            .map_err(|e| Self::not_found_as_invalid(revision, e))?;
        let commit = object
            .peel_to_commit()
            .map_err(|e| Self::not_found_as_invalid(revision, e))?;
        Ok(commit.id())
    }

    fn find_blob(&self, id: &str) -> Result<Option<Blob<'_>>, BackendError> {
        if is_blank_oid(id) {
            return Ok(None);
        }
        let oid = Self::parse_oid(id)?;
        self.repo
            .find_blob(oid)
            .map(Some)
            .map_err(|e| Self::not_found_as_invalid(id, e))
    }

    /// Trees to diff a commit against, one per parent considered.
    fn parent_trees<'r>(
        commit: &git2::Commit<'r>,
        mode: MergeCommitDiffMode,
    ) -> Result<Vec<Option<Tree<'r>>>, BackendError> {
        if commit.parent_count() == 0 {
            return Ok(vec![None]);
        }
        let parents_to_diff = match mode {
            MergeCommitDiffMode::FirstParent => 1,
            MergeCommitDiffMode::AllParents => commit.parent_count(),
        };
        let mut trees = Vec::with_capacity(parents_to_diff);
        for idx in 0..parents_to_diff {
            trees.push(Some(commit.parent(idx)?.tree()?));
        }
        Ok(trees)
    }

    fn diff_blob_pair(
        &self,
        pair: &BlobPair,
        patch_bytes_limit: usize,
    ) -> Result<DiffBlob, BackendError> {
        let old_blob = self.find_blob(&pair.left_blob_id)?;
        let new_blob = self.find_blob(&pair.right_blob_id)?;

        let mut diff_blob = DiffBlob {
            left_blob_id: pair.left_blob_id.clone(),
            right_blob_id: pair.right_blob_id.clone(),
            ..DiffBlob::default()
        };

        let binary = old_blob.as_ref().is_some_and(Blob::is_binary)
            || new_blob.as_ref().is_some_and(Blob::is_binary);
        if binary {
            diff_blob.binary = true;
            return Ok(diff_blob);
        }

        // A blank id is an added or deleted side and diffs as empty content.
        let old = old_blob.as_ref().map_or(&[][..], Blob::content);
        let new = new_blob.as_ref().map_or(&[][..], Blob::content);
        let mut opts = DiffOptions::new();
        let patch = Patch::from_buffers(old, None, new, None, Some(&mut opts))?;
        let text = render_hunks(&patch)?;

        if text.len() > patch_bytes_limit {
            debug!(
                blob_id = %pair.right_blob_id,
                patch_bytes = text.len(),
                limit = patch_bytes_limit,
                "Patch exceeds byte limit"
            );
            diff_blob.over_patch_bytes_limit = true;
        } else {
            diff_blob.patch = text;
        }

        Ok(diff_blob)
    }
}

/// Renders the hunks of a patch without the file header.
fn render_hunks(patch: &Patch<'_>) -> Result<Vec<u8>, git2::Error> {
    let mut out = Vec::new();

    for hunk_idx in 0..patch.num_hunks() {
        let (hunk, line_count) = patch.hunk(hunk_idx)?;
        out.extend_from_slice(hunk.header());
        ensure_newline(&mut out);

        for line_idx in 0..line_count {
            let line = patch.line_in_hunk(hunk_idx, line_idx)?;
            let prefix = match line.origin() {
                '+' => b'+',
                '-' => b'-',
                ' ' => b' ',
                '=' | '>' | '<' => {
                    out.extend_from_slice(NO_NEWLINE_MARKER);
                    continue;
                }
                _ => continue,
            };
            out.push(prefix);
            out.extend_from_slice(line.content());
            ensure_newline(&mut out);
        }
    }

    Ok(out)
}

fn ensure_newline(buf: &mut Vec<u8>) {
    if buf.last().is_some_and(|b| *b != b'\n') {
        buf.push(b'\n');
    }
}

impl GitBackend for GitRepository {
    fn new_commits(&self, revisions: &[String]) -> Result<Vec<String>, BackendError> {
        let mut walker = self.repo.revwalk()?;
        walker.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;

        let mut pushed = false;
        for revision in revisions.iter().filter(|rev| !is_blank_oid(rev)) {
            walker.push(self.resolve_commit(revision)?)?;
            pushed = true;
        }
        if !pushed {
            return Ok(Vec::new());
        }

        // Anything reachable from an existing ref is already in the repository.
        for reference in self.repo.references()? {
            let reference = reference?;
            if let Ok(commit) = reference.peel_to_commit() {
                walker.hide(commit.id())?;
            }
        }

        walker
            .map(|oid| oid.map(|o| o.to_string()).map_err(BackendError::from))
            .collect()
    }

    fn find_changed_paths(
        &self,
        commits: &[String],
        options: &ChangedPathsOptions,
    ) -> Result<Vec<ChangedPath>, BackendError> {
        let mut changed = Vec::new();

        for commit_id in commits {
            let oid = Self::parse_oid(commit_id)?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(|e| Self::not_found_as_invalid(commit_id, e))?;
            let tree = commit.tree()?;

            for parent_tree in Self::parent_trees(&commit, options.merge_commit_diff_mode)? {
                let mut diff_opts = DiffOptions::new();
                let mut diff = self.repo.diff_tree_to_tree(
                    parent_tree.as_ref(),
                    Some(&tree),
                    Some(&mut diff_opts),
                )?;

                if options.find_renames {
                    let mut find_opts = DiffFindOptions::new();
                    find_opts.renames(true).copies(true);
                    diff.find_similar(Some(&mut find_opts))?;
                }

                for delta in diff.deltas() {
                    let Some(status) = ChangeStatus::from_delta(delta.status()) else {
                        continue;
                    };
                    if !options.diff_filters.is_empty() && !options.diff_filters.contains(&status)
                    {
                        continue;
                    }
                    let Some(path) = delta.new_file().path().and_then(Path::to_str) else {
                        continue;
                    };
                    let old_path = matches!(status, ChangeStatus::Renamed | ChangeStatus::Copied)
                        .then(|| delta.old_file().path().and_then(Path::to_str))
                        .flatten()
                        .map(str::to_string);

                    changed.push(ChangedPath {
                        path: path.to_string(),
                        old_path,
                        status,
                        old_blob_id: delta.old_file().id().to_string(),
                        new_blob_id: delta.new_file().id().to_string(),
                        old_mode: i32::from(delta.old_file().mode()) as u32,
                        new_mode: i32::from(delta.new_file().mode()) as u32,
                        commit_id: commit_id.clone(),
                    });
                }
            }
        }

        Ok(changed)
    }

    fn diff_blobs(
        &self,
        pairs: &[BlobPair],
        patch_bytes_limit: usize,
    ) -> Result<Vec<DiffBlob>, BackendError> {
        pairs
            .iter()
            .map(|pair| self.diff_blob_pair(pair, patch_bytes_limit))
            .collect()
    }

    fn commit_message(&self, commit_id: &str) -> Result<Option<String>, BackendError> {
        if is_blank_oid(commit_id) {
            return Ok(None);
        }
        let oid = self.resolve_commit(commit_id)?;
        let commit = self.repo.find_commit(oid)?;
        Ok(commit.message().map(str::to_string))
    }
}
