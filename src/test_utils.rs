//! Shared test doubles.

use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::audit::{AuditEvent, Auditor};
use crate::git::{
    BackendError, BlobPair, ChangeStatus, ChangedPath, ChangedPathsOptions, DiffBlob, GitBackend,
};
use crate::service::{ScanRequest, ScanResponse, ScanTransport};

/// Auditor that keeps every event and tracked error in memory.
#[derive(Default)]
pub(crate) struct RecordingAuditor {
    events: Mutex<Vec<AuditEvent>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingAuditor {
    /// Audit events in the order they were recorded.
    pub(crate) fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Tracked errors rendered as `context: error`.
    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Auditor for RecordingAuditor {
    fn audit(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn track_error(&self, context: &str, error: &dyn Error) {
        self.errors
            .lock()
            .unwrap()
            .push(format!("{context}: {error}"));
    }
}

/// Builds a modified-file [`ChangedPath`].
pub(crate) fn changed_path(
    commit: &str,
    path: &str,
    old_blob: &str,
    new_blob: &str,
) -> ChangedPath {
    ChangedPath {
        path: path.to_string(),
        old_path: None,
        status: ChangeStatus::Modified,
        old_blob_id: old_blob.to_string(),
        new_blob_id: new_blob.to_string(),
        old_mode: 0o100_644,
        new_mode: 0o100_644,
        commit_id: commit.to_string(),
    }
}

/// [`GitBackend`] over canned commits, paths and diffs.
///
/// Every `diff_blobs` call is recorded; queued errors are returned by the
/// next calls in FIFO order before any diff is served.
#[derive(Default)]
pub(crate) struct InMemoryBackend {
    commits: Vec<String>,
    changed_paths: Vec<ChangedPath>,
    diffs: HashMap<(String, String), DiffBlob>,
    messages: HashMap<String, String>,
    diff_errors: Mutex<VecDeque<BackendError>>,
    diff_requests: Mutex<Vec<Vec<BlobPair>>>,
    raw_info_requests: Mutex<usize>,
}

impl InMemoryBackend {
    /// Commits returned by `new_commits` for any non-empty revision list.
    pub(crate) fn with_commits(mut self, commits: &[&str]) -> Self {
        self.commits = commits.iter().map(|c| (*c).to_string()).collect();
        self
    }

    pub(crate) fn with_changed_path(mut self, changed: ChangedPath) -> Self {
        self.changed_paths.push(changed);
        self
    }

    /// Serves `patch` for the `old` → `new` blob pair.
    pub(crate) fn with_diff(self, old: &str, new: &str, patch: &[u8]) -> Self {
        self.with_diff_blob(DiffBlob {
            left_blob_id: old.to_string(),
            right_blob_id: new.to_string(),
            patch: patch.to_vec(),
            ..DiffBlob::default()
        })
    }

    pub(crate) fn with_diff_blob(mut self, blob: DiffBlob) -> Self {
        self.diffs.insert(
            (blob.left_blob_id.clone(), blob.right_blob_id.clone()),
            blob,
        );
        self
    }

    pub(crate) fn with_diff_error(self, error: BackendError) -> Self {
        self.diff_errors.lock().unwrap().push_back(error);
        self
    }

    pub(crate) fn with_message(mut self, commit: &str, message: &str) -> Self {
        self.messages.insert(commit.to_string(), message.to_string());
        self
    }

    /// Blob pairs of every `diff_blobs` call, one entry per call.
    pub(crate) fn diff_requests(&self) -> Vec<Vec<BlobPair>> {
        self.diff_requests.lock().unwrap().clone()
    }

    /// Number of `diff_blobs_with_raw_info` calls.
    pub(crate) fn raw_info_requests(&self) -> usize {
        *self.raw_info_requests.lock().unwrap()
    }
}

impl GitBackend for InMemoryBackend {
    fn new_commits(&self, revisions: &[String]) -> Result<Vec<String>, BackendError> {
        if revisions.iter().all(|rev| crate::git::is_blank_oid(rev)) {
            return Ok(Vec::new());
        }
        Ok(self.commits.clone())
    }

    fn find_changed_paths(
        &self,
        commits: &[String],
        _options: &ChangedPathsOptions,
    ) -> Result<Vec<ChangedPath>, BackendError> {
        Ok(self
            .changed_paths
            .iter()
            .filter(|changed| commits.contains(&changed.commit_id))
            .cloned()
            .collect())
    }

    fn diff_blobs(
        &self,
        pairs: &[BlobPair],
        patch_bytes_limit: usize,
    ) -> Result<Vec<DiffBlob>, BackendError> {
        self.diff_requests.lock().unwrap().push(pairs.to_vec());
        if let Some(error) = self.diff_errors.lock().unwrap().pop_front() {
            return Err(error);
        }

        Ok(pairs
            .iter()
            .map(|pair| {
                let key = (pair.left_blob_id.clone(), pair.right_blob_id.clone());
                let mut blob = self.diffs.get(&key).cloned().unwrap_or_else(|| DiffBlob {
                    left_blob_id: pair.left_blob_id.clone(),
                    right_blob_id: pair.right_blob_id.clone(),
                    ..DiffBlob::default()
                });
                if blob.patch.len() > patch_bytes_limit {
                    blob.patch.clear();
                    blob.over_patch_bytes_limit = true;
                }
                blob
            })
            .collect())
    }

    fn diff_blobs_with_raw_info(
        &self,
        changed_paths: &[ChangedPath],
        patch_bytes_limit: usize,
    ) -> Result<Vec<DiffBlob>, BackendError> {
        *self.raw_info_requests.lock().unwrap() += 1;
        let pairs: Vec<BlobPair> = changed_paths.iter().map(BlobPair::from).collect();
        self.diff_blobs(&pairs, patch_bytes_limit)
    }

    fn commit_message(&self, commit_id: &str) -> Result<Option<String>, BackendError> {
        Ok(self.messages.get(commit_id).cloned())
    }
}

/// Scan transport with a pre-programmed queue of responses.
///
/// Responses are returned in FIFO order; once the queue is exhausted every
/// call fails. Each call records the request and headers it received.
pub(crate) struct MockScanTransport {
    responses: Arc<Mutex<VecDeque<Result<ScanResponse>>>>,
    requests: Arc<Mutex<Vec<(ScanRequest, Vec<(String, String)>)>>>,
}

impl MockScanTransport {
    pub(crate) fn new(responses: Vec<Result<ScanResponse>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns a handle for inspecting requests after the transport was moved.
    pub(crate) fn request_handle(&self) -> RequestRecordHandle {
        RequestRecordHandle {
            requests: self.requests.clone(),
        }
    }
}

/// Shared handle to a mock transport's recorded requests.
pub(crate) struct RequestRecordHandle {
    requests: Arc<Mutex<Vec<(ScanRequest, Vec<(String, String)>)>>>,
}

impl RequestRecordHandle {
    /// All recorded `(request, headers)` pairs.
    pub(crate) fn requests(&self) -> Vec<(ScanRequest, Vec<(String, String)>)> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of scan calls made.
    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl ScanTransport for MockScanTransport {
    fn scan<'a>(
        &'a self,
        request: &'a ScanRequest,
        headers: &'a [(String, String)],
    ) -> Pin<Box<dyn Future<Output = Result<ScanResponse>> + Send + 'a>> {
        let responses = self.responses.clone();
        let recorded = self.requests.clone();
        let entry = (request.clone(), headers.to_vec());
        Box::pin(async move {
            recorded.lock().unwrap().push(entry);
            responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no more mock responses")))
        })
    }
}
