//! Extraction of added-line runs from unified diff hunks.
//!
//! A patch is walked line by line while tracking the 1-based line number
//! in the new file. Contiguous `+` lines become one [`AddedRun`] tagged with
//! the line number its first line lands on. A context line, a hunk header
//! or the end of the patch closes the current run; removed lines and
//! `\ No newline at end of file` markers are skipped without moving the
//! counter.

use std::sync::LazyLock;

use regex::bytes::Regex;
use thiserror::Error;

/// Marker that begins a hunk within a file diff.
const HUNK_MARKER: &[u8] = b"@@";

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static HUNK_HEADER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@@ -\d+(?:,\d+)? \+(\d+)(?:,\d+)? @@.*$").unwrap());

/// A run of consecutive added lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedRun {
    /// 1-based line number in the new file of the first line of the run.
    pub offset: usize,
    /// Line bodies joined by `\n`, without a trailing newline.
    pub data: Vec<u8>,
}

/// A hunk header that does not follow `@@ -a[,b] +c[,d] @@`.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Malformed hunk header: {header}")]
pub struct HunkHeaderError {
    /// The offending header line (lossily decoded).
    pub header: String,
}

/// How a single patch line affects the walk.
enum LineKind<'a> {
    HunkHeader,
    Added(&'a [u8]),
    Context,
    Ignored,
}

fn classify(line: &[u8]) -> LineKind<'_> {
    if line.starts_with(HUNK_MARKER) {
        return LineKind::HunkHeader;
    }
    match line.first() {
        Some(b'+') => LineKind::Added(&line[1..]),
        Some(b' ') => LineKind::Context,
        _ => LineKind::Ignored,
    }
}

/// Accumulator for the run currently being built.
#[derive(Debug, Default)]
enum ParseState {
    #[default]
    Idle,
    Accumulating { offset: usize, buffer: Vec<u8> },
}

impl ParseState {
    fn push_added(&mut self, line_number: usize, body: &[u8]) {
        match self {
            Self::Idle => {
                let mut buffer = body.to_vec();
                buffer.push(b'\n');
                *self = Self::Accumulating {
                    offset: line_number,
                    buffer,
                };
            }
            Self::Accumulating { buffer, .. } => {
                buffer.extend_from_slice(body);
                buffer.push(b'\n');
            }
        }
    }

    fn flush(&mut self, runs: &mut Vec<AddedRun>) {
        if let Self::Accumulating { offset, mut buffer } = std::mem::take(self) {
            if buffer.last() == Some(&b'\n') {
                buffer.pop();
            }
            runs.push(AddedRun {
                offset,
                data: buffer,
            });
        }
    }
}

/// Validates every hunk header and returns their new-file start lines in order.
fn hunk_starts(patch: &[u8]) -> Result<Vec<usize>, HunkHeaderError> {
    patch
        .split(|b| *b == b'\n')
        .filter(|line| line.starts_with(HUNK_MARKER))
        .map(|line| {
            HUNK_HEADER_PATTERN
                .captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
                .and_then(|digits| digits.parse::<usize>().ok())
                .ok_or_else(|| HunkHeaderError {
                    header: String::from_utf8_lossy(line).into_owned(),
                })
        })
        .collect()
}

/// Splits a patch into runs of added lines.
///
/// Every hunk header is validated before any line is consumed, so a patch
/// with a single malformed header yields an error and no runs. Lines before
/// the first hunk header (file headers such as `+++ b/path`) are ignored.
pub fn parse_added_runs(patch: &[u8]) -> Result<Vec<AddedRun>, HunkHeaderError> {
    let mut starts = hunk_starts(patch)?.into_iter();
    let mut runs = Vec::new();
    let mut state = ParseState::Idle;
    let mut current_line_number = 0usize;
    let mut in_hunk = false;

    for line in patch.split(|b| *b == b'\n') {
        match classify(line) {
            LineKind::HunkHeader => {
                state.flush(&mut runs);
                let new_start = starts.next().unwrap_or_default();
                current_line_number = new_start.saturating_sub(1);
                in_hunk = true;
            }
            _ if !in_hunk => {}
            LineKind::Added(body) => {
                current_line_number = current_line_number.saturating_add(1);
                state.push_added(current_line_number, body);
            }
            LineKind::Context => {
                state.flush(&mut runs);
                current_line_number = current_line_number.saturating_add(1);
            }
            LineKind::Ignored => {}
        }
    }
    state.flush(&mut runs);

    Ok(runs)
}

/// Counts the lines of a patch.
pub fn line_count(patch: &[u8]) -> usize {
    let newlines = patch.iter().filter(|b| **b == b'\n').count();
    match patch.last() {
        Some(b'\n') | None => newlines,
        Some(_) => newlines + 1,
    }
}
