//! The pre-receive hook command.

use std::env;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::debug;

use super::config::load_config;
use crate::audit::TracingAuditor;
use crate::eligibility::{PushContext, RefChange};
use crate::error::PushProtectionError;
use crate::git::GitRepository;
use crate::pipeline::{ScanOutcome, SecretPushProtection};
use crate::warning::post_push_warning;

const PUSH_OPTION_COUNT_ENV: &str = "GIT_PUSH_OPTION_COUNT";

/// Evaluates the ref updates git passes to a pre-receive hook on stdin.
#[derive(Parser)]
pub struct HookCommand {
    /// Repository receiving the push (defaults to the one git describes in the environment).
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Path to the configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl HookCommand {
    /// Executes the hook command.
    pub async fn execute(self) -> Result<()> {
        let config = load_config(self.config)?;
        let repo = match self.repo {
            Some(path) => GitRepository::open_at(path)?,
            None => GitRepository::open()?,
        };

        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read ref updates from stdin")?;

        let context = PushContext {
            changes: parse_ref_updates(&input)?,
            push_options: push_options(|key| env::var(key).ok()),
            latest_commit_message: None,
        };
        debug!(
            changes = context.changes.len(),
            push_options = context.push_options.len(),
            "Evaluating push"
        );

        let outcome = SecretPushProtection::new(&config, &repo, Arc::new(TracingAuditor))
            .evaluate(&context)
            .await;
        debug!(blocked = outcome.is_blocked(), "Push evaluated");
        report(outcome)
    }
}

/// Parses `<old-rev> <new-rev> <ref-name>` lines.
fn parse_ref_updates(input: &str) -> Result<Vec<RefChange>> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [old_rev, new_rev, ref_name] = fields.as_slice() else {
                bail!("Malformed ref update line: '{line}'");
            };
            Ok(RefChange::new(*old_rev, *new_rev, *ref_name))
        })
        .collect()
}

/// Reads push options the way git exposes them to hooks.
fn push_options(lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    let count = lookup(PUSH_OPTION_COUNT_ENV)
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    (0..count)
        .filter_map(|i| lookup(&format!("GIT_PUSH_OPTION_{i}")))
        .collect()
}

/// Prints what the pushing user needs to see and maps a block to an error.
fn report(outcome: ScanOutcome) -> Result<()> {
    if let Some(warning) = post_push_warning(&outcome) {
        eprintln!("WARNING: {warning}");
    }
    match outcome {
        ScanOutcome::Blocked { message } => Err(PushProtectionError::Forbidden(message).into()),
        _ => Ok(()),
    }
}
