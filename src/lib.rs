//! # secret-push-protection
//!
//! Push-time secret scanning for git servers.
//!
//! On every push the pipeline decides whether the push should be scanned,
//! turns the new commits into bounded scan payloads, sends them to a
//! scanner and rejects the push when secrets are found in it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use secret_push_protection::audit::TracingAuditor;
//! use secret_push_protection::config::ConfigManager;
//! use secret_push_protection::eligibility::{PushContext, RefChange};
//! use secret_push_protection::git::GitRepository;
//! use secret_push_protection::pipeline::SecretPushProtection;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ConfigManager::new().load_config()?.with_env_overrides();
//! let repo = GitRepository::open()?;
//! let context = PushContext {
//!     changes: vec![RefChange::new(
//!         "0000000000000000000000000000000000000000",
//!         "HEAD",
//!         "refs/heads/main",
//!     )],
//!     ..PushContext::default()
//! };
//!
//! let outcome = SecretPushProtection::new(&config, &repo, Arc::new(TracingAuditor))
//!     .evaluate(&context)
//!     .await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod cli;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod exclusions;
pub mod git;
pub mod payload;
pub mod pipeline;
pub mod response;
pub mod service;
pub mod warning;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod test_utils;

pub use crate::cli::Cli;
pub use crate::error::PushProtectionError;
pub use crate::pipeline::{ScanOutcome, SecretPushProtection};

/// The current version of secret-push-protection.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
