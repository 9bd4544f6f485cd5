//! Project exclusion rules and path matching.

use std::collections::HashMap;
use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audit::{AuditEvent, Auditor};
use crate::config::ScanConfig;

/// What an exclusion rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionType {
    /// Glob over file paths.
    Path,
    /// Literal secret value the scanner should ignore.
    RawValue,
    /// Scanner rule id to disable.
    Rule,
}

impl ExclusionType {
    /// All types, in the order they are sent to the scanner.
    pub const ALL: [Self; 3] = [Self::Path, Self::RawValue, Self::Rule];

    /// Name used by the scanning service.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Path => "EXCLUSION_TYPE_PATH",
            Self::RawValue => "EXCLUSION_TYPE_RAW_VALUE",
            Self::Rule => "EXCLUSION_TYPE_RULE",
        }
    }
}

/// A configured exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExclusionRule {
    /// Kind of rule.
    #[serde(rename = "type")]
    pub exclusion_type: ExclusionType,
    /// Glob, raw value or rule id depending on the type.
    pub value: String,
    /// Inactive rules are ignored entirely.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ExclusionRule {
    /// Creates an active rule.
    pub fn new(exclusion_type: ExclusionType, value: impl Into<String>) -> Self {
        Self {
            exclusion_type,
            value: value.into(),
            active: true,
        }
    }
}

/// Groups the active exclusions of a project and matches paths against them.
pub struct ExclusionsManager {
    exclusions: HashMap<ExclusionType, Vec<ExclusionRule>>,
    path_matchers: Vec<(String, GlobMatcher)>,
    max_path_depth: usize,
    auditor: Arc<dyn Auditor>,
}

impl ExclusionsManager {
    /// Builds the manager from the configured rules.
    ///
    /// Without the exclusions entitlement the manager holds no rules at all.
    /// Each type keeps at most `max_exclusions_per_type` active rules, in
    /// configuration order.
    pub fn new(config: &ScanConfig, auditor: Arc<dyn Auditor>) -> Self {
        let mut exclusions: HashMap<ExclusionType, Vec<ExclusionRule>> = HashMap::new();

        if config.exclusions_licensed {
            for rule in config.exclusions.iter().filter(|rule| rule.active) {
                let group = exclusions.entry(rule.exclusion_type).or_default();
                if group.len() < config.limits.max_exclusions_per_type {
                    group.push(rule.clone());
                }
            }
        }

        let path_matchers = exclusions
            .get(&ExclusionType::Path)
            .into_iter()
            .flatten()
            .filter_map(|rule| compile_path_rule(&rule.value))
            .collect();

        Self {
            exclusions,
            path_matchers,
            max_path_depth: config.limits.max_path_depth,
            auditor,
        }
    }

    /// Active rules grouped by type.
    pub fn active_exclusions(&self) -> &HashMap<ExclusionType, Vec<ExclusionRule>> {
        &self.exclusions
    }

    /// Active rules of every type in a stable order.
    pub fn all_rules(&self) -> impl Iterator<Item = &ExclusionRule> {
        ExclusionType::ALL
            .into_iter()
            .filter_map(|kind| self.exclusions.get(&kind))
            .flatten()
    }

    /// Returns true when `path` matches an active path rule.
    ///
    /// Paths deeper than the configured depth never match. The first
    /// matching rule is audited.
    pub fn matches_excluded_path(&self, path: &str) -> bool {
        if path.split('/').count() > self.max_path_depth {
            debug!(path, "Path too deep for exclusion matching");
            return false;
        }

        let Some((rule, _)) = self
            .path_matchers
            .iter()
            .find(|(_, matcher)| matcher.is_match(path))
        else {
            return false;
        };

        self.auditor.audit(AuditEvent::PathExcluded {
            rule: rule.clone(),
            path: path.to_string(),
        });
        true
    }
}

fn compile_path_rule(pattern: &str) -> Option<(String, GlobMatcher)> {
    match GlobBuilder::new(pattern).literal_separator(true).build() {
        Ok(glob) => Some((pattern.to_string(), glob.compile_matcher())),
        Err(e) => {
            warn!(pattern, error = %e, "Ignoring invalid path exclusion");
            None
        }
    }
}
