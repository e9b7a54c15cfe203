//! Layered configuration for the lifecycle engine.
//!
//! Resolution order: built-in defaults < repository document top level <
//! per-kind sub-document (`issues:` / `pulls:`). Each layer is a typed record
//! of optional overrides, merged once into one [`EffectiveConfig`] per
//! [`ItemKind`].
//!
//! Malformed values never abort a run: the offending key is dropped, a
//! [`ConfigWarning`] is recorded, and the lower layer's value applies.

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};
use tracker::ItemKind;

use crate::error::{Result, StaleError};

/// Hard cap on mutating actions per sweep, whatever `limitPerRun` says.
pub const MAX_ACTIONS_PER_RUN: u32 = 30;

const DEFAULT_MARK_COMMENT: &str = "This issue has been automatically marked as stale because \
it has not had any recent activity.  It will be closed in 7 days if no further activity occurs.  \
Thank you for your contributions! :+1:";

const DEFAULT_APPROVAL_COMMENT: &str =
    "Second approval provided automatically after 24 hours. :+1:";

const KNOWN_KEYS: &[&str] = &[
    "daysUntilStale",
    "daysUntilClose",
    "days",
    "staleLabel",
    "exemptLabels",
    "exemptProjects",
    "exemptMilestones",
    "exemptAssignees",
    "markComment",
    "unmarkComment",
    "closeComment",
    "limitPerRun",
    "perform",
    "approvalComment",
];

/// Fully resolved settings for one item kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
    pub days_until_stale: u64,
    /// `None` means stale items are never closed.
    pub days_until_close: Option<u64>,
    /// Overrides both the stale and the close age when set.
    pub days: Option<u64>,
    pub stale_label: String,
    pub exempt_labels: Vec<String>,
    pub exempt_projects: bool,
    pub exempt_milestones: bool,
    pub exempt_assignees: bool,
    pub mark_comment: Option<String>,
    pub unmark_comment: Option<String>,
    pub close_comment: Option<String>,
    pub limit_per_run: u32,
    /// `false` turns every mutation into a logged dry-run notation.
    pub perform: bool,
    pub approval_comment: String,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            days_until_stale: 30,
            days_until_close: Some(7),
            days: None,
            stale_label: "s: stale".to_string(),
            exempt_labels: vec!["s: keep open".to_string()],
            exempt_projects: false,
            exempt_milestones: true,
            exempt_assignees: false,
            mark_comment: Some(DEFAULT_MARK_COMMENT.to_string()),
            unmark_comment: None,
            close_comment: None,
            limit_per_run: MAX_ACTIONS_PER_RUN,
            perform: true,
            approval_comment: DEFAULT_APPROVAL_COMMENT.to_string(),
        }
    }
}

impl EffectiveConfig {
    /// Age in days after which an active item becomes stale.
    pub fn stale_after_days(&self) -> u64 {
        self.days.unwrap_or(self.days_until_stale)
    }

    /// Age in days after which a stale item is closed; `None` disables closing.
    pub fn close_after_days(&self) -> Option<u64> {
        self.days_until_close.map(|d| self.days.unwrap_or(d))
    }

    /// Number of actions a sweep may consume.
    pub fn action_limit(&self) -> u32 {
        match self.limit_per_run {
            0 => MAX_ACTIONS_PER_RUN,
            n => n.min(MAX_ACTIONS_PER_RUN),
        }
    }
}

/// One layer of optional overrides.
///
/// Doubly-optional fields distinguish "not set" (`None`) from "explicitly
/// disabled" (`Some(None)`, written `false` in the document).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub days_until_stale: Option<u64>,
    pub days_until_close: Option<Option<u64>>,
    /// `Some(None)` is an explicit `days: 0`, which shadows lower layers.
    pub days: Option<Option<u64>>,
    pub stale_label: Option<String>,
    pub exempt_labels: Option<Vec<String>>,
    pub exempt_projects: Option<bool>,
    pub exempt_milestones: Option<bool>,
    pub exempt_assignees: Option<bool>,
    pub mark_comment: Option<Option<String>>,
    pub unmark_comment: Option<Option<String>>,
    pub close_comment: Option<Option<String>>,
    pub limit_per_run: Option<u32>,
    pub perform: Option<bool>,
    pub approval_comment: Option<String>,
}

impl ConfigLayer {
    /// Overlay this layer on `base`; keys set here always win.
    #[must_use]
    pub fn apply(&self, base: &EffectiveConfig) -> EffectiveConfig {
        EffectiveConfig {
            days_until_stale: self.days_until_stale.unwrap_or(base.days_until_stale),
            days_until_close: self.days_until_close.unwrap_or(base.days_until_close),
            days: self.days.unwrap_or(base.days),
            stale_label: pick(&self.stale_label, &base.stale_label),
            exempt_labels: pick(&self.exempt_labels, &base.exempt_labels),
            exempt_projects: self.exempt_projects.unwrap_or(base.exempt_projects),
            exempt_milestones: self.exempt_milestones.unwrap_or(base.exempt_milestones),
            exempt_assignees: self.exempt_assignees.unwrap_or(base.exempt_assignees),
            mark_comment: pick(&self.mark_comment, &base.mark_comment),
            unmark_comment: pick(&self.unmark_comment, &base.unmark_comment),
            close_comment: pick(&self.close_comment, &base.close_comment),
            limit_per_run: self.limit_per_run.unwrap_or(base.limit_per_run),
            perform: self.perform.unwrap_or(base.perform),
            approval_comment: pick(&self.approval_comment, &base.approval_comment),
        }
    }

    fn parse(map: &Mapping, scope: &str, warnings: &mut Vec<ConfigWarning>) -> Self {
        let mut parser = LayerParser {
            map,
            scope,
            warnings,
        };

        Self {
            days_until_stale: parser.field("daysUntilStale", as_days),
            days_until_close: parser.field("daysUntilClose", as_optional_days),
            days: parser.field("days", as_days_override),
            stale_label: parser.field("staleLabel", as_label),
            exempt_labels: parser.field("exemptLabels", as_label_list),
            exempt_projects: parser.field("exemptProjects", Value::as_bool),
            exempt_milestones: parser.field("exemptMilestones", Value::as_bool),
            exempt_assignees: parser.field("exemptAssignees", Value::as_bool),
            mark_comment: parser.field("markComment", as_optional_text),
            unmark_comment: parser.field("unmarkComment", as_optional_text),
            close_comment: parser.field("closeComment", as_optional_text),
            limit_per_run: parser.field("limitPerRun", as_limit),
            perform: parser.field("perform", Value::as_bool),
            approval_comment: parser.field("approvalComment", as_text),
        }
    }
}

fn pick<T: Clone>(over: &Option<T>, base: &T) -> T {
    over.as_ref().unwrap_or(base).clone()
}

/// A configuration value that was dropped during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// Dotted key path, e.g. `pulls.limitPerRun`.
    pub key: String,
    pub message: String,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

struct LayerParser<'a> {
    map: &'a Mapping,
    scope: &'a str,
    warnings: &'a mut Vec<ConfigWarning>,
}

impl LayerParser<'_> {
    fn field<T>(&mut self, key: &str, convert: impl Fn(&Value) -> Option<T>) -> Option<T> {
        let value = self.map.get(key)?;
        let converted = convert(value);
        if converted.is_none() {
            let key = if self.scope.is_empty() {
                key.to_string()
            } else {
                format!("{}.{key}", self.scope)
            };
            self.warnings.push(ConfigWarning {
                key,
                message: format!("invalid value {}", describe(value)),
            });
        }
        converted
    }
}

fn describe(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "<unprintable>".to_string())
}

fn as_days(value: &Value) -> Option<u64> {
    value.as_u64()
}

/// `0`, `false` and null all leave stale items open.
fn as_optional_days(value: &Value) -> Option<Option<u64>> {
    match value {
        Value::Null | Value::Bool(false) => Some(None),
        other => other.as_u64().map(|d| (d > 0).then_some(d)),
    }
}

/// `days: 0` means no override.
fn as_days_override(value: &Value) -> Option<Option<u64>> {
    value.as_u64().map(|d| (d > 0).then_some(d))
}

fn as_text(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn as_optional_text(value: &Value) -> Option<Option<String>> {
    match value {
        Value::Null | Value::Bool(false) => Some(None),
        Value::String(s) => Some(Some(s.clone())),
        _ => None,
    }
}

/// Non-empty label name without `"`; it is quoted in search queries.
fn as_label(value: &Value) -> Option<String> {
    as_text(value).filter(|name| !name.is_empty() && !name.contains('"'))
}

fn as_label_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(_) => as_label(value).map(|name| vec![name]),
        Value::Sequence(seq) => seq.iter().map(as_label).collect(),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

fn as_limit(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| (1..=MAX_ACTIONS_PER_RUN).contains(n))
}

/// A parsed repository configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    pub top: ConfigLayer,
    pub issues: ConfigLayer,
    pub pulls: ConfigLayer,
    /// Restrict sweeps to a single kind.
    pub only: Option<ItemKind>,
}

impl ConfigDocument {
    /// Parse a YAML document, collecting warnings for every dropped value.
    ///
    /// Never fails: unparseable input yields an empty document and a warning.
    pub fn parse(source: &str) -> (Self, Vec<ConfigWarning>) {
        let mut warnings = Vec::new();

        let root: Value = match serde_yaml::from_str(source) {
            Ok(value) => value,
            Err(e) => {
                warnings.push(ConfigWarning {
                    key: String::new(),
                    message: format!("unparseable document: {e}"),
                });
                return (Self::default(), warnings);
            }
        };

        let map = match root {
            Value::Mapping(map) => map,
            Value::Null => return (Self::default(), warnings),
            other => {
                warnings.push(ConfigWarning {
                    key: String::new(),
                    message: format!("expected a mapping, found {}", describe(&other)),
                });
                return (Self::default(), warnings);
            }
        };

        for key in map.keys() {
            match key.as_str() {
                Some(k) if KNOWN_KEYS.contains(&k) || matches!(k, "issues" | "pulls" | "only") => {}
                Some(k) => debug!(key = k, "Ignoring unrecognized configuration key"),
                None => debug!("Ignoring non-string configuration key"),
            }
        }

        let top = ConfigLayer::parse(&map, "", &mut warnings);
        let issues = Self::sub_layer(&map, ItemKind::Issue, &mut warnings);
        let pulls = Self::sub_layer(&map, ItemKind::PullRequest, &mut warnings);

        let only = match map.get("only") {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_str().map(str::parse::<ItemKind>) {
                Some(Ok(kind)) => Some(kind),
                _ => {
                    warnings.push(ConfigWarning {
                        key: "only".to_string(),
                        message: format!(
                            "invalid value {}, expected 'issues' or 'pulls'",
                            describe(value)
                        ),
                    });
                    None
                }
            },
        };

        (
            Self {
                top,
                issues,
                pulls,
                only,
            },
            warnings,
        )
    }

    fn sub_layer(map: &Mapping, kind: ItemKind, warnings: &mut Vec<ConfigWarning>) -> ConfigLayer {
        match map.get(kind.as_str()) {
            None | Some(Value::Null) => ConfigLayer::default(),
            Some(Value::Mapping(sub)) => ConfigLayer::parse(sub, kind.as_str(), warnings),
            Some(other) => {
                warnings.push(ConfigWarning {
                    key: kind.as_str().to_string(),
                    message: format!("expected a mapping, found {}", describe(other)),
                });
                ConfigLayer::default()
            }
        }
    }

    /// The per-kind override layer.
    pub fn layer(&self, kind: ItemKind) -> &ConfigLayer {
        match kind {
            ItemKind::Issue => &self.issues,
            ItemKind::PullRequest => &self.pulls,
        }
    }
}

/// Effective settings for both kinds, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleConfig {
    pub issues: EffectiveConfig,
    pub pulls: EffectiveConfig,
    pub only: Option<ItemKind>,
}

impl Default for StaleConfig {
    fn default() -> Self {
        resolve(&EffectiveConfig::default(), &ConfigDocument::default())
    }
}

impl StaleConfig {
    /// Settings for one kind.
    pub fn for_kind(&self, kind: ItemKind) -> &EffectiveConfig {
        match kind {
            ItemKind::Issue => &self.issues,
            ItemKind::PullRequest => &self.pulls,
        }
    }

    /// Whether sweeps should visit this kind.
    pub fn includes(&self, kind: ItemKind) -> bool {
        self.only.is_none_or(|only| only == kind)
    }

    /// Force dry-run on every kind.
    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.issues.perform = false;
        self.pulls.perform = false;
        self
    }
}

/// Pure merge of defaults, document top level and per-kind overrides.
pub fn resolve(defaults: &EffectiveConfig, document: &ConfigDocument) -> StaleConfig {
    let base = document.top.apply(defaults);
    StaleConfig {
        issues: document.layer(ItemKind::Issue).apply(&base),
        pulls: document.layer(ItemKind::PullRequest).apply(&base),
        only: document.only,
    }
}

/// Outcome of resolving a document: the config plus anything that was dropped.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub config: StaleConfig,
    pub warnings: Vec<ConfigWarning>,
}

/// Parse and resolve a YAML document, logging each validation warning.
pub fn resolve_source(defaults: &EffectiveConfig, source: &str) -> Resolution {
    let (document, warnings) = ConfigDocument::parse(source);
    for warning in &warnings {
        warn!(key = %warning.key, message = %warning.message, "Invalid config");
    }
    Resolution {
        config: resolve(defaults, &document),
        warnings,
    }
}

/// Read a configuration file and resolve it.
pub fn resolve_file(defaults: &EffectiveConfig, path: &Path) -> Result<Resolution> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| StaleError::Config(format!("{}: {e}", path.display())))?;
    Ok(resolve_source(defaults, &source))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_str(source: &str) -> Resolution {
        resolve_source(&EffectiveConfig::default(), source)
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let resolution = resolve_str("");
        assert!(resolution.warnings.is_empty());
        assert_eq!(resolution.config.issues, EffectiveConfig::default());
        assert_eq!(resolution.config.pulls, EffectiveConfig::default());
        assert_eq!(resolution.config.only, None);
    }

    #[test]
    fn test_type_key_overrides_top_level() {
        let resolution = resolve_str(
            "daysUntilStale: 60\nstaleLabel: wontfix\npulls:\n  daysUntilStale: 14\n",
        );
        let config = resolution.config;
        assert_eq!(config.issues.days_until_stale, 60);
        assert_eq!(config.pulls.days_until_stale, 14);
        // Keys not overridden per kind fall through to the top level.
        assert_eq!(config.pulls.stale_label, "wontfix");
        assert_eq!(config.issues.stale_label, "wontfix");
    }

    #[test]
    fn test_false_disables_close_and_comments() {
        let config = resolve_str(
            "markComment: false\nissues:\n  daysUntilClose: false\n  closeComment: Closing.\n",
        )
        .config;
        assert_eq!(config.issues.days_until_close, None);
        assert_eq!(config.issues.close_after_days(), None);
        assert_eq!(config.pulls.days_until_close, Some(7));
        assert_eq!(config.issues.mark_comment, None);
        assert_eq!(config.issues.close_comment.as_deref(), Some("Closing."));
        assert_eq!(config.pulls.close_comment, None);
    }

    #[test]
    fn test_type_override_can_reenable_close() {
        let config = resolve_str("daysUntilClose: false\npulls:\n  daysUntilClose: 3\n").config;
        assert_eq!(config.issues.close_after_days(), None);
        assert_eq!(config.pulls.close_after_days(), Some(3));
    }

    #[test]
    fn test_days_overrides_both_ages() {
        let config = resolve_str("days: 10\n").config;
        assert_eq!(config.issues.stale_after_days(), 10);
        assert_eq!(config.issues.close_after_days(), Some(10));

        let config = resolve_str("days: 10\ndaysUntilClose: false\n").config;
        assert_eq!(config.issues.close_after_days(), None);
    }

    #[test]
    fn test_invalid_values_degrade_with_warning() {
        let resolution = resolve_str(
            "daysUntilStale: soon\nlimitPerRun: 500\npulls:\n  perform: maybe\nonly: everything\n",
        );
        let keys: Vec<&str> = resolution.warnings.iter().map(|w| w.key.as_str()).collect();
        assert_eq!(keys, vec!["daysUntilStale", "limitPerRun", "pulls.perform", "only"]);

        let config = resolution.config;
        assert_eq!(config.issues.days_until_stale, 30);
        assert_eq!(config.issues.limit_per_run, MAX_ACTIONS_PER_RUN);
        assert!(config.pulls.perform);
        assert_eq!(config.only, None);
    }

    #[test]
    fn test_non_mapping_document() {
        let resolution = resolve_str("- just\n- a list\n");
        assert_eq!(resolution.warnings.len(), 1);
        assert_eq!(resolution.config, StaleConfig::default());

        let resolution = resolve_str("daysUntilStale: [unclosed");
        assert_eq!(resolution.warnings.len(), 1);
        assert_eq!(resolution.config, StaleConfig::default());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let resolution = resolve_str("onlyLabels: [bug]\nsomethingElse: 3\n");
        assert!(resolution.warnings.is_empty());
        assert_eq!(resolution.config, StaleConfig::default());
    }

    #[test]
    fn test_exempt_labels_forms() {
        let config = resolve_str("exemptLabels: pinned\n").config;
        assert_eq!(config.issues.exempt_labels, vec!["pinned".to_string()]);

        let config = resolve_str("exemptLabels:\n  - pinned\n  - security\n").config;
        assert_eq!(
            config.issues.exempt_labels,
            vec!["pinned".to_string(), "security".to_string()]
        );

        let resolution = resolve_str("exemptLabels:\n  - pinned\n  - 3\n");
        assert_eq!(resolution.warnings.len(), 1);
        assert_eq!(
            resolution.config.issues.exempt_labels,
            vec!["s: keep open".to_string()]
        );
    }

    #[test]
    fn test_only_restricts_kinds() {
        let config = resolve_str("only: pulls\n").config;
        assert!(config.includes(ItemKind::PullRequest));
        assert!(!config.includes(ItemKind::Issue));
        assert!(StaleConfig::default().includes(ItemKind::Issue));
    }

    #[test]
    fn test_action_limit_capped() {
        let mut config = EffectiveConfig::default();
        config.limit_per_run = 2;
        assert_eq!(config.action_limit(), 2);
        config.limit_per_run = 0;
        assert_eq!(config.action_limit(), MAX_ACTIONS_PER_RUN);
        config.limit_per_run = 100;
        assert_eq!(config.action_limit(), MAX_ACTIONS_PER_RUN);
    }

    #[test]
    fn test_dry_run_forces_both_kinds() {
        let config = resolve_str("perform: true\n").config.dry_run();
        assert!(!config.issues.perform);
        assert!(!config.pulls.perform);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = resolve_file(
            &EffectiveConfig::default(),
            Path::new("/nonexistent/stale.yml"),
        )
        .unwrap_err();
        assert!(matches!(err, StaleError::Config(_)));
        assert!(err.to_string().contains("/nonexistent/stale.yml"));
    }

    #[test]
    fn test_zero_days_until_close_disables_closing() {
        let resolution = resolve_str("daysUntilClose: 0\n");
        assert!(resolution.warnings.is_empty());
        assert_eq!(resolution.config.issues.close_after_days(), None);
        assert_eq!(resolution.config.pulls.close_after_days(), None);

        let config = resolve_str("days: 10\npulls:\n  daysUntilClose: 0\n").config;
        assert_eq!(config.issues.close_after_days(), Some(10));
        assert_eq!(config.pulls.close_after_days(), None);
    }

    #[test]
    fn test_zero_days_falls_back_to_per_setting_ages() {
        let resolution = resolve_str("days: 0\ndaysUntilStale: 45\n");
        assert!(resolution.warnings.is_empty());
        assert_eq!(resolution.config.issues.days, None);
        assert_eq!(resolution.config.issues.stale_after_days(), 45);
        assert_eq!(resolution.config.issues.close_after_days(), Some(7));

        // A per-kind zero shadows a top-level override.
        let config = resolve_str("days: 10\nissues:\n  days: 0\n").config;
        assert_eq!(config.issues.stale_after_days(), 30);
        assert_eq!(config.pulls.stale_after_days(), 10);
    }

    #[test]
    fn test_quoted_label_names_rejected() {
        let resolution = resolve_str(
            "staleLabel: 'say \"stale\"'\nexemptLabels:\n  - pinned\n  - 'a\"b'\n",
        );
        let keys: Vec<&str> = resolution.warnings.iter().map(|w| w.key.as_str()).collect();
        assert_eq!(keys, vec!["staleLabel", "exemptLabels"]);
        assert_eq!(resolution.config.issues.stale_label, "s: stale");
        assert_eq!(
            resolution.config.issues.exempt_labels,
            vec!["s: keep open".to_string()]
        );
    }
}
