//! Exemption and staleness classification.

use chrono::{DateTime, Duration, Utc};
use tracker::{ItemKind, RepoRef, SearchQuery, TrackedItem};

use crate::config::EffectiveConfig;

/// Where an item stands relative to the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Carries an exempt label; never marked or closed.
    Exempt,
    /// Already carries the stale label.
    Stale,
    /// Neither exempt nor stale.
    Active,
}

/// True if any of the item's labels is an exempt label.
pub fn has_exempt_label(config: &EffectiveConfig, item: &TrackedItem) -> bool {
    item.labels
        .iter()
        .any(|label| config.exempt_labels.contains(&label.name))
}

/// True if the stale label is present.
pub fn has_stale_label(config: &EffectiveConfig, item: &TrackedItem) -> bool {
    item.has_label(&config.stale_label)
}

pub fn classify(config: &EffectiveConfig, item: &TrackedItem) -> Classification {
    if has_exempt_label(config, item) {
        Classification::Exempt
    } else if has_stale_label(config, item) {
        Classification::Stale
    } else {
        Classification::Active
    }
}

/// `now - days`, clamped to the Unix epoch.
///
/// Day counts too large to represent also clamp to the epoch.
pub fn since(now: DateTime<Utc>, days: u64) -> DateTime<Utc> {
    i64::try_from(days)
        .ok()
        .and_then(Duration::try_days)
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .filter(|date| *date >= DateTime::<Utc>::UNIX_EPOCH)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Open items of `kind`, idle for `stale_after_days`, not yet stale and not
/// exempt.
pub fn stale_query(
    repo: &RepoRef,
    kind: ItemKind,
    config: &EffectiveConfig,
    now: DateTime<Utc>,
) -> SearchQuery {
    let without_labels = std::iter::once(config.stale_label.clone())
        .chain(config.exempt_labels.iter().cloned())
        .collect();

    SearchQuery {
        kind: Some(kind),
        updated_before: Some(since(now, config.stale_after_days())),
        without_labels,
        no_project: config.exempt_projects,
        no_milestone: config.exempt_milestones,
        no_assignee: config.exempt_assignees,
        ..SearchQuery::open_items(repo.clone())
    }
}

/// Open items of `kind` already carrying the stale label and idle for the
/// close age. `None` when closing is disabled for this kind.
pub fn closable_query(
    repo: &RepoRef,
    kind: ItemKind,
    config: &EffectiveConfig,
    now: DateTime<Utc>,
) -> Option<SearchQuery> {
    let days = config.close_after_days()?;

    Some(SearchQuery {
        kind: Some(kind),
        updated_before: Some(since(now, days)),
        with_labels: vec![config.stale_label.clone()],
        ..SearchQuery::open_items(repo.clone())
    })
}
