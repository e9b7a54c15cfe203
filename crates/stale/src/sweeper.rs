//! Lifecycle sweeper: marks idle items stale and closes aged stale items.
//!
//! One sweep per item kind:
//!
//! 1. Search for open, idle, non-exempt items without the stale label and
//!    mark each (optional comment, then the stale label).
//! 2. If closing is configured, search for items carrying the stale label
//!    that stayed idle past the close age and close each (optional comment,
//!    then state change).
//!
//! Items within a phase are dispatched concurrently; the mark phase finishes
//! before the close phase starts. Every mark or close attempt draws from one
//! [`RunBudget`] scoped to the sweep.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, trace, warn};
use tracker::{IssueTracker, ItemKind, ItemState, RepoRef, TrackedItem, TrackerError};

use crate::budget::RunBudget;
use crate::classifier::{classify, closable_query, stale_query, Classification};
use crate::config::{EffectiveConfig, StaleConfig};
use crate::error::{ignore_not_found, Result};

/// Colour given to a freshly created stale label.
pub const STALE_LABEL_COLOR: &str = "ffffff";

/// What happened to one candidate item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Mutations were issued.
    Performed,
    /// Dry-run: logged only.
    DryRun,
    /// Budget spent; nothing was done.
    OverBudget,
    /// A tracker call failed; other items were unaffected.
    Failed,
}

/// Summary of one sweep over one item kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub kind: ItemKind,
    /// The kind was excluded by `only`.
    pub skipped: bool,
    pub marked: usize,
    pub closed: usize,
    pub dry_run: usize,
    pub over_budget: usize,
    /// Locked, exempt or already-stale candidates that were left alone.
    pub ignored: usize,
    pub failed: usize,
    pub closing_enabled: bool,
    pub remaining_budget: u32,
}

impl SweepReport {
    fn new(kind: ItemKind) -> Self {
        Self {
            kind,
            skipped: false,
            marked: 0,
            closed: 0,
            dry_run: 0,
            over_budget: 0,
            ignored: 0,
            failed: 0,
            closing_enabled: false,
            remaining_budget: 0,
        }
    }

    fn tally(&mut self, outcomes: &[ActionOutcome], performed: fn(&mut Self)) {
        for outcome in outcomes {
            match outcome {
                ActionOutcome::Performed => performed(self),
                ActionOutcome::DryRun => self.dry_run += 1,
                ActionOutcome::OverBudget => self.over_budget += 1,
                ActionOutcome::Failed => self.failed += 1,
            }
        }
    }
}

/// Runs mark-and-sweep passes for one repository.
pub struct Sweeper<'a> {
    tracker: &'a dyn IssueTracker,
    repo: &'a RepoRef,
    config: &'a StaleConfig,
}

impl<'a> Sweeper<'a> {
    pub fn new(tracker: &'a dyn IssueTracker, repo: &'a RepoRef, config: &'a StaleConfig) -> Self {
        Self {
            tracker,
            repo,
            config,
        }
    }

    /// Sweep pull requests, then issues.
    pub async fn sweep_all(&self, now: DateTime<Utc>) -> Result<Vec<SweepReport>> {
        let mut reports = Vec::with_capacity(ItemKind::ALL.len());
        for kind in ItemKind::ALL {
            reports.push(self.mark_and_sweep(kind, now).await?);
        }
        Ok(reports)
    }

    /// Sweep a kind given by name (`issues` / `pulls`).
    pub async fn mark_and_sweep_type(&self, kind: &str, now: DateTime<Utc>) -> Result<SweepReport> {
        let kind = kind.parse::<ItemKind>()?;
        self.mark_and_sweep(kind, now).await
    }

    /// One full pass over `kind`.
    ///
    /// Search failures abort the pass; failures on individual items are
    /// counted in the report.
    pub async fn mark_and_sweep(&self, kind: ItemKind, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::new(kind);

        if !self.config.includes(kind) {
            debug!(kind = %kind, "Sweep restricted by 'only', skipping");
            report.skipped = true;
            return Ok(report);
        }

        let config = self.config.for_kind(kind);
        let budget = RunBudget::new(config.action_limit());

        info!(
            owner = %self.repo.owner,
            repo = %self.repo.name,
            kind = %kind,
            limit = budget.remaining(),
            "Starting stale mark and sweep"
        );

        // Mark phase.
        let query = stale_query(self.repo, kind, config, now);
        info!(q = %query.render(), "Searching {} for stale items", self.repo);
        let found = self.tracker.search_open_items(&query).await?;
        let candidates = self.actionable(config, found, Classification::Active, &mut report);

        if !candidates.is_empty() && config.perform {
            self.ensure_stale_label_exists(config).await?;
        }

        let outcomes = join_all(
            candidates
                .iter()
                .map(|item| self.mark(config, item, &budget)),
        )
        .await;
        report.tally(&outcomes, |r| r.marked += 1);

        // Close phase.
        match closable_query(self.repo, kind, config, now) {
            Some(query) => {
                trace!(owner = %self.repo.owner, repo = %self.repo.name, "Configured to close stale items");
                report.closing_enabled = true;

                let found = self.tracker.search_open_items(&query).await?;
                let candidates = self.actionable(config, found, Classification::Stale, &mut report);

                let outcomes = join_all(
                    candidates
                        .iter()
                        .map(|item| self.close(config, item, &budget)),
                )
                .await;
                report.tally(&outcomes, |r| r.closed += 1);
            }
            None => {
                trace!(owner = %self.repo.owner, repo = %self.repo.name, "Configured to leave stale items open");
            }
        }

        report.remaining_budget = budget.remaining();
        info!(
            kind = %kind,
            marked = report.marked,
            closed = report.closed,
            dry_run = report.dry_run,
            over_budget = report.over_budget,
            failed = report.failed,
            "Finished stale mark and sweep"
        );
        Ok(report)
    }

    /// Drop locked items and items whose labels no longer fit the phase.
    fn actionable(
        &self,
        config: &EffectiveConfig,
        found: Vec<TrackedItem>,
        expected: Classification,
        report: &mut SweepReport,
    ) -> Vec<TrackedItem> {
        found
            .into_iter()
            .filter(|item| {
                let keep = !item.locked && classify(config, item) == expected;
                if !keep {
                    debug!(
                        repo = %self.repo,
                        number = item.number,
                        locked = item.locked,
                        "Leaving item alone"
                    );
                    report.ignored += 1;
                }
                keep
            })
            .collect()
    }

    /// Fetch-or-create the stale label.
    async fn ensure_stale_label_exists(&self, config: &EffectiveConfig) -> Result<()> {
        if self
            .tracker
            .get_label(self.repo, &config.stale_label)
            .await?
            .is_some()
        {
            return Ok(());
        }

        info!(repo = %self.repo, label = %config.stale_label, "Creating stale label");
        match self
            .tracker
            .create_label(self.repo, &config.stale_label, STALE_LABEL_COLOR)
            .await
        {
            Err(TrackerError::Validation(message)) => {
                debug!(message = %message, "Stale label already exists");
                Ok(())
            }
            other => other.map_err(Into::into),
        }
    }

    async fn mark(
        &self,
        config: &EffectiveConfig,
        item: &TrackedItem,
        budget: &RunBudget,
    ) -> ActionOutcome {
        if !budget.try_consume() {
            debug!(repo = %self.repo, number = item.number, "Action budget spent, not marking");
            return ActionOutcome::OverBudget;
        }

        let number = item.number;
        if !config.perform {
            info!("{}#{} would have been marked (dry-run)", self.repo, number);
            return ActionOutcome::DryRun;
        }

        info!("{}#{} is being marked", self.repo, number);
        let result = async {
            if let Some(comment) = &config.mark_comment {
                ignore_not_found(self.tracker.create_comment(self.repo, number, comment).await)?;
            }
            ignore_not_found(
                self.tracker
                    .add_label(self.repo, number, &config.stale_label)
                    .await,
            )
        }
        .await;

        Self::outcome(result, self.repo, number, "mark")
    }

    async fn close(
        &self,
        config: &EffectiveConfig,
        item: &TrackedItem,
        budget: &RunBudget,
    ) -> ActionOutcome {
        if !budget.try_consume() {
            debug!(repo = %self.repo, number = item.number, "Action budget spent, not closing");
            return ActionOutcome::OverBudget;
        }

        let number = item.number;
        if !config.perform {
            info!("{}#{} would have been closed (dry-run)", self.repo, number);
            return ActionOutcome::DryRun;
        }

        info!("{}#{} is being closed", self.repo, number);
        let result = async {
            if let Some(comment) = &config.close_comment {
                ignore_not_found(self.tracker.create_comment(self.repo, number, comment).await)?;
            }
            ignore_not_found(
                self.tracker
                    .update_state(self.repo, number, ItemState::Closed)
                    .await,
            )
        }
        .await;

        Self::outcome(result, self.repo, number, "close")
    }

    fn outcome(
        result: std::result::Result<(), TrackerError>,
        repo: &RepoRef,
        number: u64,
        action: &str,
    ) -> ActionOutcome {
        match result {
            Ok(()) => ActionOutcome::Performed,
            Err(e) => {
                warn!(repo = %repo, number, action, error = %e, "Item action failed");
                ActionOutcome::Failed
            }
        }
    }
}
