//! Automatic second approval for pull requests.
//!
//! A pull request gets one automated approval once exactly one distinct
//! member of the reviewer team has approved it and that approval is older
//! than the cool-down. Two approvals in total are required before merge, and
//! the automation supplies the second.
//!
//! Counting rules:
//! - An approval counts when its state is `APPROVED`, it was submitted more
//!   than [`APPROVAL_COOL_DOWN_DAYS`] ago, the author association is not
//!   `NONE`, and the reviewer is a member of the reviewer team.
//! - Each reviewer counts once, whatever the number of approvals they left.
//! - An approval by the automation login counts regardless of age, team or
//!   association, and suppresses any further automated approval.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use tracker::{
    AuthorAssociation, IssueTracker, ItemKind, RepoRef, Review, ReviewEvent, ReviewState,
    SearchQuery, TeamRef, TrackedItem,
};

use crate::classifier::since;
use crate::config::StaleConfig;
use crate::error::Result;
use crate::pagination::Paginated;

/// Approvals younger than this do not count.
pub const APPROVAL_COOL_DOWN_DAYS: u64 = 1;

/// The identity the bot acts as, and the team whose approvals count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Automation {
    pub login: String,
    pub team: TeamRef,
}

impl Automation {
    fn is_me(&self, login: &str) -> bool {
        self.login.eq_ignore_ascii_case(login)
    }
}

/// A submitted review reduced to the fields approval counting needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRecord {
    pub state: ReviewState,
    pub association: AuthorAssociation,
    pub reviewer: String,
    pub submitted_at: DateTime<Utc>,
}

impl ApprovalRecord {
    /// `None` for pending reviews and reviews by deleted accounts.
    pub fn from_review(review: &Review) -> Option<Self> {
        Some(Self {
            state: review.state,
            association: review.author_association,
            reviewer: review.reviewer.clone()?,
            submitted_at: review.submitted_at?,
        })
    }

    fn is_approval(&self) -> bool {
        self.state == ReviewState::Approved
    }
}

/// What the engine decided for one pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Exactly one qualifying approval: post the second.
    Approve,
    /// The automation already approved.
    AlreadyApproved,
    /// Zero, or two or more, qualifying approvals.
    NoAction { approvals: usize },
}

/// Unique qualifying approvals and the resulting decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalTally {
    /// Distinct reviewers whose approval counts, in first-seen order.
    pub reviewers: Vec<String>,
    pub automation_approved: bool,
    pub decision: ApprovalDecision,
}

/// Count unique qualifying approvals and decide.
pub fn tally_approvals(
    records: &[ApprovalRecord],
    team: &HashSet<String>,
    automation: &Automation,
    now: DateTime<Utc>,
) -> ApprovalTally {
    let cutoff = since(now, APPROVAL_COOL_DOWN_DAYS);

    let mut seen = HashSet::new();
    let mut reviewers: Vec<String> = records
        .iter()
        .filter(|r| {
            r.is_approval()
                && r.submitted_at < cutoff
                && r.association != AuthorAssociation::None
                && team.contains(&r.reviewer)
        })
        .filter(|r| seen.insert(r.reviewer.as_str()))
        .map(|r| r.reviewer.clone())
        .collect();

    let automation_approved = records
        .iter()
        .any(|r| r.is_approval() && automation.is_me(&r.reviewer));
    if automation_approved && !reviewers.iter().any(|r| automation.is_me(r)) {
        reviewers.push(automation.login.clone());
    }

    let decision = if automation_approved {
        ApprovalDecision::AlreadyApproved
    } else if reviewers.len() == 1 {
        ApprovalDecision::Approve
    } else {
        ApprovalDecision::NoAction {
            approvals: reviewers.len(),
        }
    };

    ApprovalTally {
        reviewers,
        automation_approved,
        decision,
    }
}

/// Summary of one auto-approval run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApprovalReport {
    pub candidates: usize,
    pub approved: usize,
    pub dry_run: usize,
    pub no_action: usize,
    pub locked: usize,
    /// Pull requests that disappeared before the approval could be posted.
    pub vanished: usize,
    pub failed: usize,
}

/// Posts second approvals on pull requests awaiting review.
pub struct Approver<'a> {
    tracker: &'a dyn IssueTracker,
    repo: &'a RepoRef,
    config: &'a StaleConfig,
    automation: &'a Automation,
}

impl<'a> Approver<'a> {
    pub fn new(
        tracker: &'a dyn IssueTracker,
        repo: &'a RepoRef,
        config: &'a StaleConfig,
        automation: &'a Automation,
    ) -> Self {
        Self {
            tracker,
            repo,
            config,
            automation,
        }
    }

    /// Open pull requests still awaiting a required review.
    pub fn standing_query(&self) -> SearchQuery {
        SearchQuery {
            kind: Some(ItemKind::PullRequest),
            review_required: true,
            ..SearchQuery::open_items(self.repo.clone())
        }
    }

    /// Run the standing query and approve where needed.
    ///
    /// A failure on one pull request is logged and counted; the others
    /// proceed.
    pub async fn auto_approve(&self, now: DateTime<Utc>) -> Result<ApprovalReport> {
        let found = self
            .tracker
            .search_open_items(&self.standing_query())
            .await?;

        let mut report = ApprovalReport {
            candidates: found.len(),
            ..ApprovalReport::default()
        };

        let (locked, pulls): (Vec<_>, Vec<_>) = found.into_iter().partition(|p| p.locked);
        report.locked = locked.len();

        let results = join_all(pulls.iter().map(|pull| self.approve_if_needed(pull, now))).await;

        for (pull, result) in pulls.iter().zip(results) {
            match result {
                Ok(Approval::Posted) => report.approved += 1,
                Ok(Approval::DryRun) => report.dry_run += 1,
                Ok(Approval::Skipped(_)) => report.no_action += 1,
                Ok(Approval::Vanished) => report.vanished += 1,
                Err(e) => {
                    warn!(repo = %self.repo, number = pull.number, error = %e, "Auto-approval failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            repo = %self.repo,
            candidates = report.candidates,
            approved = report.approved,
            failed = report.failed,
            "Auto-approval finished"
        );
        Ok(report)
    }

    /// Decide for one pull request and post the approval if warranted.
    pub async fn approve_if_needed(&self, pull: &TrackedItem, now: DateTime<Utc>) -> Result<Approval> {
        let number = pull.number;
        let config = self.config.for_kind(ItemKind::PullRequest);

        let reviews = Paginated::new(|page| self.tracker.list_reviews(self.repo, number, page))
            .drain()
            .await?;
        let records: Vec<ApprovalRecord> =
            reviews.iter().filter_map(ApprovalRecord::from_review).collect();

        // Fetched per decision so roster changes apply immediately.
        let team: HashSet<String> =
            Paginated::new(|page| self.tracker.list_team_members(&self.automation.team, page))
                .drain()
                .await?
                .into_iter()
                .collect();

        let tally = tally_approvals(&records, &team, self.automation, now);
        debug!(
            repo = %self.repo,
            number,
            reviewers = ?tally.reviewers,
            decision = ?tally.decision,
            "Counted approvals"
        );

        if tally.decision != ApprovalDecision::Approve {
            return Ok(Approval::Skipped(tally.decision));
        }

        if !config.perform {
            info!("{}#{} would have been approved (dry-run)", self.repo, number);
            return Ok(Approval::DryRun);
        }

        info!("{}#{} is being approved", self.repo, number);
        match self
            .tracker
            .create_review(self.repo, number, ReviewEvent::Approve, &config.approval_comment)
            .await
        {
            Ok(()) => Ok(Approval::Posted),
            Err(e) if e.is_not_found() => {
                debug!(repo = %self.repo, number, error = %e, "Pull request gone before approval");
                Ok(Approval::Vanished)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Result of [`Approver::approve_if_needed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Posted,
    DryRun,
    Skipped(ApprovalDecision),
    /// The pull request was gone when the review was posted.
    Vanished,
}
