//! Reverses a stale marking when an item sees new activity.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracker::{IssueTracker, ItemKind, ItemState, RepoRef};

use crate::config::StaleConfig;
use crate::error::{ignore_not_found, Result};

/// Webhook events that count as activity.
pub const ACTIVITY_EVENTS: [&str; 5] = [
    "issue_comment",
    "issues",
    "pull_request",
    "pull_request_review",
    "pull_request_review_comment",
];

/// The parts of a webhook payload the trigger reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityEvent {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub sender: Option<EventSender>,
    #[serde(default)]
    pub issue: Option<EventItem>,
    #[serde(default)]
    pub pull_request: Option<EventItem>,
    /// Present on `labeled`/`unlabeled` actions.
    #[serde(default)]
    pub label: Option<EventLabel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSender {
    pub login: String,
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
}

/// Issue or pull request as embedded in the payload. Some payloads omit
/// labels, in which case the item is fetched again.
#[derive(Debug, Clone, Deserialize)]
pub struct EventItem {
    pub number: u64,
    #[serde(default)]
    pub labels: Option<Vec<EventLabel>>,
    #[serde(default)]
    pub state: Option<ItemState>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventLabel {
    pub name: String,
}

impl ActivityEvent {
    /// The item the event is about. The `issue` key wins, so comments on
    /// pull requests are handled with the issue configuration.
    pub fn subject(&self) -> Option<(ItemKind, &EventItem)> {
        self.issue
            .as_ref()
            .map(|item| (ItemKind::Issue, item))
            .or_else(|| {
                self.pull_request
                    .as_ref()
                    .map(|item| (ItemKind::PullRequest, item))
            })
    }

    /// Whether this very event applied `label`.
    pub fn applied_label(&self, label: &str) -> bool {
        self.action.as_deref() == Some("labeled")
            && self.label.as_ref().is_some_and(|l| l.name == label)
    }
}

/// What the trigger did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmarkOutcome {
    /// Not an activity event, or no item in the payload.
    Irrelevant,
    /// Sent by a bot or by the automation itself.
    FromBot,
    /// The item could not be loaded.
    NotFound,
    NotStale,
    Closed,
    /// This event is the one that applied the stale label.
    JustMarked,
    DryRun,
    Unmarked,
}

/// Handles one activity event at a time. Not budgeted.
pub struct UnmarkTrigger<'a> {
    tracker: &'a dyn IssueTracker,
    repo: &'a RepoRef,
    config: &'a StaleConfig,
    automation_login: &'a str,
}

impl<'a> UnmarkTrigger<'a> {
    pub fn new(
        tracker: &'a dyn IssueTracker,
        repo: &'a RepoRef,
        config: &'a StaleConfig,
        automation_login: &'a str,
    ) -> Self {
        Self {
            tracker,
            repo,
            config,
            automation_login,
        }
    }

    fn is_bot(&self, sender: &EventSender) -> bool {
        sender.account_type.as_deref() == Some("Bot")
            || sender.login.eq_ignore_ascii_case(self.automation_login)
    }

    /// Process one event. `event_name` is the webhook event header, when known.
    pub async fn handle(&self, event_name: Option<&str>, event: &ActivityEvent) -> Result<UnmarkOutcome> {
        if let Some(name) = event_name {
            if !ACTIVITY_EVENTS.contains(&name) {
                debug!(event = name, "Not an activity event");
                return Ok(UnmarkOutcome::Irrelevant);
            }
        }

        if let Some(sender) = event.sender.as_ref().filter(|s| self.is_bot(s)) {
            debug!(sender = %sender.login, "Ignoring event from bot");
            return Ok(UnmarkOutcome::FromBot);
        }

        let Some((kind, subject)) = event.subject() else {
            debug!("Event carries no issue or pull request");
            return Ok(UnmarkOutcome::Irrelevant);
        };
        let number = subject.number;
        let config = self.config.for_kind(kind);

        let (labels, state) = match &subject.labels {
            Some(labels) => (
                labels.iter().map(|l| l.name.clone()).collect::<Vec<_>>(),
                subject.state.unwrap_or(ItemState::Open),
            ),
            None => match self.tracker.get_item(self.repo, number).await {
                Ok(item) => (
                    item.labels.into_iter().map(|l| l.name).collect(),
                    item.state,
                ),
                Err(e) if e.is_not_found() => {
                    info!(repo = %self.repo, number, "Issue not found, skipping unmark");
                    return Ok(UnmarkOutcome::NotFound);
                }
                Err(e) => return Err(e.into()),
            },
        };

        if !labels.iter().any(|l| *l == config.stale_label) {
            return Ok(UnmarkOutcome::NotStale);
        }
        if state == ItemState::Closed {
            return Ok(UnmarkOutcome::Closed);
        }
        if event.applied_label(&config.stale_label) {
            debug!(repo = %self.repo, number, "Stale label applied by this event");
            return Ok(UnmarkOutcome::JustMarked);
        }

        if !config.perform {
            info!("{}#{} would have been unmarked (dry-run)", self.repo, number);
            return Ok(UnmarkOutcome::DryRun);
        }

        info!("{}#{} is being unmarked", self.repo, number);
        ignore_not_found(
            self.tracker
                .remove_label(self.repo, number, &config.stale_label)
                .await,
        )?;
        if let Some(comment) = &config.unmark_comment {
            ignore_not_found(self.tracker.create_comment(self.repo, number, comment).await)?;
        }
        Ok(UnmarkOutcome::Unmarked)
    }
}
