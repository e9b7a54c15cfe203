//! Domain types shared by tracker implementations and their callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Timestamp format accepted by the `updated:` search qualifier.
const SEARCH_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Kind of tracked item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// Plain issue.
    #[serde(rename = "issues")]
    Issue,
    /// Pull request.
    #[serde(rename = "pulls")]
    PullRequest,
}

impl ItemKind {
    /// Both kinds, in the order a sweep visits them.
    pub const ALL: [Self; 2] = [Self::PullRequest, Self::Issue];

    /// Configuration key for this kind (`issues` / `pulls`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Issue => "issues",
            Self::PullRequest => "pulls",
        }
    }

    /// Search qualifier restricting results to this kind.
    #[must_use]
    pub const fn search_qualifier(self) -> &'static str {
        match self {
            Self::Issue => "is:issue",
            Self::PullRequest => "is:pr",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a kind string is neither `issues` nor `pulls`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown type: {0}. Valid types are 'pulls' and 'issues'")]
pub struct ParseItemKindError(pub String);

impl FromStr for ItemKind {
    type Err = ParseItemKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issues" => Ok(Self::Issue),
            "pulls" => Ok(Self::PullRequest),
            other => Err(ParseItemKindError(other.to_string())),
        }
    }
}

/// Open/closed state of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Open,
    Closed,
}

impl ItemState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// A repository label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl Label {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
        }
    }
}

/// An issue or pull request as seen by the engine.
///
/// Owned by the tracker; the engine only reads these and requests mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    /// Repository-scoped number.
    pub number: u64,
    pub kind: ItemKind,
    pub labels: Vec<Label>,
    pub locked: bool,
    pub updated_at: DateTime<Utc>,
    pub state: ItemState,
    /// Login of the author.
    pub author: String,
    /// Milestone title, if any.
    #[serde(default)]
    pub milestone: Option<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    /// Whether the item belongs to a project board.
    #[serde(default)]
    pub in_project: bool,
}

impl TrackedItem {
    /// Whether a label with this exact name is present.
    #[must_use]
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ItemState::Open
    }
}

/// Repository coordinates (`owner/name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Error returned when a repository string is not `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid repository format (expected owner/repo): {0}")]
pub struct ParseRepoError(pub String);

impl FromStr for RepoRef {
    type Err = ParseRepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        match parts.as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => {
                Ok(Self::new(*owner, *name))
            }
            _ => Err(ParseRepoError(s.to_string())),
        }
    }
}

/// An organisation team (`org` + `slug`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub org: String,
    pub slug: String,
}

impl TeamRef {
    #[must_use]
    pub fn new(org: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            slug: slug.into(),
        }
    }
}

/// Review state as reported by GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
    #[serde(other)]
    Unknown,
}

/// Relationship of a reviewer to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorAssociation {
    Owner,
    Member,
    Collaborator,
    Contributor,
    FirstTimeContributor,
    FirstTimer,
    Mannequin,
    None,
    #[serde(other)]
    Unknown,
}

/// A pull request review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub state: ReviewState,
    pub author_association: AuthorAssociation,
    /// Reviewer login; absent for deleted accounts.
    pub reviewer: Option<String>,
    /// Absent while a review is still pending.
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Event submitted with a new review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewEvent {
    Approve,
    RequestChanges,
    Comment,
}

/// Typed search predicate over open items of one repository.
///
/// Rendered to GitHub search syntax by [`SearchQuery::render`]; evaluated
/// locally by [`SearchQuery::matches`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub repo: RepoRef,
    pub kind: Option<ItemKind>,
    /// Only items last updated strictly before this instant.
    pub updated_before: Option<DateTime<Utc>>,
    /// Labels that must all be present.
    pub with_labels: Vec<String>,
    /// Labels that must all be absent.
    pub without_labels: Vec<String>,
    pub no_project: bool,
    pub no_milestone: bool,
    pub no_assignee: bool,
    /// Pull requests still awaiting a required review. Not checkable locally.
    pub review_required: bool,
}

impl SearchQuery {
    /// Open items of `repo`, no other restriction.
    #[must_use]
    pub fn open_items(repo: RepoRef) -> Self {
        Self {
            repo,
            kind: None,
            updated_before: None,
            with_labels: Vec::new(),
            without_labels: Vec::new(),
            no_project: false,
            no_milestone: false,
            no_assignee: false,
            review_required: false,
        }
    }

    /// Render as a GitHub search `q` parameter.
    #[must_use]
    pub fn render(&self) -> String {
        let mut parts = vec![format!("repo:{}", self.repo), "is:open".to_string()];

        if let Some(before) = self.updated_before {
            parts.push(format!(
                "updated:<{}",
                before.format(SEARCH_TIMESTAMP_FORMAT)
            ));
        }
        if let Some(kind) = self.kind {
            parts.push(kind.search_qualifier().to_string());
        }
        parts.extend(self.with_labels.iter().map(|l| format!("label:\"{l}\"")));
        parts.extend(self.without_labels.iter().map(|l| format!("-label:\"{l}\"")));
        if self.no_project {
            parts.push("no:project".to_string());
        }
        if self.no_milestone {
            parts.push("no:milestone".to_string());
        }
        if self.no_assignee {
            parts.push("no:assignee".to_string());
        }
        if self.review_required {
            parts.push("review:required".to_string());
        }

        parts.join(" ")
    }

    /// Evaluate the predicate against an item.
    ///
    /// The repository and `review_required` qualifiers are not evaluated.
    #[must_use]
    pub fn matches(&self, item: &TrackedItem) -> bool {
        item.is_open()
            && self.kind.is_none_or(|k| k == item.kind)
            && self.updated_before.is_none_or(|t| item.updated_at < t)
            && self.with_labels.iter().all(|l| item.has_label(l))
            && !self.without_labels.iter().any(|l| item.has_label(l))
            && !(self.no_project && item.in_project)
            && !(self.no_milestone && item.milestone.is_some())
            && !(self.no_assignee && !item.assignees.is_empty())
    }
}
