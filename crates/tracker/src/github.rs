//! GitHub REST implementation of [`IssueTracker`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TrackerError;
use crate::tracker::{IssueTracker, SEARCH_PAGE_SIZE};
use crate::types::{
    AuthorAssociation, ItemKind, ItemState, Label, RepoRef, Review, ReviewEvent, ReviewState,
    SearchQuery, TeamRef, TrackedItem,
};

/// Default GitHub API root.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Page size for review and team member listings.
const LIST_PAGE_SIZE: u32 = 100;

/// GitHub API client implementing the issue tracker capability.
#[derive(Debug, Clone)]
pub struct GitHubTracker {
    client: reqwest::Client,
    token: String,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawMilestone {
    title: String,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    state: ItemState,
    #[serde(default)]
    locked: bool,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    labels: Vec<Label>,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    milestone: Option<RawMilestone>,
    #[serde(default)]
    assignees: Vec<RawUser>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<RawIssue> for TrackedItem {
    fn from(raw: RawIssue) -> Self {
        Self {
            number: raw.number,
            kind: if raw.pull_request.is_some() {
                ItemKind::PullRequest
            } else {
                ItemKind::Issue
            },
            labels: raw.labels,
            locked: raw.locked,
            updated_at: raw.updated_at,
            state: raw.state,
            author: raw.user.map(|u| u.login).unwrap_or_default(),
            milestone: raw.milestone.map(|m| m.title),
            assignees: raw.assignees.into_iter().map(|u| u.login).collect(),
            in_project: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    state: ReviewState,
    author_association: AuthorAssociation,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
}

impl From<RawReview> for Review {
    fn from(raw: RawReview) -> Self {
        Self {
            state: raw.state,
            author_association: raw.author_association,
            reviewer: raw.user.map(|u| u.login),
            submitted_at: raw.submitted_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateLabelRequest<'a> {
    name: &'a str,
    color: &'a str,
}

#[derive(Debug, Serialize)]
struct AddLabelsRequest<'a> {
    labels: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateStateRequest {
    state: ItemState,
}

#[derive(Debug, Serialize)]
struct CreateReviewRequest<'a> {
    event: ReviewEvent,
    body: &'a str,
}

impl GitHubTracker {
    /// Create a client against the public GitHub API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(token: &str) -> Result<Self, TrackerError> {
        Self::with_api_url(token, GITHUB_API_URL)
    }

    /// Create a client against a specific API root (GitHub Enterprise, tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_api_url(token: &str, api_url: &str) -> Result<Self, TrackerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("stale-bot/1.0"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            token: token.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn repo_url(&self, repo: &RepoRef, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}/{rest}",
            self.api_url, repo.owner, repo.name
        )
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, TrackerError> {
        let response = request.header(AUTHORIZATION, self.bearer()).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(TrackerError::from_status(status.as_u16(), body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TrackerError> {
        let bytes = self.send(request).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl IssueTracker for GitHubTracker {
    async fn search_open_items(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<TrackedItem>, TrackerError> {
        let q = query.render();
        let per_page = SEARCH_PAGE_SIZE.to_string();
        debug!(q = %q, "Searching issues and pull requests");

        let request = self
            .client
            .get(format!("{}/search/issues", self.api_url))
            .query(&[
                ("q", q.as_str()),
                ("sort", "updated"),
                ("order", "desc"),
                ("per_page", per_page.as_str()),
            ]);

        let response: SearchResponse = self.send_json(request).await?;
        Ok(response.items.into_iter().map(TrackedItem::from).collect())
    }

    async fn get_label(&self, repo: &RepoRef, name: &str) -> Result<Option<Label>, TrackerError> {
        let url = self.repo_url(repo, &format!("labels/{}", urlencoding::encode(name)));

        match self.send_json(self.client.get(url)).await {
            Ok(label) => Ok(Some(label)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_label(
        &self,
        repo: &RepoRef,
        name: &str,
        color: &str,
    ) -> Result<(), TrackerError> {
        let request = self
            .client
            .post(self.repo_url(repo, "labels"))
            .json(&CreateLabelRequest { name, color });
        self.send(request).await?;
        Ok(())
    }

    async fn add_label(&self, repo: &RepoRef, number: u64, label: &str) -> Result<(), TrackerError> {
        let request = self
            .client
            .post(self.repo_url(repo, &format!("issues/{number}/labels")))
            .json(&AddLabelsRequest { labels: [label] });
        self.send(request).await?;
        Ok(())
    }

    async fn remove_label(
        &self,
        repo: &RepoRef,
        number: u64,
        label: &str,
    ) -> Result<(), TrackerError> {
        let url = self.repo_url(
            repo,
            &format!("issues/{number}/labels/{}", urlencoding::encode(label)),
        );
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn create_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<(), TrackerError> {
        let request = self
            .client
            .post(self.repo_url(repo, &format!("issues/{number}/comments")))
            .json(&CommentRequest { body });
        self.send(request).await?;
        Ok(())
    }

    async fn update_state(
        &self,
        repo: &RepoRef,
        number: u64,
        state: ItemState,
    ) -> Result<(), TrackerError> {
        let request = self
            .client
            .patch(self.repo_url(repo, &format!("issues/{number}")))
            .json(&UpdateStateRequest { state });
        self.send(request).await?;
        Ok(())
    }

    async fn list_reviews(
        &self,
        repo: &RepoRef,
        number: u64,
        page: u32,
    ) -> Result<Vec<Review>, TrackerError> {
        let request = self
            .client
            .get(self.repo_url(repo, &format!("pulls/{number}/reviews")))
            .query(&[
                ("per_page", LIST_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);

        let reviews: Vec<RawReview> = self.send_json(request).await?;
        Ok(reviews.into_iter().map(Review::from).collect())
    }

    async fn create_review(
        &self,
        repo: &RepoRef,
        number: u64,
        event: ReviewEvent,
        body: &str,
    ) -> Result<(), TrackerError> {
        let request = self
            .client
            .post(self.repo_url(repo, &format!("pulls/{number}/reviews")))
            .json(&CreateReviewRequest { event, body });
        self.send(request).await?;
        Ok(())
    }

    async fn list_team_members(
        &self,
        team: &TeamRef,
        page: u32,
    ) -> Result<Vec<String>, TrackerError> {
        let request = self
            .client
            .get(format!(
                "{}/orgs/{}/teams/{}/members",
                self.api_url, team.org, team.slug
            ))
            .query(&[
                ("role", "all".to_string()),
                ("per_page", LIST_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);

        let members: Vec<RawUser> = self.send_json(request).await?;
        Ok(members.into_iter().map(|m| m.login).collect())
    }

    async fn get_item(&self, repo: &RepoRef, number: u64) -> Result<TrackedItem, TrackerError> {
        let raw: RawIssue = self
            .send_json(self.client.get(self.repo_url(repo, &format!("issues/{number}"))))
            .await?;
        Ok(raw.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_issue_pull_request_kind() {
        let json = r#"{
            "number": 42,
            "state": "open",
            "locked": false,
            "updated_at": "2024-01-01T00:00:00Z",
            "labels": [{"name": "s: stale", "color": "ffffff"}],
            "user": {"login": "alice"},
            "milestone": {"title": "mlpack 4.0"},
            "assignees": [{"login": "bob"}],
            "pull_request": {"url": "https://api.github.com/repos/o/r/pulls/42"}
        }"#;
        let item: TrackedItem = serde_json::from_str::<RawIssue>(json).unwrap().into();
        assert_eq!(item.kind, ItemKind::PullRequest);
        assert_eq!(item.author, "alice");
        assert_eq!(item.milestone.as_deref(), Some("mlpack 4.0"));
        assert_eq!(item.assignees, vec!["bob".to_string()]);
        assert!(item.has_label("s: stale"));
    }

    #[test]
    fn test_raw_issue_minimal() {
        let json = r#"{"number": 7, "state": "closed", "updated_at": "2024-01-01T00:00:00Z"}"#;
        let item: TrackedItem = serde_json::from_str::<RawIssue>(json).unwrap().into();
        assert_eq!(item.kind, ItemKind::Issue);
        assert_eq!(item.state, ItemState::Closed);
        assert!(item.labels.is_empty());
        assert!(!item.locked);
    }

    #[test]
    fn test_raw_review_unknown_state() {
        let json = r#"{"state": "SOMETHING_NEW", "author_association": "MEMBER",
                       "user": null, "submitted_at": null}"#;
        let review: Review = serde_json::from_str::<RawReview>(json).unwrap().into();
        assert_eq!(review.state, ReviewState::Unknown);
        assert_eq!(review.author_association, AuthorAssociation::Member);
        assert!(review.reviewer.is_none());
    }

    #[test]
    fn test_api_url_trailing_slash() {
        let tracker = GitHubTracker::with_api_url("t", "http://localhost:1234/").unwrap();
        assert_eq!(
            tracker.repo_url(&RepoRef::new("o", "r"), "labels"),
            "http://localhost:1234/repos/o/r/labels"
        );
    }
}
