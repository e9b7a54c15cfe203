//! The issue tracker capability consumed by the stale engine.

use async_trait::async_trait;

use crate::error::TrackerError;
use crate::types::{
    ItemState, Label, RepoRef, Review, ReviewEvent, SearchQuery, TeamRef, TrackedItem,
};

/// Page size used by item searches.
pub const SEARCH_PAGE_SIZE: u32 = 30;

/// Trait for issue trackers (GitHub, in-memory fakes, etc.).
///
/// Paginated operations take a 1-based page number and return an empty page
/// once the listing is exhausted.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Search open items, sorted by update time descending, at most
    /// [`SEARCH_PAGE_SIZE`] results.
    async fn search_open_items(&self, query: &SearchQuery)
        -> Result<Vec<TrackedItem>, TrackerError>;

    /// Fetch a repository label; `Ok(None)` if it does not exist.
    async fn get_label(&self, repo: &RepoRef, name: &str) -> Result<Option<Label>, TrackerError>;

    /// Create a repository label.
    async fn create_label(&self, repo: &RepoRef, name: &str, color: &str)
        -> Result<(), TrackerError>;

    /// Add a label to an item.
    async fn add_label(&self, repo: &RepoRef, number: u64, label: &str)
        -> Result<(), TrackerError>;

    /// Remove a label from an item.
    async fn remove_label(&self, repo: &RepoRef, number: u64, label: &str)
        -> Result<(), TrackerError>;

    /// Post a comment on an item.
    async fn create_comment(&self, repo: &RepoRef, number: u64, body: &str)
        -> Result<(), TrackerError>;

    /// Open or close an item.
    async fn update_state(&self, repo: &RepoRef, number: u64, state: ItemState)
        -> Result<(), TrackerError>;

    /// One page of reviews on a pull request.
    async fn list_reviews(&self, repo: &RepoRef, number: u64, page: u32)
        -> Result<Vec<Review>, TrackerError>;

    /// Submit a review on a pull request.
    async fn create_review(
        &self,
        repo: &RepoRef,
        number: u64,
        event: ReviewEvent,
        body: &str,
    ) -> Result<(), TrackerError>;

    /// One page of team member logins.
    async fn list_team_members(&self, team: &TeamRef, page: u32)
        -> Result<Vec<String>, TrackerError>;

    /// Fetch a single item by number.
    async fn get_item(&self, repo: &RepoRef, number: u64) -> Result<TrackedItem, TrackerError>;
}
