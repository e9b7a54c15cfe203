//! Issue tracker capability for the stale bot.
//!
//! This crate provides:
//! - The [`IssueTracker`] trait the lifecycle engine calls for every read and
//!   mutation
//! - Domain types for items, labels, reviews and typed search predicates
//! - [`GitHubTracker`], a GitHub REST implementation
//!
//! # Example
//!
//! ```no_run
//! use tracker::{GitHubTracker, IssueTracker, ItemKind, RepoRef, SearchQuery};
//!
//! # async fn example() -> Result<(), tracker::TrackerError> {
//! let github = GitHubTracker::new("your-token")?;
//! let query = SearchQuery {
//!     kind: Some(ItemKind::Issue),
//!     ..SearchQuery::open_items(RepoRef::new("mlpack", "mlpack"))
//! };
//! let items = github.search_open_items(&query).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod github;
pub mod tracker;
pub mod types;

pub use error::TrackerError;
pub use github::GitHubTracker;
pub use tracker::{IssueTracker, SEARCH_PAGE_SIZE};
pub use types::{
    AuthorAssociation, ItemKind, ItemState, Label, ParseItemKindError, ParseRepoError, RepoRef,
    Review, ReviewEvent, ReviewState, SearchQuery, TeamRef, TrackedItem,
};
