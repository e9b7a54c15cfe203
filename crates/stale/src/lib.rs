//! Stale issue lifecycle engine and second-approval automation.
//!
//! Open issues and pull requests move between three states:
//!
//! - **active**: no stale label
//! - **stale**: marked after `daysUntilStale` days without activity
//! - **closed**: closed after a further `daysUntilClose` days, if configured
//!
//! [`Sweeper`] runs the periodic mark-and-sweep, [`UnmarkTrigger`] returns an
//! item to active when it sees new activity, and [`Approver`] posts a second
//! approval on pull requests that have exactly one qualifying review.
//! Everything talks to the repository through [`tracker::IssueTracker`].

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod approval;
pub mod budget;
pub mod classifier;
pub mod config;
pub mod error;
pub mod pagination;
pub mod sweeper;
pub mod unmark;

pub use approval::{
    tally_approvals, Approval, ApprovalDecision, ApprovalRecord, ApprovalReport, ApprovalTally,
    Approver, Automation, APPROVAL_COOL_DOWN_DAYS,
};
pub use budget::RunBudget;
pub use classifier::{classify, closable_query, since, stale_query, Classification};
pub use config::{
    resolve, resolve_file, resolve_source, ConfigDocument, ConfigLayer, ConfigWarning, EffectiveConfig,
    Resolution, StaleConfig, MAX_ACTIONS_PER_RUN,
};
pub use error::{Result, StaleError};
pub use pagination::Paginated;
pub use sweeper::{ActionOutcome, SweepReport, Sweeper, STALE_LABEL_COLOR};
pub use unmark::{ActivityEvent, UnmarkOutcome, UnmarkTrigger, ACTIVITY_EVENTS};
