//! In-memory issue tracker shared by the engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use tracker::{
    AuthorAssociation, IssueTracker, ItemKind, ItemState, Label, RepoRef, Review, ReviewEvent,
    ReviewState, SearchQuery, TeamRef, TrackedItem, TrackerError, SEARCH_PAGE_SIZE,
};

/// Page size for review and team listings, kept small so tests cross pages.
pub const FAKE_PAGE_SIZE: usize = 2;

/// A mutating call the engine made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateLabel { name: String, color: String },
    AddLabel { number: u64, label: String },
    RemoveLabel { number: u64, label: String },
    Comment { number: u64, body: String },
    SetState { number: u64, state: ItemState },
    Review { number: u64, event: ReviewEvent, body: String },
}

impl Call {
    pub fn number(&self) -> Option<u64> {
        match self {
            Self::CreateLabel { .. } => None,
            Self::AddLabel { number, .. }
            | Self::RemoveLabel { number, .. }
            | Self::Comment { number, .. }
            | Self::SetState { number, .. }
            | Self::Review { number, .. } => Some(*number),
        }
    }
}

#[derive(Default)]
struct State {
    items: BTreeMap<u64, TrackedItem>,
    repo_labels: HashSet<String>,
    reviews: HashMap<u64, Vec<Review>>,
    team: Vec<String>,
    calls: Vec<Call>,
    searches: Vec<SearchQuery>,
    /// Items whose mutations fail with a server error.
    failing: HashSet<u64>,
    /// Items still returned by search but gone for every other call.
    vanished: HashSet<u64>,
}

/// Fake tracker: evaluates search predicates locally and records mutations.
pub struct FakeTracker {
    now: DateTime<Utc>,
    state: Mutex<State>,
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn repo() -> RepoRef {
    RepoRef::new("mlpack", "mlpack")
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

pub fn issue(number: u64, updated_at: DateTime<Utc>, labels: &[&str]) -> TrackedItem {
    TrackedItem {
        number,
        kind: ItemKind::Issue,
        labels: labels.iter().map(|l| Label::named(*l)).collect(),
        locked: false,
        updated_at,
        state: ItemState::Open,
        author: "alice".to_string(),
        milestone: None,
        assignees: vec![],
        in_project: false,
    }
}

pub fn pull(number: u64, updated_at: DateTime<Utc>, labels: &[&str]) -> TrackedItem {
    TrackedItem {
        kind: ItemKind::PullRequest,
        ..issue(number, updated_at, labels)
    }
}

pub fn approval(reviewer: &str, submitted_at: DateTime<Utc>) -> Review {
    Review {
        state: ReviewState::Approved,
        author_association: AuthorAssociation::Member,
        reviewer: Some(reviewer.to_string()),
        submitted_at: Some(submitted_at),
    }
}

impl FakeTracker {
    pub fn new() -> Self {
        Self {
            now: now(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_items(items: impl IntoIterator<Item = TrackedItem>) -> Self {
        let fake = Self::new();
        for item in items {
            fake.insert(item);
        }
        fake
    }

    pub fn insert(&self, item: TrackedItem) {
        self.state.lock().unwrap().items.insert(item.number, item);
    }

    pub fn add_repo_label(&self, name: &str) {
        self.state.lock().unwrap().repo_labels.insert(name.to_string());
    }

    pub fn set_reviews(&self, number: u64, reviews: Vec<Review>) {
        self.state.lock().unwrap().reviews.insert(number, reviews);
    }

    pub fn set_team(&self, members: &[&str]) {
        self.state.lock().unwrap().team = members.iter().map(|m| (*m).to_string()).collect();
    }

    pub fn fail_on(&self, number: u64) {
        self.state.lock().unwrap().failing.insert(number);
    }

    pub fn vanish(&self, number: u64) {
        self.state.lock().unwrap().vanished.insert(number);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn searches(&self) -> Vec<SearchQuery> {
        self.state.lock().unwrap().searches.clone()
    }

    pub fn item(&self, number: u64) -> TrackedItem {
        self.state.lock().unwrap().items[&number].clone()
    }

    pub fn marked(&self) -> Vec<u64> {
        self.numbers(|c| matches!(c, Call::AddLabel { .. }))
    }

    pub fn closed(&self) -> Vec<u64> {
        self.numbers(|c| matches!(c, Call::SetState { state: ItemState::Closed, .. }))
    }

    pub fn reviews_posted(&self) -> Vec<u64> {
        self.numbers(|c| matches!(c, Call::Review { .. }))
    }

    fn numbers(&self, pick: impl Fn(&Call) -> bool) -> Vec<u64> {
        let mut numbers: Vec<u64> = self
            .calls()
            .iter()
            .filter(|c| pick(c))
            .filter_map(Call::number)
            .collect();
        numbers.sort_unstable();
        numbers
    }

    /// Record a mutation on an item and apply it, honouring failure injection.
    fn mutate(
        &self,
        number: u64,
        call: Call,
        apply: impl FnOnce(&mut TrackedItem) -> Result<(), TrackerError>,
    ) -> Result<(), TrackerError> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(&number) {
            return Err(TrackerError::Api {
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        if state.vanished.contains(&number) {
            return Err(TrackerError::NotFound(format!("item {number}")));
        }
        let item = state
            .items
            .get_mut(&number)
            .ok_or_else(|| TrackerError::NotFound(format!("item {number}")))?;
        apply(item)?;
        item.updated_at = self.now;
        state.calls.push(call);
        Ok(())
    }
}

fn page<T: Clone>(all: &[T], page: u32) -> Vec<T> {
    let start = (page as usize - 1) * FAKE_PAGE_SIZE;
    all.iter().skip(start).take(FAKE_PAGE_SIZE).cloned().collect()
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn search_open_items(&self, query: &SearchQuery) -> Result<Vec<TrackedItem>, TrackerError> {
        let mut state = self.state.lock().unwrap();
        state.searches.push(query.clone());

        let mut found: Vec<TrackedItem> = state
            .items
            .values()
            .filter(|item| query.matches(item))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        found.truncate(SEARCH_PAGE_SIZE as usize);
        Ok(found)
    }

    async fn get_label(&self, _repo: &RepoRef, name: &str) -> Result<Option<Label>, TrackerError> {
        let state = self.state.lock().unwrap();
        Ok(state.repo_labels.contains(name).then(|| Label::named(name)))
    }

    async fn create_label(&self, _repo: &RepoRef, name: &str, color: &str) -> Result<(), TrackerError> {
        let mut state = self.state.lock().unwrap();
        if !state.repo_labels.insert(name.to_string()) {
            return Err(TrackerError::Validation("already_exists".to_string()));
        }
        state.calls.push(Call::CreateLabel {
            name: name.to_string(),
            color: color.to_string(),
        });
        Ok(())
    }

    async fn add_label(&self, _repo: &RepoRef, number: u64, label: &str) -> Result<(), TrackerError> {
        let call = Call::AddLabel {
            number,
            label: label.to_string(),
        };
        self.mutate(number, call, |item| {
            if !item.has_label(label) {
                item.labels.push(Label::named(label));
            }
            Ok(())
        })
    }

    async fn remove_label(&self, _repo: &RepoRef, number: u64, label: &str) -> Result<(), TrackerError> {
        let call = Call::RemoveLabel {
            number,
            label: label.to_string(),
        };
        self.mutate(number, call, |item| {
            if !item.has_label(label) {
                return Err(TrackerError::NotFound(format!("label {label}")));
            }
            item.labels.retain(|l| l.name != label);
            Ok(())
        })
    }

    async fn create_comment(&self, _repo: &RepoRef, number: u64, body: &str) -> Result<(), TrackerError> {
        let call = Call::Comment {
            number,
            body: body.to_string(),
        };
        self.mutate(number, call, |_| Ok(()))
    }

    async fn update_state(&self, _repo: &RepoRef, number: u64, state: ItemState) -> Result<(), TrackerError> {
        let call = Call::SetState { number, state };
        self.mutate(number, call, |item| {
            item.state = state;
            Ok(())
        })
    }

    async fn list_reviews(&self, _repo: &RepoRef, number: u64, page_no: u32) -> Result<Vec<Review>, TrackerError> {
        let state = self.state.lock().unwrap();
        if state.vanished.contains(&number) {
            return Err(TrackerError::NotFound(format!("pull {number}")));
        }
        Ok(state
            .reviews
            .get(&number)
            .map(|all| page(all, page_no))
            .unwrap_or_default())
    }

    async fn create_review(
        &self,
        _repo: &RepoRef,
        number: u64,
        event: ReviewEvent,
        body: &str,
    ) -> Result<(), TrackerError> {
        let call = Call::Review {
            number,
            event,
            body: body.to_string(),
        };
        self.mutate(number, call, |_| Ok(()))?;

        let mut state = self.state.lock().unwrap();
        if event == ReviewEvent::Approve {
            let review = approval("mlpack-bot[bot]", self.now);
            state.reviews.entry(number).or_default().push(review);
        }
        Ok(())
    }

    async fn list_team_members(&self, _team: &TeamRef, page_no: u32) -> Result<Vec<String>, TrackerError> {
        Ok(page(&self.state.lock().unwrap().team, page_no))
    }

    async fn get_item(&self, _repo: &RepoRef, number: u64) -> Result<TrackedItem, TrackerError> {
        let state = self.state.lock().unwrap();
        if state.vanished.contains(&number) {
            return Err(TrackerError::NotFound(format!("item {number}")));
        }
        state
            .items
            .get(&number)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("item {number}")))
    }
}
