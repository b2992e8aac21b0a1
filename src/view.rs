//! The per-role part of a dashboard: what it loads, which events it reacts
//! to, and how it summarizes its records.
//!
//! A [`DashboardView`] is pure policy. The refresh lifecycle, the guard and
//! the stale-response checks live in [`Dashboard`](crate::Dashboard), which
//! is generic over the view.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::api::BackendApi;
use crate::error::ApiError;
use crate::event::{DomainEvent, EventKind};
use crate::model::{Identity, Keyed};

pub use crate::admin::{AdminContext, AdminSummary, AdminView};
pub use crate::donor::{DonorSummary, DonorView};
pub use crate::project_detail::{ProjectDetailSummary, ProjectDetailView};
pub use crate::student::{StudentSummary, StudentView};

/// How a dashboard reacts to one event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Discard the records and fetch everything again.
    Refetch,
    /// Patch the affected record locally, recompute the summary, then
    /// refetch in the background so the server has the last word.
    Optimistic,
    /// The event already carries the server's value; apply it and do not
    /// refetch.
    Authoritative,
}

/// Result of a full fetch: the records plus any side data the view loads
/// alongside them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot<R, C> {
    pub records: Vec<R>,
    pub context: C,
}

impl<R> Snapshot<R, ()> {
    /// Snapshot of `records` with no context.
    pub fn records(records: Vec<R>) -> Self {
        Self {
            records,
            context: (),
        }
    }
}

/// Role-specific data loading and event handling for a [`Dashboard`](crate::Dashboard).
///
/// # Contract
///
/// - [`EVENTS`](DashboardView::EVENTS) is fixed: the dashboard subscribes to
///   exactly these kinds on mount. Kinds not listed are never delivered.
/// - [`patch`](DashboardView::patch) must only touch the record named by the
///   event and report its key, or return `None` when nothing matched.
/// - [`summarize`](DashboardView::summarize) must be a pure function of its
///   arguments.
#[async_trait]
pub trait DashboardView: Send + Sync + 'static {
    /// Short name used in logs and errors.
    const NAME: &'static str;

    /// Event kinds this view reacts to and how.
    const EVENTS: &'static [(EventKind, Strategy)];

    type Record: Keyed + Clone + Debug + Send + Sync + 'static;
    type Summary: Clone + Debug + Default + Send + Sync + 'static;
    type Context: Clone + Debug + Default + Send + Sync + 'static;

    /// Load the authoritative records for `identity`.
    async fn fetch(
        &self,
        api: &dyn BackendApi,
        identity: &Identity,
    ) -> Result<Snapshot<Self::Record, Self::Context>, ApiError>;

    /// Whether a delivered event concerns this dashboard instance.
    ///
    /// `context` is the view's current context, for views that can only
    /// tell relevance from what they have loaded. Defaults to `true` for
    /// every subscribed kind.
    fn relevant(
        &self,
        identity: &Identity,
        context: &Self::Context,
        event: &DomainEvent,
    ) -> bool {
        let _ = (identity, context, event);
        true
    }

    /// Apply `event` to the local records.
    ///
    /// Only called for kinds mapped to [`Strategy::Optimistic`] or
    /// [`Strategy::Authoritative`].
    ///
    /// # Returns
    ///
    /// The key of the patched record, or `None` if no record matched.
    fn patch(
        &self,
        records: &mut [Self::Record],
        context: &mut Self::Context,
        event: &DomainEvent,
    ) -> Option<String>;

    /// Derive the summary shown alongside the records.
    fn summarize(
        &self,
        records: &[Self::Record],
        context: &Self::Context,
        now: DateTime<Utc>,
    ) -> Self::Summary;

    /// The strategy mapped to `kind`, if this view subscribes to it.
    fn strategy(kind: EventKind) -> Option<Strategy> {
        Self::EVENTS
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, strategy)| *strategy)
    }
}

/// Find the record with `key`.
pub(crate) fn find_mut<'a, R: Keyed>(records: &'a mut [R], key: &str) -> Option<&'a mut R> {
    records.iter_mut().find(|r| r.key() == key)
}
