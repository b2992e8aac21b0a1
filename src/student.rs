//! Student dashboard: the projects the logged-in student (or institution)
//! owns, with engagement counters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analytics;
use crate::api::BackendApi;
use crate::error::ApiError;
use crate::event::{DomainEvent, EventKind};
use crate::model::{Identity, Project, ProjectFilter};
use crate::view::{DashboardView, Snapshot, Strategy, find_mut};

/// Projects owned by the identity.
///
/// Like, unlike and share events carry the server's counts and are applied
/// as they are. A view is counted locally and reconciled by a refetch, and
/// any new donation refetches since the event does not name the owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct StudentView;

/// Totals across the student's projects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentSummary {
    pub project_count: usize,
    /// Sum of `funding_raised` over all projects.
    pub total_raised: f64,
    pub total_views: u64,
    pub total_likes: u64,
    pub total_shares: u64,
    /// Mean funding progress across projects, in percent.
    pub average_progress: u32,
    /// Id of the project with the highest engagement score.
    pub top_project: Option<String>,
}

#[async_trait]
impl DashboardView for StudentView {
    const NAME: &'static str = "student";

    const EVENTS: &'static [(EventKind, Strategy)] = &[
        (EventKind::DonationCreated, Strategy::Refetch),
        (EventKind::ProjectViewed, Strategy::Optimistic),
        (EventKind::ProjectLiked, Strategy::Authoritative),
        (EventKind::ProjectUnliked, Strategy::Authoritative),
        (EventKind::ProjectShared, Strategy::Authoritative),
    ];

    type Record = Project;
    type Summary = StudentSummary;
    type Context = ();

    async fn fetch(
        &self,
        api: &dyn BackendApi,
        identity: &Identity,
    ) -> Result<Snapshot<Project, ()>, ApiError> {
        let records = api
            .fetch_projects(&ProjectFilter::owned_by(&identity.user_id))
            .await?;
        Ok(Snapshot::records(records))
    }

    fn patch(&self, records: &mut [Project], _: &mut (), event: &DomainEvent) -> Option<String> {
        patch_project(records, event)
    }

    fn summarize(&self, records: &[Project], _: &(), _now: DateTime<Utc>) -> StudentSummary {
        let average_progress = if records.is_empty() {
            0
        } else {
            let sum: u32 = records.iter().map(analytics::funding_progress).sum();
            (f64::from(sum) / records.len() as f64).round() as u32
        };
        StudentSummary {
            project_count: records.len(),
            total_raised: records.iter().fold(0.0, |sum, p| sum + p.funding_raised),
            total_views: records.iter().map(|p| p.views_count).sum(),
            total_likes: records.iter().map(|p| p.likes_count).sum(),
            total_shares: records.iter().map(|p| p.shares_count).sum(),
            average_progress,
            top_project: analytics::rank_by_engagement_score(records)
                .into_iter()
                .next()
                .map(|p| p.id),
        }
    }
}

/// Counter patches shared by every project-backed view.
///
/// Likes and shares carry the server's count and are set outright; a view
/// has no count in its payload and is bumped by one.
pub(crate) fn patch_project(records: &mut [Project], event: &DomainEvent) -> Option<String> {
    let project = find_mut(records, event.subject_id())?;
    match event {
        DomainEvent::ProjectLiked { likes_count, .. }
        | DomainEvent::ProjectUnliked { likes_count, .. } => project.likes_count = *likes_count,
        DomainEvent::ProjectShared { shares_count, .. } => project.shares_count = *shares_count,
        DomainEvent::ProjectViewed { .. } => project.views_count += 1,
        _ => return None,
    }
    Some(project.id.clone())
}
