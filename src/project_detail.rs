//! Detail dashboard for a single project and the donations made to it.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analytics;
use crate::api::BackendApi;
use crate::error::ApiError;
use crate::event::{DomainEvent, EventKind};
use crate::model::{Donation, DonationFilter, Identity, Project, ProjectFilter};
use crate::student::patch_project;
use crate::view::{DashboardView, Snapshot, Strategy};

/// Shows one project. Like, unlike and share events carry the server's
/// counts and are applied without a refetch. A status change refetches
/// when it concerns one of the loaded donations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDetailView {
    project_id: String,
}

impl ProjectDetailView {
    /// View of the project with `project_id`.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }

    /// The project this view shows.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectDetailSummary {
    pub likes: u64,
    pub views: u64,
    pub shares: u64,
    pub funding_raised: f64,
    /// Percent of the goal reached, capped at 100.
    pub progress: u32,
    pub engagement_score: f64,
    /// Distinct named donors with a counted donation.
    pub supporters: usize,
    pub donation_total: f64,
}

#[async_trait]
impl DashboardView for ProjectDetailView {
    const NAME: &'static str = "project-detail";

    const EVENTS: &'static [(EventKind, Strategy)] = &[
        (EventKind::ProjectLiked, Strategy::Authoritative),
        (EventKind::ProjectUnliked, Strategy::Authoritative),
        (EventKind::ProjectShared, Strategy::Authoritative),
        (EventKind::ProjectViewed, Strategy::Optimistic),
        (EventKind::DonationCreated, Strategy::Refetch),
        (EventKind::DonationStatusUpdated, Strategy::Refetch),
    ];

    type Record = Project;
    type Summary = ProjectDetailSummary;
    /// Donations made to the project.
    type Context = Vec<Donation>;

    async fn fetch(
        &self,
        api: &dyn BackendApi,
        _identity: &Identity,
    ) -> Result<Snapshot<Project, Vec<Donation>>, ApiError> {
        let projects = ProjectFilter::by_id(&self.project_id);
        let donations = DonationFilter::for_project(&self.project_id);
        let (records, context) = tokio::try_join!(
            api.fetch_projects(&projects),
            api.fetch_donations(&donations)
        )?;
        Ok(Snapshot { records, context })
    }

    fn relevant(
        &self,
        _identity: &Identity,
        donations: &Vec<Donation>,
        event: &DomainEvent,
    ) -> bool {
        match event {
            DomainEvent::DonationCreated { project_id, .. } => *project_id == self.project_id,
            DomainEvent::DonationStatusUpdated { donation_id, .. } => {
                donations.iter().any(|d| d.id == *donation_id)
            }
            other => other.subject_id() == self.project_id,
        }
    }

    fn patch(
        &self,
        records: &mut [Project],
        _: &mut Vec<Donation>,
        event: &DomainEvent,
    ) -> Option<String> {
        patch_project(records, event)
    }

    fn summarize(
        &self,
        records: &[Project],
        donations: &Vec<Donation>,
        _now: DateTime<Utc>,
    ) -> ProjectDetailSummary {
        let supporters = donations
            .iter()
            .filter(|d| d.status.is_counted() && !d.anonymous)
            .filter_map(|d| d.donor_id.as_deref())
            .collect::<HashSet<_>>()
            .len();
        let donation_total = analytics::total_amount(donations);
        match records.iter().find(|p| p.id == self.project_id) {
            Some(project) => ProjectDetailSummary {
                likes: project.likes_count,
                views: project.views_count,
                shares: project.shares_count,
                funding_raised: project.funding_raised,
                progress: analytics::funding_progress(project),
                engagement_score: analytics::engagement_score(project),
                supporters,
                donation_total,
            },
            None => ProjectDetailSummary {
                supporters,
                donation_total,
                ..ProjectDetailSummary::default()
            },
        }
    }
}
