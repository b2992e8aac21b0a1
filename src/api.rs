//! The Backend API capability set consumed by dashboards and emitters.
//!
//! [`BackendApi`] is the only seam between this crate and the server. The
//! shipped implementation is [`HttpBackend`](crate::HttpBackend); tests use
//! the in-memory backend in `test_fixtures`.

use async_trait::async_trait;

use crate::error::ApiError;
use crate::model::{
    DashboardStats, Donation, DonationFilter, DonationStatus, LikeOutcome, NewDonation,
    PendingVerification, Project, ProjectFilter, ShareOutcome,
};

/// REST-like fetch and mutate operations offered by the server.
///
/// Implementations must be cheap to share (`Send + Sync`); dashboards hold
/// them behind an `Arc` and call them from spawned refresh tasks. Retry
/// policy, if any, belongs to the implementation.
#[async_trait]
pub trait BackendApi: Send + Sync + 'static {
    /// Donations matching `filter`, in server order.
    async fn fetch_donations(&self, filter: &DonationFilter) -> Result<Vec<Donation>, ApiError>;

    /// Projects matching `filter`, in server order.
    async fn fetch_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, ApiError>;

    /// Like a project. Returns the authoritative like count.
    async fn like_project(&self, id: &str) -> Result<LikeOutcome, ApiError>;

    /// Remove a like. Returns the authoritative like count.
    async fn unlike_project(&self, id: &str) -> Result<LikeOutcome, ApiError>;

    /// Record a view. The response carries no data.
    async fn track_view(&self, id: &str) -> Result<(), ApiError>;

    /// Record a share. Returns the authoritative share count.
    async fn track_share(&self, id: &str) -> Result<ShareOutcome, ApiError>;

    /// Create a donation and return it as stored.
    async fn create_donation(&self, params: &NewDonation) -> Result<Donation, ApiError>;

    /// Change a donation's status (admin only). Returns the updated record.
    async fn update_donation_status(
        &self,
        id: &str,
        status: DonationStatus,
    ) -> Result<Donation, ApiError>;

    /// Platform-wide counts for the admin dashboard.
    async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError>;

    /// Items awaiting admin verification.
    async fn pending_verifications(&self) -> Result<Vec<PendingVerification>, ApiError>;
}
