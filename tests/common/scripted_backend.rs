//! In-memory backend whose fetches can be held and released one by one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;

use crowdfund_sync::{
    ApiError, BackendApi, DashboardStats, Donation, DonationFilter, DonationStatus, LikeOutcome,
    NewDonation, PendingVerification, Project, ProjectFilter, ShareOutcome,
};

/// A backend holding server truth in memory.
///
/// Fetch responses are computed when the request arrives (like a real
/// server would) but only returned once the gate lets them through.
#[derive(Default)]
pub struct ScriptedBackend {
    pub donations: Mutex<Vec<Donation>>,
    pub projects: Mutex<Vec<Project>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    parked: AtomicUsize,
    next_id: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(donations: Vec<Donation>, projects: Vec<Project>) -> Arc<Self> {
        let backend = Self::default();
        *backend.donations.lock().unwrap() = donations;
        *backend.projects.lock().unwrap() = projects;
        Arc::new(backend)
    }

    pub fn as_api(self: &Arc<Self>) -> Arc<dyn BackendApi> {
        Arc::clone(self) as Arc<dyn BackendApi>
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Park every later fetch until released.
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let the `n` oldest parked (or next) fetches through.
    pub fn release(&self, n: usize) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(n);
        }
    }

    /// Wait until exactly `n` fetches are parked at the gate.
    pub async fn parked(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.parked.load(Ordering::SeqCst) != n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {n} parked fetches"));
    }

    /// Wait until `op` has been called `n` times.
    pub async fn calls_reach(&self, op: &str, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.calls(op) < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {n} calls to {op}"));
    }

    fn record(&self, op: &'static str) {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
    }

    async fn gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.parked.fetch_add(1, Ordering::SeqCst);
            gate.acquire().await.expect("gate closed").forget();
            self.parked.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn not_found(what: &str, id: &str) -> ApiError {
        ApiError::Status {
            status: 404,
            message: format!("{what} {id} not found"),
        }
    }
}

#[async_trait]
impl BackendApi for ScriptedBackend {
    async fn fetch_donations(&self, filter: &DonationFilter) -> Result<Vec<Donation>, ApiError> {
        self.record("fetch_donations");
        let response: Vec<Donation> = self
            .donations
            .lock()
            .unwrap()
            .iter()
            .filter(|d| {
                filter
                    .donor_id
                    .as_ref()
                    .is_none_or(|id| d.donor_id.as_ref() == Some(id))
                    && filter
                        .project_id
                        .as_ref()
                        .is_none_or(|id| &d.project_id == id)
            })
            .cloned()
            .collect();
        self.gate().await;
        Ok(response)
    }

    async fn fetch_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, ApiError> {
        self.record("fetch_projects");
        let response: Vec<Project> = self
            .projects
            .lock()
            .unwrap()
            .iter()
            .filter(|p| {
                filter
                    .owner_id
                    .as_ref()
                    .is_none_or(|id| p.owner_id.as_ref() == Some(id))
                    && filter.id.as_ref().is_none_or(|id| &p.id == id)
            })
            .cloned()
            .collect();
        self.gate().await;
        Ok(response)
    }

    async fn like_project(&self, id: &str) -> Result<LikeOutcome, ApiError> {
        self.record("like_project");
        let mut projects = self.projects.lock().unwrap();
        let project = projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Self::not_found("project", id))?;
        project.likes_count += 1;
        Ok(LikeOutcome {
            liked: true,
            likes_count: project.likes_count,
        })
    }

    async fn unlike_project(&self, id: &str) -> Result<LikeOutcome, ApiError> {
        self.record("unlike_project");
        let mut projects = self.projects.lock().unwrap();
        let project = projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Self::not_found("project", id))?;
        project.likes_count = project.likes_count.saturating_sub(1);
        Ok(LikeOutcome {
            liked: false,
            likes_count: project.likes_count,
        })
    }

    async fn track_view(&self, id: &str) -> Result<(), ApiError> {
        self.record("track_view");
        let mut projects = self.projects.lock().unwrap();
        let project = projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Self::not_found("project", id))?;
        project.views_count += 1;
        Ok(())
    }

    async fn track_share(&self, id: &str) -> Result<ShareOutcome, ApiError> {
        self.record("track_share");
        let mut projects = self.projects.lock().unwrap();
        let project = projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Self::not_found("project", id))?;
        project.shares_count += 1;
        Ok(ShareOutcome {
            shares_count: project.shares_count,
        })
    }

    async fn create_donation(&self, params: &NewDonation) -> Result<Donation, ApiError> {
        self.record("create_donation");
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let donation = Donation {
            id: format!("created-{n}"),
            project_id: params.project_id.clone(),
            donor_id: Some("donor-1".to_string()),
            amount: params.amount,
            currency: params.currency.clone(),
            status: DonationStatus::Completed,
            message: params.message.clone(),
            anonymous: params.anonymous,
            created_at: Utc::now(),
        };
        self.donations.lock().unwrap().push(donation.clone());
        Ok(donation)
    }

    async fn update_donation_status(
        &self,
        id: &str,
        status: DonationStatus,
    ) -> Result<Donation, ApiError> {
        self.record("update_donation_status");
        let mut donations = self.donations.lock().unwrap();
        let donation = donations
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| Self::not_found("donation", id))?;
        donation.status = status;
        Ok(donation.clone())
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.record("dashboard_stats");
        let stats = {
            let donations = self.donations.lock().unwrap();
            DashboardStats {
                total_donations: donations.len() as u64,
                total_raised: crowdfund_sync::analytics::total_amount(&donations),
                total_projects: self.projects.lock().unwrap().len() as u64,
                ..DashboardStats::default()
            }
        };
        self.gate().await;
        Ok(stats)
    }

    async fn pending_verifications(&self) -> Result<Vec<PendingVerification>, ApiError> {
        self.record("pending_verifications");
        self.gate().await;
        Ok(Vec::new())
    }
}
