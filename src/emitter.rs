//! Mutating actions that publish a domain event once the backend confirms
//! them.
//!
//! Every action follows the same contract: call the backend, and on success
//! publish exactly one event carrying the identifying data plus whatever
//! authoritative values the server returned. On failure nothing is
//! published and the error goes back to the caller.

use std::fmt;
use std::sync::Arc;

use crate::api::BackendApi;
use crate::bus::EventBus;
use crate::error::{ApiError, MutationError};
use crate::event::DomainEvent;
use crate::model::{Donation, DonationStatus, LikeOutcome, NewDonation, ShareOutcome};

/// Issues mutations against the backend and announces them on the bus.
///
/// Clone is cheap: the backend and the bus are reference counted.
#[derive(Clone)]
pub struct MutationEmitter {
    api: Arc<dyn BackendApi>,
    bus: EventBus,
}

impl fmt::Debug for MutationEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationEmitter")
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl MutationEmitter {
    /// Emitter calling `api` and publishing on `bus`.
    pub fn new(api: Arc<dyn BackendApi>, bus: EventBus) -> Self {
        Self { api, bus }
    }

    /// Like a project and publish `project-liked` with the server's count.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError`] if the backend call fails. No event is
    /// published in that case.
    pub async fn like(&self, project_id: &str) -> Result<LikeOutcome, MutationError> {
        let outcome = self.call("like", self.api.like_project(project_id)).await?;
        self.emit(DomainEvent::ProjectLiked {
            project_id: project_id.to_string(),
            likes_count: outcome.likes_count,
        });
        Ok(outcome)
    }

    /// Remove a like and publish `project-unliked` with the server's count.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError`] if the backend call fails.
    pub async fn unlike(&self, project_id: &str) -> Result<LikeOutcome, MutationError> {
        let outcome = self
            .call("unlike", self.api.unlike_project(project_id))
            .await?;
        self.emit(DomainEvent::ProjectUnliked {
            project_id: project_id.to_string(),
            likes_count: outcome.likes_count,
        });
        Ok(outcome)
    }

    /// Record a share and publish `project-shared`.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError`] if the backend call fails.
    pub async fn share(&self, project_id: &str) -> Result<ShareOutcome, MutationError> {
        let outcome = self.call("share", self.api.track_share(project_id)).await?;
        self.emit(DomainEvent::ProjectShared {
            project_id: project_id.to_string(),
            shares_count: outcome.shares_count,
        });
        Ok(outcome)
    }

    /// Record a view and publish `project-viewed`.
    ///
    /// Callers that treat views as fire-and-forget can ignore the result.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError`] if the backend call fails.
    pub async fn track_view(&self, project_id: &str) -> Result<(), MutationError> {
        self.call("track_view", self.api.track_view(project_id))
            .await?;
        self.emit(DomainEvent::ProjectViewed {
            project_id: project_id.to_string(),
        });
        Ok(())
    }

    /// Create a donation and publish `donation-created` describing the
    /// stored record.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError`] if the backend call fails.
    pub async fn create_donation(&self, params: &NewDonation) -> Result<Donation, MutationError> {
        let donation = self
            .call("create_donation", self.api.create_donation(params))
            .await?;
        self.emit(DomainEvent::DonationCreated {
            donation_id: donation.id.clone(),
            project_id: donation.project_id.clone(),
            donor_id: donation.donor_id.clone(),
            amount: donation.amount,
            currency: donation.currency.clone(),
        });
        Ok(donation)
    }

    /// Change a donation's status and publish `donation-status-updated`
    /// with the status the server stored.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError`] if the backend call fails.
    pub async fn update_donation_status(
        &self,
        donation_id: &str,
        status: DonationStatus,
    ) -> Result<Donation, MutationError> {
        let donation = self
            .call(
                "update_donation_status",
                self.api.update_donation_status(donation_id, status),
            )
            .await?;
        self.emit(DomainEvent::DonationStatusUpdated {
            donation_id: donation.id.clone(),
            status: donation.status,
        });
        Ok(donation)
    }

    /// Announce a wallet change that was confirmed outside the backend
    /// surface this crate talks to (e.g. a payment provider callback).
    pub fn wallet_updated(&self, user_id: &str, balance: Option<f64>) {
        self.emit(DomainEvent::WalletUpdated {
            user_id: user_id.to_string(),
            balance,
        });
    }

    async fn call<T>(
        &self,
        action: &'static str,
        fut: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, MutationError> {
        fut.await.map_err(|e| {
            tracing::warn!(action, error = %e, "mutation failed, nothing published");
            MutationError::new(action, e)
        })
    }

    fn emit(&self, event: DomainEvent) {
        tracing::info!(event = %event.name(), subject = %event.subject_id(), "mutation confirmed");
        self.bus.publish(event);
    }
}
