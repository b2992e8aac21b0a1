//! Donor dashboard: the logged-in donor's own donations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analytics;
use crate::api::BackendApi;
use crate::error::ApiError;
use crate::event::{DomainEvent, EventKind};
use crate::model::{Donation, DonationFilter, Identity};
use crate::view::{DashboardView, Snapshot, Strategy, find_mut};

/// Loads the donations made by the dashboard's identity.
///
/// Refetches when a donation is created or the donor's wallet changes, and
/// patches a donation's status optimistically when an admin updates it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DonorView;

/// Figures shown at the top of the donor dashboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DonorSummary {
    pub total_donated: f64,
    pub projects_supported: usize,
    pub success_rate: u32,
    pub this_month: f64,
    pub average_donation: f64,
    pub donation_count: usize,
}

#[async_trait]
impl DashboardView for DonorView {
    const NAME: &'static str = "donor";

    const EVENTS: &'static [(EventKind, Strategy)] = &[
        (EventKind::DonationCreated, Strategy::Refetch),
        (EventKind::WalletUpdated, Strategy::Refetch),
        (EventKind::DonationStatusUpdated, Strategy::Optimistic),
    ];

    type Record = Donation;
    type Summary = DonorSummary;
    type Context = ();

    async fn fetch(
        &self,
        api: &dyn BackendApi,
        identity: &Identity,
    ) -> Result<Snapshot<Donation, ()>, ApiError> {
        let records = api
            .fetch_donations(&DonationFilter::for_donor(&identity.user_id))
            .await?;
        Ok(Snapshot::records(records))
    }

    fn relevant(&self, identity: &Identity, _: &(), event: &DomainEvent) -> bool {
        match event {
            // Anonymous donations carry no donor id; they may still be ours.
            DomainEvent::DonationCreated { donor_id, .. } => donor_id
                .as_deref()
                .is_none_or(|id| id == identity.user_id),
            DomainEvent::WalletUpdated { user_id, .. } => *user_id == identity.user_id,
            _ => true,
        }
    }

    fn patch(&self, records: &mut [Donation], _: &mut (), event: &DomainEvent) -> Option<String> {
        let DomainEvent::DonationStatusUpdated {
            donation_id,
            status,
        } = event
        else {
            return None;
        };
        let donation = find_mut(records, donation_id)?;
        donation.status = *status;
        Some(donation.id.clone())
    }

    fn summarize(&self, records: &[Donation], _: &(), now: DateTime<Utc>) -> DonorSummary {
        DonorSummary {
            total_donated: analytics::total_amount(records),
            projects_supported: analytics::unique_projects_supported(records),
            success_rate: analytics::success_rate(records),
            this_month: analytics::this_month_total(records, now),
            average_donation: analytics::average_donation(records),
            donation_count: records.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::{at, donation};
    use crate::model::DonationStatus::*;
    use crate::model::Role;

    fn donor() -> Identity {
        Identity::new("donor-1", Role::Donor)
    }

    #[test]
    fn empty_summary_is_all_zero() {
        let summary = DonorView.summarize(&[], &(), at(2026, 10, 16));
        assert_eq!(summary, DonorSummary::default());
    }

    #[test]
    fn summary_uses_counted_donations() {
        let records = vec![
            donation("1", "p1", 40.0, Completed),
            donation("2", "p2", 10.0, Pending),
            donation("3", "p1", 20.0, Confirmed),
        ];
        let summary = DonorView.summarize(&records, &(), at(2026, 10, 16));
        assert_eq!(summary.total_donated, 60.0);
        assert_eq!(summary.projects_supported, 1);
        assert_eq!(summary.success_rate, 67);
        assert_eq!(summary.this_month, 60.0);
        assert_eq!(summary.donation_count, 3);
    }

    #[test]
    fn status_patch_targets_one_record() {
        let mut records = vec![
            donation("1", "p1", 40.0, Pending),
            donation("2", "p2", 10.0, Pending),
        ];
        let event = DomainEvent::DonationStatusUpdated {
            donation_id: "2".into(),
            status: Completed,
        };
        assert_eq!(
            DonorView.patch(&mut records, &mut (), &event),
            Some("2".to_string())
        );
        assert_eq!(records[0].status, Pending);
        assert_eq!(records[1].status, Completed);
    }

    #[test]
    fn patch_for_unknown_donation_is_none() {
        let mut records = vec![donation("1", "p1", 40.0, Pending)];
        let event = DomainEvent::DonationStatusUpdated {
            donation_id: "99".into(),
            status: Failed,
        };
        assert_eq!(DonorView.patch(&mut records, &mut (), &event), None);
        assert_eq!(records[0].status, Pending);
    }

    #[test]
    fn only_own_wallet_and_donations_are_relevant() {
        let wallet = |user: &str| DomainEvent::WalletUpdated {
            user_id: user.into(),
            balance: None,
        };
        assert!(DonorView.relevant(&donor(), &(), &wallet("donor-1")));
        assert!(!DonorView.relevant(&donor(), &(), &wallet("donor-2")));

        let created = |donor_id: Option<&str>| DomainEvent::DonationCreated {
            donation_id: "d".into(),
            project_id: "p".into(),
            donor_id: donor_id.map(str::to_string),
            amount: 1.0,
            currency: "USD".into(),
        };
        assert!(DonorView.relevant(&donor(), &(), &created(Some("donor-1"))));
        assert!(DonorView.relevant(&donor(), &(), &created(None)));
        assert!(!DonorView.relevant(&donor(), &(), &created(Some("donor-2"))));
    }

    #[test]
    fn strategy_mapping() {
        assert_eq!(
            DonorView::strategy(EventKind::DonationCreated),
            Some(Strategy::Refetch)
        );
        assert_eq!(
            DonorView::strategy(EventKind::DonationStatusUpdated),
            Some(Strategy::Optimistic)
        );
        assert_eq!(DonorView::strategy(EventKind::ProjectLiked), None);
    }
}
