//! Admin dashboard: every donation plus platform stats and the verification
//! queue.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analytics;
use crate::api::BackendApi;
use crate::error::ApiError;
use crate::event::{DomainEvent, EventKind};
use crate::model::{DashboardStats, Donation, DonationFilter, Identity, PendingVerification};
use crate::view::{DashboardView, Snapshot, Strategy, find_mut};

/// Every donation on the platform.
///
/// Status changes are patched in place, adjusting the loaded
/// `stats.total_raised` when a donation moves into or out of the counted
/// set, then reconciled by a refetch. New donations refetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminView;

/// Side data the admin dashboard loads next to the donation table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminContext {
    pub stats: DashboardStats,
    pub pending: Vec<PendingVerification>,
}

/// Figures shown on the admin dashboard.
///
/// The donation figures are folded from the loaded records; the remaining
/// ones come from the server's stats and verification queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminSummary {
    /// Sum of counted donations.
    pub total_amount: f64,
    /// Percent of donations that were counted.
    pub success_rate: u32,
    /// Counted donations made this calendar month (UTC).
    pub this_month: f64,
    pub donation_count: usize,
    /// Number of donations per status name.
    pub status_breakdown: BTreeMap<&'static str, usize>,
    /// Length of the loaded verification queue.
    pub pending_verifications: usize,
    pub total_users: u64,
    /// Platform-wide amount raised as reported by the server.
    pub total_raised: f64,
}

#[async_trait]
impl DashboardView for AdminView {
    const NAME: &'static str = "admin";

    const EVENTS: &'static [(EventKind, Strategy)] = &[
        (EventKind::DonationCreated, Strategy::Refetch),
        (EventKind::DonationStatusUpdated, Strategy::Optimistic),
    ];

    type Record = Donation;
    type Summary = AdminSummary;
    type Context = AdminContext;

    async fn fetch(
        &self,
        api: &dyn BackendApi,
        _identity: &Identity,
    ) -> Result<Snapshot<Donation, AdminContext>, ApiError> {
        let filter = DonationFilter::default();
        let (records, stats, pending) = tokio::try_join!(
            api.fetch_donations(&filter),
            api.dashboard_stats(),
            api.pending_verifications()
        )?;
        Ok(Snapshot {
            records,
            context: AdminContext { stats, pending },
        })
    }

    fn patch(
        &self,
        records: &mut [Donation],
        context: &mut AdminContext,
        event: &DomainEvent,
    ) -> Option<String> {
        let DomainEvent::DonationStatusUpdated {
            donation_id,
            status,
        } = event
        else {
            return None;
        };
        let donation = find_mut(records, donation_id)?;
        let previous = donation.status;
        donation.status = *status;
        // Keep the server's running total in step until the reconciling
        // fetch replaces it.
        if analytics::changes_totals(previous, *status) {
            if status.is_counted() {
                context.stats.total_raised += donation.amount;
            } else {
                context.stats.total_raised -= donation.amount;
            }
        }
        Some(donation.id.clone())
    }

    fn summarize(
        &self,
        records: &[Donation],
        context: &AdminContext,
        now: DateTime<Utc>,
    ) -> AdminSummary {
        AdminSummary {
            total_amount: analytics::total_amount(records),
            success_rate: analytics::success_rate(records),
            this_month: analytics::this_month_total(records, now),
            donation_count: records.len(),
            status_breakdown: analytics::status_breakdown(records),
            pending_verifications: context.pending.len(),
            total_users: context.stats.total_users,
            total_raised: context.stats.total_raised,
        }
    }
}
