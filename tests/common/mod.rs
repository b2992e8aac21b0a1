//! Common test utilities for the end-to-end scenarios.

pub mod scripted_backend;

use chrono::{TimeZone, Utc};
use crowdfund_sync::{Donation, DonationStatus, Project};

pub use scripted_backend::ScriptedBackend;

pub fn donation(
    id: &str,
    project: &str,
    donor: &str,
    amount: f64,
    status: DonationStatus,
) -> Donation {
    Donation {
        id: id.to_string(),
        project_id: project.to_string(),
        donor_id: Some(donor.to_string()),
        amount,
        currency: "USD".to_string(),
        status,
        message: None,
        anonymous: false,
        created_at: Utc.with_ymd_and_hms(2026, 10, 3, 9, 0, 0).unwrap(),
    }
}

pub fn project(id: &str, owner: &str, likes: u64) -> Project {
    Project {
        id: id.to_string(),
        title: format!("Project {id}"),
        owner_id: Some(owner.to_string()),
        category: Some("education".to_string()),
        goal_amount: 1000.0,
        funding_raised: 0.0,
        views_count: 0,
        likes_count: likes,
        shares_count: 0,
    }
}
