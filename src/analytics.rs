//! Pure folds over donation and project collections.
//!
//! Every function here is deterministic, performs no I/O and never mutates
//! its input. Dashboards recompute their summaries by calling these on the
//! current records, so a summary is always a function of the records it
//! was computed from.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::model::{Donation, DonationStatus, Project};

/// Sum of `amount` over counted (completed or confirmed) donations.
pub fn total_amount(records: &[Donation]) -> f64 {
    counted(records).fold(0.0, |sum, d| sum + d.amount)
}

/// Number of distinct projects among counted donations.
pub fn unique_projects_supported(records: &[Donation]) -> usize {
    counted(records)
        .map(|d| d.project_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Percentage of donations that were counted, rounded to the nearest
/// integer. Returns `0` for an empty slice.
pub fn success_rate(records: &[Donation]) -> u32 {
    if records.is_empty() {
        return 0;
    }
    let counted = counted(records).count() as f64;
    (counted / records.len() as f64 * 100.0).round() as u32
}

/// Sum of counted donations made between the first instant of `now`'s
/// month (UTC) and `now`, inclusive.
pub fn this_month_total(records: &[Donation], now: DateTime<Utc>) -> f64 {
    let start = month_start(now);
    counted(records)
        .filter(|d| d.created_at >= start && d.created_at <= now)
        .fold(0.0, |sum, d| sum + d.amount)
}

/// Mean amount of counted donations, `0.0` when there are none.
pub fn average_donation(records: &[Donation]) -> f64 {
    let (sum, n) = counted(records).fold((0.0, 0usize), |(sum, n), d| (sum + d.amount, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

/// Number of donations per status.
pub fn status_breakdown(records: &[Donation]) -> BTreeMap<&'static str, usize> {
    let mut breakdown = BTreeMap::new();
    for d in records {
        *breakdown.entry(d.status.as_str()).or_insert(0) += 1;
    }
    breakdown
}

/// `funding_raised + views * 10 + likes * 5`.
pub fn engagement_score(project: &Project) -> f64 {
    project.funding_raised + project.views_count as f64 * 10.0 + project.likes_count as f64 * 5.0
}

/// Projects ordered by [`engagement_score`], highest first.
///
/// The sort is stable: projects with equal scores keep their input order.
pub fn rank_by_engagement_score(projects: &[Project]) -> Vec<Project> {
    let mut ranked = projects.to_vec();
    ranked.sort_by(|a, b| engagement_score(b).total_cmp(&engagement_score(a)));
    ranked
}

/// Percentage of the funding goal reached, capped at 100. A project with no
/// goal reports `0`.
pub fn funding_progress(project: &Project) -> u32 {
    if project.goal_amount <= 0.0 {
        return 0;
    }
    (project.funding_raised / project.goal_amount * 100.0)
        .round()
        .clamp(0.0, 100.0) as u32
}

fn counted(records: &[Donation]) -> impl Iterator<Item = &Donation> {
    records.iter().filter(|d| d.status.is_counted())
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Whether a status change moves a donation into or out of the counted set.
pub fn changes_totals(from: DonationStatus, to: DonationStatus) -> bool {
    from.is_counted() != to.is_counted()
}
