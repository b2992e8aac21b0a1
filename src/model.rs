//! Server-shaped records mirrored by the dashboards.
//!
//! None of these types are authoritative: each is a client-side copy of a
//! Backend API response. Counters on [`Project`] and the status on
//! [`Donation`] may be patched locally, but a later full fetch always
//! replaces them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record that can be located by a stable string key.
///
/// Dashboards use the key to find the record an event refers to when
/// applying a local patch.
pub trait Keyed {
    /// The record's server-assigned identifier.
    fn key(&self) -> &str;
}

/// Lifecycle status of a donation as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Completed,
    Confirmed,
    Failed,
    Refunded,
    Flagged,
}

impl DonationStatus {
    /// Whether donations in this status count towards totals.
    ///
    /// Only `completed` and `confirmed` donations are counted; everything
    /// else (pending, failed, refunded, flagged) is excluded.
    pub fn is_counted(self) -> bool {
        matches!(self, Self::Completed | Self::Confirmed)
    }

    /// Lowercase wire name, e.g. `"completed"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Flagged => "flagged",
        }
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single donation towards a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: String,
    pub project_id: String,
    /// Absent for anonymous or guest donations.
    #[serde(default)]
    pub donor_id: Option<String>,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub status: DonationStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
    pub created_at: DateTime<Utc>,
}

impl Keyed for Donation {
    fn key(&self) -> &str {
        &self.id
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

/// A fundraising project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    /// The student or institution raising funds.
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub goal_amount: f64,
    #[serde(default)]
    pub funding_raised: f64,
    #[serde(default)]
    pub views_count: u64,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub shares_count: u64,
}

impl Keyed for Project {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Query for `fetchDonations`. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DonationFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DonationStatus>,
}

impl DonationFilter {
    /// Donations made by `donor_id`.
    pub fn for_donor(donor_id: impl Into<String>) -> Self {
        Self {
            donor_id: Some(donor_id.into()),
            ..Self::default()
        }
    }

    /// Donations made to `project_id`.
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::default()
        }
    }

    /// Restrict to donations in `status`.
    pub fn with_status(mut self, status: DonationStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Sort orders accepted by `fetchProjects`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectSort {
    Newest,
    MostFunded,
    MostViewed,
    Trending,
}

/// Query for `fetchProjects`. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<ProjectSort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ProjectFilter {
    /// Projects owned by `owner_id`.
    pub fn owned_by(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            ..Self::default()
        }
    }

    /// The single project with `id`.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// Parameters for `createDonation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDonation {
    pub project_id: String,
    pub amount: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
}

impl NewDonation {
    /// A named donation of `amount` in `currency` without a message.
    pub fn new(project_id: impl Into<String>, amount: f64, currency: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            amount,
            currency: currency.into(),
            message: None,
            anonymous: false,
        }
    }

    /// Attach a message for the project owner.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Hide the donor from the project owner.
    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }
}

/// Server response to `likeProject` / `unlikeProject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    pub liked: bool,
    pub likes_count: u64,
}

/// Server response to `trackShare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareOutcome {
    pub shares_count: u64,
}

/// Aggregate counts returned by `getDashboardStats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_projects: u64,
    pub total_donations: u64,
    pub total_raised: f64,
    pub pending_verifications: u64,
}

/// An item waiting for admin verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingVerification {
    pub id: String,
    /// What is being verified, e.g. `"student"` or `"project"`.
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Account role of the logged-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Donor,
    Student,
    Admin,
    Institution,
    Sponsor,
}

impl Role {
    /// Lowercase wire name, e.g. `"donor"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Donor => "donor",
            Self::Student => "student",
            Self::Admin => "admin",
            Self::Institution => "institution",
            Self::Sponsor => "sponsor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a role string is not one of the known roles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "donor" => Ok(Self::Donor),
            "student" => Ok(Self::Student),
            "admin" => Ok(Self::Admin),
            "institution" => Ok(Self::Institution),
            "sponsor" => Ok(Self::Sponsor),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The logged-in user a dashboard is loaded for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    /// Identity of `user_id` acting as `role`.
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}
