//! Domain event taxonomy and the envelope delivered to subscribers.
//!
//! Every event is a variant of [`DomainEvent`], serialized with adjacent
//! tagging (`"type"` + `"data"`) so that the tag doubles as the event's
//! string name (`"project-liked"`, `"donation-created"`, ...). Subscriptions
//! are keyed by the fieldless [`EventKind`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::DonationStatus;

/// The closed set of event names a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// `project-liked`
    ProjectLiked,
    /// `project-unliked`
    ProjectUnliked,
    /// `project-shared`
    ProjectShared,
    /// `project-viewed`
    ProjectViewed,
    /// `donation-created`
    DonationCreated,
    /// `donation-status-updated`
    DonationStatusUpdated,
    /// `wallet-updated`
    WalletUpdated,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 7] = [
        Self::ProjectLiked,
        Self::ProjectUnliked,
        Self::ProjectShared,
        Self::ProjectViewed,
        Self::DonationCreated,
        Self::DonationStatusUpdated,
        Self::WalletUpdated,
    ];

    /// The event's string name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProjectLiked => "project-liked",
            Self::ProjectUnliked => "project-unliked",
            Self::ProjectShared => "project-shared",
            Self::ProjectViewed => "project-viewed",
            Self::DonationCreated => "donation-created",
            Self::DonationStatusUpdated => "donation-status-updated",
            Self::WalletUpdated => "wallet-updated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a name that is not part of the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event name: {0}")]
pub struct UnknownEventName(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventName(s.to_string()))
    }
}

/// A notification that a specific mutation succeeded on the server.
///
/// Payloads carry the minimal identifying data plus any authoritative
/// values the server returned with the mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum DomainEvent {
    /// A like was recorded.
    ProjectLiked {
        project_id: String,
        /// The project's like count after the mutation.
        likes_count: u64,
    },
    /// A like was withdrawn.
    ProjectUnliked {
        project_id: String,
        /// The project's like count after the mutation.
        likes_count: u64,
    },
    /// A share was recorded.
    ProjectShared {
        project_id: String,
        /// The project's share count after the mutation.
        shares_count: u64,
    },
    /// A view was tracked. Carries no count; views are incremented locally.
    ProjectViewed { project_id: String },
    /// A donation was created.
    DonationCreated {
        donation_id: String,
        project_id: String,
        /// `None` for anonymous donations.
        #[serde(default)]
        donor_id: Option<String>,
        amount: f64,
        currency: String,
    },
    /// An admin moved a donation to a new status.
    DonationStatusUpdated {
        donation_id: String,
        status: DonationStatus,
    },
    /// A user's wallet changed.
    WalletUpdated {
        user_id: String,
        /// New balance, when the caller knows it.
        #[serde(default)]
        balance: Option<f64>,
    },
}

impl DomainEvent {
    /// The subscription key this event is delivered under.
    ///
    /// # Returns
    ///
    /// The fieldless [`EventKind`] matching this variant.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ProjectLiked { .. } => EventKind::ProjectLiked,
            Self::ProjectUnliked { .. } => EventKind::ProjectUnliked,
            Self::ProjectShared { .. } => EventKind::ProjectShared,
            Self::ProjectViewed { .. } => EventKind::ProjectViewed,
            Self::DonationCreated { .. } => EventKind::DonationCreated,
            Self::DonationStatusUpdated { .. } => EventKind::DonationStatusUpdated,
            Self::WalletUpdated { .. } => EventKind::WalletUpdated,
        }
    }

    /// The event's string name, e.g. `"project-liked"`.
    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// The identifier of the entity the event is about.
    pub fn subject_id(&self) -> &str {
        match self {
            Self::ProjectLiked { project_id, .. }
            | Self::ProjectUnliked { project_id, .. }
            | Self::ProjectShared { project_id, .. }
            | Self::ProjectViewed { project_id } => project_id,
            Self::DonationCreated { donation_id, .. }
            | Self::DonationStatusUpdated { donation_id, .. } => donation_id,
            Self::WalletUpdated { user_id, .. } => user_id,
        }
    }

    /// The event's payload as a JSON object (the `"data"` half of the
    /// tagged encoding).
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut value| value.get_mut("data").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }

    /// Rebuild an event from its string name and JSON payload.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the name is unknown or the payload
    /// does not match the variant's fields.
    pub fn from_parts(name: &str, payload: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::json!({ "type": name, "data": payload }))
    }
}

/// A published event as seen by subscribers.
///
/// The bus stamps each event with a fresh id, a per-bus sequence number
/// and the publish time. Envelopes are never stored: they exist for the
/// duration of one `publish` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub seq: u64,
    pub published_at: DateTime<Utc>,
    pub event: DomainEvent,
}

impl Envelope {
    pub(crate) fn new(seq: u64, event: DomainEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq,
            published_at: Utc::now(),
            event,
        }
    }

    /// Kind of the wrapped event.
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}
