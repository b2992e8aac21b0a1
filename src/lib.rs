//! Event-bus-driven dashboard synchronization for a crowdfunding client.
//!
//! Mutations go through a [`MutationEmitter`], which publishes a
//! [`DomainEvent`] on the [`EventBus`] once the backend confirms them.
//! Mounted [`Dashboard`]s subscribe to the events they care about and either
//! refetch, patch optimistically, or apply the authoritative value carried by
//! the event. [`SyncHub`] wires the pieces together for an application.

mod admin;
pub mod analytics;
mod api;
mod bus;
mod config;
mod dashboard;
mod donor;
mod emitter;
mod error;
mod event;
mod guard;
mod http;
mod hub;
mod model;
mod project_detail;
mod student;
mod view;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use api::BackendApi;
pub use bus::{EventBus, HandlerResult, Subscription};
pub use config::{ApiConfig, SyncConfig};
pub use dashboard::{Dashboard, DashboardState, Phase, RefreshOutcome};
pub use emitter::MutationEmitter;
pub use error::{ApiError, DashboardError, HandlerError, MutationError};
pub use event::{DomainEvent, Envelope, EventKind, UnknownEventName};
pub use guard::{Admission, CoalescePolicy, RefreshGuard};
pub use http::HttpBackend;
pub use hub::{AnyDashboard, SyncHub, SyncHubBuilder};
pub use model::{
    DashboardStats, Donation, DonationFilter, DonationStatus, Identity, Keyed, LikeOutcome,
    NewDonation, PendingVerification, Project, ProjectFilter, ProjectSort, Role, ShareOutcome,
    UnknownRole,
};
pub use view::{
    AdminContext, AdminSummary, AdminView, DashboardView, DonorSummary, DonorView,
    ProjectDetailSummary, ProjectDetailView, Snapshot, Strategy, StudentSummary, StudentView,
};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
