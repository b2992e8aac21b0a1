//! Top-level entry point that composes the event bus, the backend and the
//! dashboard configuration into a single [`SyncHub`].
//!
//! The hub is built via [`SyncHubBuilder`]. It hands out
//! [`MutationEmitter`]s and mounts dashboards that all share one bus, so a
//! mutation made through any emitter reaches every dashboard mounted from
//! the same hub.

use std::fmt;
use std::sync::Arc;

use crate::api::BackendApi;
use crate::bus::EventBus;
use crate::config::{ApiConfig, SyncConfig};
use crate::dashboard::{Dashboard, Phase, RefreshOutcome};
use crate::emitter::MutationEmitter;
use crate::error::{ApiError, DashboardError};
use crate::guard::CoalescePolicy;
use crate::http::HttpBackend;
use crate::model::{Identity, Role};
use crate::view::{AdminView, DashboardView, DonorView, StudentView};

/// Owns the session's bus, backend and dashboard configuration.
///
/// `Clone` is cheap: clones share the bus and the backend.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use crowdfund_sync::{AnyDashboard, Identity, Role, SyncHub};
///
/// let hub = SyncHub::from_env()?;
/// let dashboard = hub.mount_for(Identity::new("donor-1", Role::Donor))?;
/// assert!(matches!(dashboard, AnyDashboard::Donor(_)));
///
/// hub.emitter().like("42").await?;
/// hub.dispose();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SyncHub {
    bus: EventBus,
    api: Arc<dyn BackendApi>,
    config: SyncConfig,
}

impl fmt::Debug for SyncHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHub")
            .field("bus", &self.bus)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncHub {
    /// Start building a hub around `api`.
    pub fn builder(api: Arc<dyn BackendApi>) -> SyncHubBuilder {
        SyncHubBuilder::new(api)
    }

    /// Hub backed by an [`HttpBackend`] configured from the environment
    /// (see [`ApiConfig::from_env`]), with default settings otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn from_env() -> Result<Self, ApiError> {
        let backend = HttpBackend::new(ApiConfig::from_env())?;
        Ok(Self::builder(Arc::new(backend)).build())
    }

    /// An emitter publishing on this hub's bus.
    pub fn emitter(&self) -> MutationEmitter {
        MutationEmitter::new(Arc::clone(&self.api), self.bus.clone())
    }

    /// The bus shared by every emitter and dashboard of this hub.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Configuration applied to dashboards mounted from this hub.
    pub fn config(&self) -> SyncConfig {
        self.config
    }

    /// Mount `view` on this hub's bus and start loading for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::BusDisposed`] after [`dispose`](Self::dispose)
    /// and [`DashboardError::NoRuntime`] outside a Tokio runtime.
    pub fn mount<V: DashboardView>(
        &self,
        view: V,
        identity: Option<Identity>,
    ) -> Result<Dashboard<V>, DashboardError> {
        Dashboard::mount(view, Arc::clone(&self.api), &self.bus, self.config, identity)
    }

    /// Mount the dashboard that `identity`'s role sees.
    ///
    /// # Errors
    ///
    /// Same as [`mount`](Self::mount).
    pub fn mount_for(&self, identity: Identity) -> Result<AnyDashboard, DashboardError> {
        let role = identity.role;
        let identity = Some(identity);
        let dashboard = match role {
            Role::Donor | Role::Sponsor => AnyDashboard::Donor(self.mount(DonorView, identity)?),
            Role::Student | Role::Institution => {
                AnyDashboard::Student(self.mount(StudentView, identity)?)
            }
            Role::Admin => AnyDashboard::Admin(self.mount(AdminView, identity)?),
        };
        Ok(dashboard)
    }

    /// Dispose the bus. Every dashboard mounted from this hub stops
    /// receiving events and no new dashboard can be mounted.
    pub fn dispose(&self) {
        self.bus.dispose();
    }
}

/// Builder for [`SyncHub`].
pub struct SyncHubBuilder {
    api: Arc<dyn BackendApi>,
    bus: Option<EventBus>,
    config: SyncConfig,
}

impl SyncHubBuilder {
    /// Builder with a fresh bus and default configuration.
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        Self {
            api,
            bus: None,
            config: SyncConfig::default(),
        }
    }

    /// Use an existing bus instead of creating a fresh one.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Set the dashboard configuration.
    ///
    /// If not called, [`SyncConfig::default()`] is used.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for setting only [`SyncConfig::coalesce`].
    pub fn coalesce(mut self, policy: CoalescePolicy) -> Self {
        self.config.coalesce = policy;
        self
    }

    /// Finish building. Creates a new bus unless one was supplied.
    pub fn build(self) -> SyncHub {
        SyncHub {
            bus: self.bus.unwrap_or_default(),
            api: self.api,
            config: self.config,
        }
    }
}

/// A dashboard picked by role, see [`SyncHub::mount_for`].
#[derive(Debug, Clone)]
pub enum AnyDashboard {
    Donor(Dashboard<DonorView>),
    Student(Dashboard<StudentView>),
    Admin(Dashboard<AdminView>),
}

impl AnyDashboard {
    /// Name of the underlying view.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Donor(_) => DonorView::NAME,
            Self::Student(_) => StudentView::NAME,
            Self::Admin(_) => AdminView::NAME,
        }
    }

    /// Current phase of the underlying dashboard.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Donor(d) => d.state().phase,
            Self::Student(d) => d.state().phase,
            Self::Admin(d) => d.state().phase,
        }
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        match self {
            Self::Donor(d) => d.refresh().await,
            Self::Student(d) => d.refresh().await,
            Self::Admin(d) => d.refresh().await,
        }
    }

    /// See [`Dashboard::request_refresh`].
    pub fn request_refresh(&self) -> bool {
        match self {
            Self::Donor(d) => d.request_refresh(),
            Self::Student(d) => d.request_refresh(),
            Self::Admin(d) => d.request_refresh(),
        }
    }

    /// See [`Dashboard::dispose`].
    pub fn dispose(&self) {
        match self {
            Self::Donor(d) => d.dispose(),
            Self::Student(d) => d.dispose(),
            Self::Admin(d) => d.dispose(),
        }
    }
}
