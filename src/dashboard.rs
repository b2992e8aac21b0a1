//! The generic dashboard aggregator.
//!
//! A [`Dashboard`] owns one [`DashboardState`] for one identity at a time.
//! It loads records through its [`DashboardView`], subscribes to the view's
//! event kinds on the bus, and keeps the state in step with server-side
//! mutations.
//!
//! # Concurrency
//!
//! State lives behind a single mutex that is never held across an `.await`.
//! Every fetch captures a ticket holding the identity epoch it was sent
//! for. When the response arrives it is applied only if the dashboard is
//! still mounted and still on that epoch; otherwise it is discarded without
//! touching the state or the refresh guard, which by then belongs to the
//! new epoch.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::Instrument;

use crate::api::BackendApi;
use crate::bus::{EventBus, HandlerResult, Subscription};
use crate::config::SyncConfig;
use crate::error::{ApiError, DashboardError};
use crate::event::{DomainEvent, Envelope};
use crate::guard::{Admission, CoalescePolicy, RefreshGuard};
use crate::lock;
use crate::model::{Identity, Keyed};
use crate::view::{DashboardView, Snapshot, Strategy};

/// Lifecycle phase of a dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No identity; nothing to load.
    Idle,
    /// First fetch for the current identity is in flight.
    Loading,
    /// Records reflect the last completed fetch (or its failure).
    Ready,
    /// A refetch is in flight; the previous records stay visible.
    Refreshing,
}

/// What a call to [`Dashboard::refresh`] ended up doing.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The fetch succeeded and its records were applied.
    Completed,
    /// The fetch failed. Last-known-good records were kept.
    Failed(Arc<ApiError>),
    /// A fetch was already in flight; this request was folded into it.
    Coalesced,
    /// The identity changed or the dashboard was disposed while the fetch
    /// was in flight, so the result was dropped.
    Stale,
    /// There is no identity to load for.
    Idle,
    /// The dashboard was disposed before the request.
    Disposed,
}

/// Point-in-time copy of a dashboard's state.
pub struct DashboardState<V: DashboardView> {
    pub identity: Option<Identity>,
    pub records: Vec<V::Record>,
    /// Always `view.summarize(records, context)`.
    pub summary: V::Summary,
    pub context: V::Context,
    pub phase: Phase,
    /// `true` while a fetch for the current identity is in flight.
    pub loading: bool,
    /// User id whose records are loaded, `None` before the first completed
    /// fetch for the current identity.
    pub last_loaded_key: Option<String>,
    /// Failure of the most recent fetch. Cleared by the next success.
    pub error: Option<Arc<ApiError>>,
    /// Keys of records holding an optimistic value that no fetch has
    /// reconciled yet, sorted.
    pub tentative: Vec<String>,
    pub mounted: bool,
}

impl<V: DashboardView> DashboardState<V> {
    /// Whether the record with `key` holds an unreconciled optimistic value.
    pub fn is_tentative(&self, key: &str) -> bool {
        self.tentative.iter().any(|k| k == key)
    }

    /// The record with `key`, if loaded.
    pub fn record(&self, key: &str) -> Option<&V::Record> {
        self.records.iter().find(|r| r.key() == key)
    }
}

impl<V: DashboardView> Clone for DashboardState<V> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            records: self.records.clone(),
            summary: self.summary.clone(),
            context: self.context.clone(),
            phase: self.phase,
            loading: self.loading,
            last_loaded_key: self.last_loaded_key.clone(),
            error: self.error.clone(),
            tentative: self.tentative.clone(),
            mounted: self.mounted,
        }
    }
}

impl<V: DashboardView> fmt::Debug for DashboardState<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardState")
            .field("dashboard", &V::NAME)
            .field("identity", &self.identity)
            .field("phase", &self.phase)
            .field("records", &self.records)
            .field("summary", &self.summary)
            .field("context", &self.context)
            .field("last_loaded_key", &self.last_loaded_key)
            .field("error", &self.error)
            .field("tentative", &self.tentative)
            .field("mounted", &self.mounted)
            .finish()
    }
}

/// A fetch in flight, tagged with what it was sent for.
struct Ticket {
    epoch: u64,
    seq: u64,
    identity: Identity,
}

enum Step {
    Done(RefreshOutcome),
    FollowUp(Ticket),
}

/// An optimistic patch not yet covered by a fetch.
struct PendingPatch {
    key: String,
    /// `fetch_seq` when the patch was applied. Fetches up to this sequence
    /// were sent before it and do not reflect it.
    patched_at: u64,
    event: DomainEvent,
}

struct Inner<V: DashboardView> {
    identity: Option<Identity>,
    /// Bumped on every identity change and on dispose.
    epoch: u64,
    mounted: bool,
    phase: Phase,
    records: Vec<V::Record>,
    context: V::Context,
    summary: V::Summary,
    error: Option<Arc<ApiError>>,
    last_loaded_key: Option<String>,
    guard: RefreshGuard,
    /// Number of fetches sent so far.
    fetch_seq: u64,
    /// Optimistic patches in the order they were applied.
    tentative: Vec<PendingPatch>,
}

impl<V: DashboardView> Inner<V> {
    fn new(policy: CoalescePolicy) -> Self {
        Self {
            identity: None,
            epoch: 0,
            mounted: true,
            phase: Phase::Idle,
            records: Vec::new(),
            context: V::Context::default(),
            summary: V::Summary::default(),
            error: None,
            last_loaded_key: None,
            guard: RefreshGuard::new(policy),
            fetch_seq: 0,
            tentative: Vec::new(),
        }
    }

    fn reset(&mut self, identity: Option<Identity>, policy: CoalescePolicy) {
        self.epoch += 1;
        self.phase = if identity.is_some() {
            Phase::Loading
        } else {
            Phase::Idle
        };
        self.identity = identity;
        self.records.clear();
        self.context = V::Context::default();
        self.error = None;
        self.last_loaded_key = None;
        self.guard = RefreshGuard::new(policy);
        self.tentative.clear();
    }

    fn start_fetch(&mut self, identity: Identity) -> Ticket {
        self.fetch_seq += 1;
        self.phase = if self.last_loaded_key.is_some() {
            Phase::Refreshing
        } else {
            Phase::Loading
        };
        Ticket {
            epoch: self.epoch,
            seq: self.fetch_seq,
            identity,
        }
    }

    fn apply(&mut self, view: &V, snapshot: Snapshot<V::Record, V::Context>, seq: u64) {
        self.records = snapshot.records;
        self.context = snapshot.context;
        self.error = None;
        self.last_loaded_key = self.identity.as_ref().map(|i| i.user_id.clone());
        // A fetch sent after a patch reflects it. Older responses get the
        // patches they predate replayed on top.
        self.tentative.retain(|p| p.patched_at >= seq);
        let (records, context) = (&mut self.records, &mut self.context);
        self.tentative
            .retain(|p| view.patch(records.as_mut_slice(), context, &p.event).is_some());
    }

    fn resummarize(&mut self, view: &V) {
        self.summary = view.summarize(&self.records, &self.context, Utc::now());
    }

    fn snapshot(&self) -> DashboardState<V> {
        let mut tentative: Vec<String> = self.tentative.iter().map(|p| p.key.clone()).collect();
        tentative.sort();
        tentative.dedup();
        DashboardState {
            identity: self.identity.clone(),
            records: self.records.clone(),
            summary: self.summary.clone(),
            context: self.context.clone(),
            phase: self.phase,
            loading: matches!(self.phase, Phase::Loading | Phase::Refreshing),
            last_loaded_key: self.last_loaded_key.clone(),
            error: self.error.clone(),
            tentative,
            mounted: self.mounted,
        }
    }
}

struct Shared<V: DashboardView> {
    view: V,
    api: Arc<dyn BackendApi>,
    config: SyncConfig,
    runtime: Handle,
    state: Mutex<Inner<V>>,
    subscriptions: Mutex<Vec<Subscription>>,
    revision: watch::Sender<u64>,
}

impl<V: DashboardView> Drop for Shared<V> {
    fn drop(&mut self) {
        for sub in lock(&self.subscriptions).drain(..) {
            sub.unsubscribe();
        }
    }
}

/// A mounted dashboard for one role.
///
/// `Clone` is cheap: clones share the same state. Event handlers hold only
/// a weak reference, so dropping every clone releases the subscriptions.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use std::sync::Arc;
/// use std::time::Duration;
/// use crowdfund_sync::{
///     ApiConfig, Dashboard, DonorView, EventBus, HttpBackend, Identity, Phase, Role, SyncConfig,
/// };
///
/// let api = Arc::new(HttpBackend::new(ApiConfig::from_env())?);
/// let bus = EventBus::new();
/// let dashboard = Dashboard::mount(
///     DonorView,
///     api,
///     &bus,
///     SyncConfig::default(),
///     Some(Identity::new("donor-1", Role::Donor)),
/// )?;
///
/// let state = dashboard
///     .wait_for(|s| s.phase == Phase::Ready, Duration::from_secs(5))
///     .await;
/// # Ok(())
/// # }
/// ```
pub struct Dashboard<V: DashboardView> {
    shared: Arc<Shared<V>>,
}

impl<V: DashboardView> Clone for Dashboard<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: DashboardView> fmt::Debug for Dashboard<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.shared.state);
        f.debug_struct("Dashboard")
            .field("view", &V::NAME)
            .field("identity", &inner.identity)
            .field("phase", &inner.phase)
            .field("mounted", &inner.mounted)
            .finish()
    }
}

impl<V: DashboardView> Dashboard<V> {
    /// Mount a dashboard: subscribe to the view's events and, if an
    /// identity is given, start loading for it.
    ///
    /// Must be called from within a Tokio runtime; refreshes triggered by
    /// events are spawned onto it.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::BusDisposed`] if `bus` was disposed and
    /// [`DashboardError::NoRuntime`] outside a Tokio runtime.
    pub fn mount(
        view: V,
        api: Arc<dyn BackendApi>,
        bus: &EventBus,
        config: SyncConfig,
        identity: Option<Identity>,
    ) -> Result<Self, DashboardError> {
        if bus.is_disposed() {
            return Err(DashboardError::BusDisposed);
        }
        let runtime = Handle::try_current().map_err(|_| DashboardError::NoRuntime)?;
        let (revision, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            view,
            api,
            config,
            runtime,
            state: Mutex::new(Inner::new(config.coalesce)),
            subscriptions: Mutex::new(Vec::new()),
            revision,
        });

        let subscriptions: Vec<Subscription> = V::EVENTS
            .iter()
            .map(|(kind, _)| {
                let weak = Arc::downgrade(&shared);
                bus.subscribe(*kind, move |envelope: &Envelope| match weak.upgrade() {
                    Some(shared) => Dashboard { shared }.on_event(envelope),
                    None => Ok(()),
                })
            })
            .collect();
        *lock(&shared.subscriptions) = subscriptions;
        tracing::debug!(dashboard = V::NAME, "dashboard mounted");

        let dashboard = Self { shared };
        if identity.is_some() {
            dashboard.set_identity(identity)?;
        }
        Ok(dashboard)
    }

    /// Switch to another identity (or to none, e.g. on logout).
    ///
    /// A different identity hard-resets the state and starts loading for
    /// the new one. Fetches still in flight for the old identity are
    /// discarded when they resolve. Setting the current identity again is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Disposed`] after [`dispose`](Self::dispose).
    pub fn set_identity(&self, identity: Option<Identity>) -> Result<(), DashboardError> {
        {
            let mut inner = lock(&self.shared.state);
            if !inner.mounted {
                return Err(DashboardError::Disposed(V::NAME));
            }
            if inner.identity == identity {
                return Ok(());
            }
            inner.reset(identity.clone(), self.shared.config.coalesce);
            inner.resummarize(&self.shared.view);
            tracing::debug!(
                dashboard = V::NAME,
                user = identity.as_ref().map_or("-", |i| i.user_id.as_str()),
                epoch = inner.epoch,
                "identity changed, state reset"
            );
        }
        self.notify();
        if identity.is_some() {
            self.request_refresh();
        }
        Ok(())
    }

    /// Fetch now and wait for the result.
    ///
    /// Subject to the refresh guard: if a fetch is already in flight this
    /// returns [`RefreshOutcome::Coalesced`] immediately. When this call
    /// owns the fetch it also runs the follow-up fetch owed to triggers
    /// that arrived meanwhile, and reports the outcome of the last one.
    pub async fn refresh(&self) -> RefreshOutcome {
        match self.begin() {
            Ok(ticket) => {
                self.notify();
                self.run(ticket).await
            }
            Err(outcome) => outcome,
        }
    }

    /// Start a refresh in the background.
    ///
    /// Returns `true` if a fetch was started, `false` if it was coalesced
    /// into the one in flight or there is nothing to load.
    pub fn request_refresh(&self) -> bool {
        match self.begin() {
            Ok(ticket) => {
                self.notify();
                let this = self.clone();
                self.shared.runtime.spawn(async move {
                    this.run(ticket).await;
                });
                true
            }
            Err(_) => false,
        }
    }

    /// Copy of the current state.
    pub fn state(&self) -> DashboardState<V> {
        lock(&self.shared.state).snapshot()
    }

    /// Receiver whose value bumps on every observable state change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Wait until `predicate` holds for the state, or `timeout` elapses.
    ///
    /// # Returns
    ///
    /// The first state satisfying `predicate`, or `None` on timeout.
    pub async fn wait_for(
        &self,
        predicate: impl Fn(&DashboardState<V>) -> bool,
        timeout: Duration,
    ) -> Option<DashboardState<V>> {
        let mut changes = self.changes();
        let wait = async {
            loop {
                changes.borrow_and_update();
                let state = self.state();
                if predicate(&state) {
                    return Some(state);
                }
                if changes.changed().await.is_err() {
                    return None;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }

    /// Release every subscription and stop accepting state changes.
    ///
    /// Idempotent. The last state stays readable through
    /// [`state`](Self::state); results of fetches still in flight are
    /// discarded.
    pub fn dispose(&self) {
        {
            let mut inner = lock(&self.shared.state);
            if !inner.mounted {
                return;
            }
            inner.mounted = false;
            inner.epoch += 1;
        }
        let subscriptions = std::mem::take(&mut *lock(&self.shared.subscriptions));
        for sub in &subscriptions {
            sub.unsubscribe();
        }
        tracing::debug!(dashboard = V::NAME, "dashboard disposed");
        self.notify();
    }

    /// `false` once [`dispose`](Self::dispose) has run.
    pub fn is_mounted(&self) -> bool {
        lock(&self.shared.state).mounted
    }

    /// The view this dashboard was mounted with.
    pub fn view(&self) -> &V {
        &self.shared.view
    }

    fn notify(&self) {
        self.shared.revision.send_modify(|rev| *rev += 1);
    }

    /// Claim the guard and describe the fetch to send.
    fn begin(&self) -> Result<Ticket, RefreshOutcome> {
        let mut inner = lock(&self.shared.state);
        if !inner.mounted {
            return Err(RefreshOutcome::Disposed);
        }
        let Some(identity) = inner.identity.clone() else {
            return Err(RefreshOutcome::Idle);
        };
        if inner.guard.try_begin() == Admission::Coalesced {
            tracing::debug!(
                dashboard = V::NAME,
                follow_up = inner.guard.is_dirty(),
                "refresh coalesced into the one in flight"
            );
            return Err(RefreshOutcome::Coalesced);
        }
        Ok(inner.start_fetch(identity))
    }

    async fn run(&self, mut ticket: Ticket) -> RefreshOutcome {
        loop {
            let span = tracing::info_span!(
                "refresh",
                dashboard = V::NAME,
                epoch = ticket.epoch,
                seq = ticket.seq
            );
            let result = self
                .shared
                .view
                .fetch(self.shared.api.as_ref(), &ticket.identity)
                .instrument(span.clone())
                .await;
            match span.in_scope(|| self.complete(&ticket, result)) {
                Step::Done(RefreshOutcome::Stale) => return RefreshOutcome::Stale,
                Step::Done(outcome) => {
                    self.notify();
                    return outcome;
                }
                Step::FollowUp(next) => {
                    self.notify();
                    ticket = next;
                }
            }
        }
    }

    /// Apply a fetch result if it is still current.
    fn complete(
        &self,
        ticket: &Ticket,
        result: Result<Snapshot<V::Record, V::Context>, ApiError>,
    ) -> Step {
        let mut inner = lock(&self.shared.state);
        if !inner.mounted || inner.epoch != ticket.epoch {
            tracing::debug!(
                current_epoch = inner.epoch,
                "discarding stale refresh result"
            );
            return Step::Done(RefreshOutcome::Stale);
        }

        let outcome = match result {
            Ok(snapshot) => {
                let count = snapshot.records.len();
                inner.apply(&self.shared.view, snapshot, ticket.seq);
                inner.resummarize(&self.shared.view);
                tracing::info!(records = count, "refresh completed");
                RefreshOutcome::Completed
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    transient = e.is_transient(),
                    "refresh failed, keeping last-known-good records"
                );
                let e = Arc::new(e);
                inner.error = Some(Arc::clone(&e));
                RefreshOutcome::Failed(e)
            }
        };
        inner.phase = Phase::Ready;

        if inner.guard.finish() {
            tracing::debug!("running follow-up refresh for coalesced triggers");
            return Step::FollowUp(inner.start_fetch(ticket.identity.clone()));
        }
        Step::Done(outcome)
    }

    fn on_event(&self, envelope: &Envelope) -> HandlerResult {
        let event = &envelope.event;
        let Some(strategy) = V::strategy(event.kind()) else {
            return Ok(());
        };

        let mut changed = false;
        let mut refetch = false;
        {
            let mut guard = lock(&self.shared.state);
            let inner = &mut *guard;
            if !inner.mounted {
                return Ok(());
            }
            let relevant = match inner.identity.as_ref() {
                Some(identity) => self.shared.view.relevant(identity, &inner.context, event),
                None => return Ok(()),
            };
            if !relevant {
                return Ok(());
            }

            match strategy {
                Strategy::Refetch => refetch = true,
                Strategy::Optimistic | Strategy::Authoritative => {
                    let patched =
                        self.shared
                            .view
                            .patch(&mut inner.records, &mut inner.context, event);
                    if let Some(key) = patched {
                        if strategy == Strategy::Optimistic {
                            inner.tentative.push(PendingPatch {
                                key: key.clone(),
                                patched_at: inner.fetch_seq,
                                event: event.clone(),
                            });
                            if self.shared.config.patch_reconcile {
                                // The fetch in flight predates the patch, so
                                // a reconciling one is owed whatever the policy.
                                if inner.guard.in_flight() {
                                    inner.guard.owe_follow_up();
                                } else {
                                    refetch = true;
                                }
                            }
                        }
                        inner.resummarize(&self.shared.view);
                        changed = true;
                        tracing::debug!(
                            dashboard = V::NAME,
                            event = %event.name(),
                            record = %key,
                            ?strategy,
                            "patched local record"
                        );
                    }
                }
            }
        }

        if changed {
            self.notify();
        }
        if refetch {
            self.request_refresh();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::{donation, project};
    use crate::api::test_fixtures::MockBackend;
    use crate::donor::DonorView;
    use crate::event::DomainEvent;
    use crate::model::{DonationStatus, Role};
    use crate::project_detail::ProjectDetailView;
    use crate::student::StudentView;

    const WAIT: Duration = Duration::from_secs(2);

    fn donor(id: &str) -> Identity {
        Identity::new(id, Role::Donor)
    }

    fn config(coalesce: CoalescePolicy) -> SyncConfig {
        SyncConfig {
            coalesce,
            ..SyncConfig::default()
        }
    }

    fn api(backend: &Arc<MockBackend>) -> Arc<dyn BackendApi> {
        Arc::clone(backend) as Arc<dyn BackendApi>
    }

    /// Yield until `cond` holds.
    async fn until(cond: impl Fn() -> bool) {
        tokio::time::timeout(WAIT, async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn ready<V: DashboardView>(dashboard: &Dashboard<V>) -> DashboardState<V> {
        dashboard
            .wait_for(|s| s.phase == Phase::Ready, WAIT)
            .await
            .expect("dashboard should become ready")
    }

    #[tokio::test]
    async fn mount_loads_records_and_summary() {
        let backend = MockBackend::with_donations(vec![
            donation("1", "p1", 40.0, DonationStatus::Completed),
            donation("2", "p2", 10.0, DonationStatus::Failed),
        ]);
        let bus = EventBus::new();
        let dashboard = Dashboard::mount(
            DonorView,
            api(&backend),
            &bus,
            SyncConfig::default(),
            Some(donor("donor-1")),
        )
        .unwrap();

        let state = ready(&dashboard).await;
        assert_eq!(state.records.len(), 2);
        assert_eq!(state.summary.total_donated, 40.0);
        assert_eq!(state.summary.success_rate, 50);
        assert_eq!(state.last_loaded_key.as_deref(), Some("donor-1"));
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn idle_without_identity() {
        let backend = MockBackend::new();
        let bus = EventBus::new();
        let dashboard =
            Dashboard::mount(DonorView, api(&backend), &bus, SyncConfig::default(), None)
                .unwrap();

        assert_eq!(dashboard.state().phase, Phase::Idle);
        assert!(matches!(dashboard.refresh().await, RefreshOutcome::Idle));
        assert_eq!(backend.calls("fetch_donations"), 0);
    }

    #[tokio::test]
    async fn back_to_back_requests_issue_one_fetch() {
        let backend = MockBackend::new();
        backend.hold_fetches();
        let bus = EventBus::new();
        let dashboard = Dashboard::mount(
            DonorView,
            api(&backend),
            &bus,
            config(CoalescePolicy::Drop),
            Some(donor("donor-1")),
        )
        .unwrap();

        assert!(!dashboard.request_refresh());
        assert!(!dashboard.request_refresh());
        backend.release(1);
        ready(&dashboard).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.calls("fetch_donations"), 1);
    }

    #[tokio::test]
    async fn follow_up_policy_runs_exactly_one_more_fetch() {
        let backend = MockBackend::new();
        backend.hold_fetches();
        let bus = EventBus::new();
        let dashboard = Dashboard::mount(
            DonorView,
            api(&backend),
            &bus,
            config(CoalescePolicy::FollowUp),
            Some(donor("donor-1")),
        )
        .unwrap();

        for _ in 0..3 {
            assert!(!dashboard.request_refresh());
        }
        backend.release(2);
        until(|| backend.calls("fetch_donations") == 2).await;
        ready(&dashboard).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.calls("fetch_donations"), 2);
    }

    #[tokio::test]
    async fn dispose_discards_in_flight_result() {
        let backend =
            MockBackend::with_donations(vec![donation("1", "p", 5.0, DonationStatus::Completed)]);
        backend.hold_fetches();
        let bus = EventBus::new();
        let dashboard = Dashboard::mount(
            DonorView,
            api(&backend),
            &bus,
            SyncConfig::default(),
            Some(donor("donor-1")),
        )
        .unwrap();
        until(|| backend.waiting() == 1).await;

        let before = dashboard.state();
        dashboard.dispose();
        backend.release(1);
        until(|| backend.waiting() == 0).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let after = dashboard.state();
        assert!(after.records.is_empty());
        assert_eq!(after.phase, before.phase);
        assert_eq!(after.last_loaded_key, None);
        assert!(!after.mounted);
        assert_eq!(bus.subscriber_count(crate::event::EventKind::DonationCreated), 0);
    }

    #[tokio::test]
    async fn result_for_previous_identity_is_stale() {
        let backend = MockBackend::with_donations(vec![
            donation("a1", "p", 5.0, DonationStatus::Completed),
        ]);
        let bus = EventBus::new();
        let dashboard = Dashboard::mount(
            DonorView,
            api(&backend),
            &bus,
            SyncConfig::default(),
            Some(donor("donor-1")),
        )
        .unwrap();
        ready(&dashboard).await;

        backend.hold_fetches();
        let pending = {
            let dashboard = dashboard.clone();
            tokio::spawn(async move { dashboard.refresh().await })
        };
        until(|| backend.waiting() == 1).await;

        dashboard.set_identity(Some(donor("donor-2"))).unwrap();
        let state = dashboard.state();
        assert_eq!(state.phase, Phase::Loading);
        assert!(state.records.is_empty(), "hard reset on identity change");
        until(|| backend.waiting() == 2).await;

        // The semaphore is FIFO: the first permit goes to the old fetch.
        backend.release(1);
        let outcome = pending.await.unwrap();
        assert!(matches!(outcome, RefreshOutcome::Stale));
        assert!(dashboard.state().records.is_empty());

        backend.release(1);
        let state = ready(&dashboard).await;
        assert_eq!(state.last_loaded_key.as_deref(), Some("donor-2"));
        assert!(state.records.is_empty(), "donor-2 has no donations");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_last_known_good() {
        let backend =
            MockBackend::with_donations(vec![donation("1", "p", 5.0, DonationStatus::Completed)]);
        let bus = EventBus::new();
        let dashboard = Dashboard::mount(
            DonorView,
            api(&backend),
            &bus,
            SyncConfig::default(),
            Some(donor("donor-1")),
        )
        .unwrap();
        ready(&dashboard).await;

        backend.fail_fetches(true);
        match dashboard.refresh().await {
            RefreshOutcome::Failed(error) => assert!(error.is_transient()),
            other => panic!("expected failure, got {other:?}"),
        }

        let state = dashboard.state();
        assert_eq!(state.records.len(), 1);
        assert_eq!(state.summary.total_donated, 5.0);
        assert!(state.error.is_some());
        assert_eq!(state.phase, Phase::Ready);

        backend.fail_fetches(false);
        assert!(matches!(dashboard.refresh().await, RefreshOutcome::Completed));
        assert!(dashboard.state().error.is_none());
    }

    #[tokio::test]
    async fn optimistic_view_patch_is_reconciled_by_refetch() {
        let backend = MockBackend::with_projects(vec![project("42", 0.0, 5, 0)]);
        let bus = EventBus::new();
        let dashboard = Dashboard::mount(
            StudentView,
            api(&backend),
            &bus,
            SyncConfig::default(),
            Some(Identity::new("student-1", Role::Student)),
        )
        .unwrap();
        ready(&dashboard).await;

        // Server counted two views meanwhile; the event reports one.
        backend.projects.lock().unwrap()[0].views_count = 7;
        backend.hold_fetches();
        bus.publish(DomainEvent::ProjectViewed {
            project_id: "42".into(),
        });

        let state = dashboard.state();
        assert_eq!(state.records[0].views_count, 6, "tentative +1");
        assert_eq!(state.summary.total_views, 6);
        assert!(state.is_tentative("42"));

        backend.release(1);
        let state = dashboard
            .wait_for(|s| s.phase == Phase::Ready && s.tentative.is_empty(), WAIT)
            .await
            .expect("reconciled");
        assert_eq!(state.records[0].views_count, 7, "server value wins");
        assert_eq!(state.summary.total_views, 7);
    }

    /// A fetch sent before an optimistic patch resolves after it. The patch
    /// is replayed on the older response and one more fetch reconciles it.
    async fn patch_outlives_older_fetch(policy: CoalescePolicy) {
        let backend = MockBackend::with_projects(vec![project("42", 0.0, 5, 0)]);
        let bus = EventBus::new();
        let dashboard = Dashboard::mount(
            StudentView,
            api(&backend),
            &bus,
            config(policy),
            Some(Identity::new("student-1", Role::Student)),
        )
        .unwrap();
        ready(&dashboard).await;

        backend.hold_fetches();
        assert!(dashboard.request_refresh());
        until(|| backend.waiting() == 1).await;

        backend.projects.lock().unwrap()[0].views_count = 6;
        bus.publish(DomainEvent::ProjectViewed {
            project_id: "42".into(),
        });
        assert_eq!(dashboard.state().records[0].views_count, 6);

        // The older response (views = 5) lands; the reconciling fetch waits.
        backend.release(1);
        until(|| backend.calls("fetch_projects") == 3 && backend.waiting() == 1).await;
        let state = dashboard.state();
        assert_eq!(state.records[0].views_count, 6, "patch replayed");
        assert_eq!(state.summary.total_views, 6);
        assert!(state.is_tentative("42"));
        assert_eq!(state.phase, Phase::Refreshing);

        backend.release(1);
        let state = dashboard
            .wait_for(|s| s.phase == Phase::Ready && s.tentative.is_empty(), WAIT)
            .await
            .expect("reconciled");
        assert_eq!(state.records[0].views_count, 6);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.calls("fetch_projects"), 3);
    }

    #[tokio::test]
    async fn patch_outlives_older_fetch_under_follow_up() {
        patch_outlives_older_fetch(CoalescePolicy::FollowUp).await;
    }

    #[tokio::test]
    async fn patch_outlives_older_fetch_under_drop() {
        patch_outlives_older_fetch(CoalescePolicy::Drop).await;
    }

    #[tokio::test]
    async fn authoritative_patch_does_not_refetch() {
        let backend = MockBackend::with_projects(vec![project("42", 0.0, 0, 10)]);
        let bus = EventBus::new();
        let dashboard = Dashboard::mount(
            ProjectDetailView::new("42"),
            api(&backend),
            &bus,
            SyncConfig::default(),
            Some(donor("donor-1")),
        )
        .unwrap();
        ready(&dashboard).await;
        let fetches = backend.calls("fetch_projects");

        bus.publish(DomainEvent::ProjectLiked {
            project_id: "42".into(),
            likes_count: 11,
        });
        let state = dashboard.state();
        assert_eq!(state.summary.likes, 11);
        assert!(state.tentative.is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.calls("fetch_projects"), fetches);
    }

    #[tokio::test]
    async fn irrelevant_events_are_ignored() {
        let backend = MockBackend::new();
        let bus = EventBus::new();
        let dashboard = Dashboard::mount(
            DonorView,
            api(&backend),
            &bus,
            SyncConfig::default(),
            Some(donor("donor-1")),
        )
        .unwrap();
        ready(&dashboard).await;

        bus.publish(DomainEvent::WalletUpdated {
            user_id: "someone-else".into(),
            balance: None,
        });
        bus.publish(DomainEvent::ProjectLiked {
            project_id: "p".into(),
            likes_count: 1,
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.calls("fetch_donations"), 1);
    }

    #[tokio::test]
    async fn operations_after_dispose() {
        let backend = MockBackend::new();
        let bus = EventBus::new();
        let dashboard =
            Dashboard::mount(DonorView, api(&backend), &bus, SyncConfig::default(), None)
                .unwrap();
        dashboard.dispose();
        dashboard.dispose();

        assert_eq!(
            dashboard.set_identity(Some(donor("donor-1"))),
            Err(DashboardError::Disposed("donor"))
        );
        assert!(matches!(
            dashboard.refresh().await,
            RefreshOutcome::Disposed
        ));
        assert!(!dashboard.request_refresh());
    }

    #[tokio::test]
    async fn mount_on_disposed_bus_fails() {
        let bus = EventBus::new();
        bus.dispose();
        let result = Dashboard::mount(
            DonorView,
            api(&MockBackend::new()),
            &bus,
            SyncConfig::default(),
            None,
        );
        assert!(matches!(result, Err(DashboardError::BusDisposed)));
    }

    #[tokio::test]
    async fn dropping_the_dashboard_releases_subscriptions() {
        let bus = EventBus::new();
        let dashboard = Dashboard::mount(
            StudentView,
            api(&MockBackend::new()),
            &bus,
            SyncConfig::default(),
            None,
        )
        .unwrap();
        assert_eq!(bus.subscriber_count(crate::event::EventKind::ProjectViewed), 1);
        drop(dashboard);
        assert_eq!(bus.subscriber_count(crate::event::EventKind::ProjectViewed), 0);
    }

    #[tokio::test]
    async fn changes_bump_on_state_updates() {
        let backend = MockBackend::new();
        let bus = EventBus::new();
        let dashboard =
            Dashboard::mount(DonorView, api(&backend), &bus, SyncConfig::default(), None)
                .unwrap();
        let mut changes = dashboard.changes();
        let start = *changes.borrow_and_update();

        dashboard.set_identity(Some(donor("donor-1"))).unwrap();
        ready(&dashboard).await;
        assert!(changes.has_changed().unwrap());
        assert!(*changes.borrow() > start);
    }

    #[test]
    fn mount_outside_runtime_fails() {
        let bus = EventBus::new();
        let result = Dashboard::mount(
            DonorView,
            api(&MockBackend::new()),
            &bus,
            SyncConfig::default(),
            None,
        );
        assert!(matches!(result, Err(DashboardError::NoRuntime)));
    }
}
