//! Console controller.
//!
//! Runs as a single task that owns the [`ViewGate`] and the mounted
//! [`Dashboard`]. Resolver updates drive the gate; entering `Authorized`
//! mounts the dashboard and leaving it unmounts it. Callers interact through a
//! [`ConsoleHandle`]: commands go in over a channel, a [`ConsoleStatus`]
//! snapshot comes out over a watch channel, and gate transitions (including
//! redirects) are broadcast as [`ConsoleEvent`]s.
//!
//! ```text
//!   IdentityProvider ──▶ SessionResolver ──▶ ViewGate ──▶ Dashboard ──▶ LiveListing
//!                                               │
//!                                               └──▶ ConsoleEvent::Redirect
//! ```

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::dashboard::{Dashboard, DashboardOptions, DashboardView, Section};
use crate::error::ConsoleResult;
use crate::gate::{GateState, GateTransition, GateView, ViewGate};
use crate::identity::IdentityProvider;
use crate::listing::{ListingPhase, ListingState};
use crate::record::{Collection, Record};
use crate::session::{Resolution, Session, SessionResolver};
use crate::store::RecordStore;

/// Flattened listing state for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingSnapshot {
    pub collection: Collection,
    pub phase: ListingPhase,
    pub selected_category: String,
    pub is_transitioning: bool,
    pub categories: Vec<String>,
    pub records: Vec<Record>,
    pub total: usize,
    pub last_error: Option<String>,
}

impl ListingSnapshot {
    fn capture(collection: Collection, state: &ListingState) -> Self {
        Self {
            collection,
            phase: state.phase,
            selected_category: state.selected_category.clone(),
            is_transitioning: state.is_transitioning,
            categories: state.categories(),
            records: state.visible().into_iter().cloned().collect(),
            total: state.records.len(),
            last_error: state.last_error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleStatus {
    pub gate: GateState,
    pub view: GateView,
    pub session: Session,
    pub section: Section,
    /// Present only while authorized.
    pub dashboard: Option<DashboardView>,
    pub listing: Option<ListingSnapshot>,
}

impl Default for ConsoleStatus {
    fn default() -> Self {
        Self {
            gate: GateState::Resolving,
            view: GateView::Pending,
            session: Session::anonymous(),
            section: Section::Dashboard,
            dashboard: None,
            listing: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    Gate(GateTransition),
    /// Navigate away from the console. Emitted once per entry into Unauthorized.
    Redirect(String),
}

enum Command {
    SelectSection(Section, oneshot::Sender<ConsoleResult<bool>>),
    SelectCategory(String, oneshot::Sender<bool>),
    Refresh(oneshot::Sender<bool>),
}

/// Cloneable handle to a running console.
#[derive(Clone)]
pub struct ConsoleHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConsoleStatus>,
    events: broadcast::Sender<ConsoleEvent>,
}

impl ConsoleHandle {
    pub fn status(&self) -> ConsoleStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsoleStatus> {
        self.status.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }

    /// Switches dashboard section. `Ok(false)` when no dashboard is mounted.
    pub async fn select_section(&self, section: Section) -> ConsoleResult<bool> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::SelectSection(section, tx)).await.is_err() {
            return Ok(false);
        }
        rx.await.unwrap_or(Ok(false))
    }

    /// Applies a category filter to the mounted listing, if any.
    pub async fn select_category(&self, category: impl Into<String>) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::SelectCategory(category.into(), tx))
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn refresh(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Refresh(tx)).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

/// Running console. Dropping it stops the controller task, which unmounts the
/// dashboard and releases every subscription.
pub struct Console {
    handle: ConsoleHandle,
    task: JoinHandle<()>,
}

impl Console {
    /// Starts the console. Must be called inside a tokio runtime.
    pub fn start(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RecordStore>,
        options: DashboardOptions,
        public_root: impl Into<String>,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(32);
        let (status_tx, status) = watch::channel(ConsoleStatus::default());
        let (events, _) = broadcast::channel(64);

        let controller = Controller {
            resolver: SessionResolver::start(identity),
            gate: ViewGate::new(public_root),
            store,
            options,
            dashboard: None,
            session: Session::anonymous(),
            status: status_tx,
            events: events.clone(),
        };
        let task = tokio::spawn(controller.run(command_rx));
        tracing::info!("[CONSOLE] Started");

        Self {
            handle: ConsoleHandle {
                commands,
                status,
                events,
            },
            task,
        }
    }

    pub fn handle(&self) -> ConsoleHandle {
        self.handle.clone()
    }

    pub fn shutdown(self) {}
}

impl Drop for Console {
    fn drop(&mut self) {
        self.task.abort();
        tracing::info!("[CONSOLE] Stopped");
    }
}

struct Controller {
    resolver: SessionResolver,
    gate: ViewGate,
    store: Arc<dyn RecordStore>,
    options: DashboardOptions,
    dashboard: Option<Dashboard>,
    /// Last resolved session; kept while a newer resolution is pending so it
    /// always matches the gate's held state.
    session: Session,
    status: watch::Sender<ConsoleStatus>,
    events: broadcast::Sender<ConsoleEvent>,
}

impl Controller {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut resolution = self.resolver.subscribe();
        let mut dashboard_rx: Option<watch::Receiver<DashboardView>> = None;
        let mut listing_rx: Option<watch::Receiver<ListingState>> = None;

        let initial = resolution.borrow_and_update().clone();
        self.on_resolution(&initial, &mut dashboard_rx, &mut listing_rx);

        loop {
            tokio::select! {
                changed = resolution.changed() => {
                    if changed.is_err() {
                        tracing::warn!("[CONSOLE] Session resolver stopped");
                        break;
                    }
                    let current = resolution.borrow_and_update().clone();
                    self.on_resolution(&current, &mut dashboard_rx, &mut listing_rx);
                }
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.on_command(command, &mut listing_rx).await;
                }
                alive = changed_or_pending(&mut dashboard_rx) => {
                    if !alive {
                        dashboard_rx = None;
                    }
                }
                alive = changed_or_pending(&mut listing_rx) => {
                    if !alive {
                        listing_rx = None;
                    }
                }
            }
            self.publish();
        }
    }

    fn on_resolution(
        &mut self,
        resolution: &Resolution,
        dashboard_rx: &mut Option<watch::Receiver<DashboardView>>,
        listing_rx: &mut Option<watch::Receiver<ListingState>>,
    ) {
        if let Some(session) = resolution.session() {
            self.session = session.clone();
        }
        let Some(transition) = self.gate.evaluate(resolution) else {
            self.publish();
            return;
        };

        if transition.from == GateState::Authorized {
            *listing_rx = None;
            *dashboard_rx = None;
            if let Some(dashboard) = self.dashboard.take() {
                dashboard.unmount();
            }
        }
        if transition.to == GateState::Authorized {
            let dashboard = Dashboard::mount(Arc::clone(&self.store), self.options);
            *dashboard_rx = Some(dashboard.subscribe());
            self.dashboard = Some(dashboard);
        }

        let redirect = transition.redirect.clone();
        let _ = self.events.send(ConsoleEvent::Gate(transition));
        if let Some(target) = redirect {
            tracing::info!("[CONSOLE] Redirecting to {}", target);
            let _ = self.events.send(ConsoleEvent::Redirect(target));
        }
        self.publish();
    }

    async fn on_command(
        &mut self,
        command: Command,
        listing_rx: &mut Option<watch::Receiver<ListingState>>,
    ) {
        match command {
            Command::SelectSection(section, reply) => {
                let result = match self.dashboard.as_mut() {
                    Some(dashboard) => dashboard.select_section(section).await.map(|_| true),
                    None => Ok(false),
                };
                *listing_rx = self.dashboard.as_ref().and_then(Dashboard::listing_updates);
                let _ = reply.send(result);
            }
            Command::SelectCategory(category, reply) => {
                let listing = self.dashboard.as_ref().and_then(Dashboard::listing);
                let applied = match listing {
                    Some(listing) => {
                        listing.select_category(category);
                        true
                    }
                    None => false,
                };
                let _ = reply.send(applied);
            }
            Command::Refresh(reply) => {
                let applied = match self.dashboard.as_mut() {
                    Some(dashboard) => {
                        dashboard.refresh();
                        true
                    }
                    None => false,
                };
                let _ = reply.send(applied);
            }
        }
    }

    fn publish(&self) {
        let status = ConsoleStatus {
            gate: self.gate.state(),
            view: self.gate.view(),
            session: self.session.clone(),
            section: self
                .dashboard
                .as_ref()
                .map(Dashboard::section)
                .unwrap_or(Section::Dashboard),
            dashboard: self.dashboard.as_ref().map(Dashboard::view),
            listing: self.dashboard.as_ref().and_then(|d| {
                d.listing()
                    .map(|l| ListingSnapshot::capture(l.collection(), &l.snapshot()))
            }),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

async fn changed_or_pending<T>(rx: &mut Option<watch::Receiver<T>>) -> bool {
    match rx {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}
