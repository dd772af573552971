//! Admin dashboard mount.
//!
//! One `Dashboard` exists per authorized mount. Mounting runs the stats and
//! activity cycle once; selecting a listing section mounts a [`LiveListing`]
//! for that collection and tears down the previous one. Unmounting aborts the
//! cycle so nothing writes to the view afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::activity::{ActivityEvent, ActivityMerger};
use crate::error::ConsoleResult;
use crate::listing::{ListingState, LiveListing, DEFAULT_TRANSITION};
use crate::record::Collection;
use crate::stats::{DashboardStats, StatAggregator};
use crate::store::RecordStore;

/// Console navigation sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    Dashboard,
    Projects,
    Testimonials,
    ContactMessages,
}

impl Section {
    /// Collection listed by this section; the overview lists none.
    pub fn collection(&self) -> Option<Collection> {
        match self {
            Section::Dashboard => None,
            Section::Projects => Some(Collection::Projects),
            Section::Testimonials => Some(Collection::Testimonials),
            Section::ContactMessages => Some(Collection::Messages),
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "dashboard" => Some(Section::Dashboard),
            "projects" => Some(Section::Projects),
            "testimonials" => Some(Section::Testimonials),
            "contact-messages" => Some(Section::ContactMessages),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardOptions {
    pub activity_per_source: usize,
    pub activity_total: usize,
    pub filter_transition: Duration,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            activity_per_source: 2,
            activity_total: 4,
            filter_transition: DEFAULT_TRANSITION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub stats: DashboardStats,
    pub recent_activity: Vec<ActivityEvent>,
    pub loading: bool,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Default for DashboardView {
    fn default() -> Self {
        Self {
            stats: DashboardStats::default(),
            recent_activity: Vec::new(),
            loading: true,
            refreshed_at: None,
        }
    }
}

pub struct Dashboard {
    store: Arc<dyn RecordStore>,
    options: DashboardOptions,
    view: Arc<watch::Sender<DashboardView>>,
    unmounted: Arc<AtomicBool>,
    cycle: Option<JoinHandle<()>>,
    section: Section,
    listing: Option<LiveListing>,
}

impl Dashboard {
    /// Mounts the dashboard and starts its first refresh cycle. Must be called
    /// inside a tokio runtime.
    pub fn mount(store: Arc<dyn RecordStore>, options: DashboardOptions) -> Self {
        let (view, _) = watch::channel(DashboardView::default());
        let mut dashboard = Self {
            store,
            options,
            view: Arc::new(view),
            unmounted: Arc::new(AtomicBool::new(false)),
            cycle: None,
            section: Section::Dashboard,
            listing: None,
        };
        tracing::info!("[DASHBOARD] Mounted");
        dashboard.refresh();
        dashboard
    }

    /// Starts a new stats + activity cycle, abandoning one still in flight.
    pub fn refresh(&mut self) {
        if let Some(previous) = self.cycle.take() {
            previous.abort();
        }
        let stats = StatAggregator::new(Arc::clone(&self.store));
        let activity = ActivityMerger::new(Arc::clone(&self.store));
        let view = Arc::clone(&self.view);
        let unmounted = Arc::clone(&self.unmounted);
        let options = self.options;

        self.cycle = Some(tokio::spawn(async move {
            view.send_modify(|v| v.loading = true);
            let (stats, recent) = tokio::join!(
                stats.compute(),
                activity.compute_recent_activity(options.activity_per_source, options.activity_total),
            );
            view.send_if_modified(|v| {
                if unmounted.load(Ordering::SeqCst) {
                    return false;
                }
                v.stats = stats;
                v.recent_activity = recent;
                v.loading = false;
                v.refreshed_at = Some(Utc::now());
                true
            });
            tracing::debug!("[DASHBOARD] Cycle complete: {:?}", stats);
        }));
    }

    pub fn view(&self) -> DashboardView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardView> {
        self.view.subscribe()
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn listing(&self) -> Option<&LiveListing> {
        self.listing.as_ref()
    }

    pub fn listing_updates(&self) -> Option<watch::Receiver<ListingState>> {
        self.listing.as_ref().map(LiveListing::subscribe)
    }

    /// Switches section. The previous section's listing is torn down before the
    /// next one subscribes.
    pub async fn select_section(&mut self, section: Section) -> ConsoleResult<()> {
        if section == self.section && (self.listing.is_some() || section.collection().is_none()) {
            return Ok(());
        }
        if let Some(previous) = self.listing.take() {
            previous.teardown();
        }
        self.section = section;
        tracing::info!("[DASHBOARD] Section -> {:?}", section);

        if let Some(collection) = section.collection() {
            let listing = LiveListing::mount(
                Arc::clone(&self.store),
                collection,
                self.options.filter_transition,
            )
            .await?;
            self.listing = Some(listing);
        }
        Ok(())
    }

    pub fn unmount(self) {}
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.unmounted.store(true, Ordering::SeqCst);
        if let Some(cycle) = self.cycle.take() {
            cycle.abort();
        }
        if let Some(listing) = self.listing.take() {
            listing.teardown();
        }
        tracing::info!("[DASHBOARD] Unmounted");
    }
}
