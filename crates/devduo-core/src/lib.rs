//! DevDuo console core.
//!
//! Access-gated operator dashboard: session resolution, the view gate, the
//! aggregated counters and activity feed, and live collection listings kept
//! current by change notifications.

pub mod activity;
pub mod config;
pub mod console;
pub mod dashboard;
pub mod error;
pub mod gate;
pub mod identity;
pub mod listing;
pub mod record;
pub mod session;
pub mod sled_store;
pub mod stats;
pub mod store;

pub use activity::{merge_events, relative_time_label, ActivityEvent, ActivityKind, ActivityLine, ActivityMerger};
pub use config::ConsoleConfig;
pub use console::{Console, ConsoleEvent, ConsoleHandle, ConsoleStatus, ListingSnapshot};
pub use dashboard::{Dashboard, DashboardOptions, DashboardView, Section};
pub use error::{ConsoleError, ConsoleResult};
pub use gate::{GateState, GateTransition, GateView, ViewGate};
pub use identity::{AllowlistIdentityProvider, AuthState, Identity, IdentityProvider};
pub use listing::{ListingPhase, ListingState, LiveListing, ALL_CATEGORIES, FALLBACK_CATEGORIES};
pub use record::{ChangeEvent, ChangeKind, Collection, FieldFilter, Record, RecordQuery, SortOrder, SENTINEL_CATEGORY};
pub use session::{Resolution, Session, SessionResolver};
pub use sled_store::SledRecordStore;
pub use stats::{DashboardStats, StatAggregator};
pub use store::{RecordStore, Subscription, SubscriptionHandle};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
