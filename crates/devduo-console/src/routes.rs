//! HTTP surface over the console controller.
//!
//! Single-operator demo wiring: the gateway owns one console and one identity
//! session, shared by every HTTP client. A sign-in from any client opens the
//! dashboard (and the record write routes) for all of them until sign-out.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use devduo_core::{
    ActivityLine, AllowlistIdentityProvider, Collection, ConsoleHandle, ConsoleStatus, DashboardStats, GateState,
    GateView, Identity, ListingPhase, ListingSnapshot, Record, Section, SledRecordStore,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// How long a request waits for the controller to settle after a change.
const SETTLE: Duration = Duration::from_secs(2);

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub struct AppState {
    pub console: ConsoleHandle,
    pub identity: Arc<AllowlistIdentityProvider>,
    pub store: Arc<SledRecordStore>,
    pub public_root: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/session",
            get(session_handler).post(sign_in_handler).delete(sign_out_handler),
        )
        .route("/api/v1/dashboard", get(dashboard_handler))
        .route("/api/v1/dashboard/refresh", post(refresh_handler))
        .route("/api/v1/sections/:section", get(section_handler))
        .route("/api/v1/records/:table", post(put_record_handler))
        .route("/api/v1/records/:table/:id", delete(delete_record_handler))
        .with_state(state)
        .layer(axum::middleware::from_fn(log_request))
}

async fn log_request(request: Request<Body>, next: Next) -> Response {
    tracing::debug!("[GATEWAY] {} {}", request.method(), request.uri().path());
    next.run(request).await
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    gate: GateState,
    view: GateView,
    email: Option<String>,
    is_admin: bool,
    /// Where the client should navigate, when the console is locked.
    redirect: Option<String>,
}

impl SessionResponse {
    fn from_status(status: &ConsoleStatus, public_root: &str) -> Self {
        Self {
            gate: status.gate,
            view: status.view,
            email: status.session.identity.as_ref().map(|i| i.email.clone()),
            is_admin: status.session.is_admin,
            redirect: (status.gate == GateState::Unauthorized)
                .then(|| public_root.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct SignInRequest {
    email: String,
    #[serde(default)]
    id: Option<String>,
}

async fn session_handler(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(SessionResponse::from_status(&state.console.status(), &state.public_root))
}

/// POST /api/v1/session: the identity collaborator opens a session for `email`.
async fn sign_in_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignInRequest>,
) -> ApiResult<SessionResponse> {
    let email = body.email.trim().to_string();
    if email.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "email is required".to_string()));
    }
    let id = body.id.unwrap_or_else(|| email.clone());
    state.identity.sign_in(Identity::new(id, email.clone()));

    let status = settled(&state.console, |s| {
        s.gate != GateState::Resolving
            && s.session.identity.as_ref().map(|i| i.email.as_str()) == Some(email.as_str())
    })
    .await;
    Ok(Json(SessionResponse::from_status(&status, &state.public_root)))
}

async fn sign_out_handler(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    state.identity.sign_out();
    let status = settled(&state.console, |s| s.gate == GateState::Unauthenticated).await;
    Json(SessionResponse::from_status(&status, &state.public_root))
}

#[derive(Debug, Serialize)]
struct DashboardResponse {
    stats: DashboardStats,
    recent_activity: Vec<ActivityLine>,
    loading: bool,
}

async fn dashboard_handler(State(state): State<Arc<AppState>>) -> ApiResult<DashboardResponse> {
    let status = settled(&state.console, |s| {
        s.gate != GateState::Authorized || s.dashboard.as_ref().map_or(false, |d| !d.loading)
    })
    .await;
    require_dashboard(&status)?;

    let now = Utc::now();
    let view = status.dashboard.unwrap_or_default();
    Ok(Json(DashboardResponse {
        stats: view.stats,
        recent_activity: view.recent_activity.iter().map(|e| e.line(now)).collect(),
        loading: view.loading,
    }))
}

async fn refresh_handler(State(state): State<Arc<AppState>>) -> Result<StatusCode, (StatusCode, String)> {
    require_dashboard(&state.console.status())?;
    state.console.refresh().await;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
struct SectionQuery {
    #[serde(default)]
    category: Option<String>,
}

async fn section_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<SectionQuery>,
) -> ApiResult<Option<ListingSnapshot>> {
    let section = Section::from_slug(&slug)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown section: {}", slug)))?;
    require_dashboard(&state.console.status())?;

    let mounted = state
        .console
        .select_section(section)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
    if !mounted {
        return Err((StatusCode::FORBIDDEN, "dashboard not mounted".to_string()));
    }
    let category = query.category.filter(|c| !c.trim().is_empty());
    if let Some(category) = &category {
        state.console.select_category(category.clone()).await;
    }

    let status = settled(&state.console, |s| match (&s.listing, section.collection()) {
        (None, None) => true,
        (Some(l), Some(c)) => {
            l.collection == c
                && l.phase == ListingPhase::Ready
                && category.as_ref().map_or(true, |wanted| &l.selected_category == wanted)
        }
        _ => false,
    })
    .await;
    Ok(Json(status.listing))
}

/// POST /api/v1/records/:table: server-side insert, mirrored to every live listing.
async fn put_record_handler(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Json(mut body): Json<Map<String, Value>>,
) -> ApiResult<Record> {
    let collection = collection_for(&table)?;
    require_resolved_dashboard(&state.console).await?;
    let now = Utc::now();
    body.entry("id")
        .or_insert_with(|| Value::String(format!("{}_{}", collection.table(), now.timestamp_millis())));
    body.entry("created_at")
        .or_insert_with(|| Value::String(now.to_rfc3339()));

    let record: Record = serde_json::from_value(Value::Object(body))
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    state
        .store
        .put(collection, &record)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    tracing::info!("[GATEWAY] Stored {} in {}", record.id, collection);
    Ok(Json(record))
}

async fn delete_record_handler(
    State(state): State<Arc<AppState>>,
    Path((table, id)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, String)> {
    let collection = collection_for(&table)?;
    require_resolved_dashboard(&state.console).await?;
    let existed = state
        .store
        .remove(collection, &id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(if existed { StatusCode::NO_CONTENT } else { StatusCode::NOT_FOUND })
}

fn collection_for(table: &str) -> Result<Collection, (StatusCode, String)> {
    Collection::from_table(table).ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown collection: {}", table)))
}

fn require_dashboard(status: &ConsoleStatus) -> Result<(), (StatusCode, String)> {
    match status.view {
        GateView::Dashboard => Ok(()),
        GateView::Pending => Err((StatusCode::SERVICE_UNAVAILABLE, "session still resolving".to_string())),
        GateView::UnlockPrompt => Err((StatusCode::UNAUTHORIZED, "please authenticate".to_string())),
        GateView::Locked => Err((StatusCode::FORBIDDEN, "no admin access".to_string())),
    }
}

async fn require_resolved_dashboard(console: &ConsoleHandle) -> Result<(), (StatusCode, String)> {
    let status = settled(console, |s| s.gate != GateState::Resolving).await;
    require_dashboard(&status)
}

/// Waits until the console status satisfies `pred`, or returns the latest
/// status once the settle window elapses.
async fn settled<F>(console: &ConsoleHandle, pred: F) -> ConsoleStatus
where
    F: FnMut(&ConsoleStatus) -> bool,
{
    let mut rx = console.subscribe();
    let status = match tokio::time::timeout(SETTLE, rx.wait_for(pred)).await {
        Ok(Ok(status)) => (*status).clone(),
        _ => console.status(),
    };
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use devduo_core::{Console, DashboardOptions, IdentityProvider, RecordStore};
    use tower::ServiceExt;

    const ADMIN: &str = "ops@devduo.dev";

    struct Harness {
        app: Router,
        store: Arc<SledRecordStore>,
        _console: Console,
    }

    fn harness() -> Harness {
        let store = Arc::new(SledRecordStore::temporary().unwrap());
        let identity = Arc::new(AllowlistIdentityProvider::new([ADMIN]));
        let identity_dyn: Arc<dyn IdentityProvider> = identity.clone();
        let store_dyn: Arc<dyn RecordStore> = store.clone();
        let console = Console::start(identity_dyn, store_dyn, DashboardOptions::default(), "/");
        let state = Arc::new(AppState {
            console: console.handle(),
            identity,
            store: Arc::clone(&store),
            public_root: "/".to_string(),
        });
        Harness {
            app: router(state),
            store,
            _console: console,
        }
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let h = harness();
        let (status, _) = call(&h.app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn dashboard_requires_admin_session() {
        let h = harness();
        let (status, _) = call(&h.app, "GET", "/api/v1/dashboard", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, session) = call(
            &h.app,
            "POST",
            "/api/v1/session",
            Some(serde_json::json!({ "email": "guest@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["view"], "locked");
        assert_eq!(session["redirect"], "/");

        let (status, _) = call(&h.app, "GET", "/api/v1/dashboard", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_sees_counts_and_live_listing() {
        let h = harness();
        h.store
            .put(
                Collection::Projects,
                &Record::new("p1")
                    .with_field("title", "Atlas")
                    .with_category("AI/ML")
                    .created(Utc::now()),
            )
            .unwrap();

        let (_, session) = call(
            &h.app,
            "POST",
            "/api/v1/session",
            Some(serde_json::json!({ "email": ADMIN })),
        )
        .await;
        assert_eq!(session["view"], "dashboard");

        let (status, dashboard) = call(&h.app, "GET", "/api/v1/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["stats"]["total_projects"], 1);
        assert_eq!(dashboard["recent_activity"][0]["action"], "Project \"Atlas\" was added");
        assert_eq!(dashboard["recent_activity"][0]["time"], "Just now");

        let (status, _) = call(
            &h.app,
            "POST",
            "/api/v1/records/projects",
            Some(serde_json::json!({ "id": "p2", "title": "Beacon" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, listing) = call(&h.app, "GET", "/api/v1/sections/projects?category=other", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing["selected_category"], "other");
        assert_eq!(listing["records"][0]["id"], "p2");
        assert_eq!(listing["total"], 2);

        let (status, _) = call(&h.app, "GET", "/api/v1/sections/users", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, session) = call(&h.app, "DELETE", "/api/v1/session", None).await;
        assert_eq!(session["view"], "unlock_prompt");
    }

    #[tokio::test]
    async fn record_writes_require_admin_session() {
        let h = harness();
        h.store
            .put(Collection::Messages, &Record::new("m1").with_field("name", "Sam"))
            .unwrap();
        let new_project = serde_json::json!({ "id": "p1", "title": "Atlas" });

        let (status, _) = call(&h.app, "POST", "/api/v1/records/projects", Some(new_project.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&h.app, "DELETE", "/api/v1/records/contact_messages/m1", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        call(
            &h.app,
            "POST",
            "/api/v1/session",
            Some(serde_json::json!({ "email": "guest@example.com" })),
        )
        .await;
        let (status, _) = call(&h.app, "POST", "/api/v1/records/projects", Some(new_project)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&h.app, "DELETE", "/api/v1/records/contact_messages/m1", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        assert_eq!(h.store.count(Collection::Projects, None).await.unwrap(), 0);
        assert_eq!(h.store.count(Collection::Messages, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn one_session_is_shared_by_every_client() {
        let h = harness();
        let operator = h.app.clone();
        let other_client = h.app.clone();

        call(&operator, "POST", "/api/v1/session", Some(serde_json::json!({ "email": ADMIN }))).await;
        let (status, session) = call(&other_client, "GET", "/api/v1/session", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["email"], ADMIN);
        assert_eq!(session["view"], "dashboard");

        call(&other_client, "DELETE", "/api/v1/session", None).await;
        let (status, _) = call(&operator, "GET", "/api/v1/dashboard", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
