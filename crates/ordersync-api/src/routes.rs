use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Duration, Utc};
use ordersync_core::db::{LibSqlOrderGateway, OrderGateway};
use ordersync_core::models::{ResolutionStats, SyncRequest, TimeWindow};
use ordersync_core::sync::{SyncCoordinator, SyncMetricsSnapshot, SyncReport};
use ordersync_core::{ConflictResolution, Order};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::scope::RequestScope;

const DEFAULT_RESOLUTION_LIMIT: usize = 50;
const MAX_RESOLUTION_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    coordinator: SyncCoordinator<LibSqlOrderGateway>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, gateway: LibSqlOrderGateway) -> Self {
        Self {
            coordinator: SyncCoordinator::new(Arc::new(gateway), config.sync),
            config,
        }
    }

    pub async fn open(config: Arc<AppConfig>) -> ordersync_core::Result<Self> {
        let gateway = LibSqlOrderGateway::open(&config.db_path).await?;
        Ok(Self::new(config, gateway))
    }

    fn gateway(&self) -> &LibSqlOrderGateway {
        self.coordinator.gateway()
    }
}

pub fn app_router(state: AppState) -> Router {
    let scoped_routes = Router::new()
        .route("/sync/orders", post(sync_orders))
        .route("/orders/{client_generated_id}", get(get_order))
        .route(
            "/orders/{client_generated_id}/resolutions",
            get(list_order_resolutions),
        )
        .route("/resolutions/stats", get(resolution_stats))
        .route_layer(middleware::from_fn(require_scope));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", scoped_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    sync: SyncMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        sync: state.coordinator.metrics_snapshot(),
    })
}

async fn require_scope(mut request: Request, next: Next) -> Result<Response, AppError> {
    let scope = RequestScope::from_headers(request.headers())?;
    request.extensions_mut().insert(scope);
    Ok(next.run(request).await)
}

async fn sync_orders(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncReport>, AppError> {
    let report = state.coordinator.sync_batch(&scope.0, request).await?;
    Ok(Json(report))
}

async fn find_scoped_order(
    state: &AppState,
    scope: &RequestScope,
    client_generated_id: &str,
) -> Result<Order, AppError> {
    state
        .gateway()
        .find_by_client_generated_id(scope.business_id(), client_generated_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("order {client_generated_id}")))
}

async fn get_order(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Path(client_generated_id): Path<String>,
) -> Result<Json<Order>, AppError> {
    find_scoped_order(&state, &scope, &client_generated_id)
        .await
        .map(Json)
}

#[derive(Debug, Default, Deserialize)]
struct ResolutionsQuery {
    limit: Option<usize>,
}

async fn list_order_resolutions(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Path(client_generated_id): Path<String>,
    Query(query): Query<ResolutionsQuery>,
) -> Result<Json<Vec<ConflictResolution>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_RESOLUTION_LIMIT);
    if limit == 0 || limit > MAX_RESOLUTION_LIMIT {
        return Err(AppError::bad_request(format!(
            "limit must be between 1 and {MAX_RESOLUTION_LIMIT}"
        )));
    }

    let order = find_scoped_order(&state, &scope, &client_generated_id).await?;
    let resolutions = state.gateway().list_resolutions(&order.id, limit).await?;
    Ok(Json(resolutions))
}

#[derive(Debug, Default, Deserialize)]
struct StatsQuery {
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

impl StatsQuery {
    fn window(&self) -> Result<TimeWindow, AppError> {
        match (self.since, self.until) {
            (None, None) => Ok(TimeWindow::trailing(Duration::hours(24))),
            (since, until) => {
                let until = until.unwrap_or_else(Utc::now);
                let since = since.unwrap_or(until - Duration::hours(24));
                Ok(TimeWindow::new(since, until)?)
            }
        }
    }
}

async fn resolution_stats(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<ResolutionStats>, AppError> {
    let window = query.window()?;
    let stats = state
        .gateway()
        .resolution_stats(scope.business_id(), window)
        .await?;
    tracing::debug!(
        business = scope.business_id(),
        total = stats.total(),
        "Served resolution stats"
    );
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use ordersync_core::sync::{SyncConfig, SyncScope};
    use ordersync_core::ResolutionAction;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;

    async fn state() -> AppState {
        let config = Arc::new(AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: PathBuf::from(":memory:"),
            sync: SyncConfig::default(),
        });
        AppState::new(config, LibSqlOrderGateway::open_in_memory().await.unwrap())
    }

    fn scope(business: &str) -> Extension<RequestScope> {
        Extension(RequestScope(SyncScope::new(business, "maria@bakery").unwrap()))
    }

    fn item(client_id: &str, total: f64, last_modified_at: &str) -> Value {
        json!({
            "client_generated_id": client_id,
            "client_name": "Ana Souza",
            "total": total,
            "delivery_date": "2024-06-03",
            "status": "pending",
            "last_modified_at": last_modified_at,
            "items": [{ "product_name": "Chocolate cake", "quantity": 1, "unit_price": total }]
        })
    }

    async fn sync(state: &AppState, business: &str, items: Vec<Value>) -> SyncReport {
        sync_orders(
            State(state.clone()),
            scope(business),
            Json(SyncRequest::new(items)),
        )
        .await
        .unwrap()
        .0
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_then_read_back_order_and_audit() {
        let state = state().await;
        sync(&state, "bakery-1", vec![item("abc", 120.0, "2024-06-01T12:00:05Z")]).await;
        let report = sync(&state, "bakery-1", vec![item("abc", 150.0, "2024-06-01T12:00:10Z")]).await;
        assert_eq!(report.message, "1 orders synced, 0 errors, 1 conflicts resolved");

        let order = get_order(State(state.clone()), scope("bakery-1"), Path("abc".to_string()))
            .await
            .unwrap()
            .0;
        assert!((order.version.total - 150.0).abs() < f64::EPSILON);

        let resolutions = list_order_resolutions(
            State(state.clone()),
            scope("bakery-1"),
            Path("abc".to_string()),
            Query(ResolutionsQuery::default()),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(resolutions.len(), 1);
        assert_eq!(resolutions[0].entry.resolution_action, ResolutionAction::LocalWins);

        let health = healthz(State(state)).await.0;
        assert_eq!(health.sync.batches, 2);
        assert_eq!(health.sync.conflicts, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn orders_are_scoped_to_their_business() {
        let state = state().await;
        sync(&state, "bakery-1", vec![item("abc", 120.0, "2024-06-01T12:00:05Z")]).await;

        let err = get_order(State(state), scope("bakery-2"), Path("abc".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_batch_is_a_bad_request() {
        let state = state().await;
        let err = sync_orders(State(state), scope("bakery-1"), Json(SyncRequest::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stats_cover_requested_window() {
        let state = state().await;
        sync(&state, "bakery-1", vec![item("abc", 150.0, "2024-06-01T12:00:10Z")]).await;
        sync(&state, "bakery-1", vec![item("abc", 120.0, "2024-06-01T12:00:05Z")]).await;

        let stats = resolution_stats(
            State(state),
            scope("bakery-1"),
            Query(StatsQuery::default()),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(stats.server_wins, 1);
        assert_eq!(stats.total(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_invalid_queries() {
        let state = state().await;
        let inverted = StatsQuery {
            since: Some(Utc::now()),
            until: Some(Utc::now() - Duration::hours(1)),
        };
        let err = resolution_stats(State(state.clone()), scope("bakery-1"), Query(inverted))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = list_order_resolutions(
            State(state),
            scope("bakery-1"),
            Path("abc".to_string()),
            Query(ResolutionsQuery { limit: Some(0) }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
