//! HTTP API Server for the web UI
//!
//! Provides REST endpoints for browsing the catalog, running searches and
//! managing saved results.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::marketplace::{MarketplaceChecker, TonApiClient};
use crate::nft::NftDetails;
use crate::service::{
    CatalogView, DeleteOutcome, DeleteTarget, SearchRequest, SearchResponse, StatsReport,
    SynergyService, UserResults,
};
use crate::synergy::{BuildReport, SynergyMapStats};

/// Username the web UI saves results under
pub const WEB_USERNAME: &str = "web_user";

/// Shared application state
pub struct AppState<C = TonApiClient> {
    pub service: SynergyService<C>,
}

/// Successful response body
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Query params identifying a web user
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
    #[serde(default = "default_username")]
    pub username: String,
}

/// Query params for result endpoints
#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    #[serde(default = "default_username")]
    pub username: String,
}

fn default_username() -> String {
    WEB_USERNAME.to_string()
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Build the router with all routes and layers
pub fn router<C>(state: Arc<AppState<C>>, config: &ApiConfig) -> Router
where
    C: MarketplaceChecker + 'static,
{
    let app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Search
        .route("/api/sort/data", get(get_sort_data::<C>))
        .route("/api/sort/execute", post(execute_sort::<C>))
        .route("/api/sort/results/:user_id", get(get_results::<C>))
        .route(
            "/api/sort/results/:user_id/:kind",
            delete(delete_results::<C>),
        )
        // Collection
        .route("/api/sort/stats", get(get_stats::<C>))
        .route("/api/sort/nft/:key", get(get_nft::<C>))
        // Synergy map
        .route("/api/synergy/rebuild", post(rebuild_synergy_map::<C>))
        .route("/api/synergy/stats", get(get_synergy_stats::<C>))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout))
        .with_state(state);

    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app.layer(cors)
    } else {
        app
    }
}

/// Start the API server
pub async fn start_server<C>(state: Arc<AppState<C>>, config: ApiConfig) -> anyhow::Result<()>
where
    C: MarketplaceChecker + 'static,
{
    let app = router(state, &config);

    let addr = format!("{}:{}", config.host, config.port);
    info!("🚀 Starting synergy API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Catalog lists for the search form
async fn get_sort_data<C: MarketplaceChecker + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApiResponse<CatalogView>>> {
    let view = state.service.catalog(query.user_id.as_deref()).await?;
    Ok(ApiResponse::ok(view))
}

/// Run a search; the level must be 2 or 3
async fn execute_sort<C: MarketplaceChecker + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Json(mut request): Json<SearchRequest>,
) -> Result<Json<ApiResponse<SearchResponse>>> {
    if request.username.is_none() {
        request.username = Some(WEB_USERNAME.to_string());
    }
    let response = state.service.execute_search(request).await?;
    Ok(ApiResponse::ok(response))
}

async fn get_results<C: MarketplaceChecker + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path(user_id): Path<String>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<ApiResponse<UserResults>>> {
    let results = state
        .service
        .load_results(&user_id, Some(query.username))
        .await?;

    if results.is_empty() {
        return Err(Error::not_found("results", user_id));
    }
    Ok(ApiResponse::ok(results))
}

async fn delete_results<C: MarketplaceChecker + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path((user_id, kind)): Path<(String, String)>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<ApiResponse<DeleteOutcome>>> {
    let target = DeleteTarget::parse(&kind)?;
    let outcome = state
        .service
        .delete_results(&user_id, Some(query.username), target)
        .await?;

    if !outcome.any_deleted() {
        return Err(Error::not_found("results", user_id));
    }
    Ok(ApiResponse::ok(outcome))
}

async fn get_stats<C: MarketplaceChecker + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Result<Json<ApiResponse<StatsReport>>> {
    let stats = state.service.collection_stats().await?;
    Ok(ApiResponse::ok(stats))
}

/// NFT by index or (partial) address
async fn get_nft<C: MarketplaceChecker + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<NftDetails>>> {
    let details = state.service.nft_details(&key).await?;
    Ok(ApiResponse::ok(details))
}

async fn rebuild_synergy_map<C: MarketplaceChecker + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Result<Json<ApiResponse<BuildReport>>> {
    let report = state.service.build_synergy_map().await?;
    Ok(ApiResponse::ok(report))
}

async fn get_synergy_stats<C: MarketplaceChecker + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Result<Json<ApiResponse<SynergyMapStats>>> {
    let stats = state.service.synergy_stats().await?;
    Ok(ApiResponse::ok(stats))
}
