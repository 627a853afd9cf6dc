//! HTTP server for the relay API.
//!
//! Routes live under `/api`. Relay and status routes require the
//! `x-relayer-key` header when an API key is configured; health is open.

use crate::apis;
use axum::{
	body::Bytes,
	extract::{DefaultBodyLimit, Path, Request, State},
	http::{HeaderValue, Method, StatusCode},
	middleware::{self, Next},
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use relay_config::ApiConfig;
use relay_core::RelayExecutor;
use relay_types::{APIError, HealthResponse, RelayStatusResponse, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-relayer-key";

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub executor: Arc<RelayExecutor>,
	pub api_key: Option<SecretString>,
	/// Upper bound on one relay request.
	pub relay_timeout: Duration,
}

/// Builds the router for `api_config`.
pub fn router(executor: Arc<RelayExecutor>, api_config: &ApiConfig) -> Router {
	let state = AppState {
		executor,
		api_key: api_config.api_key.clone().filter(|k| !k.is_empty()),
		relay_timeout: Duration::from_secs(api_config.timeout_seconds),
	};

	let protected = Router::new()
		.route("/relay", post(handle_relay))
		.route("/relay/{id}", get(handle_get_status))
		.route_layer(middleware::from_fn_with_state(
			state.clone(),
			require_api_key,
		));

	Router::new()
		.nest(
			"/api",
			protected.route("/health", get(handle_health)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(cors_layer(api_config))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state)
}

fn cors_layer(api_config: &ApiConfig) -> CorsLayer {
	let Some(cors) = &api_config.cors else {
		return CorsLayer::permissive();
	};
	let origins: Vec<HeaderValue> = cors
		.allowed_origins
		.iter()
		.filter_map(|origin| match origin.parse() {
			Ok(value) => Some(value),
			Err(_) => {
				tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
				None
			},
		})
		.collect();
	CorsLayer::new()
		.allow_origin(origins)
		.allow_methods([Method::GET, Method::POST])
		.allow_headers([
			axum::http::header::CONTENT_TYPE,
			axum::http::HeaderName::from_static(API_KEY_HEADER),
		])
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	executor: Arc<RelayExecutor>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(executor, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;
	tracing::info!("Relay API server starting on {}", bind_address);

	axum::serve(listener, app).await?;
	Ok(())
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
	if let Some(expected) = &state.api_key {
		let provided = request
			.headers()
			.get(API_KEY_HEADER)
			.and_then(|v| v.to_str().ok());
		if provided != Some(expected.expose_secret()) {
			return APIError::Unauthorized {
				message: format!("missing or invalid {} header", API_KEY_HEADER),
			}
			.into_response();
		}
	}
	next.run(request).await
}

/// Handles POST /api/relay requests.
async fn handle_relay(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
	let (status, response) =
		apis::relay::process_relay_request(&body, &state.executor, state.relay_timeout).await;
	if status != StatusCode::OK {
		tracing::warn!(
			status = status.as_u16(),
			error = response.error.as_deref().unwrap_or_default(),
			"Relay request failed"
		);
	}
	(status, Json(response))
}

/// Handles GET /api/relay/{id} requests.
async fn handle_get_status(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<RelayStatusResponse>, APIError> {
	match apis::status::get_relay_status(&id, &state.executor).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Status lookup failed: {}", e);
			Err(e)
		},
	}
}

/// Handles GET /api/health requests.
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
	Json(apis::health::health(&state.executor))
}
