use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use tenure_core::client::parse_lock_key;
use tenure_core::types::{HeartbeatOptions, LockClientOptions, LockKey};
use tenure_core::{LockClient, LockError, LockHandle};

use crate::handlers::*;

/// One lock client plus the handles it has given out, by key.
pub struct Service {
    client: LockClient,
    handles: Mutex<HashMap<LockKey, LockHandle>>,
}

pub type AppState = Arc<Service>;

impl Service {
    pub fn new(client: LockClient) -> Self {
        Self {
            client,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Drop handles that are lost, released or past their lease.
    fn prune(&self, handles: &mut HashMap<LockKey, LockHandle>) {
        handles.retain(|key, handle| {
            let live = self.client.ensure_held(handle).is_ok();
            if !live {
                tracing::debug!(key = %key, "Dropping dead lock handle");
            }
            live
        });
    }
}

pub async fn run(
    host: &str,
    port: u16,
    storage: &str,
    options: LockClientOptions,
) -> Result<(), String> {
    let client = create_client(storage, options).map_err(|e| e.to_string())?;
    let state: AppState = Arc::new(Service::new(client));

    let app = Router::new()
        // Health is always open (no auth)
        .route("/health", get(health))
        // Protected routes
        .route("/locks", post(acquire_lock).get(list_locks))
        .route("/locks/{key}", get(lock_owner).delete(release_lock))
        .route("/locks/{key}/heartbeat", post(heartbeat_lock))
        .layer(middleware::from_fn(auth_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let addr = format!("{}:{}", host, port);

    if std::env::var("TENURE_API_KEY").is_ok() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!("No TENURE_API_KEY set, server is open (dev mode)");
    }

    tracing::info!("tenure lock service starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("failed to bind {}: {}", addr, e))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("server error: {}", e))?;

    tracing::info!("shutting down lock client");
    let service = state;
    tokio::task::spawn_blocking(move || service.client.close())
        .await
        .map_err(|e| format!("shutdown failed: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

// ─── Auth Middleware ────────────────────────────────────────────────────────

async fn auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // If no API key is configured, allow all requests (dev mode)
    let expected_key = match std::env::var("TENURE_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => return Ok(next.run(request).await),
    };

    // Always allow health check without auth
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth_header.strip_prefix("Bearer ").unwrap_or("");

    if token == expected_key {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Unauthorized request to {}", request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

// ─── Errors ─────────────────────────────────────────────────────────────────

pub struct ApiError(StatusCode, ApiResponse<()>);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

impl From<LockError> for ApiError {
    fn from(err: LockError) -> Self {
        let (status, reason) = match &err {
            LockError::LockNotGranted { .. } => (StatusCode::CONFLICT, "LOCK_NOT_GRANTED"),
            LockError::LockLost { .. } => (StatusCode::CONFLICT, "LOCK_LOST"),
            LockError::InvalidConfiguration(_) => (StatusCode::BAD_REQUEST, "INVALID_CONFIGURATION"),
            LockError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
        };
        ApiError(status, ApiResponse::err(reason, err.to_string()))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse::err("INTERNAL", err.to_string()),
        )
    }
}

fn not_held(key: &LockKey) -> ApiError {
    ApiError(
        StatusCode::NOT_FOUND,
        ApiResponse::err("NOT_HELD", format!("lock '{}' is not held by this service", key)),
    )
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        held_locks: state.client.held_locks().len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn acquire_lock(
    State(state): State<AppState>,
    Json(req): Json<AcquireLockRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LockResponse>>), ApiError> {
    if let Err(e) = req.validate() {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            ApiResponse::err("INVALID_REQUEST", e),
        ));
    }

    // Acquisition may sleep between polls; keep it off the async workers.
    let options = req.to_options();
    let service = state.clone();
    let handle = tokio::task::spawn_blocking(move || service.client.acquire(&options))
        .await?
        .inspect_err(|e| tracing::info!(key = %req.key, error = %e, "Lock denied"))?;

    tracing::info!(
        key = %handle.key(),
        sequence = handle.sequence_number(),
        "Lock acquired"
    );
    let response = LockResponse::from_handle(&handle, state.client.now_millis());
    let mut handles = state.handles.lock().await;
    state.prune(&mut handles);
    handles.insert(handle.key().clone(), handle);

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(response))))
}

async fn list_locks(State(state): State<AppState>) -> Json<ApiResponse<Vec<LockResponse>>> {
    let mut handles = state.handles.lock().await;
    state.prune(&mut handles);
    let now = state.client.now_millis();
    let locks = handles
        .values()
        .map(|handle| LockResponse::from_handle(handle, now))
        .collect();
    Json(ApiResponse::ok(locks))
}

async fn lock_owner(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<OwnerResponse>>, ApiError> {
    let key = parse_lock_key(&key);
    let service = state.clone();
    let lookup = key.clone();
    let info = tokio::task::spawn_blocking(move || service.client.get_lock_owner_info(&lookup))
        .await??;

    match info {
        Some(info) => Ok(Json(ApiResponse::ok(OwnerResponse {
            key: key.to_string(),
            info,
        }))),
        None => Err(ApiError(
            StatusCode::NOT_FOUND,
            ApiResponse::err("NOT_FOUND", format!("no lock item for '{}'", key)),
        )),
    }
}

async fn heartbeat_lock(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<HeartbeatResponse>>, ApiError> {
    let key = parse_lock_key(&key);
    let handle = state
        .handles
        .lock()
        .await
        .get(&key)
        .cloned()
        .ok_or_else(|| not_held(&key))?;

    let service = state.clone();
    let renewing = handle.clone();
    let result = tokio::task::spawn_blocking(move || {
        service
            .client
            .send_heartbeat(&renewing, &HeartbeatOptions::default())
    })
    .await?;

    if let Err(e) = result {
        if matches!(e, LockError::LockLost { .. }) {
            tracing::warn!(key = %key, "Lock lost");
            state.handles.lock().await.remove(&key);
        }
        return Err(e.into());
    }

    tracing::debug!(key = %key, "Lock heartbeat renewed");
    Ok(Json(ApiResponse::ok(HeartbeatResponse {
        renewed: true,
        key: key.to_string(),
        record_version_number: handle.record_version_number(),
    })))
}

async fn release_lock(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ReleaseQuery>,
) -> Result<Json<ApiResponse<ReleaseResponse>>, ApiError> {
    let key = parse_lock_key(&key);
    let handle = state
        .handles
        .lock()
        .await
        .remove(&key)
        .ok_or_else(|| not_held(&key))?;

    let options = query.to_options();
    let service = state.clone();
    let releasing = handle.clone();
    let result =
        tokio::task::spawn_blocking(move || service.client.release(&releasing, &options)).await?;

    let released = match result {
        Ok(released) => released,
        Err(e) => {
            // Keep the handle so the caller can retry the release.
            if !matches!(e, LockError::LockLost { .. }) {
                tracing::warn!(key = %key, error = %e, "Release failed, keeping handle");
                state.handles.lock().await.entry(key).or_insert(handle);
            }
            return Err(e.into());
        }
    };

    tracing::info!(key = %key, released, "Lock released");
    Ok(Json(ApiResponse::ok(ReleaseResponse {
        key: key.to_string(),
        released,
    })))
}

// ─── Storage Backend Selection ──────────────────────────────────────────────

pub fn create_client(storage: &str, options: LockClientOptions) -> Result<LockClient, LockError> {
    if storage == "memory" {
        tracing::info!("Storage backend: in-memory (locks are local to this process)");
        LockClient::in_memory(options)
    } else if let Some(path) = storage.strip_prefix("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            tracing::info!("Storage backend: SQLite ({})", path);
            LockClient::with_sqlite(path, options)
        }
        #[cfg(not(feature = "sqlite"))]
        {
            let _ = (path, options);
            Err(LockError::InvalidConfiguration(
                "SQLite storage requested but the `sqlite` feature is not enabled. \
                 Rebuild with: cargo build --features sqlite"
                    .to_string(),
            ))
        }
    } else {
        Err(LockError::InvalidConfiguration(format!(
            "unknown storage backend '{}'. Use 'memory' or 'sqlite:<path>'",
            storage
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenure_core::infrastructure_in_memory::InMemoryLockStore;
    use tenure_core::types::{AcquireOptions, LockItem};

    fn options() -> LockClientOptions {
        LockClientOptions {
            lease_duration_ms: 60_000,
            heartbeat_period_ms: 1000,
            create_heartbeat_background_thread: false,
            ..LockClientOptions::new("locks", "service")
        }
    }

    fn service(store: &Arc<InMemoryLockStore>) -> AppState {
        Arc::new(Service::new(LockClient::new(store.clone(), options()).unwrap()))
    }

    async fn hold(state: &AppState, key: &str) -> LockHandle {
        let handle = state.client.acquire(&AcquireOptions::new(key)).unwrap();
        state
            .handles
            .lock()
            .await
            .insert(handle.key().clone(), handle.clone());
        handle
    }

    fn release_query() -> Query<ReleaseQuery> {
        Query(serde_json::from_str("{}").unwrap())
    }

    #[tokio::test]
    async fn test_failed_release_keeps_handle_for_retry() {
        let store = Arc::new(InMemoryLockStore::new());
        let state = service(&store);
        hold(&state, "jobs").await;

        store.set_unavailable(true);
        let failed = release_lock(
            State(state.clone()),
            Path("jobs".to_string()),
            release_query(),
        )
        .await;
        assert!(failed.is_err());
        assert!(state.handles.lock().await.contains_key(&LockKey::new("jobs")));

        store.set_unavailable(false);
        let Json(response) = release_lock(
            State(state.clone()),
            Path("jobs".to_string()),
            release_query(),
        )
        .await
        .ok()
        .unwrap();
        assert!(response.data.unwrap().released);
        assert!(state.handles.lock().await.is_empty());
        assert!(store.is_empty("locks"));
    }

    #[tokio::test]
    async fn test_lost_handles_are_pruned() {
        let store = Arc::new(InMemoryLockStore::new());
        let state = service(&store);
        hold(&state, "stolen").await;
        hold(&state, "kept").await;

        let now = state.client.now_millis();
        store.overwrite(
            "locks",
            LockItem::acquired(LockKey::new("stolen"), "intruder", 60_000, None, 0, now),
        );
        let report = state.client.run_heartbeat_tick();
        assert_eq!(report.lost, vec![LockKey::new("stolen")]);

        let Json(response) = list_locks(State(state.clone())).await;
        let listed = response.data.unwrap();
        assert_eq!(listed.len(), 1);

        let handles = state.handles.lock().await;
        assert_eq!(handles.len(), 1);
        assert!(handles.contains_key(&LockKey::new("kept")));
    }

    #[tokio::test]
    async fn test_acquire_replaces_released_handle() {
        let store = Arc::new(InMemoryLockStore::new());
        let state = service(&store);
        let first = hold(&state, "jobs").await;
        state
            .client
            .release(&first, &tenure_core::types::ReleaseOptions::default())
            .unwrap();

        let request: AcquireLockRequest = serde_json::from_str(r#"{"key": "other"}"#).unwrap();
        acquire_lock(State(state.clone()), Json(request)).await.ok().unwrap();

        let handles = state.handles.lock().await;
        assert_eq!(handles.len(), 1);
        assert!(handles.contains_key(&LockKey::new("other")));
    }
}
