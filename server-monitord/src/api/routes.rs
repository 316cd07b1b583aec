use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use shared::protocol::API_PREFIX;
use shared::types::{EndpointKey, PollSnapshot, WatchKey};
use crate::monitor::{MonitorError, MonitorHandle};
use crate::store::document::ServerConfig;
use crate::store::validate::ServerDraft;
use crate::store::StoreError;
use crate::store_manager::StoreHandle;

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub monitor: MonitorHandle,
    pub status_rx: watch::Receiver<PollSnapshot>,
}

#[derive(Serialize)]
pub struct ServerEntry {
    pub key: EndpointKey,
    #[serde(flatten)]
    pub server: ServerConfig,
}

#[derive(Serialize)]
pub struct WatchEntry {
    pub key: WatchKey,
    pub servers: Vec<EndpointKey>,
}

#[derive(Deserialize)]
pub struct CreateWatch {
    pub channel_id: u64,
    pub servers: Vec<EndpointKey>,
}

#[derive(Serialize)]
pub struct Created<K> {
    pub key: K,
}

/// Error body: a message plus, for rejected servers, every problem found
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    problems: Vec<String>,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            problems: Vec::new(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Rejected(problems) => Self {
                status: StatusCode::BAD_REQUEST,
                error: "Failed to add server".to_string(),
                problems: problems.iter().map(|p| p.to_string()).collect(),
            },
            StoreError::UnknownServer(_) | StoreError::UnknownWatch(_) => {
                Self::new(StatusCode::NOT_FOUND, e.to_string())
            }
            StoreError::EmptyWatch => Self::new(StatusCode::BAD_REQUEST, e.to_string()),
            StoreError::Persist(ref inner) => {
                tracing::error!("Failed to persist config: {:#}", inner);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to persist config")
            }
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        match e {
            MonitorError::Store(e) => e.into(),
            MonitorError::Display(_) => {
                tracing::error!("{}", e);
                Self::new(StatusCode::BAD_GATEWAY, e.to_string())
            }
            MonitorError::Stopped => Self::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(&format!("{}/servers", API_PREFIX), get(list_servers).post(add_server))
        .route(&format!("{}/servers/:key", API_PREFIX), delete(remove_server))
        .route(&format!("{}/status", API_PREFIX), get(get_status))
        .route(&format!("{}/watches", API_PREFIX), get(list_watches).post(create_watch))
        .route(&format!("{}/watches/:key", API_PREFIX), delete(remove_watch))
        .with_state(state)
}

fn parse_key<K: std::str::FromStr>(raw: &str) -> Result<K, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, format!("Malformed key: {}", raw)))
}

fn unavailable(e: anyhow::Error) -> ApiError {
    tracing::error!("Failed to read config: {:#}", e);
    ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Config store unavailable")
}

async fn list_servers(State(state): State<AppState>) -> Result<Json<Vec<ServerEntry>>, ApiError> {
    let document = state.store.snapshot().await.map_err(unavailable)?;

    Ok(Json(
        document
            .servers
            .into_iter()
            .map(|(key, server)| ServerEntry { key, server })
            .collect(),
    ))
}

async fn add_server(
    State(state): State<AppState>,
    Json(draft): Json<ServerDraft>,
) -> Result<(StatusCode, Json<Created<EndpointKey>>), ApiError> {
    let key = state.store.add_server(draft).await?;
    Ok((StatusCode::CREATED, Json(Created { key })))
}

async fn remove_server(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let key: EndpointKey = parse_key(&key)?;
    state.store.remove_server(key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_status(State(state): State<AppState>) -> Json<PollSnapshot> {
    Json(state.status_rx.borrow().clone())
}

async fn list_watches(State(state): State<AppState>) -> Result<Json<Vec<WatchEntry>>, ApiError> {
    let document = state.store.snapshot().await.map_err(unavailable)?;

    Ok(Json(
        document
            .active_messages
            .into_iter()
            .map(|(key, servers)| WatchEntry { key, servers })
            .collect(),
    ))
}

async fn create_watch(
    State(state): State<AppState>,
    Json(request): Json<CreateWatch>,
) -> Result<(StatusCode, Json<Created<WatchKey>>), ApiError> {
    let key = state
        .monitor
        .create_watch(request.channel_id, request.servers)
        .await?;
    Ok((StatusCode::CREATED, Json(Created { key })))
}

async fn remove_watch(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let key: WatchKey = parse_key(&key)?;
    state.monitor.remove_watch(key).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayError;
    use crate::store::validate::Problem;

    #[test]
    fn test_rejection_lists_problems() {
        let error: ApiError = StoreError::Rejected(vec![
            Problem::InvalidPort(0),
            Problem::InvalidCountry("zz".to_string()),
        ])
        .into();

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        let body = serde_json::to_value(&error).unwrap();
        assert_eq!(body["problems"][0], "Invalid port: 0");
        assert_eq!(body["problems"][1], "Invalid country: zz");
    }

    #[test]
    fn test_status_codes() {
        let unknown: ApiError = StoreError::UnknownWatch(WatchKey::new(1, 2)).into();
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);

        let empty: ApiError = MonitorError::Store(StoreError::EmptyWatch).into();
        assert_eq!(empty.status, StatusCode::BAD_REQUEST);

        let display: ApiError = MonitorError::Display(DisplayError::NotFound).into();
        assert_eq!(display.status, StatusCode::BAD_GATEWAY);

        let stopped: ApiError = MonitorError::Stopped.into();
        assert_eq!(stopped.status, StatusCode::SERVICE_UNAVAILABLE);

        let persist: ApiError = StoreError::Persist(anyhow::anyhow!("disk full")).into();
        assert_eq!(persist.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(serde_json::to_value(&persist).unwrap().get("problems").is_none());
    }

    #[test]
    fn test_malformed_path_key() {
        assert!(parse_key::<WatchKey>("12:34").is_ok());
        let error = parse_key::<EndpointKey>("not-a-key").unwrap_err();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }
}
