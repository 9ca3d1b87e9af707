//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hostprov_api::models::{
    ErrorResponse, HealthResponse, HostListResponse, HostSummary, ProvisionResponse,
    RegisterHostRequest, VersionResponse,
};
use secrecy::SecretString;
use tracing::error;

use crate::errors::ProvisionError;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Error wrapper that maps crate errors to status codes
pub struct ApiError(pub ProvisionError);

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ProvisionError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ProvisionError::HostNotRegistered(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "hostprov".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// List registered hosts. Passwords are never included.
pub async fn list_hosts_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let hosts: Vec<HostSummary> = state
        .provisioner
        .registry()
        .list()
        .await
        .into_iter()
        .map(|(host_id, record)| HostSummary {
            host_id,
            root_username: record.root_username,
            accounts: record.accounts,
        })
        .collect();
    let total = hosts.len();

    Json(HostListResponse { hosts, total })
}

/// Register (or re-register) a host
pub async fn register_host_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<RegisterHostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .provisioner
        .register_host(
            &request.host_id,
            &request.root_username,
            SecretString::from(request.root_password),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(HostSummary {
            host_id: request.host_id.trim().to_string(),
            root_username: request.root_username.trim().to_string(),
            accounts: Vec::new(),
        }),
    ))
}

/// Provision accounts from a CSV request body
pub async fn provision_handler(
    State(state): State<Arc<ServerState>>,
    Path(host_id): Path<String>,
    body: Bytes,
) -> Result<Json<ProvisionResponse>, ApiError> {
    let report = state
        .provisioner
        .provision(&host_id, body.as_ref())
        .await?;
    Ok(Json(report.to_response()))
}
