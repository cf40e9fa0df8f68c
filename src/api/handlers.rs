//! HTTP request handlers

use super::types::{
    ConnectionListResponse, ConnectionResponse, ConnectionSummary, CreateConnectionRequest,
    CreateConnectionResponse, ErrorResponse, HealthResponse, MessageResponse, QrResponse,
    SendFileRequest, SendResponse, SendTextRequest,
};
use super::AppState;
use crate::connection::ConnectionStatus;
use crate::error::ConnectionError;
use crate::runtime::{Connection, Delivery};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/", get(health))
        .route("/api/status", get(health))
        // Connection management
        .route(
            "/api/connections",
            get(list_connections).post(create_connection),
        )
        .route(
            "/api/connections/:id",
            get(get_connection).delete(delete_connection),
        )
        .route("/api/connections/:id/qr", get(get_qr))
        .route("/api/connections/:id/restart", post(restart_connection))
        .route("/api/connections/:id/logout", post(logout_connection))
        // Messaging
        .route("/api/send", post(send_text))
        .route("/api/send-file", post(send_file))
        .with_state(state)
}

// ============================================================
// Health
// ============================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let records = state.registry.records().await;

    Json(HealthResponse {
        status: "running",
        server_version: SERVER_VERSION,
        total_connections: records.len(),
        connections: records.iter().map(ConnectionSummary::from).collect(),
    })
}

// ============================================================
// Connection Management
// ============================================================

async fn create_connection(
    State(state): State<AppState>,
    payload: Result<Json<CreateConnectionRequest>, JsonRejection>,
) -> Result<Json<CreateConnectionResponse>, AppError> {
    let Json(req) = payload?;
    let (Some(id), Some(name)) = (req.id, req.name) else {
        return Err(ConnectionError::Validation("id and name are required".to_string()).into());
    };

    let connection = state.registry.create(&id, &name).await?;

    Ok(Json(CreateConnectionResponse {
        success: true,
        message: "Connection created successfully",
        connection,
    }))
}

async fn list_connections(State(state): State<AppState>) -> Json<ConnectionListResponse> {
    let connections = state.registry.records().await;

    Json(ConnectionListResponse {
        success: true,
        total: connections.len(),
        connections,
    })
}

async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionResponse>, AppError> {
    let connection = state.registry.get(&id).await?.record();

    Ok(Json(ConnectionResponse {
        success: true,
        connection,
    }))
}

async fn get_qr(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QrResponse>, AppError> {
    let record = state.registry.get(&id).await?.record();
    Ok(Json(QrResponse::for_record(&record)))
}

async fn delete_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.registry.delete(&id).await?;
    Ok(Json(MessageResponse::new("Connection deleted successfully")))
}

async fn restart_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.registry.restart(&id).await?;
    Ok(Json(MessageResponse::new("Connection restarting...")))
}

async fn logout_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.registry.get(&id).await?.logout().await?;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

// ============================================================
// Messaging
// ============================================================

/// Pick the connection a send goes through.
///
/// Without an explicit id, a lone connection is used so single-account
/// clients keep working.
async fn resolve_connection(
    state: &AppState,
    requested: Option<String>,
) -> Result<Arc<Connection>, AppError> {
    let Some(id) = requested else {
        return match state.registry.list().await.as_slice() {
            [only] => Ok(only.clone()),
            _ => Err(ConnectionError::Validation(
                "connectionId is required for multi-connection mode".to_string(),
            )
            .into()),
        };
    };
    Ok(state.registry.get(&id).await?)
}

fn ensure_connected(connection: &Connection) -> Result<(), AppError> {
    let record = connection.record();
    if record.status == ConnectionStatus::Connected {
        Ok(())
    } else {
        Err(ConnectionError::NotReady {
            id: record.id,
            status: record.status,
        }
        .into())
    }
}

fn send_response(connection: &Connection, delivery: Delivery) -> Json<SendResponse> {
    Json(SendResponse {
        success: true,
        message_id: delivery.message.id,
        timestamp: delivery.message.timestamp,
        to: delivery.chat_id,
        connection: connection.record().name,
    })
}

async fn send_text(
    State(state): State<AppState>,
    payload: Result<Json<SendTextRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, AppError> {
    let Json(req) = payload?;
    let connection = resolve_connection(&state, req.connection_id).await?;
    ensure_connected(&connection)?;

    let (Some(receiver), Some(message)) = (req.receiver, req.message) else {
        return Err(
            ConnectionError::Validation("receiver and message are required".to_string()).into(),
        );
    };

    let delivery = connection
        .outbound()
        .send_text(&receiver, req.is_group, &message)
        .await?;

    tracing::info!(
        connection_id = %connection.id(),
        to = %delivery.chat_id,
        message_id = %delivery.message.id,
        "Message sent"
    );
    Ok(send_response(&connection, delivery))
}

async fn send_file(
    State(state): State<AppState>,
    payload: Result<Json<SendFileRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, AppError> {
    let Json(req) = payload?;
    let connection = resolve_connection(&state, req.connection_id).await?;
    ensure_connected(&connection)?;

    let (Some(receiver), Some(file_url)) = (req.receiver, req.file_url) else {
        return Err(
            ConnectionError::Validation("receiver and fileUrl are required".to_string()).into(),
        );
    };

    let media = state
        .media
        .fetch(&file_url)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let delivery = connection
        .outbound()
        .send_media(
            &receiver,
            req.is_group,
            &media,
            req.caption.as_deref().unwrap_or_default(),
        )
        .await?;

    tracing::info!(
        connection_id = %connection.id(),
        to = %delivery.chat_id,
        message_id = %delivery.message.id,
        mimetype = %media.mimetype,
        "File sent"
    );
    Ok(send_response(&connection, delivery))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub(crate) enum AppError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl From<ConnectionError> for AppError {
    fn from(e: ConnectionError) -> Self {
        let message = e.to_string();
        match e {
            ConnectionError::AlreadyExists(_) | ConnectionError::Validation(_) => {
                AppError::BadRequest(message)
            }
            ConnectionError::NotFound(_) => AppError::NotFound(message),
            ConnectionError::NotReady { .. } | ConnectionError::AuthFailure(_) => {
                AppError::Unavailable(message)
            }
            ConnectionError::OperationFailed(_) => AppError::Internal(message),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
