use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Protected: {0}")]
    Protected(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Deployment failed: {0}")]
    Deployer(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Kubernetes error: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("Kubernetes config error: {0}")]
    KubeConfig(#[from] kube::config::KubeconfigError),

    #[error("Kubernetes in-cluster config error: {0}")]
    KubeInCluster(#[from] kube::config::InClusterError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Protected(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Deployer(msg) => {
                tracing::error!("Deployment error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            AppError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg.clone()),
            AppError::Kubernetes(e) => {
                tracing::error!("Kubernetes error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Kubernetes error: {}", e),
                )
            }
            AppError::KubeConfig(e) => {
                tracing::error!("Kubernetes config error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Kubernetes config error: {}", e),
                )
            }
            AppError::KubeInCluster(e) => {
                tracing::error!("Kubernetes in-cluster config error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Kubernetes in-cluster config error: {}", e),
                )
            }
            AppError::Json(e) => (StatusCode::BAD_REQUEST, format!("JSON error: {}", e)),
            AppError::Yaml(e) => (StatusCode::BAD_REQUEST, format!("YAML error: {}", e)),
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("IO error: {}", e))
            }
        };

        (status, Json(ErrorResponse { detail: message })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
