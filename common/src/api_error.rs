use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::node_api::NodeError;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("no storage nodes available")]
    NoNodesAvailable,
    #[error("operation timed out")]
    Timeout,
    #[error("service unavailable")]
    Unavailable,
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NoNodesAvailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Node(NodeError::Invalid(_)) => StatusCode::BAD_REQUEST,
            ApiError::Node(NodeError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Node(NodeError::Unreachable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Node(NodeError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Any(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
