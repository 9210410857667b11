use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{FormRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::Key;
use inkpost_common::model::{
    Id,
    auth::{PasswordHashError, SessionTokenHashError},
    post::PostMarker,
};
use inkpost_db::client::{DbClient, DbError};
use json::Json;
use serde::{Deserialize, Serialize};
use session::SessionLifetime;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

mod flash;
mod form;
mod json;
mod routes;
pub mod session;
#[cfg(test)]
mod tests;
mod view;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub cookie_key: Key,
    pub session_lifetime: SessionLifetime,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

/// The whole application, ready to be served.
pub fn app(state: ServerState) -> Router {
    routes().with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming form rejected: {0}")]
    FormRejection(#[from] FormRejection),
    #[error("JSON could not be serialized: {0}")]
    Json(#[from] serde_json::Error),
    #[error("The session token could not be hashed: {0}")]
    SessionTokenHash(#[from] SessionTokenHashError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error("Only the admin may do this")]
    AdminOnly,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::AdminOnly => StatusCode::FORBIDDEN,
            ServerError::FormRejection(_) => StatusCode::BAD_REQUEST,
            ServerError::Json(_)
            | ServerError::Database(_)
            | ServerError::SessionTokenHash(_)
            | ServerError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            status: status.as_u16(),
        };
        (status, Json(error_response)).into_response()
    }
}
