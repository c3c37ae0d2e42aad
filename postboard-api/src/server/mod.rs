use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection},
    },
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use postboard_common::{
    model::{
        Id,
        auth::{AuthTokenDecodeError, AuthTokenHashError},
        post::PostMarker,
        user::UserMarker,
    },
    util::PositiveDuration,
};
use postboard_db::client::{DbClient, DbError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower::Layer;
use tower_http::{
    normalize_path::{NormalizePath, NormalizePathLayer},
    trace::TraceLayer,
};
use tracing::{debug, error};

mod auth;
mod json;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub auth_config: AuthConfig,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct AuthConfig {
    /// Sessions never expire when this is `None`.
    pub token_lifetime: Option<PositiveDuration>,
}

pub fn routes() -> ServerRouter {
    routes::routes()
        .fallback(fallback)
        .method_not_allowed_fallback(method_not_allowed)
}

/// The complete service: routes, request tracing, and trailing slashes stripped before routing.
pub fn app(state: ServerState) -> NormalizePath<Router> {
    let router = routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    NormalizePathLayer::trim_trailing_slash().layer(router)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub async fn method_not_allowed(request: Request) -> ServerError {
    let (parts, _) = request.into_parts();
    ServerError::MethodNotAllowed(parts.method, parts.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("No route matches {0}")]
    UnknownRoute(Uri),
    #[error("{0} is not allowed on {1}")]
    MethodNotAllowed(Method, Uri),
    #[error("Invalid path: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Invalid request body: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Serializing the response failed: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Bad authorization header: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("Malformed auth token: {0}")]
    InvalidAuthToken(#[from] AuthTokenDecodeError),
    #[error("Hashing the auth token failed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error("Unknown auth token")]
    InvalidToken,
    #[error("Auth token has expired")]
    ExpiredToken,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("No post with id {0}")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("No user with id {0}")]
    UserByIdNotFound(Id<UserMarker>),
}

/// How an error is reported to clients.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum ErrorKind {
    NotFound,
    MethodNotAllowed,
    Unauthorized,
    BadRequest,
    Conflict,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ServerError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::UserByIdNotFound(_) => ErrorKind::NotFound,
            ServerError::MethodNotAllowed(..) => ErrorKind::MethodNotAllowed,
            ServerError::InvalidAuthorizationHeader(rejection) if rejection.is_missing() => {
                ErrorKind::Unauthorized
            }
            ServerError::InvalidToken | ServerError::ExpiredToken => ErrorKind::Unauthorized,
            ServerError::JsonRejection(_)
            | ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_)
            | ServerError::Database(DbError::PostUpdate(_)) => ErrorKind::BadRequest,
            ServerError::Database(DbError::UsernameTaken(_)) => ErrorKind::Conflict,
            ServerError::JsonResponse(_)
            | ServerError::AuthTokenHash(_)
            | ServerError::Database(
                DbError::IdGeneration(_) | DbError::DuplicatePost(_),
            ) => ErrorKind::Internal,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }

    /// What the client gets to read. Internal details stay in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_owned(),
            _ => self.to_string(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
    errors: Vec<String>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = kind.status();

        if kind == ErrorKind::Internal {
            error!(error = %self, %status, "Request failed");
        } else {
            debug!(error = %self, %status, "Request rejected");
        }

        let body = ErrorResponse {
            status: status.as_u16(),
            errors: vec![self.public_message()],
        };
        (status, Json(body)).into_response()
    }
}
