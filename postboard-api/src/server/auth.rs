use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderValue, header::AUTHORIZATION, request::Parts},
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use postboard_common::model::{
    Id,
    auth::AuthToken,
    user::{User, UserMarker},
};
use postboard_db::client::DbClient;
use std::sync::Arc;
use time::UtcDateTime;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The caller of a request, resolved from the session token in its `Authorization` header.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    user: User,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.user.id
    }
}

/// Reads the token from `Authorization: Bearer <token>`, or from a bare `Authorization: <token>`.
async fn request_token<S>(parts: &mut Parts, state: &S) -> Result<AuthToken, ServerError>
where
    S: Send + Sync,
{
    match AuthorizationHeader::from_request_parts(parts, state).await {
        Ok(header) => Ok(header.token().parse()?),
        Err(rejection) if rejection.is_missing() => {
            Err(ServerError::InvalidAuthorizationHeader(rejection))
        }
        Err(rejection) => match parts.headers.get(AUTHORIZATION).map(HeaderValue::to_str) {
            Some(Ok(raw)) => Ok(raw.trim().parse()?),
            _ => Err(ServerError::InvalidAuthorizationHeader(rejection)),
        },
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let request_token = request_token(parts, state).await?;

        let token_hash = request_token.hash()?;
        let db = Arc::<DbClient>::from_ref(state);

        let authentication = db
            .fetch_auth(&token_hash)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        if authentication.user != request_token.user_id {
            return Err(ServerError::InvalidToken);
        }
        if authentication.is_expired_at(UtcDateTime::now()) {
            return Err(ServerError::ExpiredToken);
        }

        let user = db
            .fetch_user(authentication.user)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        Ok(Self { user })
    }
}
