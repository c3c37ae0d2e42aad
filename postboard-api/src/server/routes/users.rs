use crate::server::{Result, ServerError, ServerRouter, json::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use postboard_common::model::{
    Id,
    user::{User, UserMarker},
};
use postboard_db::client::DbClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(get_user)
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
struct UserBody {
    user: User,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users/{user_id}", rejection(ServerError))]
struct GetUserPath {
    user_id: Id<UserMarker>,
}

async fn get_user(
    GetUserPath { user_id }: GetUserPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<UserBody>> {
    let user = db
        .fetch_user(user_id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(user_id))?;

    Ok(Json(UserBody { user }))
}
