use crate::server::{
    AuthConfig, Result, ServerError, ServerRouter,
    json::{Created, Json},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use postboard_common::model::{
    auth::{AuthToken, Authentication},
    user::{CreateUser, User},
};
use postboard_db::client::DbClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_post(signup)
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignupBody {
    created_user: User,
    encoded_token: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/auth/signup", rejection(ServerError))]
struct SignupPath();

/// Registers a user and opens a first session for them.
async fn signup(
    SignupPath(): SignupPath,
    State(db): State<Arc<DbClient>>,
    State(auth_config): State<AuthConfig>,
    Json(create_user): Json<CreateUser>,
) -> Result<Created<SignupBody>> {
    let user = db.create_user(&create_user).await?;

    let token = AuthToken::generate_random(user.id);
    let authentication = Authentication::new(user.id, token.hash()?, auth_config.token_lifetime);
    db.create_authentication(authentication).await?;
    info!(user_id = %user.id, username = %user.username, "User signed up");

    Ok(Created(SignupBody {
        created_user: user,
        encoded_token: token.as_token_str(),
    }))
}
