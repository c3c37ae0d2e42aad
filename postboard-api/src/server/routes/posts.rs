use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    json::{Created, Json},
    routes::PostsBody,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use postboard_common::model::{
    Id,
    post::{EditPost, Post, PostContent, PostMarker},
    user::UserMarker,
};
use postboard_db::client::DbClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_posts)
        .typed_get(get_post)
        .typed_get(get_user_posts)
        .typed_post(create_post)
        .typed_post(edit_post)
        .typed_post(like_post)
        .typed_post(dislike_post)
        .typed_delete(delete_post)
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
struct PostBody {
    post: Post,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostDataBody<T> {
    post_data: T,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts", rejection(ServerError))]
struct GetPostsPath();

async fn get_posts(
    GetPostsPath(): GetPostsPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<PostsBody>> {
    Ok(Json(PostsBody::all(&db).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/{post_id}", rejection(ServerError))]
struct GetPostPath {
    post_id: Id<PostMarker>,
}

async fn get_post(
    GetPostPath { post_id }: GetPostPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<PostBody>> {
    let post = db
        .fetch_post(post_id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    Ok(Json(PostBody { post }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/user/{user_id}", rejection(ServerError))]
struct GetUserPostsPath {
    user_id: Id<UserMarker>,
}

async fn get_user_posts(
    GetUserPostsPath { user_id }: GetUserPostsPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<PostsBody>> {
    let posts = db
        .fetch_user_posts(user_id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(user_id))?;

    Ok(Json(PostsBody { posts }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/user/posts", rejection(ServerError))]
struct CreatePostPath();

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(PostDataBody { post_data }): Json<PostDataBody<PostContent>>,
) -> Result<Created<PostsBody>> {
    let post = db.create_post(post_data, user.user()).await?;
    info!(post_id = %post.id, user_id = %user.user_id(), "Post created");

    Ok(Created(PostsBody::all(&db).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/edit/{post_id}", rejection(ServerError))]
struct EditPostPath {
    post_id: Id<PostMarker>,
}

async fn edit_post(
    EditPostPath { post_id }: EditPostPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    Json(PostDataBody { post_data }): Json<PostDataBody<EditPost>>,
) -> Result<Json<PostsBody>> {
    db.edit_post(post_id, post_data)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    Ok(Json(PostsBody::all(&db).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/like/{post_id}", rejection(ServerError))]
struct LikePostPath {
    post_id: Id<PostMarker>,
}

async fn like_post(
    LikePostPath { post_id }: LikePostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<PostsBody>> {
    db.like_post(post_id, user.user_id())
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    Ok(Json(PostsBody::all(&db).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/dislike/{post_id}", rejection(ServerError))]
struct DislikePostPath {
    post_id: Id<PostMarker>,
}

async fn dislike_post(
    DislikePostPath { post_id }: DislikePostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<PostsBody>> {
    db.dislike_post(post_id, user.user_id())
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    Ok(Json(PostsBody::all(&db).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/user/posts/{post_id}", rejection(ServerError))]
struct DeletePostPath {
    post_id: Id<PostMarker>,
}

async fn delete_post(
    DeletePostPath { post_id }: DeletePostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<PostsBody>> {
    db.delete_post(post_id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;
    info!(%post_id, user_id = %user.user_id(), "Post deleted");

    Ok(Json(PostsBody::all(&db).await?))
}
