use crate::server::{
    Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json, routes::PostsBody,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use postboard_common::model::{
    Id,
    post::{CommentId, CommentInput, PostMarker},
};
use postboard_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(comment_post)
        .typed_post(delete_comment)
}

#[derive(Deserialize)]
struct CommentBody {
    comment: CommentInput,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/post/comment/{post_id}", rejection(ServerError))]
struct CommentPostPath {
    post_id: Id<PostMarker>,
}

/// Adds a comment, or edits it in place when its id is already on the post.
async fn comment_post(
    CommentPostPath { post_id }: CommentPostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(CommentBody { comment }): Json<CommentBody>,
) -> Result<Json<PostsBody>> {
    db.upsert_comment(post_id, comment, user.user())
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    Ok(Json(PostsBody::all(&db).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/post/commentdelete/{post_id}/{comment_id}", rejection(ServerError))]
struct DeleteCommentPath {
    post_id: Id<PostMarker>,
    comment_id: CommentId,
}

async fn delete_comment(
    DeleteCommentPath {
        post_id,
        comment_id,
    }: DeleteCommentPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Json<PostsBody>> {
    db.delete_comment(post_id, comment_id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    Ok(Json(PostsBody::all(&db).await?))
}
