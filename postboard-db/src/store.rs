use crate::client::Result;
use async_trait::async_trait;
use postboard_common::model::{
    Id,
    post::{Post, PostMarker, PostUpdateError},
};
use std::fmt::Debug;

/// A change to a single post. Returning an error aborts the change.
pub type PostUpdate<'a> = Box<dyn FnOnce(&mut Post) -> Result<(), PostUpdateError> + Send + 'a>;

/// Storage for posts.
///
/// Implementations keep posts in creation order. Each call is atomic on its own; in
/// particular [`PostStore::update`] must not let another writer in between reading the post
/// and storing the updated version.
#[async_trait]
pub trait PostStore: Debug + Send + Sync {
    async fn list(&self) -> Result<Vec<Post>>;

    async fn get(&self, id: Id<PostMarker>) -> Result<Option<Post>>;

    async fn insert(&self, post: Post) -> Result<()>;

    /// Applies `update` to the post with `id` and stores the result.
    ///
    /// Returns `Ok(None)` if there is no such post. If `update` fails, the stored post is left
    /// as it was and the error is returned as [`DbError::PostUpdate`](crate::client::DbError).
    async fn update(&self, id: Id<PostMarker>, update: PostUpdate<'_>) -> Result<Option<Post>>;

    async fn remove(&self, id: Id<PostMarker>) -> Result<Option<Post>>;
}
