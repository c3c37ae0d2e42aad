use crate::{
    client::{DbError, Result},
    store::{PostStore, PostUpdate},
};
use async_trait::async_trait;
use postboard_common::model::{
    Id,
    post::{Post, PostMarker},
};
use tokio::sync::RwLock;

/// Keeps every post in memory, in insertion order. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryPostStore {
    posts: RwLock<Vec<Post>>,
}

impl MemoryPostStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn list(&self) -> Result<Vec<Post>> {
        Ok(self.posts.read().await.clone())
    }

    async fn get(&self, id: Id<PostMarker>) -> Result<Option<Post>> {
        let posts = self.posts.read().await;
        Ok(posts.iter().find(|post| post.id == id).cloned())
    }

    async fn insert(&self, post: Post) -> Result<()> {
        let mut posts = self.posts.write().await;
        if posts.iter().any(|existing| existing.id == post.id) {
            return Err(DbError::DuplicatePost(post.id));
        }

        posts.push(post);
        Ok(())
    }

    async fn update(&self, id: Id<PostMarker>, update: PostUpdate<'_>) -> Result<Option<Post>> {
        let mut posts = self.posts.write().await;
        let Some(stored) = posts.iter_mut().find(|post| post.id == id) else {
            return Ok(None);
        };

        let mut updated = stored.clone();
        update(&mut updated)?;
        stored.clone_from(&updated);

        Ok(Some(updated))
    }

    async fn remove(&self, id: Id<PostMarker>) -> Result<Option<Post>> {
        let mut posts = self.posts.write().await;
        let removed = posts
            .iter()
            .position(|post| post.id == id)
            .map(|index| posts.remove(index));

        Ok(removed)
    }
}
