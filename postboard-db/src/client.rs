use crate::{
    memory::MemoryPostStore,
    store::{PostStore, PostUpdate},
};
use postboard_common::{
    model::{
        Id, PostboardSnowflakeGenerator,
        auth::{AuthTokenHash, Authentication},
        post::{
            CommentId, CommentInput, CommentMarker, EditPost, Post, PostContent, PostMarker,
            PostUpdateError,
        },
        user::{CreateUser, User, UserMarker, Username},
    },
    snowflake::{ProcessId, SnowflakeTimestampError, WorkerId},
};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    PostUpdate(#[from] PostUpdateError),
    #[error("Generating an id failed: {0}")]
    IdGeneration(#[from] SnowflakeTimestampError),
    #[error("The username {0} is already taken")]
    UsernameTaken(Username),
    #[error("A post with id {0} already exists")]
    DuplicatePost(Id<PostMarker>),
}

/// Everything the handlers read and write: posts (through a [`PostStore`]), users, sessions
/// and id generation.
#[derive(Debug)]
pub struct DbClient {
    posts: Arc<dyn PostStore>,
    users: RwLock<HashMap<Id<UserMarker>, User>>,
    authentications: RwLock<HashMap<AuthTokenHash, Authentication>>,
    snowflake_generator: Mutex<PostboardSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(posts: Arc<dyn PostStore>, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator =
            Mutex::new(PostboardSnowflakeGenerator::new(worker_id, process_id));

        Self {
            posts,
            users: RwLock::default(),
            authentications: RwLock::default(),
            snowflake_generator,
        }
    }

    #[must_use]
    pub fn in_memory(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self::new(Arc::new(MemoryPostStore::new()), worker_id, process_id)
    }

    async fn generate_id<Marker>(&self) -> Result<Id<Marker>> {
        let snowflake = self.snowflake_generator.lock().await.generate()?;
        Ok(snowflake.into())
    }

    pub async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let id = self.generate_id().await?;

        let mut users = self.users.write().await;
        if users
            .values()
            .any(|existing| existing.username == user.username)
        {
            return Err(DbError::UsernameTaken(user.username.clone()));
        }

        let user = User {
            id,
            username: user.username.clone(),
        };
        users.insert(id, user.clone());
        debug!(user_id = %id, username = user.username.get(), "Created user");

        Ok(user)
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    pub async fn create_authentication(&self, authentication: Authentication) -> Result<()> {
        self.authentications
            .write()
            .await
            .insert(authentication.token_hash.clone(), authentication);
        Ok(())
    }

    pub async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        Ok(self.authentications.read().await.get(token_hash).cloned())
    }

    pub async fn fetch_posts(&self) -> Result<Vec<Post>> {
        self.posts.list().await
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        self.posts.get(post_id).await
    }

    /// Returns `None` if the user does not exist.
    pub async fn fetch_user_posts(&self, user_id: Id<UserMarker>) -> Result<Option<Vec<Post>>> {
        if self.fetch_user(user_id).await?.is_none() {
            return Ok(None);
        }

        let mut posts = self.posts.list().await?;
        posts.retain(|post| post.user_id == user_id);
        Ok(Some(posts))
    }

    pub async fn create_post(&self, content: PostContent, author: &User) -> Result<Post> {
        let id = self.generate_id().await?;
        let post = Post::new(id, author, content, OffsetDateTime::now_utc());

        self.posts.insert(post.clone()).await?;
        debug!(post_id = %id, user_id = %author.id, "Created post");

        Ok(post)
    }

    pub async fn edit_post(
        &self,
        post_id: Id<PostMarker>,
        edit: EditPost,
    ) -> Result<Option<Post>> {
        self.update_post(
            post_id,
            Box::new(move |post: &mut Post| {
                post.edit(edit, OffsetDateTime::now_utc());
                Ok(())
            }),
        )
        .await
    }

    pub async fn like_post(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<Option<Post>> {
        self.update_post(
            post_id,
            Box::new(move |post: &mut Post| post.like(user_id, OffsetDateTime::now_utc())),
        )
        .await
    }

    pub async fn dislike_post(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<Option<Post>> {
        self.update_post(
            post_id,
            Box::new(move |post: &mut Post| post.dislike(user_id, OffsetDateTime::now_utc())),
        )
        .await
    }

    pub async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let removed = self.posts.remove(post_id).await?;
        if removed.is_some() {
            debug!(%post_id, "Deleted post");
        }
        Ok(removed)
    }

    /// Adds `comment` to the post, or replaces the content of the comment with the same id.
    pub async fn upsert_comment(
        &self,
        post_id: Id<PostMarker>,
        comment: CommentInput,
        author: &User,
    ) -> Result<Option<Post>> {
        let comment_id = match comment.id {
            Some(id) => id,
            None => CommentId::from(self.generate_id::<CommentMarker>().await?),
        };

        self.update_post(
            post_id,
            Box::new(move |post: &mut Post| {
                post.upsert_comment(
                    comment_id,
                    comment.content,
                    author,
                    OffsetDateTime::now_utc(),
                );
                Ok(())
            }),
        )
        .await
    }

    pub async fn delete_comment(
        &self,
        post_id: Id<PostMarker>,
        comment_id: CommentId,
    ) -> Result<Option<Post>> {
        debug!(%post_id, comment_id = comment_id.get(), "Removing comment");
        self.update_post(
            post_id,
            Box::new(move |post: &mut Post| {
                post.remove_comment(&comment_id, OffsetDateTime::now_utc());
                Ok(())
            }),
        )
        .await
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        update: PostUpdate<'_>,
    ) -> Result<Option<Post>> {
        let result = self.posts.update(post_id, update).await;
        if let Err(DbError::PostUpdate(reason)) = &result {
            debug!(%post_id, %reason, "Post update was refused");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::client::{DbClient, DbError};
    use postboard_common::{
        model::{
            Id,
            post::{CommentInput, EditPost, PostContent, PostUpdateError},
            user::{CreateUser, User, Username},
        },
        snowflake::{ProcessId, WorkerId},
    };

    fn client() -> DbClient {
        DbClient::in_memory(WorkerId::new(1).unwrap(), ProcessId::new(1).unwrap())
    }

    async fn user(db: &DbClient, name: &str) -> User {
        db.create_user(&CreateUser {
            username: Username::new(name.to_owned()).unwrap(),
        })
        .await
        .unwrap()
    }

    fn titled(title: &str) -> PostContent {
        PostContent {
            title: Some(title.to_owned()),
            ..PostContent::default()
        }
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let db = client();
        let first = user(&db, "u1").await;

        let duplicate = db
            .create_user(&CreateUser {
                username: first.username.clone(),
            })
            .await;
        assert!(matches!(duplicate, Err(DbError::UsernameTaken(_))));
        assert_eq!(db.fetch_user(first.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn created_post_starts_empty() {
        let db = client();
        let author = user(&db, "u1").await;

        let post = db.create_post(titled("hi"), &author).await.unwrap();
        let fetched = db.fetch_post(post.id).await.unwrap().unwrap();

        assert_eq!(fetched.content.title.as_deref(), Some("hi"));
        assert_eq!(fetched.user_id, author.id);
        assert_eq!(fetched.likes.like_count, 0);
        assert!(fetched.likes.liked_by.is_empty());
        assert!(fetched.comments.is_empty());
        assert!(!fetched.bookmarked);
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let db = client();
        let author = user(&db, "u1").await;

        let first = db.create_post(titled("a"), &author).await.unwrap();
        db.delete_post(first.id).await.unwrap();
        let second = db.create_post(titled("b"), &author).await.unwrap();

        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn double_like_is_refused() {
        let db = client();
        let author = user(&db, "u1").await;
        let post = db.create_post(titled("hi"), &author).await.unwrap();

        db.like_post(post.id, author.id).await.unwrap();
        let second = db.like_post(post.id, author.id).await;

        assert!(matches!(
            second,
            Err(DbError::PostUpdate(PostUpdateError::AlreadyLiked))
        ));
        let stored = db.fetch_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.likes.like_count, 1);
    }

    #[tokio::test]
    async fn missing_posts() {
        let db = client();
        let author = user(&db, "u1").await;
        let missing = Id::from(12_345_u64);

        assert!(db.fetch_post(missing).await.unwrap().is_none());
        assert!(db.like_post(missing, author.id).await.unwrap().is_none());
        assert!(
            db.edit_post(missing, EditPost::default())
                .await
                .unwrap()
                .is_none()
        );
        assert!(db.delete_post(missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn user_posts_filter_by_owner() {
        let db = client();
        let first = user(&db, "u1").await;
        let second = user(&db, "u2").await;

        db.create_post(titled("one"), &first).await.unwrap();
        db.create_post(titled("two"), &second).await.unwrap();
        db.create_post(titled("three"), &first).await.unwrap();

        let titles: Vec<_> = db
            .fetch_user_posts(first.id)
            .await
            .unwrap()
            .unwrap()
            .into_iter()
            .filter_map(|post| post.content.title)
            .collect();
        assert_eq!(titles, ["one", "three"]);

        assert!(
            db.fetch_user_posts(Id::from(1_u64))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn comments_get_ids() {
        let db = client();
        let author = user(&db, "u1").await;
        let post = db.create_post(titled("hi"), &author).await.unwrap();

        let commented = db
            .upsert_comment(
                post.id,
                CommentInput {
                    id: None,
                    content: "nice".to_owned(),
                },
                &author,
            )
            .await
            .unwrap()
            .unwrap();
        let comment = &commented.comments[0];
        assert_eq!(comment.username, author.username);

        let edited = db
            .upsert_comment(
                post.id,
                CommentInput {
                    id: Some(comment.id.clone()),
                    content: "very nice".to_owned(),
                },
                &author,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edited.comments.len(), 1);
        assert_eq!(edited.comments[0].content, "very nice");

        let cleared = db
            .delete_comment(post.id, comment.id.clone())
            .await
            .unwrap()
            .unwrap();
        assert!(cleared.comments.is_empty());
    }
}
