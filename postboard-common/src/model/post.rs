use crate::model::{
    Id,
    user::{User, UserMarker, Username},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

/// Comment ids are chosen by clients and compared as plain strings. Ids the server hands out
/// are rendered snowflakes.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CommentId(String);

impl CommentId {
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Id<CommentMarker>> for CommentId {
    fn from(id: Id<CommentMarker>) -> Self {
        Self(id.to_string())
    }
}

/// Why a post refused a change. A refused change leaves the post untouched.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum PostUpdateError {
    #[error("Cannot like a post that is already liked.")]
    AlreadyLiked,
    #[error("Cannot decrement like less than 0.")]
    NoLikes,
    #[error("Cannot dislike a post that is not liked.")]
    NotLiked,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: Id<PostMarker>,
    pub user_id: Id<UserMarker>,
    pub username: Username,
    #[serde(flatten)]
    pub content: PostContent,
    pub likes: Likes,
    pub comments: Vec<Comment>,
    pub bookmarked: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The free-form part of a post. Absent fields are left out of the JSON entirely.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct PostContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

/// A shallow patch: every field that is present replaces the stored one.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct EditPost {
    #[serde(flatten)]
    pub content: PostContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarked: Option<bool>,
}

/// `like_count` always equals `liked_by.len()`, and no user is in both lists.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Likes {
    pub like_count: u64,
    pub liked_by: Vec<Id<UserMarker>>,
    pub disliked_by: Vec<Id<UserMarker>>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: CommentId,
    pub content: String,
    pub user_id: Id<UserMarker>,
    pub username: Username,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A comment as clients send it. Without an id it is always a new comment.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct CommentInput {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CommentId>,
    pub content: String,
}

impl PostContent {
    pub fn merge(&mut self, patch: PostContent) {
        let PostContent {
            title,
            description,
            banner,
        } = patch;

        if title.is_some() {
            self.title = title;
        }
        if description.is_some() {
            self.description = description;
        }
        if banner.is_some() {
            self.banner = banner;
        }
    }
}

impl Likes {
    pub fn like(&mut self, user: Id<UserMarker>) -> Result<(), PostUpdateError> {
        if self.liked_by.contains(&user) {
            return Err(PostUpdateError::AlreadyLiked);
        }

        self.like_count += 1;
        self.liked_by.push(user);
        self.disliked_by.retain(|disliker| *disliker != user);
        Ok(())
    }

    pub fn dislike(&mut self, user: Id<UserMarker>) -> Result<(), PostUpdateError> {
        if self.like_count == 0 {
            return Err(PostUpdateError::NoLikes);
        }
        if !self.liked_by.contains(&user) {
            return Err(PostUpdateError::NotLiked);
        }

        self.like_count -= 1;
        self.liked_by.retain(|liker| *liker != user);
        if !self.disliked_by.contains(&user) {
            self.disliked_by.push(user);
        }
        Ok(())
    }
}

impl Post {
    #[must_use]
    pub fn new(
        id: Id<PostMarker>,
        author: &User,
        content: PostContent,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            user_id: author.id,
            username: author.username.clone(),
            content,
            likes: Likes::default(),
            comments: Vec::new(),
            bookmarked: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn edit(&mut self, edit: EditPost, now: OffsetDateTime) {
        self.content.merge(edit.content);
        if let Some(bookmarked) = edit.bookmarked {
            self.bookmarked = bookmarked;
        }
        self.updated_at = now;
    }

    pub fn like(
        &mut self,
        user: Id<UserMarker>,
        now: OffsetDateTime,
    ) -> Result<(), PostUpdateError> {
        self.likes.like(user)?;
        self.updated_at = now;
        Ok(())
    }

    pub fn dislike(
        &mut self,
        user: Id<UserMarker>,
        now: OffsetDateTime,
    ) -> Result<(), PostUpdateError> {
        self.likes.dislike(user)?;
        self.updated_at = now;
        Ok(())
    }

    /// Replaces the content of the comment with `id` in place, or appends a new comment by
    /// `author` if there is none. Returns whether a comment was appended.
    pub fn upsert_comment(
        &mut self,
        id: CommentId,
        content: String,
        author: &User,
        now: OffsetDateTime,
    ) -> bool {
        self.updated_at = now;

        if let Some(existing) = self.comments.iter_mut().find(|comment| comment.id == id) {
            existing.content = content;
            existing.updated_at = now;
            return false;
        }

        self.comments.push(Comment {
            id,
            content,
            user_id: author.id,
            username: author.username.clone(),
            created_at: now,
            updated_at: now,
        });
        true
    }

    /// Returns whether a comment was removed.
    pub fn remove_comment(&mut self, id: &CommentId, now: OffsetDateTime) -> bool {
        let before = self.comments.len();
        self.comments.retain(|comment| comment.id != *id);

        let removed = self.comments.len() != before;
        if removed {
            self.updated_at = now;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        post::{
            CommentId, CommentInput, CommentMarker, EditPost, Post, PostContent, PostUpdateError,
        },
        user::{User, Username},
    };
    use serde_json::json;
    use time::{Duration, OffsetDateTime, macros::datetime};

    const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

    fn user(id: u64, name: &str) -> User {
        User {
            id: Id::from(id),
            username: Username::new(name.to_owned()).unwrap(),
        }
    }

    fn post() -> Post {
        let content = PostContent {
            title: Some("hi".to_owned()),
            ..PostContent::default()
        };
        Post::new(Id::from(1_u64), &user(7, "u1"), content, NOW)
    }

    #[test]
    fn new_post_json() {
        let value = serde_json::to_value(post()).unwrap();

        assert_eq!(
            value,
            json!({
                "_id": "1",
                "userId": "7",
                "username": "u1",
                "title": "hi",
                "likes": { "likeCount": 0, "likedBy": [], "dislikedBy": [] },
                "comments": [],
                "bookmarked": false,
                "createdAt": "2025-06-01T12:00:00Z",
                "updatedAt": "2025-06-01T12:00:00Z",
            })
        );

        let parsed: Post = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, post());
    }

    #[test]
    fn like_then_dislike() {
        let mut post = post();
        let liker = Id::from(2_u64);

        post.like(liker, NOW).unwrap();
        assert_eq!(post.likes.like_count, 1);
        assert_eq!(post.likes.liked_by, [liker]);

        assert_eq!(post.like(liker, NOW), Err(PostUpdateError::AlreadyLiked));
        assert_eq!(post.likes.like_count, 1);

        post.dislike(liker, NOW + Duration::minutes(1)).unwrap();
        assert_eq!(post.likes.like_count, 0);
        assert!(post.likes.liked_by.is_empty());
        assert_eq!(post.likes.disliked_by, [liker]);
        assert_eq!(post.updated_at, NOW + Duration::minutes(1));
    }

    #[test]
    fn dislike_rules() {
        let mut post = post();
        let first = Id::from(2_u64);
        let second = Id::from(3_u64);

        assert_eq!(post.dislike(first, NOW), Err(PostUpdateError::NoLikes));

        post.like(first, NOW).unwrap();
        assert_eq!(post.dislike(second, NOW), Err(PostUpdateError::NotLiked));
        assert_eq!(post.likes.like_count, 1);

        post.dislike(first, NOW).unwrap();
        post.like(first, NOW).unwrap();
        assert!(post.likes.disliked_by.is_empty());
        post.dislike(first, NOW).unwrap();
        assert_eq!(post.likes.disliked_by, [first]);
    }

    #[test]
    fn comments_upsert_in_place() {
        let mut post = post();
        let author = user(7, "u1");
        let generated = CommentId::from(Id::<CommentMarker>::from(10_u64));
        let chosen = CommentId::new("c1".to_owned());

        assert!(post.upsert_comment(generated.clone(), "first".to_owned(), &author, NOW));
        assert!(post.upsert_comment(chosen.clone(), "second".to_owned(), &author, NOW));
        assert!(!post.upsert_comment(generated.clone(), "edited".to_owned(), &author, NOW));

        let contents: Vec<_> = post.comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, ["edited", "second"]);

        assert!(post.remove_comment(&generated, NOW));
        assert!(!post.remove_comment(&generated, NOW));
        assert_eq!(post.comments.len(), 1);
        assert_eq!(post.comments[0].id.get(), "c1");
    }

    #[test]
    fn comment_ids_are_opaque_strings() {
        let input: CommentInput =
            serde_json::from_value(json!({ "_id": "c1", "content": "hi" })).unwrap();
        assert_eq!(input.id, Some(CommentId::new("c1".to_owned())));

        let generated = CommentId::from(Id::<CommentMarker>::from(42_u64));
        assert_eq!(serde_json::to_value(&generated).unwrap(), json!("42"));
    }

    #[test]
    fn edit_is_shallow() {
        let mut post = post();
        let edit: EditPost =
            serde_json::from_value(json!({ "description": "more", "bookmarked": true })).unwrap();

        post.edit(edit, NOW);

        assert_eq!(post.content.title.as_deref(), Some("hi"));
        assert_eq!(post.content.description.as_deref(), Some("more"));
        assert!(post.bookmarked);
    }
}
