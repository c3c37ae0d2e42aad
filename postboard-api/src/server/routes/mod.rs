use crate::server::{Result, ServerRouter};
use postboard_common::model::post::Post;
use postboard_db::client::DbClient;
use serde::{Deserialize, Serialize};

mod accounts;
mod comments;
mod posts;
mod users;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(posts::routes())
        .merge(comments::routes())
        .merge(users::routes())
        .merge(accounts::routes())
}

/// Every mutation answers with the whole collection, so clients can replace their copy.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct PostsBody {
    pub posts: Vec<Post>,
}

impl PostsBody {
    pub async fn all(db: &DbClient) -> Result<Self> {
        let posts = db.fetch_posts().await?;
        Ok(Self { posts })
    }
}
