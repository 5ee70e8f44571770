use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{Post, User},
    store::{Collection, DocumentStore, Filter},
};

/// Body of a new post or comment.
#[derive(Debug, Deserialize, Validate)]
pub struct TextInput {
    #[serde(default)]
    #[validate(length(min = 1, message = "Text is required"))]
    pub text: String,
}

#[derive(Clone)]
pub struct Posts {
    users: Collection<User>,
    posts: Collection<Post>,
}

impl Posts {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            users: Collection::new(store.clone()),
            posts: Collection::new(store),
        }
    }

    /// Author name and avatar are copied onto the post and not kept in sync.
    pub async fn create(&self, author: Uuid, text: String) -> Result<Post, AppError> {
        let user = self
            .users
            .find_by_id(author)
            .await?
            .ok_or(AppError::UserNotFound)?;

        let post = Post {
            id: Uuid::new_v4(),
            user: author,
            text,
            name: user.name,
            avatar: user.avatar,
            likes: Vec::new(),
            comments: Vec::new(),
            date: Utc::now(),
        };

        self.posts.save(&post).await?;

        Ok(post)
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<Post>, AppError> {
        let mut posts = self.posts.find(&Filter::all()).await?;
        posts.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(posts)
    }

    pub async fn get(&self, id: Uuid) -> Result<Post, AppError> {
        self.posts
            .find_by_id(id)
            .await?
            .ok_or(AppError::PostNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    async fn setup() -> (Posts, Collection<User>, User) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let users = Collection::<User>::new(store.clone());

        let user = User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            avatar: "old-avatar".into(),
            password: "hash".into(),
            date: Utc::now(),
        };
        users.save(&user).await.unwrap();

        (Posts::new(store), users, user)
    }

    #[tokio::test]
    async fn test_create_snapshots_author() {
        let (posts, users, mut user) = setup().await;

        let post = posts.create(user.id, "hello".into()).await.unwrap();

        user.avatar = "new-avatar".into();
        users.save(&user).await.unwrap();

        let stored = posts.get(post.id).await.unwrap();
        assert_eq!(stored.text, "hello");
        assert_eq!(stored.name, "Ada");
        assert_eq!(stored.avatar, "old-avatar");
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let (posts, _, user) = setup().await;

        let first = posts.create(user.id, "one".into()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = posts.create(user.id, "two".into()).await.unwrap();

        let ids: Vec<_> = posts.list().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (posts, _, _) = setup().await;

        assert!(matches!(posts.get(Uuid::new_v4()).await, Err(AppError::PostNotFound)));
    }

    #[test]
    fn test_text_required() {
        assert!(TextInput { text: String::new() }.validate().is_err());
        assert!(TextInput { text: "hi".into() }.validate().is_ok());
    }
}
