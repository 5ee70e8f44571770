//! # Mutation Engine
//!
//! Ownership-checked edits of posts and profiles. Every operation has the same
//! shape: fetch the parent document, check who is asking, edit one of its
//! lists, persist the whole document.
//!
//! ## Lists
//!
//! | list | edit | refusal |
//! |------|------|---------|
//! | post likes | insert unique by identity | `AlreadyLiked` |
//! | post likes | remove first by identity | `NotLiked` |
//! | post comments | prepend | - |
//! | post comments | remove (author only) | `CommentNotFound`, `Unauthorized` |
//! | profile experience / education | prepend | - |
//! | profile experience / education | remove by id | none, unknown ids are a no-op |
//!
//! ## Races
//!
//! Fetch and persist are separate store calls and nothing locks in between.
//! Two likes from one identity on one post can both pass the duplicate check;
//! whichever save lands last wins. [`LikeMode::Atomic`] moves the like check
//! into the store. Account deletion runs three deletes in sequence with no
//! rollback, so a failure part way leaves the earlier deletes applied.
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::LikeMode,
    error::{AppError, FieldError},
    models::{Comment, Education, Experience, Like, ListEntry, OwnedEntity, Post, Profile, User},
    store::{Collection, DocumentStore, Filter, ListOp, ListUpdate, StoreError},
    utils::non_empty,
};

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ExperienceInput {
    #[serde(default)]
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Company is required"))]
    pub company: String,
    #[validate(required(message = "From date is required"))]
    pub from: Option<NaiveDate>,
    pub location: Option<String>,
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub current: bool,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct EducationInput {
    #[serde(default)]
    #[validate(length(min = 1, message = "School is required"))]
    pub school: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Degree is required"))]
    pub degree: String,
    #[serde(default, rename = "fieldofstudy")]
    #[validate(length(min = 1, message = "Field of study is required"))]
    pub field_of_study: String,
    #[validate(required(message = "From date is required"))]
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub current: bool,
    pub description: Option<String>,
}

/// Fails with `Unauthorized` unless `requester` owns `entity`.
pub fn authorize(entity: &impl OwnedEntity, requester: Uuid) -> Result<(), AppError> {
    if entity.owner() == requester {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

fn missing_from() -> AppError {
    AppError::Validation(vec![FieldError::new(Some("from"), "From date is required")])
}

fn position_of_owner<E: OwnedEntity>(list: &[E], owner: Uuid) -> Option<usize> {
    list.iter().position(|entry| entry.owner() == owner)
}

fn remove_entry<E: ListEntry>(list: &mut Vec<E>, id: Uuid) -> Option<E> {
    list.iter()
        .position(|entry| entry.entry_id() == id)
        .map(|index| list.remove(index))
}

fn decode_list<E: DeserializeOwned>(list: Vec<Value>) -> Result<Vec<E>, AppError> {
    Ok(serde_json::from_value(Value::Array(list)).map_err(StoreError::from)?)
}

#[derive(Clone)]
pub struct Engine {
    users: Collection<User>,
    profiles: Collection<Profile>,
    posts: Collection<Post>,
    like_mode: LikeMode,
}

impl Engine {
    pub fn new(store: Arc<dyn DocumentStore>, like_mode: LikeMode) -> Self {
        Self {
            users: Collection::new(store.clone()),
            profiles: Collection::new(store.clone()),
            posts: Collection::new(store),
            like_mode,
        }
    }

    async fn post(&self, id: Uuid) -> Result<Post, AppError> {
        self.posts
            .find_by_id(id)
            .await?
            .ok_or(AppError::PostNotFound)
    }

    pub async fn like(&self, requester: Uuid, post_id: Uuid) -> Result<Vec<Like>, AppError> {
        match self.like_mode {
            LikeMode::FetchThenSave => {
                let mut post = self.post(post_id).await?;

                if post.liked_by(requester) {
                    return Err(AppError::AlreadyLiked);
                }

                post.likes.insert(0, Like::new(requester));
                self.posts.save(&post).await?;

                Ok(post.likes)
            }
            LikeMode::Atomic => {
                let op = ListOp::PushFrontUnique {
                    key: "user".into(),
                    entry: serde_json::to_value(Like::new(requester)).map_err(StoreError::from)?,
                };

                match self.posts.update_list(post_id, "likes", op).await? {
                    ListUpdate::Applied(likes) => decode_list(likes),
                    ListUpdate::Unchanged => Err(AppError::AlreadyLiked),
                    ListUpdate::Missing => Err(AppError::PostNotFound),
                }
            }
        }
    }

    pub async fn unlike(&self, requester: Uuid, post_id: Uuid) -> Result<Vec<Like>, AppError> {
        match self.like_mode {
            LikeMode::FetchThenSave => {
                let mut post = self.post(post_id).await?;

                let index = position_of_owner(&post.likes, requester).ok_or(AppError::NotLiked)?;
                post.likes.remove(index);
                self.posts.save(&post).await?;

                Ok(post.likes)
            }
            LikeMode::Atomic => {
                let op = ListOp::PullFirst {
                    key: "user".into(),
                    value: Value::from(requester.to_string()),
                };

                match self.posts.update_list(post_id, "likes", op).await? {
                    ListUpdate::Applied(likes) => decode_list(likes),
                    ListUpdate::Unchanged => Err(AppError::NotLiked),
                    ListUpdate::Missing => Err(AppError::PostNotFound),
                }
            }
        }
    }

    /// The comment carries the author's name and avatar as they are now.
    pub async fn add_comment(
        &self,
        requester: Uuid,
        post_id: Uuid,
        text: String,
    ) -> Result<Vec<Comment>, AppError> {
        let mut post = self.post(post_id).await?;

        let author = self
            .users
            .find_by_id(requester)
            .await?
            .ok_or(AppError::UserNotFound)?;

        post.comments.insert(
            0,
            Comment {
                id: Uuid::new_v4(),
                user: requester,
                text,
                name: author.name,
                avatar: author.avatar,
                date: Utc::now(),
            },
        );
        self.posts.save(&post).await?;

        Ok(post.comments)
    }

    /// Only the comment's author may remove it. The entry removed is the
    /// requester's most recent comment on the post, which is `comment_id`
    /// only when that comment is also their latest one.
    pub async fn remove_comment(
        &self,
        requester: Uuid,
        post_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Vec<Comment>, AppError> {
        let mut post = self.post(post_id).await?;

        let comment = post
            .comments
            .iter()
            .find(|comment| comment.entry_id() == comment_id)
            .ok_or(AppError::CommentNotFound)?;

        authorize(comment, requester)?;

        if let Some(index) = position_of_owner(&post.comments, requester) {
            post.comments.remove(index);
        }
        self.posts.save(&post).await?;

        Ok(post.comments)
    }

    pub async fn delete_post(&self, requester: Uuid, post_id: Uuid) -> Result<(), AppError> {
        let post = self.post(post_id).await?;

        authorize(&post, requester)?;

        self.posts.find_one_and_remove(&Filter::by_id(post.id)).await?;
        info!("User {requester} removed post {post_id}");

        Ok(())
    }

    /// Posts, then profile, then the identity itself.
    pub async fn delete_account(&self, requester: Uuid) -> Result<(), AppError> {
        let posts = self
            .posts
            .delete_many(&Filter::eq("user", requester.to_string()))
            .await?;
        self.profiles
            .find_one_and_remove(&Filter::eq("user", requester.to_string()))
            .await?;
        self.users.find_one_and_remove(&Filter::by_id(requester)).await?;

        info!("Deleted account {requester} with {posts} posts");

        Ok(())
    }

    /// Loads the requester's own profile, applies `edit`, persists. The lookup
    /// is keyed by the requester, so the owner check cannot fail in practice.
    async fn edit_profile(
        &self,
        requester: Uuid,
        edit: impl FnOnce(&mut Profile),
    ) -> Result<Profile, AppError> {
        let mut profile = self
            .profiles
            .find_one(&Filter::eq("user", requester.to_string()))
            .await?
            .ok_or(AppError::ProfileNotFound)?;

        authorize(&profile, requester)?;

        edit(&mut profile);
        self.profiles.save(&profile).await?;

        Ok(profile)
    }

    pub async fn add_experience(&self, requester: Uuid, input: ExperienceInput) -> Result<Profile, AppError> {
        let from = input.from.ok_or_else(missing_from)?;

        let experience = Experience {
            id: Uuid::new_v4(),
            title: input.title,
            company: input.company,
            location: non_empty(input.location),
            from,
            to: input.to,
            current: input.current,
            description: non_empty(input.description),
        };

        self.edit_profile(requester, |profile| profile.experience.insert(0, experience))
            .await
    }

    /// Unknown or malformed ids leave the profile as it was.
    pub async fn remove_experience(&self, requester: Uuid, exp_id: &str) -> Result<Profile, AppError> {
        let id = Uuid::parse_str(exp_id).ok();

        self.edit_profile(requester, |profile| {
            if let Some(id) = id {
                remove_entry(&mut profile.experience, id);
            }
        })
        .await
    }

    pub async fn add_education(&self, requester: Uuid, input: EducationInput) -> Result<Profile, AppError> {
        let from = input.from.ok_or_else(missing_from)?;

        let education = Education {
            id: Uuid::new_v4(),
            school: input.school,
            degree: input.degree,
            field_of_study: input.field_of_study,
            from,
            to: input.to,
            current: input.current,
            description: non_empty(input.description),
        };

        self.edit_profile(requester, |profile| profile.education.insert(0, education))
            .await
    }

    /// Unknown or malformed ids leave the profile as it was.
    pub async fn remove_education(&self, requester: Uuid, edu_id: &str) -> Result<Profile, AppError> {
        let id = Uuid::parse_str(edu_id).ok();

        self.edit_profile(requester, |profile| {
            if let Some(id) = id {
                remove_entry(&mut profile.education, id);
            }
        })
        .await
    }
}
