//! Profile reads and the create-or-update write.
//!
//! Reads join each profile with its owner's name and avatar. A profile whose
//! owner record is gone is treated as absent.
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{Profile, ProfileView, Social, User, UserSummary},
    store::{Collection, DocumentStore, Filter, to_object},
    utils::{non_empty, split_skills},
};

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProfileInput {
    #[serde(default)]
    #[validate(length(min = 1, message = "Status is required"))]
    pub status: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Skills is required"))]
    pub skills: String,
    pub company: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub githubusername: Option<String>,
    pub youtube: Option<String>,
    pub twitter: Option<String>,
    pub facebook: Option<String>,
    pub linkedin: Option<String>,
    pub instagram: Option<String>,
}

/// Fields set on every upsert. Absent optionals leave the stored value alone.
#[derive(Serialize)]
struct ProfilePatch {
    user: Uuid,
    status: String,
    skills: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    githubusername: Option<String>,
    social: Social,
}

impl ProfilePatch {
    fn new(user: Uuid, input: ProfileInput) -> Self {
        Self {
            user,
            status: input.status,
            skills: split_skills(&input.skills),
            company: non_empty(input.company),
            website: non_empty(input.website),
            location: non_empty(input.location),
            bio: non_empty(input.bio),
            githubusername: non_empty(input.githubusername),
            social: Social {
                youtube: non_empty(input.youtube),
                twitter: non_empty(input.twitter),
                facebook: non_empty(input.facebook),
                linkedin: non_empty(input.linkedin),
                instagram: non_empty(input.instagram),
            },
        }
    }
}

#[derive(Clone)]
pub struct Profiles {
    users: Collection<User>,
    profiles: Collection<Profile>,
}

impl Profiles {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            users: Collection::new(store.clone()),
            profiles: Collection::new(store),
        }
    }

    pub async fn get_own(&self, user: Uuid) -> Result<ProfileView, AppError> {
        self.get_by_user(user).await
    }

    pub async fn get_by_user(&self, user: Uuid) -> Result<ProfileView, AppError> {
        let profile = self
            .profiles
            .find_one(&Filter::eq("user", user.to_string()))
            .await?
            .ok_or(AppError::ProfileNotFound)?;

        self.view(profile).await?.ok_or(AppError::ProfileNotFound)
    }

    /// Oldest first.
    pub async fn list(&self) -> Result<Vec<ProfileView>, AppError> {
        let mut profiles = self.profiles.find(&Filter::all()).await?;
        profiles.sort_by_key(|profile| profile.date);

        let mut views = Vec::with_capacity(profiles.len());
        for profile in profiles {
            if let Some(view) = self.view(profile).await? {
                views.push(view);
            }
        }

        Ok(views)
    }

    /// Create-or-update keyed by owner. Experience and education survive an
    /// update untouched.
    pub async fn upsert(&self, user: Uuid, input: ProfileInput) -> Result<ProfileView, AppError> {
        let defaults = to_object(&json!({
            "_id": Uuid::new_v4(),
            "experience": [],
            "education": [],
            "date": Utc::now(),
        }))?;

        let profile = self
            .profiles
            .find_one_and_update(
                &Filter::eq("user", user.to_string()),
                &ProfilePatch::new(user, input),
                Some(defaults),
            )
            .await?
            .ok_or(AppError::ProfileNotFound)?;

        self.view(profile).await?.ok_or(AppError::UserNotFound)
    }

    pub async fn view(&self, profile: Profile) -> Result<Option<ProfileView>, AppError> {
        Ok(self
            .users
            .find_by_id(profile.user)
            .await?
            .map(|owner| ProfileView::new(profile, UserSummary::from(&owner))))
    }
}
