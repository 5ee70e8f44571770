use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{TokenIssuer, hash_password, verify_password},
    error::AppError,
    models::{PublicUser, User},
    store::{Collection, DocumentStore, Filter},
    utils::gravatar_url,
};

#[derive(Debug, Deserialize, Validate)]
pub struct Registration {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "Please include a valid email"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "Please enter a password with 6 or more characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct Login {
    #[serde(default)]
    #[validate(email(message = "Include a valid email"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Clone)]
pub struct Accounts {
    users: Collection<User>,
    tokens: TokenIssuer,
    hash_cost: u32,
}

impl Accounts {
    pub fn new(store: Arc<dyn DocumentStore>, tokens: TokenIssuer, hash_cost: u32) -> Self {
        Self {
            users: Collection::new(store),
            tokens,
            hash_cost,
        }
    }

    pub async fn register(&self, registration: Registration) -> Result<String, AppError> {
        let email = registration.email.trim().to_lowercase();

        if self.users.find_one(&Filter::eq("email", email.as_str())).await?.is_some() {
            return Err(AppError::UserExists);
        }

        let user = User {
            id: Uuid::new_v4(),
            name: registration.name,
            avatar: gravatar_url(&email),
            email,
            password: hash_password(registration.password, self.hash_cost).await?,
            date: Utc::now(),
        };

        self.users.save(&user).await?;
        info!("Registered user {}", user.id);

        Ok(self.tokens.issue(user.id))
    }

    /// Unknown email and wrong password are the same failure.
    pub async fn login(&self, login: Login) -> Result<String, AppError> {
        let email = login.email.trim().to_lowercase();

        let Some(user) = self.users.find_one(&Filter::eq("email", email)).await? else {
            return Err(AppError::InvalidCredentials);
        };

        if !verify_password(login.password, user.password).await {
            return Err(AppError::InvalidCredentials);
        }

        Ok(self.tokens.issue(user.id))
    }

    pub async fn current_user(&self, user: Uuid) -> Result<PublicUser, AppError> {
        self.users
            .find_by_id(user)
            .await?
            .map(PublicUser::from)
            .ok_or(AppError::UserNotFound)
    }
}
