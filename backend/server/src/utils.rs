use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, FieldError};

/// JSON body that has been deserialized and validated. Both failures surface
/// as a 400 with field detail.
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state)
            .await
            .map_err(|rejection| AppError::Validation(vec![FieldError::new(None, rejection.body_text())]))?;

        value.validate()?;

        Ok(Self(value))
    }
}

/// Path ids that are not well formed cannot name anything that exists.
pub fn parse_id(raw: &str, not_found: AppError) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| not_found)
}

pub fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());

    format!("//www.gravatar.com/avatar/{digest:x}?s=200&r=pg&d=mm")
}

pub fn split_skills(skills: &str) -> Vec<String> {
    skills
        .split(',')
        .map(str::trim)
        .filter(|skill| !skill.is_empty())
        .map(str::to_string)
        .collect()
}

/// Treats empty strings from form fields as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
