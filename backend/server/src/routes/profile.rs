use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::Value;

use super::Message;
use crate::{
    engine::{EducationInput, ExperienceInput},
    error::AppError,
    middleware::AuthUser,
    models::{Profile, ProfileView},
    profiles::ProfileInput,
    state::AppState,
    utils::{ValidJson, parse_id},
};

pub async fn my_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(state.profiles.get_own(user).await?))
}

pub async fn upsert_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    ValidJson(input): ValidJson<ProfileInput>,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(state.profiles.upsert(user, input).await?))
}

pub async fn list_profiles_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProfileView>>, AppError> {
    Ok(Json(state.profiles.list().await?))
}

pub async fn user_profile_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ProfileView>, AppError> {
    let user = parse_id(&user_id, AppError::ProfileNotFound)?;

    Ok(Json(state.profiles.get_by_user(user).await?))
}

pub async fn delete_account_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<Json<Message>, AppError> {
    state.engine.delete_account(user).await?;

    Ok(Json(Message {
        message: "User deleted",
    }))
}

pub async fn add_experience_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    ValidJson(input): ValidJson<ExperienceInput>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(state.engine.add_experience(user, input).await?))
}

pub async fn remove_experience_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(exp_id): Path<String>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(state.engine.remove_experience(user, &exp_id).await?))
}

pub async fn add_education_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    ValidJson(input): ValidJson<EducationInput>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(state.engine.add_education(user, input).await?))
}

pub async fn remove_education_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(edu_id): Path<String>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(state.engine.remove_education(user, &edu_id).await?))
}

pub async fn github_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.repos.repos(&username).await?))
}
