use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
};

use super::Message;
use crate::{
    error::AppError,
    middleware::AuthUser,
    models::{Comment, Like, Post},
    posts::TextInput,
    state::AppState,
    utils::{ValidJson, parse_id},
};

pub async fn create_post_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    ValidJson(input): ValidJson<TextInput>,
) -> Result<Json<Post>, AppError> {
    Ok(Json(state.posts.create(user, input.text).await?))
}

pub async fn list_posts_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Post>>, AppError> {
    Ok(Json(state.posts.list().await?))
}

pub async fn get_post_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Post>, AppError> {
    let id = parse_id(&id, AppError::PostNotFound)?;

    Ok(Json(state.posts.get(id).await?))
}

pub async fn delete_post_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Message>, AppError> {
    let id = parse_id(&id, AppError::PostNotFound)?;
    state.engine.delete_post(user, id).await?;

    Ok(Json(Message {
        message: "Post removed",
    }))
}

pub async fn like_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Like>>, AppError> {
    let id = parse_id(&id, AppError::PostNotFound)?;

    Ok(Json(state.engine.like(user, id).await?))
}

pub async fn unlike_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Like>>, AppError> {
    let id = parse_id(&id, AppError::PostNotFound)?;

    Ok(Json(state.engine.unlike(user, id).await?))
}

pub async fn add_comment_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(input): ValidJson<TextInput>,
) -> Result<Json<Vec<Comment>>, AppError> {
    let id = parse_id(&id, AppError::PostNotFound)?;

    Ok(Json(state.engine.add_comment(user, id, input.text).await?))
}

pub async fn remove_comment_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path((id, comment_id)): Path<(String, String)>,
) -> Result<Json<Vec<Comment>>, AppError> {
    let id = parse_id(&id, AppError::PostNotFound)?;
    let comment_id = parse_id(&comment_id, AppError::CommentNotFound)?;

    Ok(Json(state.engine.remove_comment(user, id, comment_id).await?))
}
