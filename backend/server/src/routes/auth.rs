use std::sync::Arc;

use axum::{Extension, Json, extract::State};

use super::TokenBody;
use crate::{
    accounts::{Login, Registration},
    error::AppError,
    middleware::AuthUser,
    models::PublicUser,
    state::AppState,
    utils::ValidJson,
};

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    ValidJson(registration): ValidJson<Registration>,
) -> Result<Json<TokenBody>, AppError> {
    let token = state.accounts.register(registration).await?;

    Ok(Json(TokenBody { token }))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ValidJson(login): ValidJson<Login>,
) -> Result<Json<TokenBody>, AppError> {
    let token = state.accounts.login(login).await?;

    Ok(Json(TokenBody { token }))
}

pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(state.accounts.current_user(user).await?))
}
