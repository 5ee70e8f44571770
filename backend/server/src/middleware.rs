use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub const AUTH_HEADER: &str = "x-auth-token";

/// Identity resolved from a verified token. Only [`require_auth`] inserts it,
/// so a handler extracting it never sees client-supplied identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub Uuid);

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTH_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|token| !token.is_empty())
        .ok_or(AppError::Unauthenticated(
            "Provide a token. Authorization Denied",
        ))?;

    let user = state.tokens.verify(token).map_err(|e| {
        debug!("Rejected token: {e}");
        AppError::Unauthenticated("Token is not valid")
    })?;

    request.extensions_mut().insert(AuthUser(user));

    Ok(next.run(request).await)
}
