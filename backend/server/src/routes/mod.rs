pub mod auth;
pub mod posts;
pub mod profile;

use serde::Serialize;

#[derive(Serialize)]
pub struct Message {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct TokenBody {
    pub token: String,
}
