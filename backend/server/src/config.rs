use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// How like/unlike reach the store.
///
/// `FetchThenSave` reads the post, edits the likes in process and writes the
/// whole document back; two concurrent likes from one identity can both pass
/// the duplicate check. `Atomic` hands the check and the edit to the store as
/// one conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeMode {
    FetchThenSave,
    Atomic,
}

impl FromStr for LikeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch-then-save" => Ok(Self::FetchThenSave),
            "atomic" => Ok(Self::Atomic),
            other => Err(format!("unknown like mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub token_secret: String,
    pub token_ttl_secs: u64,
    pub hash_cost: u32,
    pub like_mode: LikeMode,
    pub github_api_url: String,
    pub github_client_id: Option<String>,
    pub github_secret: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let token_secret = read_secret("TOKEN_SECRET")
            .ok_or_else(|| anyhow!("TOKEN_SECRET must be provided as a secret or variable"))?;

        if token_secret.is_empty() {
            return Err(anyhow!("TOKEN_SECRET must not be empty"));
        }

        Ok(Self {
            port: try_load("RUST_PORT", "5000")?,
            store_backend: try_load("STORE_BACKEND", "memory")?,
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
            token_secret,
            token_ttl_secs: try_load("TOKEN_TTL_SECS", "100000")?,
            hash_cost: try_load("BCRYPT_COST", &bcrypt::DEFAULT_COST.to_string())?,
            like_mode: try_load("LIKE_MODE", "fetch-then-save")?,
            github_api_url: try_load("GITHUB_API_URL", "https://api.github.com")?,
            github_client_id: read_secret("GITHUB_CLIENT_ID"),
            github_secret: read_secret("GITHUB_SECRET"),
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("Invalid {key} value"))
}

/// Secrets come from `/run/secrets/<name>` first, then the environment.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
        .or_else(|| env::var(secret_name).ok())
}
