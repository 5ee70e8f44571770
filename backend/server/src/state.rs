use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use super::{
    accounts::Accounts,
    auth::TokenIssuer,
    config::{Config, StoreBackend},
    database::RedisStore,
    engine::Engine,
    github::{GithubRepos, RepoLookup},
    memory::MemoryStore,
    posts::Posts,
    profiles::Profiles,
    store::DocumentStore,
};

pub struct AppState {
    pub config: Config,
    pub tokens: TokenIssuer,
    pub accounts: Accounts,
    pub profiles: Profiles,
    pub posts: Posts,
    pub engine: Engine,
    pub repos: Arc<dyn RepoLookup>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let store: Arc<dyn DocumentStore> = match config.store_backend {
            StoreBackend::Memory => {
                info!("Using in-memory store");
                Arc::new(MemoryStore::new())
            }
            StoreBackend::Redis => {
                info!("Connecting to Redis...");
                Arc::new(RedisStore::connect(&config.redis_url).await?)
            }
        };

        let repos = Arc::new(GithubRepos::new(&config));

        Self::with_parts(config, store, repos)
    }

    /// One store handle shared by every service.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn DocumentStore>,
        repos: Arc<dyn RepoLookup>,
    ) -> Result<Arc<Self>> {
        let tokens = TokenIssuer::new(config.token_secret.as_bytes(), config.token_ttl_secs)?;

        Ok(Arc::new(Self {
            accounts: Accounts::new(store.clone(), tokens.clone(), config.hash_cost),
            profiles: Profiles::new(store.clone()),
            posts: Posts::new(store.clone()),
            engine: Engine::new(store, config.like_mode),
            tokens,
            repos,
            config,
        }))
    }
}
