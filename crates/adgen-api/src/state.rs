//! Application state.

use std::sync::Arc;

use tracing::warn;

use adgen_providers::{LumaClient, SunoClient};
use adgen_queue::{JobQueue, ProgressChannel, StatusStore};
use adgen_storage::{AssetLibrary, SessionStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: Arc<JobQueue>,
    pub status: StatusStore,
    pub progress: Arc<ProgressChannel>,
    pub sessions: SessionStore,
    pub library: AssetLibrary,
    pub suno: Arc<SunoClient>,
    /// Present only when LUMA_API_KEY is configured; the generation
    /// listing passthrough degrades to 503 without it.
    pub luma: Option<Arc<LumaClient>>,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let sessions = SessionStore::new(&config.data_dir);
        tokio::fs::create_dir_all(sessions.root()).await?;
        let library = AssetLibrary::new(&config.data_dir);

        let queue = JobQueue::from_env()?;
        queue.init().await?;
        let status = queue.status().clone();
        let progress = ProgressChannel::new(&config.redis_url)?;

        let suno = SunoClient::from_env();
        let luma = match LumaClient::from_env() {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("Luma passthrough disabled: {}", e);
                None
            }
        };

        Ok(Self {
            config,
            queue: Arc::new(queue),
            status,
            progress: Arc::new(progress),
            sessions,
            library,
            suno: Arc::new(suno),
            luma,
        })
    }
}
