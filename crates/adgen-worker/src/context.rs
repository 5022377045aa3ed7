//! Shared clients and directories for pipeline execution.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use adgen_llm::Dispatcher;
use adgen_providers::{
    FalClient, GeminiDescriber, ImgurClient, LumaClient, ReplicateClient, SunoClient,
};
use adgen_queue::ProgressChannel;
use adgen_storage::{AssetLibrary, GcsClient, SessionStore};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_async, RetryConfig, RetryResult};

/// Everything a pipeline needs: vendor clients, the data root, and the
/// progress channel. Built once at startup and shared across jobs.
pub struct PipelineContext {
    pub config: WorkerConfig,
    pub sessions: SessionStore,
    pub library: AssetLibrary,
    pub progress: ProgressChannel,
    pub replicate: ReplicateClient,
    pub fal: FalClient,
    pub luma: LumaClient,
    pub suno: SunoClient,
    pub gemini: GeminiDescriber,
    pub llm: Dispatcher,
    gcs: Option<GcsClient>,
    imgur: Option<ImgurClient>,
}

impl PipelineContext {
    /// Build the context, failing fast on missing provider credentials.
    ///
    /// The image publisher is the one optional piece: GCS and Imgur are
    /// both probed, and jobs that need neither still run without them.
    pub async fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let sessions = SessionStore::new(&config.data_dir);
        tokio::fs::create_dir_all(sessions.root()).await?;
        let library = AssetLibrary::new(&config.data_dir);

        let progress = ProgressChannel::new(&config.redis_url)?;

        let replicate = ReplicateClient::from_env()?;
        let fal = FalClient::from_env()?;
        let luma = LumaClient::from_env()?;
        let suno = SunoClient::from_env();
        let gemini = GeminiDescriber::from_env()?;
        let llm = Dispatcher::from_env()?;

        let gcs = match GcsClient::from_env() {
            Ok(client) => {
                info!("Publishing images through GCS signed URLs");
                Some(client)
            }
            Err(e) => {
                warn!("GCS uploader not configured ({}), trying Imgur", e);
                None
            }
        };
        let imgur = match ImgurClient::from_env() {
            Ok(client) => {
                if gcs.is_none() {
                    info!("Publishing images through Imgur");
                }
                Some(client)
            }
            Err(_) => {
                if gcs.is_none() {
                    warn!("No image publisher configured, Luma jobs will fail");
                }
                None
            }
        };

        Ok(Self {
            config,
            sessions,
            library,
            progress,
            replicate,
            fal,
            luma,
            suno,
            gemini,
            llm,
            gcs,
            imgur,
        })
    }

    /// Upload a local image somewhere an image-to-video provider can fetch
    /// it. GCS is preferred; Imgur is the fallback.
    pub async fn publish_image(&self, path: &Path) -> WorkerResult<String> {
        if let Some(gcs) = &self.gcs {
            let retry = RetryConfig::new("gcs_upload").with_max_retries(2);
            return match retry_async(&retry, || gcs.upload_and_sign(path)).await {
                RetryResult::Success(url) => Ok(url),
                RetryResult::Failed { error, attempts } => {
                    warn!(attempts, path = %path.display(), "GCS upload failed");
                    Err(error.into())
                }
            };
        }
        if let Some(imgur) = &self.imgur {
            return Ok(imgur.upload(path).await?);
        }
        Err(WorkerError::config_error(
            "No image publisher configured. Set ADGEN_GCS_BUCKET (preferred) or IMGUR_CLIENT_ID",
        ))
    }

    /// Resolve a queue-payload path against the data root.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        resolve_against(self.sessions.root(), path)
    }

    /// Data-root relative form of a path, as recorded on artifacts.
    pub fn rel_artifact(&self, path: &Path) -> String {
        relative_to(self.sessions.root(), path)
    }
}

fn resolve_against(root: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
