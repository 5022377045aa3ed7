//! Adapters for the generation vendors.
//!
//! One module per vendor, each owning its HTTP client and credentials:
//! Replicate (Flux images, inpainting, background removal), Luma Dream
//! Machine (image-to-video), FAL (Runway video, Flux-LoRA, training),
//! Suno (music), Gemini (clip description), and Imgur (image hosting).

pub mod download;
pub mod error;
pub mod fal;
pub mod gemini;
pub mod imgur;
pub mod luma;
pub mod replicate;
pub mod suno;

pub use download::download_to_file;
pub use error::{ProviderError, ProviderResult};
pub use fal::{FalClient, DEFAULT_INPAINT_PROMPT};
pub use gemini::{GeminiDescriber, DEFAULT_DESCRIBE_CONCURRENCY};
pub use imgur::{ImgurClient, ImgurLink};
pub use luma::{CompletedGeneration, LumaClient};
pub use replicate::ReplicateClient;
pub use suno::{CustomGenerateRequest, ExtendAudioRequest, Lyrics, SunoClient};
