use std::path::Path;

use adgen_media::{check_ffmpeg, check_ffprobe};
use adgen_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with data_dir={}",
        config.data_dir
    );
    ensure_data_dir(&config.data_dir).await?;
    ensure_ffmpeg_stack()?;
    ensure_env_present(&[
        "REDIS_URL",
        "REPLICATE_API_TOKEN",
        "LUMA_API_KEY",
        "GEMINI_API_KEY",
        "ANTHROPIC_API_KEY",
    ])?;
    ensure_any_env_present(&["FAL_API_KEY", "FAL_KEY"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_data_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn ensure_ffmpeg_stack() -> anyhow::Result<()> {
    let ffmpeg = check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    let ffprobe = check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;
    println!(
        "worker-selfcheck: ffmpeg={} ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}

fn ensure_any_env_present(vars: &[&str]) -> anyhow::Result<()> {
    if vars.iter().any(|var| std::env::var(var).is_ok()) {
        return Ok(());
    }
    Err(anyhow::anyhow!(
        "missing required env var (one of {})",
        vars.join(", ")
    ))
}
