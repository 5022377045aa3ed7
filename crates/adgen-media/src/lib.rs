#![deny(unreachable_patterns)]
//! FFmpeg and image assembly for generated commercials.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multi-input support
//! - Progress parsing from `-progress pipe:2`
//! - Product-image compositing (canvas fit, alpha masks, overlays)
//! - Clip cutting, normalization, concatenation, and audio muxing
//! - Zip import/export for uploaded assets

pub mod archive;
pub mod assembly;
pub mod command;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod image_ops;
pub mod probe;

pub use archive::{extract_zip, zip_dir};
pub use assembly::{
    assemble_commercial, collect_videos, combine_with_audio, concat_videos, cut_broll,
    enrich_metadata_durations, normalize_clip, resize_and_pad, VIDEO_EXTENSIONS,
};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegProgress, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use filters::{scale_pad, scale_pad_fps, PORTRAIT_HEIGHT, PORTRAIT_WIDTH};
pub use fs_utils::move_file;
pub use image_ops::{
    fit_on_canvas, mask_from_alpha, stitch_over_background, DEFAULT_ALPHA_THRESHOLD,
};
pub use probe::{get_duration, probe_video, VideoInfo};
