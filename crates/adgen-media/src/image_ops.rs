//! Still-image operations for product compositing.
//!
//! These back the image half of the generation flow: fitting a cut-out
//! product onto the portrait canvas, deriving an inpainting mask from its
//! alpha channel, and stitching the cut-out over a generated background.

use image::imageops::{self, FilterType};
use image::{GrayImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Alpha value above which a pixel counts as product foreground.
pub const DEFAULT_ALPHA_THRESHOLD: u8 = 128;

/// Aspect-fit an image onto a transparent canvas, centered.
///
/// Images larger than the canvas are shrunk with Lanczos3; smaller images
/// keep their native size. The result is written next to the input as
/// `<stem>_processed.png` and its path returned.
pub async fn fit_on_canvas(input: &Path, width: u32, height: u32) -> MediaResult<PathBuf> {
    let input = input.to_path_buf();
    tokio::task::spawn_blocking(move || fit_on_canvas_sync(&input, width, height))
        .await
        .map_err(|e| MediaError::internal(format!("image task panicked: {e}")))?
}

fn fit_on_canvas_sync(input: &Path, width: u32, height: u32) -> MediaResult<PathBuf> {
    let img = image::open(input)?.to_rgba8();
    let (iw, ih) = img.dimensions();

    let scale = f64::min(width as f64 / iw as f64, height as f64 / ih as f64).min(1.0);
    let tw = ((iw as f64 * scale).round() as u32).max(1);
    let th = ((ih as f64 * scale).round() as u32).max(1);

    let resized = if scale < 1.0 {
        imageops::resize(&img, tw, th, FilterType::Lanczos3)
    } else {
        img
    };

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    let x = i64::from((width - tw) / 2);
    let y = i64::from((height - th) / 2);
    imageops::overlay(&mut canvas, &resized, x, y);

    let output = processed_name(input);
    canvas.save(&output)?;

    debug!(
        input = %input.display(),
        output = %output.display(),
        "Fitted image onto {}x{} canvas",
        width,
        height
    );

    Ok(output)
}

fn processed_name(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    input.with_file_name(format!("{stem}_processed.png"))
}

/// Derive an inpainting mask from an image's alpha channel.
///
/// Pixels more opaque than `threshold` become black (kept as-is by the
/// inpainting model); everything else becomes white (the region to
/// repaint). Inputs without an alpha channel are rejected.
pub async fn mask_from_alpha(input: &Path, output: &Path, threshold: u8) -> MediaResult<()> {
    let input = input.to_path_buf();
    let output = output.to_path_buf();
    tokio::task::spawn_blocking(move || mask_from_alpha_sync(&input, &output, threshold))
        .await
        .map_err(|e| MediaError::internal(format!("image task panicked: {e}")))?
}

fn mask_from_alpha_sync(input: &Path, output: &Path, threshold: u8) -> MediaResult<()> {
    let img = image::open(input)?;
    if !img.color().has_alpha() {
        return Err(MediaError::MissingAlpha(input.to_path_buf()));
    }

    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut mask = GrayImage::new(w, h);

    for (x, y, px) in rgba.enumerate_pixels() {
        let value = if px.0[3] > threshold { 0 } else { 255 };
        mask.put_pixel(x, y, image::Luma([value]));
    }

    mask.save(output)?;
    Ok(())
}

/// Stitch an RGBA overlay on top of a background image.
///
/// The background is resized to the overlay's exact dimensions, then the
/// overlay is composited at the origin using its alpha channel.
pub async fn stitch_over_background(
    background: &Path,
    overlay: &Path,
    output: &Path,
) -> MediaResult<()> {
    let background = background.to_path_buf();
    let overlay = overlay.to_path_buf();
    let output = output.to_path_buf();
    tokio::task::spawn_blocking(move || stitch_sync(&background, &overlay, &output))
        .await
        .map_err(|e| MediaError::internal(format!("image task panicked: {e}")))?
}

fn stitch_sync(background: &Path, overlay: &Path, output: &Path) -> MediaResult<()> {
    let overlay_img = image::open(overlay)?.to_rgba8();
    let (w, h) = overlay_img.dimensions();

    let mut canvas = image::open(background)?
        .resize_exact(w, h, FilterType::Lanczos3)
        .to_rgba8();
    imageops::overlay(&mut canvas, &overlay_img, 0, 0);

    canvas.save(output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_rgba(path: &Path, width: u32, height: u32, pixel: Rgba<u8>) {
        RgbaImage::from_pixel(width, height, pixel).save(path).unwrap();
    }

    #[test]
    fn test_fit_on_canvas_shrinks_oversized_image() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("product.png");
        write_rgba(&input, 2160, 2160, Rgba([255, 0, 0, 255]));

        let output = fit_on_canvas_sync(&input, 1080, 1920).unwrap();
        assert_eq!(output.file_name().unwrap(), "product_processed.png");

        let result = image::open(&output).unwrap().to_rgba8();
        assert_eq!(result.dimensions(), (1080, 1920));

        // Square source fitted to width, centered vertically on a
        // transparent canvas
        assert_eq!(result.get_pixel(540, 960).0[3], 255);
        assert_eq!(result.get_pixel(540, 10).0[3], 0);
    }

    #[test]
    fn test_fit_on_canvas_keeps_small_image_size() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("small.png");
        write_rgba(&input, 100, 100, Rgba([0, 255, 0, 255]));

        let output = fit_on_canvas_sync(&input, 1080, 1920).unwrap();
        let result = image::open(&output).unwrap().to_rgba8();
        assert_eq!(result.dimensions(), (1080, 1920));

        // Top-left of the pasted region: (1080-100)/2 = 490, (1920-100)/2 = 910
        assert_eq!(result.get_pixel(490, 910).0, [0, 255, 0, 255]);
        assert_eq!(result.get_pixel(489, 910).0[3], 0);
    }

    #[test]
    fn test_mask_from_alpha() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("cutout.png");
        let output = dir.path().join("mask.png");

        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 1, Rgba([255, 255, 255, 255]));
        img.save(&input).unwrap();

        mask_from_alpha_sync(&input, &output, DEFAULT_ALPHA_THRESHOLD).unwrap();

        let mask = image::open(&output).unwrap().to_luma8();
        assert_eq!(mask.get_pixel(1, 1).0[0], 0, "opaque pixel must be black");
        assert_eq!(
            mask.get_pixel(0, 0).0[0],
            255,
            "transparent pixel must be white"
        );
    }

    #[test]
    fn test_mask_from_alpha_rejects_opaque_formats() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("photo.jpg");
        let output = dir.path().join("mask.png");

        image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]))
            .save(&input)
            .unwrap();

        let err = mask_from_alpha_sync(&input, &output, DEFAULT_ALPHA_THRESHOLD).unwrap_err();
        assert!(matches!(err, MediaError::MissingAlpha(_)));
    }

    #[test]
    fn test_stitch_over_background() {
        let dir = TempDir::new().unwrap();
        let background = dir.path().join("bg.png");
        let overlay = dir.path().join("fg.png");
        let output = dir.path().join("stitched.png");

        write_rgba(&background, 32, 32, Rgba([0, 0, 255, 255]));

        let mut fg = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 0]));
        fg.put_pixel(8, 8, Rgba([255, 0, 0, 255]));
        fg.save(&overlay).unwrap();

        stitch_sync(&background, &overlay, &output).unwrap();

        let result = image::open(&output).unwrap().to_rgba8();
        assert_eq!(result.dimensions(), (16, 16), "background resized to overlay");
        assert_eq!(result.get_pixel(8, 8).0, [255, 0, 0, 255]);
        assert_eq!(result.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }
}
