//! Filter-graph strings shared by the assembly steps.

/// Width of the portrait canvas used by generated commercials.
pub const PORTRAIT_WIDTH: u32 = 1080;

/// Height of the portrait canvas used by generated commercials.
pub const PORTRAIT_HEIGHT: u32 = 1920;

/// Scale preserving aspect ratio, then pad centered on black.
pub fn scale_pad(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = width,
        h = height
    )
}

/// [`scale_pad`] plus a constant frame rate, for clips that will be
/// concatenated.
pub fn scale_pad_fps(width: u32, height: u32, fps: f64) -> String {
    format!("{},fps={:.3}", scale_pad(width, height), fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_pad_filter() {
        assert_eq!(
            scale_pad(1080, 1920),
            "scale=1080:1920:force_original_aspect_ratio=decrease,pad=1080:1920:(ow-iw)/2:(oh-ih)/2"
        );
    }

    #[test]
    fn test_scale_pad_fps_filter() {
        let filter = scale_pad_fps(1080, 1920, 30.0);
        assert!(filter.ends_with(",fps=30.000"));
        assert!(filter.starts_with("scale=1080:1920"));
    }
}
