//! Image preprocessing: decode (PNG/JPEG/BMP/GIF), resize to a fixed size,
//! and flatten to a network input vector.

use std::path::Path;

use crate::error::{Error, Result};

/// Channels per pixel in the flattened input (R, G, B, A).
pub const CHANNELS: usize = 4;

/// Input length produced for a `width × height` image.
pub fn input_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * CHANNELS
}

/// Decodes image bytes, resizes to exactly `width × height`, and flattens the
/// pixels row by row as R, G, B, A normalized to [0, 1].
///
/// Returns a flat `Vec<f64>` of length `width * height * 4`.
pub fn image_bytes_to_input(bytes: &[u8], width: u32, height: u32) -> Result<Vec<f64>> {
    let img = image::load_from_memory(bytes).map_err(|e| Error::Image(e.to_string()))?;
    Ok(flatten(img, width, height))
}

/// Same as [`image_bytes_to_input`], reading the image from `path`.
pub fn image_to_input<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|e| Error::Image(format!("{}: {e}", path.display())))?;
    Ok(flatten(img, width, height))
}

fn flatten(img: image::DynamicImage, width: u32, height: u32) -> Vec<f64> {
    let resized = img.resize_exact(width, height, image::imageops::FilterType::Lanczos3);
    let rgba = resized.to_rgba8();
    rgba.pixels()
        .flat_map(|p| p.0.iter().map(|&c| c as f64 / 255.0))
        .collect()
}
