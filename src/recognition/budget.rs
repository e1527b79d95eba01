use image::imageops::FilterType;
use tracing::debug;

use crate::segment::{self, PNG_MIME, SegmentError};

/// Shrinks an encoded region so it holds at most `max_pixels` pixels.
///
/// Returns the input untouched when it already fits or when the budget is 0.
/// Otherwise both sides are scaled by `sqrt(max_pixels / (w * h))`.
pub fn fit_to_pixel_budget(image_data: &str, max_pixels: u64) -> Result<String, SegmentError> {
    if max_pixels == 0 {
        return Ok(image_data.to_string());
    }
    let (_, bytes) = segment::decode_payload(image_data)?;
    let image = image::load_from_memory(&bytes).map_err(SegmentError::ImageDecode)?;
    let Some((width, height)) = budget_size(image.width(), image.height(), max_pixels) else {
        return Ok(image_data.to_string());
    };
    debug!(
        "recognition: resizing region {}x{} -> {}x{}",
        image.width(),
        image.height(),
        width,
        height
    );
    let resized = image.resize_exact(width, height, FilterType::CatmullRom);
    let bytes = segment::png_bytes(&resized).map_err(|source| SegmentError::Encode {
        id: "recognition".to_string(),
        source,
    })?;
    Ok(segment::to_data_uri(PNG_MIME, &bytes))
}

/// Target size for an image over budget, or `None` when it fits.
pub fn budget_size(width: u32, height: u32, max_pixels: u64) -> Option<(u32, u32)> {
    let pixels = u64::from(width) * u64::from(height);
    if max_pixels == 0 || pixels <= max_pixels {
        return None;
    }
    let scale = (max_pixels as f64 / pixels as f64).sqrt();
    let scaled = |side: u32| ((f64::from(side) * scale) as u32).max(1);
    Some((scaled(width), scaled(height)))
}
