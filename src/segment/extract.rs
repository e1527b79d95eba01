use image::{DynamicImage, RgbaImage, imageops};
use tracing::debug;

use super::codec::{self, PNG_MIME};
use super::error::SegmentError;
use super::imaging;
use super::types::{BoundingBox, Region, SegmentationConfig};

/// Erosion kernel that thickens dark strokes thinned by anti-aliasing.
const STROKE_KERNEL: (u32, u32) = (2, 2);

/// Padded crop rectangle for `bbox`, clamped so it never leaves the image.
pub fn crop_rect(
    bbox: &BoundingBox,
    pad_x: u32,
    pad_y: u32,
    image_width: u32,
    image_height: u32,
) -> BoundingBox {
    let x = bbox.x.saturating_sub(pad_x);
    let y = bbox.y.saturating_sub(pad_y);
    let width = padded_len(bbox.width, pad_x).min(image_width.saturating_sub(x));
    let height = padded_len(bbox.height, pad_y).min(image_height.saturating_sub(y));
    BoundingBox::new(x, y, width, height)
}

fn padded_len(len: u32, pad: u32) -> u32 {
    len.saturating_add(pad.saturating_mul(2))
}

/// `<page>-<index>` with a zero-padded per-page sequence number.
pub fn region_id(page_id: &str, index: usize) -> String {
    format!("{}-{:04}", page_id, index)
}

/// Crops, cleans and encodes one region per box, preserving order.
pub(crate) fn extract_regions(
    page: &RgbaImage,
    boxes: &[BoundingBox],
    config: &SegmentationConfig,
    page_id: &str,
) -> Result<Vec<Region>, SegmentError> {
    let (width, height) = page.dimensions();
    let regions = boxes
        .iter()
        .enumerate()
        .map(|(index, bbox)| {
            let id = region_id(page_id, index);
            let rect = crop_rect(bbox, config.pad_x, config.pad_y, width, height);
            let image_data = encode_crop(page, &rect)
                .map_err(|source| SegmentError::Encode { id: id.clone(), source })?;
            Ok(Region {
                bbox: *bbox,
                id,
                image_data,
            })
        })
        .collect::<Result<Vec<_>, SegmentError>>()?;
    debug!("extract: {} regions encoded", regions.len());
    Ok(regions)
}

fn encode_crop(page: &RgbaImage, rect: &BoundingBox) -> Result<String, image::ImageError> {
    let crop = imageops::crop_imm(page, rect.x, rect.y, rect.width, rect.height).to_image();
    let gray = imaging::to_luma(&crop);
    let thickened = imaging::erode_rect(&gray, STROKE_KERNEL.0, STROKE_KERNEL.1);
    let bytes = codec::png_bytes(&DynamicImage::ImageLuma8(thickened))?;
    Ok(codec::to_data_uri(PNG_MIME, &bytes))
}
