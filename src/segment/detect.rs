use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::region_labelling::{Connectivity, connected_components};
use tracing::debug;

use super::imaging::{self, BACKGROUND};
use super::scale::{DetectParams, MaskRect};
use super::types::{BoundingBox, ExclusionMask};

/// Finds raw ink components on `page` (already in working coordinates).
///
/// `rects` are the paintable exclusion areas and `masks` the same masks in
/// working space, used for the center-point filter. The page is consumed as
/// the scratch copy that masks get painted on.
pub(crate) fn detect_components(
    mut page: RgbaImage,
    params: &DetectParams,
    rects: &[MaskRect],
    masks: &[ExclusionMask],
) -> Vec<BoundingBox> {
    for rect in rects {
        paint_rgba(&mut page, rect, Rgba([255, 255, 255, 255]));
    }

    let gray = imaging::to_luma(&page);
    drop(page);
    let mut binary = imaging::binarize_inverted(&gray);
    drop(gray);

    // Thresholding can bring masked areas back as speckle.
    for rect in rects {
        paint_gray(&mut binary, rect, Luma([BACKGROUND]));
    }

    let closed = imaging::close_rect(&binary, params.kernel_w, params.kernel_h);
    drop(binary);
    let merged = imaging::dilate_rect(&closed, params.kernel_w, params.kernel_h);
    drop(closed);

    let components = component_boxes(&merged);
    let found = components.len();
    let kept: Vec<BoundingBox> = components
        .into_iter()
        .filter(|bbox| bbox.width >= params.min_w && bbox.height >= params.min_h)
        .filter(|bbox| {
            let (cx, cy) = bbox.center();
            !masks.iter().any(|mask| mask.contains_point(cx, cy))
        })
        .collect();
    debug!(
        "detect: {} components, {} kept (min {}x{}, kernel {}x{})",
        found,
        kept.len(),
        params.min_w,
        params.min_h,
        params.kernel_w,
        params.kernel_h
    );
    kept
}

/// Bounding boxes of the 8-connected foreground components of `mask`, in
/// label order.
fn component_boxes(mask: &GrayImage) -> Vec<BoundingBox> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([BACKGROUND]));
    let mut extents: Vec<Option<(u32, u32, u32, u32)>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if label >= extents.len() {
            extents.resize(label + 1, None);
        }
        let extent = extents[label].get_or_insert((x, y, x, y));
        extent.0 = extent.0.min(x);
        extent.1 = extent.1.min(y);
        extent.2 = extent.2.max(x);
        extent.3 = extent.3.max(y);
    }
    extents
        .into_iter()
        .flatten()
        .map(|(x0, y0, x1, y1)| BoundingBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
        .collect()
}

fn paint_rgba(image: &mut RgbaImage, rect: &MaskRect, color: Rgba<u8>) {
    for y in rect.y0..=rect.y1.min(image.height().saturating_sub(1)) {
        for x in rect.x0..=rect.x1.min(image.width().saturating_sub(1)) {
            image.put_pixel(x, y, color);
        }
    }
}

fn paint_gray(image: &mut GrayImage, rect: &MaskRect, color: Luma<u8>) {
    for y in rect.y0..=rect.y1.min(image.height().saturating_sub(1)) {
        for x in rect.x0..=rect.x1.min(image.width().saturating_sub(1)) {
            image.put_pixel(x, y, color);
        }
    }
}
