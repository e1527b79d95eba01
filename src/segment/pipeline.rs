use std::time::Instant;

use image::{RgbaImage, imageops};
use tracing::{debug, info};

use super::detect;
use super::error::SegmentError;
use super::extract;
use super::refine::{self, Cuts};
use super::scale::ScalePlan;
use super::types::{SegmentationOutput, SegmentationRequest};

/// Page width above which the background path downscales for detection.
pub const DEFAULT_DOWNSCALE_WIDTH: u32 = 1500;

/// Runs detection on a copy prepared according to `plan`, then refines and
/// extracts in original image space.
pub fn segment_with_plan(
    page: &RgbaImage,
    request: &SegmentationRequest,
    plan: ScalePlan,
) -> Result<SegmentationOutput, SegmentError> {
    let (width, height) = page.dimensions();
    if width == 0 || height == 0 {
        return Err(SegmentError::EmptyImage { width, height });
    }
    let started = Instant::now();
    let config = &request.config;

    let working = if plan.is_identity() {
        page.clone()
    } else {
        let (w, h) = plan.working_size();
        imageops::resize(page, w, h, imageops::FilterType::Triangle)
    };
    debug!(
        "segment: page {}x{}, scale {:.3}, working {}x{}",
        width,
        height,
        plan.scale(),
        working.width(),
        working.height()
    );

    let params = plan.detect_params(config);
    let rects: Vec<_> = request
        .masks
        .iter()
        .filter_map(|mask| plan.mask_rect(mask))
        .collect();
    let working_masks: Vec<_> = request
        .masks
        .iter()
        .filter(|mask| !mask.is_degenerate())
        .map(|mask| plan.working_mask(mask))
        .collect();

    let raw_boxes: Vec<_> = detect::detect_components(working, &params, &rects, &working_masks)
        .into_iter()
        .map(|bbox| plan.to_original(bbox))
        .collect();

    let cuts = Cuts::resolve(&request.column_cuts, &request.paragraph_cuts);
    let ordered = refine::refine(&raw_boxes, &cuts, config.y_tolerance);
    let regions = extract::extract_regions(page, &ordered, config, &request.page_id)?;

    info!(
        "segment: {} raw boxes, {} regions in {:.0?}",
        raw_boxes.len(),
        regions.len(),
        started.elapsed()
    );
    Ok(SegmentationOutput { raw_boxes, regions })
}

/// Full-resolution path for quick interactive recomputation.
pub fn segment_inline(
    page: &RgbaImage,
    request: &SegmentationRequest,
) -> Result<SegmentationOutput, SegmentError> {
    segment_with_plan(page, request, ScalePlan::identity(page.width(), page.height()))
}

/// Path used by the background worker: pages wider than `target_width` are
/// detected on a downscaled copy.
pub fn segment_scaled(
    page: &RgbaImage,
    request: &SegmentationRequest,
    target_width: u32,
) -> Result<SegmentationOutput, SegmentError> {
    let plan = ScalePlan::for_target_width(page.width(), page.height(), target_width);
    segment_with_plan(page, request, plan)
}
