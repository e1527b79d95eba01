//! Page layout segmentation: ink detection, refinement into reading-ordered
//! text regions, and extraction of per-region crops.
//!
//! The flow is the same for every caller:
//!
//! 1. `detect` binarizes a (possibly downscaled) copy of the page, erases
//!    exclusion masks, merges glyphs with rectangular morphology and labels
//!    connected components.
//! 2. `refine` drops nested boxes, applies column and paragraph cuts and
//!    sorts into reading order.
//! 3. `extract` crops padded sub-images from the original page and encodes
//!    them as PNG data URIs.
//!
//! [`segment_inline`] runs at full resolution; [`segment_scaled`] is what the
//! background worker uses for large pages.

mod codec;
pub mod debug;
mod detect;
mod error;
mod extract;
mod geom;
mod imaging;
mod pipeline;
mod refine;
mod scale;
mod types;

pub use codec::{PNG_MIME, decode_page, decode_payload, png_bytes, to_data_uri};
pub use error::SegmentError;
pub use extract::region_id;
pub use pipeline::{DEFAULT_DOWNSCALE_WIDTH, segment_inline, segment_scaled, segment_with_plan};
pub use scale::ScalePlan;
pub use types::{
    BoundingBox, DEFAULT_PAGE_ID, ExclusionMask, ParagraphCut, Region, SegmentationConfig,
    SegmentationOutput, SegmentationRequest,
};

/// Pure geometry stages, exposed for callers that already have boxes.
pub mod layout {
    use super::refine::{self, Cuts};
    use super::types::{BoundingBox, ParagraphCut};

    pub use super::extract::crop_rect as padded_crop;

    /// Nesting filter, column splits, paragraph splits and reading order.
    pub fn order_regions(
        boxes: &[BoundingBox],
        column_cuts: &[f64],
        paragraph_cuts: &[ParagraphCut],
        y_tolerance: f64,
    ) -> Vec<BoundingBox> {
        refine::refine(
            boxes,
            &Cuts::resolve(column_cuts, paragraph_cuts),
            y_tolerance,
        )
    }

    /// Boxes left after removing every box contained in another.
    pub fn remove_nested(boxes: &[BoundingBox]) -> Vec<BoundingBox> {
        refine::remove_nested(boxes)
    }

    /// Column index of a box given column cuts in any order.
    pub fn column_index(bbox: &BoundingBox, column_cuts: &[f64]) -> usize {
        Cuts::resolve(column_cuts, &[]).column_of(bbox)
    }
}
