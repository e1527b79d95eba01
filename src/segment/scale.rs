use super::types::{BoundingBox, ExclusionMask, SegmentationConfig};

/// Pixel-space parameters the detector runs with, already adjusted to the
/// working image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DetectParams {
    pub(crate) min_w: u32,
    pub(crate) min_h: u32,
    pub(crate) kernel_w: u32,
    pub(crate) kernel_h: u32,
}

/// Inclusive pixel rectangle, always inside the image it was clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MaskRect {
    pub(crate) x0: u32,
    pub(crate) y0: u32,
    pub(crate) x1: u32,
    pub(crate) y1: u32,
}

/// Relationship between the original page and the copy detection runs on.
///
/// The unscaled path is simply `scale == 1.0`; both paths go through the
/// same rounding rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalePlan {
    scale: f64,
    original: (u32, u32),
    working: (u32, u32),
}

impl ScalePlan {
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            scale: 1.0,
            original: (width, height),
            working: (width, height),
        }
    }

    /// Downscales to `target_width` when the page is wider than that,
    /// otherwise keeps the page as is. A zero target disables downscaling.
    pub fn for_target_width(width: u32, height: u32, target_width: u32) -> Self {
        if target_width == 0 || width <= target_width {
            return Self::identity(width, height);
        }
        let scale = target_width as f64 / width as f64;
        let working_h = ((height as f64 * scale).round() as u32).max(1);
        Self {
            scale,
            original: (width, height),
            working: (target_width, working_h),
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn is_identity(&self) -> bool {
        self.working == self.original
    }

    pub fn working_size(&self) -> (u32, u32) {
        self.working
    }

    pub(crate) fn detect_params(&self, config: &SegmentationConfig) -> DetectParams {
        let s = self.scale;
        DetectParams {
            min_w: (config.min_w as f64 * s).round() as u32,
            min_h: (config.min_h as f64 * s).round() as u32,
            kernel_w: ((config.kernel_w as f64 * s).floor() as u32).max(1),
            kernel_h: ((config.kernel_h as f64 * s).floor() as u32).max(1),
        }
    }

    /// The mask in working coordinates, unclamped. Used for the center test.
    pub(crate) fn working_mask(&self, mask: &ExclusionMask) -> ExclusionMask {
        ExclusionMask::new(
            mask.x * self.scale,
            mask.y * self.scale,
            mask.width * self.scale,
            mask.height * self.scale,
        )
    }

    /// Paintable rectangle for a mask: scaled, rounded, and clamped to
    /// `[0, dimension - 1]`. Degenerate masks yield `None`.
    pub(crate) fn mask_rect(&self, mask: &ExclusionMask) -> Option<MaskRect> {
        if mask.is_degenerate() {
            return None;
        }
        let (w, h) = self.working;
        if w == 0 || h == 0 {
            return None;
        }
        let scaled = self.working_mask(mask);
        let clamp = |value: f64, dim: u32| value.round().clamp(0.0, (dim - 1) as f64) as u32;
        let rect = MaskRect {
            x0: clamp(scaled.x, w),
            y0: clamp(scaled.y, h),
            x1: clamp(scaled.x + scaled.width, w),
            y1: clamp(scaled.y + scaled.height, h),
        };
        if rect.x1 < rect.x0 || rect.y1 < rect.y0 {
            return None;
        }
        Some(rect)
    }

    /// Maps a box found on the working image back to original coordinates,
    /// rounding each edge and clamping to the original page.
    pub(crate) fn to_original(&self, bbox: BoundingBox) -> BoundingBox {
        if self.is_identity() {
            return bbox;
        }
        let (ow, oh) = self.original;
        let inv = 1.0 / self.scale;
        let x = ((bbox.x as f64 * inv).round() as u32).min(ow.saturating_sub(1));
        let y = ((bbox.y as f64 * inv).round() as u32).min(oh.saturating_sub(1));
        let width = ((bbox.width as f64 * inv).round() as u32).clamp(1, (ow - x).max(1));
        let height = ((bbox.height as f64 * inv).round() as u32).clamp(1, (oh - y).max(1));
        BoundingBox::new(x, y, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_pages_are_not_scaled() {
        let plan = ScalePlan::for_target_width(1200, 1600, 1500);
        assert!(plan.is_identity());
        assert_eq!(plan.scale(), 1.0);
        let plan = ScalePlan::for_target_width(1500, 1600, 1500);
        assert!(plan.is_identity());
    }

    #[test]
    fn wide_pages_scale_to_target() {
        let plan = ScalePlan::for_target_width(3000, 4000, 1500);
        assert_eq!(plan.scale(), 0.5);
        assert_eq!(plan.working_size(), (1500, 2000));
    }

    #[test]
    fn params_scale_with_kernel_floor_of_one() {
        let plan = ScalePlan::for_target_width(3000, 4000, 1500);
        let config = SegmentationConfig {
            min_w: 10,
            min_h: 9,
            kernel_w: 25,
            kernel_h: 1,
            ..SegmentationConfig::default()
        };
        let params = plan.detect_params(&config);
        assert_eq!(params.min_w, 5);
        assert_eq!(params.min_h, 5);
        assert_eq!(params.kernel_w, 12);
        assert_eq!(params.kernel_h, 1);
    }

    #[test]
    fn mask_rect_clamps_to_working_image() {
        let plan = ScalePlan::for_target_width(3000, 4000, 1500);
        let rect = plan
            .mask_rect(&ExclusionMask::new(-40.0, 3900.0, 200.0, 500.0))
            .unwrap();
        assert_eq!(rect, MaskRect { x0: 0, y0: 1950, x1: 80, y1: 1999 });
        assert!(plan.mask_rect(&ExclusionMask::new(10.0, 10.0, 0.0, 5.0)).is_none());
    }

    #[test]
    fn boxes_map_back_to_original_space() {
        let plan = ScalePlan::for_target_width(3000, 4000, 1500);
        let mapped = plan.to_original(BoundingBox::new(100, 200, 40, 15));
        assert_eq!(mapped, BoundingBox::new(200, 400, 80, 30));

        let edge = plan.to_original(BoundingBox::new(1490, 1990, 10, 10));
        assert_eq!(edge, BoundingBox::new(2980, 3980, 20, 20));
        assert!(edge.right() <= 3000 && edge.bottom() <= 4000);
    }

    #[test]
    fn identity_plan_leaves_boxes_alone() {
        let plan = ScalePlan::identity(800, 600);
        let bbox = BoundingBox::new(7, 9, 11, 13);
        assert_eq!(plan.to_original(bbox), bbox);
    }
}
