use serde::{Deserialize, Serialize};

/// Axis-aligned box in image pixel coordinates.
///
/// Boxes are plain values: padding, splitting and rescaling always build a
/// new box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn mid_x(&self) -> f64 {
        self.x as f64 + self.width as f64 / 2.0
    }

    pub fn mid_y(&self) -> f64 {
        self.y as f64 + self.height as f64 / 2.0
    }

    pub fn center(&self) -> (f64, f64) {
        (self.mid_x(), self.mid_y())
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// One extracted text region, ready to hand to a recognition service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    pub id: String,
    /// `data:image/png;base64,...` payload of the padded, cleaned crop.
    pub image_data: String,
}

/// Rectangle erased from detection. Coordinates come straight from
/// interactive dragging, so they may be fractional, negative or empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExclusionMask {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ExclusionMask {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
            || !self.x.is_finite()
            || !self.y.is_finite()
            || !self.width.is_finite()
            || !self.height.is_finite()
    }

    pub fn contains_point(&self, px: f64, py: f64) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }
}

/// Horizontal split line that only applies inside one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphCut {
    pub y: f64,
    pub column_index: usize,
}

impl ParagraphCut {
    pub const fn new(y: f64, column_index: usize) -> Self {
        Self { y, column_index }
    }
}

/// Tunables for detection, cropping and ordering.
///
/// All pixel-valued fields are expressed in original image space; the scaled
/// pipeline rescales them before detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    #[serde(rename = "minW")]
    pub min_w: u32,
    #[serde(rename = "minH")]
    pub min_h: u32,
    #[serde(rename = "padx")]
    pub pad_x: u32,
    #[serde(rename = "pady")]
    pub pad_y: u32,
    #[serde(rename = "kernelW")]
    pub kernel_w: u32,
    #[serde(rename = "kernelH")]
    pub kernel_h: u32,
    /// Row alignment tolerance as a fraction of the average region height.
    #[serde(rename = "yTolerance")]
    pub y_tolerance: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_w: 10,
            min_h: 10,
            pad_x: 6,
            pad_y: 4,
            kernel_w: 25,
            kernel_h: 5,
            y_tolerance: 0.7,
        }
    }
}

pub const DEFAULT_PAGE_ID: &str = "page";

/// Complete, self-contained description of one segmentation run (minus the
/// pixels, which travel separately so they can be shared).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmentationRequest {
    pub config: SegmentationConfig,
    pub masks: Vec<ExclusionMask>,
    pub paragraph_cuts: Vec<ParagraphCut>,
    pub column_cuts: Vec<f64>,
    pub page_id: String,
}

impl Default for SegmentationRequest {
    fn default() -> Self {
        Self {
            config: SegmentationConfig::default(),
            masks: Vec::new(),
            paragraph_cuts: Vec::new(),
            column_cuts: Vec::new(),
            page_id: DEFAULT_PAGE_ID.to_string(),
        }
    }
}

impl SegmentationRequest {
    pub fn new(config: SegmentationConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationOutput {
    /// Detected boxes before nesting removal and cuts, in original image space.
    pub raw_boxes: Vec<BoundingBox>,
    /// Final regions in reading order.
    pub regions: Vec<Region>,
}
