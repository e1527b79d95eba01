use serde::{Deserialize, Serialize};

use crate::recognition::RegionText;
use crate::segment::{ExclusionMask, ParagraphCut, SegmentationConfig};

/// Body of `/segment` and `/recognize`.
///
/// A missing `config` falls back to the server's configured defaults; a
/// partial one fills the missing fields with the built-in defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct SegmentBody {
    pub(crate) image: String,
    pub(crate) config: Option<SegmentationConfig>,
    pub(crate) masks: Vec<ExclusionMask>,
    pub(crate) paragraph_cuts: Vec<ParagraphCut>,
    pub(crate) column_cuts: Vec<f64>,
    pub(crate) page_id: Option<String>,
    /// Run through the background worker (downscaled detection). Defaults
    /// to true.
    pub(crate) scaled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RecognizeResponse {
    pub(crate) regions: Vec<RegionText>,
    pub(crate) text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
