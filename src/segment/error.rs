use thiserror::Error;

/// Failures the segmentation core can report.
///
/// Degenerate masks and out-of-range cuts are not errors; they are ignored
/// or clamped before they reach the pipeline.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The background worker has not been started or has already shut down.
    /// Callers should confirm readiness before retrying.
    #[error("segmentation engine is not ready")]
    EngineNotReady,

    #[error("failed to decode page image")]
    ImageDecode(#[source] image::ImageError),

    #[error("invalid image payload: {0}")]
    InvalidPayload(String),

    #[error("page image is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("failed to encode region {id}")]
    Encode {
        id: String,
        #[source]
        source: image::ImageError,
    },

    /// A job panicked inside the worker. The worker itself stays usable.
    #[error("segmentation worker failed: {0}")]
    Worker(String),
}

impl SegmentError {
    /// Whether the caller sent something unusable, as opposed to an engine
    /// side failure.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SegmentError::ImageDecode(_)
                | SegmentError::InvalidPayload(_)
                | SegmentError::EmptyImage { .. }
        )
    }
}
