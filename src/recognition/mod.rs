//! Sends extracted regions to a text recognition service.
//!
//! The service is reached through the [`Recognizer`] trait so callers can
//! plug in something other than [`HttpRecognizer`]. Results come back in the
//! same reading order as the regions, one entry per region, with either the
//! cleaned text or the error that region hit.

mod budget;
mod cleanup;
mod http;
mod retry;

pub use budget::{budget_size, fit_to_pixel_budget};
pub use cleanup::{clean_repetitions, post_clean, strip_code_fences, strip_textbf};
pub use http::HttpRecognizer;

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::segment::{self, BoundingBox, PNG_MIME, Region};
use crate::settings::Settings;

pub type RecognizeFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

pub trait Recognizer: Send + Sync {
    /// Recognizes one encoded region. `image_data` is a data URI.
    fn recognize<'a>(&'a self, image_data: &'a str, mime: &'a str) -> RecognizeFuture<'a>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionText {
    pub id: String,
    #[serde(flatten)]
    pub bbox: BoundingBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct TranscribeOptions {
    /// Requests in flight at once. 0 is treated as 1.
    pub concurrency: usize,
    /// Pixel budget per uploaded region. 0 disables resizing.
    pub max_pixels: u64,
}

impl TranscribeOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            concurrency: settings.recognition_concurrency,
            max_pixels: settings.recognition_max_pixels,
        }
    }
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_pixels: 1024 * 1024,
        }
    }
}

/// Recognizes every region, keeping the input order in the output.
pub async fn transcribe_regions<R>(
    recognizer: &R,
    regions: &[Region],
    options: TranscribeOptions,
) -> Vec<RegionText>
where
    R: Recognizer + ?Sized,
{
    stream::iter(regions.to_vec())
        .map(|region| transcribe_region(recognizer, region, options.max_pixels))
        .buffered(options.concurrency.max(1))
        .collect()
        .await
}

async fn transcribe_region<R>(recognizer: &R, region: Region, max_pixels: u64) -> RegionText
where
    R: Recognizer + ?Sized,
{
    let outcome = match fit_to_pixel_budget(&region.image_data, max_pixels) {
        Ok(image_data) => {
            let mime = segment::decode_payload(&image_data)
                .ok()
                .and_then(|(mime, _)| mime)
                .unwrap_or_else(|| PNG_MIME.to_string());
            recognizer
                .recognize(&image_data, &mime)
                .await
                .map(|text| post_clean(&text))
        }
        Err(err) => Err(err.into()),
    };
    match outcome {
        Ok(text) => {
            debug!("recognition: {} -> {} chars", region.id, text.chars().count());
            RegionText {
                id: region.id,
                bbox: region.bbox,
                text: Some(text),
                error: None,
            }
        }
        Err(err) => {
            warn!("recognition: {} failed: {:#}", region.id, err);
            RegionText {
                id: region.id,
                bbox: region.bbox,
                text: None,
                error: Some(format!("{:#}", err)),
            }
        }
    }
}

/// Concatenates recognized texts in reading order, skipping failures.
pub fn join_texts(results: &[RegionText]) -> String {
    results
        .iter()
        .filter_map(|result| result.text.as_deref())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
