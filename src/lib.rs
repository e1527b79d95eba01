use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub mod logging;
pub mod recognition;
pub mod segment;
pub mod server;
pub mod settings;
pub mod worker;

pub use recognition::{HttpRecognizer, Recognizer, RegionText, TranscribeOptions};
pub use segment::{
    BoundingBox, ExclusionMask, ParagraphCut, Region, SegmentError, SegmentationConfig,
    SegmentationOutput, SegmentationRequest,
};
pub use worker::{SegmentScheduler, SegmentWorker};

/// Per-run overrides of the `[segmentation]` settings.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub min_w: Option<u32>,
    pub min_h: Option<u32>,
    pub pad_x: Option<u32>,
    pub pad_y: Option<u32>,
    pub kernel_w: Option<u32>,
    pub kernel_h: Option<u32>,
    pub y_tolerance: Option<f64>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut SegmentationConfig) {
        let pairs = [
            (&mut config.min_w, self.min_w),
            (&mut config.min_h, self.min_h),
            (&mut config.pad_x, self.pad_x),
            (&mut config.pad_y, self.pad_y),
            (&mut config.kernel_w, self.kernel_w),
            (&mut config.kernel_h, self.kernel_h),
        ];
        for (target, value) in pairs {
            if let Some(value) = value {
                *target = value;
            }
        }
        if let Some(tolerance) = self.y_tolerance {
            config.y_tolerance = tolerance;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub image: Option<String>,
    pub settings_path: Option<String>,
    pub overrides: ConfigOverrides,
    pub masks: Vec<ExclusionMask>,
    pub column_cuts: Vec<f64>,
    pub paragraph_cuts: Vec<ParagraphCut>,
    pub page_id: Option<String>,
    pub scaled: bool,
    pub downscale_width: Option<u32>,
    pub debug_overlay: Option<String>,
    pub recognize: bool,
    pub serve: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecognizeOutput {
    regions: Vec<RegionText>,
    text: String,
}

/// Runs one CLI invocation and returns what should be printed.
pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    config.overrides.apply(&mut settings.segmentation);
    if let Some(width) = config.downscale_width {
        settings.downscale_width = width;
    }

    if let Some(addr) = config.serve.as_deref() {
        let addr = if addr.trim().is_empty() {
            settings.server_addr.clone()
        } else {
            addr.trim().to_string()
        };
        server::run_server(settings, addr).await?;
        return Ok(String::new());
    }

    let image_path = config
        .image
        .as_deref()
        .ok_or_else(|| anyhow!("an image path is required unless --serve is given"))?;
    let page = load_page(Path::new(image_path))?;

    let mut request = SegmentationRequest::new(settings.segmentation);
    request.masks = config.masks;
    request.column_cuts = config.column_cuts;
    request.paragraph_cuts = config.paragraph_cuts;
    request.page_id = config
        .page_id
        .or_else(|| file_stem(image_path))
        .unwrap_or_else(|| segment::DEFAULT_PAGE_ID.to_string());

    let page = Arc::new(page);
    let output = if config.scaled {
        let worker = SegmentWorker::spawn(settings.downscale_width)?;
        worker.run(page.clone(), request).await?
    } else {
        segment::segment_inline(&page, &request)?
    };

    if let Some(path) = config.debug_overlay.as_deref() {
        segment::debug::render_overlay(&page, &output)
            .save(path)
            .with_context(|| format!("failed to write debug overlay: {}", path))?;
        info!("debug overlay written to {}", path);
    }

    if config.recognize {
        let recognizer = HttpRecognizer::from_settings(&settings)?;
        let regions = recognition::transcribe_regions(
            &recognizer,
            &output.regions,
            TranscribeOptions::from_settings(&settings),
        )
        .await;
        let text = recognition::join_texts(&regions);
        return serde_json::to_string_pretty(&RecognizeOutput { regions, text })
            .with_context(|| "failed to serialize recognition output");
    }
    serde_json::to_string_pretty(&output).with_context(|| "failed to serialize segmentation output")
}

fn load_page(path: &Path) -> Result<RgbaImage> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image: {}", path.display()))?;
    segment::decode_page(&bytes).with_context(|| format!("failed to load image: {}", path.display()))
}

fn file_stem(path: &str) -> Option<String> {
    Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().trim().to_string())
        .filter(|stem| !stem.is_empty())
}

/// Parses `x,y,w,h` into an exclusion mask.
pub fn parse_mask(value: &str) -> Result<ExclusionMask> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid mask '{}': expected x,y,w,h", value))?;
    match parts.as_slice() {
        [x, y, width, height] => Ok(ExclusionMask::new(*x, *y, *width, *height)),
        _ => Err(anyhow!("invalid mask '{}': expected x,y,w,h", value)),
    }
}

/// Parses `Y:COLUMN` into a paragraph cut. A bare `Y` targets column 0.
pub fn parse_paragraph_cut(value: &str) -> Result<ParagraphCut> {
    let (y, column) = match value.split_once(':') {
        Some((y, column)) => (y, Some(column)),
        None => (value, None),
    };
    let y = y
        .trim()
        .parse::<f64>()
        .with_context(|| format!("invalid paragraph cut '{}': bad y", value))?;
    let column_index = match column {
        Some(column) => column
            .trim()
            .parse::<usize>()
            .with_context(|| format!("invalid paragraph cut '{}': bad column", value))?,
        None => 0,
    };
    Ok(ParagraphCut::new(y, column_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba};

    #[test]
    fn masks_parse_from_four_numbers() {
        assert_eq!(
            parse_mask("10, 20.5,30,-4").unwrap(),
            ExclusionMask::new(10.0, 20.5, 30.0, -4.0)
        );
        assert!(parse_mask("1,2,3").is_err());
        assert!(parse_mask("a,b,c,d").is_err());
    }

    #[test]
    fn paragraph_cuts_default_to_first_column() {
        assert_eq!(parse_paragraph_cut("120:1").unwrap(), ParagraphCut::new(120.0, 1));
        assert_eq!(parse_paragraph_cut("80.5").unwrap(), ParagraphCut::new(80.5, 0));
        assert!(parse_paragraph_cut("x:1").is_err());
        assert!(parse_paragraph_cut("10:-1").is_err());
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let mut config = SegmentationConfig::default();
        ConfigOverrides {
            kernel_w: Some(40),
            pad_y: Some(0),
            y_tolerance: Some(0.5),
            ..ConfigOverrides::default()
        }
        .apply(&mut config);
        assert_eq!(config.kernel_w, 40);
        assert_eq!(config.pad_y, 0);
        assert_eq!(config.y_tolerance, 0.5);
        assert_eq!(config.kernel_h, 5);
        assert_eq!(config.min_w, 10);
    }

    #[tokio::test]
    async fn run_segments_an_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = RgbaImage::from_pixel(300, 120, Rgba([255, 255, 255, 255]));
        for y in 40..60 {
            for x in 40..200 {
                page.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let image = dir.path().join("scan.png");
        DynamicImage::ImageRgba8(page).save(&image).unwrap();
        let overlay = dir.path().join("overlay.png");
        let settings = dir.path().join("extra.toml");
        std::fs::write(&settings, "[segmentation]\nkernel_w = 9\n").unwrap();

        let output = run(Config {
            image: Some(image.to_string_lossy().to_string()),
            settings_path: Some(settings.to_string_lossy().to_string()),
            debug_overlay: Some(overlay.to_string_lossy().to_string()),
            scaled: true,
            ..Config::default()
        })
        .await
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        let regions = value["regions"].as_array().unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0]["id"], "scan-0000");
        assert_eq!(regions[0]["x"], 36);
        assert!(overlay.exists());
    }
}
