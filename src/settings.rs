use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::segment::SegmentationConfig;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub segmentation: SegmentationConfig,
    pub downscale_width: u32,
    pub debounce_ms: u64,
    pub recognition_endpoint: String,
    pub recognition_timeout_secs: u64,
    pub recognition_max_retries: usize,
    pub recognition_max_pixels: u64,
    pub recognition_concurrency: usize,
    pub server_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            segmentation: SegmentationConfig::default(),
            downscale_width: 1500,
            debounce_ms: 250,
            recognition_endpoint: "http://127.0.0.1:5000/api/convert".to_string(),
            recognition_timeout_secs: 180,
            recognition_max_retries: 3,
            recognition_max_pixels: 1024 * 1024,
            recognition_concurrency: 2,
            server_addr: "127.0.0.1:8787".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    segmentation: Option<SegmentationSettings>,
    pipeline: Option<PipelineSettings>,
    recognition: Option<RecognitionSettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct SegmentationSettings {
    min_w: Option<u32>,
    min_h: Option<u32>,
    pad_x: Option<u32>,
    pad_y: Option<u32>,
    kernel_w: Option<u32>,
    kernel_h: Option<u32>,
    y_tolerance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineSettings {
    downscale_width: Option<u32>,
    debounce_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RecognitionSettings {
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<usize>,
    max_pixels: Option<u64>,
    concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    load_settings_from(&ordered_paths)
}

/// Applies every existing file in `paths` over the defaults, in order.
pub fn load_settings_from(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    for path in paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }
    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(segmentation) = incoming.segmentation {
            let config = &mut self.segmentation;
            // Padding may legitimately be zero; sizes and kernels may not.
            merge_positive(&mut config.min_w, segmentation.min_w);
            merge_positive(&mut config.min_h, segmentation.min_h);
            if let Some(pad_x) = segmentation.pad_x {
                config.pad_x = pad_x;
            }
            if let Some(pad_y) = segmentation.pad_y {
                config.pad_y = pad_y;
            }
            merge_positive(&mut config.kernel_w, segmentation.kernel_w);
            merge_positive(&mut config.kernel_h, segmentation.kernel_h);
            if let Some(tolerance) = segmentation.y_tolerance
                && tolerance > 0.0
            {
                config.y_tolerance = tolerance;
            }
        }
        if let Some(pipeline) = incoming.pipeline {
            merge_positive(&mut self.downscale_width, pipeline.downscale_width);
            if let Some(debounce) = pipeline.debounce_ms {
                self.debounce_ms = debounce;
            }
        }
        if let Some(recognition) = incoming.recognition {
            if let Some(endpoint) = recognition.endpoint
                && !endpoint.trim().is_empty()
            {
                self.recognition_endpoint = endpoint.trim().to_string();
            }
            merge_positive(&mut self.recognition_timeout_secs, recognition.timeout_secs);
            if let Some(retries) = recognition.max_retries {
                self.recognition_max_retries = retries;
            }
            merge_positive(&mut self.recognition_max_pixels, recognition.max_pixels);
            merge_positive(&mut self.recognition_concurrency, recognition.concurrency);
        }
        if let Some(server) = incoming.server
            && let Some(addr) = server.addr
            && !addr.trim().is_empty()
        {
            self.server_addr = addr.trim().to_string();
        }
    }
}

fn merge_positive<T>(target: &mut T, value: Option<T>)
where
    T: PartialOrd + Default,
{
    if let Some(value) = value
        && value > T::default()
    {
        *target = value;
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".page-segmenter"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn bundled_settings_match_defaults() {
        let parsed: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML).unwrap();
        let mut settings = Settings::default();
        settings.merge(parsed);
        let defaults = Settings::default();
        assert_eq!(settings.segmentation, defaults.segmentation);
        assert_eq!(settings.downscale_width, defaults.downscale_width);
        assert_eq!(settings.recognition_endpoint, defaults.recognition_endpoint);
        assert_eq!(settings.recognition_max_pixels, defaults.recognition_max_pixels);
        assert_eq!(settings.server_addr, defaults.server_addr);
    }

    #[test]
    fn later_files_override_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(
            dir.path(),
            "settings.toml",
            "[segmentation]\nkernel_w = 31\npad_x = 8\n\n[pipeline]\ndownscale_width = 1200\n",
        );
        let local = write(
            dir.path(),
            "settings.local.toml",
            "[segmentation]\npad_x = 0\n\n[server]\naddr = \"0.0.0.0:9000\"\n",
        );
        let missing = dir.path().join("absent.toml");

        let settings = load_settings_from(&[base, missing, local]).unwrap();
        assert_eq!(settings.segmentation.kernel_w, 31);
        assert_eq!(settings.segmentation.pad_x, 0);
        assert_eq!(settings.downscale_width, 1200);
        assert_eq!(settings.server_addr, "0.0.0.0:9000");
        assert_eq!(settings.segmentation.kernel_h, 5);
    }

    #[test]
    fn empty_and_zero_values_do_not_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "settings.toml",
            "[segmentation]\nmin_w = 0\n\n[recognition]\nendpoint = \"  \"\nconcurrency = 0\n",
        );
        let settings = load_settings_from(&[path]).unwrap();
        assert_eq!(settings.segmentation.min_w, 10);
        assert_eq!(settings.recognition_endpoint, Settings::default().recognition_endpoint);
        assert_eq!(settings.recognition_concurrency, 2);
    }

    #[test]
    fn malformed_files_report_their_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "settings.toml", "[segmentation\n");
        let err = load_settings_from(&[path]).unwrap_err();
        assert!(err.to_string().contains("failed to parse settings"));
    }
}
