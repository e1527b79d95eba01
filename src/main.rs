use anyhow::Result;
use clap::Parser;

use page_segmenter::{ConfigOverrides, ExclusionMask, ParagraphCut};

#[derive(Parser, Debug)]
#[command(
    name = "page-segmenter",
    version,
    about = "Split a scanned page into reading-ordered text regions"
)]
struct Cli {
    /// Page image to segment (PNG, JPEG, ...)
    image: Option<String>,

    /// Minimum region width in pixels
    #[arg(long = "min-w")]
    min_w: Option<u32>,

    /// Minimum region height in pixels
    #[arg(long = "min-h")]
    min_h: Option<u32>,

    /// Horizontal crop padding
    #[arg(long = "pad-x")]
    pad_x: Option<u32>,

    /// Vertical crop padding
    #[arg(long = "pad-y")]
    pad_y: Option<u32>,

    /// Dilation kernel width
    #[arg(long = "kernel-w")]
    kernel_w: Option<u32>,

    /// Dilation kernel height
    #[arg(long = "kernel-h")]
    kernel_h: Option<u32>,

    /// Row tolerance as a fraction of the average region height
    #[arg(long = "y-tolerance")]
    y_tolerance: Option<f64>,

    /// Exclusion rectangle x,y,w,h (repeatable)
    #[arg(long = "mask", value_parser = parse_mask)]
    masks: Vec<ExclusionMask>,

    /// Vertical column boundary x (repeatable)
    #[arg(long = "column-cut")]
    column_cuts: Vec<f64>,

    /// Paragraph split Y:COLUMN (repeatable)
    #[arg(long = "paragraph-cut", value_parser = parse_paragraph_cut)]
    paragraph_cuts: Vec<ParagraphCut>,

    /// Prefix for region ids (default: image file stem)
    #[arg(long = "page-id")]
    page_id: Option<String>,

    /// Detect on a downscaled copy through the background worker
    #[arg(long = "scaled")]
    scaled: bool,

    /// Width above which --scaled downscales (default from settings)
    #[arg(long = "downscale-width")]
    downscale_width: Option<u32>,

    /// Write a PNG with raw and final boxes drawn on the page
    #[arg(long = "debug-overlay")]
    debug_overlay: Option<String>,

    /// Send regions to the recognition service and print the texts
    #[arg(long = "recognize")]
    recognize: bool,

    /// Start the HTTP server (empty value uses the configured address)
    #[arg(long = "serve", num_args = 0..=1, default_missing_value = "")]
    serve: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn parse_mask(value: &str) -> Result<ExclusionMask, String> {
    page_segmenter::parse_mask(value).map_err(|err| format!("{:#}", err))
}

fn parse_paragraph_cut(value: &str) -> Result<ParagraphCut, String> {
    page_segmenter::parse_paragraph_cut(value).map_err(|err| format!("{:#}", err))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    page_segmenter::logging::init(cli.verbose)?;

    let output = page_segmenter::run(page_segmenter::Config {
        image: cli.image,
        settings_path: cli.read_settings,
        overrides: ConfigOverrides {
            min_w: cli.min_w,
            min_h: cli.min_h,
            pad_x: cli.pad_x,
            pad_y: cli.pad_y,
            kernel_w: cli.kernel_w,
            kernel_h: cli.kernel_h,
            y_tolerance: cli.y_tolerance,
        },
        masks: cli.masks,
        column_cuts: cli.column_cuts,
        paragraph_cuts: cli.paragraph_cuts,
        page_id: cli.page_id,
        scaled: cli.scaled,
        downscale_width: cli.downscale_width,
        debug_overlay: cli.debug_overlay,
        recognize: cli.recognize,
        serve: cli.serve,
    })
    .await?;

    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
