//! Thin wrappers over `image`/`imageproc` for the handful of raster
//! operations segmentation needs: luma conversion, inverted Otsu
//! binarization, and rectangular morphology.
//!
//! Every function takes its input by reference and returns a fresh owned
//! buffer, so intermediate images are released as soon as they go out of
//! scope, including on early returns and unwinding.

use image::{GrayImage, Luma, RgbaImage};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};

/// Largest kernel side a structuring element can have (`Mask` anchors are
/// stored as `u8`).
pub(crate) const MAX_KERNEL: u32 = 511;

pub(crate) const INK: u8 = 255;
pub(crate) const BACKGROUND: u8 = 0;

/// BT.601 luma, with transparent pixels composited over white so empty
/// canvas areas read as paper.
pub(crate) fn to_luma(rgba: &RgbaImage) -> GrayImage {
    let (width, height) = rgba.dimensions();
    let mut luma = GrayImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = r as f32 * alpha + 255.0 * (1.0 - alpha);
        let g = g as f32 * alpha + 255.0 * (1.0 - alpha);
        let b = b as f32 * alpha + 255.0 * (1.0 - alpha);
        let value = (0.299 * r + 0.587 * g + 0.114 * b).round() as u8;
        luma.put_pixel(x, y, Luma([value]));
    }
    luma
}

/// Otsu threshold, inverted so dark ink becomes foreground (255).
///
/// A page with no contrast at all has no ink.
pub(crate) fn binarize_inverted(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut lo = u8::MAX;
    let mut hi = u8::MIN;
    for pixel in gray.pixels() {
        lo = lo.min(pixel[0]);
        hi = hi.max(pixel[0]);
    }
    if hi <= lo {
        return GrayImage::from_pixel(width, height, Luma([BACKGROUND]));
    }

    threshold(gray, otsu_level(gray), ThresholdType::BinaryInverted)
}

fn line_mask(length: u32, horizontal: bool) -> Mask {
    let length = length.clamp(1, MAX_KERNEL);
    let anchor = (length / 2) as u8;
    if horizontal {
        Mask::from_image(&GrayImage::from_pixel(length, 1, Luma([255])), anchor, 0)
    } else {
        Mask::from_image(&GrayImage::from_pixel(1, length, Luma([255])), 0, anchor)
    }
}

/// Dilation with a `kernel_w x kernel_h` rectangle, done as a row pass
/// followed by a column pass.
pub(crate) fn dilate_rect(image: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
    let rows = if kernel_w > 1 {
        grayscale_dilate(image, &line_mask(kernel_w, true))
    } else {
        image.clone()
    };
    if kernel_h > 1 {
        grayscale_dilate(&rows, &line_mask(kernel_h, false))
    } else {
        rows
    }
}

/// Erosion with a `kernel_w x kernel_h` rectangle.
pub(crate) fn erode_rect(image: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
    let rows = if kernel_w > 1 {
        grayscale_erode(image, &line_mask(kernel_w, true))
    } else {
        image.clone()
    };
    if kernel_h > 1 {
        grayscale_erode(&rows, &line_mask(kernel_h, false))
    } else {
        rows
    }
}

/// Morphological closing (dilate, then erode) with a rectangle.
pub(crate) fn close_rect(image: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
    let dilated = dilate_rect(image, kernel_w, kernel_h);
    erode_rect(&dilated, kernel_w, kernel_h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn count_ink(image: &GrayImage) -> usize {
        image.pixels().filter(|p| p[0] == INK).count()
    }

    #[test]
    fn transparent_pixels_read_as_white() {
        let rgba = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        assert!(to_luma(&rgba).pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn binarize_marks_dark_pixels_as_ink() {
        let mut gray = GrayImage::from_pixel(10, 10, Luma([250]));
        gray.put_pixel(3, 3, Luma([10]));
        gray.put_pixel(4, 3, Luma([20]));
        let binary = binarize_inverted(&gray);
        assert_eq!(binary.get_pixel(3, 3)[0], INK);
        assert_eq!(binary.get_pixel(4, 3)[0], INK);
        assert_eq!(count_ink(&binary), 2);
    }

    #[test]
    fn flat_page_has_no_ink() {
        let gray = GrayImage::from_pixel(8, 8, Luma([255]));
        assert_eq!(count_ink(&binarize_inverted(&gray)), 0);
    }

    #[test]
    fn dilation_grows_by_half_kernel() {
        let mut image = GrayImage::new(21, 21);
        image.put_pixel(10, 10, Luma([INK]));
        let dilated = dilate_rect(&image, 5, 3);
        assert_eq!(count_ink(&dilated), 15);
        assert_eq!(dilated.get_pixel(8, 9)[0], INK);
        assert_eq!(dilated.get_pixel(12, 11)[0], INK);
        assert_eq!(dilated.get_pixel(13, 10)[0], BACKGROUND);
    }

    #[test]
    fn closing_bridges_small_gaps_only() {
        let mut image = GrayImage::new(30, 5);
        for x in (2..8).chain(10..16).chain(25..28) {
            image.put_pixel(x, 2, Luma([INK]));
        }
        let closed = close_rect(&image, 5, 1);
        assert!((2..16).all(|x| closed.get_pixel(x, 2)[0] == INK));
        assert!((17..24).all(|x| closed.get_pixel(x, 2)[0] == BACKGROUND));
    }

    #[test]
    fn unit_kernel_is_identity() {
        let mut image = GrayImage::new(5, 5);
        image.put_pixel(1, 1, Luma([INK]));
        assert_eq!(dilate_rect(&image, 1, 1), image);
        assert_eq!(erode_rect(&image, 1, 1), image);
    }
}
