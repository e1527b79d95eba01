use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::types::{BoundingBox, SegmentationOutput};

const RAW_COLOR: Rgba<u8> = Rgba([150, 150, 150, 255]);
const REGION_COLOR: Rgba<u8> = Rgba([196, 0, 0, 255]);

/// Draws raw detections (grey) under the final regions (red, two pixels
/// wide) on a copy of the page.
pub fn render_overlay(page: &RgbaImage, output: &SegmentationOutput) -> RgbaImage {
    let mut canvas = page.clone();
    for bbox in &output.raw_boxes {
        outline(&mut canvas, bbox, 0, RAW_COLOR);
    }
    for region in &output.regions {
        outline(&mut canvas, &region.bbox, 0, REGION_COLOR);
        outline(&mut canvas, &region.bbox, 1, REGION_COLOR);
    }
    canvas
}

fn outline(canvas: &mut RgbaImage, bbox: &BoundingBox, inset: u32, color: Rgba<u8>) {
    if bbox.width <= inset * 2 || bbox.height <= inset * 2 {
        return;
    }
    let rect = Rect::at((bbox.x + inset) as i32, (bbox.y + inset) as i32)
        .of_size(bbox.width - inset * 2, bbox.height - inset * 2);
    draw_hollow_rect_mut(canvas, rect, color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::types::Region;

    #[test]
    fn overlay_outlines_regions_without_touching_the_source() {
        let page = RgbaImage::from_pixel(50, 50, Rgba([255, 255, 255, 255]));
        let output = SegmentationOutput {
            raw_boxes: vec![BoundingBox::new(2, 2, 10, 10)],
            regions: vec![Region {
                bbox: BoundingBox::new(20, 20, 10, 10),
                id: "page-0000".to_string(),
                image_data: String::new(),
            }],
        };
        let overlay = render_overlay(&page, &output);
        assert_eq!(*overlay.get_pixel(2, 2), RAW_COLOR);
        assert_eq!(*overlay.get_pixel(20, 25), REGION_COLOR);
        assert_eq!(*overlay.get_pixel(21, 25), REGION_COLOR);
        assert_eq!(*overlay.get_pixel(25, 25), Rgba([255, 255, 255, 255]));
        assert_eq!(*page.get_pixel(2, 2), Rgba([255, 255, 255, 255]));
    }
}
