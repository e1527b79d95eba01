use super::types::BoundingBox;

/// Edge slack used when deciding whether one box sits inside another.
pub(crate) const NESTING_TOLERANCE: i64 = 1;

/// True when `inner` lies within `outer`, allowing each edge to poke out by
/// `tolerance` pixels.
pub(crate) fn contains(outer: &BoundingBox, inner: &BoundingBox, tolerance: i64) -> bool {
    let (ox, oy) = (outer.x as i64, outer.y as i64);
    let (or, ob) = (outer.right() as i64, outer.bottom() as i64);
    inner.x as i64 >= ox - tolerance
        && inner.y as i64 >= oy - tolerance
        && inner.right() as i64 <= or + tolerance
        && inner.bottom() as i64 <= ob + tolerance
}

/// Splits `bbox` at the vertical line `cut` when the line falls strictly
/// inside its horizontal span. Otherwise the box comes back unchanged.
pub(crate) fn split_at_x(bbox: BoundingBox, cut: u32) -> (BoundingBox, Option<BoundingBox>) {
    if cut <= bbox.x || cut >= bbox.right() {
        return (bbox, None);
    }
    let left = BoundingBox::new(bbox.x, bbox.y, cut - bbox.x, bbox.height);
    let right = BoundingBox::new(cut, bbox.y, bbox.right() - cut, bbox.height);
    (left, Some(right))
}

/// Vertical counterpart of [`split_at_x`]: top keeps the origin, bottom
/// starts at the cut.
pub(crate) fn split_at_y(bbox: BoundingBox, cut: u32) -> (BoundingBox, Option<BoundingBox>) {
    if cut <= bbox.y || cut >= bbox.bottom() {
        return (bbox, None);
    }
    let top = BoundingBox::new(bbox.x, bbox.y, bbox.width, cut - bbox.y);
    let bottom = BoundingBox::new(bbox.x, cut, bbox.width, bbox.bottom() - cut);
    (top, Some(bottom))
}

/// Number of sorted column cuts strictly left of the box's horizontal
/// midpoint.
pub(crate) fn column_index(bbox: &BoundingBox, sorted_cuts: &[u32]) -> usize {
    let mid = bbox.mid_x();
    sorted_cuts.partition_point(|&cut| (cut as f64) < mid)
}

/// Converts a dragged cut coordinate to a pixel line. Non-finite values are
/// dropped; negatives collapse to zero, where they can never split a box.
pub(crate) fn cut_to_pixel(value: f64) -> Option<u32> {
    if !value.is_finite() {
        return None;
    }
    Some(value.round().clamp(0.0, u32::MAX as f64) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_allows_one_pixel_slack() {
        let outer = BoundingBox::new(10, 10, 100, 50);
        assert!(contains(&outer, &BoundingBox::new(9, 10, 101, 51), NESTING_TOLERANCE));
        assert!(!contains(&outer, &BoundingBox::new(8, 10, 20, 20), NESTING_TOLERANCE));
        assert!(!contains(&outer, &BoundingBox::new(10, 10, 103, 20), NESTING_TOLERANCE));
    }

    #[test]
    fn vertical_split_reconstructs_width() {
        let original = BoundingBox::new(40, 5, 120, 30);
        let (left, right) = split_at_x(original, 100);
        let right = right.expect("cut inside the box");
        assert_eq!(left.x, original.x);
        assert_eq!(right.x, 100);
        assert_eq!(left.width + right.width, original.width);
        assert_eq!((left.y, left.height), (original.y, original.height));
        assert_eq!((right.y, right.height), (original.y, original.height));
    }

    #[test]
    fn cuts_on_or_outside_edges_are_no_ops() {
        let original = BoundingBox::new(40, 5, 120, 30);
        for cut in [0, 39, 40, 160, 161, 500] {
            assert_eq!(split_at_x(original, cut), (original, None), "cut {cut}");
        }
        for cut in [0, 5, 35, 90] {
            assert_eq!(split_at_y(original, cut), (original, None), "cut {cut}");
        }
    }

    #[test]
    fn horizontal_split_keeps_x_span() {
        let (top, bottom) = split_at_y(BoundingBox::new(3, 10, 50, 40), 25);
        assert_eq!(top, BoundingBox::new(3, 10, 50, 15));
        assert_eq!(bottom, Some(BoundingBox::new(3, 25, 50, 25)));
    }

    #[test]
    fn column_index_counts_cuts_left_of_midpoint() {
        let cuts = [100, 300];
        let boxed = |mid: u32| BoundingBox::new(mid - 10, 0, 20, 10);
        assert_eq!(column_index(&boxed(50), &cuts), 0);
        assert_eq!(column_index(&boxed(150), &cuts), 1);
        assert_eq!(column_index(&boxed(350), &cuts), 2);
        assert_eq!(column_index(&boxed(100), &cuts), 0);
    }

    #[test]
    fn cut_pixels_round_and_clamp() {
        assert_eq!(cut_to_pixel(99.6), Some(100));
        assert_eq!(cut_to_pixel(-12.0), Some(0));
        assert_eq!(cut_to_pixel(f64::NAN), None);
    }
}
