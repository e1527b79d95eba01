use std::cmp::Ordering;
use std::iter;

use tracing::debug;

use super::geom::{self, NESTING_TOLERANCE};
use super::types::{BoundingBox, ParagraphCut};

/// Height assumed for row grouping when there is nothing to average.
pub(crate) const DEFAULT_AVG_HEIGHT: f64 = 25.0;

/// Column and paragraph cuts resolved to pixel lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Cuts {
    /// Column cuts in the order they were given; this is the split order.
    pub(crate) columns: Vec<u32>,
    /// Column cuts sorted ascending; used for column lookup.
    pub(crate) sorted_columns: Vec<u32>,
    pub(crate) paragraphs: Vec<(u32, usize)>,
}

impl Cuts {
    pub(crate) fn resolve(column_cuts: &[f64], paragraph_cuts: &[ParagraphCut]) -> Self {
        let columns: Vec<u32> = column_cuts
            .iter()
            .filter_map(|&cut| geom::cut_to_pixel(cut))
            .collect();
        let mut sorted_columns = columns.clone();
        sorted_columns.sort_unstable();
        let paragraphs = paragraph_cuts
            .iter()
            .filter_map(|cut| geom::cut_to_pixel(cut.y).map(|y| (y, cut.column_index)))
            .collect();
        Self {
            columns,
            sorted_columns,
            paragraphs,
        }
    }

    pub(crate) fn column_of(&self, bbox: &BoundingBox) -> usize {
        geom::column_index(bbox, &self.sorted_columns)
    }
}

/// Raw detections to final reading-ordered boxes: nesting removal, column
/// splits, paragraph splits, then ordering.
pub(crate) fn refine(raw: &[BoundingBox], cuts: &Cuts, y_tolerance: f64) -> Vec<BoundingBox> {
    let maximal = remove_nested(raw);
    let columns = split_columns(maximal, &cuts.columns);
    let paragraphs = split_paragraphs(columns, cuts);
    let ordered = reading_order(paragraphs, cuts, y_tolerance);
    debug!(
        "refine: {} raw, {} after cuts and ordering",
        raw.len(),
        ordered.len()
    );
    ordered
}

/// Keeps only maximal boxes. A box is dropped when another box contains it
/// (within one pixel per edge); of two boxes that contain each other, the
/// first one survives.
pub(crate) fn remove_nested(boxes: &[BoundingBox]) -> Vec<BoundingBox> {
    boxes
        .iter()
        .enumerate()
        .filter(|&(i, inner)| {
            !boxes.iter().enumerate().any(|(j, outer)| {
                if i == j || !geom::contains(outer, inner, NESTING_TOLERANCE) {
                    return false;
                }
                let mutual = geom::contains(inner, outer, NESTING_TOLERANCE);
                !mutual || j < i
            })
        })
        .map(|(_, bbox)| *bbox)
        .collect()
}

/// Applies every column cut in turn to every box straddling it.
pub(crate) fn split_columns(boxes: Vec<BoundingBox>, columns: &[u32]) -> Vec<BoundingBox> {
    columns.iter().fold(boxes, |acc, &cut| {
        acc.into_iter()
            .flat_map(|bbox| {
                let (first, second) = geom::split_at_x(bbox, cut);
                iter::once(first).chain(second)
            })
            .collect()
    })
}

/// Applies the paragraph cuts of each box's own column.
pub(crate) fn split_paragraphs(boxes: Vec<BoundingBox>, cuts: &Cuts) -> Vec<BoundingBox> {
    if cuts.paragraphs.is_empty() {
        return boxes;
    }
    boxes
        .into_iter()
        .flat_map(|bbox| {
            let column = cuts.column_of(&bbox);
            cuts.paragraphs
                .iter()
                .filter(|(_, cut_column)| *cut_column == column)
                .fold(vec![bbox], |acc, &(y, _)| {
                    acc.into_iter()
                        .flat_map(|part| {
                            let (first, second) = geom::split_at_y(part, y);
                            iter::once(first).chain(second)
                        })
                        .collect()
                })
        })
        .collect()
}

pub(crate) fn average_height(boxes: &[BoundingBox]) -> f64 {
    if boxes.is_empty() {
        return DEFAULT_AVG_HEIGHT;
    }
    boxes.iter().map(|bbox| bbox.height as f64).sum::<f64>() / boxes.len() as f64
}

/// Sorts boxes column-major, then by visual row, then left to right.
///
/// Two boxes share a row when their tops differ by less than
/// `avg_height * y_tolerance`; within a row they order by x, otherwise by y.
/// The row test is not transitive, so the comparator can disagree with
/// itself across a chain of boxes. The stable insertion sort below always
/// terminates with a deterministic result in that case.
pub(crate) fn reading_order(
    boxes: Vec<BoundingBox>,
    cuts: &Cuts,
    y_tolerance: f64,
) -> Vec<BoundingBox> {
    let threshold = average_height(&boxes) * y_tolerance;
    let keyed: Vec<(usize, BoundingBox)> = boxes
        .into_iter()
        .map(|bbox| (cuts.column_of(&bbox), bbox))
        .collect();
    stable_insertion_sort(keyed, |a, b| compare_reading(a, b, threshold))
        .into_iter()
        .map(|(_, bbox)| bbox)
        .collect()
}

fn compare_reading(
    (column_a, a): &(usize, BoundingBox),
    (column_b, b): &(usize, BoundingBox),
    threshold: f64,
) -> Ordering {
    column_a.cmp(column_b).then_with(|| {
        if (a.y.abs_diff(b.y) as f64) < threshold {
            a.x.cmp(&b.x)
        } else {
            a.y.cmp(&b.y)
        }
    })
}

/// Each item moves left past every neighbour that orders strictly after it.
/// Unlike `slice::sort_by`, this never panics on a comparator that is not a
/// total order.
fn stable_insertion_sort<T, F>(items: Vec<T>, mut compare: F) -> Vec<T>
where
    F: FnMut(&T, &T) -> Ordering,
{
    let mut sorted: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        let mut at = sorted.len();
        while at > 0 && compare(&sorted[at - 1], &item) == Ordering::Greater {
            at -= 1;
        }
        sorted.insert(at, item);
    }
    sorted
}
