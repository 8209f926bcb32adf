//! Reading order for detected regions.
//!
//! Regions are ordered with a recursive XY-cut: the set is bisected at the
//! widest empty band of its projection onto one axis, then each half is cut
//! again on the other axis, until a part cannot be cut any further.
//!
//! For horizontal text the first cut is across the Y axis, so rows come out
//! top to bottom and the parts inside a row left to right. For vertical text
//! the first cut is across the X axis and columns come out right to left, then
//! top to bottom inside a column.

use crate::processors::geometry::BoundingBox;
use std::cmp::Ordering;

/// Dominant writing direction of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingFlow {
    /// Lines run left to right, stacked top to bottom.
    Horizontal,
    /// Lines run top to bottom, stacked right to left.
    Vertical,
}

impl ReadingFlow {
    /// Vertical when more than half of the lines are taller than wide.
    pub fn infer<'a>(lines: impl IntoIterator<Item = &'a BoundingBox>) -> Self {
        let (vertical, total) = lines.into_iter().fold((0usize, 0usize), |(v, t), bbox| {
            (v + usize::from(bbox.is_vertical()), t + 1)
        });
        if total > 0 && vertical * 2 > total {
            Self::Vertical
        } else {
            Self::Horizontal
        }
    }

    fn first_axis(self) -> Axis {
        match self {
            Self::Horizontal => Axis::Y,
            Self::Vertical => Axis::X,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

impl Axis {
    fn other(self) -> Self {
        match self {
            Self::X => Self::Y,
            Self::Y => Self::X,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    index: usize,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
}

impl Span {
    fn interval(&self, axis: Axis) -> (f32, f32) {
        match axis {
            Axis::X => (self.x0, self.x1),
            Axis::Y => (self.y0, self.y1),
        }
    }
}

/// Returns the indices of `boxes` in reading order.
///
/// The result is a permutation of `0..boxes.len()`.
///
/// # Example
///
/// ```
/// use oar_ocr_gateway::processors::{BoundingBox, ReadingFlow, reading_order};
///
/// let boxes = vec![
///     BoundingBox::from_coords(10.0, 50.0, 90.0, 60.0),
///     BoundingBox::from_coords(10.0, 10.0, 90.0, 20.0),
/// ];
/// assert_eq!(reading_order(&boxes, ReadingFlow::Horizontal), vec![1, 0]);
/// ```
pub fn reading_order(boxes: &[BoundingBox], flow: ReadingFlow) -> Vec<usize> {
    let spans: Vec<Span> = boxes
        .iter()
        .enumerate()
        .map(|(index, b)| Span {
            index,
            x0: b.x_min(),
            y0: b.y_min(),
            x1: b.x_max(),
            y1: b.y_max(),
        })
        .collect();

    let mut order = Vec::with_capacity(spans.len());
    cut(spans, flow.first_axis(), flow, &mut order);
    order
}

fn cut(mut spans: Vec<Span>, axis: Axis, flow: ReadingFlow, out: &mut Vec<usize>) {
    if spans.len() <= 1 {
        out.extend(spans.iter().map(|s| s.index));
        return;
    }

    let split = widest_gap(&mut spans, axis)
        .map(|at| (axis, at))
        .or_else(|| widest_gap(&mut spans, axis.other()).map(|at| (axis.other(), at)));

    let Some((used, at)) = split else {
        fallback_sort(&mut spans, flow);
        out.extend(spans.iter().map(|s| s.index));
        return;
    };

    // `widest_gap` leaves the spans sorted along `used`.
    let tail = spans.split_off(at);
    let head = spans;
    let (first, second) = match (used, flow) {
        (Axis::X, ReadingFlow::Vertical) => (tail, head),
        _ => (head, tail),
    };
    cut(first, used.other(), flow, out);
    cut(second, used.other(), flow, out);
}

/// Sorts `spans` along `axis` and returns the split position of the widest
/// empty band in their projection, if there is one.
fn widest_gap(spans: &mut [Span], axis: Axis) -> Option<usize> {
    spans.sort_by(|a, b| {
        let (a0, a1) = a.interval(axis);
        let (b0, b1) = b.interval(axis);
        a0.total_cmp(&b0)
            .then(a1.total_cmp(&b1))
            .then(a.index.cmp(&b.index))
    });

    let mut covered_to = spans[0].interval(axis).1;
    let mut best: Option<(usize, f32)> = None;
    for (pos, span) in spans.iter().enumerate().skip(1) {
        let (start, end) = span.interval(axis);
        let gap = start - covered_to;
        if gap > 0.0 && best.is_none_or(|(_, widest)| gap > widest) {
            best = Some((pos, gap));
        }
        covered_to = covered_to.max(end);
    }
    best.map(|(pos, _)| pos)
}

fn fallback_sort(spans: &mut [Span], flow: ReadingFlow) {
    spans.sort_by(|a, b| {
        let primary = match flow {
            ReadingFlow::Horizontal => a.y0.total_cmp(&b.y0).then(a.x0.total_cmp(&b.x0)),
            ReadingFlow::Vertical => b.x1.total_cmp(&a.x1).then(a.y0.total_cmp(&b.y0)),
        };
        match primary {
            Ordering::Equal => a.index.cmp(&b.index),
            other => other,
        }
    });
}
