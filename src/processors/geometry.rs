//! Geometric primitives for detected regions.
//!
//! Regions coming out of the layout detector are axis-aligned rectangles kept
//! as four corner points in the order the detector emits them:
//! top-left, bottom-left, top-right, bottom-right. Nothing downstream reorders
//! the corners, so the response carries them in that same order.

use serde::{Deserialize, Serialize};

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    /// X-coordinate of the point.
    pub x: f32,
    /// Y-coordinate of the point.
    pub y: f32,
}

impl Point {
    /// Creates a new point with the given coordinates.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A bounding box represented by a collection of points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// The points that define the bounding box.
    pub points: Vec<Point>,
}

impl BoundingBox {
    /// Creates a new bounding box from a vector of points.
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Creates an axis-aligned box from its two extreme corners.
    ///
    /// The corners are stored as `[(x1,y1), (x1,y2), (x2,y1), (x2,y2)]`.
    ///
    /// # Arguments
    ///
    /// * `x1` - The x-coordinate of the top-left corner.
    /// * `y1` - The y-coordinate of the top-left corner.
    /// * `x2` - The x-coordinate of the bottom-right corner.
    /// * `y2` - The y-coordinate of the bottom-right corner.
    pub fn from_coords(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let points = vec![
            Point::new(x1, y1),
            Point::new(x1, y2),
            Point::new(x2, y1),
            Point::new(x2, y2),
        ];
        Self { points }
    }

    /// Gets the minimum x-coordinate, or 0.0 if there are no points.
    pub fn x_min(&self) -> f32 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points
            .iter()
            .map(|p| p.x)
            .fold(f32::INFINITY, f32::min)
    }

    /// Gets the minimum y-coordinate, or 0.0 if there are no points.
    pub fn y_min(&self) -> f32 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points
            .iter()
            .map(|p| p.y)
            .fold(f32::INFINITY, f32::min)
    }

    /// Gets the maximum x-coordinate, or 0.0 if there are no points.
    pub fn x_max(&self) -> f32 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points
            .iter()
            .map(|p| p.x)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Gets the maximum y-coordinate, or 0.0 if there are no points.
    pub fn y_max(&self) -> f32 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points
            .iter()
            .map(|p| p.y)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Width of the axis-aligned hull.
    pub fn width(&self) -> f32 {
        (self.x_max() - self.x_min()).max(0.0)
    }

    /// Height of the axis-aligned hull.
    pub fn height(&self) -> f32 {
        (self.y_max() - self.y_min()).max(0.0)
    }

    /// A region taller than it is wide is read as a vertical line.
    pub fn is_vertical(&self) -> bool {
        self.height() > self.width()
    }

    /// Gets the geometric center (centroid) of the bounding box.
    pub fn center(&self) -> Point {
        if self.points.is_empty() {
            return Point::new(0.0, 0.0);
        }
        let sum_x: f32 = self.points.iter().map(|p| p.x).sum();
        let sum_y: f32 = self.points.iter().map(|p| p.y).sum();
        let count = self.points.len() as f32;
        Point::new(sum_x / count, sum_y / count)
    }

    /// Computes the area of intersection of the axis-aligned hulls.
    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let inter_x_min = self.x_min().max(other.x_min());
        let inter_y_min = self.y_min().max(other.y_min());
        let inter_x_max = self.x_max().min(other.x_max());
        let inter_y_max = self.y_max().min(other.y_max());

        if inter_x_min >= inter_x_max || inter_y_min >= inter_y_max {
            return 0.0;
        }

        (inter_x_max - inter_x_min) * (inter_y_max - inter_y_min)
    }

    /// Intersection over Union of the axis-aligned hulls, in `[0, 1]`.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter_area = self.intersection_area(other);
        if inter_area <= 0.0 {
            return 0.0;
        }

        let union_area =
            self.width() * self.height() + other.width() * other.height() - inter_area;
        if union_area <= 0.0 {
            return 0.0;
        }

        inter_area / union_area
    }

    /// Clamps every corner into `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self::new(
            self.points
                .iter()
                .map(|p| Point::new(p.x.clamp(0.0, w), p.y.clamp(0.0, h)))
                .collect(),
        )
    }

    /// Corners as rounded integer pairs, in stored order.
    pub fn to_int_corners(&self) -> Vec<[i64; 2]> {
        self.points
            .iter()
            .map(|p| [p.x.round() as i64, p.y.round() as i64])
            .collect()
    }
}
