//! Smoothed region outlines in source-image pixel space.

use lyon::math::{Box2D, Point, point};
use lyon::path::iterator::PathIterator;
use lyon::path::{Path, PathEvent};

/// Maximum deviation, in pixels, between a curve and its flattened polygon.
pub const FLATTEN_TOLERANCE: f32 = 0.25;

/// Builds a closed outline through `points`.
///
/// Interior spans are Catmull-Rom cubics; the first and last spans are
/// straight. Fewer than four points fall back to a plain polygon. Returns
/// `None` when there are not enough points to enclose an area.
pub fn smooth_outline(points: &[Point]) -> Option<Path> {
    if points.len() < 3 {
        return None;
    }

    let mut builder = Path::builder();
    builder.begin(points[0]);

    if points.len() < 4 {
        for p in &points[1..] {
            builder.line_to(*p);
        }
    } else {
        builder.line_to(points[1]);
        for i in 1..points.len() - 2 {
            let p0 = points[i - 1];
            let p1 = points[i];
            let p2 = points[i + 1];
            let p3 = points[i + 2];
            let ctrl1 = point(p1.x + (p2.x - p0.x) / 6.0, p1.y + (p2.y - p0.y) / 6.0);
            let ctrl2 = point(p2.x - (p3.x - p1.x) / 6.0, p2.y - (p3.y - p1.y) / 6.0);
            builder.cubic_bezier_to(ctrl1, ctrl2, p2);
        }
        builder.line_to(points[points.len() - 1]);
    }

    builder.end(true);
    Some(builder.build())
}

/// Flattens `path` into a polygon. The closing vertex is not repeated.
pub fn flatten(path: &Path, tolerance: f32) -> Vec<Point> {
    let mut polygon = Vec::new();
    for event in path.iter().flattened(tolerance) {
        match event {
            PathEvent::Begin { at } => polygon.push(at),
            PathEvent::Line { to, .. } => polygon.push(to),
            _ => {}
        }
    }
    while polygon.len() > 1 && polygon.first() == polygon.last() {
        polygon.pop();
    }
    polygon
}

/// Integer-aligned crop rectangle enclosing a polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub left: f32,
    pub top: f32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Tight bounds snapped outward to whole pixels, at least 1x1.
    pub fn enclosing(polygon: &[Point]) -> Option<Self> {
        if polygon.is_empty() {
            return None;
        }
        let bounds = Box2D::from_points(polygon.iter().copied());
        let left = bounds.min.x.floor();
        let top = bounds.min.y.floor();
        let width = (bounds.max.x.ceil() - left).max(1.0) as u32;
        let height = (bounds.max.y.ceil() - top).max(1.0) as u32;
        Some(Self {
            left,
            top,
            width,
            height,
        })
    }

    pub fn right(&self) -> f32 {
        self.left + self.width as f32
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point> {
        vec![
            point(10.0, 10.0),
            point(30.0, 10.0),
            point(30.0, 30.0),
            point(10.0, 30.0),
            point(10.0, 10.0),
        ]
    }

    #[test]
    fn too_few_points_have_no_outline() {
        assert!(smooth_outline(&[point(0.0, 0.0), point(1.0, 1.0)]).is_none());
    }

    #[test]
    fn triangle_falls_back_to_polygon() {
        let tri = [point(0.0, 0.0), point(4.0, 0.0), point(0.0, 4.0)];
        let polygon = flatten(&smooth_outline(&tri).unwrap(), FLATTEN_TOLERANCE);
        assert_eq!(polygon, tri.to_vec());
    }

    #[test]
    fn outline_passes_through_interior_points() {
        let polygon = flatten(&smooth_outline(&square()).unwrap(), FLATTEN_TOLERANCE);
        for corner in [point(30.0, 10.0), point(30.0, 30.0), point(10.0, 30.0)] {
            assert!(
                polygon.iter().any(|p| (*p - corner).length() < 1e-3),
                "missing {corner:?}"
            );
        }
        assert!(polygon.len() > 5, "interior span should be subdivided");
    }

    #[test]
    fn crop_rect_snaps_outward() {
        let rect = CropRect::enclosing(&[point(1.2, 2.7), point(5.5, 9.1)]).unwrap();
        assert_eq!(
            rect,
            CropRect {
                left: 1.0,
                top: 2.0,
                width: 5,
                height: 8
            }
        );
        assert_eq!(rect.right(), 6.0);
        assert_eq!(rect.bottom(), 10.0);
        assert!(CropRect::enclosing(&[]).is_none());
    }
}
