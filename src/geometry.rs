//! Image-space to device-space mapping and the small shape types the
//! compositor passes around.
//!
//! Device coordinates span [-1, 1] on both axes with +y pointing up. Source
//! images are scaled to fill the surface height and centered horizontally, so
//! anything mapped here lines up with the camera passthrough.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NdcPoint {
    pub x: f32,
    pub y: f32,
}

impl NdcPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle. `min` is the lower-left corner in device space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Rect {
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = NdcPoint>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut rect = Rect {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in iter {
            rect.min_x = rect.min_x.min(p.x);
            rect.min_y = rect.min_y.min(p.y);
            rect.max_x = rect.max_x.max(p.x);
            rect.max_y = rect.max_y.max(p.y);
        }
        Some(rect)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    /// Strict overlap test; rectangles that only share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }
}

/// Four corners in device space, ordered top-left, top-right, bottom-right,
/// bottom-left. Extraction writes this order and every consumer reads it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad(pub [NdcPoint; 4]);

impl Quad {
    pub const TOP_LEFT: usize = 0;
    pub const TOP_RIGHT: usize = 1;
    pub const BOTTOM_RIGHT: usize = 2;
    pub const BOTTOM_LEFT: usize = 3;

    pub fn from_corners(
        top_left: NdcPoint,
        top_right: NdcPoint,
        bottom_right: NdcPoint,
        bottom_left: NdcPoint,
    ) -> Self {
        Self([top_left, top_right, bottom_right, bottom_left])
    }

    pub fn corners(&self) -> &[NdcPoint; 4] {
        &self.0
    }

    /// Flattened `[x0, y0, .., x3, y3]` in corner order.
    pub fn to_array(&self) -> [f32; 8] {
        let mut out = [0.0; 8];
        for (i, p) in self.0.iter().enumerate() {
            out[i * 2] = p.x;
            out[i * 2 + 1] = p.y;
        }
        out
    }

    /// Midpoint of the top-left/bottom-right diagonal.
    pub fn center(&self) -> NdcPoint {
        let a = self.0[Self::TOP_LEFT];
        let b = self.0[Self::BOTTOM_RIGHT];
        NdcPoint::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5)
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self(self.0.map(|p| NdcPoint::new(p.x + dx, p.y + dy)))
    }

    /// Scales every corner about [`Quad::center`].
    pub fn scaled(&self, factor: f32) -> Self {
        let c = self.center();
        Self(self.0.map(|p| {
            NdcPoint::new(c.x + (p.x - c.x) * factor, c.y + (p.y - c.y) * factor)
        }))
    }

    pub fn bounds(&self) -> Rect {
        let [a, b, c, d] = self.0;
        Rect {
            min_x: a.x.min(b.x).min(c.x).min(d.x),
            min_y: a.y.min(b.y).min(c.y).min(d.y),
            max_x: a.x.max(b.x).max(c.x).max(d.x),
            max_y: a.y.max(b.y).max(c.y).max(d.y),
        }
    }

    /// Largest per-coordinate difference between two quads.
    pub fn max_abs_diff(&self, other: &Quad) -> f32 {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max)
    }
}

/// Aspect-fill mapping from a source image onto the render surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceMapping {
    scale: f32,
    dx: f32,
    surface_w: f32,
    surface_h: f32,
}

impl SurfaceMapping {
    /// Build a mapping; any zero dimension is rejected rather than divided by.
    pub fn new(image_w: u32, image_h: u32, surface_w: u32, surface_h: u32) -> Result<Self, Error> {
        if image_w == 0 || image_h == 0 || surface_w == 0 || surface_h == 0 {
            return Err(Error::InvalidDimensions {
                image_w,
                image_h,
                surface_w,
                surface_h,
            });
        }
        let scale = surface_h as f32 / image_h as f32;
        let scaled_image_w = image_w as f32 * scale;
        let dx = (scaled_image_w - surface_w as f32) / 2.0;
        Ok(Self {
            scale,
            dx,
            surface_w: surface_w as f32,
            surface_h: surface_h as f32,
        })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Map a pixel position in the source image to device coordinates.
    pub fn map_point(&self, px: f32, py: f32) -> NdcPoint {
        let sx = px * self.scale - self.dx;
        let sy = py * self.scale;
        NdcPoint::new(
            sx / self.surface_w * 2.0 - 1.0,
            1.0 - sy / self.surface_h * 2.0,
        )
    }

    /// Map a pixel-space box (`left, top, right, bottom`) to a device quad.
    pub fn map_rect(&self, left: f32, top: f32, right: f32, bottom: f32) -> Quad {
        Quad::from_corners(
            self.map_point(left, top),
            self.map_point(right, top),
            self.map_point(right, bottom),
            self.map_point(left, bottom),
        )
    }
}

/// One-shot form of [`SurfaceMapping::map_point`].
pub fn map_to_device_space(
    point_px: (f32, f32),
    image_w: u32,
    image_h: u32,
    surface_w: u32,
    surface_h: u32,
) -> Result<NdcPoint, Error> {
    let mapping = SurfaceMapping::new(image_w, image_h, surface_w, surface_h)?;
    Ok(mapping.map_point(point_px.0, point_px.1))
}

/// Render surface size, written by the render thread and read by detection.
///
/// Width and height are packed into one atomic so readers never observe a
/// half-updated pair.
#[derive(Debug, Default)]
pub struct SurfaceSize(AtomicU64);

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self(AtomicU64::new(pack(width, height)))
    }

    pub fn set(&self, width: u32, height: u32) {
        self.0.store(pack(width, height), Ordering::Release);
    }

    pub fn get(&self) -> (u32, u32) {
        let raw = self.0.load(Ordering::Acquire);
        ((raw >> 32) as u32, raw as u32)
    }
}

fn pack(width: u32, height: u32) -> u64 {
    (u64::from(width) << 32) | u64::from(height)
}
