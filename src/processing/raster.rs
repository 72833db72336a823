//! Software rasterization of region outlines into RGBA crops.

use image::RgbaImage;
use lyon::path::{Path, PathEvent};
use tiny_skia::{
    BlendMode, ColorU8, FillRule, Paint, Pixmap, PixmapPaint, PremultipliedColorU8, Transform,
};

use crate::error::Error;

use super::outline::CropRect;

/// Re-expresses a lyon outline as a tiny-skia path, curves included.
pub fn to_skia_path(path: &Path) -> Option<tiny_skia::Path> {
    let mut pb = tiny_skia::PathBuilder::new();
    for event in path.iter() {
        match event {
            PathEvent::Begin { at } => pb.move_to(at.x, at.y),
            PathEvent::Line { to, .. } => pb.line_to(to.x, to.y),
            PathEvent::Quadratic { ctrl, to, .. } => pb.quad_to(ctrl.x, ctrl.y, to.x, to.y),
            PathEvent::Cubic {
                ctrl1, ctrl2, to, ..
            } => pb.cubic_to(ctrl1.x, ctrl1.y, ctrl2.x, ctrl2.y, to.x, to.y),
            PathEvent::End { close, .. } => {
                if close {
                    pb.close();
                }
            }
        }
    }
    pb.finish()
}

fn blank(crop: &CropRect) -> Result<Pixmap, Error> {
    Pixmap::new(crop.width, crop.height).ok_or_else(|| {
        Error::ResourceAcquisition(format!(
            "cannot allocate a {}x{} crop",
            crop.width, crop.height
        ))
    })
}

fn crop_transform(crop: &CropRect) -> Transform {
    Transform::from_translate(-crop.left, -crop.top)
}

/// Anti-aliased fill of `outline` in a solid color, sized to `crop`.
pub fn fill_outline(
    outline: &tiny_skia::Path,
    crop: &CropRect,
    color: [u8; 3],
) -> Result<Pixmap, Error> {
    let mut pixmap = blank(crop)?;
    let mut paint = Paint::default();
    let [r, g, b] = color;
    paint.set_color_rgba8(r, g, b, 255);
    paint.anti_alias = true;
    pixmap.fill_path(outline, &paint, FillRule::Winding, crop_transform(crop), None);
    Ok(pixmap)
}

/// The part of `source` under `crop`. Pixels outside the source stay transparent.
fn source_crop(source: &RgbaImage, crop: &CropRect) -> Result<Pixmap, Error> {
    let mut pixmap = blank(crop)?;
    let origin_x = crop.left as i64;
    let origin_y = crop.top as i64;
    let width = crop.width as usize;
    for (i, px) in pixmap.pixels_mut().iter_mut().enumerate() {
        let sx = origin_x + (i % width) as i64;
        let sy = origin_y + (i / width) as i64;
        if sx < 0 || sy < 0 || sx >= i64::from(source.width()) || sy >= i64::from(source.height()) {
            continue;
        }
        let [r, g, b, a] = source.get_pixel(sx as u32, sy as u32).0;
        *px = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

/// Source pixels kept only where `outline` covers them (source-in).
pub fn clip_source(
    source: &RgbaImage,
    outline: &tiny_skia::Path,
    crop: &CropRect,
) -> Result<Pixmap, Error> {
    let mut coverage = fill_outline(outline, crop, [255, 255, 255])?;
    let pixels = source_crop(source, crop)?;
    let paint = PixmapPaint {
        blend_mode: BlendMode::SourceIn,
        ..PixmapPaint::default()
    };
    coverage.draw_pixmap(0, 0, pixels.as_ref(), &paint, Transform::identity(), None);
    Ok(coverage)
}

/// Straight-alpha copy of a premultiplied pixmap.
pub fn to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let raw = pixmap
        .pixels()
        .iter()
        .flat_map(|px: &PremultipliedColorU8| {
            let c = px.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), raw)
        .unwrap_or_else(|| RgbaImage::new(pixmap.width(), pixmap.height()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use lyon::math::point;

    fn crop(left: f32, top: f32, width: u32, height: u32) -> CropRect {
        CropRect {
            left,
            top,
            width,
            height,
        }
    }

    fn square(x0: f32, y0: f32, x1: f32, y1: f32) -> tiny_skia::Path {
        let mut builder = Path::builder();
        builder.begin(point(x0, y0));
        builder.line_to(point(x1, y0));
        builder.line_to(point(x1, y1));
        builder.line_to(point(x0, y1));
        builder.end(true);
        to_skia_path(&builder.build()).unwrap()
    }

    #[test]
    fn fill_covers_the_inside_only() {
        let pixmap = fill_outline(
            &square(2.0, 2.0, 6.0, 6.0),
            &crop(0.0, 0.0, 8, 8),
            [230, 200, 170],
        )
        .unwrap();
        let out = to_rgba_image(&pixmap);
        assert_eq!(out.get_pixel(3, 3).0, [230, 200, 170, 255]);
        assert_eq!(out.get_pixel(5, 5).0[3], 255);
        assert_eq!(out.get_pixel(1, 3).0[3], 0);
        assert_eq!(out.get_pixel(6, 3).0[3], 0);
    }

    #[test]
    fn edges_are_anti_aliased() {
        let pixmap =
            fill_outline(&square(0.0, 0.0, 2.5, 4.0), &crop(0.0, 0.0, 4, 4), [0, 0, 0]).unwrap();
        let edge = to_rgba_image(&pixmap).get_pixel(2, 1).0[3];
        assert!(edge > 60 && edge < 200, "edge coverage {edge}");
    }

    #[test]
    fn crop_offset_is_honoured() {
        let pixmap = fill_outline(
            &square(102.0, 52.0, 106.0, 56.0),
            &crop(100.0, 50.0, 8, 8),
            [1, 2, 3],
        )
        .unwrap();
        let out = to_rgba_image(&pixmap);
        assert_eq!(out.get_pixel(3, 3).0[3], 255);
        assert_eq!(out.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn source_in_keeps_color_inside_the_source() {
        let source = RgbaImage::from_pixel(10, 10, Rgba([10, 20, 30, 255]));
        // Crop hangs off the right edge of the source.
        let pixmap =
            clip_source(&source, &square(8.0, 0.0, 12.0, 4.0), &crop(8.0, 0.0, 4, 4)).unwrap();
        let out = to_rgba_image(&pixmap);
        assert_eq!(out.get_pixel(0, 0).0, [10, 20, 30, 255]);
        assert_eq!(out.get_pixel(1, 2).0, [10, 20, 30, 255]);
        assert_eq!(out.get_pixel(2, 0).0[3], 0);
        assert_eq!(out.get_pixel(3, 3).0[3], 0);
    }
}
