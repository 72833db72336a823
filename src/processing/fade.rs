use image::{RgbaImage, imageops};
use tiny_skia::{
    BlendMode, Color, GradientStop, Paint, Pixmap, Point, RadialGradient, Rect, SpreadMode,
    Transform,
};

/// Fraction of the fade radius that stays fully opaque.
pub const FADE_START: f32 = 0.6;

/// Alpha pixels at or below this value count as empty when trimming.
const TRIM_ALPHA_THRESHOLD: u8 = 10;

/// Masks `pixmap` with a radial ramp centered on it (destination-in).
///
/// The ramp radius is the half-diagonal times `strength`; alpha is untouched
/// inside `FADE_START` of that radius and falls linearly to zero at its edge.
pub fn apply_radial_fade(pixmap: &mut Pixmap, strength: f32) {
    let w = pixmap.width() as f32;
    let h = pixmap.height() as f32;
    let center = Point::from_xy(w / 2.0, h / 2.0);
    let radius = (w / 2.0).hypot(h / 2.0) * strength.max(f32::EPSILON);
    let Some(rect) = Rect::from_xywh(0.0, 0.0, w, h) else {
        return;
    };
    let Some(shader) = RadialGradient::new(
        center,
        center,
        radius,
        vec![
            GradientStop::new(FADE_START, Color::BLACK),
            GradientStop::new(1.0, Color::TRANSPARENT),
        ],
        SpreadMode::Pad,
        Transform::identity(),
    ) else {
        return;
    };
    let paint = Paint {
        shader,
        blend_mode: BlendMode::DestinationIn,
        anti_alias: false,
        ..Paint::default()
    };
    pixmap.fill_rect(rect, &paint, Transform::identity(), None);
}

/// Crops to the bounding box of pixels whose alpha exceeds a small threshold.
/// Images with nothing visible are returned unchanged.
pub fn trim_transparent_border(image: &RgbaImage) -> RgbaImage {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    for (x, y, px) in image.enumerate_pixels() {
        if px.0[3] > TRIM_ALPHA_THRESHOLD {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }
    if min_x > max_x || min_y > max_y {
        return image.clone();
    }
    imageops::crop_imm(image, min_x, min_y, max_x - min_x + 1, max_y - min_y + 1).to_image()
}
