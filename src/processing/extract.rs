use std::sync::Arc;

use image::RgbaImage;
use lyon::math::point;
use tracing::trace;

use crate::config::ExtractionConfig;
use crate::error::Error;
use crate::geometry::{Quad, SurfaceMapping};
use crate::regions::Region;

use super::fade::apply_radial_fade;
use super::raster::{clip_source, fill_outline, to_rgba_image, to_skia_path};
use super::outline::{CropRect, FLATTEN_TOLERANCE, flatten, smooth_outline};

/// A texture-ready region crop plus where it belongs on screen.
#[derive(Debug, Clone)]
pub struct RegionTexture {
    pub region: Region,
    pub image: Arc<RgbaImage>,
    pub quad: Quad,
}

/// Last rasterized face silhouette, keyed by the quad it was built for.
#[derive(Debug, Clone)]
struct SilhouetteCache {
    key: Quad,
    image: Arc<RgbaImage>,
}

/// Turns landmark outlines into feathered, outline-clipped textures.
///
/// Owned by the detection side; the silhouette cache makes it stateful.
#[derive(Debug)]
pub struct RegionExtractor {
    cfg: ExtractionConfig,
    silhouette: Option<SilhouetteCache>,
}

impl RegionExtractor {
    pub fn new(cfg: ExtractionConfig) -> Self {
        Self {
            cfg,
            silhouette: None,
        }
    }

    /// Extracts `region` from `source`.
    ///
    /// `landmarks` are normalized `[x, y]` pairs in source-image space.
    /// Missing indices are skipped; fewer than three resolved points yields
    /// [`Error::InsufficientLandmarks`] and the caller keeps its previous
    /// texture.
    pub fn extract(
        &mut self,
        region: Region,
        landmarks: &[[f32; 2]],
        source: &RgbaImage,
        mapping: &SurfaceMapping,
    ) -> Result<RegionTexture, Error> {
        let w = source.width() as f32;
        let h = source.height() as f32;
        let points: Vec<_> = region
            .landmark_indices()
            .iter()
            .filter_map(|&i| landmarks.get(i))
            .map(|&[x, y]| point(x * w, y * h))
            .collect();
        let insufficient = || Error::InsufficientLandmarks {
            region,
            resolved: points.len(),
        };

        let path = smooth_outline(&points).ok_or_else(insufficient)?;
        let polygon = flatten(&path, FLATTEN_TOLERANCE);
        if polygon.len() < 3 {
            return Err(insufficient());
        }
        let crop = CropRect::enclosing(&polygon).ok_or_else(insufficient)?;
        let quad = mapping.map_rect(crop.left, crop.top, crop.right(), crop.bottom());
        let outline = to_skia_path(&path).ok_or_else(insufficient)?;

        if region == Region::FullFace {
            let image = self.silhouette(&outline, &crop, quad)?;
            return Ok(RegionTexture {
                region,
                image,
                quad,
            });
        }

        let mut pixmap = clip_source(source, &outline, &crop)?;
        apply_radial_fade(&mut pixmap, self.cfg.fade_strength);
        trace!(
            region = %region,
            width = crop.width,
            height = crop.height,
            "region_extracted"
        );
        Ok(RegionTexture {
            region,
            image: Arc::new(to_rgba_image(&pixmap)),
            quad,
        })
    }

    fn silhouette(
        &mut self,
        outline: &tiny_skia::Path,
        crop: &CropRect,
        quad: Quad,
    ) -> Result<Arc<RgbaImage>, Error> {
        if let Some(cache) = &self.silhouette {
            if cache.key.max_abs_diff(&quad) <= self.cfg.full_face_tolerance {
                return Ok(cache.image.clone());
            }
        }
        let pixmap = fill_outline(outline, crop, self.cfg.full_face_color)?;
        let image = Arc::new(to_rgba_image(&pixmap));
        trace!(
            width = crop.width,
            height = crop.height,
            "face_silhouette_rebuilt"
        );
        self.silhouette = Some(SilhouetteCache {
            key: quad,
            image: image.clone(),
        });
        Ok(image)
    }
}
