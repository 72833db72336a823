//! Detection side of the pipeline: turns each frame into device-space
//! landmarks and region textures, then hands them to the render thread.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::select;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::error::Error;
use crate::events::{CameraFrame, CommandQueue, DetectionFrame, RenderCommand};
use crate::geometry::{SurfaceMapping, SurfaceSize};
use crate::landmarks::{LandmarkSnapshot, LandmarkStore};
use crate::processing::{RegionExtractor, RegionTexture};
use crate::regions::Region;

/// Shared handles the detection task writes through.
#[derive(Clone)]
pub struct DetectionOutputs {
    pub queue: CommandQueue,
    pub landmarks: Arc<LandmarkStore>,
    pub surface: Arc<SurfaceSize>,
}

pub async fn run(
    mut from_source: watch::Receiver<Option<DetectionFrame>>,
    outputs: DetectionOutputs,
    cfg: ExtractionConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let mut extractor = RegionExtractor::new(cfg.clone());
    loop {
        select! {
            _ = cancel.cancelled() => break,
            changed = from_source.changed() => {
                if changed.is_err() {
                    debug!("frame source closed");
                    break;
                }
            }
        }

        // Whatever arrived while the previous frame was processed is skipped.
        let Some(frame) = from_source.borrow_and_update().clone() else {
            continue;
        };

        let (next, outcome) = process_frame(extractor, frame, &cfg.regions, &outputs).await?;
        extractor = next;
        match outcome {
            Ok(()) => {}
            Err(Error::QueueClosed) => {
                info!("render thread gone; stopping detection");
                break;
            }
            Err(err) => debug!(error = %err, "detection_frame_skipped"),
        }
    }
    Ok(())
}

async fn process_frame(
    mut extractor: RegionExtractor,
    frame: DetectionFrame,
    regions: &[Region],
    outputs: &DetectionOutputs,
) -> Result<(RegionExtractor, Result<(), Error>)> {
    let (width, height) = frame.image.dimensions();
    let (surface_w, surface_h) = outputs.surface.get();
    let mapping = match SurfaceMapping::new(width, height, surface_w, surface_h) {
        Ok(mapping) => mapping,
        Err(err) => return Ok((extractor, Err(err))),
    };

    if frame.landmarks.is_empty() {
        outputs.landmarks.clear();
        debug!(sequence = frame.sequence, error = %Error::NoActiveFace, "atlas_cleared_for_frame");
        let sent = outputs.queue.submit(RenderCommand::ClearRegions);
        let sent = sent.and_then(|()| publish_camera(outputs, &frame, &mapping));
        return Ok((extractor, sent));
    }

    let points = frame
        .landmarks
        .iter()
        .map(|[x, y]| mapping.map_point(x * width as f32, y * height as f32))
        .collect();
    outputs.landmarks.replace(LandmarkSnapshot::new(points));

    if let Err(err) = publish_camera(outputs, &frame, &mapping) {
        return Ok((extractor, Err(err)));
    }

    let regions = regions.to_vec();
    let (extractor, results) = tokio::task::spawn_blocking(move || {
        let results: Vec<(Region, Result<RegionTexture, Error>)> = regions
            .into_iter()
            .map(|region| {
                let result = extractor.extract(region, &frame.landmarks, &frame.image, &mapping);
                (region, result)
            })
            .collect();
        (extractor, results)
    })
    .await
    .context("region extraction worker panicked")?;

    for (region, result) in results {
        match result {
            Ok(texture) => {
                if let Err(err) = outputs.queue.submit(RenderCommand::UpsertRegion(texture)) {
                    if matches!(err, Error::QueueClosed) {
                        return Ok((extractor, Err(err)));
                    }
                }
            }
            Err(Error::InsufficientLandmarks { resolved, .. }) => {
                debug!(region = %region, resolved, "region_extraction_skipped");
            }
            Err(err) => warn!(region = %region, error = %err, "region_extraction_failed"),
        }
    }
    Ok((extractor, Ok(())))
}

fn publish_camera(
    outputs: &DetectionOutputs,
    frame: &DetectionFrame,
    mapping: &SurfaceMapping,
) -> Result<(), Error> {
    let (width, height) = frame.image.dimensions();
    outputs
        .queue
        .submit(RenderCommand::CameraFrame(CameraFrame {
            image: frame.image.clone(),
            quad: mapping.map_rect(0.0, 0.0, width as f32, height as f32),
        }))
}
