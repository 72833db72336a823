//! Replays recorded frames and landmarks as if they came from a live camera.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{RgbaImage, imageops};
use serde::Deserialize;
use tokio::select;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{CameraFacing, SourceConfig};
use crate::error::Error;
use crate::events::DetectionFrame;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Manifest {
    pub frames: Vec<ManifestFrame>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestFrame {
    /// Relative paths resolve against the manifest's directory.
    pub image: PathBuf,
    /// Normalized `[x, y]` landmarks; empty when no face was detected.
    #[serde(default)]
    pub landmarks: Vec<[f32; 2]>,
}

impl Manifest {
    /// Reads a YAML manifest, or JSON when the extension is `.json`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut manifest: Manifest = if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            serde_json::from_str(&raw)?
        } else {
            serde_yaml::from_str(&raw)?
        };
        if let Some(dir) = path.parent() {
            for frame in &mut manifest.frames {
                if frame.image.is_relative() {
                    frame.image = dir.join(&frame.image);
                }
            }
        }
        Ok(manifest)
    }
}

/// A decoded frame ready to hand to detection.
#[derive(Debug, Clone)]
pub struct ReplayFrame {
    pub image: Arc<RgbaImage>,
    pub landmarks: Arc<Vec<[f32; 2]>>,
}

impl ReplayFrame {
    /// Applies the selfie mirror to both pixels and landmarks.
    pub fn new(image: RgbaImage, landmarks: Vec<[f32; 2]>, facing: CameraFacing) -> Self {
        let (image, landmarks) = if facing.mirrors() {
            let mirrored = landmarks.into_iter().map(|[x, y]| [1.0 - x, y]).collect();
            (imageops::flip_horizontal(&image), mirrored)
        } else {
            (image, landmarks)
        };
        Self {
            image: Arc::new(image),
            landmarks: Arc::new(landmarks),
        }
    }
}

/// Decodes every frame in `manifest` up front.
pub fn load_frames(manifest: &Manifest, facing: CameraFacing) -> Result<Vec<ReplayFrame>> {
    manifest
        .frames
        .iter()
        .map(|frame| {
            let image = image::open(&frame.image)
                .with_context(|| format!("failed to decode {}", frame.image.display()))?
                .into_rgba8();
            Ok(ReplayFrame::new(image, frame.landmarks.clone(), facing))
        })
        .collect()
}

/// Publishes frames at the configured rate. Only the newest frame is kept in
/// the channel, so a slow consumer skips frames instead of queueing them.
pub async fn run(
    frames: Vec<ReplayFrame>,
    cfg: SourceConfig,
    to_detection: watch::Sender<Option<DetectionFrame>>,
    cancel: CancellationToken,
) -> Result<()> {
    if frames.is_empty() {
        info!("replay manifest has no frames");
        return Ok(());
    }

    let mut ticker = interval(cfg.frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sequence = 0_u64;

    loop {
        select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let index = (sequence % frames.len() as u64) as usize;
                if sequence > 0 && index == 0 && !cfg.loop_playback {
                    info!(frames = sequence, "replay finished");
                    break;
                }
                let frame = &frames[index];
                to_detection.send_replace(Some(DetectionFrame {
                    sequence,
                    image: frame.image.clone(),
                    landmarks: frame.landmarks.clone(),
                }));
                debug!(sequence, index, "replay_frame_published");
                sequence += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::time::Duration;

    #[test]
    fn front_camera_mirrors_pixels_and_landmarks() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let frame = ReplayFrame::new(image, vec![[0.25, 0.5]], CameraFacing::Front);
        assert_eq!(frame.image.get_pixel(1, 0).0, [255, 0, 0, 255]);
        assert_eq!(frame.landmarks[0], [0.75, 0.5]);

        let back = ReplayFrame::new(RgbaImage::new(2, 1), vec![[0.25, 0.5]], CameraFacing::Back);
        assert_eq!(back.landmarks[0], [0.25, 0.5]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn publishes_latest_frame_until_cancelled() {
        let frames = vec![
            ReplayFrame::new(RgbaImage::new(4, 4), vec![], CameraFacing::Back),
            ReplayFrame::new(RgbaImage::new(4, 4), vec![[0.5, 0.5]], CameraFacing::Back),
        ];
        let cfg = SourceConfig {
            fps: 200.0,
            ..SourceConfig::default()
        };
        let (tx, mut rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(frames, cfg, tx, cancel.clone()));

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                rx.changed().await.unwrap();
                if rx.borrow().as_ref().is_some_and(|f| f.sequence >= 3) {
                    break;
                }
            }
        })
        .await
        .unwrap();
        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stops_after_one_pass_without_looping() {
        let frames = vec![ReplayFrame::new(RgbaImage::new(1, 1), vec![], CameraFacing::Back)];
        let cfg = SourceConfig {
            fps: 500.0,
            loop_playback: false,
            ..SourceConfig::default()
        };
        let (tx, rx) = watch::channel(None);
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            run(frames, cfg, tx, CancellationToken::new()),
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(rx.borrow().as_ref().map(|f| f.sequence), Some(0));
    }
}
