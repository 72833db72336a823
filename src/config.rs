use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use serde::de::{self, Deserializer};

use crate::regions::Region;

/// Which physical camera produced the replayed frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraFacing {
    /// Selfie camera; frames and landmarks are mirrored on ingest.
    #[default]
    Front,
    Back,
}

impl CameraFacing {
    const ALL: &'static [Self] = &[Self::Front, Self::Back];
    const NAMES: &'static [&'static str] = &["front", "back"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
        }
    }

    pub fn mirrors(&self) -> bool {
        matches!(self, Self::Front)
    }
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CameraFacing {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        for facing in Self::ALL {
            if raw == facing.as_str() {
                return Ok(*facing);
            }
        }
        Err(de::Error::unknown_variant(&raw, Self::NAMES))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SourceConfig {
    /// Replay manifest listing frames and their normalized landmarks.
    pub manifest: PathBuf,
    /// Replay rate in frames per second.
    pub fps: f32,
    /// Start over from the first frame when the manifest runs out.
    pub loop_playback: bool,
}

impl SourceConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.fps)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::new(),
            fps: 15.0,
            loop_playback: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RenderConfig {
    pub target_fps: f32,
    pub clear_color: [u8; 3],
    /// Draw red markers on every landmark.
    pub debug_landmarks: bool,
    /// Translucent fill over the outer mouth outline.
    pub debug_mouth_fill: bool,
    /// Bound on pending render commands before producers start dropping.
    pub command_queue_capacity: usize,
    pub window_title: String,
    /// Initial window size; also the surface size for headless runs.
    pub window_size: [u32; 2],
}

impl RenderConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.target_fps)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            clear_color: [0, 0, 0],
            debug_landmarks: false,
            debug_mouth_fill: false,
            command_queue_capacity: 256,
            window_title: "facemash".to_string(),
            window_size: [720, 1280],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExtractionConfig {
    /// Regions extracted from every detection frame.
    pub regions: Vec<Region>,
    /// Radial fade radius multiplier; 1.0 reaches the crop corners.
    pub fade_strength: f32,
    pub full_face_color: [u8; 3],
    /// Largest device-space corner movement that reuses the cached silhouette.
    pub full_face_tolerance: f32,
}

impl ExtractionConfig {
    pub const FULL_FACE_TOLERANCE: f32 = 0.01;

    fn validate(&self) -> Result<()> {
        ensure!(
            self.fade_strength > 0.0,
            "extraction.fade-strength must be positive"
        );
        ensure!(
            self.full_face_tolerance >= 0.0,
            "extraction.full-face-tolerance must not be negative"
        );
        Ok(())
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            regions: Region::ALL.to_vec(),
            fade_strength: 1.0,
            full_face_color: [230, 200, 170],
            full_face_tolerance: Self::FULL_FACE_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FallingConfig {
    #[serde(with = "humantime_serde")]
    pub fall_duration: Duration,
    pub total_repeats: u32,
    pub scale: f32,
    /// Horizontal offsets are drawn uniformly from `[-range, range]`.
    pub horizontal_range: f32,
    pub mouth_open_threshold: f32,
    /// Optional deterministic seed for the offset table.
    pub seed: Option<u64>,
}

impl Default for FallingConfig {
    fn default() -> Self {
        Self {
            fall_duration: Duration::from_secs(4),
            total_repeats: 10,
            scale: 0.7,
            horizontal_range: 0.8,
            mouth_open_threshold: 0.001,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SequenceConfig {
    pub order: Vec<Region>,
    pub start_offset: f32,
    /// Offset decrement applied on every rendered frame.
    pub step: f32,
    pub hide_below: f32,
    pub scale: f32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            order: Region::game_order(),
            start_offset: 2.0,
            step: 0.01,
            hide_below: -2.0,
            scale: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ZoomConfig {
    pub order: Vec<Region>,
    #[serde(with = "humantime_serde")]
    pub cycle: Duration,
    pub max_repeats: u32,
    pub loop_forever: bool,
    /// Repeat limit for regions reached through `Advance`.
    pub next_max_repeats: u32,
    pub next_loop_forever: bool,
    pub scale_from: f32,
    pub scale_to: f32,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            order: Region::game_order(),
            cycle: Duration::from_secs(1),
            max_repeats: 10,
            loop_forever: true,
            next_max_repeats: 10,
            next_loop_forever: false,
            scale_from: 0.5,
            scale_to: 2.5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GamesConfig {
    pub falling: FallingConfig,
    pub sequence: SequenceConfig,
    pub zoom: ZoomConfig,
}

impl GamesConfig {
    fn validate(&self) -> Result<()> {
        let falling = &self.falling;
        ensure!(
            !falling.fall_duration.is_zero(),
            "games.falling.fall-duration must be greater than zero"
        );
        ensure!(
            falling.total_repeats > 0,
            "games.falling.total-repeats must be greater than zero"
        );
        ensure!(falling.scale > 0.0, "games.falling.scale must be positive");
        ensure!(
            falling.horizontal_range >= 0.0,
            "games.falling.horizontal-range must not be negative"
        );

        let sequence = &self.sequence;
        ensure!(
            !sequence.order.is_empty(),
            "games.sequence.order must name at least one region"
        );
        ensure!(sequence.step > 0.0, "games.sequence.step must be positive");
        ensure!(
            sequence.hide_below < sequence.start_offset,
            "games.sequence.hide-below must be below start-offset"
        );

        let zoom = &self.zoom;
        ensure!(
            !zoom.order.is_empty(),
            "games.zoom.order must name at least one region"
        );
        ensure!(
            !zoom.cycle.is_zero(),
            "games.zoom.cycle must be greater than zero"
        );
        ensure!(
            zoom.loop_forever || zoom.max_repeats > 0,
            "games.zoom.max-repeats must be greater than zero unless loop-forever is set"
        );
        ensure!(
            zoom.next_loop_forever || zoom.next_max_repeats > 0,
            "games.zoom.next-max-repeats must be greater than zero unless next-loop-forever is set"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Where replayed frames come from.
    pub source: SourceConfig,
    pub camera_facing: CameraFacing,
    pub render: RenderConfig,
    pub extraction: ExtractionConfig,
    pub games: GamesConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut cfg: Self = serde_yaml::from_str(&s)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        // A relative manifest path is resolved against the config file.
        if cfg.source.manifest.is_relative() && !cfg.source.manifest.as_os_str().is_empty() {
            if let Some(dir) = path.parent() {
                cfg.source.manifest = dir.join(&cfg.source.manifest);
            }
        }
        Ok(cfg)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.source.manifest.as_os_str().is_empty(),
            "source.manifest must be set"
        );
        ensure!(
            self.source.fps.is_finite() && self.source.fps > 0.0,
            "source.fps must be positive"
        );
        ensure!(
            self.render.target_fps.is_finite() && self.render.target_fps > 0.0,
            "render.target-fps must be positive"
        );
        ensure!(
            self.render.window_size.iter().all(|d| *d > 0),
            "render.window-size must be non-zero"
        );
        ensure!(
            self.render.command_queue_capacity > 0,
            "render.command-queue-capacity must be greater than zero"
        );
        self.extraction
            .validate()
            .context("invalid extraction configuration")?;
        self.games
            .validate()
            .context("invalid games configuration")?;
        Ok(self)
    }
}
