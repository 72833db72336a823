use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use image::RgbaImage;
use tracing::warn;

use crate::error::Error;
use crate::geometry::Quad;
use crate::processing::RegionTexture;

/// One camera frame with its normalized landmarks, as handed from the frame
/// source to detection. An empty landmark list means no face was found.
#[derive(Debug, Clone)]
pub struct DetectionFrame {
    pub sequence: u64,
    pub image: Arc<RgbaImage>,
    pub landmarks: Arc<Vec<[f32; 2]>>,
}

/// Camera image plus the device quad it covers.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub image: Arc<RgbaImage>,
    pub quad: Quad,
}

/// State mutations applied on the render thread, in submission order,
/// before the next frame is planned.
#[derive(Debug, Clone)]
pub enum RenderCommand {
    UpsertRegion(RegionTexture),
    ClearRegions,
    CameraFrame(CameraFrame),
    StartFalling,
    StartSequence,
    StartZoom,
    /// Skip the current sequence region or settle the current zoom region.
    Advance,
    ResetSequence,
    StopGame,
    ToggleDebug,
}

impl RenderCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpsertRegion(_) => "upsert-region",
            Self::ClearRegions => "clear-regions",
            Self::CameraFrame(_) => "camera-frame",
            Self::StartFalling => "start-falling",
            Self::StartSequence => "start-sequence",
            Self::StartZoom => "start-zoom",
            Self::Advance => "advance",
            Self::ResetSequence => "reset-sequence",
            Self::StopGame => "stop-game",
            Self::ToggleDebug => "toggle-debug",
        }
    }

    /// Starting or stopping a game supersedes any pending start.
    pub fn replaces_game(&self) -> bool {
        matches!(
            self,
            Self::StartFalling | Self::StartSequence | Self::StartZoom | Self::StopGame
        )
    }
}

/// Producer side of the render command queue. Never blocks.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: Sender<RenderCommand>,
}

/// Consumer side, owned by the render thread.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: Receiver<RenderCommand>,
}

pub fn command_queue(capacity: usize) -> (CommandQueue, CommandReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (CommandQueue { tx }, CommandReceiver { rx })
}

impl CommandQueue {
    /// Enqueues `cmd`. A full queue drops the command rather than waiting.
    pub fn submit(&self, cmd: RenderCommand) -> Result<(), Error> {
        match self.tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(cmd)) => {
                warn!(command = cmd.name(), "render_command_dropped");
                Err(Error::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::QueueClosed),
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl CommandReceiver {
    /// Takes whatever is queued right now, in order.
    pub fn drain(&self) -> Vec<RenderCommand> {
        let mut out = Vec::with_capacity(self.rx.len());
        loop {
            match self.rx.try_recv() {
                Ok(cmd) => out.push(cmd),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        out
    }
}
