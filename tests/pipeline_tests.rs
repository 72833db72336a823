use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use facemash::atlas::MemoryTextures;
use facemash::compositor::Compositor;
use facemash::config::{Configuration, ExtractionConfig};
use facemash::engines::ActiveEngine;
use facemash::events::{DetectionFrame, RenderCommand, command_queue};
use facemash::geometry::{NdcPoint, Quad, SurfaceMapping, SurfaceSize};
use facemash::landmarks::{LandmarkSnapshot, LandmarkStore};
use facemash::processing::{RegionExtractor, RegionTexture};
use facemash::regions::Region;
use facemash::tasks::detection::{self, DetectionOutputs};

fn ring(landmarks: &mut [[f32; 2]], region: Region, cx: f32, cy: f32, r: f32) {
    let indices = region.landmark_indices();
    let n = indices.len() - 1;
    for (k, &i) in indices[..n].iter().enumerate() {
        let a = k as f32 / n as f32 * std::f32::consts::TAU;
        landmarks[i] = [cx + r * a.cos(), cy + r * a.sin()];
    }
}

fn face(region: Region) -> Vec<[f32; 2]> {
    let mut landmarks = vec![[0.5_f32, 0.5]; 468];
    ring(&mut landmarks, region, 0.5, 0.5, 0.2);
    landmarks
}

fn square(region: Region, size: u32) -> RegionTexture {
    RegionTexture {
        region,
        image: Arc::new(RgbaImage::from_pixel(size, size, Rgba([200, 10, 10, 255]))),
        quad: Quad::from_corners(
            NdcPoint::new(-0.2, 0.2),
            NdcPoint::new(0.2, 0.2),
            NdcPoint::new(0.2, -0.2),
            NdcPoint::new(-0.2, -0.2),
        ),
    }
}

fn config() -> Configuration {
    let mut cfg = Configuration::default();
    cfg.games.falling.seed = Some(7);
    cfg
}

fn compositor() -> (Compositor<MemoryTextures>, Arc<LandmarkStore>) {
    let store = Arc::new(LandmarkStore::new());
    (
        Compositor::new(MemoryTextures::new(), &config(), store.clone()),
        store,
    )
}

#[test]
fn queued_upserts_land_in_the_atlas_in_order() {
    let (mut comp, _) = compositor();
    let (queue, rx) = command_queue(8);
    queue.submit(RenderCommand::UpsertRegion(square(Region::Mouth, 4))).unwrap();
    queue.submit(RenderCommand::UpsertRegion(square(Region::Mouth, 6))).unwrap();
    queue.submit(RenderCommand::UpsertRegion(square(Region::Nose, 4))).unwrap();

    assert_eq!(comp.drain_commands(&rx, Instant::now()), 3);
    assert_eq!(comp.atlas().len(), 2);
    let (mouth, _) = comp.atlas().get(Region::Mouth).unwrap();
    assert_eq!(comp.backend().size_of(mouth), Some((6, 6)));
    // The first mouth texture was released when it was replaced.
    assert_eq!(comp.backend().live(), 2);
}

#[test]
fn failed_extraction_keeps_the_previous_texture() {
    let (mut comp, _) = compositor();
    let now = Instant::now();
    comp.apply(RenderCommand::UpsertRegion(square(Region::Nose, 4)), now);
    let before = comp.atlas().get(Region::Nose).unwrap();

    let mut extractor = RegionExtractor::new(ExtractionConfig::default());
    let source = RgbaImage::new(64, 64);
    let mapping = SurfaceMapping::new(64, 64, 64, 64).unwrap();
    let truncated = vec![[0.5_f32, 0.5]; 123];
    assert!(extractor.extract(Region::Nose, &truncated, &source, &mapping).is_err());

    assert_eq!(comp.atlas().get(Region::Nose), Some(before));
}

#[test]
fn clear_releases_every_region_texture() {
    let (mut comp, _) = compositor();
    let now = Instant::now();
    for region in [Region::Mouth, Region::Nose, Region::EyeLeft] {
        comp.apply(RenderCommand::UpsertRegion(square(region, 4)), now);
    }
    comp.apply(RenderCommand::ClearRegions, now);
    assert!(comp.atlas().is_empty());
    assert!(!comp.atlas().has_any());
    assert_eq!(comp.backend().live(), 0);
}

#[test]
fn camera_frames_replace_each_other() {
    let (mut comp, _) = compositor();
    let now = Instant::now();
    for _ in 0..3 {
        comp.apply(
            RenderCommand::CameraFrame(facemash::events::CameraFrame {
                image: Arc::new(RgbaImage::new(8, 8)),
                quad: square(Region::FullFace, 1).quad,
            }),
            now,
        );
    }
    assert_eq!(comp.backend().live(), 1);
    let plan = comp.plan_frame(now);
    assert!(plan.camera.is_some());
    assert_eq!(plan.textured().count(), 1);
}

#[test]
fn falling_draws_while_the_mouth_is_closed() {
    let (mut comp, store) = compositor();
    let now = Instant::now();
    comp.apply(RenderCommand::UpsertRegion(square(Region::Mouth, 4)), now);
    comp.apply(RenderCommand::StartFalling, now);
    assert!(matches!(comp.engine(), ActiveEngine::Falling(_)));

    // No face yet: nothing to catch with, nothing drawn.
    assert!(comp.plan_frame(now).sprites.is_empty());

    store.replace(LandmarkSnapshot::new(vec![NdcPoint::new(0.0, -0.9); 468]));
    let plan = comp.plan_frame(now + Duration::from_millis(100));
    assert_eq!(plan.sprites.len(), 1);
    // The falling game never shows the face backdrop.
    assert!(plan.backdrop.is_none());
}

#[test]
fn falling_without_a_mouth_texture_is_ignored() {
    let (mut comp, _) = compositor();
    comp.apply(RenderCommand::StartFalling, Instant::now());
    assert!(comp.engine().is_none());
}

#[test]
fn pending_falling_starts_once_the_mouth_arrives() {
    let (mut comp, _) = compositor();
    let (queue, rx) = command_queue(8);
    let now = Instant::now();
    comp.queue_game(RenderCommand::StartFalling);

    // Other regions are not enough for the falling game.
    queue.submit(RenderCommand::UpsertRegion(square(Region::Nose, 4))).unwrap();
    comp.drain_commands(&rx, now);
    comp.plan_frame(now);
    assert!(comp.engine().is_none());
    assert!(comp.has_pending_game());

    queue.submit(RenderCommand::UpsertRegion(square(Region::Mouth, 4))).unwrap();
    comp.drain_commands(&rx, now);
    for i in 0..10 {
        comp.plan_frame(now + Duration::from_millis(16 * i));
    }
    assert!(matches!(comp.engine(), ActiveEngine::Falling(_)));
    assert!(!comp.has_pending_game());
}

#[test]
fn pending_game_is_dropped_by_a_manual_start() {
    let (mut comp, _) = compositor();
    let now = Instant::now();
    comp.queue_game(RenderCommand::StartFalling);
    comp.apply(RenderCommand::UpsertRegion(square(Region::Nose, 4)), now);
    comp.apply(RenderCommand::StartZoom, now);
    assert!(!comp.has_pending_game());

    comp.apply(RenderCommand::UpsertRegion(square(Region::Mouth, 4)), now);
    comp.plan_frame(now);
    assert!(matches!(comp.engine(), ActiveEngine::Zoom(_)));
}

#[test]
fn exhausted_falling_releases_its_snapshot() {
    let (mut comp, store) = compositor();
    let now = Instant::now();
    comp.apply(RenderCommand::UpsertRegion(square(Region::Mouth, 4)), now);
    comp.apply(RenderCommand::StartFalling, now);
    assert_eq!(comp.backend().live(), 2);

    store.replace(LandmarkSnapshot::new(vec![NdcPoint::new(0.0, -0.9); 468]));
    comp.plan_frame(now + Duration::from_secs(60));
    assert!(comp.engine().is_none());
    assert_eq!(comp.backend().live(), 1);
}

#[test]
fn sequence_shows_face_backdrop_behind_regions() {
    let (mut comp, store) = compositor();
    let now = Instant::now();
    comp.apply(RenderCommand::UpsertRegion(square(Region::FullFace, 8)), now);
    comp.apply(RenderCommand::UpsertRegion(square(Region::EyeBrowLeft, 4)), now);
    comp.apply(RenderCommand::StartSequence, now);
    store.replace(LandmarkSnapshot::new(vec![NdcPoint::default(); 468]));

    let plan = comp.plan_frame(now);
    let (face, _) = comp.atlas().get(Region::FullFace).unwrap();
    let (brow, _) = comp.atlas().get(Region::EyeBrowLeft).unwrap();
    let order: Vec<_> = plan.textured().map(|d| d.texture).collect();
    assert_eq!(order, vec![face, brow]);

    comp.apply(RenderCommand::StopGame, now);
    assert!(comp.plan_frame(now).backdrop.is_none());
}

#[test]
fn advance_settles_zoom_regions_in_order() {
    let (mut comp, _) = compositor();
    let now = Instant::now();
    for region in Region::game_order() {
        comp.apply(RenderCommand::UpsertRegion(square(region, 4)), now);
    }
    comp.apply(RenderCommand::StartZoom, now);
    comp.apply(RenderCommand::Advance, now + Duration::from_millis(250));
    comp.apply(RenderCommand::Advance, now + Duration::from_millis(500));

    let plan = comp.plan_frame(now + Duration::from_millis(600));
    // Two settled regions plus the one currently zooming.
    assert_eq!(plan.sprites.len(), 3);
    let ActiveEngine::Zoom(zoom) = comp.engine() else {
        panic!("zoom engine expected");
    };
    assert_eq!(zoom.current(), Some(Region::EyeLeft));
}

#[test]
fn debug_toggle_adds_markers_and_mouth_fill() {
    let (mut comp, store) = compositor();
    let mut points = vec![NdcPoint::default(); 468];
    for (k, &i) in Region::MouthOutside.landmark_indices().iter().enumerate() {
        let a = k as f32 * 0.3;
        points[i] = NdcPoint::new(0.1 * a.cos(), 0.1 * a.sin());
    }
    store.replace(LandmarkSnapshot::new(points));

    assert!(comp.plan_frame(Instant::now()).debug_points.is_empty());
    comp.apply(RenderCommand::ToggleDebug, Instant::now());
    let plan = comp.plan_frame(Instant::now());
    assert_eq!(plan.debug_points.len(), 468);
    assert!(plan.debug_mouth.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn detection_publishes_camera_then_regions() {
    let (queue, rx) = command_queue(32);
    let outputs = DetectionOutputs {
        queue,
        landmarks: Arc::new(LandmarkStore::new()),
        surface: Arc::new(SurfaceSize::new(64, 64)),
    };
    let cfg = ExtractionConfig {
        regions: vec![Region::Mouth, Region::Nose],
        ..ExtractionConfig::default()
    };
    let (tx, frames) = watch::channel(None);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(detection::run(frames, outputs.clone(), cfg, cancel.clone()));

    // Only the mouth outline is well-formed; the nose collapses to a point.
    let mut landmarks = face(Region::Mouth);
    for &i in Region::Nose.landmark_indices() {
        landmarks[i] = [0.5, 0.5];
    }
    tx.send_replace(Some(DetectionFrame {
        sequence: 0,
        image: Arc::new(RgbaImage::from_pixel(64, 64, Rgba([90, 120, 150, 255]))),
        landmarks: Arc::new(landmarks),
    }));

    let mut names = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while names.len() < 2 && Instant::now() < deadline {
        names.extend(rx.drain().iter().map(|cmd| match cmd {
            RenderCommand::UpsertRegion(tex) => format!("upsert:{}", tex.region),
            other => other.name().to_string(),
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(names.first().map(String::as_str), Some("camera-frame"));
    assert!(names.contains(&"upsert:MOUTH".to_string()));
    assert!(!names.iter().any(|n| n == "upsert:NOSE"));
    assert_eq!(outputs.landmarks.snapshot().len(), 468);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_landmarks_clear_the_atlas() {
    let (queue, rx) = command_queue(8);
    let store = Arc::new(LandmarkStore::new());
    store.replace(LandmarkSnapshot::new(vec![NdcPoint::default(); 468]));
    let outputs = DetectionOutputs {
        queue,
        landmarks: store.clone(),
        surface: Arc::new(SurfaceSize::new(32, 32)),
    };
    let (tx, frames) = watch::channel(None);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(detection::run(
        frames,
        outputs,
        ExtractionConfig::default(),
        cancel.clone(),
    ));

    tx.send_replace(Some(DetectionFrame {
        sequence: 1,
        image: Arc::new(RgbaImage::new(16, 16)),
        landmarks: Arc::new(Vec::new()),
    }));

    let mut seen = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while seen.len() < 2 && Instant::now() < deadline {
        seen.extend(rx.drain().iter().map(|c| c.name()));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(seen, vec!["clear-regions", "camera-frame"]);
    assert!(store.snapshot().is_empty());
}
