use facemash::config::CameraFacing;
use facemash::tasks::replay::{Manifest, load_frames};
use image::{Rgba, RgbaImage};

fn write_png(dir: &std::path::Path, name: &str) {
    let mut img = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 255, 255]));
    img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    img.save(dir.join(name)).unwrap();
}

#[test]
fn yaml_manifest_resolves_images_next_to_it() {
    let dir = tempfile::tempdir().unwrap();
    write_png(dir.path(), "f0.png");
    let path = dir.path().join("manifest.yaml");
    std::fs::write(
        &path,
        "frames:\n  - image: f0.png\n    landmarks: [[0.1, 0.2], [0.3, 0.4]]\n  - image: f0.png\n",
    )
    .unwrap();

    let manifest = Manifest::from_file(&path).unwrap();
    assert_eq!(manifest.frames.len(), 2);
    assert_eq!(manifest.frames[0].image, dir.path().join("f0.png"));
    assert!(manifest.frames[1].landmarks.is_empty());

    let frames = load_frames(&manifest, CameraFacing::Back).unwrap();
    assert_eq!(frames[0].image.dimensions(), (4, 2));
    assert_eq!(frames[0].landmarks[1], [0.3, 0.4]);
}

#[test]
fn json_manifest_is_detected_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    write_png(dir.path(), "f0.png");
    let path = dir.path().join("manifest.json");
    std::fs::write(
        &path,
        r#"{"frames": [{"image": "f0.png", "landmarks": [[0.25, 0.5]]}]}"#,
    )
    .unwrap();

    let manifest = Manifest::from_file(&path).unwrap();
    let frames = load_frames(&manifest, CameraFacing::Front).unwrap();
    // Front camera frames arrive mirrored.
    assert_eq!(frames[0].landmarks[0], [0.75, 0.5]);
    assert_eq!(frames[0].image.get_pixel(3, 0).0, [255, 0, 0, 255]);
}

#[test]
fn missing_image_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.yaml");
    std::fs::write(&path, "frames:\n  - image: nowhere.png\n").unwrap();

    let manifest = Manifest::from_file(&path).unwrap();
    let err = load_frames(&manifest, CameraFacing::Back).unwrap_err();
    assert!(err.to_string().contains("nowhere.png"));
}

#[test]
fn malformed_manifest_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(Manifest::from_file(&path).is_err());
}
