//! Device-space landmarks shared between the detection and render threads.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::geometry::{NdcPoint, Rect};
use crate::regions::{LOWER_LIP_INNER, Region, UPPER_LIP_INNER};

/// Immutable per-frame landmark set, already projected to device space.
#[derive(Debug, Clone, Default)]
pub struct LandmarkSnapshot {
    points: Arc<Vec<NdcPoint>>,
}

impl LandmarkSnapshot {
    pub fn new(points: Vec<NdcPoint>) -> Self {
        Self {
            points: Arc::new(points),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn get(&self, index: usize) -> Option<NdcPoint> {
        self.points.get(index).copied()
    }

    pub fn points(&self) -> &[NdcPoint] {
        &self.points
    }

    /// Resolvable outline points for `region`; missing indices are skipped.
    pub fn region_points(&self, region: Region) -> Vec<NdcPoint> {
        region
            .landmark_indices()
            .iter()
            .filter_map(|&i| self.get(i))
            .collect()
    }

    pub fn region_bounds(&self, region: Region) -> Option<Rect> {
        Rect::from_points(self.region_points(region))
    }

    /// Vertical lip gap, or `None` when either lip midpoint is missing.
    pub fn mouth_gap(&self) -> Option<f32> {
        let top = self.get(UPPER_LIP_INNER)?;
        let bottom = self.get(LOWER_LIP_INNER)?;
        Some((bottom.y - top.y).abs())
    }
}

/// Latest landmarks. The lock is held only to swap or clone the `Arc`.
#[derive(Debug, Default)]
pub struct LandmarkStore {
    current: Mutex<LandmarkSnapshot>,
}

impl LandmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, snapshot: LandmarkSnapshot) {
        *self.current.lock() = snapshot;
    }

    pub fn clear(&self) {
        self.replace(LandmarkSnapshot::default());
    }

    pub fn snapshot(&self) -> LandmarkSnapshot {
        self.current.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_with_lips(top: f32, bottom: f32) -> LandmarkSnapshot {
        let mut points = vec![NdcPoint::default(); 468];
        points[UPPER_LIP_INNER] = NdcPoint::new(0.0, top);
        points[LOWER_LIP_INNER] = NdcPoint::new(0.0, bottom);
        LandmarkSnapshot::new(points)
    }

    #[test]
    fn mouth_gap_needs_both_lips() {
        assert_eq!(LandmarkSnapshot::new(vec![NdcPoint::default(); 14]).mouth_gap(), None);
        let gap = face_with_lips(-0.10, -0.15).mouth_gap().unwrap();
        assert!((gap - 0.05).abs() < 1e-6);
    }

    #[test]
    fn region_points_skip_missing_indices() {
        let snapshot = LandmarkSnapshot::new(vec![NdcPoint::new(0.1, 0.1); 100]);
        // 70 (twice), 55, 66 and 63 are the only left-brow indices below 100.
        let points = snapshot.region_points(Region::EyeBrowLeft);
        assert_eq!(points.len(), 5);
        assert!(snapshot.region_points(Region::EyeRight).is_empty());
    }

    #[test]
    fn store_swaps_snapshots() {
        let store = LandmarkStore::new();
        assert!(store.snapshot().is_empty());
        store.replace(face_with_lips(0.0, 0.1));
        assert_eq!(store.snapshot().len(), 468);
        store.clear();
        assert!(store.snapshot().is_empty());
    }
}
