use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exclusive right edge, saturating at `u32::MAX`.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating at `u32::MAX`.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Build a rectangle from float corner coordinates, clipped to the frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn from_corners_clipped(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let left = x1.max(0.0).round() as u32;
        let top = y1.max(0.0).round() as u32;
        let right = (x2.max(0.0).round() as u32).min(frame_width);
        let bottom = (y2.max(0.0).round() as u32).min(frame_height);

        if right <= left || bottom <= top {
            return None;
        }
        Some(Self::new(left, top, right - left, bottom - top))
    }
}

/// A detector rectangle that survived geometric filtering, with its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceCandidate {
    pub rectangle: Rectangle,
    /// Eyes found inside the rectangle. Zero when no eye detector ran.
    pub eye_count: u32,
    pub quality_score: f64,
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub full_name: String,
    pub id_code: String,
    pub department: String,
}
