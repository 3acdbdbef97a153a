use glam::Vec3;

use crate::error::OverlayError;

/// Mesh index of the left eye landmark.
pub const LEFT_EYE: usize = 33;
/// Mesh index of the right eye landmark.
pub const RIGHT_EYE: usize = 263;
/// Number of points produced by the face mesh model.
pub const MESH_POINTS: usize = 468;

/// Represents a single 3D point
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn iou(&self, other: &Rect) -> f32 {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        let inter = (x1 - x0).max(0.0) * (y1 - y0).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One detected face: the dense mesh in frame-pixel coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacePrediction {
    pub keypoints: Vec<Point3D>,
    /// Detector ROI the mesh was regressed from, if any.
    pub bounds: Option<Rect>,
}

impl FacePrediction {
    pub fn new(keypoints: Vec<Point3D>) -> Self {
        Self { keypoints, bounds: None }
    }

    pub fn keypoint(&self, index: usize) -> Result<Point3D, OverlayError> {
        self.keypoints
            .get(index)
            .copied()
            .ok_or(OverlayError::MissingLandmark(index))
    }

    pub fn left_eye(&self) -> Result<Point3D, OverlayError> {
        self.keypoint(LEFT_EYE)
    }

    pub fn right_eye(&self) -> Result<Point3D, OverlayError> {
        self.keypoint(RIGHT_EYE)
    }

    /// Horizontal eye span in pixels, 0 when the eye landmarks are missing.
    pub fn eye_span(&self) -> f32 {
        match (self.left_eye(), self.right_eye()) {
            (Ok(l), Ok(r)) => (l.x - r.x).abs(),
            _ => 0.0,
        }
    }
}

/// Native pixel dimensions of the camera stream. Both sides are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    width: u32,
    height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Result<Self, OverlayError> {
        if width == 0 || height == 0 {
            return Err(OverlayError::InvalidFrameSize { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Position, uniform scale and roll for the glasses node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayTransform {
    pub position: Vec3,
    pub scale: f32,
    /// In-plane roll in radians, measured in pixel space.
    pub rotation_roll: f32,
}
