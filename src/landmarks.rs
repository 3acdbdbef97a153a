use anyhow::Result;
use image::{imageops::FilterType, RgbImage};
use ort::session::Session;
use std::path::Path;

use crate::detector::{open_session, FaceDetector};
use crate::types::{FacePrediction, Point3D, Rect, LEFT_EYE, MESH_POINTS, RIGHT_EYE};

const MESH_INPUT: u32 = 192;
const ROI_PADDING: f32 = 0.25;

/// Per-frame face landmark inference.
pub trait LandmarkDetector {
    fn name(&self) -> String;
    /// Zero or more faces found in `frame`. An empty result is not an error.
    fn estimate_faces(&mut self, frame: &RgbImage) -> Result<Vec<FacePrediction>>;
}

/// UltraFace ROIs followed by the 468-point face mesh on each ROI.
pub struct FaceMeshDetector {
    mesh_session: Session,
    detector: Option<FaceDetector>,
    presence_threshold: f32,
}

impl FaceMeshDetector {
    pub fn new(
        mesh_path: &str,
        detector_path: &str,
        score_threshold: f32,
        presence_threshold: f32,
        max_faces: usize,
    ) -> Result<Self> {
        let detector = if Path::new(detector_path).exists() {
            log::info!("Loading Face Detector from {}...", detector_path);
            Some(FaceDetector::new(detector_path, score_threshold, max_faces)?)
        } else {
            log::warn!("Face Detector not found at {}. Running mesh on the full frame.", detector_path);
            None
        };

        log::info!("Loading Face Mesh from {}...", mesh_path);
        let mesh_session = open_session(mesh_path)?;

        Ok(Self {
            mesh_session,
            detector,
            presence_threshold,
        })
    }

    fn run_mesh(&mut self, crop: &RgbImage, offset_x: f32, offset_y: f32) -> Result<Option<Vec<Point3D>>> {
        let scale_x = crop.width() as f32 / MESH_INPUT as f32;
        let scale_y = crop.height() as f32 / MESH_INPUT as f32;

        let resized = image::imageops::resize(crop, MESH_INPUT, MESH_INPUT, FilterType::Triangle);
        let mut input_data = Vec::with_capacity((MESH_INPUT * MESH_INPUT * 3) as usize);
        for pixel in resized.pixels() {
            for c in 0..3 {
                input_data.push((pixel[c] as f32 / 127.5) - 1.0);
            }
        }

        let shape = vec![1i64, MESH_INPUT as i64, MESH_INPUT as i64, 3];
        let input = ort::value::Tensor::from_array((shape, input_data))?;
        let outputs = self.mesh_session.run(ort::inputs![input])?;

        // Second output is the face flag logit; older exports lack it.
        let flag = if outputs.len() > 1 {
            let (_shape, flag_data) = outputs[1].try_extract_tensor::<f32>()?;
            flag_data.first().copied()
        } else {
            None
        };
        if !face_present(flag, self.presence_threshold) {
            return Ok(None);
        }

        let (_output_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(mesh_to_frame(data, offset_x, offset_y, scale_x, scale_y))
    }
}

impl LandmarkDetector for FaceMeshDetector {
    fn name(&self) -> String {
        "Face Mesh (468 pts)".to_string()
    }

    fn estimate_faces(&mut self, frame: &RgbImage) -> Result<Vec<FacePrediction>> {
        // 1. Detect face boxes, or treat the whole frame as one ROI
        let rois: Vec<Option<Rect>> = match &mut self.detector {
            Some(det) => det.detect(frame)?.into_iter().map(Some).collect(),
            None => vec![None],
        };

        // 2. Mesh inference per ROI
        let mut faces = Vec::with_capacity(rois.len());
        for roi in rois {
            let mesh = match roi {
                Some(rect) => {
                    let Some(padded) = pad_and_clip(rect, frame.width(), frame.height()) else {
                        continue;
                    };
                    let crop = image::imageops::crop_imm(
                        frame,
                        padded.x as u32,
                        padded.y as u32,
                        padded.width as u32,
                        padded.height as u32,
                    )
                    .to_image();
                    self.run_mesh(&crop, padded.x.floor(), padded.y.floor())?
                }
                None => self.run_mesh(frame, 0.0, 0.0)?,
            };

            if let Some(keypoints) = mesh {
                faces.push(FacePrediction { keypoints, bounds: roi });
            }
        }
        Ok(faces)
    }
}

/// Grows `rect` by the ROI padding and clips it to the frame.
///
/// `None` when nothing of the box is left inside the frame.
fn pad_and_clip(rect: Rect, frame_w: u32, frame_h: u32) -> Option<Rect> {
    let pad_w = rect.width * ROI_PADDING;
    let pad_h = rect.height * ROI_PADDING;
    let x0 = (rect.x - pad_w / 2.0).max(0.0);
    let y0 = (rect.y - pad_h / 2.0).max(0.0);
    let x1 = (rect.x + rect.width + pad_w / 2.0).min(frame_w as f32);
    let y1 = (rect.y + rect.height + pad_h / 2.0).min(frame_h as f32);

    if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
        return None;
    }
    Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
}

/// Whether the mesh model's face flag logit clears `threshold` after a
/// sigmoid. A model without the flag output always counts as a face.
fn face_present(flag_logit: Option<f32>, threshold: f32) -> bool {
    match flag_logit {
        Some(logit) => 1.0 / (1.0 + (-logit).exp()) >= threshold,
        None => true,
    }
}

/// Mesh local (0..192) -> crop -> full frame.
fn mesh_to_frame(data: &[f32], offset_x: f32, offset_y: f32, scale_x: f32, scale_y: f32) -> Option<Vec<Point3D>> {
    if data.len() < MESH_POINTS * 3 {
        return None;
    }
    Some(
        data.chunks_exact(3)
            .take(MESH_POINTS)
            .map(|p| Point3D {
                x: offset_x + p[0] * scale_x,
                y: offset_y + p[1] * scale_y,
                z: p[2],
            })
            .collect(),
    )
}

/// Stand-in used when no mesh model is available: one face drifting around
/// the middle of the frame with a slow head tilt.
pub struct SimulatedDetector {
    frame_count: u32,
}

impl SimulatedDetector {
    pub fn new() -> Self {
        Self { frame_count: 0 }
    }
}

impl Default for SimulatedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LandmarkDetector for SimulatedDetector {
    fn name(&self) -> String {
        "No ONNX (Simulated Face)".to_string()
    }

    fn estimate_faces(&mut self, frame: &RgbImage) -> Result<Vec<FacePrediction>> {
        self.frame_count = self.frame_count.wrapping_add(1);
        let t = self.frame_count as f32 * 0.05;

        let w = frame.width() as f32;
        let h = frame.height() as f32;
        let cx = w / 2.0 + t.cos() * w * 0.1;
        let cy = h / 2.0 + t.sin() * h * 0.05;
        let half_span = w * 0.06;
        let tilt = (t * 0.7).sin() * 0.2;

        let mut keypoints = Vec::with_capacity(MESH_POINTS);
        for i in 0..MESH_POINTS {
            let angle = (i as f32 / MESH_POINTS as f32) * std::f32::consts::TAU;
            keypoints.push(Point3D::new(
                cx + angle.cos() * half_span * 1.6,
                cy + angle.sin() * half_span * 2.0,
                0.0,
            ));
        }
        // Eyes on a tilted line through the centre, left eye on image left.
        let (dx, dy) = (half_span * tilt.cos(), half_span * tilt.sin());
        keypoints[LEFT_EYE] = Point3D::new(cx - dx, cy - dy, 0.0);
        keypoints[RIGHT_EYE] = Point3D::new(cx + dx, cy + dy, 0.0);

        Ok(vec![FacePrediction::new(keypoints)])
    }
}
