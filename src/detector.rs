use crate::types::Rect;
use anyhow::{Context, Result};
use image::{imageops::FilterType, RgbImage};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

const INPUT_WIDTH: u32 = 320;
const INPUT_HEIGHT: u32 = 240;
const CENTER_VARIANCE: f32 = 0.1;
const SIZE_VARIANCE: f32 = 0.2;
const NMS_IOU: f32 = 0.3;

/// Builds an ONNX session with CoreML preferred and CPU as fallback.
pub(crate) fn open_session(model_path: &str) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .with_execution_providers([
            ort::execution_providers::CoreMLExecutionProvider::default().build(),
            ort::execution_providers::CPUExecutionProvider::default().build(),
        ])?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load model {}", model_path))?;
    Ok(session)
}

/// UltraFace face box detector.
pub struct FaceDetector {
    session: Session,
    anchors: Vec<(f32, f32, f32, f32)>, // cx, cy, w, h
    score_threshold: f32,
    max_faces: usize,
}

impl FaceDetector {
    pub fn new(model_path: &str, score_threshold: f32, max_faces: usize) -> Result<Self> {
        let session = open_session(model_path)?;
        let anchors = generate_anchors(INPUT_WIDTH as usize, INPUT_HEIGHT as usize);
        Ok(Self {
            session,
            anchors,
            score_threshold,
            max_faces,
        })
    }

    /// Returns face boxes in frame pixels, best score first.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Rect>> {
        // 1. Preprocess: Resize to 320x240, NCHW, (pixel - 127) / 128
        let resized = image::imageops::resize(frame, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);

        let plane = (INPUT_WIDTH * INPUT_HEIGHT) as usize;
        let mut input_data = vec![0.0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                input_data[c * plane + i] = (pixel[c] as f32 - 127.0) / 128.0;
            }
        }

        let input_tensor = Tensor::from_array((
            vec![1i64, 3, INPUT_HEIGHT as i64, INPUT_WIDTH as i64],
            input_data,
        ))?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let (_scores_shape, scores_data) = outputs["scores"].try_extract_tensor::<f32>()?;
        let (_boxes_shape, boxes_data) = outputs["boxes"].try_extract_tensor::<f32>()?;

        // 2. Decode + suppress
        let candidates = decode_boxes(&self.anchors, scores_data, boxes_data, self.score_threshold);
        let kept = non_max_suppression(candidates, NMS_IOU, self.max_faces);

        // 3. Scale back to original frame
        let sx = frame.width() as f32 / INPUT_WIDTH as f32;
        let sy = frame.height() as f32 / INPUT_HEIGHT as f32;

        Ok(kept
            .into_iter()
            .map(|(_, r)| Rect::new(r.x * sx, r.y * sy, r.width * sx, r.height * sy))
            .collect())
    }
}

/// Decodes prior boxes above `threshold` into (score, rect) in input pixels.
fn decode_boxes(
    anchors: &[(f32, f32, f32, f32)],
    scores_raw: &[f32],
    boxes_raw: &[f32],
    threshold: f32,
) -> Vec<(f32, Rect)> {
    let count = anchors
        .len()
        .min(scores_raw.len() / 2)
        .min(boxes_raw.len() / 4);

    let mut out = Vec::new();
    for i in 0..count {
        let score = scores_raw[i * 2 + 1];
        if score <= threshold {
            continue;
        }
        let cx_enc = boxes_raw[i * 4];
        let cy_enc = boxes_raw[i * 4 + 1];
        let w_enc = boxes_raw[i * 4 + 2];
        let h_enc = boxes_raw[i * 4 + 3];

        let (ax, ay, aw, ah) = anchors[i];

        let cx = cx_enc * CENTER_VARIANCE * aw + ax;
        let cy = cy_enc * CENTER_VARIANCE * ah + ay;
        let w = (w_enc * SIZE_VARIANCE).exp() * aw;
        let h = (h_enc * SIZE_VARIANCE).exp() * ah;

        let x = cx - w / 2.0;
        let y = cy - h / 2.0;

        out.push((
            score,
            Rect::new(
                x * INPUT_WIDTH as f32,
                y * INPUT_HEIGHT as f32,
                w * INPUT_WIDTH as f32,
                h * INPUT_HEIGHT as f32,
            ),
        ));
    }
    out
}

/// Greedy NMS, highest score first, capped at `max_out` boxes.
fn non_max_suppression(mut candidates: Vec<(f32, Rect)>, iou: f32, max_out: usize) -> Vec<(f32, Rect)> {
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
    let mut kept: Vec<(f32, Rect)> = Vec::new();
    for (score, rect) in candidates {
        if kept.len() >= max_out {
            break;
        }
        if kept.iter().all(|(_, k)| k.iou(&rect) <= iou) {
            kept.push((score, rect));
        }
    }
    kept
}

fn generate_anchors(width: usize, height: usize) -> Vec<(f32, f32, f32, f32)> {
    // UltraFace configs
    let shrinkage_list = [8, 16, 32, 64];
    let min_boxes: [&[f32]; 4] = [
        &[10.0, 16.0, 24.0],
        &[32.0, 48.0],
        &[64.0, 96.0],
        &[128.0, 192.0, 256.0],
    ];
    let mut anchors = Vec::new();

    let w = width as f32;
    let h = height as f32;

    for (i, &shrinkage) in shrinkage_list.iter().enumerate() {
        let feature_h = (height as f32 / shrinkage as f32).ceil() as usize;
        let feature_w = (width as f32 / shrinkage as f32).ceil() as usize;

        for v in 0..feature_h {
            for u in 0..feature_w {
                let cx = (u as f32 * shrinkage as f32 + shrinkage as f32 / 2.0) / w;
                let cy = (v as f32 * shrinkage as f32 + shrinkage as f32 / 2.0) / h;

                for &min_box in min_boxes[i] {
                    anchors.push((cx, cy, min_box / w, min_box / h));
                }
            }
        }
    }
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_count() {
        // 40x30*3 + 20x15*2 + 10x8*2 + 5x4*3
        assert_eq!(generate_anchors(320, 240).len(), 4420);
    }

    #[test]
    fn test_decode_zero_offsets_returns_anchor() {
        let anchors = vec![(0.5, 0.5, 0.25, 0.5), (0.1, 0.1, 0.1, 0.1)];
        let scores = vec![0.1, 0.9, 0.8, 0.2];
        let boxes = vec![0.0; 8];

        let out = decode_boxes(&anchors, &scores, &boxes, 0.7);
        assert_eq!(out.len(), 1);
        let (score, rect) = out[0];
        assert_eq!(score, 0.9);
        assert!((rect.x - 120.0).abs() < 1e-3);
        assert!((rect.y - 60.0).abs() < 1e-3);
        assert!((rect.width - 80.0).abs() < 1e-3);
        assert!((rect.height - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_nms_keeps_distinct_faces() {
        let candidates = vec![
            (0.8, Rect::new(0.0, 0.0, 100.0, 100.0)),
            (0.95, Rect::new(5.0, 5.0, 100.0, 100.0)),
            (0.9, Rect::new(200.0, 0.0, 80.0, 80.0)),
        ];
        let kept = non_max_suppression(candidates.clone(), NMS_IOU, 10);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].0, 0.95);
        assert_eq!(kept[1].0, 0.9);

        let kept = non_max_suppression(candidates, NMS_IOU, 1);
        assert_eq!(kept.len(), 1);
    }
}
