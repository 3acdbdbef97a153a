use std::f32::consts::{FRAC_PI_2, PI};
use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::OverlayError;
use crate::types::{FacePrediction, FrameSize, OverlayTransform};

/// Maps the two eye landmarks of one prediction to the glasses transform.
///
/// Pixel space is mapped onto [-1, 1] with the vertical axis flipped; `depth`
/// becomes the z position of the node.
pub fn compute_overlay_transform(
    prediction: &FacePrediction,
    frame: FrameSize,
    depth: f32,
) -> Result<OverlayTransform, OverlayError> {
    let left = prediction.left_eye()?;
    let right = prediction.right_eye()?;

    let center_x = (left.x + right.x) / 2.0;
    let center_y = (left.y + right.y) / 2.0;

    let scale = (left.x - right.x).abs() / 2.0;

    let x = center_x / frame.width() as f32 * 2.0 - 1.0;
    let y = -(center_y / frame.height() as f32) * 2.0 + 1.0;

    let roll = fold_line_angle((left.y - right.y).atan2(left.x - right.x));

    Ok(OverlayTransform {
        position: Vec3::new(x, y, depth),
        scale,
        rotation_roll: roll,
    })
}

/// The eye line has no direction, so its angle is only defined modulo PI.
fn fold_line_angle(angle: f32) -> f32 {
    if angle > FRAC_PI_2 {
        angle - PI
    } else if angle <= -FRAC_PI_2 {
        angle + PI
    } else {
        angle
    }
}

/// Which face drives the single glasses node when several are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacePolicy {
    First,
    Last,
    #[default]
    Largest,
}

impl FacePolicy {
    pub fn select<'a>(&self, predictions: &'a [FacePrediction]) -> Option<&'a FacePrediction> {
        match self {
            FacePolicy::First => predictions.first(),
            FacePolicy::Last => predictions.last(),
            // max_by keeps the last maximum; reverse so ties go to the earlier face
            FacePolicy::Largest => predictions
                .iter()
                .rev()
                .max_by(|a, b| a.eye_span().total_cmp(&b.eye_span())),
        }
    }
}

impl FromStr for FacePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(FacePolicy::First),
            "last" => Ok(FacePolicy::Last),
            "largest" => Ok(FacePolicy::Largest),
            other => Err(anyhow::anyhow!("Unknown face policy '{}'", other)),
        }
    }
}

/// Picks one face with `policy` and computes its transform.
///
/// Returns `Ok(None)` when nothing was detected this frame.
pub fn select_transform(
    predictions: &[FacePrediction],
    policy: FacePolicy,
    frame: FrameSize,
    depth: f32,
) -> Result<Option<OverlayTransform>, OverlayError> {
    match policy.select(predictions) {
        Some(pred) => compute_overlay_transform(pred, frame, depth).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Point3D, LEFT_EYE, MESH_POINTS, RIGHT_EYE};

    fn face(left: (f32, f32), right: (f32, f32)) -> FacePrediction {
        let mut points = vec![Point3D::default(); MESH_POINTS];
        points[LEFT_EYE] = Point3D::new(left.0, left.1, 0.0);
        points[RIGHT_EYE] = Point3D::new(right.0, right.1, 0.0);
        FacePrediction::new(points)
    }

    fn vga() -> FrameSize {
        FrameSize::new(640, 480).unwrap()
    }

    #[test]
    fn test_level_eyes_have_no_roll() {
        for (l, r) in [((100.0, 200.0), (200.0, 200.0)), ((340.0, 90.0), (300.0, 90.0))] {
            let t = compute_overlay_transform(&face(l, r), vga(), -3.0).unwrap();
            assert_eq!(t.rotation_roll, 0.0, "eyes {:?} {:?}", l, r);
        }
    }

    #[test]
    fn test_scale_is_half_eye_span() {
        let t = compute_overlay_transform(&face((100.0, 200.0), (200.0, 200.0)), vga(), -3.0).unwrap();
        assert_eq!(t.scale, 50.0);
    }

    #[test]
    fn test_frame_center_maps_to_origin() {
        let t = compute_overlay_transform(&face((300.0, 240.0), (340.0, 240.0)), vga(), -3.0).unwrap();
        assert_eq!(t.position.x, 0.0);
        assert_eq!(t.position.y, 0.0);
        assert_eq!(t.position.z, -3.0);
    }

    #[test]
    fn test_corners_map_to_unit_square() {
        let top_left = compute_overlay_transform(&face((0.0, 0.0), (0.0, 0.0)), vga(), -3.0).unwrap();
        assert_eq!((top_left.position.x, top_left.position.y), (-1.0, 1.0));
        let bottom_right =
            compute_overlay_transform(&face((640.0, 480.0), (640.0, 480.0)), vga(), -3.0).unwrap();
        assert_eq!((bottom_right.position.x, bottom_right.position.y), (1.0, -1.0));
    }

    #[test]
    fn test_tilted_eyes_roll() {
        // left eye 40px right of and 40px below the right eye
        let t = compute_overlay_transform(&face((340.0, 290.0), (300.0, 250.0)), vga(), -3.0).unwrap();
        assert!((t.rotation_roll - std::f32::consts::FRAC_PI_4).abs() < 1e-6);

        // same line, eyes listed the other way round
        let t = compute_overlay_transform(&face((300.0, 250.0), (340.0, 290.0)), vga(), -3.0).unwrap();
        assert!((t.rotation_roll - std::f32::consts::FRAC_PI_4).abs() < 1e-6);
    }

    #[test]
    fn test_pure_function() {
        let pred = face((311.5, 247.25), (352.0, 255.0));
        let a = compute_overlay_transform(&pred, vga(), -3.0).unwrap();
        let b = compute_overlay_transform(&pred, vga(), -3.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_eye_is_error() {
        let pred = FacePrediction::new(vec![Point3D::default(); 100]);
        assert!(matches!(
            compute_overlay_transform(&pred, vga(), -3.0),
            Err(OverlayError::MissingLandmark(RIGHT_EYE))
        ));
    }

    #[test]
    fn test_face_policy() {
        let small = face((300.0, 250.0), (320.0, 250.0));
        let big = face((100.0, 250.0), (200.0, 250.0));
        let other = face((400.0, 250.0), (420.0, 250.0));
        let faces = vec![small.clone(), big.clone(), other.clone()];

        assert_eq!(FacePolicy::First.select(&faces), Some(&small));
        assert_eq!(FacePolicy::Last.select(&faces), Some(&other));
        assert_eq!(FacePolicy::Largest.select(&faces), Some(&big));
        assert_eq!(FacePolicy::Largest.select(&[]), None);

        // ties resolve to the earlier face
        let twin = face((10.0, 10.0), (30.0, 10.0));
        let faces = vec![small.clone(), twin];
        assert_eq!(FacePolicy::Largest.select(&faces), Some(&small));
    }

    #[test]
    fn test_select_transform_empty() {
        assert_eq!(select_transform(&[], FacePolicy::Largest, vga(), -3.0).unwrap(), None);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("LARGEST".parse::<FacePolicy>().unwrap(), FacePolicy::Largest);
        assert_eq!("last".parse::<FacePolicy>().unwrap(), FacePolicy::Last);
        assert!("middle".parse::<FacePolicy>().is_err());
    }
}
