//! Live webcam eyeglasses try-on.
//!
//! Every frame the face mesh is run on the camera image, the two eye
//! landmarks (33 and 263) are turned into a position, scale and roll, and a
//! wireframe glasses model is drawn over the frame with that placement.

pub mod alert;
pub mod args;
pub mod asset;
pub mod camera;
pub mod config;
pub mod detector;
pub mod error;
pub mod frame_loop;
pub mod landmarks;
pub mod output;
pub mod scene;
pub mod transform;
pub mod types;

pub use error::OverlayError;
pub use frame_loop::{FrameLoop, LoopState, Session};
pub use transform::{compute_overlay_transform, FacePolicy};
pub use types::{FacePrediction, FrameSize, OverlayTransform, Point3D};
