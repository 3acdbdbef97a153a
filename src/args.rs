use clap::Parser;

use crate::transform::FacePolicy;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera Index (default 0)
    #[arg(short, long, default_value_t = 0)]
    pub cam_index: u32,

    /// List available cameras
    #[arg(long)]
    pub list: bool,

    /// Config file (created with defaults if missing)
    #[arg(long, default_value = "config.json")]
    pub config: String,

    /// Wireframe asset JSON (overrides config)
    #[arg(long)]
    pub asset: Option<String>,

    /// Face mesh ONNX model (overrides config)
    #[arg(long)]
    pub mesh_model: Option<String>,

    /// UltraFace detector ONNX model (overrides config)
    #[arg(long)]
    pub detector_model: Option<String>,

    /// Face that drives the glasses: first, last, largest
    #[arg(long)]
    pub face_policy: Option<FacePolicy>,

    /// Mirror the camera output
    #[arg(long)]
    pub mirror: Option<bool>,

    /// Draw the eye landmarks
    #[arg(long)]
    pub show_landmarks: bool,
}
