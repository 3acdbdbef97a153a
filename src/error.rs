use thiserror::Error;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Webcam not available: {0}")]
    CameraAccess(String),

    #[error("Invalid frame size {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },

    #[error("Landmark {0} missing from prediction")]
    MissingLandmark(usize),

    #[error("Asset error: {0}")]
    Asset(String),

    #[error("Frame loop is not running")]
    LoopNotRunning,
}
