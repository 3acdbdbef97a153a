use clap::Parser;
use std::path::Path;

use rusty_glasses::alert;
use rusty_glasses::args::Args;
use rusty_glasses::asset::AssetLoader;
use rusty_glasses::camera::{self, CameraSource, FrameSource};
use rusty_glasses::config::AppConfig;
use rusty_glasses::frame_loop::{FrameLoop, Session};
use rusty_glasses::landmarks::{FaceMeshDetector, LandmarkDetector, SimulatedDetector};
use rusty_glasses::output::WindowOutput;
use rusty_glasses::scene::SceneRenderer;

fn create_detector(config: &AppConfig) -> anyhow::Result<Box<dyn LandmarkDetector>> {
    let models = &config.models;
    if Path::new(&models.mesh_path).exists() {
        Ok(Box::new(FaceMeshDetector::new(
            &models.mesh_path,
            &models.detector_path,
            models.score_threshold,
            models.presence_threshold,
            config.defaults.max_faces,
        )?))
    } else {
        log::warn!("Face mesh model not found at {}. Using a simulated face.", models.mesh_path);
        Ok(Box::new(SimulatedDetector::new()))
    }
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(asset) = &args.asset {
        config.scene.asset_path = Some(asset.clone());
    }
    if let Some(mesh) = &args.mesh_model {
        config.models.mesh_path = mesh.clone();
    }
    if let Some(det) = &args.detector_model {
        config.models.detector_path = det.clone();
    }
    if let Some(policy) = args.face_policy {
        config.defaults.face_policy = policy;
    }
    if let Some(mirror) = args.mirror {
        config.defaults.mirror_mode = mirror;
    }
    if args.show_landmarks {
        config.defaults.show_landmarks = true;
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.list {
        return camera::list_cameras();
    }

    // 0. Load Config
    let mut config = AppConfig::load(&args.config)?;
    apply_overrides(&mut config, &args);

    // 1. Start the asset load; it finishes in the background
    let loader = AssetLoader::spawn(config.asset_path());

    // 2. Setup Camera
    let camera = camera::open_or_alert(
        || CameraSource::open(args.cam_index),
        config.defaults.alert_on_camera_error,
        alert::show_error,
    )?;
    log::info!("Opened camera: {}", camera.name());
    let frame_size = camera.frame_size();

    // 3. Setup Inference
    let detector = create_detector(&config)?;
    log::info!("Active detector: {}", detector.name());

    // 4. Setup Output
    let window = WindowOutput::new(
        "Rusty Glasses",
        frame_size.width() as usize,
        frame_size.height() as usize,
    )?;
    let renderer = SceneRenderer::new(&config.scene, frame_size, loader);

    println!("Controls: [1] Landmarks [5] Mirror [Esc] Quit");

    // 5. Loop
    let session = Session::new(Box::new(camera), detector, renderer, Box::new(window), &config);
    let mut frame_loop = FrameLoop::new(session);
    frame_loop.run()?;

    Ok(())
}
