//! Detect -> compute -> draw, once per display refresh.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};

use crate::camera::FrameSource;
use crate::config::{parse_hex, AppConfig};
use crate::error::OverlayError;
use crate::landmarks::LandmarkDetector;
use crate::output::{Command, Display};
use crate::scene::SceneRenderer;
use crate::transform::{select_transform, FacePolicy};
use crate::types::{FacePrediction, FrameSize, OverlayTransform, LEFT_EYE, RIGHT_EYE};

/// Everything a running overlay owns, in initialization order.
pub struct Session {
    pub camera: Box<dyn FrameSource>,
    pub detector: Box<dyn LandmarkDetector>,
    pub renderer: SceneRenderer,
    pub display: Box<dyn Display>,
    pub frame_size: FrameSize,
    pub options: LoopOptions,
}

impl Session {
    pub fn new(
        camera: Box<dyn FrameSource>,
        detector: Box<dyn LandmarkDetector>,
        renderer: SceneRenderer,
        display: Box<dyn Display>,
        config: &AppConfig,
    ) -> Self {
        let frame_size = camera.frame_size();
        Self {
            camera,
            detector,
            renderer,
            display,
            frame_size,
            options: LoopOptions::from_config(config),
        }
    }
}

/// Per-frame switches; the toggles can flip at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOptions {
    pub mirror: bool,
    pub show_landmarks: bool,
    pub face_policy: FacePolicy,
    pub overlay_depth: f32,
    pub landmark_color: Rgb<u8>,
}

impl LoopOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let (r, g, b) = parse_hex(&config.defaults.landmark_color_hex);
        Self {
            mirror: config.defaults.mirror_mode,
            show_landmarks: config.defaults.show_landmarks,
            face_policy: config.defaults.face_policy,
            overlay_depth: config.scene.overlay_depth,
            landmark_color: Rgb([r, g, b]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    pub frames_with_face: u64,
    pub dropped: u64,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub faces: usize,
    pub transform: Option<OverlayTransform>,
}

pub struct FrameLoop {
    session: Session,
    state: LoopState,
    stats: FrameStats,
    quit: bool,
    last_frame: Option<RgbImage>,
}

impl FrameLoop {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            state: LoopState::Idle,
            stats: FrameStats::default(),
            quit: false,
            last_frame: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Idle -> Running. Camera and detector already exist in the session,
    /// so there is nothing left to wait for.
    pub fn start(&mut self) {
        if self.state == LoopState::Idle {
            log::info!(
                "Starting frame loop: {}x{}, detector '{}'",
                self.session.frame_size.width(),
                self.session.frame_size.height(),
                self.session.detector.name()
            );
            self.state = LoopState::Running;
        }
    }

    /// One detect -> compute -> draw -> present pass.
    ///
    /// A failed capture drops the frame and returns `Ok(None)`. The display
    /// still gets the last good frame (blank before the first one) so the
    /// window keeps handling its events.
    pub fn tick(&mut self) -> Result<Option<TickReport>> {
        if self.state != LoopState::Running {
            return Err(OverlayError::LoopNotRunning.into());
        }

        for cmd in self.session.display.commands() {
            match cmd {
                Command::ToggleLandmarks => {
                    self.session.options.show_landmarks = !self.session.options.show_landmarks
                }
                Command::ToggleMirror => self.session.options.mirror = !self.session.options.mirror,
                Command::Quit => self.quit = true,
            }
        }

        // 1. Capture
        let mut frame = match self.session.camera.capture() {
            Ok(f) => f,
            Err(e) => {
                log::debug!("Dropping frame: {:#}", e);
                self.stats.dropped += 1;
                match &self.last_frame {
                    Some(last) => self.session.display.present(last)?,
                    None => {
                        let size = self.session.frame_size;
                        self.session.display.present(&RgbImage::new(size.width(), size.height()))?
                    }
                }
                return Ok(None);
            }
        };

        let delivered = FrameSize::new(frame.width(), frame.height())?;
        if delivered != self.session.frame_size {
            log::warn!(
                "Camera delivers {}x{} frames, expected {}x{}",
                delivered.width(),
                delivered.height(),
                self.session.frame_size.width(),
                self.session.frame_size.height()
            );
            self.session.frame_size = delivered;
            self.session.renderer.set_frame_size(delivered);
        }
        if self.session.options.mirror {
            image::imageops::flip_horizontal_in_place(&mut frame);
        }

        // 2. Detect
        let predictions = self
            .session
            .detector
            .estimate_faces(&frame)
            .context("Landmark detection failed")?;

        // 3. Compute
        let options = &self.session.options;
        let transform = select_transform(
            &predictions,
            options.face_policy,
            self.session.frame_size,
            options.overlay_depth,
        )?;

        // 4. Draw
        self.session.renderer.poll_asset();
        self.session.renderer.apply_and_draw(transform.as_ref(), &mut frame);
        if self.session.options.show_landmarks {
            draw_landmarks(&mut frame, &predictions, self.session.options.landmark_color);
        }

        // 5. Present
        self.session.display.present(&frame)?;
        self.last_frame = Some(frame);

        self.stats.frames += 1;
        if !predictions.is_empty() {
            self.stats.frames_with_face += 1;
        }

        Ok(Some(TickReport {
            faces: predictions.len(),
            transform,
        }))
    }

    /// Ticks until the display goes away.
    pub fn run(&mut self) -> Result<FrameStats> {
        self.start();
        while !self.quit && self.session.display.is_open() {
            self.tick()?;
        }
        log::info!(
            "Frame loop stopped after {} frames ({} with a face, {} dropped)",
            self.stats.frames,
            self.stats.frames_with_face,
            self.stats.dropped
        );
        Ok(self.stats)
    }
}

/// Debug layer: eye landmarks as 5x5 squares, the rest of the mesh as dots.
/// Drawn onto the fresh camera frame, so last frame's marks never linger.
pub fn draw_landmarks(frame: &mut RgbImage, predictions: &[FacePrediction], color: Rgb<u8>) {
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    for pred in predictions {
        for (i, p) in pred.keypoints.iter().enumerate() {
            let r: i64 = if i == LEFT_EYE || i == RIGHT_EYE { 2 } else { 0 };
            let (x, y) = (p.x.round() as i64, p.y.round() as i64);
            for dy in -r..=r {
                for dx in -r..=r {
                    let (px, py) = (x + dx, y + dy);
                    if px >= 0 && py >= 0 && px < w && py < h {
                        frame.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}
