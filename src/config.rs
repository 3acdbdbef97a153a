use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

use crate::transform::FacePolicy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub defaults: Defaults,
    pub scene: SceneConfig,
    pub models: ModelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub mirror_mode: bool,
    pub show_landmarks: bool,
    pub face_policy: FacePolicy,
    pub max_faces: usize,
    pub alert_on_camera_error: bool,
    pub landmark_color_hex: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    pub camera_z: f32,
    /// z position given to the glasses node
    pub overlay_depth: f32,
    /// Wireframe JSON; the built-in eyeglasses are used when unset
    pub asset_path: Option<String>,
    pub line_color_hex: String,
    pub line_thickness: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub mesh_path: String,
    pub detector_path: String,
    pub score_threshold: f32,
    /// Minimum face flag probability for a mesh to count as a face.
    pub presence_threshold: f32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            mirror_mode: true,
            show_landmarks: false,
            face_policy: FacePolicy::Largest,
            max_faces: 4,
            alert_on_camera_error: true,
            landmark_color_hex: "#FF0000".to_string(),
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            fov_deg: 75.0,
            near: 0.1,
            far: 1000.0,
            camera_z: 5.0,
            overlay_depth: -3.0,
            asset_path: None,
            line_color_hex: "#202020".to_string(),
            line_thickness: 2,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            mesh_path: "face_mesh.onnx".to_string(),
            detector_path: "face_detection.onnx".to_string(),
            score_threshold: 0.7,
            presence_threshold: 0.5,
        }
    }
}

impl AppConfig {
    pub const DEFAULT_PATH: &'static str = "config.json";

    /// Loads the config at `path`, falling back to defaults when the file is
    /// missing or unreadable, then writes it back so new fields show up.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str::<AppConfig>(&content) {
                Ok(c) => {
                    log::info!("Loaded configuration from {}", path.display());
                    c
                }
                Err(e) => {
                    log::warn!("Error parsing config: {}. Loading defaults.", e);
                    Self::default()
                }
            }
        } else {
            log::info!("Configuration file not found. Creating default at {}", path.display());
            Self::default()
        };

        config.save(path)?;

        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn asset_path(&self) -> Option<PathBuf> {
        self.scene.asset_path.as_ref().map(PathBuf::from)
    }
}

/// Parses `#RRGGBB`, falling back to red.
pub fn parse_hex(hex: &str) -> (u8, u8, u8) {
    // byte slicing below needs every char to be one byte
    if hex.len() == 7 && hex.is_ascii() && hex.starts_with('#') {
        let r = u8::from_str_radix(&hex[1..3], 16).unwrap_or(255);
        let g = u8::from_str_radix(&hex[3..5], 16).unwrap_or(0);
        let b = u8::from_str_radix(&hex[5..7], 16).unwrap_or(0);
        (r, g, b)
    } else {
        (255, 0, 0)
    }
}
