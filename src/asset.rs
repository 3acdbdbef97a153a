//! Wireframe assets for the scene and their background loader.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use crate::error::OverlayError;

/// A line-drawn model: vertices in model units, edges as vertex index pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneAsset {
    #[serde(default)]
    pub name: String,
    pub vertices: Vec<[f32; 3]>,
    pub edges: Vec<[u32; 2]>,
}

impl SceneAsset {
    pub fn from_json(content: &str) -> Result<Self, OverlayError> {
        let asset: SceneAsset =
            serde_json::from_str(content).map_err(|e| OverlayError::Asset(e.to_string()))?;
        asset.validate()?;
        Ok(asset)
    }

    pub fn load(path: &Path) -> Result<Self, OverlayError> {
        let content = fs::read_to_string(path)
            .map_err(|e| OverlayError::Asset(format!("{}: {}", path.display(), e)))?;
        let mut asset = Self::from_json(&content)?;
        if asset.name.is_empty() {
            asset.name = path.display().to_string();
        }
        Ok(asset)
    }

    fn validate(&self) -> Result<(), OverlayError> {
        let n = self.vertices.len() as u32;
        if let Some(edge) = self.edges.iter().find(|e| e[0] >= n || e[1] >= n) {
            return Err(OverlayError::Asset(format!(
                "edge {:?} references a missing vertex ({} vertices)",
                edge, n
            )));
        }
        Ok(())
    }

    /// Built-in eyeglasses: two lens rings, a bridge and two temple arms.
    ///
    /// One model unit is half the eye span, so the lens centres sit on the
    /// eyes once the node is scaled by the landmark scale.
    pub fn eyeglasses() -> Self {
        const RING: u32 = 16;
        let lens_rx = 0.8;
        let lens_ry = 0.55;
        let lens_cx = 1.0;

        let mut vertices = Vec::new();
        let mut edges = Vec::new();

        for side in [-1.0f32, 1.0] {
            let base = vertices.len() as u32;
            for i in 0..RING {
                let a = i as f32 / RING as f32 * TAU;
                vertices.push([side * lens_cx + a.cos() * lens_rx, a.sin() * lens_ry, 0.0]);
                edges.push([base + i, base + (i + 1) % RING]);
            }
        }

        // Ring vertex 0 sits at angle 0 (+x), vertex RING / 2 at angle PI (-x).
        let left_inner = 0;
        let left_outer = RING / 2;
        let right_outer = RING;
        let right_inner = RING + RING / 2;

        // bridge
        edges.push([left_inner, right_inner]);

        // Temples run from the outer rims straight back.
        for (rim, side) in [(left_outer, -1.0f32), (right_outer, 1.0)] {
            let rim_pos = vertices[rim as usize];
            let tip = vertices.len() as u32;
            vertices.push([rim_pos[0] + side * 0.1, rim_pos[1], -2.0]);
            edges.push([rim, tip]);
        }

        Self {
            name: "eyeglasses (built-in)".to_string(),
            vertices,
            edges,
        }
    }
}

/// Loads an asset off the frame loop thread.
pub struct AssetLoader {
    rx: Receiver<Result<SceneAsset, OverlayError>>,
}

impl AssetLoader {
    /// Starts loading `path`, or the built-in eyeglasses when `None`.
    pub fn spawn(path: Option<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = match path {
                Some(p) => SceneAsset::load(&p),
                None => Ok(SceneAsset::eyeglasses()),
            };
            let _ = tx.send(result);
        });
        Self { rx }
    }

    /// A loader whose result is already known.
    pub fn ready(asset: SceneAsset) -> Self {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(Ok(asset));
        Self { rx }
    }

    /// Non-blocking check. `None` while the load is still in flight.
    pub fn poll(&self) -> Option<Result<SceneAsset, OverlayError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(OverlayError::Asset(
                "asset loader exited without a result".to_string(),
            ))),
        }
    }

    /// Blocks until the load finishes.
    pub fn wait(self) -> Result<SceneAsset, OverlayError> {
        self.rx
            .recv()
            .map_err(|_| OverlayError::Asset("asset loader exited without a result".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_eyeglasses_is_valid() {
        let asset = SceneAsset::eyeglasses();
        assert!(asset.validate().is_ok());
        assert_eq!(asset.vertices.len(), 34);
        assert_eq!(asset.edges.len(), 35);
        // symmetric about the nose
        let min_x = asset.vertices.iter().map(|v| v[0]).fold(f32::INFINITY, f32::min);
        let max_x = asset.vertices.iter().map(|v| v[0]).fold(f32::NEG_INFINITY, f32::max);
        assert!((min_x + max_x).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_dangling_edge() {
        let json = r#"{ "vertices": [[0,0,0],[1,0,0]], "edges": [[0,1],[1,2]] }"#;
        assert!(matches!(SceneAsset::from_json(json), Err(OverlayError::Asset(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.json");
        fs::write(&path, r#"{ "vertices": [[0,0,0],[1,0,0]], "edges": [[0,1]] }"#).unwrap();

        let asset = AssetLoader::spawn(Some(path.clone())).wait().unwrap();
        assert_eq!(asset.edges, vec![[0, 1]]);
        assert_eq!(asset.name, path.display().to_string());
    }

    #[test]
    fn test_missing_file_fails() {
        let loader = AssetLoader::spawn(Some(PathBuf::from("/nonexistent/glasses.json")));
        assert!(loader.wait().is_err());
    }

    #[test]
    fn test_ready_loader_polls_immediately() {
        let loader = AssetLoader::ready(SceneAsset::eyeglasses());
        assert!(matches!(loader.poll(), Some(Ok(_))));
    }
}
