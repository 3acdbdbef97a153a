use glam::{Mat4, Quat, Vec3, Vec4};
use image::{Rgb, RgbImage};

use crate::asset::{AssetLoader, SceneAsset};
use crate::config::{parse_hex, SceneConfig};
use crate::types::{FrameSize, OverlayTransform};

/// Perspective camera on the z axis looking down -Z.
#[derive(Debug, Clone, Copy)]
pub struct PerspectiveCamera {
    /// Vertical field of view in radians
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
}

impl PerspectiveCamera {
    pub fn new(fov_deg: f32, aspect: f32, near: f32, far: f32, z: f32) -> Self {
        Self {
            fov: fov_deg.to_radians(),
            aspect,
            near,
            far,
            position: Vec3::new(0.0, 0.0, z),
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position - Vec3::Z, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov, self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Half extents (x, y) of the visible plane at world depth `z`.
    pub fn half_extents_at(&self, z: f32) -> (f32, f32) {
        let half_h = (self.position.z - z) * (self.fov / 2.0).tan();
        (half_h * self.aspect, half_h)
    }
}

/// The loaded asset plus its current placement.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub asset: SceneAsset,
    /// x and y in normalized [-1, 1] frame coordinates, z in world units.
    pub position: Vec3,
    /// Model units per frame pixel.
    pub scale: f32,
    /// Rotation about the view axis, scene convention (counter-clockwise).
    pub roll: f32,
}

impl SceneNode {
    pub fn new(asset: SceneAsset) -> Self {
        Self {
            asset,
            position: Vec3::ZERO,
            scale: 1.0,
            roll: 0.0,
        }
    }

    pub fn apply(&mut self, transform: &OverlayTransform) {
        self.position = transform.position;
        self.scale = transform.scale;
        // Pixel y grows downwards, scene y grows upwards.
        self.roll = -transform.rotation_roll;
    }

    /// World placement as seen through `camera` on a frame `frame_height`
    /// pixels tall: x/y are unprojected at the node depth and the pixel
    /// scale is converted to world units at that depth.
    pub fn model_matrix(&self, camera: &PerspectiveCamera, frame_height: f32) -> Mat4 {
        let (half_w, half_h) = camera.half_extents_at(self.position.z);
        let world = Vec3::new(self.position.x * half_w, self.position.y * half_h, self.position.z);
        let world_per_px = 2.0 * half_h / frame_height;
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale * world_per_px),
            Quat::from_rotation_z(self.roll),
            world,
        )
    }
}

/// Where the asset is in its lifecycle.
pub enum AssetState {
    Loading(AssetLoader),
    Ready(SceneNode),
    Failed,
}

pub struct SceneRenderer {
    camera: PerspectiveCamera,
    state: AssetState,
    line_color: Rgb<u8>,
    line_thickness: u32,
}

impl SceneRenderer {
    pub fn new(config: &SceneConfig, frame: FrameSize, loader: AssetLoader) -> Self {
        let (r, g, b) = parse_hex(&config.line_color_hex);
        Self {
            camera: PerspectiveCamera::new(config.fov_deg, frame.aspect(), config.near, config.far, config.camera_z),
            state: AssetState::Loading(loader),
            line_color: Rgb([r, g, b]),
            line_thickness: config.line_thickness.max(1),
        }
    }

    /// Matches the camera aspect to frames of `frame` size.
    pub fn set_frame_size(&mut self, frame: FrameSize) {
        self.camera.aspect = frame.aspect();
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    /// Picks up a finished background load. Never blocks.
    pub fn poll_asset(&mut self) {
        let AssetState::Loading(loader) = &self.state else {
            return;
        };
        match loader.poll() {
            None => {}
            Some(Ok(asset)) => {
                log::info!(
                    "Loaded asset '{}' ({} vertices, {} edges)",
                    asset.name,
                    asset.vertices.len(),
                    asset.edges.len()
                );
                self.state = AssetState::Ready(SceneNode::new(asset));
            }
            Some(Err(e)) => {
                log::error!("Failed to load asset: {}", e);
                self.state = AssetState::Failed;
            }
        }
    }

    pub fn node(&self) -> Option<&SceneNode> {
        match &self.state {
            AssetState::Ready(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, AssetState::Loading(_))
    }

    /// Moves the glasses. Without a transform, or without a loaded asset,
    /// the node keeps whatever placement it had.
    pub fn apply_transform(&mut self, transform: Option<&OverlayTransform>) {
        if let (AssetState::Ready(node), Some(t)) = (&mut self.state, transform) {
            node.apply(t);
        }
    }

    /// Rasterizes the scene on top of `frame`.
    pub fn draw(&self, frame: &mut RgbImage) {
        let Some(node) = self.node() else {
            return;
        };
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        let mvp = self.camera.view_projection_matrix() * node.model_matrix(&self.camera, h);
        let clip: Vec<Vec4> = node
            .asset
            .vertices
            .iter()
            .map(|v| mvp * Vec3::from_array(*v).extend(1.0))
            .collect();

        for edge in &node.asset.edges {
            let a = clip[edge[0] as usize];
            let b = clip[edge[1] as usize];
            let Some((a, b)) = clip_near(a, b, self.camera.near) else {
                continue;
            };
            let (x0, y0) = to_screen(a, w, h);
            let (x1, y1) = to_screen(b, w, h);
            draw_line(frame, (x0, y0), (x1, y1), self.line_color, self.line_thickness);
        }
    }

    pub fn apply_and_draw(&mut self, transform: Option<&OverlayTransform>, frame: &mut RgbImage) {
        self.apply_transform(transform);
        self.draw(frame);
    }
}

/// Clips a clip-space segment against w >= near.
fn clip_near(a: Vec4, b: Vec4, near: f32) -> Option<(Vec4, Vec4)> {
    match (a.w >= near, b.w >= near) {
        (true, true) => Some((a, b)),
        (false, false) => None,
        (a_in, _) => {
            let t = (near - a.w) / (b.w - a.w);
            let cut = a + (b - a) * t;
            if a_in {
                Some((a, cut))
            } else {
                Some((cut, b))
            }
        }
    }
}

fn to_screen(p: Vec4, w: f32, h: f32) -> (f32, f32) {
    let ndc_x = p.x / p.w;
    let ndc_y = p.y / p.w;
    ((ndc_x + 1.0) * 0.5 * w, (1.0 - ndc_y) * 0.5 * h)
}

fn put_pixel(frame: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < frame.width() && (y as u32) < frame.height() {
        frame.put_pixel(x as u32, y as u32, color);
    }
}

/// DDA line with a square brush of `thickness` pixels.
pub fn draw_line(frame: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>, thickness: u32) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let steps = dx.abs().max(dy.abs()).ceil();
    if !steps.is_finite() {
        return;
    }
    // Keep off-screen segments from spinning forever.
    let limit = 4.0 * (frame.width() + frame.height()) as f32;
    let steps = steps.min(limit).max(1.0) as i64;

    let half = thickness as i64 / 2;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let x = (from.0 + dx * t).round() as i64;
        let y = (from.1 + dy * t).round() as i64;
        for oy in -half..(thickness as i64 - half) {
            for ox in -half..(thickness as i64 - half) {
                put_pixel(frame, x + ox, y + oy, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SceneConfig;

    fn renderer_with(asset: SceneAsset) -> SceneRenderer {
        let mut r = SceneRenderer::new(
            &SceneConfig::default(),
            FrameSize::new(640, 480).unwrap(),
            AssetLoader::ready(asset),
        );
        r.poll_asset();
        r
    }

    fn transform(x: f32, y: f32, scale: f32, roll: f32) -> OverlayTransform {
        OverlayTransform {
            position: Vec3::new(x, y, -3.0),
            scale,
            rotation_roll: roll,
        }
    }

    #[test]
    fn test_origin_projects_to_frame_center() {
        let cam = PerspectiveCamera::new(75.0, 640.0 / 480.0, 0.1, 1000.0, 5.0);
        let p = cam.view_projection_matrix() * Vec4::new(0.0, 0.0, -3.0, 1.0);
        let (x, y) = to_screen(p, 640.0, 480.0);
        assert!((x - 320.0).abs() < 1e-3);
        assert!((y - 240.0).abs() < 1e-3);
        // distance from camera ends up in w
        assert!((p.w - 8.0).abs() < 1e-4);
    }

    #[test]
    fn test_transform_ignored_until_asset_ready() {
        let mut r = SceneRenderer::new(
            &SceneConfig::default(),
            FrameSize::new(640, 480).unwrap(),
            AssetLoader::ready(SceneAsset::eyeglasses()),
        );
        assert!(r.is_loading());
        r.apply_transform(Some(&transform(0.5, 0.5, 20.0, 0.0)));
        assert!(r.node().is_none());

        // drawing with nothing loaded leaves the frame alone
        let mut frame = RgbImage::new(64, 48);
        r.draw(&mut frame);
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 0]));

        // the early transform was not stashed anywhere
        r.poll_asset();
        let node = r.node().unwrap();
        assert_eq!(node.position, Vec3::ZERO);
        assert_eq!(node.scale, 1.0);
    }

    #[test]
    fn test_no_transform_keeps_previous_placement() {
        let mut r = renderer_with(SceneAsset::eyeglasses());
        let t = transform(0.25, -0.5, 20.0, 0.1);
        r.apply_transform(Some(&t));
        r.apply_transform(None);

        let node = r.node().unwrap();
        assert_eq!(node.position, t.position);
        assert_eq!(node.scale, 20.0);
        assert_eq!(node.roll, -0.1);
    }

    #[test]
    fn test_failed_load_keeps_drawing_nothing() {
        let mut r = SceneRenderer::new(
            &SceneConfig::default(),
            FrameSize::new(640, 480).unwrap(),
            AssetLoader::spawn(Some(std::path::PathBuf::from("/nonexistent/asset.json"))),
        );
        for _ in 0..200 {
            r.poll_asset();
            if !r.is_loading() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(!r.is_loading());
        assert!(r.node().is_none());
    }

    #[test]
    fn test_draws_line_through_center() {
        let asset = SceneAsset {
            name: "bar".to_string(),
            vertices: vec![[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            edges: vec![[0, 1]],
        };
        let mut r = renderer_with(asset);
        let mut frame = RgbImage::new(640, 480);
        r.apply_and_draw(Some(&transform(0.0, 0.0, 1.0, 0.0)), &mut frame);

        let color = r.line_color;
        assert_eq!(*frame.get_pixel(320, 240), color);
        assert_eq!(*frame.get_pixel(320, 100), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_glasses_land_on_the_eyes() {
        use crate::transform::compute_overlay_transform;
        use crate::types::{FacePrediction, Point3D, LEFT_EYE, MESH_POINTS, RIGHT_EYE};

        // one model unit either side of the centre = one half eye span
        let asset = SceneAsset {
            name: "eye line".to_string(),
            vertices: vec![[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            edges: vec![[0, 1]],
        };
        let mut points = vec![Point3D::default(); MESH_POINTS];
        points[LEFT_EYE] = Point3D::new(580.0, 100.0, 0.0);
        points[RIGHT_EYE] = Point3D::new(620.0, 100.0, 0.0);
        let frame_size = FrameSize::new(640, 480).unwrap();
        let t = compute_overlay_transform(&FacePrediction::new(points), frame_size, -3.0).unwrap();

        let mut r = renderer_with(asset);
        let mut frame = RgbImage::new(640, 480);
        r.apply_and_draw(Some(&t), &mut frame);

        let color = r.line_color;
        for x in [582, 600, 618] {
            assert_eq!(*frame.get_pixel(x, 100), color, "x = {}", x);
        }
        assert_eq!(*frame.get_pixel(570, 100), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(600, 110), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(320, 240), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_half_extents_at_depth() {
        let cam = PerspectiveCamera::new(90.0, 2.0, 0.1, 1000.0, 5.0);
        let (hw, hh) = cam.half_extents_at(-3.0);
        assert!((hh - 8.0).abs() < 1e-4);
        assert!((hw - 16.0).abs() < 1e-4);
    }

    #[test]
    fn test_roll_is_flipped_for_scene() {
        let mut r = renderer_with(SceneAsset::eyeglasses());
        r.apply_transform(Some(&transform(0.0, 0.0, 1.0, 0.3)));
        assert_eq!(r.node().unwrap().roll, -0.3);
    }

    #[test]
    fn test_clip_near() {
        let a = Vec4::new(0.0, 0.0, 0.0, 2.0);
        let b = Vec4::new(0.0, 0.0, 0.0, -2.0);
        let (p, q) = clip_near(a, b, 0.1).unwrap();
        assert_eq!(p, a);
        assert!((q.w - 0.1).abs() < 1e-6);
        assert!(clip_near(b, b, 0.1).is_none());
    }

    #[test]
    fn test_draw_line_clips_to_frame() {
        let mut frame = RgbImage::new(10, 10);
        let red = Rgb([255, 0, 0]);
        draw_line(&mut frame, (-50.0, 5.0), (50.0, 5.0), red, 1);
        assert!((0..10).all(|x| *frame.get_pixel(x, 5) == red));
        assert_eq!(*frame.get_pixel(5, 4), Rgb([0, 0, 0]));
    }
}
