use image::RgbImage;
use anyhow::Result;

/// Keys the frame loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleLandmarks,
    ToggleMirror,
    Quit,
}

/// Where finished frames go.
pub trait Display {
    fn is_open(&self) -> bool;
    /// Keys pressed since the last call.
    fn commands(&mut self) -> Vec<Command>;
    fn present(&mut self, frame: &RgbImage) -> Result<()>;
}

pub struct WindowOutput {
    window: minifb::Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl WindowOutput {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = minifb::Window::new(
            title,
            width,
            height,
            minifb::WindowOptions {
                resize: true,
                ..minifb::WindowOptions::default()
            },
        ).map_err(|e| anyhow::anyhow!("Failed to create window: {}", e))?;

        window.limit_update_rate(Some(std::time::Duration::from_micros(16600))); // ~60 FPS

        Ok(Self {
            window,
            buffer: vec![0; width * height],
            width,
            height,
        })
    }
}

impl Display for WindowOutput {
    fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(minifb::Key::Escape)
    }

    fn commands(&mut self) -> Vec<Command> {
        self.window
            .get_keys_pressed(minifb::KeyRepeat::No)
            .into_iter()
            .filter_map(|key| match key {
                minifb::Key::Key1 => Some(Command::ToggleLandmarks),
                minifb::Key::Key5 => Some(Command::ToggleMirror),
                minifb::Key::Escape => Some(Command::Quit),
                _ => None,
            })
            .collect()
    }

    fn present(&mut self, frame: &RgbImage) -> Result<()> {
        let target_w = frame.width() as usize;
        let target_h = frame.height() as usize;
        if target_w != self.width || target_h != self.height {
            self.width = target_w;
            self.height = target_h;
        }
        self.buffer.resize(self.width * self.height, 0);

        pack_argb(frame, &mut self.buffer);

        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(|e| anyhow::anyhow!("Window update failed: {}", e))
    }
}

/// RGB8 -> 0RGB u32 as minifb expects.
pub fn pack_argb(frame: &RgbImage, buffer: &mut [u32]) {
    for (dst, pixel) in buffer.iter_mut().zip(frame.pixels()) {
        let r = pixel[0] as u32;
        let g = pixel[1] as u32;
        let b = pixel[2] as u32;
        *dst = (r << 16) | (g << 8) | b;
    }
}
