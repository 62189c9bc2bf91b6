// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 合成帧源 - 匀速平移的纹理图案, 无摄像头时用于演示与测试

use super::{Frame, FrameSource};
use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 合成帧源
pub struct SyntheticSource {
    width: u32,
    height: u32,
    velocity: (f32, f32), // 每帧平移像素 (x, y)
    noise: u8,            // 叠加的均匀噪声幅度
    frame_index: u64,
    frame_limit: Option<u64>,
    frame_interval_ns: u64,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, velocity: (f32, f32)) -> Self {
        Self {
            width,
            height,
            velocity,
            noise: 0,
            frame_index: 0,
            frame_limit: None,
            frame_interval_ns: 33_333_333,
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }

    /// 限制总帧数, 达到后返回 None
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// 叠加噪声 (固定种子, 结果可复现)
    pub fn with_noise(mut self, amplitude: u8, seed: u64) -> Self {
        self.noise = amplitude;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// 帧间隔 (决定时间戳步长)
    pub fn with_fps(mut self, fps: f64) -> Self {
        if fps > 0.0 {
            self.frame_interval_ns = (1e9 / fps) as u64;
        }
        self
    }

    /// 第 t 帧的图案
    pub fn render(&mut self, t: u64) -> Vec<u8> {
        let (vx, vy) = self.velocity;
        let dx = vx * t as f32;
        let dy = vy * t as f32;
        let mut data = Vec::with_capacity((self.width * self.height) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let value = pattern(x as f32 - dx, y as f32 - dy);
                let jitter = if self.noise > 0 {
                    self.rng.gen_range(-(self.noise as f32)..=self.noise as f32)
                } else {
                    0.0
                };
                data.push((value + jitter).clamp(0.0, 255.0) as u8);
            }
        }
        data
    }
}

/// 光滑的多频纹理, 在两个方向上都有梯度
pub fn pattern(x: f32, y: f32) -> f32 {
    128.0 + 45.0 * (0.35 * x).sin() + 45.0 * (0.29 * y).cos() + 20.0 * (0.17 * (x + y)).sin()
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.frame_limit {
            if self.frame_index >= limit {
                return Ok(None);
            }
        }
        let t = self.frame_index;
        self.frame_index += 1;
        let data = self.render(t);
        // 时间戳从一个帧间隔开始, 避免与未使用槽位的 0 混淆
        let timestamp = (t + 1) * self.frame_interval_ns;
        Ok(Some(Frame::new(data, self.width, self.height, timestamp)?))
    }
}
