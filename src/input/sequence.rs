// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 图像序列帧源 - 从目录按文件名顺序读取图片, 转为灰度并缩放到采集分辨率

use super::{Frame, FrameSource};
use anyhow::{bail, Context, Result};
use image::imageops;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// 图像序列帧源
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    cursor: usize,
    width: u32,
    height: u32,
    frame_interval_ns: u64,
    looping: bool,
    emitted: u64,
}

impl ImageSequenceSource {
    /// 扫描目录中的图片文件
    pub fn open(dir: impl AsRef<Path>, width: u32, height: u32) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("无法读取图像目录: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            bail!("目录中没有图片: {}", dir.display());
        }
        info!(dir = %dir.display(), count = files.len(), "🖼️ 图像序列已加载");

        Ok(Self {
            files,
            cursor: 0,
            width,
            height,
            frame_interval_ns: 33_333_333,
            looping: false,
            emitted: 0,
        })
    }

    /// 读完后从头循环
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        if fps > 0.0 {
            self.frame_interval_ns = (1e9 / fps) as u64;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn name(&self) -> &str {
        "images"
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let path = &self.files[self.cursor];
        self.cursor += 1;

        let mut gray = image::open(path)
            .with_context(|| format!("图片解码失败: {}", path.display()))?
            .to_luma8();
        if gray.dimensions() != (self.width, self.height) {
            debug!(path = %path.display(), "缩放到采集分辨率");
            gray = imageops::resize(
                &gray,
                self.width,
                self.height,
                imageops::FilterType::Triangle,
            );
        }

        self.emitted += 1;
        Ok(Some(Frame::from_gray(gray, self.emitted * self.frame_interval_ns)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn reads_sorted_images_and_resizes() {
        let dir = std::env::temp_dir().join(format!("flowwarp-seq-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        for (i, shade) in [(1u8, 10u8), (0, 200)] {
            let img = GrayImage::from_pixel(20, 10, Luma([shade]));
            img.save(dir.join(format!("frame_{i}.png"))).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(&dir, 8, 6).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!((first.width(), first.height()), (8, 6));
        assert_eq!(first.data()[0], 200);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.data()[0], 10);
        assert!(second.timestamp() > first.timestamp());
        assert!(source.next_frame().unwrap().is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
