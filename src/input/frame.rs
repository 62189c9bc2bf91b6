// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 采集帧 - 单通道灰度图像 + 采集时间戳

use image::{imageops, GrayImage};
use std::sync::Arc;
use thiserror::Error;

/// 帧构造错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("帧尺寸非法: {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("帧数据长度不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("帧分辨率 {actual:?} 与采集配置 {expected:?} 不一致")]
    UnexpectedSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// 采集帧 (采集线程 → 渲染线程 + 工作线程)
///
/// 数据在入口处从采集端缓冲区拷贝一次, 之后只读共享,
/// 环形缓冲写入与工作线程读取永远不会别名到可变内存。
#[derive(Clone, Debug)]
pub struct Frame {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    timestamp: u64, // 采集时间戳 (纳秒, 单调递增)
}

impl Frame {
    /// 接管已拥有的像素数据
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp: u64) -> Result<Self, FrameError> {
        Self::check(data.len(), width, height)?;
        Ok(Self {
            data: data.into(),
            width,
            height,
            timestamp,
        })
    }

    /// 从采集端缓冲区拷贝 (调用后采集端即可释放其缓冲区)
    pub fn copy_from(bytes: &[u8], width: u32, height: u32, timestamp: u64) -> Result<Self, FrameError> {
        Self::check(bytes.len(), width, height)?;
        Ok(Self {
            data: Arc::from(bytes),
            width,
            height,
            timestamp,
        })
    }

    /// 从灰度图像构造
    pub fn from_gray(image: GrayImage, timestamp: u64) -> Result<Self, FrameError> {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, timestamp)
    }

    fn check(len: usize, width: u32, height: u32) -> Result<(), FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidSize { width, height });
        }
        let expected = width as usize * height as usize;
        if len != expected {
            return Err(FrameError::LengthMismatch {
                expected,
                actual: len,
            });
        }
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// 同一份像素, 新的时间戳
    pub fn with_timestamp(&self, timestamp: u64) -> Self {
        Self {
            data: Arc::clone(&self.data),
            width: self.width,
            height: self.height,
            timestamp,
        }
    }

    /// 拷贝为 GrayImage
    pub fn to_gray_image(&self) -> GrayImage {
        // 长度在构造时已校验
        GrayImage::from_raw(self.width, self.height, self.data.to_vec())
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// 缩小到一半分辨率, 作为光流估计的输入
    pub fn half_resolution(&self) -> GrayImage {
        imageops::resize(
            &self.to_gray_image(),
            (self.width / 2).max(1),
            (self.height / 2).max(1),
            imageops::FilterType::Triangle,
        )
    }
}
