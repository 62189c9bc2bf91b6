// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 光流估计 (Optical Flow Estimation)
///
/// 光流算法本身视为外部协作者: 两张等尺寸灰度图 → 每像素位移场。
/// - FlowEstimator:    估计器接口
/// - DenseLucasKanade: 金字塔稠密 Lucas-Kanade 参考实现
/// - ZeroFlow:         恒零光流, 用于空跑
pub mod field;
pub mod lucas_kanade;

pub use field::FlowField;
pub use lucas_kanade::DenseLucasKanade;

use image::GrayImage;
use thiserror::Error;

/// 光流估计与网格投影错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("输入帧尺寸不一致: {prev:?} vs {next:?}")]
    SizeMismatch { prev: (u32, u32), next: (u32, u32) },
    #[error("光流场尺寸 {field:?} 与网格 {grid:?} 不一致")]
    GridMismatch {
        field: (usize, usize),
        grid: (usize, usize),
    },
    #[error("图像过小: {0}x{1}")]
    TooSmall(u32, u32),
}

/// 光流估计器接口, 在工作线程间共享
pub trait FlowEstimator: Send + Sync {
    fn name(&self) -> &str;

    /// prev → next 的稠密位移场, 与输入同尺寸
    fn estimate(&self, prev: &GrayImage, next: &GrayImage) -> Result<FlowField, FlowError>;
}

/// 检查两帧尺寸一致
pub fn check_pair(prev: &GrayImage, next: &GrayImage) -> Result<(u32, u32), FlowError> {
    if prev.dimensions() != next.dimensions() {
        return Err(FlowError::SizeMismatch {
            prev: prev.dimensions(),
            next: next.dimensions(),
        });
    }
    Ok(prev.dimensions())
}

/// 恒零光流
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroFlow;

impl FlowEstimator for ZeroFlow {
    fn name(&self) -> &str {
        "zero"
    }

    fn estimate(&self, prev: &GrayImage, next: &GrayImage) -> Result<FlowField, FlowError> {
        let (w, h) = check_pair(prev, next)?;
        Ok(FlowField::zeros(w as usize, h as usize))
    }
}
