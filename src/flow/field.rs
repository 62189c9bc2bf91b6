// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 稠密光流场 (height x width x 2, 左上角原点)

use ndarray::{s, Array2, Array3, Axis};

/// 每像素二维位移 (dx, dy), 单位为像素
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    data: Array3<f32>,
}

impl FlowField {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            data: Array3::zeros((height, width, 2)),
        }
    }

    /// 整场恒定位移
    pub fn uniform(width: usize, height: usize, dx: f32, dy: f32) -> Self {
        let mut field = Self::zeros(width, height);
        field.data.slice_mut(s![.., .., 0]).fill(dx);
        field.data.slice_mut(s![.., .., 1]).fill(dy);
        field
    }

    /// 由两个分量平面组合
    pub fn from_components(u: &Array2<f32>, v: &Array2<f32>) -> Self {
        let (height, width) = u.dim();
        let mut data = Array3::zeros((height, width, 2));
        data.slice_mut(s![.., .., 0]).assign(u);
        data.slice_mut(s![.., .., 1]).assign(v);
        Self { data }
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    /// 像素 (x, y) 处的位移
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> (f32, f32) {
        (self.data[[y, x, 0]], self.data[[y, x, 1]])
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, dx: f32, dy: f32) {
        self.data[[y, x, 0]] = dx;
        self.data[[y, x, 1]] = dy;
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// 最大位移幅值
    pub fn max_magnitude(&self) -> f32 {
        self.data
            .lanes(Axis(2))
            .into_iter()
            .map(|d| (d[0] * d[0] + d[1] * d[1]).sqrt())
            .fold(0.0, f32::max)
    }

    /// 区域内平均位移 (x0..x1, y0..y1)
    pub fn mean_in(&self, x0: usize, x1: usize, y0: usize, y1: usize) -> (f32, f32) {
        let region = self.data.slice(s![y0..y1, x0..x1, ..]);
        let n = ((x1 - x0) * (y1 - y0)).max(1) as f32;
        let sx = region.slice(s![.., .., 0]).sum();
        let sy = region.slice(s![.., .., 1]).sum();
        (sx / n, sy / n)
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }
}
