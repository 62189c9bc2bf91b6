// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 金字塔稠密 Lucas-Kanade 光流
//! Pyramidal dense Lucas-Kanade optical flow
//!
//! 每一层: 按当前光流扭曲后一帧, 计算梯度与时间差, 在 (2r+1)² 窗口内
//! 求解 2x2 法方程, 累加增量。由粗到细逐层上采样光流 (位移 x2)。
//! 两帧完全相同时时间差恒为 0, 输出严格为零场。

use super::{check_pair, FlowError, FlowEstimator, FlowField};
use crate::config::LucasKanadeConfig;
use image::{imageops, GrayImage};
use ndarray::Array2;

/// 最粗层的最小边长
const MIN_LEVEL_SIZE: u32 = 8;
/// 单次迭代的最大位移增量 (像素)
const MAX_STEP: f32 = 2.0;
/// 法方程行列式下限, 低于此值视为无纹理区域
const MIN_DET: f32 = 1e-3;

/// 稠密 Lucas-Kanade 估计器
#[derive(Debug, Clone)]
pub struct DenseLucasKanade {
    config: LucasKanadeConfig,
}

impl Default for DenseLucasKanade {
    fn default() -> Self {
        Self::new(LucasKanadeConfig::default())
    }
}

impl DenseLucasKanade {
    pub fn new(config: LucasKanadeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LucasKanadeConfig {
        &self.config
    }

    /// 高斯预平滑 + 图像金字塔 (level 0 为原始分辨率)
    fn pyramid(&self, img: &GrayImage) -> Vec<Array2<f32>> {
        let base = if self.config.smoothing_sigma > 0.0 {
            imageproc::filter::gaussian_blur_f32(img, self.config.smoothing_sigma)
        } else {
            img.clone()
        };

        let mut levels = vec![to_array(&base)];
        let mut current = base;
        while levels.len() < self.config.levels {
            let (w, h) = current.dimensions();
            if w / 2 < MIN_LEVEL_SIZE || h / 2 < MIN_LEVEL_SIZE {
                break;
            }
            current = imageops::resize(&current, w / 2, h / 2, imageops::FilterType::Triangle);
            levels.push(to_array(&current));
        }
        levels
    }

    /// 单层一次迭代: 就地更新 u, v
    fn refine(&self, i0: &Array2<f32>, i1: &Array2<f32>, u: &mut Array2<f32>, v: &mut Array2<f32>) {
        let (h, w) = i0.dim();

        // 按当前光流扭曲后一帧
        let warped = Array2::from_shape_fn((h, w), |(y, x)| {
            interpolate_bilinear(i1, x as f32 + u[[y, x]], y as f32 + v[[y, x]])
        });

        let mut ixx = Array2::<f32>::zeros((h, w));
        let mut ixy = Array2::<f32>::zeros((h, w));
        let mut iyy = Array2::<f32>::zeros((h, w));
        let mut ixt = Array2::<f32>::zeros((h, w));
        let mut iyt = Array2::<f32>::zeros((h, w));

        for y in 0..h {
            let ym = y.saturating_sub(1);
            let yp = (y + 1).min(h - 1);
            for x in 0..w {
                let xm = x.saturating_sub(1);
                let xp = (x + 1).min(w - 1);
                // 中心差分, 边界复制
                let gx = 0.5 * (warped[[y, xp]] - warped[[y, xm]]);
                let gy = 0.5 * (warped[[yp, x]] - warped[[ym, x]]);
                let it = warped[[y, x]] - i0[[y, x]];
                ixx[[y, x]] = gx * gx;
                ixy[[y, x]] = gx * gy;
                iyy[[y, x]] = gy * gy;
                ixt[[y, x]] = gx * it;
                iyt[[y, x]] = gy * it;
            }
        }

        let r = self.config.window_radius;
        let sxx = Integral::new(&ixx);
        let sxy = Integral::new(&ixy);
        let syy = Integral::new(&iyy);
        let sxt = Integral::new(&ixt);
        let syt = Integral::new(&iyt);

        for y in 0..h {
            let (y0, y1) = (y.saturating_sub(r), (y + r + 1).min(h));
            for x in 0..w {
                let (x0, x1) = (x.saturating_sub(r), (x + r + 1).min(w));
                let a = sxx.sum(x0, x1, y0, y1);
                let b = sxy.sum(x0, x1, y0, y1);
                let c = syy.sum(x0, x1, y0, y1);
                let et = sxt.sum(x0, x1, y0, y1);
                let ft = syt.sum(x0, x1, y0, y1);

                // [a b; b c] * [du dv]ᵀ = -[et ft]ᵀ
                let det = a * c - b * b;
                if det < MIN_DET {
                    continue;
                }
                let du = (b * ft - c * et) / det;
                let dv = (b * et - a * ft) / det;
                u[[y, x]] += du.clamp(-MAX_STEP, MAX_STEP);
                v[[y, x]] += dv.clamp(-MAX_STEP, MAX_STEP);
            }
        }
    }
}

impl FlowEstimator for DenseLucasKanade {
    fn name(&self) -> &str {
        "dense-lucas-kanade"
    }

    fn estimate(&self, prev: &GrayImage, next: &GrayImage) -> Result<FlowField, FlowError> {
        let (w, h) = check_pair(prev, next)?;
        if w < 2 || h < 2 {
            return Err(FlowError::TooSmall(w, h));
        }

        let prev_pyr = self.pyramid(prev);
        let next_pyr = self.pyramid(next);
        let top = prev_pyr.len() - 1;

        let (hc, wc) = prev_pyr[top].dim();
        let mut u = Array2::<f32>::zeros((hc, wc));
        let mut v = Array2::<f32>::zeros((hc, wc));

        for level in (0..=top).rev() {
            let dims = prev_pyr[level].dim();
            if u.dim() != dims {
                u = upsample(&u, dims);
                v = upsample(&v, dims);
            }
            for _ in 0..self.config.iterations {
                self.refine(&prev_pyr[level], &next_pyr[level], &mut u, &mut v);
            }
        }

        Ok(FlowField::from_components(&u, &v))
    }
}

fn to_array(img: &GrayImage) -> Array2<f32> {
    let (w, h) = img.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32).0[0] as f32
    })
}

/// 粗层光流上采样到细层, 位移乘 2
fn upsample(coarse: &Array2<f32>, (hf, wf): (usize, usize)) -> Array2<f32> {
    let (hc, wc) = coarse.dim();
    Array2::from_shape_fn((hf, wf), |(y, x)| {
        2.0 * coarse[[(y / 2).min(hc - 1), (x / 2).min(wc - 1)]]
    })
}

/// 双线性插值, 越界坐标夹取到边缘
pub fn interpolate_bilinear(img: &Array2<f32>, x: f32, y: f32) -> f32 {
    let (h, w) = img.dim();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = img[[y0, x0]] + (img[[y0, x1]] - img[[y0, x0]]) * fx;
    let bottom = img[[y1, x0]] + (img[[y1, x1]] - img[[y1, x0]]) * fx;
    top + (bottom - top) * fy
}

/// 积分图, 用于 O(1) 窗口求和
struct Integral {
    table: Array2<f64>,
}

impl Integral {
    fn new(src: &Array2<f32>) -> Self {
        let (h, w) = src.dim();
        let mut table = Array2::<f64>::zeros((h + 1, w + 1));
        for y in 0..h {
            let mut row = 0.0f64;
            for x in 0..w {
                row += src[[y, x]] as f64;
                table[[y + 1, x + 1]] = table[[y, x + 1]] + row;
            }
        }
        Self { table }
    }

    /// [x0, x1) x [y0, y1) 区域和
    fn sum(&self, x0: usize, x1: usize, y0: usize, y1: usize) -> f32 {
        let t = &self.table;
        (t[[y1, x1]] - t[[y0, x1]] - t[[y1, x0]] + t[[y0, x0]]) as f32
    }
}
