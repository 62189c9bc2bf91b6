// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 软件渲染后端
//!
//! 与 GPU 管线的约定一致: NDC → 像素为 sx = (x+1)/2·W, sy = (1-y)/2·H,
//! 网格纹理坐标为左下原点, 采样时翻转 v; 像素中心采样, 双线性插值, 边缘夹取。

use super::RenderBackend;
use crate::input::Frame;
use crate::mesh::MeshTopology;
use anyhow::{bail, ensure, Result};
use image::{DynamicImage, GrayImage, Luma};

/// 边缘函数容差, 相邻三角形共享边上的像素不留缝
const EDGE_EPSILON: f32 = 1e-4;

/// 槽位渲染目标
#[derive(Debug, Clone)]
pub struct CpuSlot {
    index: usize,
    image: GrayImage,
}

impl CpuSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }
}

/// 软件光栅化后端
pub struct CpuBackend {
    capture_size: (u32, u32),
    topology: Option<MeshTopology>,
    back: GrayImage,
    presented: GrayImage,
    frames_presented: u64,
}

impl CpuBackend {
    pub fn new(capture_size: (u32, u32), output_size: (u32, u32)) -> Self {
        Self {
            capture_size,
            topology: None,
            back: GrayImage::new(output_size.0, output_size.1),
            presented: GrayImage::new(output_size.0, output_size.1),
            frames_presented: 0,
        }
    }

    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        Self::new(
            (config.capture_width, config.capture_height),
            (config.output_width, config.output_height),
        )
    }

    /// 最近一次呈现的画面
    pub fn presented(&self) -> &GrayImage {
        &self.presented
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    fn rasterize(&mut self, source: &GrayImage, topology: &MeshTopology, vertices: &[f32]) {
        let (out_w, out_h) = self.back.dimensions();
        let (ow, oh) = (out_w as f32, out_h as f32);
        let tex = topology.tex_coords();

        // 顶点 → 像素坐标
        let screen: Vec<(f32, f32)> = vertices
            .chunks_exact(2)
            .map(|p| ((p[0] + 1.0) * 0.5 * ow, (1.0 - p[1]) * 0.5 * oh))
            .collect();

        for [a, b, c] in topology.triangles() {
            let (a, b, c) = (a as usize, b as usize, c as usize);
            let (p0, p1, p2) = (screen[a], screen[b], screen[c]);
            let area = edge(p0, p1, p2);
            if area.abs() < f32::EPSILON {
                continue;
            }

            let min_x = p0.0.min(p1.0).min(p2.0).floor().max(0.0) as u32;
            let max_x = p0.0.max(p1.0).max(p2.0).ceil().min(ow) as u32;
            let min_y = p0.1.min(p1.1).min(p2.1).floor().max(0.0) as u32;
            let max_y = p0.1.max(p1.1).max(p2.1).ceil().min(oh) as u32;

            for py in min_y..max_y {
                for px in min_x..max_x {
                    let p = (px as f32 + 0.5, py as f32 + 0.5);
                    // 重心坐标, 与绕序无关
                    let w0 = edge(p1, p2, p) / area;
                    let w1 = edge(p2, p0, p) / area;
                    let w2 = edge(p0, p1, p) / area;
                    if w0 < -EDGE_EPSILON || w1 < -EDGE_EPSILON || w2 < -EDGE_EPSILON {
                        continue;
                    }

                    let u = w0 * tex[2 * a] + w1 * tex[2 * b] + w2 * tex[2 * c];
                    let v = w0 * tex[2 * a + 1] + w1 * tex[2 * b + 1] + w2 * tex[2 * c + 1];
                    let value = sample_bilinear(source, u, 1.0 - v);
                    self.back.put_pixel(px, py, Luma([value]));
                }
            }
        }
    }
}

impl RenderBackend for CpuBackend {
    type Slot = CpuSlot;

    fn name(&self) -> &str {
        "cpu"
    }

    fn output_size(&self) -> (u32, u32) {
        self.back.dimensions()
    }

    fn create_slot(&mut self, index: usize) -> Result<CpuSlot> {
        let (w, h) = self.capture_size;
        ensure!(w > 0 && h > 0, "槽位尺寸非法: {w}x{h}");
        Ok(CpuSlot {
            index,
            image: GrayImage::new(w, h),
        })
    }

    fn upload_mesh(&mut self, topology: &MeshTopology) -> Result<()> {
        self.topology = Some(topology.clone());
        Ok(())
    }

    fn draw_pass_through(&mut self, slot: &mut CpuSlot, frame: &Frame) -> Result<()> {
        if (frame.width(), frame.height()) != slot.image.dimensions() {
            bail!(
                "帧尺寸 {}x{} 与槽位 {:?} 不一致",
                frame.width(),
                frame.height(),
                slot.image.dimensions()
            );
        }
        // 同尺寸全屏四边形, 纹理坐标一一对应
        slot.image.copy_from_slice(frame.data());
        Ok(())
    }

    fn draw_warped(&mut self, slot: &CpuSlot, vertices: &[f32]) -> Result<()> {
        let Some(topology) = self.topology.take() else {
            bail!("网格尚未上传");
        };
        if vertices.len() != 2 * topology.vertex_count() {
            let expected = 2 * topology.vertex_count();
            self.topology = Some(topology);
            bail!("顶点数组长度 {} 与网格不一致 (期望 {expected})", vertices.len());
        }

        self.back.fill(0);
        self.rasterize(&slot.image, &topology, vertices);
        self.topology = Some(topology);
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.presented.copy_from_slice(&self.back);
        self.frames_presented += 1;
        Ok(())
    }

    fn snapshot(&mut self) -> Result<Option<DynamicImage>> {
        Ok(Some(DynamicImage::ImageLuma8(self.presented.clone())))
    }
}

#[inline]
fn edge(a: (f32, f32), b: (f32, f32), p: (f32, f32)) -> f32 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

/// 归一化纹理坐标 (左上原点) 双线性采样, 纹素中心对齐, 边缘夹取
fn sample_bilinear(img: &GrayImage, u: f32, v: f32) -> u8 {
    let (w, h) = img.dimensions();
    let x = (u * w as f32 - 0.5).clamp(0.0, (w - 1) as f32);
    let y = (v * h as f32 - 0.5).clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p = |x: u32, y: u32| img.get_pixel(x, y).0[0] as f32;
    let top = p(x0, y0) + (p(x1, y0) - p(x0, y0)) * fx;
    let bottom = p(x0, y1) + (p(x1, y1) - p(x0, y1)) * fx;
    (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8
}
