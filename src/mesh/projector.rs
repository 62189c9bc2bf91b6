// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 光流 → 网格顶点投影 (前向扭曲)
//!
//! 网格在 [-1, 1] 上规则分布, 每个顶点按其源像素处的光流平移:
//! 采样内容"曾经"所在的位置, 推向它"将要"去的位置。

use crate::flow::{FlowError, FlowField};

/// 将光流场投影为交错的 NDC 顶点数组, 长度 2·W·H
///
/// 顶点缓冲区为左下原点, 光流场为左上原点: 网格行 i (自底向上计数)
/// 读取光流场第 H-1-i 行。光流分量按网格宽高归一化, 再乘以 `gain`。
pub fn project_to_vertices(
    flow: &FlowField,
    grid_width: usize,
    grid_height: usize,
    gain: f32,
) -> Result<Vec<f32>, FlowError> {
    if flow.width() != grid_width || flow.height() != grid_height {
        return Err(FlowError::GridMismatch {
            field: (flow.width(), flow.height()),
            grid: (grid_width, grid_height),
        });
    }

    let w_f = grid_width as f32;
    let h_f = grid_height as f32;
    // 整数除法取半, 与网格拓扑的取整保持一致
    let half_w = (grid_width / 2).max(1) as f32;
    let half_h = (grid_height / 2).max(1) as f32;

    let mut vertices = Vec::with_capacity(grid_width * grid_height * 2);
    for i in (0..grid_height).rev() {
        for j in 0..grid_width {
            let (fx, fy) = flow.at(j, grid_height - 1 - i);
            let flow_x = gain * fx / w_f;
            let flow_y = gain * fy / h_f;

            vertices.push(j as f32 / half_w - 1.0 + flow_x);
            vertices.push(i as f32 / half_h - 1.0 + flow_y);
        }
    }
    Ok(vertices)
}

/// 未扭曲的规则网格 (零光流时的投影结果)
pub fn regular_grid(grid_width: usize, grid_height: usize) -> Vec<f32> {
    let half_w = (grid_width / 2).max(1) as f32;
    let half_h = (grid_height / 2).max(1) as f32;
    let mut vertices = Vec::with_capacity(grid_width * grid_height * 2);
    for i in (0..grid_height).rev() {
        for j in 0..grid_width {
            vertices.push(j as f32 / half_w - 1.0);
            vertices.push(i as f32 / half_h - 1.0);
        }
    }
    vertices
}
