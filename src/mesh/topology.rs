// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 网格拓扑 - 纹理坐标 + 三角形索引, 初始化时生成一次

/// 半分辨率扭曲网格的固定拓扑
#[derive(Debug, Clone, PartialEq)]
pub struct MeshTopology {
    grid_width: usize,
    grid_height: usize,
    /// 每个网格顶点一个 (u, v), 行优先, 垂直翻转 (GL 约定, 左下原点)
    tex_coords: Vec<f32>,
    /// 每个四边形两个三角形
    indices: Vec<u32>,
}

impl MeshTopology {
    pub fn grid_width(&self) -> usize {
        self.grid_width
    }

    pub fn grid_height(&self) -> usize {
        self.grid_height
    }

    pub fn vertex_count(&self) -> usize {
        self.grid_width * self.grid_height
    }

    pub fn tex_coords(&self) -> &[f32] {
        &self.tex_coords
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// 按三角形迭代索引
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// 给定顶点位置 (NDC, 交错 xy) 时所有非退化三角形的有向面积是否同号
    ///
    /// 绕序不一致会导致部分几何被背面剔除, 画面静默缺失。
    pub fn winding_is_consistent(&self, positions: &[f32]) -> bool {
        let mut sign = 0.0f32;
        for [a, b, c] in self.triangles() {
            let area = signed_area(positions, a, b, c);
            if area == 0.0 {
                continue;
            }
            if sign == 0.0 {
                sign = area.signum();
            } else if area.signum() != sign {
                return false;
            }
        }
        true
    }
}

/// 三角形有向面积 (x2)
pub fn signed_area(positions: &[f32], a: u32, b: u32, c: u32) -> f32 {
    let p = |i: u32| (positions[2 * i as usize], positions[2 * i as usize + 1]);
    let (ax, ay) = p(a);
    let (bx, by) = p(b);
    let (cx, cy) = p(c);
    (bx - ax) * (cy - ay) - (by - ay) * (cx - ax)
}

/// 生成网格拓扑
///
/// 纹理坐标: 输出第 r 行对应网格行 i = H-1-r (自下而上映射到递减的输出行),
/// 每列 j 输出 (j/W, i/H), 抵消采集表面左上原点的约定。
///
/// 三角形: 每个四边形 (x, y) 输出 (topLeft, bottomLeft, topRight) 与
/// (topRight, bottomLeft, bottomRight)。
pub fn generate_topology(grid_width: usize, grid_height: usize) -> MeshTopology {
    let w_f = grid_width as f32;
    let h_f = grid_height as f32;

    let mut tex_coords = Vec::with_capacity(grid_width * grid_height * 2);
    for i in (0..grid_height).rev() {
        for j in 0..grid_width {
            tex_coords.push(j as f32 / w_f);
            tex_coords.push(i as f32 / h_f);
        }
    }

    let quads = grid_width.saturating_sub(1) * grid_height.saturating_sub(1);
    let mut indices = Vec::with_capacity(quads * 6);
    let w = grid_width as u32;
    for y in 0..grid_height.saturating_sub(1) as u32 {
        for x in 0..grid_width.saturating_sub(1) as u32 {
            let top_left = y * w + x;
            let bottom_left = (y + 1) * w + x;
            let top_right = y * w + x + 1;
            let bottom_right = (y + 1) * w + x + 1;

            indices.extend_from_slice(&[top_left, bottom_left, top_right]);
            indices.extend_from_slice(&[top_right, bottom_left, bottom_right]);
        }
    }

    MeshTopology {
        grid_width,
        grid_height,
        tex_coords,
        indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::projector::regular_grid;

    #[test]
    fn index_count_and_range() {
        for (w, h) in [(2, 2), (3, 5), (16, 12), (320, 240)] {
            let topo = generate_topology(w, h);
            assert_eq!(topo.index_count(), 6 * (w - 1) * (h - 1));
            assert!(topo.indices().iter().all(|&i| (i as usize) < w * h));
            assert_eq!(topo.tex_coords().len(), 2 * w * h);
        }
    }

    #[test]
    fn no_degenerate_triangles() {
        let topo = generate_topology(7, 5);
        let grid = regular_grid(7, 5);
        for [a, b, c] in topo.triangles() {
            assert!(a != b && b != c && a != c);
            assert!(signed_area(&grid, a, b, c).abs() > 0.0);
        }
    }

    #[test]
    fn first_quad_matches_corner_formula() {
        let topo = generate_topology(4, 3);
        assert_eq!(&topo.indices()[..6], &[0, 4, 1, 1, 4, 5]);
        // 最后一个四边形 (x=2, y=1)
        let n = topo.index_count();
        assert_eq!(&topo.indices()[n - 6..], &[6, 10, 7, 7, 10, 11]);
    }

    #[test]
    fn tex_coords_are_vertically_flipped() {
        let topo = generate_topology(4, 3);
        let tc = topo.tex_coords();
        // 第一行输出对应最上面的网格行 i = H-1
        assert_eq!((tc[0], tc[1]), (0.0, 2.0 / 3.0));
        assert_eq!((tc[2], tc[3]), (0.25, 2.0 / 3.0));
        // 最后一个顶点: j = 3, i = 0
        assert_eq!((tc[22], tc[23]), (0.75, 0.0));
    }

    #[test]
    fn winding_is_consistent_on_regular_grid() {
        let topo = generate_topology(9, 6);
        assert!(topo.winding_is_consistent(&regular_grid(9, 6)));

        // 翻转一个三角形即被检测出来
        let mut flipped = topo.clone();
        flipped.indices.swap(0, 1);
        assert!(!flipped.winding_is_consistent(&regular_grid(9, 6)));
    }

    #[test]
    fn tiny_grids_have_no_quads() {
        assert_eq!(generate_topology(1, 5).index_count(), 0);
        assert_eq!(generate_topology(5, 1).index_count(), 0);
    }
}
