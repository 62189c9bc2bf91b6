// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 扭曲网格 (Warp Mesh)
///
/// - topology:  纹理坐标 + 三角形索引, 初始化时生成一次
/// - projector: 光流场 → 每帧的顶点位置
pub mod projector;
pub mod topology;

pub use projector::{project_to_vertices, regular_grid};
pub use topology::{generate_topology, signed_area, MeshTopology};
