// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 渲染后端 (Render Backends)
///
/// 渲染循环只通过 RenderBackend 接口操作渲染资源:
/// - CpuBackend:  软件光栅化, 无 GPU 环境与测试使用
/// - WgpuBackend: wgpu 渲染目标 + 两条渲染管线 (feature = "gpu")
pub mod cpu;
#[cfg(feature = "gpu")]
pub mod shaders;
#[cfg(feature = "gpu")]
pub mod wgpu_backend;

pub use cpu::{CpuBackend, CpuSlot};
#[cfg(feature = "gpu")]
pub use wgpu_backend::{WgpuBackend, WgpuSlot};

use crate::input::Frame;
use crate::mesh::MeshTopology;
use anyhow::Result;
use image::DynamicImage;

/// 直通四边形: 位置 (x, y) 与纹理坐标 (u, v), 三角形带顺序
pub const PASS_THROUGH_QUAD: [[f32; 4]; 4] = [
    [-1.0, 1.0, 0.0, 0.0],
    [-1.0, -1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0, 0.0],
    [1.0, -1.0, 1.0, 1.0],
];

/// 渲染后端接口
///
/// 所有方法都必须在持有渲染上下文的线程上调用。
pub trait RenderBackend {
    /// 环形缓冲槽位的渲染目标 (采集分辨率)
    type Slot;

    fn name(&self) -> &str;

    /// 输出表面尺寸
    fn output_size(&self) -> (u32, u32);

    /// 创建第 `index` 个槽位的渲染目标
    fn create_slot(&mut self, index: usize) -> Result<Self::Slot>;

    /// 上传纹理坐标与三角形索引, 初始化时调用一次
    fn upload_mesh(&mut self, topology: &MeshTopology) -> Result<()>;

    /// 上传采集帧并用直通着色器全屏绘制到槽位
    fn draw_pass_through(&mut self, slot: &mut Self::Slot, frame: &Frame) -> Result<()>;

    /// 用扭曲网格把槽位纹理绘制到输出表面
    fn draw_warped(&mut self, slot: &Self::Slot, vertices: &[f32]) -> Result<()>;

    /// 呈现输出
    fn present(&mut self) -> Result<()>;

    /// 最近一次呈现的画面, 后端无法回读时为 None
    fn snapshot(&mut self) -> Result<Option<DynamicImage>>;
}
