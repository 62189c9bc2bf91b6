#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 管线配置参数
pub mod flow; // 光流估计
pub mod input; // 视频输入系统
pub mod mesh; // 扭曲网格
pub mod pipeline; // 环形缓冲 + 结果队列 + 线程池 + 渲染循环
pub mod render; // 渲染后端

pub use crate::config::PipelineConfig;
pub use crate::flow::{DenseLucasKanade, FlowEstimator, FlowField, ZeroFlow};
pub use crate::input::{Frame, FrameSource};
pub use crate::mesh::{generate_topology, project_to_vertices, MeshTopology};
pub use crate::pipeline::{FlowResult, FlowResultQueue, Pipeline, RenderLoop, RenderOutcome};
pub use crate::render::{CpuBackend, RenderBackend};

/// 本地时间字符串, 用作导出目录名
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_string_uses_delimiter() {
        let s = gen_time_string("-");
        assert_eq!(s.split('-').count(), 6);
        assert!(s.split('-').all(|part| part.chars().all(|c| c.is_ascii_digit())));
    }
}
