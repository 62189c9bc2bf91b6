// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 管线配置 - 通过JSON文件调整参数
//! Pipeline configuration, tunable through a JSON file

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{info, warn};

// ========== 公共常量 ==========

/// 环形帧缓冲槽位数
pub const RING_SIZE: usize = 8;
/// 光流结果队列容量
pub const FLOW_QUEUE_CAPACITY: usize = 8;
/// 后台光流工作线程数
pub const WORKER_COUNT: usize = 3;
/// 默认采集分辨率
pub const CAPTURE_WIDTH: u32 = 640;
pub const CAPTURE_HEIGHT: u32 = 480;

/// 稠密 Lucas-Kanade 参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LucasKanadeConfig {
    pub window_radius: usize, // 积分窗口半径 (窗口边长 2r+1)
    pub levels: usize,        // 金字塔层数
    pub iterations: usize,    // 每层迭代次数
    pub smoothing_sigma: f32, // 预平滑高斯 sigma, 0 表示关闭
}

impl Default for LucasKanadeConfig {
    fn default() -> Self {
        Self {
            window_radius: 3,
            levels: 3,
            iterations: 4,
            smoothing_sigma: 1.0,
        }
    }
}

/// 管线参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // === 采集 ===
    pub capture_width: u32,
    pub capture_height: u32,

    // === 输出表面 ===
    pub output_width: u32,
    pub output_height: u32,

    // === 同步结构 ===
    pub ring_size: usize,      // 环形缓冲槽位数
    pub queue_capacity: usize, // 光流结果队列容量
    pub worker_count: usize,   // 工作线程数

    // === 网格扭曲 ===
    /// 光流位移到顶点位移的缩放系数, 1.0 与原始行为一致
    pub flow_gain: f32,

    // === 光流估计 ===
    pub lucas_kanade: LucasKanadeConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture_width: CAPTURE_WIDTH,
            capture_height: CAPTURE_HEIGHT,
            output_width: CAPTURE_WIDTH,
            output_height: CAPTURE_HEIGHT,
            ring_size: RING_SIZE,
            queue_capacity: FLOW_QUEUE_CAPACITY,
            worker_count: WORKER_COUNT,
            flow_gain: 1.0,
            lucas_kanade: LucasKanadeConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// 扭曲网格宽度 (采集分辨率的一半)
    pub fn grid_width(&self) -> usize {
        (self.capture_width / 2) as usize
    }

    /// 扭曲网格高度 (采集分辨率的一半)
    pub fn grid_height(&self) -> usize {
        (self.capture_height / 2) as usize
    }

    /// 检查参数合法性, 初始化前调用
    pub fn validate(&self) -> Result<()> {
        if self.capture_width < 4 || self.capture_height < 4 {
            bail!(
                "采集分辨率过小: {}x{} (至少 4x4)",
                self.capture_width,
                self.capture_height
            );
        }
        if self.capture_width % 2 != 0 || self.capture_height % 2 != 0 {
            bail!(
                "采集分辨率必须为偶数: {}x{}",
                self.capture_width,
                self.capture_height
            );
        }
        if self.output_width == 0 || self.output_height == 0 {
            bail!(
                "输出分辨率非法: {}x{}",
                self.output_width,
                self.output_height
            );
        }
        if self.ring_size == 0 {
            bail!("环形缓冲槽位数不能为0");
        }
        if self.queue_capacity == 0 {
            bail!("光流队列容量不能为0");
        }
        if self.worker_count == 0 {
            bail!("工作线程数不能为0");
        }
        if !self.flow_gain.is_finite() {
            bail!("flow_gain 必须为有限值: {}", self.flow_gain);
        }
        if self.lucas_kanade.levels == 0 || self.lucas_kanade.iterations == 0 {
            bail!("Lucas-Kanade 层数与迭代次数必须大于0");
        }
        Ok(())
    }

    /// 从JSON文件加载配置
    pub fn load(path: &str) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!(path, "✅ 配置已加载");
                    config
                }
                Err(e) => {
                    warn!(path, error = %e, "⚠️ 配置文件解析失败, 使用默认值");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path, "📝 配置文件不存在, 创建默认配置");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &str) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!(path, error = %e, "❌ 保存配置失败");
                } else {
                    info!(path, "💾 配置已保存");
                }
            }
            Err(e) => warn!(error = %e, "❌ 序列化配置失败"),
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!(
            capture = %format!("{}x{}", self.capture_width, self.capture_height),
            grid = %format!("{}x{}", self.grid_width(), self.grid_height()),
            output = %format!("{}x{}", self.output_width, self.output_height),
            ring = self.ring_size,
            queue = self.queue_capacity,
            workers = self.worker_count,
            gain = self.flow_gain,
            "🎛️ 当前管线配置"
        );
    }
}
