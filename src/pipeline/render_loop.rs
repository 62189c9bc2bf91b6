// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 渲染循环 - 每个新采集帧调用一次
//!
//! 1. 写入下一个环形槽位 (直通绘制 + 时间戳)
//! 2. 队列为空则结束, 本帧无扭曲渲染
//! 3. 取出最旧的光流结果
//! 4. 按时间戳找最接近的槽位
//! 5. 用扭曲网格把该槽位绘制到输出
//! 6. 写指针前进, 呈现
//!
//! 线程约束: RenderLoop 及其后端必须在持有渲染上下文的线程上驱动,
//! 不跨线程共享; 唯一的跨线程状态是结果队列。

use super::queue::FlowResultQueue;
use super::ring::FrameRing;
use crate::config::PipelineConfig;
use crate::input::Frame;
use crate::mesh::generate_topology;
use crate::render::RenderBackend;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// 单帧渲染结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// 队列为空, 只写入了环形槽位
    PassThroughOnly { written: usize },
    /// 完成一次扭曲渲染
    Warped {
        written: usize,
        matched: usize,
        result_timestamp: u64,
        match_error_ns: u64,
    },
    /// 等待光流结果时被中断, 跳过本帧扭曲渲染
    Interrupted { written: usize },
}

/// 渲染统计
#[derive(Debug, Clone, Copy)]
pub struct RenderStats {
    pub frames: u64,
    pub warped: u64,
    pub pass_through_only: u64,
    pub interrupted: u64,
    /// 后端出错的帧 (不计入上面三类)
    pub failed: u64,
    pub last_match_error_ns: u64,
    pub render_fps: f64,
    /// 已消费光流结果的平均工作线程耗时
    pub mean_worker_ms: f64,

    results: u64,
    window_frames: u64,
    window_warped: u64,
    window_results: u64,
    window_worker_ms: f64,
    last_report: Instant,
}

impl Default for RenderStats {
    fn default() -> Self {
        Self {
            frames: 0,
            warped: 0,
            pass_through_only: 0,
            interrupted: 0,
            failed: 0,
            last_match_error_ns: 0,
            render_fps: 0.0,
            mean_worker_ms: 0.0,
            results: 0,
            window_frames: 0,
            window_warped: 0,
            window_results: 0,
            window_worker_ms: 0.0,
            last_report: Instant::now(),
        }
    }
}

impl RenderStats {
    fn record(&mut self, outcome: &RenderOutcome) {
        self.frames += 1;
        self.window_frames += 1;
        match *outcome {
            RenderOutcome::PassThroughOnly { .. } => self.pass_through_only += 1,
            RenderOutcome::Warped { match_error_ns, .. } => {
                self.warped += 1;
                self.window_warped += 1;
                self.last_match_error_ns = match_error_ns;
            }
            RenderOutcome::Interrupted { .. } => self.interrupted += 1,
        }
    }

    fn record_failure(&mut self) {
        self.frames += 1;
        self.window_frames += 1;
        self.failed += 1;
    }

    fn record_worker_latency(&mut self, compute_ms: f64) {
        self.results += 1;
        self.mean_worker_ms += (compute_ms - self.mean_worker_ms) / self.results as f64;
        self.window_results += 1;
        self.window_worker_ms += compute_ms;
    }

    /// 每秒汇报一次, 返回是否汇报
    fn report(&mut self, queue: &FlowResultQueue) -> bool {
        let elapsed = self.last_report.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return false;
        }
        self.render_fps = self.window_frames as f64 / elapsed;
        let warped_ratio = if self.window_frames > 0 {
            self.window_warped as f64 / self.window_frames as f64
        } else {
            0.0
        };
        let worker_ms = if self.window_results > 0 {
            self.window_worker_ms / self.window_results as f64
        } else {
            0.0
        };
        let queue_stats = queue.stats();
        info!(
            fps = %format!("{:.1}", self.render_fps),
            warped = %format!("{:.0}%", warped_ratio * 100.0),
            pending = queue.len(),
            evicted = queue_stats.evicted,
            worker_ms = %format!("{:.1}", worker_ms),
            match_error_ms = %format!("{:.1}", self.last_match_error_ns as f64 / 1e6),
            failed = self.failed,
            "🎨 渲染统计"
        );
        self.window_frames = 0;
        self.window_warped = 0;
        self.window_results = 0;
        self.window_worker_ms = 0.0;
        self.last_report = Instant::now();
        true
    }
}

/// 渲染循环: 持有后端、环形缓冲与结果队列句柄
pub struct RenderLoop<B: RenderBackend> {
    backend: B,
    ring: FrameRing<B::Slot>,
    queue: Arc<FlowResultQueue>,
    stats: RenderStats,
}

impl<B: RenderBackend> RenderLoop<B> {
    /// 上传网格拓扑并创建环形槽位
    pub fn new(mut backend: B, config: &PipelineConfig, queue: Arc<FlowResultQueue>) -> Result<Self> {
        let topology = generate_topology(config.grid_width(), config.grid_height());
        backend.upload_mesh(&topology)?;
        let ring = FrameRing::from_fn(config.ring_size, |i| backend.create_slot(i))?;

        info!(
            backend = backend.name(),
            slots = ring.len(),
            "✅ 渲染循环已就绪"
        );
        Ok(Self {
            backend,
            ring,
            queue,
            stats: RenderStats::default(),
        })
    }

    /// 处理一个新采集帧
    ///
    /// 无论结果如何写指针都会前进。后端错误原样返回并计入 `failed`,
    /// 直通绘制失败的槽位保留原时间戳。
    pub fn on_frame(&mut self, frame: &Frame) -> Result<RenderOutcome> {
        let rendered = self.render(frame);
        self.ring.advance();

        match rendered.and_then(|outcome| self.present(outcome)) {
            Ok(outcome) => {
                self.stats.record(&outcome);
                self.stats.report(&self.queue);
                Ok(outcome)
            }
            Err(e) => {
                self.stats.record_failure();
                Err(e)
            }
        }
    }

    fn present(&mut self, outcome: RenderOutcome) -> Result<RenderOutcome> {
        if let RenderOutcome::Warped { .. } = outcome {
            self.backend.present()?;
        }
        Ok(outcome)
    }

    fn render(&mut self, frame: &Frame) -> Result<RenderOutcome> {
        let (written, target) = self.ring.write_target();
        self.backend.draw_pass_through(target, frame)?;
        self.ring.commit(frame.timestamp());

        if self.queue.is_empty() {
            return Ok(RenderOutcome::PassThroughOnly { written });
        }

        let result = match self.queue.take() {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "⚠️ 跳过本帧扭曲渲染");
                return Ok(RenderOutcome::Interrupted { written });
            }
        };
        self.stats.record_worker_latency(result.compute_ms);

        let matched = self.ring.nearest(result.timestamp);
        let slot = self.ring.slot(matched);
        self.backend.draw_warped(&slot.target, &result.vertices)?;

        Ok(RenderOutcome::Warped {
            written,
            matched,
            result_timestamp: result.timestamp,
            match_error_ns: result.timestamp.abs_diff(slot.timestamp),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn ring(&self) -> &FrameRing<B::Slot> {
        &self.ring
    }

    pub fn queue(&self) -> &Arc<FlowResultQueue> {
        &self.queue
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }
}
