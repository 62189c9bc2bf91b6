// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 光流扭曲流水线 (Flow Warp Pipeline)
///
/// 线程架构:
/// - Capture:  采集线程, 通过 crossbeam 通道推送新帧
/// - Render:   渲染线程 (调用 run 的线程), 帧分发 + 环形缓冲 + 扭曲渲染
/// - Workers:  N 个串行光流执行器, 结果推入共享队列
pub mod queue;
pub mod render_loop;
pub mod ring;
pub mod worker;

pub use queue::{FlowResult, FlowResultQueue, QueueStats, TakeError};
pub use render_loop::{RenderLoop, RenderOutcome, RenderStats};
pub use ring::{nearest_timestamp, FrameRing, RingSlot};
pub use worker::{FlowJob, FrameDispatcher, WorkerConfig, WorkerPool, WorkerStats};

use crate::config::PipelineConfig;
use crate::flow::FlowEstimator;
use crate::input::{Frame, FrameError};
use crate::render::RenderBackend;
use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// 轮询停止标志的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 跨线程停止句柄
#[derive(Clone)]
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    queue: Arc<FlowResultQueue>,
}

impl PipelineHandle {
    /// 请求停止, 同时打断渲染线程可能正在进行的阻塞等待
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.queue.interrupt();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

/// 完整流水线: 分发器 + 线程池 + 渲染循环
pub struct Pipeline<B: RenderBackend> {
    config: PipelineConfig,
    queue: Arc<FlowResultQueue>,
    dispatcher: FrameDispatcher,
    workers: WorkerPool,
    render: RenderLoop<B>,
    stop: Arc<AtomicBool>,
}

impl<B: RenderBackend> Pipeline<B> {
    pub fn new(config: PipelineConfig, backend: B, estimator: Arc<dyn FlowEstimator>) -> Result<Self> {
        config.validate()?;
        config.print_summary();

        let queue = Arc::new(FlowResultQueue::new(config.queue_capacity));
        let render = RenderLoop::new(backend, &config, Arc::clone(&queue))?;
        let workers = WorkerPool::new(
            config.worker_count,
            estimator,
            Arc::clone(&queue),
            WorkerConfig {
                grid_width: config.grid_width(),
                grid_height: config.grid_height(),
                flow_gain: config.flow_gain,
            },
        )?;

        Ok(Self {
            config,
            queue,
            dispatcher: FrameDispatcher::new(),
            workers,
            render,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 处理一个新采集帧: 分发光流任务, 然后渲染
    pub fn process_frame(&mut self, frame: &Frame) -> Result<RenderOutcome> {
        let expected = (self.config.capture_width, self.config.capture_height);
        let actual = (frame.width(), frame.height());
        if actual != expected {
            return Err(FrameError::UnexpectedSize { expected, actual }.into());
        }

        if let Some(job) = self.dispatcher.offer(frame) {
            self.workers.dispatch(job)?;
        }
        self.render.on_frame(frame)
    }

    /// 在当前线程上运行, 直到停止或采集通道断开
    pub fn run(&mut self, frames: Receiver<Frame>) -> Result<RenderStats> {
        self.run_with(frames, |_, _| Ok(()))
    }

    /// 同 run, 每帧渲染后回调 (例如导出画面)
    pub fn run_with<F>(&mut self, frames: Receiver<Frame>, mut on_rendered: F) -> Result<RenderStats>
    where
        F: FnMut(&RenderOutcome, &mut B) -> Result<()>,
    {
        info!("🚀 流水线启动");
        while !self.stop.load(Ordering::Relaxed) {
            let frame = match frames.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    info!("📹 采集通道已断开");
                    break;
                }
            };

            match self.process_frame(&frame) {
                Ok(outcome) => {
                    if let Err(e) = on_rendered(&outcome, self.render.backend_mut()) {
                        error!(error = %e, "❌ 帧回调失败, 流水线终止");
                        self.shutdown();
                        return Err(e);
                    }
                }
                Err(e) if is_fatal(&e) => {
                    error!(error = %e, "❌ 渲染失败, 流水线终止");
                    self.shutdown();
                    return Err(e);
                }
                Err(e) => warn!(timestamp = frame.timestamp(), error = %e, "⚠️ 帧处理失败"),
            }
        }

        self.shutdown();
        let stats = self.render.stats();
        info!(
            frames = stats.frames,
            warped = stats.warped,
            pass_through_only = stats.pass_through_only,
            interrupted = stats.interrupted,
            "🛑 流水线已停止"
        );
        Ok(stats)
    }

    pub fn stop_handle(&self) -> PipelineHandle {
        PipelineHandle {
            stop: Arc::clone(&self.stop),
            queue: Arc::clone(&self.queue),
        }
    }

    /// 等待已分发的光流任务全部完成
    pub fn flush(&self, timeout: Duration) -> bool {
        self.workers.wait_idle(timeout)
    }

    /// 停止线程池 (处理完积压任务) 并关闭队列
    pub fn shutdown(&mut self) {
        self.workers.shutdown();
        self.queue.close();
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<FlowResultQueue> {
        &self.queue
    }

    pub fn render_loop(&self) -> &RenderLoop<B> {
        &self.render
    }

    pub fn backend(&self) -> &B {
        self.render.backend()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.render.backend_mut()
    }

    pub fn stats(&self) -> RenderStats {
        self.render.stats()
    }
}

/// 只有显存耗尽才终止流水线, 其余单帧错误跳过
#[cfg(feature = "gpu")]
fn is_fatal(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<wgpu::SurfaceError>(),
        Some(wgpu::SurfaceError::OutOfMemory)
    )
}

#[cfg(not(feature = "gpu"))]
fn is_fatal(_error: &anyhow::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::ZeroFlow;
    use crate::render::CpuBackend;

    fn config() -> PipelineConfig {
        PipelineConfig {
            capture_width: 16,
            capture_height: 12,
            output_width: 16,
            output_height: 12,
            ..Default::default()
        }
    }

    fn pipeline() -> Pipeline<CpuBackend> {
        let config = config();
        Pipeline::new(config.clone(), CpuBackend::from_config(&config), Arc::new(ZeroFlow)).unwrap()
    }

    fn frame(ts: u64) -> Frame {
        Frame::new(vec![ts as u8; 16 * 12], 16, 12, ts).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PipelineConfig {
            worker_count: 0,
            ..config()
        };
        let backend = CpuBackend::from_config(&config);
        assert!(Pipeline::new(config, backend, Arc::new(ZeroFlow)).is_err());
    }

    #[test]
    fn wrong_frame_size_is_rejected_at_ingress() {
        let mut pipeline = pipeline();
        let err = pipeline
            .process_frame(&Frame::new(vec![0; 64], 8, 8, 1).unwrap())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<FrameError>(),
            Some(&FrameError::UnexpectedSize {
                expected: (16, 12),
                actual: (8, 8)
            })
        );
        // 环形缓冲未被触碰
        assert_eq!(pipeline.render_loop().ring().write_index(), 0);
    }

    #[test]
    fn results_flow_from_workers_to_render() {
        let mut pipeline = pipeline();
        assert!(matches!(
            pipeline.process_frame(&frame(1)).unwrap(),
            RenderOutcome::PassThroughOnly { .. }
        ));
        // 帧 2 产出 (1, 2) 任务; 结果可能在帧 2 或帧 3 被消费
        let mut outcomes = vec![pipeline.process_frame(&frame(2)).unwrap()];
        assert!(pipeline.flush(Duration::from_secs(5)));
        outcomes.push(pipeline.process_frame(&frame(3)).unwrap());

        let first_warp = outcomes
            .iter()
            .find_map(|o| match *o {
                RenderOutcome::Warped {
                    matched,
                    result_timestamp,
                    match_error_ns,
                    ..
                } => Some((matched, result_timestamp, match_error_ns)),
                _ => None,
            })
            .unwrap();
        assert_eq!(first_warp, (0, 1, 0));
    }

    #[test]
    fn run_ends_on_disconnect_and_skips_bad_frames() {
        let mut pipeline = pipeline();
        let (tx, rx) = crate::input::frame_channel(16);
        tx.send(frame(1)).unwrap();
        tx.send(Frame::new(vec![0; 64], 8, 8, 2).unwrap()).unwrap();
        tx.send(frame(3)).unwrap();
        drop(tx);

        let mut seen = 0;
        let stats = pipeline
            .run_with(rx, |_, _| {
                seen += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, 2);
        assert_eq!(stats.frames, 2);
        assert!(pipeline.queue().is_closed());
    }

    #[test]
    fn callback_error_still_shuts_down() {
        let mut pipeline = pipeline();
        let (tx, rx) = crate::input::frame_channel(4);
        tx.send(frame(1)).unwrap();
        tx.send(frame(2)).unwrap();

        let err = pipeline
            .run_with(rx, |_, _| Err(anyhow::anyhow!("导出失败")))
            .unwrap_err();
        assert_eq!(err.to_string(), "导出失败");
        assert!(pipeline.queue().is_closed());
        assert_eq!(pipeline.stats().frames, 1);
        // 线程池已停止, 不再接受任务
        assert!(pipeline.process_frame(&frame(2)).is_err());
        drop(tx);
    }

    #[test]
    fn stop_handle_ends_run() {
        let mut pipeline = pipeline();
        let handle = pipeline.stop_handle();
        let (_tx, rx) = crate::input::frame_channel(4);

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.stop();
        });
        let stats = pipeline.run(rx).unwrap();
        stopper.join().unwrap();
        assert_eq!(stats.frames, 0);
    }
}
