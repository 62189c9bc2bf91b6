// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 光流工作线程池 + 帧分发
//!
//! 每个工作线程独占一个无界任务通道, 串行处理:
//! 降采样 → 光流估计 → 网格投影 → 推入结果队列。
//! 慢线程只积压自己的任务, 不阻塞其他线程和采集端。

use super::queue::{FlowResult, FlowResultQueue};
use crate::flow::{FlowError, FlowEstimator};
use crate::input::Frame;
use crate::mesh::project_to_vertices;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 一个光流任务: 相邻两帧, 以前一帧的时间戳为键
#[derive(Debug, Clone)]
pub struct FlowJob {
    pub prev: Frame,
    pub next: Frame,
    pub timestamp: u64,
}

/// 采集端分发器: 保存上一帧, 每来一帧产出一个 (上一帧, 当前帧) 任务
///
/// 第一帧只做预热, 不产出任务。
#[derive(Debug, Default)]
pub struct FrameDispatcher {
    prev: Option<Frame>,
}

impl FrameDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, frame: &Frame) -> Option<FlowJob> {
        let prev = self.prev.replace(frame.clone())?;
        Some(FlowJob {
            timestamp: prev.timestamp(),
            prev,
            next: frame.clone(),
        })
    }

    pub fn is_primed(&self) -> bool {
        self.prev.is_some()
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }
}

/// 工作线程参数
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub grid_width: usize,
    pub grid_height: usize,
    pub flow_gain: f32,
}

/// 单个工作线程统计
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    pub jobs: u64,
    pub failures: u64,
    pub evicted: u64,
    pub total_ms: f64,
}

impl WorkerStats {
    pub fn mean_ms(&self) -> f64 {
        if self.jobs == 0 {
            0.0
        } else {
            self.total_ms / self.jobs as f64
        }
    }
}

/// 单个任务的计算: 半分辨率 → 光流 → 顶点
pub fn compute_vertices(
    job: &FlowJob,
    estimator: &dyn FlowEstimator,
    config: &WorkerConfig,
) -> Result<Vec<f32>, FlowError> {
    let prev = job.prev.half_resolution();
    let next = job.next.half_resolution();
    let field = estimator.estimate(&prev, &next)?;
    project_to_vertices(&field, config.grid_width, config.grid_height, config.flow_gain)
}

/// 已分发未完成的任务计数, 归零时唤醒等待者
#[derive(Default)]
struct PendingJobs {
    count: Mutex<usize>,
    idle: Condvar,
}

impl PendingJobs {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap()
    }

    fn add(&self) {
        *self.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn get(&self) -> usize {
        *self.lock()
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let (count, _) = self
            .idle
            .wait_timeout_while(self.lock(), timeout, |count| *count > 0)
            .unwrap();
        *count == 0
    }
}

/// 固定数量的串行执行器, 轮转分配任务
pub struct WorkerPool {
    senders: Vec<Sender<FlowJob>>,
    handles: Vec<JoinHandle<WorkerStats>>,
    next: AtomicUsize,
    pending: Arc<PendingJobs>,
}

impl WorkerPool {
    pub fn new(
        count: usize,
        estimator: Arc<dyn FlowEstimator>,
        queue: Arc<FlowResultQueue>,
        config: WorkerConfig,
    ) -> Result<Self> {
        anyhow::ensure!(count > 0, "工作线程数不能为0");

        let pending = Arc::new(PendingJobs::default());
        let mut senders = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for id in 0..count {
            let (tx, rx) = crossbeam_channel::unbounded::<FlowJob>();
            let estimator = Arc::clone(&estimator);
            let queue = Arc::clone(&queue);
            let pending = Arc::clone(&pending);

            let handle = std::thread::Builder::new()
                .name(format!("flow-worker-{id}"))
                .spawn(move || run_worker(id, rx, estimator, queue, config, pending))
                .with_context(|| format!("启动光流工作线程 {id} 失败"))?;

            senders.push(tx);
            handles.push(handle);
        }

        info!(
            workers = count,
            grid = %format!("{}x{}", config.grid_width, config.grid_height),
            "✅ 光流线程池已启动"
        );

        Ok(Self {
            senders,
            handles,
            next: AtomicUsize::new(0),
            pending,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// 按轮转顺序交给下一个执行器, 返回执行器编号
    pub fn dispatch(&self, job: FlowJob) -> Result<usize> {
        if self.senders.is_empty() {
            return Err(anyhow!("光流线程池已关闭"));
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        self.pending.add();
        if self.senders[index].send(job).is_err() {
            self.pending.done();
            return Err(anyhow!("光流工作线程 {index} 已退出"));
        }
        Ok(index)
    }

    /// 已分发但尚未完成的任务数
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// 等待所有已分发任务完成, 超时返回 false
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pending.wait_idle(timeout)
    }

    /// 关闭任务通道, 等待各线程处理完积压任务后退出
    pub fn shutdown(&mut self) -> Vec<WorkerStats> {
        self.senders.clear();
        let stats: Vec<WorkerStats> = self
            .handles
            .drain(..)
            .map(|h| h.join().unwrap_or_default())
            .collect();
        if !stats.is_empty() {
            let jobs: u64 = stats.iter().map(|s| s.jobs).sum();
            let failures: u64 = stats.iter().map(|s| s.failures).sum();
            info!(jobs, failures, "🛑 光流线程池已停止");
        }
        stats
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    id: usize,
    rx: Receiver<FlowJob>,
    estimator: Arc<dyn FlowEstimator>,
    queue: Arc<FlowResultQueue>,
    config: WorkerConfig,
    pending: Arc<PendingJobs>,
) -> WorkerStats {
    debug!(worker = id, estimator = estimator.name(), "🧵 光流工作线程启动");
    let mut stats = WorkerStats::default();

    for job in rx.iter() {
        let started = Instant::now();
        match compute_vertices(&job, estimator.as_ref(), &config) {
            Ok(vertices) => {
                let compute_ms = started.elapsed().as_secs_f64() * 1000.0;
                stats.jobs += 1;
                stats.total_ms += compute_ms;

                let result = FlowResult {
                    timestamp: job.timestamp,
                    vertices,
                    worker_id: id,
                    compute_ms,
                };
                if queue.push(result).is_some() {
                    stats.evicted += 1;
                }
            }
            Err(e) => {
                stats.failures += 1;
                warn!(worker = id, timestamp = job.timestamp, error = %e, "⚠️ 光流任务失败, 已丢弃");
            }
        }
        pending.done();
    }

    debug!(
        worker = id,
        jobs = stats.jobs,
        mean_ms = stats.mean_ms(),
        "光流工作线程退出"
    );
    stats
}
