// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频输入系统 (Video Input System)
///
/// 独立采集线程, 负责把单通道帧推入"新帧就绪"通道
/// - Frame:               采集帧 (灰度 + 时间戳)
/// - SyntheticSource:     合成平移图案
/// - ImageSequenceSource: 图像目录序列
pub mod frame;
pub mod sequence;
pub mod synthetic;

pub use frame::{Frame, FrameError};
pub use sequence::ImageSequenceSource;
pub use synthetic::SyntheticSource;

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// 采集端接口: 每次调用交付一帧, 源耗尽时返回 None
pub trait FrameSource: Send {
    fn name(&self) -> &str;
    fn resolution(&self) -> (u32, u32);
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// 新帧通道, 容量很小, 渲染跟不上时采集端丢帧而不是堆积
pub fn frame_channel(capacity: usize) -> (Sender<Frame>, Receiver<Frame>) {
    crossbeam_channel::bounded(capacity.max(1))
}

/// 采集线程统计
#[derive(Debug, Default, Clone, Copy)]
pub struct CaptureStats {
    pub delivered: u64,
    pub dropped: u64,
}

/// 启动采集线程
///
/// `fps` 为 0 时不节流, 尽快推送。源耗尽、出错、`stop` 置位或接收端
/// 断开时线程退出, 通道随发送端一起关闭。
pub fn spawn_capture<S>(
    mut source: S,
    tx: Sender<Frame>,
    fps: f64,
    stop: Arc<AtomicBool>,
) -> JoinHandle<CaptureStats>
where
    S: FrameSource + 'static,
{
    std::thread::spawn(move || {
        let (w, h) = source.resolution();
        info!(source = source.name(), width = w, height = h, "📷 采集线程启动");

        let interval = if fps > 0.0 {
            Some(Duration::from_secs_f64(1.0 / fps))
        } else {
            None
        };
        let mut stats = CaptureStats::default();

        while !stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("📹 帧源已耗尽");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "❌ 采集失败");
                    break;
                }
            };

            match tx.try_send(frame) {
                Ok(()) => stats.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    stats.dropped += 1;
                    if stats.dropped <= 10 {
                        warn!(dropped = stats.dropped, "⚠️ 渲染端繁忙, 丢弃采集帧");
                    }
                }
                Err(TrySendError::Disconnected(_)) => {
                    info!("接收端已断开");
                    break;
                }
            }

            if let Some(interval) = interval {
                let spent = started.elapsed();
                if spent < interval {
                    std::thread::sleep(interval - spent);
                }
            }
        }

        info!(
            delivered = stats.delivered,
            dropped = stats.dropped,
            "📹 采集线程退出"
        );
        stats
    })
}
