// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
// 多个工作线程并发处理与串行处理得到相同的队列状态

use flowwarp_rs::flow::{check_pair, FlowError, FlowEstimator, FlowField};
use flowwarp_rs::input::Frame;
use flowwarp_rs::pipeline::worker::compute_vertices;
use flowwarp_rs::pipeline::{FlowResultQueue, FrameDispatcher, WorkerConfig, WorkerPool};
use image::GrayImage;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const W: u32 = 24;
const H: u32 = 16;

/// 光流由帧内容决定, 耗时随内容变化, 让各线程完成顺序交错
struct ContentFlow;

impl FlowEstimator for ContentFlow {
    fn name(&self) -> &str {
        "content"
    }

    fn estimate(&self, prev: &GrayImage, next: &GrayImage) -> Result<FlowField, FlowError> {
        let (w, h) = check_pair(prev, next)?;
        let a = prev.get_pixel(0, 0).0[0] as f32;
        let b = next.get_pixel(0, 0).0[0] as f32;
        std::thread::sleep(Duration::from_micros(((a as u64 * 37) % 5) * 300));
        Ok(FlowField::uniform(w as usize, h as usize, a / 10.0, (b - a) / 4.0))
    }
}

fn frame(ts: u64) -> Frame {
    Frame::new(vec![(ts % 200) as u8; (W * H) as usize], W, H, ts).unwrap()
}

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        grid_width: (W / 2) as usize,
        grid_height: (H / 2) as usize,
        flow_gain: 1.0,
    }
}

/// 串行基准: 同样的任务逐个推入同容量的队列
fn serial_reference(frames: &[Frame], capacity: usize) -> BTreeMap<u64, Vec<f32>> {
    let queue = FlowResultQueue::new(capacity);
    let mut dispatcher = FrameDispatcher::new();
    for frame in frames {
        if let Some(job) = dispatcher.offer(frame) {
            let vertices = compute_vertices(&job, &ContentFlow, &worker_config()).unwrap();
            queue.push(flowwarp_rs::FlowResult::new(job.timestamp, vertices));
        }
    }
    std::iter::from_fn(|| queue.try_take())
        .map(|r| (r.timestamp, r.vertices))
        .collect()
}

#[test]
fn concurrent_workers_match_serial_processing() {
    let frames: Vec<Frame> = (1..=40).map(frame).collect();
    let expected = serial_reference(&frames, 8);
    assert_eq!(expected.keys().copied().collect::<Vec<_>>(), (32..=39).collect::<Vec<_>>());

    for round in 0..5 {
        let queue = Arc::new(FlowResultQueue::new(8));
        let mut pool = WorkerPool::new(3, Arc::new(ContentFlow), Arc::clone(&queue), worker_config()).unwrap();
        let mut dispatcher = FrameDispatcher::new();
        for frame in &frames {
            if let Some(job) = dispatcher.offer(frame) {
                pool.dispatch(job).unwrap();
            }
        }
        assert!(pool.wait_idle(Duration::from_secs(20)), "round {round}: workers did not finish");
        pool.shutdown();

        let stats = queue.stats();
        assert_eq!(stats.pushed, 39);
        assert_eq!(stats.evicted, 31);

        let mut seen = BTreeMap::new();
        while let Some(result) = queue.try_take() {
            assert!(
                seen.insert(result.timestamp, result.vertices).is_none(),
                "round {round}: duplicated timestamp"
            );
        }
        assert_eq!(seen, expected, "round {round}");
    }
}

#[test]
fn render_side_always_receives_oldest_pending() {
    let queue = Arc::new(FlowResultQueue::new(8));
    let mut pool = WorkerPool::new(3, Arc::new(ContentFlow), Arc::clone(&queue), worker_config()).unwrap();
    let mut dispatcher = FrameDispatcher::new();
    for ts in 1..=6 {
        if let Some(job) = dispatcher.offer(&frame(ts)) {
            pool.dispatch(job).unwrap();
        }
    }
    assert!(pool.wait_idle(Duration::from_secs(20)));

    let mut taken = Vec::new();
    while let Ok(result) = queue.take_timeout(Duration::from_millis(50)) {
        taken.push(result.timestamp);
    }
    assert_eq!(taken, vec![1, 2, 3, 4, 5]);
    pool.shutdown();
}
