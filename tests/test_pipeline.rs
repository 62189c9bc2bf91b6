// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
// 端到端: 采集帧 → 光流 → 网格投影 → 扭曲渲染

use flowwarp_rs::flow::{DenseLucasKanade, FlowEstimator};
use flowwarp_rs::input::{self, FrameSource, SyntheticSource};
use flowwarp_rs::pipeline::{
    FlowResultQueue, FrameDispatcher, Pipeline, RenderOutcome, WorkerConfig, WorkerPool,
};
use flowwarp_rs::render::{CpuBackend, RenderBackend};
use flowwarp_rs::PipelineConfig;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

fn config(w: u32, h: u32) -> PipelineConfig {
    PipelineConfig {
        capture_width: w,
        capture_height: h,
        output_width: w,
        output_height: h,
        ..Default::default()
    }
}

fn pipeline(config: &PipelineConfig) -> Pipeline<CpuBackend> {
    let estimator = Arc::new(DenseLucasKanade::new(config.lucas_kanade.clone()));
    Pipeline::new(config.clone(), CpuBackend::from_config(config), estimator).unwrap()
}

#[test]
fn identical_frames_render_like_pass_through() {
    let (w, h) = (64u32, 48u32);
    let config = config(w, h);
    let mut pipeline = pipeline(&config);

    let mut source = SyntheticSource::new(w, h, (0.0, 0.0));
    let base = source.next_frame().unwrap().unwrap();

    let mut outcomes = Vec::new();
    for ts in [1_000u64, 2_000] {
        outcomes.push(pipeline.process_frame(&base.with_timestamp(ts)).unwrap());
    }
    assert!(pipeline.flush(Duration::from_secs(10)));
    outcomes.push(pipeline.process_frame(&base.with_timestamp(3_000)).unwrap());

    let warped = outcomes
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
        .expect("expected one warped render");
    assert_eq!(warped, (0, 1_000, 0));

    // 网格覆盖区域内与直通画面一致 (±1)
    let out = pipeline.backend().presented();
    let mut checked = 0;
    for y in 2..h {
        for x in 0..w - 2 {
            let a = out.get_pixel(x, y).0[0] as i32;
            let b = base.data()[(y * w + x) as usize] as i32;
            assert!((a - b).abs() <= 1, "({x}, {y}): {a} vs {b}");
            checked += 1;
        }
    }
    assert!(checked > 0);
}

#[test]
fn moving_pattern_produces_displaced_mesh() {
    let (w, h) = (128u32, 96u32);
    let config = config(w, h);
    let estimator = DenseLucasKanade::new(config.lucas_kanade.clone());

    // 每帧右移 2 像素 → 半分辨率下约 1 像素
    let mut source = SyntheticSource::new(w, h, (2.0, 0.0));
    let prev = source.next_frame().unwrap().unwrap();
    let next = source.next_frame().unwrap().unwrap();

    let flow = estimator
        .estimate(&prev.half_resolution(), &next.half_resolution())
        .unwrap();
    let (gw, gh) = (config.grid_width(), config.grid_height());
    let (mx, my) = flow.mean_in(gw / 4, 3 * gw / 4, gh / 4, 3 * gh / 4);
    assert!(mx > 0.6 && mx < 1.4, "mean dx = {mx}");
    assert!(my.abs() < 0.3, "mean dy = {my}");

    let vertices = flowwarp_rs::project_to_vertices(&flow, gw, gh, 1.0).unwrap();
    let grid = flowwarp_rs::mesh::regular_grid(gw, gh);
    // 中心顶点向右偏移约 1/W_grid
    let centre = 2 * ((gh / 2) * gw + gw / 2);
    let shift = vertices[centre] - grid[centre];
    assert!(shift > 0.6 / gw as f32 && shift < 1.4 / gw as f32, "shift = {shift}");
}

#[test]
fn capture_thread_feeds_running_pipeline() {
    let (w, h) = (32u32, 24u32);
    let config = config(w, h);
    let mut pipeline = pipeline(&config);

    let (tx, rx) = input::frame_channel(64);
    let source = SyntheticSource::new(w, h, (1.0, 0.5)).with_limit(20);
    let capture = input::spawn_capture(source, tx, 0.0, Arc::new(AtomicBool::new(false)));

    let mut snapshots = 0;
    let stats = pipeline
        .run_with(rx, |outcome, backend| {
            if let RenderOutcome::Warped { .. } = outcome {
                let image = backend.snapshot()?.expect("cpu backend always has a snapshot");
                assert_eq!((image.width(), image.height()), (w, h));
                snapshots += 1;
            }
            Ok(())
        })
        .unwrap();

    let captured = capture.join().unwrap();
    assert_eq!(captured.delivered + captured.dropped, 20);
    assert_eq!(stats.frames, captured.delivered);
    assert_eq!(stats.warped, snapshots);
    assert_eq!(
        stats.warped + stats.pass_through_only + stats.interrupted + stats.failed,
        stats.frames
    );
    assert_eq!(stats.failed, 0);
    assert_eq!(pipeline.backend().frames_presented(), stats.warped);
    assert!(pipeline.queue().is_closed());
}

#[test]
fn gain_zero_freezes_mesh() {
    let (w, h) = (32u32, 24u32);
    let config = PipelineConfig {
        flow_gain: 0.0,
        ..config(w, h)
    };
    let queue = Arc::new(FlowResultQueue::new(config.queue_capacity));
    let mut pool = WorkerPool::new(
        1,
        Arc::new(DenseLucasKanade::new(config.lucas_kanade.clone())),
        Arc::clone(&queue),
        WorkerConfig {
            grid_width: config.grid_width(),
            grid_height: config.grid_height(),
            flow_gain: config.flow_gain,
        },
    )
    .unwrap();

    let mut source = SyntheticSource::new(w, h, (3.0, 0.0));
    let mut dispatcher = FrameDispatcher::new();
    let mut first_ts = None;
    for _ in 0..2 {
        let frame = source.next_frame().unwrap().unwrap();
        first_ts.get_or_insert(frame.timestamp());
        if let Some(job) = dispatcher.offer(&frame) {
            pool.dispatch(job).unwrap();
        }
    }
    assert!(pool.wait_idle(Duration::from_secs(10)));
    pool.shutdown();

    let result = queue.try_take().unwrap();
    assert_eq!(Some(result.timestamp), first_ts);
    assert_eq!(
        result.vertices,
        flowwarp_rs::mesh::regular_grid(config.grid_width(), config.grid_height())
    );
}
