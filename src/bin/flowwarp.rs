// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 光流前向扭曲实时管线
///
/// 架构:
/// 1. 主线程: 渲染线程 (帧分发 + 环形缓冲 + 扭曲渲染)
/// 2. 子线程1: 采集线程 (合成图案 / 图像序列)
/// 3. 子线程2..N: 光流工作线程
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use flowwarp_rs::input::{self, FrameSource, ImageSequenceSource, SyntheticSource};
use flowwarp_rs::pipeline::{Pipeline, RenderOutcome};
use flowwarp_rs::render::{CpuBackend, RenderBackend};
use flowwarp_rs::{gen_time_string, DenseLucasKanade, PipelineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceKind {
    /// 匀速平移的合成图案
    Synthetic,
    /// 图像目录 (png/jpg/bmp), 按文件名排序
    Images,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    /// 软件光栅化
    Cpu,
    /// wgpu 渲染 (需要 gpu 特性)
    Gpu,
}

/// 光流前向扭曲程序
#[derive(Parser, Debug)]
#[command(author, version, about = "光流前向扭曲实时管线", long_about = None)]
struct Args {
    /// 配置文件路径 (不存在时写入默认配置)
    #[arg(short, long, default_value = "flowwarp.json")]
    config: String,

    /// 帧源
    #[arg(short, long, value_enum, default_value_t = SourceKind::Synthetic)]
    source: SourceKind,

    /// 图像目录 (--source images)
    #[arg(long)]
    images: Option<PathBuf>,

    /// 处理帧数, 0 表示直到帧源耗尽
    #[arg(short, long, default_value_t = 300)]
    frames: u64,

    /// 采集帧率, 0 表示不节流
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// 渲染后端
    #[arg(short, long, value_enum, default_value_t = BackendKind::Cpu)]
    backend: BackendKind,

    /// 导出扭曲画面的目录 (每次运行新建一个按时间命名的子目录)
    #[arg(long)]
    dump: Option<PathBuf>,

    /// 覆盖配置中的 flow_gain
    #[arg(long)]
    gain: Option<f32>,

    /// 合成图案每帧平移像素 (x)
    #[arg(long, default_value_t = 1.5)]
    velocity_x: f32,

    /// 合成图案每帧平移像素 (y)
    #[arg(long, default_value_t = 0.5)]
    velocity_y: f32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = PipelineConfig::load(&args.config);
    if let Some(gain) = args.gain {
        config.flow_gain = gain;
    }
    config.validate()?;

    info!("🚀 光流扭曲管线启动");
    info!(source = ?args.source, backend = ?args.backend, frames = args.frames, "运行参数");

    match args.backend {
        BackendKind::Cpu => run(&args, config.clone(), CpuBackend::from_config(&config)),
        BackendKind::Gpu => run_gpu(&args, config),
    }
}

#[cfg(feature = "gpu")]
fn run_gpu(args: &Args, config: PipelineConfig) -> Result<()> {
    let backend = flowwarp_rs::render::WgpuBackend::new(&config)?;
    run(args, config, backend)
}

#[cfg(not(feature = "gpu"))]
fn run_gpu(_args: &Args, _config: PipelineConfig) -> Result<()> {
    bail!("未启用 gpu 特性, 请使用 --features gpu 重新编译")
}

fn run<B: RenderBackend>(args: &Args, config: PipelineConfig, backend: B) -> Result<()> {
    let (w, h) = (config.capture_width, config.capture_height);
    let estimator = Arc::new(DenseLucasKanade::new(config.lucas_kanade.clone()));
    let mut pipeline = Pipeline::new(config, backend, estimator)?;

    let dump_dir = match &args.dump {
        Some(root) => {
            let dir = root.join(gen_time_string("-"));
            std::fs::create_dir_all(&dir).with_context(|| format!("创建导出目录失败: {}", dir.display()))?;
            info!(dir = %dir.display(), "💾 扭曲画面将导出到");
            Some(dir)
        }
        None => None,
    };

    // ========== 启动采集线程 ==========
    let (tx, rx) = input::frame_channel(2);
    let stop = pipeline.stop_handle().flag();
    let capture = match args.source {
        SourceKind::Synthetic => {
            let mut source = SyntheticSource::new(w, h, (args.velocity_x, args.velocity_y)).with_fps(args.fps);
            if args.frames > 0 {
                source = source.with_limit(args.frames);
            }
            input::spawn_capture(source, tx, args.fps, stop)
        }
        SourceKind::Images => {
            let Some(dir) = &args.images else {
                bail!("--source images 需要 --images <目录>");
            };
            let source = ImageSequenceSource::open(dir, w, h)?.with_fps(args.fps);
            input::spawn_capture(Limited::new(source, args.frames), tx, args.fps, stop)
        }
    };

    // ========== 主线程: 渲染 ==========
    let mut dumped = 0u64;
    let stats = pipeline.run_with(rx, |outcome, backend| {
        let (Some(dir), RenderOutcome::Warped { result_timestamp, .. }) = (&dump_dir, outcome) else {
            return Ok(());
        };
        if let Some(image) = backend.snapshot()? {
            dumped += 1;
            let path = dir.join(format!("warp_{dumped:05}_{result_timestamp}.png"));
            image.save(&path).with_context(|| format!("导出画面失败: {}", path.display()))?;
        }
        Ok(())
    })?;

    let capture_stats = capture.join().unwrap_or_default();
    info!(
        captured = capture_stats.delivered,
        dropped = capture_stats.dropped,
        rendered = stats.frames,
        warped = stats.warped,
        dumped,
        "✅ 运行结束"
    );
    Ok(())
}

/// 给任意帧源加总帧数上限
struct Limited<S> {
    inner: S,
    remaining: Option<u64>,
}

impl<S> Limited<S> {
    fn new(inner: S, frames: u64) -> Self {
        Self {
            inner,
            remaining: (frames > 0).then_some(frames),
        }
    }
}

impl<S: FrameSource> FrameSource for Limited<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn resolution(&self) -> (u32, u32) {
        self.inner.resolution()
    }

    fn next_frame(&mut self) -> Result<Option<flowwarp_rs::Frame>> {
        match &mut self.remaining {
            Some(0) => Ok(None),
            Some(n) => {
                *n -= 1;
                self.inner.next_frame()
            }
            None => self.inner.next_frame(),
        }
    }
}
