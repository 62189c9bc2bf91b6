// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// GPU渲染后端 (使用wgpu)
///
/// - 采集帧上传到一张 R8Unorm 纹理, 直通管线全屏绘制到槽位渲染目标
/// - 扭曲管线: 位置缓冲每帧重写, 纹理坐标与索引缓冲只在初始化时上传一次
/// - 输出为离屏纹理 (可回读) 或宿主提供的 wgpu::Surface
use super::shaders::{PASS_THROUGH_SHADER, WARP_SHADER};
use super::{RenderBackend, PASS_THROUGH_QUAD};
use crate::config::PipelineConfig;
use crate::input::Frame;
use crate::mesh::MeshTopology;
use anyhow::{anyhow, bail, Context, Result};
use image::{DynamicImage, RgbaImage};
use tracing::{info, warn};
use wgpu::util::DeviceExt;

/// 槽位渲染目标格式
const SLOT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;
/// 离屏输出格式
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// 环形缓冲槽位: 渲染目标纹理 + 供扭曲管线采样的绑定组
pub struct WgpuSlot {
    index: usize,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

impl WgpuSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }
}

/// 输出目标
enum OutputTarget {
    Offscreen { texture: wgpu::Texture },
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        current: Option<wgpu::SurfaceTexture>,
    },
}

/// 网格缓冲区
struct MeshBuffers {
    positions: wgpu::Buffer,
    tex_coords: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
    vertex_count: usize,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    capture_size: (u32, u32),

    camera_texture: wgpu::Texture,
    camera_bind_group: wgpu::BindGroup,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,

    pass_through_pipeline: wgpu::RenderPipeline,
    warp_pipeline: wgpu::RenderPipeline,
    quad_buffer: wgpu::Buffer,
    mesh: Option<MeshBuffers>,

    output: OutputTarget,
    frames_presented: u64,
}

impl WgpuBackend {
    /// 无窗口模式: 输出到离屏纹理
    ///
    /// 注意: 使用pollster::block_on内部处理异步,外部是同步调用
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow!("无法找到合适的GPU"))?;
        let (device, queue) = request_device(&adapter)?;

        let (w, h) = (config.output_width, config.output_height);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Output"),
            size: extent(w, h),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        Self::build(
            &adapter,
            device,
            queue,
            config,
            OutputTarget::Offscreen { texture },
            OFFSCREEN_FORMAT,
        )
    }

    /// 窗口模式: 呈现到宿主创建的 Surface
    pub fn with_surface(
        instance: &wgpu::Instance,
        surface: wgpu::Surface<'static>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow!("无法找到支持该窗口表面的GPU"))?;
        let (device, queue) = request_device(&adapter)?;

        let surface_config = surface
            .get_default_config(&adapter, config.output_width, config.output_height)
            .ok_or_else(|| anyhow!("窗口表面与该GPU不兼容"))?;
        surface.configure(&device, &surface_config);
        let format = surface_config.format;

        Self::build(
            &adapter,
            device,
            queue,
            config,
            OutputTarget::Surface {
                surface,
                config: surface_config,
                current: None,
            },
            format,
        )
    }

    fn build(
        adapter: &wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: &PipelineConfig,
        output: OutputTarget,
        output_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let (cw, ch) = (config.capture_width, config.capture_height);
        let max = device.limits().max_texture_dimension_2d;
        if cw > max || ch > max || config.output_width > max || config.output_height > max {
            bail!("渲染目标尺寸超出GPU限制 ({max})");
        }

        let camera_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Camera Texture"),
            size: extent(cw, ch),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SLOT_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Clamp Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture Bind Group Layout"),
            entries: &[
                // 纹理
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // 采样器
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let camera_view = camera_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let camera_bind_group = texture_bind_group(&device, &texture_layout, &camera_view, &sampler);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Flow Warp Pipeline Layout"),
            bind_group_layouts: &[&texture_layout],
            push_constant_ranges: &[],
        });

        let pass_through_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Pass Through Shader"),
            source: wgpu::ShaderSource::Wgsl(PASS_THROUGH_SHADER.into()),
        });
        let warp_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Warp Shader"),
            source: wgpu::ShaderSource::Wgsl(WARP_SHADER.into()),
        });

        // 直通: 交错 [x, y, u, v], 三角形带
        let quad_layout = [wgpu::VertexBufferLayout {
            array_stride: (4 * std::mem::size_of::<f32>()) as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
        }];
        let pass_through_pipeline = create_render_pipeline(
            &device,
            &pipeline_layout,
            &pass_through_module,
            &quad_layout,
            SLOT_FORMAT,
            wgpu::PrimitiveTopology::TriangleStrip,
            "Pass Through Pipeline",
        );

        // 扭曲: 位置与纹理坐标分属两个缓冲区, 三角形列表
        let mesh_layout = [
            wgpu::VertexBufferLayout {
                array_stride: (2 * std::mem::size_of::<f32>()) as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x2],
            },
            wgpu::VertexBufferLayout {
                array_stride: (2 * std::mem::size_of::<f32>()) as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![1 => Float32x2],
            },
        ];
        let warp_pipeline = create_render_pipeline(
            &device,
            &pipeline_layout,
            &warp_module,
            &mesh_layout,
            output_format,
            wgpu::PrimitiveTopology::TriangleList,
            "Warp Pipeline",
        );

        let quad_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Pass Through Quad"),
            contents: bytemuck::cast_slice(&PASS_THROUGH_QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let adapter_name = adapter.get_info().name;
        info!(
            adapter = %adapter_name,
            format = ?output_format,
            "✅ GPU渲染后端初始化完成"
        );

        Ok(Self {
            device,
            queue,
            adapter_name,
            capture_size: (cw, ch),
            camera_texture,
            camera_bind_group,
            texture_layout,
            sampler,
            pass_through_pipeline,
            warp_pipeline,
            quad_buffer,
            mesh: None,
            output,
            frames_presented: 0,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// 窗口尺寸变化时重新配置表面
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let OutputTarget::Surface { surface, config, .. } = &mut self.output {
            config.width = width;
            config.height = height;
            surface.configure(&self.device, config);
        }
    }

    /// 回读离屏输出 (RGBA), 窗口模式返回 None
    pub fn read_output(&self) -> Result<Option<RgbaImage>> {
        let OutputTarget::Offscreen { texture } = &self.output else {
            return Ok(None);
        };
        let (w, h) = (texture.width(), texture.height());
        let data = read_texture(&self.device, &self.queue, texture, 4)?;
        Ok(RgbaImage::from_raw(w, h, data))
    }

    /// 回读槽位内容 (单通道)
    pub fn read_slot(&self, slot: &WgpuSlot) -> Result<Option<image::GrayImage>> {
        let (w, h) = (slot.texture.width(), slot.texture.height());
        let data = read_texture(&self.device, &self.queue, &slot.texture, 1)?;
        Ok(image::GrayImage::from_raw(w, h, data))
    }

    /// 获取本帧输出视图, 窗口模式下从表面取下一张纹理
    fn acquire_output_view(&mut self) -> Result<wgpu::TextureView> {
        match &mut self.output {
            OutputTarget::Offscreen { texture } => {
                Ok(texture.create_view(&wgpu::TextureViewDescriptor::default()))
            }
            OutputTarget::Surface {
                surface,
                config,
                current,
            } => {
                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(e @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                        warn!(error = %e, "⚠️ 窗口表面失效, 重新配置");
                        surface.configure(&self.device, config);
                        return Err(e.into());
                    }
                    Err(e) => return Err(e.into()),
                };
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                *current = Some(frame);
                Ok(view)
            }
        }
    }
}

impl RenderBackend for WgpuBackend {
    type Slot = WgpuSlot;

    fn name(&self) -> &str {
        "wgpu"
    }

    fn output_size(&self) -> (u32, u32) {
        match &self.output {
            OutputTarget::Offscreen { texture } => (texture.width(), texture.height()),
            OutputTarget::Surface { config, .. } => (config.width, config.height),
        }
    }

    fn create_slot(&mut self, index: usize) -> Result<WgpuSlot> {
        let (w, h) = self.capture_size;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Ring Slot {index}")),
            size: extent(w, h),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SLOT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = texture_bind_group(&self.device, &self.texture_layout, &view, &self.sampler);
        Ok(WgpuSlot {
            index,
            texture,
            view,
            bind_group,
        })
    }

    fn upload_mesh(&mut self, topology: &MeshTopology) -> Result<()> {
        let vertex_count = topology.vertex_count();
        let positions = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh Positions"),
            size: (vertex_count * 2 * std::mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let tex_coords = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Tex Coords"),
            contents: bytemuck::cast_slice(topology.tex_coords()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Indices"),
            contents: bytemuck::cast_slice(topology.indices()),
            usage: wgpu::BufferUsages::INDEX,
        });

        info!(
            grid = %format!("{}x{}", topology.grid_width(), topology.grid_height()),
            indices = topology.index_count(),
            "📐 扭曲网格已上传"
        );
        self.mesh = Some(MeshBuffers {
            positions,
            tex_coords,
            indices,
            index_count: topology.index_count() as u32,
            vertex_count,
        });
        Ok(())
    }

    fn draw_pass_through(&mut self, slot: &mut WgpuSlot, frame: &Frame) -> Result<()> {
        let (w, h) = self.capture_size;
        if (frame.width(), frame.height()) != (w, h) {
            bail!(
                "帧尺寸 {}x{} 与采集纹理 {w}x{h} 不一致",
                frame.width(),
                frame.height()
            );
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.camera_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            frame.data(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(w),
                rows_per_image: Some(h),
            },
            extent(w, h),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Pass Through Encoder"),
            });
        {
            let mut pass = begin_clear_pass(&mut encoder, &slot.view, "Pass Through Pass");
            pass.set_pipeline(&self.pass_through_pipeline);
            pass.set_bind_group(0, &self.camera_bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
            pass.draw(0..PASS_THROUGH_QUAD.len() as u32, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn draw_warped(&mut self, slot: &WgpuSlot, vertices: &[f32]) -> Result<()> {
        let (expected, index_count) = match &self.mesh {
            Some(mesh) => (mesh.vertex_count * 2, mesh.index_count),
            None => bail!("网格尚未上传"),
        };
        if vertices.len() != expected {
            bail!("顶点数组长度 {} 与网格不一致 (期望 {expected})", vertices.len());
        }

        let view = self.acquire_output_view()?;
        let Some(mesh) = &self.mesh else {
            bail!("网格尚未上传");
        };
        self.queue
            .write_buffer(&mesh.positions, 0, bytemuck::cast_slice(vertices));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Warp Encoder"),
            });
        {
            let mut pass = begin_clear_pass(&mut encoder, &view, "Warp Pass");
            pass.set_pipeline(&self.warp_pipeline);
            pass.set_bind_group(0, &slot.bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.positions.slice(..));
            pass.set_vertex_buffer(1, mesh.tex_coords.slice(..));
            pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..index_count, 0, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if let OutputTarget::Surface { current, .. } = &mut self.output {
            if let Some(frame) = current.take() {
                frame.present();
            }
        }
        self.frames_presented += 1;
        Ok(())
    }

    fn snapshot(&mut self) -> Result<Option<DynamicImage>> {
        Ok(self.read_output()?.map(DynamicImage::ImageRgba8))
    }
}

fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("Flow Warp Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::default(),
        },
        None,
    ))
    .context("请求GPU设备失败")
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Texture Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

/// 辅助函数: 创建渲染管线
fn create_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    buffers: &[wgpu::VertexBufferLayout<'_>],
    format: wgpu::TextureFormat,
    topology: wgpu::PrimitiveTopology,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: "vs_main",
            buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn begin_clear_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &'e wgpu::TextureView,
    label: &str,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

/// 纹理回读, 行宽按 256 字节对齐后再去除填充
fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    bytes_per_pixel: u32,
) -> Result<Vec<u8>> {
    let (w, h) = (texture.width(), texture.height());
    let unpadded = w * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: (padded * h) as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(h),
            },
        },
        extent(w, h),
    );
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = futures::channel::oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    pollster::block_on(rx)
        .context("回读通道已关闭")?
        .context("映射回读缓冲失败")?;

    let mapped = slice.get_mapped_range();
    let mut data = Vec::with_capacity((unpadded * h) as usize);
    for row in mapped.chunks_exact(padded as usize) {
        data.extend_from_slice(&row[..unpadded as usize]);
    }
    drop(mapped);
    buffer.unmap();
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{generate_topology, regular_grid};

    /// 没有可用GPU时跳过
    fn backend(config: &PipelineConfig) -> Option<WgpuBackend> {
        match WgpuBackend::new(config) {
            Ok(backend) => Some(backend),
            Err(e) => {
                eprintln!("跳过GPU测试: {e}");
                None
            }
        }
    }

    #[test]
    fn zero_flow_warp_matches_slot() {
        let config = PipelineConfig {
            capture_width: 64,
            capture_height: 48,
            output_width: 64,
            output_height: 48,
            ..Default::default()
        };
        let Some(mut gpu) = backend(&config) else {
            return;
        };

        let img = image::GrayImage::from_fn(64, 48, |x, y| image::Luma([(x * 2 + y) as u8]));
        let frame = Frame::from_gray(img, 1).unwrap();
        let mut slot = gpu.create_slot(0).unwrap();
        gpu.draw_pass_through(&mut slot, &frame).unwrap();
        assert_eq!(gpu.read_slot(&slot).unwrap().unwrap().as_raw().as_slice(), frame.data());

        gpu.upload_mesh(&generate_topology(32, 24)).unwrap();
        gpu.draw_warped(&slot, &regular_grid(32, 24)).unwrap();
        gpu.present().unwrap();

        let out = gpu.read_output().unwrap().unwrap();
        for y in 4..44 {
            for x in 2..58 {
                let a = out.get_pixel(x, y).0[0] as i32;
                let b = frame.data()[(y * 64 + x) as usize] as i32;
                assert!((a - b).abs() <= 2, "({x}, {y}): {a} vs {b}");
            }
        }
    }
}
