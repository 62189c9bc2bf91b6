// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! WGSL 着色器

/// 直通着色器: 采集纹理全屏绘制到槽位渲染目标
pub const PASS_THROUGH_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4<f32>(position, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let luma = textureSample(source_texture, source_sampler, in.uv).r;
    return vec4<f32>(luma, luma, luma, 1.0);
}
"#;

/// 扭曲着色器: 槽位纹理按网格顶点绘制到输出表面
///
/// 网格纹理坐标为左下原点, 槽位纹理为左上原点, 顶点阶段翻转 v。
pub const WARP_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var slot_texture: texture_2d<f32>;
@group(0) @binding(1) var slot_sampler: sampler;

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4<f32>(position, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let luma = textureSample(slot_texture, slot_sampler, in.uv).r;
    return vec4<f32>(luma, luma, luma, 1.0);
}
"#;
