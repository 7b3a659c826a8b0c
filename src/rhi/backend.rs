//! 原生图形驱动接口
//!
//! `Backend` 是 RHI 与原生 API 之间唯一的接缝。每个方法都对应一次（或极少几次）
//! 原生调用，不做任何缓存或状态跟踪；缓存由上层的 `PipelineStateCache`
//! 和 `ResourceRegistry` 负责。
//!
//! 原生对象以关联类型暴露。D3D11 后端直接使用 COM 接口（Clone 即 AddRef，
//! Drop 即 Release），headless 后端使用引用计数记录。
//!
//! 所有方法都接受 `&self`：调用在单线程上同步执行，立即上下文只有一个。

use std::fmt::Debug;

use crate::core::error::Result;
use crate::rhi::shader::HlslSource;
use crate::rhi::state::{BlendDesc, DepthStencilDesc, RasterizerDesc, SamplerDesc};
use crate::rhi::types::{
    BufferDesc, IndexFormat, PrimitiveTopology, ScissorRect, ShaderStage, TextureDesc,
    VertexLayout, Viewport,
};

/// 原生图形驱动
pub trait Backend: Debug + 'static {
    type Buffer: Clone + Debug;
    type Texture: Clone + Debug;
    type ShaderResourceView: Clone + Debug;
    type RenderTargetView: Clone + Debug;
    type DepthStencilView: Clone + Debug;
    type VertexShader: Clone + Debug;
    type PixelShader: Clone + Debug;
    type InputLayout: Clone + Debug;
    type SamplerState: Clone + Debug;
    type DepthStencilState: Clone + Debug;
    type RasterizerState: Clone + Debug;
    type BlendState: Clone + Debug;

    /// 后端名称，用于日志
    fn name(&self) -> &'static str;

    // ---- 资源创建 ----

    fn create_buffer(&self, desc: &BufferDesc, initial_data: Option<&[u8]>) -> Result<Self::Buffer>;

    fn create_texture_2d(&self, desc: &TextureDesc, initial_data: Option<&[u8]>) -> Result<Self::Texture>;

    fn create_shader_resource_view(
        &self,
        texture: &Self::Texture,
        desc: &TextureDesc,
    ) -> Result<Self::ShaderResourceView>;

    fn create_render_target_view(
        &self,
        texture: &Self::Texture,
        desc: &TextureDesc,
    ) -> Result<Self::RenderTargetView>;

    fn create_depth_stencil_view(
        &self,
        texture: &Self::Texture,
        desc: &TextureDesc,
    ) -> Result<Self::DepthStencilView>;

    fn create_sampler_state(&self, desc: &SamplerDesc) -> Result<Self::SamplerState>;

    // ---- 着色器 ----

    /// 编译 HLSL，返回字节码
    fn compile_shader(&self, source: &HlslSource, stage: ShaderStage) -> Result<Vec<u8>>;

    fn create_vertex_shader(&self, bytecode: &[u8]) -> Result<Self::VertexShader>;

    fn create_pixel_shader(&self, bytecode: &[u8]) -> Result<Self::PixelShader>;

    /// 输入布局需要顶点着色器字节码中的输入签名
    fn create_input_layout(&self, layout: &VertexLayout, vs_bytecode: &[u8]) -> Result<Self::InputLayout>;

    // ---- 管线状态对象 ----

    fn create_depth_stencil_state(&self, desc: &DepthStencilDesc) -> Result<Self::DepthStencilState>;

    fn create_rasterizer_state(&self, desc: &RasterizerDesc) -> Result<Self::RasterizerState>;

    fn create_blend_state(&self, desc: &BlendDesc) -> Result<Self::BlendState>;

    // ---- 数据更新 ----

    /// 覆盖写入缓冲区开头的 `data.len()` 字节
    fn write_buffer(&self, buffer: &Self::Buffer, desc: &BufferDesc, data: &[u8]) -> Result<()>;

    /// 覆盖写入纹理 mip 0
    fn write_texture_2d(&self, texture: &Self::Texture, desc: &TextureDesc, data: &[u8]) -> Result<()>;

    // ---- 绑定 ----

    fn set_render_targets(
        &self,
        colors: &[&Self::RenderTargetView],
        depth: Option<&Self::DepthStencilView>,
    );

    fn clear_render_target(&self, view: &Self::RenderTargetView, color: [f32; 4]);

    fn clear_depth_stencil(&self, view: &Self::DepthStencilView, depth: Option<f32>, stencil: Option<u8>);

    fn set_viewport(&self, viewport: &Viewport);

    fn set_scissor_rect(&self, rect: &ScissorRect);

    fn set_input_layout(&self, layout: Option<&Self::InputLayout>);

    fn set_primitive_topology(&self, topology: PrimitiveTopology);

    fn set_vertex_shader(&self, shader: &Self::VertexShader);

    fn set_pixel_shader(&self, shader: &Self::PixelShader);

    fn set_depth_stencil_state(&self, state: &Self::DepthStencilState, stencil_ref: u32);

    fn set_rasterizer_state(&self, state: &Self::RasterizerState);

    fn set_blend_state(&self, state: &Self::BlendState, blend_factor: [f32; 4], sample_mask: u32);

    fn set_vertex_buffer(&self, slot: u32, buffer: &Self::Buffer, stride: u32, offset: u32);

    fn set_index_buffer(&self, buffer: &Self::Buffer, format: IndexFormat, offset: u32);

    fn set_constant_buffer(&self, stage: ShaderStage, slot: u32, buffer: Option<&Self::Buffer>);

    fn set_shader_resource(&self, stage: ShaderStage, slot: u32, view: Option<&Self::ShaderResourceView>);

    fn set_sampler(&self, stage: ShaderStage, slot: u32, sampler: Option<&Self::SamplerState>);

    /// 把立即上下文恢复到默认状态
    fn clear_state(&self);

    // ---- 绘制 ----

    fn draw(&self, vertex_count: u32, start_vertex: u32);

    fn draw_indexed(&self, index_count: u32, start_index: u32, base_vertex: i32);

    fn draw_instanced(&self, vertex_count: u32, instance_count: u32, start_vertex: u32, start_instance: u32);

    fn draw_indexed_instanced(
        &self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    );

    fn flush(&self);

    // ---- 交换链 ----

    /// 当前后备缓冲区及其描述
    fn back_buffer(&self) -> Result<(Self::Texture, TextureDesc)>;

    /// 调整后备缓冲区大小；调用前必须释放所有指向后备缓冲区的视图
    fn resize_surface(&self, width: u32, height: u32) -> Result<()>;

    fn present(&self, vsync: bool) -> Result<()>;
}
