//! 设备
//!
//! `Device` 是所有引擎侧资源的创建入口。它持有共享的后端（`Rc<B>`）和资源 id 计数器，
//! 克隆一个 `Device` 只是增加引用计数。
//!
//! 原生调用失败时，创建函数记录 `distrhi::native` 错误日志，然后返回 `Err`。

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use tracing::info;

use crate::core::error::Result;
use crate::rhi::backend::Backend;
use crate::rhi::buffer::{ConstantBuffer, IndexBuffer, VertexBuffer};
use crate::rhi::command_queue::CommandQueue;
use crate::rhi::pipeline::{Pipeline, PipelineDesc};
use crate::rhi::shader::{InputLayout, PixelShader, ShaderSource, VertexShader};
use crate::rhi::state::SamplerDesc;
use crate::rhi::swapchain::Swapchain;
use crate::rhi::texture::{DepthStencil, RenderTarget, Sampler, Texture2D};
use crate::rhi::types::{IndexType, PixelFormat, ResourceId, ResourceUsage, TextureDesc, VertexLayout};

/// 图形设备
#[derive(Debug)]
pub struct Device<B: Backend> {
    backend: Rc<B>,
    ids: Rc<Cell<u64>>,
}

impl<B: Backend> Clone for Device<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Rc::clone(&self.backend),
            ids: Rc::clone(&self.ids),
        }
    }
}

impl<B: Backend> Device<B> {
    /// 包装一个已初始化的后端
    pub fn new(backend: B) -> Self {
        info!(backend = backend.name(), "RHI device created");
        Self {
            backend: Rc::new(backend),
            ids: Rc::new(Cell::new(0)),
        }
    }

    /// 底层后端
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn shared_backend(&self) -> Rc<B> {
        Rc::clone(&self.backend)
    }

    /// 分配新的资源 id
    pub(crate) fn next_id(&self) -> ResourceId {
        let id = self.ids.get() + 1;
        self.ids.set(id);
        ResourceId(id)
    }

    // ---- 缓冲区 ----

    pub fn create_vertex_buffer<V: bytemuck::Pod>(
        &self,
        label: &str,
        vertices: &[V],
        usage: ResourceUsage,
    ) -> Result<VertexBuffer<B>> {
        VertexBuffer::create(self, label, vertices, usage)
    }

    pub fn create_index_buffer<I: IndexType>(
        &self,
        label: &str,
        indices: &[I],
        usage: ResourceUsage,
    ) -> Result<IndexBuffer<B>> {
        IndexBuffer::create(self, label, indices, usage)
    }

    pub fn create_constant_buffer<T: bytemuck::Pod>(&self, label: &str, initial: &T) -> Result<ConstantBuffer<B, T>> {
        ConstantBuffer::create(self, label, initial)
    }

    // ---- 纹理 ----

    pub fn create_texture_2d(&self, label: &str, desc: TextureDesc, data: Option<&[u8]>) -> Result<Texture2D<B>> {
        Texture2D::create(self, label, desc, data)
    }

    /// 从图片文件加载 RGBA8 纹理
    pub fn load_texture<P: AsRef<Path>>(&self, path: P, srgb: bool) -> Result<Texture2D<B>> {
        Texture2D::load(self, path, srgb)
    }

    pub fn create_render_target(
        &self,
        label: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
        shader_readable: bool,
    ) -> Result<RenderTarget<B>> {
        RenderTarget::create(self, label, width, height, format, shader_readable)
    }

    pub fn create_depth_stencil(
        &self,
        label: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<DepthStencil<B>> {
        DepthStencil::create(self, label, width, height, format)
    }

    pub fn create_sampler(&self, label: &str, desc: SamplerDesc) -> Result<Sampler<B>> {
        Sampler::create(self, label, desc)
    }

    // ---- 着色器与管线 ----

    pub fn create_vertex_shader(&self, label: &str, source: &ShaderSource) -> Result<VertexShader<B>> {
        VertexShader::create(self, label, source)
    }

    pub fn create_pixel_shader(&self, label: &str, source: &ShaderSource) -> Result<PixelShader<B>> {
        PixelShader::create(self, label, source)
    }

    pub fn create_input_layout(
        &self,
        label: &str,
        layout: &VertexLayout,
        vertex_shader: &VertexShader<B>,
    ) -> Result<InputLayout<B>> {
        InputLayout::create(self, label, layout, vertex_shader)
    }

    /// 创建管线；状态对象在第一次绑定时才构建
    pub fn create_pipeline(&self, desc: PipelineDesc<B>) -> Pipeline<B> {
        Pipeline::new(self, desc)
    }

    pub fn create_command_queue(&self) -> CommandQueue<B> {
        CommandQueue::new(self)
    }

    pub fn create_swapchain(&self) -> Result<Swapchain<B>> {
        Swapchain::new(self)
    }
}

/// 记录原生调用失败并原样返回结果
pub(crate) fn logged<T>(what: &str, label: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        crate::native_error!(error = %e, label, "Failed to {}", what);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::HeadlessBackend;

    #[test]
    fn test_ids_are_unique_across_clones() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let other = device.clone();
        let a = device.next_id();
        let b = other.next_id();
        let c = device.next_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_backend_is_shared() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let other = device.clone();
        assert!(std::ptr::eq(device.backend(), other.backend()));
    }
}
