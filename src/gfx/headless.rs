//! 无 GPU 的记录后端
//!
//! `HeadlessBackend` 实现完整的 [`Backend`] 接口，但不做任何渲染：
//!
//! - 每个原生调用都追加到调用日志，测试可以检查调用顺序和次数
//! - 每个原生对象是一个引用计数的记录，最后一个句柄释放时存活计数减一
//! - 视图持有其父纹理，与 D3D11 视图持有资源引用的行为一致
//! - 可以让某类对象的创建失败，用于测试错误路径
//!
//! 非 Windows 平台上演示程序也使用它运行若干帧。

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::core::error::{GraphicsError, Result};
use crate::native_trace;
use crate::rhi::backend::Backend;
use crate::rhi::shader::HlslSource;
use crate::rhi::state::{BlendDesc, DepthStencilDesc, RasterizerDesc, SamplerDesc};
use crate::rhi::types::{
    BindFlags, BufferDesc, IndexFormat, PixelFormat, PrimitiveTopology, ResourceUsage, ScissorRect,
    ShaderStage, TextureDesc, VertexLayout, Viewport,
};

/// 原生对象类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    Texture,
    ShaderResourceView,
    RenderTargetView,
    DepthStencilView,
    VertexShader,
    PixelShader,
    InputLayout,
    Sampler,
    DepthStencilState,
    RasterizerState,
    BlendState,
}

#[derive(Debug, Default)]
struct Tracker {
    live: RefCell<HashMap<ObjectKind, usize>>,
    created: RefCell<HashMap<ObjectKind, usize>>,
    newest: RefCell<HashMap<ObjectKind, u64>>,
}

/// 一个原生对象
pub struct ObjectRecord {
    pub id: u64,
    pub kind: ObjectKind,
    parent: Option<HeadlessObject>,
    tracker: Rc<Tracker>,
}

impl ObjectRecord {
    /// 视图所属的纹理
    pub fn parent(&self) -> Option<&HeadlessObject> {
        self.parent.as_ref()
    }
}

impl fmt::Debug for ObjectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRecord")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .finish()
    }
}

impl Drop for ObjectRecord {
    fn drop(&mut self) {
        if let Some(count) = self.tracker.live.borrow_mut().get_mut(&self.kind) {
            *count = count.saturating_sub(1);
        }
    }
}

/// 无头后端的原生句柄
pub type HeadlessObject = Rc<ObjectRecord>;

/// 调用日志中的一条记录，对象以 id 表示
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateObject { kind: ObjectKind, object: u64 },
    WriteBuffer { buffer: u64, len: usize },
    WriteTexture { texture: u64, len: usize },
    CompileShader { stage: ShaderStage, entry_point: String },
    SetRenderTargets { colors: Vec<u64>, depth: Option<u64> },
    ClearRenderTarget { view: u64, color: [f32; 4] },
    ClearDepthStencil { view: u64, depth: Option<f32>, stencil: Option<u8> },
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),
    SetInputLayout(Option<u64>),
    SetPrimitiveTopology(PrimitiveTopology),
    SetVertexShader(u64),
    SetPixelShader(u64),
    SetDepthStencilState { state: u64, stencil_ref: u32 },
    SetRasterizerState(u64),
    SetBlendState { state: u64, blend_factor: [f32; 4], sample_mask: u32 },
    SetVertexBuffer { slot: u32, buffer: u64, stride: u32, offset: u32 },
    SetIndexBuffer { buffer: u64, format: IndexFormat, offset: u32 },
    SetConstantBuffer { stage: ShaderStage, slot: u32, buffer: Option<u64> },
    SetShaderResource { stage: ShaderStage, slot: u32, view: Option<u64> },
    SetSampler { stage: ShaderStage, slot: u32, sampler: Option<u64> },
    ClearState,
    Draw { vertex_count: u32, start_vertex: u32 },
    DrawIndexed { index_count: u32, start_index: u32, base_vertex: i32 },
    DrawInstanced { vertex_count: u32, instance_count: u32 },
    DrawIndexedInstanced { index_count: u32, instance_count: u32 },
    Flush,
    ResizeSurface { width: u32, height: u32 },
    Present { vsync: bool },
}

/// 记录调用的后端
#[derive(Debug)]
pub struct HeadlessBackend {
    tracker: Rc<Tracker>,
    next_id: Cell<u64>,
    calls: RefCell<Vec<Call>>,
    failures: RefCell<HashSet<ObjectKind>>,
    surface: Cell<(u32, u32)>,
    back_buffer: RefCell<Option<HeadlessObject>>,
}

impl HeadlessBackend {
    /// 以给定的表面尺寸创建
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            tracker: Rc::new(Tracker::default()),
            next_id: Cell::new(0),
            calls: RefCell::new(Vec::new()),
            failures: RefCell::new(HashSet::new()),
            surface: Cell::new((width, height)),
            back_buffer: RefCell::new(None),
        }
    }

    /// 调用日志的副本
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// 取出并清空调用日志
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    /// 某类对象当前存活的数量
    pub fn live_objects(&self, kind: ObjectKind) -> usize {
        self.tracker.live.borrow().get(&kind).copied().unwrap_or(0)
    }

    /// 某类对象累计创建的数量
    pub fn created_objects(&self, kind: ObjectKind) -> usize {
        self.tracker.created.borrow().get(&kind).copied().unwrap_or(0)
    }

    /// 最近创建的某类对象的 id
    pub fn newest_object(&self, kind: ObjectKind) -> Option<u64> {
        self.tracker.newest.borrow().get(&kind).copied()
    }

    /// 之后创建此类对象都会失败，直到 [`clear_failures`](Self::clear_failures)
    pub fn fail_creation(&self, kind: ObjectKind) {
        self.failures.borrow_mut().insert(kind);
    }

    pub fn clear_failures(&self) {
        self.failures.borrow_mut().clear();
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface.get()
    }

    fn record(&self, call: Call) {
        native_trace!(call = ?call, "headless");
        self.calls.borrow_mut().push(call);
    }

    fn create(&self, kind: ObjectKind, parent: Option<&HeadlessObject>) -> Result<HeadlessObject> {
        if self.failures.borrow().contains(&kind) {
            return Err(GraphicsError::ResourceCreation(format!("{:?} creation failed (injected)", kind)).into());
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);

        *self.tracker.live.borrow_mut().entry(kind).or_insert(0) += 1;
        *self.tracker.created.borrow_mut().entry(kind).or_insert(0) += 1;
        self.tracker.newest.borrow_mut().insert(kind, id);
        self.record(Call::CreateObject { kind, object: id });

        Ok(Rc::new(ObjectRecord {
            id,
            kind,
            parent: parent.cloned(),
            tracker: Rc::clone(&self.tracker),
        }))
    }

    fn back_buffer_desc(&self) -> TextureDesc {
        let (width, height) = self.surface.get();
        TextureDesc {
            width,
            height,
            mip_levels: 1,
            format: PixelFormat::Bgra8Unorm,
            bind: BindFlags::RENDER_TARGET,
            usage: ResourceUsage::Default,
        }
    }
}

fn expect_kind(object: &HeadlessObject, kind: ObjectKind) -> Result<()> {
    if object.kind != kind {
        return Err(GraphicsError::InvalidDescriptor(format!(
            "expected {:?}, got {:?} #{}",
            kind, object.kind, object.id
        ))
        .into());
    }
    Ok(())
}

impl Backend for HeadlessBackend {
    type Buffer = HeadlessObject;
    type Texture = HeadlessObject;
    type ShaderResourceView = HeadlessObject;
    type RenderTargetView = HeadlessObject;
    type DepthStencilView = HeadlessObject;
    type VertexShader = HeadlessObject;
    type PixelShader = HeadlessObject;
    type InputLayout = HeadlessObject;
    type SamplerState = HeadlessObject;
    type DepthStencilState = HeadlessObject;
    type RasterizerState = HeadlessObject;
    type BlendState = HeadlessObject;

    fn name(&self) -> &'static str {
        "Headless"
    }

    fn create_buffer(&self, desc: &BufferDesc, initial_data: Option<&[u8]>) -> Result<HeadlessObject> {
        if let Some(data) = initial_data {
            if data.len() > desc.size as usize {
                return Err(GraphicsError::ResourceCreation(format!(
                    "initial data ({} bytes) larger than buffer ({} bytes)",
                    data.len(),
                    desc.size
                ))
                .into());
            }
        }
        self.create(ObjectKind::Buffer, None)
    }

    fn create_texture_2d(&self, _desc: &TextureDesc, _initial_data: Option<&[u8]>) -> Result<HeadlessObject> {
        self.create(ObjectKind::Texture, None)
    }

    fn create_shader_resource_view(&self, texture: &HeadlessObject, _desc: &TextureDesc) -> Result<HeadlessObject> {
        expect_kind(texture, ObjectKind::Texture)?;
        self.create(ObjectKind::ShaderResourceView, Some(texture))
    }

    fn create_render_target_view(&self, texture: &HeadlessObject, _desc: &TextureDesc) -> Result<HeadlessObject> {
        expect_kind(texture, ObjectKind::Texture)?;
        self.create(ObjectKind::RenderTargetView, Some(texture))
    }

    fn create_depth_stencil_view(&self, texture: &HeadlessObject, _desc: &TextureDesc) -> Result<HeadlessObject> {
        expect_kind(texture, ObjectKind::Texture)?;
        self.create(ObjectKind::DepthStencilView, Some(texture))
    }

    fn create_sampler_state(&self, _desc: &SamplerDesc) -> Result<HeadlessObject> {
        self.create(ObjectKind::Sampler, None)
    }

    fn compile_shader(&self, source: &HlslSource, stage: ShaderStage) -> Result<Vec<u8>> {
        self.record(Call::CompileShader {
            stage,
            entry_point: source.entry_point.clone(),
        });
        if source.entry_point.is_empty() || !source.code.contains(&source.entry_point) {
            return Err(GraphicsError::ShaderCompilation(format!(
                "{}: error X3501: '{}': entrypoint not found",
                source.file_name, source.entry_point
            ))
            .into());
        }
        // 伪字节码：魔数 + profile + 入口点
        let mut bytecode = b"DXBC".to_vec();
        bytecode.extend_from_slice(stage.profile().as_bytes());
        bytecode.extend_from_slice(source.entry_point.as_bytes());
        Ok(bytecode)
    }

    fn create_vertex_shader(&self, _bytecode: &[u8]) -> Result<HeadlessObject> {
        self.create(ObjectKind::VertexShader, None)
    }

    fn create_pixel_shader(&self, _bytecode: &[u8]) -> Result<HeadlessObject> {
        self.create(ObjectKind::PixelShader, None)
    }

    fn create_input_layout(&self, _layout: &VertexLayout, vs_bytecode: &[u8]) -> Result<HeadlessObject> {
        if vs_bytecode.is_empty() {
            return Err(GraphicsError::ResourceCreation("input layout needs vertex shader bytecode".to_string()).into());
        }
        self.create(ObjectKind::InputLayout, None)
    }

    fn create_depth_stencil_state(&self, _desc: &DepthStencilDesc) -> Result<HeadlessObject> {
        self.create(ObjectKind::DepthStencilState, None)
    }

    fn create_rasterizer_state(&self, _desc: &RasterizerDesc) -> Result<HeadlessObject> {
        self.create(ObjectKind::RasterizerState, None)
    }

    fn create_blend_state(&self, _desc: &BlendDesc) -> Result<HeadlessObject> {
        self.create(ObjectKind::BlendState, None)
    }

    fn write_buffer(&self, buffer: &HeadlessObject, _desc: &BufferDesc, data: &[u8]) -> Result<()> {
        expect_kind(buffer, ObjectKind::Buffer)?;
        self.record(Call::WriteBuffer {
            buffer: buffer.id,
            len: data.len(),
        });
        Ok(())
    }

    fn write_texture_2d(&self, texture: &HeadlessObject, _desc: &TextureDesc, data: &[u8]) -> Result<()> {
        expect_kind(texture, ObjectKind::Texture)?;
        self.record(Call::WriteTexture {
            texture: texture.id,
            len: data.len(),
        });
        Ok(())
    }

    fn set_render_targets(&self, colors: &[&HeadlessObject], depth: Option<&HeadlessObject>) {
        self.record(Call::SetRenderTargets {
            colors: colors.iter().map(|v| v.id).collect(),
            depth: depth.map(|v| v.id),
        });
    }

    fn clear_render_target(&self, view: &HeadlessObject, color: [f32; 4]) {
        self.record(Call::ClearRenderTarget { view: view.id, color });
    }

    fn clear_depth_stencil(&self, view: &HeadlessObject, depth: Option<f32>, stencil: Option<u8>) {
        self.record(Call::ClearDepthStencil {
            view: view.id,
            depth,
            stencil,
        });
    }

    fn set_viewport(&self, viewport: &Viewport) {
        self.record(Call::SetViewport(*viewport));
    }

    fn set_scissor_rect(&self, rect: &ScissorRect) {
        self.record(Call::SetScissorRect(*rect));
    }

    fn set_input_layout(&self, layout: Option<&HeadlessObject>) {
        self.record(Call::SetInputLayout(layout.map(|l| l.id)));
    }

    fn set_primitive_topology(&self, topology: PrimitiveTopology) {
        self.record(Call::SetPrimitiveTopology(topology));
    }

    fn set_vertex_shader(&self, shader: &HeadlessObject) {
        self.record(Call::SetVertexShader(shader.id));
    }

    fn set_pixel_shader(&self, shader: &HeadlessObject) {
        self.record(Call::SetPixelShader(shader.id));
    }

    fn set_depth_stencil_state(&self, state: &HeadlessObject, stencil_ref: u32) {
        self.record(Call::SetDepthStencilState {
            state: state.id,
            stencil_ref,
        });
    }

    fn set_rasterizer_state(&self, state: &HeadlessObject) {
        self.record(Call::SetRasterizerState(state.id));
    }

    fn set_blend_state(&self, state: &HeadlessObject, blend_factor: [f32; 4], sample_mask: u32) {
        self.record(Call::SetBlendState {
            state: state.id,
            blend_factor,
            sample_mask,
        });
    }

    fn set_vertex_buffer(&self, slot: u32, buffer: &HeadlessObject, stride: u32, offset: u32) {
        self.record(Call::SetVertexBuffer {
            slot,
            buffer: buffer.id,
            stride,
            offset,
        });
    }

    fn set_index_buffer(&self, buffer: &HeadlessObject, format: IndexFormat, offset: u32) {
        self.record(Call::SetIndexBuffer {
            buffer: buffer.id,
            format,
            offset,
        });
    }

    fn set_constant_buffer(&self, stage: ShaderStage, slot: u32, buffer: Option<&HeadlessObject>) {
        self.record(Call::SetConstantBuffer {
            stage,
            slot,
            buffer: buffer.map(|b| b.id),
        });
    }

    fn set_shader_resource(&self, stage: ShaderStage, slot: u32, view: Option<&HeadlessObject>) {
        self.record(Call::SetShaderResource {
            stage,
            slot,
            view: view.map(|v| v.id),
        });
    }

    fn set_sampler(&self, stage: ShaderStage, slot: u32, sampler: Option<&HeadlessObject>) {
        self.record(Call::SetSampler {
            stage,
            slot,
            sampler: sampler.map(|s| s.id),
        });
    }

    fn clear_state(&self) {
        self.record(Call::ClearState);
    }

    fn draw(&self, vertex_count: u32, start_vertex: u32) {
        self.record(Call::Draw {
            vertex_count,
            start_vertex,
        });
    }

    fn draw_indexed(&self, index_count: u32, start_index: u32, base_vertex: i32) {
        self.record(Call::DrawIndexed {
            index_count,
            start_index,
            base_vertex,
        });
    }

    fn draw_instanced(&self, vertex_count: u32, instance_count: u32, _start_vertex: u32, _start_instance: u32) {
        self.record(Call::DrawInstanced {
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed_instanced(
        &self,
        index_count: u32,
        instance_count: u32,
        _start_index: u32,
        _base_vertex: i32,
        _start_instance: u32,
    ) {
        self.record(Call::DrawIndexedInstanced {
            index_count,
            instance_count,
        });
    }

    fn flush(&self) {
        self.record(Call::Flush);
    }

    fn back_buffer(&self) -> Result<(HeadlessObject, TextureDesc)> {
        let mut slot = self.back_buffer.borrow_mut();
        let texture = match slot.as_ref() {
            Some(texture) => Rc::clone(texture),
            None => {
                let texture = self.create(ObjectKind::Texture, None)?;
                *slot = Some(Rc::clone(&texture));
                texture
            }
        };
        Ok((texture, self.back_buffer_desc()))
    }

    fn resize_surface(&self, width: u32, height: u32) -> Result<()> {
        let mut slot = self.back_buffer.borrow_mut();
        if let Some(texture) = slot.as_ref() {
            let outstanding = Rc::strong_count(texture) - 1;
            if outstanding > 0 {
                return Err(GraphicsError::SwapchainError(format!(
                    "ResizeBuffers: {} references to the back buffer are still alive",
                    outstanding
                ))
                .into());
            }
        }
        *slot = None;
        self.surface.set((width, height));
        self.record(Call::ResizeSurface { width, height });
        Ok(())
    }

    fn present(&self, vsync: bool) -> Result<()> {
        self.record(Call::Present { vsync });
        Ok(())
    }
}
