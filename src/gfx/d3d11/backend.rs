//! `Backend` 的 Direct3D 11 实现
//!
//! 每个方法对应一到两个原生调用。原生句柄直接使用 `windows` 的 COM 接口类型，
//! 克隆即 `AddRef`，释放即 `Release`。

use std::ffi::CString;

use raw_window_handle::HasWindowHandle;
use windows::core::{Interface, PCSTR};
use windows::Win32::Foundation::RECT;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::{DXGI_PRESENT, DXGI_SWAP_CHAIN_FLAG};

use crate::core::config::GraphicsConfig;
use crate::core::error::{GraphicsError, Result, RhiError};
use crate::gfx::d3d11::compile;
use crate::gfx::d3d11::context::D3D11Context;
use crate::gfx::d3d11::format;
use crate::native_trace;
use crate::rhi::backend::Backend;
use crate::rhi::shader::HlslSource;
use crate::rhi::state::{BlendDesc, DepthStencilDesc, RasterizerDesc, SamplerDesc};
use crate::rhi::types::{
    BindFlags, BufferDesc, BufferKind, IndexFormat, PrimitiveTopology, ResourceUsage, ScissorRect,
    ShaderStage, TextureDesc, VertexLayout, Viewport,
};

fn creation(what: &str, e: windows::core::Error) -> RhiError {
    GraphicsError::ResourceCreation(format!("{}: {}", what, e)).into()
}

fn missing(what: &str) -> RhiError {
    GraphicsError::ResourceCreation(format!("{} returned no object", what)).into()
}

/// 调用带输出参数的创建函数并取出对象
macro_rules! create_object {
    ($what:literal, |$out:ident| $call:expr) => {{
        let mut $out = None;
        unsafe { $call }.map_err(|e| creation($what, e))?;
        native_trace!(what = $what, "Native object created");
        $out.ok_or_else(|| missing($what))
    }};
}

/// Direct3D 11 后端
#[derive(Debug)]
pub struct D3D11Backend {
    ctx: D3D11Context,
}

impl D3D11Backend {
    pub fn new(window: &impl HasWindowHandle, width: u32, height: u32, config: &GraphicsConfig) -> Result<Self> {
        Ok(Self::from_context(D3D11Context::new(window, width, height, config)?))
    }

    pub fn from_context(ctx: D3D11Context) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &D3D11Context {
        &self.ctx
    }

    fn device(&self) -> &ID3D11Device {
        &self.ctx.device
    }

    fn immediate(&self) -> &ID3D11DeviceContext {
        &self.ctx.context
    }

    /// `WRITE_DISCARD` 映射后交给 `write` 填充
    fn map_discard(
        &self,
        resource: &ID3D11Resource,
        write: impl FnOnce(&D3D11_MAPPED_SUBRESOURCE),
    ) -> Result<()> {
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.immediate()
                .Map(resource, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped as *mut _))
                .map_err(|e| GraphicsError::CommandExecution(format!("Map: {}", e)))?;
            write(&mapped);
            self.immediate().Unmap(resource, 0);
        }
        Ok(())
    }
}

impl Backend for D3D11Backend {
    type Buffer = ID3D11Buffer;
    type Texture = ID3D11Texture2D;
    type ShaderResourceView = ID3D11ShaderResourceView;
    type RenderTargetView = ID3D11RenderTargetView;
    type DepthStencilView = ID3D11DepthStencilView;
    type VertexShader = ID3D11VertexShader;
    type PixelShader = ID3D11PixelShader;
    type InputLayout = ID3D11InputLayout;
    type SamplerState = ID3D11SamplerState;
    type DepthStencilState = ID3D11DepthStencilState;
    type RasterizerState = ID3D11RasterizerState;
    type BlendState = ID3D11BlendState;

    fn name(&self) -> &'static str {
        "Direct3D 11"
    }

    fn create_buffer(&self, desc: &BufferDesc, initial_data: Option<&[u8]>) -> Result<ID3D11Buffer> {
        let native_desc = D3D11_BUFFER_DESC {
            ByteWidth: desc.size,
            Usage: format::usage(desc.usage),
            BindFlags: format::buffer_bind(desc.kind),
            CPUAccessFlags: format::cpu_access(desc.usage),
            MiscFlags: 0,
            StructureByteStride: 0,
        };
        // D3D11 从初始数据读取 ByteWidth 个字节
        let padded = initial_data.map(|data| {
            let mut bytes = vec![0u8; desc.size as usize];
            let len = data.len().min(bytes.len());
            bytes[..len].copy_from_slice(&data[..len]);
            bytes
        });
        let init = padded.as_ref().map(|bytes| D3D11_SUBRESOURCE_DATA {
            pSysMem: bytes.as_ptr() as *const _,
            SysMemPitch: 0,
            SysMemSlicePitch: 0,
        });
        create_object!("CreateBuffer", |buffer| self.device().CreateBuffer(
            &native_desc,
            init.as_ref().map(|i| i as *const _),
            Some(&mut buffer as *mut _),
        ))
    }

    fn create_texture_2d(&self, desc: &TextureDesc, initial_data: Option<&[u8]>) -> Result<ID3D11Texture2D> {
        let native_desc = D3D11_TEXTURE2D_DESC {
            Width: desc.width,
            Height: desc.height,
            MipLevels: desc.mip_levels,
            ArraySize: 1,
            Format: format::pixel_format(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage: format::usage(desc.usage),
            BindFlags: format::texture_bind(desc.bind),
            CPUAccessFlags: format::cpu_access(desc.usage),
            MiscFlags: 0,
        };
        let row_pitch = desc.row_pitch()?;
        let init = initial_data.map(|data| D3D11_SUBRESOURCE_DATA {
            pSysMem: data.as_ptr() as *const _,
            SysMemPitch: row_pitch,
            SysMemSlicePitch: 0,
        });
        create_object!("CreateTexture2D", |texture| self.device().CreateTexture2D(
            &native_desc,
            init.as_ref().map(|i| i as *const _),
            Some(&mut texture as *mut _),
        ))
    }

    fn create_shader_resource_view(&self, texture: &ID3D11Texture2D, _desc: &TextureDesc) -> Result<ID3D11ShaderResourceView> {
        create_object!("CreateShaderResourceView", |view| self
            .device()
            .CreateShaderResourceView(texture, None, Some(&mut view as *mut _)))
    }

    fn create_render_target_view(&self, texture: &ID3D11Texture2D, _desc: &TextureDesc) -> Result<ID3D11RenderTargetView> {
        create_object!("CreateRenderTargetView", |view| self
            .device()
            .CreateRenderTargetView(texture, None, Some(&mut view as *mut _)))
    }

    fn create_depth_stencil_view(&self, texture: &ID3D11Texture2D, _desc: &TextureDesc) -> Result<ID3D11DepthStencilView> {
        create_object!("CreateDepthStencilView", |view| self
            .device()
            .CreateDepthStencilView(texture, None, Some(&mut view as *mut _)))
    }

    fn create_sampler_state(&self, desc: &SamplerDesc) -> Result<ID3D11SamplerState> {
        let native_desc = D3D11_SAMPLER_DESC {
            Filter: format::filter(desc.filter),
            AddressU: format::address_mode(desc.address_u),
            AddressV: format::address_mode(desc.address_v),
            AddressW: format::address_mode(desc.address_w),
            MipLODBias: desc.mip_lod_bias,
            MaxAnisotropy: desc.max_anisotropy,
            ComparisonFunc: format::comparison(desc.comparison),
            BorderColor: desc.border_color,
            MinLOD: desc.min_lod,
            MaxLOD: desc.max_lod,
        };
        create_object!("CreateSamplerState", |sampler| self
            .device()
            .CreateSamplerState(&native_desc, Some(&mut sampler as *mut _)))
    }

    fn compile_shader(&self, source: &HlslSource, stage: ShaderStage) -> Result<Vec<u8>> {
        compile::compile(source, stage, self.ctx.debug_layer)
    }

    fn create_vertex_shader(&self, bytecode: &[u8]) -> Result<ID3D11VertexShader> {
        create_object!("CreateVertexShader", |shader| self
            .device()
            .CreateVertexShader(bytecode, None, Some(&mut shader as *mut _)))
    }

    fn create_pixel_shader(&self, bytecode: &[u8]) -> Result<ID3D11PixelShader> {
        create_object!("CreatePixelShader", |shader| self
            .device()
            .CreatePixelShader(bytecode, None, Some(&mut shader as *mut _)))
    }

    fn create_input_layout(&self, layout: &VertexLayout, vs_bytecode: &[u8]) -> Result<ID3D11InputLayout> {
        let semantics = layout
            .attributes()
            .iter()
            .map(|a| {
                CString::new(a.semantic.as_str()).map_err(|_| {
                    RhiError::from(GraphicsError::InvalidDescriptor(format!(
                        "semantic '{}' contains a NUL byte",
                        a.semantic
                    )))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let elements: Vec<D3D11_INPUT_ELEMENT_DESC> = layout
            .attributes()
            .iter()
            .zip(&semantics)
            .map(|(a, name)| D3D11_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(name.as_ptr() as *const u8),
                SemanticIndex: a.semantic_index,
                Format: format::vertex_format(a.format),
                InputSlot: a.slot,
                AlignedByteOffset: a.offset,
                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            })
            .collect();
        create_object!("CreateInputLayout", |input_layout| self.device().CreateInputLayout(
            &elements,
            vs_bytecode,
            Some(&mut input_layout as *mut _),
        ))
    }

    fn create_depth_stencil_state(&self, desc: &DepthStencilDesc) -> Result<ID3D11DepthStencilState> {
        let native_desc = D3D11_DEPTH_STENCIL_DESC {
            DepthEnable: desc.depth_enable.into(),
            DepthWriteMask: if desc.depth_write {
                D3D11_DEPTH_WRITE_MASK_ALL
            } else {
                D3D11_DEPTH_WRITE_MASK_ZERO
            },
            DepthFunc: format::comparison(desc.depth_func),
            StencilEnable: desc.stencil_enable.into(),
            StencilReadMask: desc.stencil_read_mask,
            StencilWriteMask: desc.stencil_write_mask,
            FrontFace: format::stencil_face(&desc.front_face),
            BackFace: format::stencil_face(&desc.back_face),
        };
        create_object!("CreateDepthStencilState", |state| self
            .device()
            .CreateDepthStencilState(&native_desc, Some(&mut state as *mut _)))
    }

    fn create_rasterizer_state(&self, desc: &RasterizerDesc) -> Result<ID3D11RasterizerState> {
        let native_desc = D3D11_RASTERIZER_DESC {
            FillMode: format::fill_mode(desc.fill_mode),
            CullMode: format::cull_mode(desc.cull_mode),
            FrontCounterClockwise: desc.front_counter_clockwise.into(),
            DepthBias: desc.depth_bias,
            DepthBiasClamp: desc.depth_bias_clamp,
            SlopeScaledDepthBias: desc.slope_scaled_depth_bias,
            DepthClipEnable: desc.depth_clip_enable.into(),
            ScissorEnable: desc.scissor_enable.into(),
            MultisampleEnable: desc.multisample_enable.into(),
            AntialiasedLineEnable: desc.antialiased_line_enable.into(),
        };
        create_object!("CreateRasterizerState", |state| self
            .device()
            .CreateRasterizerState(&native_desc, Some(&mut state as *mut _)))
    }

    fn create_blend_state(&self, desc: &BlendDesc) -> Result<ID3D11BlendState> {
        let mut native_desc = D3D11_BLEND_DESC {
            AlphaToCoverageEnable: desc.alpha_to_coverage.into(),
            IndependentBlendEnable: desc.independent_blend.into(),
            ..Default::default()
        };
        for (native, target) in native_desc.RenderTarget.iter_mut().zip(desc.render_targets.iter()) {
            *native = D3D11_RENDER_TARGET_BLEND_DESC {
                BlendEnable: target.blend_enable.into(),
                SrcBlend: format::blend_factor(target.src_blend),
                DestBlend: format::blend_factor(target.dest_blend),
                BlendOp: format::blend_op(target.blend_op),
                SrcBlendAlpha: format::blend_factor(target.src_blend_alpha),
                DestBlendAlpha: format::blend_factor(target.dest_blend_alpha),
                BlendOpAlpha: format::blend_op(target.blend_op_alpha),
                RenderTargetWriteMask: target.write_mask.bits(),
            };
        }
        create_object!("CreateBlendState", |state| self
            .device()
            .CreateBlendState(&native_desc, Some(&mut state as *mut _)))
    }

    fn write_buffer(&self, buffer: &ID3D11Buffer, desc: &BufferDesc, data: &[u8]) -> Result<()> {
        let resource: ID3D11Resource = buffer.cast()
            .map_err(|e| GraphicsError::CommandExecution(format!("ID3D11Resource: {}", e)))?;
        match desc.usage {
            ResourceUsage::Dynamic => self.map_discard(&resource, |mapped| unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.pData as *mut u8, data.len());
            }),
            ResourceUsage::Default => {
                // 常量缓冲区只能整体更新
                let region = D3D11_BOX {
                    left: 0,
                    top: 0,
                    front: 0,
                    right: data.len() as u32,
                    bottom: 1,
                    back: 1,
                };
                let region = (desc.kind != BufferKind::Constant).then_some(region);
                unsafe {
                    self.immediate().UpdateSubresource(
                        &resource,
                        0,
                        region.as_ref().map(|r| r as *const _),
                        data.as_ptr() as *const _,
                        0,
                        0,
                    );
                }
                Ok(())
            }
            ResourceUsage::Immutable => {
                Err(GraphicsError::InvalidDescriptor("cannot write an immutable buffer".to_string()).into())
            }
        }
    }

    fn write_texture_2d(&self, texture: &ID3D11Texture2D, desc: &TextureDesc, data: &[u8]) -> Result<()> {
        let resource: ID3D11Resource = texture.cast()
            .map_err(|e| GraphicsError::CommandExecution(format!("ID3D11Resource: {}", e)))?;
        let row_pitch = desc.row_pitch()? as usize;
        match desc.usage {
            ResourceUsage::Dynamic => self.map_discard(&resource, |mapped| {
                let dst_pitch = mapped.RowPitch as usize;
                for (row, src) in data.chunks_exact(row_pitch).enumerate() {
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            src.as_ptr(),
                            (mapped.pData as *mut u8).add(row * dst_pitch),
                            row_pitch,
                        );
                    }
                }
            }),
            ResourceUsage::Default => {
                unsafe {
                    self.immediate().UpdateSubresource(
                        &resource,
                        0,
                        None,
                        data.as_ptr() as *const _,
                        row_pitch as u32,
                        0,
                    );
                }
                Ok(())
            }
            ResourceUsage::Immutable => {
                Err(GraphicsError::InvalidDescriptor("cannot write an immutable texture".to_string()).into())
            }
        }
    }

    fn set_render_targets(&self, colors: &[&ID3D11RenderTargetView], depth: Option<&ID3D11DepthStencilView>) {
        let views: Vec<Option<ID3D11RenderTargetView>> = colors.iter().map(|v| Some((*v).clone())).collect();
        let views = if views.is_empty() { None } else { Some(views.as_slice()) };
        unsafe { self.immediate().OMSetRenderTargets(views, depth) };
    }

    fn clear_render_target(&self, view: &ID3D11RenderTargetView, color: [f32; 4]) {
        unsafe { self.immediate().ClearRenderTargetView(view, &color) };
    }

    fn clear_depth_stencil(&self, view: &ID3D11DepthStencilView, depth: Option<f32>, stencil: Option<u8>) {
        let mut flags = 0u32;
        if depth.is_some() {
            flags |= D3D11_CLEAR_DEPTH.0 as u32;
        }
        if stencil.is_some() {
            flags |= D3D11_CLEAR_STENCIL.0 as u32;
        }
        unsafe {
            self.immediate()
                .ClearDepthStencilView(view, flags, depth.unwrap_or(1.0), stencil.unwrap_or(0))
        };
    }

    fn set_viewport(&self, viewport: &Viewport) {
        let native = D3D11_VIEWPORT {
            TopLeftX: viewport.x,
            TopLeftY: viewport.y,
            Width: viewport.width,
            Height: viewport.height,
            MinDepth: viewport.min_depth,
            MaxDepth: viewport.max_depth,
        };
        unsafe { self.immediate().RSSetViewports(Some(&[native])) };
    }

    fn set_scissor_rect(&self, rect: &ScissorRect) {
        let native = RECT {
            left: rect.left,
            top: rect.top,
            right: rect.right,
            bottom: rect.bottom,
        };
        unsafe { self.immediate().RSSetScissorRects(Some(&[native])) };
    }

    fn set_input_layout(&self, layout: Option<&ID3D11InputLayout>) {
        unsafe { self.immediate().IASetInputLayout(layout) };
    }

    fn set_primitive_topology(&self, topology: PrimitiveTopology) {
        unsafe { self.immediate().IASetPrimitiveTopology(format::topology(topology)) };
    }

    fn set_vertex_shader(&self, shader: &ID3D11VertexShader) {
        unsafe { self.immediate().VSSetShader(shader, None) };
    }

    fn set_pixel_shader(&self, shader: &ID3D11PixelShader) {
        unsafe { self.immediate().PSSetShader(shader, None) };
    }

    fn set_depth_stencil_state(&self, state: &ID3D11DepthStencilState, stencil_ref: u32) {
        unsafe { self.immediate().OMSetDepthStencilState(state, stencil_ref) };
    }

    fn set_rasterizer_state(&self, state: &ID3D11RasterizerState) {
        unsafe { self.immediate().RSSetState(state) };
    }

    fn set_blend_state(&self, state: &ID3D11BlendState, blend_factor: [f32; 4], sample_mask: u32) {
        unsafe { self.immediate().OMSetBlendState(state, Some(&blend_factor), sample_mask) };
    }

    fn set_vertex_buffer(&self, slot: u32, buffer: &ID3D11Buffer, stride: u32, offset: u32) {
        let buffers = [Some(buffer.clone())];
        unsafe {
            self.immediate().IASetVertexBuffers(
                slot,
                1,
                Some(buffers.as_ptr()),
                Some(&stride as *const u32),
                Some(&offset as *const u32),
            )
        };
    }

    fn set_index_buffer(&self, buffer: &ID3D11Buffer, format: IndexFormat, offset: u32) {
        unsafe {
            self.immediate()
                .IASetIndexBuffer(buffer, format::index_format(format), offset)
        };
    }

    fn set_constant_buffer(&self, stage: ShaderStage, slot: u32, buffer: Option<&ID3D11Buffer>) {
        let buffers = [buffer.cloned()];
        unsafe {
            match stage {
                ShaderStage::Vertex => self.immediate().VSSetConstantBuffers(slot, Some(&buffers)),
                ShaderStage::Pixel => self.immediate().PSSetConstantBuffers(slot, Some(&buffers)),
            }
        }
    }

    fn set_shader_resource(&self, stage: ShaderStage, slot: u32, view: Option<&ID3D11ShaderResourceView>) {
        let views = [view.cloned()];
        unsafe {
            match stage {
                ShaderStage::Vertex => self.immediate().VSSetShaderResources(slot, Some(&views)),
                ShaderStage::Pixel => self.immediate().PSSetShaderResources(slot, Some(&views)),
            }
        }
    }

    fn set_sampler(&self, stage: ShaderStage, slot: u32, sampler: Option<&ID3D11SamplerState>) {
        let samplers = [sampler.cloned()];
        unsafe {
            match stage {
                ShaderStage::Vertex => self.immediate().VSSetSamplers(slot, Some(&samplers)),
                ShaderStage::Pixel => self.immediate().PSSetSamplers(slot, Some(&samplers)),
            }
        }
    }

    fn clear_state(&self) {
        unsafe { self.immediate().ClearState() };
    }

    fn draw(&self, vertex_count: u32, start_vertex: u32) {
        unsafe { self.immediate().Draw(vertex_count, start_vertex) };
    }

    fn draw_indexed(&self, index_count: u32, start_index: u32, base_vertex: i32) {
        unsafe { self.immediate().DrawIndexed(index_count, start_index, base_vertex) };
    }

    fn draw_instanced(&self, vertex_count: u32, instance_count: u32, start_vertex: u32, start_instance: u32) {
        unsafe {
            self.immediate()
                .DrawInstanced(vertex_count, instance_count, start_vertex, start_instance)
        };
    }

    fn draw_indexed_instanced(
        &self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) {
        unsafe {
            self.immediate().DrawIndexedInstanced(
                index_count,
                instance_count,
                start_index,
                base_vertex,
                start_instance,
            )
        };
    }

    fn flush(&self) {
        unsafe { self.immediate().Flush() };
    }

    fn back_buffer(&self) -> Result<(ID3D11Texture2D, TextureDesc)> {
        let texture: ID3D11Texture2D = unsafe { self.ctx.swap_chain.GetBuffer(0) }
            .map_err(|e| GraphicsError::SwapchainError(format!("GetBuffer: {}", e)))?;
        let mut native = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut native) };
        let format = format::from_dxgi(native.Format).ok_or_else(|| {
            GraphicsError::SwapchainError(format!("unsupported back buffer format {:?}", native.Format))
        })?;
        let desc = TextureDesc {
            width: native.Width,
            height: native.Height,
            mip_levels: 1,
            format,
            bind: BindFlags::RENDER_TARGET,
            usage: ResourceUsage::Default,
        };
        Ok((texture, desc))
    }

    fn resize_surface(&self, width: u32, height: u32) -> Result<()> {
        unsafe {
            self.immediate().Flush();
            self.ctx
                .swap_chain
                .ResizeBuffers(0, width, height, DXGI_FORMAT_UNKNOWN, DXGI_SWAP_CHAIN_FLAG(0))
                .map_err(|e| GraphicsError::SwapchainError(format!("ResizeBuffers: {}", e)).into())
        }
    }

    fn present(&self, vsync: bool) -> Result<()> {
        let interval = if vsync { 1 } else { 0 };
        unsafe { self.ctx.swap_chain.Present(interval, DXGI_PRESENT(0)) }
            .ok()
            .map_err(|e| GraphicsError::SwapchainError(format!("Present: {}", e)).into())
    }
}
