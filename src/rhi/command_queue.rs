//! 命令队列
//!
//! 对立即上下文的薄封装，负责：
//!
//! - 通过 [`ResourceRegistry`] 跳过重复的 SRV、采样器和常量缓冲区绑定
//! - 只在管线切换或状态对象代数变化后重新绑定状态对象
//! - 开始渲染通道前解除目标纹理的 SRV 绑定（D3D11 不允许同一资源同时作为输入和输出）
//! - 统计每帧的绘制和绑定次数

use std::rc::Rc;

use crate::core::error::{Result, RhiError};
use crate::rhi::backend::Backend;
use crate::rhi::buffer::{ConstantBuffer, IndexBuffer, VertexBuffer};
use crate::rhi::device::Device;
use crate::rhi::pipeline::{BindParams, DirtyStates, Pipeline, StateGenerations};
use crate::rhi::registry::{BoundSlot, ResourceRegistry, SlotKind};
use crate::rhi::render_pass::{LoadOp, RenderPass};
use crate::rhi::texture::{RenderTarget, Sampler, Texture2D};
use crate::rhi::types::{IndexFormat, ResourceId, ScissorRect, ShaderStage, Viewport};
use crate::{rhi_debug, rhi_warn};

/// 每帧计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    /// 实际发出的 SRV 绑定
    pub srv_binds: u32,
    /// 因槽位未变化而跳过的 SRV 绑定
    pub srv_binds_skipped: u32,
    /// 状态对象（深度模板、光栅化、混合）绑定次数
    pub state_binds: u32,
    pub pipeline_switches: u32,
    pub render_passes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BoundPipeline {
    id: ResourceId,
    params: BindParams,
    /// 设备上当前状态对象的代数
    generations: StateGenerations,
}

#[derive(Debug)]
struct ActivePass<B: Backend> {
    label: String,
    targets: Vec<ResourceId>,
    /// 通道结束前颜色目标保持存活，交换链在此期间不能调整大小
    colors: Vec<RenderTarget<B>>,
}

#[derive(Debug, Clone, Copy)]
struct BoundIndexBuffer {
    format: IndexFormat,
    index_count: u32,
}

/// 命令队列
pub struct CommandQueue<B: Backend> {
    backend: Rc<B>,
    registry: ResourceRegistry,
    pipeline: Option<BoundPipeline>,
    pass: Option<ActivePass<B>>,
    index_buffer: Option<BoundIndexBuffer>,
    stats: FrameStats,
}

impl<B: Backend> std::fmt::Debug for CommandQueue<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("pipeline", &self.pipeline)
            .field("pass", &self.pass)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<B: Backend> CommandQueue<B> {
    pub(crate) fn new(device: &Device<B>) -> Self {
        Self {
            backend: device.shared_backend(),
            registry: ResourceRegistry::new(),
            pipeline: None,
            pass: None,
            index_buffer: None,
            stats: FrameStats::default(),
        }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// 返回本帧计数并清零
    pub fn take_stats(&mut self) -> FrameStats {
        std::mem::take(&mut self.stats)
    }

    pub fn in_render_pass(&self) -> bool {
        self.pass.is_some()
    }

    // ---- 渲染通道 ----

    pub fn begin_render_pass(&mut self, pass: &RenderPass<B>) -> Result<()> {
        if let Some(active) = &self.pass {
            return Err(RhiError::command(format!(
                "cannot begin render pass '{}' while '{}' is active",
                pass.label(),
                active.label
            )));
        }
        pass.validate()?;

        let targets = pass.target_ids();
        for id in &targets {
            let freed = self.registry.forget(*id);
            if !freed.is_empty() {
                rhi_debug!(resource = %id, slots = freed.len(), pass = pass.label(), "Unbinding render target from shader slots");
            }
            self.unbind_native(&freed);
        }

        let colors: Vec<&B::RenderTargetView> = pass
            .colors()
            .iter()
            .map(|c| c.target.render_target_view())
            .collect();
        let depth = pass.depth().map(|d| d.target.depth_stencil_view());
        self.backend.set_render_targets(&colors, depth);

        for color in pass.colors() {
            if let LoadOp::Clear(value) = color.load {
                self.backend.clear_render_target(color.target.render_target_view(), value);
            }
        }
        if let Some(attachment) = pass.depth() {
            let depth = match attachment.depth {
                LoadOp::Clear(value) => Some(value),
                LoadOp::Load => None,
            };
            let stencil = match attachment.stencil {
                LoadOp::Clear(value) if attachment.target.has_stencil() => Some(value),
                _ => None,
            };
            if depth.is_some() || stencil.is_some() {
                self.backend
                    .clear_depth_stencil(attachment.target.depth_stencil_view(), depth, stencil);
            }
        }

        if let Some(viewport) = pass.viewport() {
            self.backend.set_viewport(&viewport);
        }

        self.stats.render_passes += 1;
        self.pass = Some(ActivePass {
            label: pass.label().to_string(),
            targets,
            colors: pass.colors().iter().map(|c| c.target.clone()).collect(),
        });
        Ok(())
    }

    /// 结束通道并解除渲染目标绑定，之后这些目标可以作为纹理读取
    pub fn end_render_pass(&mut self) -> Result<()> {
        let Some(active) = self.pass.take() else {
            return Err(RhiError::command("end_render_pass without an active render pass"));
        };
        self.backend.set_render_targets(&[], None);
        rhi_debug!(pass = %active.label, colors = active.colors.len(), "Render pass ended");
        Ok(())
    }

    // ---- 管线 ----

    /// 绑定管线。同一管线重复绑定时只补绑代数变化的状态对象或变化的绑定参数
    pub fn set_pipeline(&mut self, pipeline: &mut Pipeline<B>) -> Result<()> {
        let backend = Rc::clone(&self.backend);
        let binding = pipeline.binding(&backend)?;
        let states = &binding.states;

        let rebind = match self.pipeline {
            Some(bound) if bound.id == binding.id => {
                let mut rebind = states.generations.changed_since(&bound.generations);
                if bound.params.stencil_ref != binding.params.stencil_ref {
                    rebind |= DirtyStates::DEPTH_STENCIL;
                }
                if bound.params.blend_factor != binding.params.blend_factor
                    || bound.params.sample_mask != binding.params.sample_mask
                {
                    rebind |= DirtyStates::BLEND;
                }
                rebind
            }
            _ => {
                backend.set_vertex_shader(binding.vertex_shader.native());
                backend.set_pixel_shader(binding.pixel_shader.native());
                backend.set_input_layout(binding.input_layout.map(|l| l.native()));
                backend.set_primitive_topology(binding.topology);
                self.stats.pipeline_switches += 1;
                DirtyStates::all()
            }
        };

        if rebind.contains(DirtyStates::DEPTH_STENCIL) {
            backend.set_depth_stencil_state(states.depth_stencil, binding.params.stencil_ref);
            self.stats.state_binds += 1;
        }
        if rebind.contains(DirtyStates::RASTERIZER) {
            backend.set_rasterizer_state(states.rasterizer);
            self.stats.state_binds += 1;
        }
        if rebind.contains(DirtyStates::BLEND) {
            backend.set_blend_state(states.blend, binding.params.blend_factor, binding.params.sample_mask);
            self.stats.state_binds += 1;
        }

        self.pipeline = Some(BoundPipeline {
            id: binding.id,
            params: binding.params,
            generations: states.generations,
        });
        Ok(())
    }

    // ---- 顶点与索引 ----

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &VertexBuffer<B>) {
        self.backend
            .set_vertex_buffer(slot, buffer.buffer().native(), buffer.stride(), 0);
    }

    pub fn set_index_buffer(&mut self, buffer: &IndexBuffer<B>) {
        self.backend.set_index_buffer(buffer.buffer().native(), buffer.format(), 0);
        self.index_buffer = Some(BoundIndexBuffer {
            format: buffer.format(),
            index_count: buffer.index_count(),
        });
    }

    // ---- 着色器资源 ----

    pub fn set_constant_buffer<T: bytemuck::Pod>(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        buffer: &ConstantBuffer<B, T>,
    ) -> Result<()> {
        if self.registry.bind_constant_buffer(stage, slot, Some(buffer.id()))? {
            self.backend
                .set_constant_buffer(stage, slot, Some(buffer.buffer().native()));
        }
        Ok(())
    }

    pub fn set_texture(&mut self, stage: ShaderStage, slot: u32, texture: &Texture2D<B>) -> Result<()> {
        self.bind_shader_resource(stage, slot, texture.id(), texture.shader_resource_view())
    }

    /// 把渲染目标作为纹理读取；目标必须以 `shader_readable` 创建且不在当前通道中
    pub fn set_render_target_texture(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        target: &RenderTarget<B>,
    ) -> Result<()> {
        if let Some(pass) = &self.pass {
            if pass.targets.contains(&target.id()) {
                return Err(RhiError::invalid(format!(
                    "render target '{}' is being written by pass '{}'",
                    target.label(),
                    pass.label
                )));
            }
        }
        let view = target.shader_resource_view().ok_or_else(|| {
            RhiError::invalid(format!("render target '{}' is not shader readable", target.label()))
        })?;
        self.bind_shader_resource(stage, slot, target.id(), view)
    }

    pub fn clear_texture(&mut self, stage: ShaderStage, slot: u32) -> Result<()> {
        if self.registry.bind_shader_resource(stage, slot, None)? {
            self.backend.set_shader_resource(stage, slot, None);
        }
        Ok(())
    }

    fn bind_shader_resource(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        id: ResourceId,
        view: &B::ShaderResourceView,
    ) -> Result<()> {
        if self.registry.bind_shader_resource(stage, slot, Some(id))? {
            self.backend.set_shader_resource(stage, slot, Some(view));
            self.stats.srv_binds += 1;
        } else {
            self.stats.srv_binds_skipped += 1;
        }
        Ok(())
    }

    pub fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: &Sampler<B>) -> Result<()> {
        if self.registry.bind_sampler(stage, slot, Some(sampler.id()))? {
            self.backend.set_sampler(stage, slot, Some(sampler.native()));
        }
        Ok(())
    }

    /// 从所有槽位解除某个资源
    pub fn unbind_resource(&mut self, id: ResourceId) {
        let freed = self.registry.forget(id);
        self.unbind_native(&freed);
    }

    fn unbind_native(&self, slots: &[BoundSlot]) {
        for bound in slots {
            match bound.kind {
                SlotKind::ShaderResource => self.backend.set_shader_resource(bound.stage, bound.slot, None),
                SlotKind::Sampler => self.backend.set_sampler(bound.stage, bound.slot, None),
                SlotKind::ConstantBuffer => self.backend.set_constant_buffer(bound.stage, bound.slot, None),
            }
        }
    }

    // ---- 光栅化参数 ----

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.backend.set_viewport(&viewport);
    }

    /// 需要管线打开 `scissor_enable` 才会生效
    pub fn set_scissor(&mut self, rect: ScissorRect) {
        self.backend.set_scissor_rect(&rect);
    }

    // ---- 绘制 ----

    fn check_pipeline(&self, what: &str) -> Result<()> {
        if self.pipeline.is_none() {
            return Err(RhiError::command(format!("{} without a bound pipeline", what)));
        }
        if self.pass.is_none() {
            rhi_warn!("{} outside of a render pass", what);
        }
        Ok(())
    }

    fn check_indices(&self, what: &str, start_index: u32, index_count: u32) -> Result<()> {
        let bound = self
            .index_buffer
            .ok_or_else(|| RhiError::command(format!("{} without an index buffer", what)))?;
        if start_index.saturating_add(index_count) > bound.index_count {
            return Err(RhiError::command(format!(
                "{} reads indices {}..{} but the {:?} index buffer holds {}",
                what,
                start_index,
                start_index.saturating_add(index_count),
                bound.format,
                bound.index_count
            )));
        }
        Ok(())
    }

    pub fn draw(&mut self, vertex_count: u32, start_vertex: u32) -> Result<()> {
        self.check_pipeline("draw")?;
        self.backend.draw(vertex_count, start_vertex);
        self.stats.draw_calls += 1;
        Ok(())
    }

    pub fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) -> Result<()> {
        self.check_pipeline("draw_indexed")?;
        self.check_indices("draw_indexed", start_index, index_count)?;
        self.backend.draw_indexed(index_count, start_index, base_vertex);
        self.stats.draw_calls += 1;
        Ok(())
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) -> Result<()> {
        self.check_pipeline("draw_instanced")?;
        self.backend
            .draw_instanced(vertex_count, instance_count, start_vertex, start_instance);
        self.stats.draw_calls += 1;
        Ok(())
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) -> Result<()> {
        self.check_pipeline("draw_indexed_instanced")?;
        self.check_indices("draw_indexed_instanced", start_index, index_count)?;
        self.backend
            .draw_indexed_instanced(index_count, instance_count, start_index, base_vertex, start_instance);
        self.stats.draw_calls += 1;
        Ok(())
    }

    pub fn flush(&mut self) {
        self.backend.flush();
    }

    /// 清除设备上下文的全部状态，并忘记所有已登记的绑定
    pub fn reset_state(&mut self) {
        if let Some(pass) = self.pass.take() {
            rhi_warn!(pass = %pass.label, "Render pass discarded by reset_state");
        }
        self.backend.clear_state();
        self.registry.invalidate();
        self.pipeline = None;
        self.index_buffer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GraphicsError;
    use crate::gfx::headless::{Call, HeadlessBackend, ObjectKind};
    use crate::rhi::pipeline::PipelineDesc;
    use crate::rhi::shader::ShaderSource;
    use crate::rhi::state::{CullMode, SamplerDesc};
    use crate::rhi::types::{PixelFormat, ResourceUsage};

    const SOURCE: &str = "VSMain PSMain";

    struct Fixture {
        device: Device<HeadlessBackend>,
        queue: CommandQueue<HeadlessBackend>,
        pipeline: Pipeline<HeadlessBackend>,
    }

    fn fixture() -> Fixture {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let vs = device
            .create_vertex_shader("vs", &ShaderSource::hlsl(SOURCE, "VSMain"))
            .unwrap();
        let ps = device
            .create_pixel_shader("ps", &ShaderSource::hlsl(SOURCE, "PSMain"))
            .unwrap();
        let pipeline = device.create_pipeline(PipelineDesc::new("p", vs, ps));
        let queue = device.create_command_queue();
        Fixture { device, queue, pipeline }
    }

    fn texture(device: &Device<HeadlessBackend>) -> Texture2D<HeadlessBackend> {
        Texture2D::from_rgba8(device, "tex", 2, 2, &[255u8; 16], false).unwrap()
    }

    fn count(backend: &HeadlessBackend, pred: impl Fn(&Call) -> bool) -> usize {
        backend.calls().iter().filter(|c| pred(c)).count()
    }

    #[test]
    fn test_duplicate_texture_bind_is_skipped() {
        let mut f = fixture();
        let tex = texture(&f.device);
        f.queue.set_texture(ShaderStage::Pixel, 0, &tex).unwrap();
        f.queue.set_texture(ShaderStage::Pixel, 0, &tex).unwrap();

        let binds = count(f.device.backend(), |c| matches!(c, Call::SetShaderResource { .. }));
        assert_eq!(binds, 1);
        let stats = f.queue.stats();
        assert_eq!(stats.srv_binds, 1);
        assert_eq!(stats.srv_binds_skipped, 1);

        // 不同槽位要重新绑定
        f.queue.set_texture(ShaderStage::Pixel, 1, &tex).unwrap();
        assert_eq!(f.queue.stats().srv_binds, 2);
    }

    #[test]
    fn test_draw_without_pipeline_fails() {
        let mut f = fixture();
        let err = f.queue.draw(3, 0).unwrap_err();
        assert!(matches!(err.graphics(), Some(GraphicsError::CommandExecution(_))));
        assert_eq!(f.queue.stats().draw_calls, 0);

        f.queue.set_pipeline(&mut f.pipeline).unwrap();
        f.queue.draw(3, 0).unwrap();
        f.queue.draw_instanced(3, 4, 0, 0).unwrap();
        assert_eq!(f.queue.stats().draw_calls, 2);
    }

    #[test]
    fn test_draw_indexed_checks_index_buffer() {
        let mut f = fixture();
        f.queue.set_pipeline(&mut f.pipeline).unwrap();
        assert!(f.queue.draw_indexed(6, 0, 0).is_err());

        let indices = f
            .device
            .create_index_buffer("ib", &[0u16, 1, 2, 2, 1, 3], ResourceUsage::Immutable)
            .unwrap();
        f.queue.set_index_buffer(&indices);
        f.queue.draw_indexed(6, 0, 0).unwrap();
        assert!(f.queue.draw_indexed(6, 1, 0).is_err());
        f.queue.draw_indexed_instanced(3, 2, 3, 0, 0).unwrap();
    }

    #[test]
    fn test_rebinding_pipeline_skips_state_objects() {
        let mut f = fixture();
        f.queue.set_pipeline(&mut f.pipeline).unwrap();
        assert_eq!(f.queue.stats().state_binds, 3);
        assert_eq!(f.queue.stats().pipeline_switches, 1);

        f.queue.set_pipeline(&mut f.pipeline).unwrap();
        assert_eq!(f.queue.stats().state_binds, 3);
        assert_eq!(f.queue.stats().pipeline_switches, 1);

        // 只有重建过的状态对象被重新绑定
        f.pipeline.set_cull_mode(CullMode::Front);
        f.queue.set_pipeline(&mut f.pipeline).unwrap();
        assert_eq!(f.queue.stats().state_binds, 4);
        let raster_binds = count(f.device.backend(), |c| matches!(c, Call::SetRasterizerState(_)));
        assert_eq!(raster_binds, 2);
    }

    fn last_rasterizer(backend: &HeadlessBackend) -> Option<u64> {
        backend.calls().iter().rev().find_map(|c| match c {
            Call::SetRasterizerState(state) => Some(*state),
            _ => None,
        })
    }

    fn last_depth_stencil(backend: &HeadlessBackend) -> Option<u64> {
        backend.calls().iter().rev().find_map(|c| match c {
            Call::SetDepthStencilState { state, .. } => Some(*state),
            _ => None,
        })
    }

    #[test]
    fn test_explicit_prepare_does_not_hide_rebuilt_state() {
        let mut f = fixture();
        f.queue.set_pipeline(&mut f.pipeline).unwrap();

        f.pipeline.set_cull_mode(CullMode::None);
        let backend = f.device.shared_backend();
        assert_eq!(f.pipeline.prepare(&backend).unwrap(), DirtyStates::RASTERIZER);
        f.queue.set_pipeline(&mut f.pipeline).unwrap();

        let newest = backend.newest_object(ObjectKind::RasterizerState);
        assert!(newest.is_some());
        assert_eq!(last_rasterizer(&backend), newest);
        assert_eq!(f.queue.stats().state_binds, 4);
    }

    #[test]
    fn test_state_rebuilt_before_failed_bind_is_bound_on_retry() {
        let mut f = fixture();
        f.queue.set_pipeline(&mut f.pipeline).unwrap();
        let backend = f.device.shared_backend();

        f.pipeline.set_depth_test(false);
        f.pipeline.set_blend_enabled(true);
        backend.fail_creation(ObjectKind::BlendState);
        assert!(f.queue.set_pipeline(&mut f.pipeline).is_err());
        // 深度模板对象已经重建，但还没有绑定
        assert_ne!(last_depth_stencil(&backend), backend.newest_object(ObjectKind::DepthStencilState));

        backend.clear_failures();
        f.queue.set_pipeline(&mut f.pipeline).unwrap();
        assert_eq!(last_depth_stencil(&backend), backend.newest_object(ObjectKind::DepthStencilState));
        let blend_binds = count(&backend, |c| matches!(c, Call::SetBlendState { .. }));
        assert_eq!(blend_binds, 2);
        assert!(f.pipeline.states().dirty().is_empty());
    }

    #[test]
    fn test_bind_param_change_rebinds_without_rebuild() {
        let mut f = fixture();
        f.queue.set_pipeline(&mut f.pipeline).unwrap();
        f.pipeline.set_stencil_ref(7);
        f.queue.set_pipeline(&mut f.pipeline).unwrap();

        assert!(f.device.backend().calls().contains(&Call::SetDepthStencilState {
            state: f.device.backend().newest_object(ObjectKind::DepthStencilState).unwrap(),
            stencil_ref: 7,
        }));
        assert_eq!(f.pipeline.states().rebuild_count(), 3);
    }

    #[test]
    fn test_switching_pipelines_binds_everything() {
        let mut f = fixture();
        let vs = f
            .device
            .create_vertex_shader("vs2", &ShaderSource::hlsl(SOURCE, "VSMain"))
            .unwrap();
        let ps = f
            .device
            .create_pixel_shader("ps2", &ShaderSource::hlsl(SOURCE, "PSMain"))
            .unwrap();
        let mut other = f.device.create_pipeline(PipelineDesc::new("other", vs, ps));

        f.queue.set_pipeline(&mut f.pipeline).unwrap();
        f.queue.set_pipeline(&mut other).unwrap();
        f.queue.set_pipeline(&mut f.pipeline).unwrap();
        assert_eq!(f.queue.stats().pipeline_switches, 3);
        assert_eq!(f.queue.stats().state_binds, 9);
    }

    #[test]
    fn test_begin_pass_unbinds_target_srv() {
        let mut f = fixture();
        let rt = f
            .device
            .create_render_target("offscreen", 32, 32, PixelFormat::Rgba8Unorm, true)
            .unwrap();
        f.queue.set_render_target_texture(ShaderStage::Pixel, 3, &rt).unwrap();
        assert_eq!(f.queue.registry().shader_resource(ShaderStage::Pixel, 3), Some(rt.id()));

        f.device.backend().take_calls();
        let pass = RenderPass::new("offscreen").with_color(&rt, LoadOp::Clear([0.0, 0.0, 0.0, 1.0]));
        f.queue.begin_render_pass(&pass).unwrap();

        let calls = f.device.backend().take_calls();
        let unbind = calls
            .iter()
            .position(|c| {
                *c == Call::SetShaderResource {
                    stage: ShaderStage::Pixel,
                    slot: 3,
                    view: None,
                }
            })
            .expect("srv unbound");
        let set_targets = calls
            .iter()
            .position(|c| matches!(c, Call::SetRenderTargets { .. }))
            .expect("targets bound");
        assert!(unbind < set_targets);
        assert_eq!(f.queue.registry().shader_resource(ShaderStage::Pixel, 3), None);
        assert!(calls.iter().any(|c| matches!(c, Call::ClearRenderTarget { .. })));
        assert!(calls.iter().any(|c| matches!(c, Call::SetViewport(v) if *v == Viewport::full(32, 32))));
    }

    #[test]
    fn test_reading_active_target_is_rejected() {
        let mut f = fixture();
        let rt = f
            .device
            .create_render_target("offscreen", 16, 16, PixelFormat::Rgba8Unorm, true)
            .unwrap();
        let pass = RenderPass::new("offscreen").with_color(&rt, LoadOp::Load);
        f.queue.begin_render_pass(&pass).unwrap();
        assert!(f.queue.set_render_target_texture(ShaderStage::Pixel, 0, &rt).is_err());

        f.queue.end_render_pass().unwrap();
        f.queue.set_render_target_texture(ShaderStage::Pixel, 0, &rt).unwrap();
    }

    #[test]
    fn test_unreadable_target_is_rejected() {
        let mut f = fixture();
        let rt = f
            .device
            .create_render_target("color", 16, 16, PixelFormat::Rgba8Unorm, false)
            .unwrap();
        assert!(f.queue.set_render_target_texture(ShaderStage::Pixel, 0, &rt).is_err());
    }

    #[test]
    fn test_pass_nesting_and_end() {
        let mut f = fixture();
        let rt = f
            .device
            .create_render_target("rt", 16, 16, PixelFormat::Rgba8Unorm, false)
            .unwrap();
        let pass = RenderPass::new("a").with_color(&rt, LoadOp::Load);
        assert!(f.queue.end_render_pass().is_err());
        f.queue.begin_render_pass(&pass).unwrap();
        assert!(f.queue.begin_render_pass(&pass).is_err());
        f.queue.end_render_pass().unwrap();
        assert!(f.device.backend().calls().contains(&Call::SetRenderTargets {
            colors: Vec::new(),
            depth: None,
        }));
    }

    #[test]
    fn test_stencil_clear_only_for_stencil_formats() {
        let mut f = fixture();
        let depth = f
            .device
            .create_depth_stencil("depth", 16, 16, PixelFormat::Depth32Float)
            .unwrap();
        let pass = RenderPass::new("depth").with_depth(&depth, LoadOp::Clear(1.0), LoadOp::Clear(0));
        f.queue.begin_render_pass(&pass).unwrap();
        assert!(f.device.backend().calls().iter().any(|c| matches!(
            c,
            Call::ClearDepthStencil {
                depth: Some(_),
                stencil: None,
                ..
            }
        )));
    }

    #[test]
    fn test_sampler_and_constant_buffer_dedupe() {
        let mut f = fixture();
        let sampler = f.device.create_sampler("linear", SamplerDesc::linear_wrap()).unwrap();
        let constants = f.device.create_constant_buffer("cb", &[0.0f32; 4]).unwrap();
        for _ in 0..3 {
            f.queue.set_sampler(ShaderStage::Pixel, 0, &sampler).unwrap();
            f.queue.set_constant_buffer(ShaderStage::Vertex, 0, &constants).unwrap();
        }
        let backend = f.device.backend();
        assert_eq!(count(backend, |c| matches!(c, Call::SetSampler { .. })), 1);
        assert_eq!(count(backend, |c| matches!(c, Call::SetConstantBuffer { .. })), 1);
        assert!(f.queue.set_sampler(ShaderStage::Pixel, 16, &sampler).is_err());
    }

    #[test]
    fn test_reset_state_forgets_bindings() {
        let mut f = fixture();
        let tex = texture(&f.device);
        f.queue.set_pipeline(&mut f.pipeline).unwrap();
        f.queue.set_texture(ShaderStage::Pixel, 0, &tex).unwrap();
        f.queue.reset_state();

        assert!(f.queue.registry().is_empty());
        assert!(f.queue.draw(3, 0).is_err());
        f.queue.set_texture(ShaderStage::Pixel, 0, &tex).unwrap();
        assert_eq!(f.queue.stats().srv_binds, 2);
        assert!(f.device.backend().calls().contains(&Call::ClearState));
    }

    #[test]
    fn test_take_stats_resets_counters() {
        let mut f = fixture();
        f.queue.set_pipeline(&mut f.pipeline).unwrap();
        f.queue.draw(3, 0).unwrap();
        let stats = f.queue.take_stats();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(f.queue.stats(), FrameStats::default());
    }

    #[test]
    fn test_unbind_resource_everywhere() {
        let mut f = fixture();
        let tex = texture(&f.device);
        f.queue.set_texture(ShaderStage::Pixel, 0, &tex).unwrap();
        f.queue.set_texture(ShaderStage::Vertex, 2, &tex).unwrap();
        f.queue.unbind_resource(tex.id());
        assert!(f.queue.registry().is_empty());
        assert!(f.device.backend().calls().contains(&Call::SetShaderResource {
            stage: ShaderStage::Vertex,
            slot: 2,
            view: None,
        }));
    }
}
