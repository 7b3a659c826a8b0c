//! 管线与管线状态缓存
//!
//! D3D11 的深度模板、光栅化和混合状态都是不可变对象。`PipelineStateCache`
//! 为每个管线保存三份描述和对应的原生对象：
//!
//! - setter 只修改描述；值真正变化时才置上对应的脏标记
//! - `prepare` 只重建带脏标记的对象，干净的对象原样复用
//! - 重建失败时脏标记保留、旧对象保留，错误向上返回，下次 `prepare` 会重试
//!
//! 混合因子、采样掩码和模板参考值是绑定参数，不属于状态对象，修改它们不会触发重建。

use std::fmt;

use bitflags::bitflags;

use crate::core::error::{Result, RhiError};
use crate::rhi::backend::Backend;
use crate::rhi::device::{logged, Device};
use crate::rhi::shader::{InputLayout, PixelShader, VertexShader};
use crate::rhi::state::{
    BlendDesc, ColorWriteMask, ComparisonFunc, CullMode, DepthStencilDesc, FillMode,
    RasterizerDesc, RenderTargetBlendDesc, StencilFaceDesc, MAX_RENDER_TARGETS,
};
use crate::rhi::types::{PrimitiveTopology, ResourceId};
use crate::rhi_debug;

bitflags! {
    /// 需要重建的状态对象
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyStates: u8 {
        const DEPTH_STENCIL = 1 << 0;
        const RASTERIZER = 1 << 1;
        const BLEND = 1 << 2;
    }
}

/// 每个状态对象的代数，每次重建加一
///
/// 绑定方记住绑定时的代数，之后代数不同就说明设备上的对象已经过时。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StateGenerations {
    pub depth_stencil: u64,
    pub rasterizer: u64,
    pub blend: u64,
}

impl StateGenerations {
    /// 与 `other` 代数不同的状态
    pub fn changed_since(&self, other: &StateGenerations) -> DirtyStates {
        let mut changed = DirtyStates::empty();
        changed.set(DirtyStates::DEPTH_STENCIL, self.depth_stencil != other.depth_stencil);
        changed.set(DirtyStates::RASTERIZER, self.rasterizer != other.rasterizer);
        changed.set(DirtyStates::BLEND, self.blend != other.blend);
        changed
    }

    fn bump(&mut self, rebuilt: DirtyStates) {
        if rebuilt.contains(DirtyStates::DEPTH_STENCIL) {
            self.depth_stencil += 1;
        }
        if rebuilt.contains(DirtyStates::RASTERIZER) {
            self.rasterizer += 1;
        }
        if rebuilt.contains(DirtyStates::BLEND) {
            self.blend += 1;
        }
    }
}

/// `prepare` 的结果：三个当前有效的状态对象
pub struct PreparedStates<'a, B: Backend> {
    pub depth_stencil: &'a B::DepthStencilState,
    pub rasterizer: &'a B::RasterizerState,
    pub blend: &'a B::BlendState,
    /// 本次 `prepare` 重建了哪些对象
    pub rebuilt: DirtyStates,
    /// 三个对象当前的代数
    pub generations: StateGenerations,
}

/// 带脏标记的管线状态对象缓存
#[derive(Debug)]
pub struct PipelineStateCache<B: Backend> {
    depth_stencil_desc: DepthStencilDesc,
    rasterizer_desc: RasterizerDesc,
    blend_desc: BlendDesc,
    depth_stencil: Option<B::DepthStencilState>,
    rasterizer: Option<B::RasterizerState>,
    blend: Option<B::BlendState>,
    dirty: DirtyStates,
    generations: StateGenerations,
    rebuild_count: u64,
}

impl<B: Backend> PipelineStateCache<B> {
    /// 新缓存的三个状态都是脏的，第一次 `prepare` 时全部创建
    pub fn new(depth_stencil: DepthStencilDesc, rasterizer: RasterizerDesc, blend: BlendDesc) -> Self {
        Self {
            depth_stencil_desc: depth_stencil,
            rasterizer_desc: rasterizer,
            blend_desc: blend,
            depth_stencil: None,
            rasterizer: None,
            blend: None,
            dirty: DirtyStates::all(),
            generations: StateGenerations::default(),
            rebuild_count: 0,
        }
    }

    pub fn dirty(&self) -> DirtyStates {
        self.dirty
    }

    pub fn generations(&self) -> StateGenerations {
        self.generations
    }

    /// 累计创建的原生状态对象数量
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }

    pub fn depth_stencil_desc(&self) -> &DepthStencilDesc {
        &self.depth_stencil_desc
    }

    pub fn rasterizer_desc(&self) -> &RasterizerDesc {
        &self.rasterizer_desc
    }

    pub fn blend_desc(&self) -> &BlendDesc {
        &self.blend_desc
    }

    /// 修改深度模板描述；返回描述是否真的变化
    pub fn update_depth_stencil(&mut self, f: impl FnOnce(&mut DepthStencilDesc)) -> bool {
        let mut next = self.depth_stencil_desc;
        f(&mut next);
        mark(&mut self.depth_stencil_desc, next, &mut self.dirty, DirtyStates::DEPTH_STENCIL)
    }

    pub fn update_rasterizer(&mut self, f: impl FnOnce(&mut RasterizerDesc)) -> bool {
        let mut next = self.rasterizer_desc;
        f(&mut next);
        mark(&mut self.rasterizer_desc, next, &mut self.dirty, DirtyStates::RASTERIZER)
    }

    pub fn update_blend(&mut self, f: impl FnOnce(&mut BlendDesc)) -> bool {
        let mut next = self.blend_desc;
        f(&mut next);
        mark(&mut self.blend_desc, next, &mut self.dirty, DirtyStates::BLEND)
    }

    /// 强制下次 `prepare` 重建全部状态对象（例如设备状态被外部代码改写后）
    pub fn invalidate(&mut self) {
        self.dirty = DirtyStates::all();
    }

    /// 重建脏对象并返回当前的三个状态对象
    pub fn prepare(&mut self, backend: &B) -> Result<PreparedStates<'_, B>> {
        let mut rebuilt = DirtyStates::empty();

        if self.dirty.contains(DirtyStates::DEPTH_STENCIL) {
            let state = logged(
                "create depth stencil state",
                "pipeline",
                backend.create_depth_stencil_state(&self.depth_stencil_desc),
            )?;
            self.depth_stencil = Some(state);
            rebuilt |= DirtyStates::DEPTH_STENCIL;
        }
        if self.dirty.contains(DirtyStates::RASTERIZER) {
            let state = logged(
                "create rasterizer state",
                "pipeline",
                backend.create_rasterizer_state(&self.rasterizer_desc),
            );
            let state = self.keep_progress(rebuilt, state)?;
            self.rasterizer = Some(state);
            rebuilt |= DirtyStates::RASTERIZER;
        }
        if self.dirty.contains(DirtyStates::BLEND) {
            let state = logged(
                "create blend state",
                "pipeline",
                backend.create_blend_state(&self.blend_desc),
            );
            let state = self.keep_progress(rebuilt, state)?;
            self.blend = Some(state);
            rebuilt |= DirtyStates::BLEND;
        }

        self.commit(rebuilt);
        if !rebuilt.is_empty() {
            rhi_debug!(rebuilt = ?rebuilt, total = self.rebuild_count, "Pipeline state objects rebuilt");
        }

        match (&self.depth_stencil, &self.rasterizer, &self.blend) {
            (Some(depth_stencil), Some(rasterizer), Some(blend)) => Ok(PreparedStates {
                depth_stencil,
                rasterizer,
                blend,
                rebuilt,
                generations: self.generations,
            }),
            _ => Err(RhiError::command("pipeline state objects are missing after prepare")),
        }
    }

    /// 后面的对象创建失败时，前面已经成功重建的对象仍然算数
    fn keep_progress<T>(&mut self, rebuilt: DirtyStates, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.commit(rebuilt);
        }
        result
    }

    fn commit(&mut self, rebuilt: DirtyStates) {
        self.dirty.remove(rebuilt);
        self.generations.bump(rebuilt);
        self.rebuild_count += rebuilt.bits().count_ones() as u64;
    }
}

fn mark<T: PartialEq>(current: &mut T, next: T, dirty: &mut DirtyStates, flag: DirtyStates) -> bool {
    if *current == next {
        return false;
    }
    *current = next;
    dirty.insert(flag);
    true
}

/// 管线创建参数
pub struct PipelineDesc<B: Backend> {
    pub label: String,
    pub vertex_shader: VertexShader<B>,
    pub pixel_shader: PixelShader<B>,
    pub input_layout: Option<InputLayout<B>>,
    pub topology: PrimitiveTopology,
    pub depth_stencil: DepthStencilDesc,
    pub rasterizer: RasterizerDesc,
    pub blend: BlendDesc,
}

impl<B: Backend> PipelineDesc<B> {
    /// 其余字段取 D3D11 默认值
    pub fn new(label: &str, vertex_shader: VertexShader<B>, pixel_shader: PixelShader<B>) -> Self {
        Self {
            label: label.to_string(),
            vertex_shader,
            pixel_shader,
            input_layout: None,
            topology: PrimitiveTopology::TriangleList,
            depth_stencil: DepthStencilDesc::default(),
            rasterizer: RasterizerDesc::default(),
            blend: BlendDesc::default(),
        }
    }

    pub fn with_input_layout(mut self, input_layout: InputLayout<B>) -> Self {
        self.input_layout = Some(input_layout);
        self
    }

    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_depth_stencil(mut self, desc: DepthStencilDesc) -> Self {
        self.depth_stencil = desc;
        self
    }

    pub fn with_rasterizer(mut self, desc: RasterizerDesc) -> Self {
        self.rasterizer = desc;
        self
    }

    pub fn with_blend(mut self, desc: BlendDesc) -> Self {
        self.blend = desc;
        self
    }
}

/// 绑定时参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BindParams {
    pub stencil_ref: u32,
    pub blend_factor: [f32; 4],
    pub sample_mask: u32,
}

impl Default for BindParams {
    fn default() -> Self {
        Self {
            stencil_ref: 0,
            blend_factor: [1.0; 4],
            sample_mask: u32::MAX,
        }
    }
}

/// 命令队列绑定管线时需要的全部内容
pub(crate) struct PipelineBinding<'a, B: Backend> {
    pub id: ResourceId,
    pub vertex_shader: &'a VertexShader<B>,
    pub pixel_shader: &'a PixelShader<B>,
    pub input_layout: Option<&'a InputLayout<B>>,
    pub topology: PrimitiveTopology,
    pub params: BindParams,
    pub states: PreparedStates<'a, B>,
}

/// 图形管线
///
/// 着色器、输入布局和拓扑在创建时固定；三个状态对象通过 setter 修改，
/// 在下次绑定时按需重建。
pub struct Pipeline<B: Backend> {
    id: ResourceId,
    label: String,
    vertex_shader: VertexShader<B>,
    pixel_shader: PixelShader<B>,
    input_layout: Option<InputLayout<B>>,
    topology: PrimitiveTopology,
    params: BindParams,
    states: PipelineStateCache<B>,
}

impl<B: Backend> fmt::Debug for Pipeline<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("topology", &self.topology)
            .field("dirty", &self.states.dirty())
            .finish()
    }
}

impl<B: Backend> Pipeline<B> {
    pub(crate) fn new(device: &Device<B>, desc: PipelineDesc<B>) -> Self {
        let id = device.next_id();
        rhi_debug!(id = %id, label = %desc.label, "Pipeline created");
        Self {
            id,
            label: desc.label,
            vertex_shader: desc.vertex_shader,
            pixel_shader: desc.pixel_shader,
            input_layout: desc.input_layout,
            topology: desc.topology,
            params: BindParams::default(),
            states: PipelineStateCache::new(desc.depth_stencil, desc.rasterizer, desc.blend),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub fn states(&self) -> &PipelineStateCache<B> {
        &self.states
    }

    pub fn bind_params(&self) -> BindParams {
        self.params
    }

    /// 提前构建状态对象，避免第一次绘制时的创建开销
    pub fn prepare(&mut self, backend: &B) -> Result<DirtyStates> {
        Ok(self.states.prepare(backend)?.rebuilt)
    }

    pub fn invalidate(&mut self) {
        self.states.invalidate();
    }

    pub(crate) fn binding(&mut self, backend: &B) -> Result<PipelineBinding<'_, B>> {
        let states = self.states.prepare(backend)?;
        Ok(PipelineBinding {
            id: self.id,
            vertex_shader: &self.vertex_shader,
            pixel_shader: &self.pixel_shader,
            input_layout: self.input_layout.as_ref(),
            topology: self.topology,
            params: self.params,
            states,
        })
    }

    // ---- 深度模板 ----

    pub fn set_depth_stencil(&mut self, desc: DepthStencilDesc) -> bool {
        self.states.update_depth_stencil(|d| *d = desc)
    }

    pub fn set_depth_test(&mut self, enabled: bool) -> bool {
        self.states.update_depth_stencil(|d| d.depth_enable = enabled)
    }

    pub fn set_depth_write(&mut self, enabled: bool) -> bool {
        self.states.update_depth_stencil(|d| d.depth_write = enabled)
    }

    pub fn set_depth_func(&mut self, func: ComparisonFunc) -> bool {
        self.states.update_depth_stencil(|d| d.depth_func = func)
    }

    /// 开关模板测试，正反面使用同一组操作
    pub fn set_stencil(&mut self, enabled: bool, face: StencilFaceDesc) -> bool {
        self.states.update_depth_stencil(|d| {
            d.stencil_enable = enabled;
            d.front_face = face;
            d.back_face = face;
        })
    }

    pub fn set_stencil_masks(&mut self, read_mask: u8, write_mask: u8) -> bool {
        self.states.update_depth_stencil(|d| {
            d.stencil_read_mask = read_mask;
            d.stencil_write_mask = write_mask;
        })
    }

    pub fn set_stencil_faces(&mut self, front: StencilFaceDesc, back: StencilFaceDesc) -> bool {
        self.states.update_depth_stencil(|d| {
            d.front_face = front;
            d.back_face = back;
        })
    }

    // ---- 光栅化 ----

    pub fn set_rasterizer(&mut self, desc: RasterizerDesc) -> bool {
        self.states.update_rasterizer(|d| *d = desc)
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) -> bool {
        self.states.update_rasterizer(|d| d.cull_mode = mode)
    }

    pub fn set_fill_mode(&mut self, mode: FillMode) -> bool {
        self.states.update_rasterizer(|d| d.fill_mode = mode)
    }

    pub fn set_front_counter_clockwise(&mut self, ccw: bool) -> bool {
        self.states.update_rasterizer(|d| d.front_counter_clockwise = ccw)
    }

    pub fn set_depth_bias(&mut self, bias: i32, clamp: f32, slope_scaled: f32) -> bool {
        self.states.update_rasterizer(|d| {
            d.depth_bias = bias;
            d.depth_bias_clamp = clamp;
            d.slope_scaled_depth_bias = slope_scaled;
        })
    }

    pub fn set_scissor_enabled(&mut self, enabled: bool) -> bool {
        self.states.update_rasterizer(|d| d.scissor_enable = enabled)
    }

    pub fn set_depth_clip(&mut self, enabled: bool) -> bool {
        self.states.update_rasterizer(|d| d.depth_clip_enable = enabled)
    }

    // ---- 混合 ----

    pub fn set_blend_desc(&mut self, desc: BlendDesc) -> bool {
        self.states.update_blend(|d| *d = desc)
    }

    /// 所有渲染目标使用同一混合设置
    pub fn set_blend(&mut self, target: RenderTargetBlendDesc) -> bool {
        self.states.update_blend(|d| {
            d.independent_blend = false;
            d.render_targets = [target; MAX_RENDER_TARGETS];
        })
    }

    /// 单独设置某个渲染目标，并打开独立混合
    pub fn set_target_blend(&mut self, index: usize, target: RenderTargetBlendDesc) -> Result<bool> {
        if index >= MAX_RENDER_TARGETS {
            return Err(RhiError::invalid(format!("render target index {} out of range", index)));
        }
        Ok(self.states.update_blend(|d| {
            d.independent_blend = true;
            d.render_targets[index] = target;
        }))
    }

    pub fn set_blend_enabled(&mut self, enabled: bool) -> bool {
        self.states.update_blend(|d| {
            for target in d.render_targets.iter_mut() {
                target.blend_enable = enabled;
            }
        })
    }

    pub fn set_color_write_mask(&mut self, mask: ColorWriteMask) -> bool {
        self.states.update_blend(|d| {
            for target in d.render_targets.iter_mut() {
                target.write_mask = mask;
            }
        })
    }

    pub fn set_alpha_to_coverage(&mut self, enabled: bool) -> bool {
        self.states.update_blend(|d| d.alpha_to_coverage = enabled)
    }

    // ---- 绑定参数（不触发重建） ----

    pub fn set_blend_factor(&mut self, factor: [f32; 4]) {
        self.params.blend_factor = factor;
    }

    pub fn set_sample_mask(&mut self, mask: u32) {
        self.params.sample_mask = mask;
    }

    pub fn set_stencil_ref(&mut self, stencil_ref: u32) {
        self.params.stencil_ref = stencil_ref;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::{HeadlessBackend, ObjectKind};
    use crate::rhi::shader::ShaderSource;

    const SOURCE: &str = "VSMain PSMain";

    fn pipeline(device: &Device<HeadlessBackend>) -> Pipeline<HeadlessBackend> {
        let vs = device
            .create_vertex_shader("vs", &ShaderSource::hlsl(SOURCE, "VSMain"))
            .unwrap();
        let ps = device
            .create_pixel_shader("ps", &ShaderSource::hlsl(SOURCE, "PSMain"))
            .unwrap();
        device.create_pipeline(PipelineDesc::new("test", vs, ps))
    }

    fn state_objects(device: &Device<HeadlessBackend>) -> [usize; 3] {
        let backend = device.backend();
        [
            backend.created_objects(ObjectKind::DepthStencilState),
            backend.created_objects(ObjectKind::RasterizerState),
            backend.created_objects(ObjectKind::BlendState),
        ]
    }

    #[test]
    fn test_states_built_lazily() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let mut pipeline = pipeline(&device);
        assert_eq!(state_objects(&device), [0, 0, 0]);
        assert_eq!(pipeline.states().dirty(), DirtyStates::all());

        let rebuilt = pipeline.prepare(device.backend()).unwrap();
        assert_eq!(rebuilt, DirtyStates::all());
        assert_eq!(state_objects(&device), [1, 1, 1]);
        assert!(pipeline.states().dirty().is_empty());
    }

    #[test]
    fn test_clean_prepare_reuses_objects() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let mut pipeline = pipeline(&device);
        pipeline.prepare(device.backend()).unwrap();
        let rebuilt = pipeline.prepare(device.backend()).unwrap();
        assert!(rebuilt.is_empty());
        assert_eq!(state_objects(&device), [1, 1, 1]);
        assert_eq!(pipeline.states().rebuild_count(), 3);
    }

    #[test]
    fn test_nan_depth_bias_dirties_once() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let mut pipeline = pipeline(&device);
        pipeline.prepare(device.backend()).unwrap();

        assert!(pipeline.set_depth_bias(1, f32::NAN, f32::NAN));
        pipeline.prepare(device.backend()).unwrap();
        assert!(!pipeline.set_depth_bias(1, f32::NAN, f32::NAN));
        assert!(pipeline.states().dirty().is_empty());
        assert_eq!(state_objects(&device), [1, 2, 1]);
    }

    #[test]
    fn test_generations_follow_rebuilds() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let mut pipeline = pipeline(&device);
        assert_eq!(pipeline.states().generations(), StateGenerations::default());

        pipeline.prepare(device.backend()).unwrap();
        let first = pipeline.states().generations();
        assert_eq!(first.changed_since(&StateGenerations::default()), DirtyStates::all());

        pipeline.set_fill_mode(FillMode::Wireframe);
        pipeline.prepare(device.backend()).unwrap();
        let second = pipeline.states().generations();
        assert_eq!(second.changed_since(&first), DirtyStates::RASTERIZER);

        // 失败的重建不改变代数
        pipeline.set_depth_write(false);
        device.backend().fail_creation(ObjectKind::DepthStencilState);
        assert!(pipeline.prepare(device.backend()).is_err());
        assert!(pipeline.states().generations().changed_since(&second).is_empty());
    }

    #[test]
    fn test_setting_same_value_does_not_dirty() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let mut pipeline = pipeline(&device);
        pipeline.prepare(device.backend()).unwrap();

        assert!(!pipeline.set_depth_test(true));
        assert!(!pipeline.set_cull_mode(CullMode::Back));
        assert!(!pipeline.set_blend_enabled(false));
        assert!(pipeline.states().dirty().is_empty());
    }

    #[test]
    fn test_only_changed_state_is_rebuilt() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let mut pipeline = pipeline(&device);
        pipeline.prepare(device.backend()).unwrap();

        assert!(pipeline.set_depth_write(false));
        assert!(pipeline.set_depth_func(ComparisonFunc::LessEqual));
        assert_eq!(pipeline.states().dirty(), DirtyStates::DEPTH_STENCIL);

        let rebuilt = pipeline.prepare(device.backend()).unwrap();
        assert_eq!(rebuilt, DirtyStates::DEPTH_STENCIL);
        assert_eq!(state_objects(&device), [2, 1, 1]);

        pipeline.set_cull_mode(CullMode::None);
        pipeline.set_blend(RenderTargetBlendDesc::alpha_blend());
        let rebuilt = pipeline.prepare(device.backend()).unwrap();
        assert_eq!(rebuilt, DirtyStates::RASTERIZER | DirtyStates::BLEND);
        assert_eq!(state_objects(&device), [2, 2, 2]);
    }

    #[test]
    fn test_replaced_state_object_is_released() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let mut pipeline = pipeline(&device);
        pipeline.prepare(device.backend()).unwrap();
        pipeline.set_fill_mode(FillMode::Wireframe);
        pipeline.prepare(device.backend()).unwrap();
        assert_eq!(device.backend().live_objects(ObjectKind::RasterizerState), 1);
    }

    #[test]
    fn test_bind_params_do_not_dirty() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let mut pipeline = pipeline(&device);
        pipeline.prepare(device.backend()).unwrap();

        pipeline.set_stencil_ref(3);
        pipeline.set_blend_factor([0.5; 4]);
        pipeline.set_sample_mask(0x0F);
        assert!(pipeline.states().dirty().is_empty());
        assert_eq!(pipeline.bind_params().stencil_ref, 3);
    }

    #[test]
    fn test_failed_rebuild_keeps_dirty_bit() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let mut pipeline = pipeline(&device);
        pipeline.prepare(device.backend()).unwrap();

        pipeline.set_depth_test(false);
        pipeline.set_blend_enabled(true);
        device.backend().fail_creation(ObjectKind::BlendState);
        assert!(pipeline.prepare(device.backend()).is_err());
        // 深度模板已成功重建，只剩混合状态待重试
        assert_eq!(pipeline.states().dirty(), DirtyStates::BLEND);
        assert_eq!(device.backend().live_objects(ObjectKind::BlendState), 1);

        device.backend().clear_failures();
        let rebuilt = pipeline.prepare(device.backend()).unwrap();
        assert_eq!(rebuilt, DirtyStates::BLEND);
        assert!(pipeline.states().blend_desc().render_targets[0].blend_enable);
    }

    #[test]
    fn test_first_prepare_failure() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let mut pipeline = pipeline(&device);
        device.backend().fail_creation(ObjectKind::DepthStencilState);
        assert!(pipeline.prepare(device.backend()).is_err());
        assert_eq!(pipeline.states().dirty(), DirtyStates::all());
    }

    #[test]
    fn test_invalidate_rebuilds_everything() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let mut pipeline = pipeline(&device);
        pipeline.prepare(device.backend()).unwrap();
        pipeline.invalidate();
        assert_eq!(pipeline.prepare(device.backend()).unwrap(), DirtyStates::all());
        assert_eq!(state_objects(&device), [2, 2, 2]);
    }

    #[test]
    fn test_target_blend_enables_independent_blend() {
        let device = Device::new(HeadlessBackend::new(64, 64));
        let mut pipeline = pipeline(&device);
        assert!(pipeline.set_target_blend(1, RenderTargetBlendDesc::additive()).unwrap());
        assert!(pipeline.states().blend_desc().independent_blend);
        assert!(pipeline.set_target_blend(8, RenderTargetBlendDesc::additive()).is_err());
    }
}
