//! 资源绑定登记表
//!
//! 记录每个着色器阶段、每个槽位当前绑定的资源 id，命令队列据此跳过重复绑定。
//! 资源 id 从不复用，所以相同 id 一定是同一个对象。

use crate::core::error::{Result, RhiError};
use crate::rhi::types::{ResourceId, ShaderStage};

pub const MAX_SHADER_RESOURCE_SLOTS: u32 = 128;
pub const MAX_SAMPLER_SLOTS: u32 = 16;
pub const MAX_CONSTANT_BUFFER_SLOTS: u32 = 14;

/// 槽位类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    ShaderResource,
    Sampler,
    ConstantBuffer,
}

impl SlotKind {
    pub const fn limit(self) -> u32 {
        match self {
            SlotKind::ShaderResource => MAX_SHADER_RESOURCE_SLOTS,
            SlotKind::Sampler => MAX_SAMPLER_SLOTS,
            SlotKind::ConstantBuffer => MAX_CONSTANT_BUFFER_SLOTS,
        }
    }
}

/// 一个具体槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundSlot {
    pub stage: ShaderStage,
    pub kind: SlotKind,
    pub slot: u32,
}

#[derive(Debug, Default, Clone)]
struct StageBindings {
    shader_resources: Vec<Option<ResourceId>>,
    samplers: Vec<Option<ResourceId>>,
    constant_buffers: Vec<Option<ResourceId>>,
}

impl StageBindings {
    fn slots(&self, kind: SlotKind) -> &Vec<Option<ResourceId>> {
        match kind {
            SlotKind::ShaderResource => &self.shader_resources,
            SlotKind::Sampler => &self.samplers,
            SlotKind::ConstantBuffer => &self.constant_buffers,
        }
    }

    fn slots_mut(&mut self, kind: SlotKind) -> &mut Vec<Option<ResourceId>> {
        match kind {
            SlotKind::ShaderResource => &mut self.shader_resources,
            SlotKind::Sampler => &mut self.samplers,
            SlotKind::ConstantBuffer => &mut self.constant_buffers,
        }
    }

    fn set(&mut self, kind: SlotKind, slot: u32, value: Option<ResourceId>) -> bool {
        let slots = self.slots_mut(kind);
        let slot_usize = slot as usize;
        if slots.len() <= slot_usize {
            if value.is_none() {
                return false;
            }
            slots.resize(slot_usize + 1, None);
        }
        if slots[slot_usize] == value {
            return false;
        }
        slots[slot_usize] = value;
        true
    }

    fn get(&self, kind: SlotKind, slot: u32) -> Option<ResourceId> {
        self.slots(kind).get(slot as usize).and_then(|v| *v)
    }
}

/// 两个着色器阶段的绑定状态
#[derive(Debug, Default, Clone)]
pub struct ResourceRegistry {
    vertex: StageBindings,
    pixel: StageBindings,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn stage(&self, stage: ShaderStage) -> &StageBindings {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Pixel => &self.pixel,
        }
    }

    fn stage_mut(&mut self, stage: ShaderStage) -> &mut StageBindings {
        match stage {
            ShaderStage::Vertex => &mut self.vertex,
            ShaderStage::Pixel => &mut self.pixel,
        }
    }

    /// 登记绑定；返回槽位内容是否变化（即是否需要真正调用原生接口）
    pub fn bind(&mut self, stage: ShaderStage, kind: SlotKind, slot: u32, id: Option<ResourceId>) -> Result<bool> {
        if slot >= kind.limit() {
            return Err(RhiError::invalid(format!(
                "{:?} slot {} out of range for {} stage (limit {})",
                kind,
                slot,
                stage,
                kind.limit()
            )));
        }
        Ok(self.stage_mut(stage).set(kind, slot, id))
    }

    pub fn bind_shader_resource(&mut self, stage: ShaderStage, slot: u32, id: Option<ResourceId>) -> Result<bool> {
        self.bind(stage, SlotKind::ShaderResource, slot, id)
    }

    pub fn bind_sampler(&mut self, stage: ShaderStage, slot: u32, id: Option<ResourceId>) -> Result<bool> {
        self.bind(stage, SlotKind::Sampler, slot, id)
    }

    pub fn bind_constant_buffer(&mut self, stage: ShaderStage, slot: u32, id: Option<ResourceId>) -> Result<bool> {
        self.bind(stage, SlotKind::ConstantBuffer, slot, id)
    }

    pub fn bound(&self, stage: ShaderStage, kind: SlotKind, slot: u32) -> Option<ResourceId> {
        self.stage(stage).get(kind, slot)
    }

    pub fn shader_resource(&self, stage: ShaderStage, slot: u32) -> Option<ResourceId> {
        self.bound(stage, SlotKind::ShaderResource, slot)
    }

    /// `id` 当前占用的所有槽位
    pub fn slots_holding(&self, id: ResourceId) -> Vec<BoundSlot> {
        let mut found = Vec::new();
        for stage in [ShaderStage::Vertex, ShaderStage::Pixel] {
            for kind in [SlotKind::ShaderResource, SlotKind::Sampler, SlotKind::ConstantBuffer] {
                for (slot, bound) in self.stage(stage).slots(kind).iter().enumerate() {
                    if *bound == Some(id) {
                        found.push(BoundSlot {
                            stage,
                            kind,
                            slot: slot as u32,
                        });
                    }
                }
            }
        }
        found
    }

    /// 清空 `id` 占用的所有槽位，返回被清空的槽位
    pub fn forget(&mut self, id: ResourceId) -> Vec<BoundSlot> {
        let freed = self.slots_holding(id);
        for bound in &freed {
            self.stage_mut(bound.stage).set(bound.kind, bound.slot, None);
        }
        freed
    }

    /// 所有槽位视为空（设备状态被整体清除后调用）
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        [&self.vertex, &self.pixel].iter().all(|stage| {
            stage.shader_resources.iter().all(Option::is_none)
                && stage.samplers.iter().all(Option::is_none)
                && stage.constant_buffers.iter().all(Option::is_none)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebinding_same_id_is_not_a_change() {
        let mut registry = ResourceRegistry::new();
        let tex = ResourceId(7);
        assert!(registry.bind_shader_resource(ShaderStage::Pixel, 0, Some(tex)).unwrap());
        assert!(!registry.bind_shader_resource(ShaderStage::Pixel, 0, Some(tex)).unwrap());
        assert_eq!(registry.shader_resource(ShaderStage::Pixel, 0), Some(tex));
        // 另一个阶段是独立的
        assert!(registry.bind_shader_resource(ShaderStage::Vertex, 0, Some(tex)).unwrap());
    }

    #[test]
    fn test_unbinding_empty_slot_is_not_a_change() {
        let mut registry = ResourceRegistry::new();
        assert!(!registry.bind_sampler(ShaderStage::Pixel, 5, None).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_slot_limits() {
        let mut registry = ResourceRegistry::new();
        let id = Some(ResourceId(1));
        assert!(registry.bind_shader_resource(ShaderStage::Pixel, 127, id).is_ok());
        assert!(registry.bind_shader_resource(ShaderStage::Pixel, 128, id).is_err());
        assert!(registry.bind_sampler(ShaderStage::Pixel, 16, id).is_err());
        assert!(registry.bind_constant_buffer(ShaderStage::Vertex, 14, id).is_err());
    }

    #[test]
    fn test_forget_reports_freed_slots() {
        let mut registry = ResourceRegistry::new();
        let tex = ResourceId(3);
        let other = ResourceId(4);
        registry.bind_shader_resource(ShaderStage::Pixel, 0, Some(tex)).unwrap();
        registry.bind_shader_resource(ShaderStage::Pixel, 2, Some(other)).unwrap();
        registry.bind_shader_resource(ShaderStage::Vertex, 1, Some(tex)).unwrap();

        let freed = registry.forget(tex);
        assert_eq!(freed.len(), 2);
        assert!(freed.contains(&BoundSlot {
            stage: ShaderStage::Vertex,
            kind: SlotKind::ShaderResource,
            slot: 1,
        }));
        assert_eq!(registry.shader_resource(ShaderStage::Pixel, 0), None);
        assert_eq!(registry.shader_resource(ShaderStage::Pixel, 2), Some(other));
        assert!(registry.forget(tex).is_empty());
    }

    #[test]
    fn test_invalidate_clears_everything() {
        let mut registry = ResourceRegistry::new();
        registry.bind_constant_buffer(ShaderStage::Vertex, 0, Some(ResourceId(1))).unwrap();
        registry.invalidate();
        assert!(registry.is_empty());
        assert!(registry.bind_constant_buffer(ShaderStage::Vertex, 0, Some(ResourceId(1))).unwrap());
    }
}
