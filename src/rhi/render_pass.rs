//! 渲染通道描述
//!
//! 一个通道最多 8 个颜色目标加一个可选的深度模板目标，所有目标尺寸必须一致。
//! 未指定视口时使用第一个目标的完整尺寸。

use std::fmt;

use crate::core::error::{Result, RhiError};
use crate::rhi::backend::Backend;
use crate::rhi::state::MAX_RENDER_TARGETS;
use crate::rhi::texture::{DepthStencil, RenderTarget};
use crate::rhi::types::{ResourceId, Viewport};

/// 通道开始时如何处理目标中已有的内容
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<T> {
    /// 保留已有内容
    Load,
    /// 用给定值清除
    Clear(T),
}

pub struct ColorAttachment<B: Backend> {
    pub target: RenderTarget<B>,
    pub load: LoadOp<[f32; 4]>,
}

pub struct DepthAttachment<B: Backend> {
    pub target: DepthStencil<B>,
    pub depth: LoadOp<f32>,
    pub stencil: LoadOp<u8>,
}

/// 渲染通道
pub struct RenderPass<B: Backend> {
    label: String,
    colors: Vec<ColorAttachment<B>>,
    depth: Option<DepthAttachment<B>>,
    viewport: Option<Viewport>,
}

impl<B: Backend> fmt::Debug for RenderPass<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPass")
            .field("label", &self.label)
            .field("colors", &self.colors.iter().map(|c| c.target.id()).collect::<Vec<_>>())
            .field("depth", &self.depth.as_ref().map(|d| d.target.id()))
            .field("viewport", &self.viewport)
            .finish()
    }
}

impl<B: Backend> RenderPass<B> {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            colors: Vec::new(),
            depth: None,
            viewport: None,
        }
    }

    pub fn with_color(mut self, target: &RenderTarget<B>, load: LoadOp<[f32; 4]>) -> Self {
        self.colors.push(ColorAttachment {
            target: target.clone(),
            load,
        });
        self
    }

    pub fn with_depth(mut self, target: &DepthStencil<B>, depth: LoadOp<f32>, stencil: LoadOp<u8>) -> Self {
        self.depth = Some(DepthAttachment {
            target: target.clone(),
            depth,
            stencil,
        });
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn colors(&self) -> &[ColorAttachment<B>] {
        &self.colors
    }

    pub fn depth(&self) -> Option<&DepthAttachment<B>> {
        self.depth.as_ref()
    }

    /// 所有目标的尺寸；没有目标时为 `None`
    pub fn extent(&self) -> Option<(u32, u32)> {
        self.colors
            .first()
            .map(|c| (c.target.width(), c.target.height()))
            .or_else(|| self.depth.as_ref().map(|d| (d.target.width(), d.target.height())))
    }

    /// 显式视口，或第一个目标的完整尺寸
    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
            .or_else(|| self.extent().map(|(w, h)| Viewport::full(w, h)))
    }

    /// 通道写入的所有资源 id
    pub fn target_ids(&self) -> Vec<ResourceId> {
        self.colors
            .iter()
            .map(|c| c.target.id())
            .chain(self.depth.as_ref().map(|d| d.target.id()))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.colors.is_empty() && self.depth.is_none() {
            return Err(RhiError::invalid(format!("render pass '{}' has no attachments", self.label)));
        }
        if self.colors.len() > MAX_RENDER_TARGETS {
            return Err(RhiError::invalid(format!(
                "render pass '{}' has {} color targets (max {})",
                self.label,
                self.colors.len(),
                MAX_RENDER_TARGETS
            )));
        }
        let extent = self.extent();
        let sizes = self
            .colors
            .iter()
            .map(|c| (c.target.width(), c.target.height()))
            .chain(self.depth.as_ref().map(|d| (d.target.width(), d.target.height())));
        for size in sizes {
            if Some(size) != extent {
                return Err(RhiError::invalid(format!(
                    "render pass '{}' mixes target sizes {:?} and {:?}",
                    self.label,
                    extent.unwrap_or_default(),
                    size
                )));
            }
        }
        Ok(())
    }
}
