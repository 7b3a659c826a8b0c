//! 交换链
//!
//! 把后端的后备缓冲区包装成 [`RenderTarget`]。调整大小前必须释放所有指向后备缓冲区的
//! 视图（DXGI `ResizeBuffers` 的要求），所以 `resize` 会先丢弃自己持有的句柄，
//! 调整完成后重新获取。

use tracing::{debug, info};

use crate::core::error::{GraphicsError, Result};
use crate::rhi::backend::Backend;
use crate::rhi::device::{logged, Device};
use crate::rhi::texture::RenderTarget;

/// 交换链
#[derive(Debug)]
pub struct Swapchain<B: Backend> {
    device: Device<B>,
    back_buffer: Option<RenderTarget<B>>,
    width: u32,
    height: u32,
}

impl<B: Backend> Swapchain<B> {
    pub(crate) fn new(device: &Device<B>) -> Result<Self> {
        let back_buffer = Self::acquire(device)?;
        let (width, height) = (back_buffer.width(), back_buffer.height());
        info!(width, height, "Swapchain created");
        Ok(Self {
            device: device.clone(),
            back_buffer: Some(back_buffer),
            width,
            height,
        })
    }

    fn acquire(device: &Device<B>) -> Result<RenderTarget<B>> {
        let (texture, desc) = logged("get back buffer", "swapchain", device.backend().back_buffer())?;
        RenderTarget::from_native(device, "back buffer", texture, desc)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 当前后备缓冲区
    pub fn render_target(&self) -> Result<&RenderTarget<B>> {
        self.back_buffer
            .as_ref()
            .ok_or_else(|| GraphicsError::SwapchainError("back buffer is not available".to_string()).into())
    }

    /// 调整大小；返回是否真的调整了。宽或高为 0（窗口最小化）时忽略
    ///
    /// 调用方持有的后备缓冲区句柄（包括引用它的 `RenderPass` 和正在以它为目标的
    /// 命令队列通道）必须先释放，否则返回 `SwapchainError`。
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        if width == 0 || height == 0 {
            debug!(width, height, "Ignoring zero-sized swapchain resize");
            return Ok(false);
        }
        if width == self.width && height == self.height && self.back_buffer.is_some() {
            return Ok(false);
        }

        if let Some(back_buffer) = &self.back_buffer {
            let handles = back_buffer.handle_count();
            if handles > 1 {
                return Err(GraphicsError::SwapchainError(format!(
                    "back buffer is still referenced by {} other handles",
                    handles - 1
                ))
                .into());
            }
        }

        self.back_buffer = None;
        let backend = self.device.backend();
        backend.set_render_targets(&[], None);

        let resized = logged("resize swapchain", "swapchain", backend.resize_surface(width, height));
        // 原生调整失败时旧缓冲区仍然有效，重新获取以保持交换链可用
        self.back_buffer = Some(Self::acquire(&self.device)?);
        resized?;

        self.width = width;
        self.height = height;
        info!(width, height, "Swapchain resized");
        Ok(true)
    }

    pub fn present(&self, vsync: bool) -> Result<()> {
        logged("present", "swapchain", self.device.backend().present(vsync))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::{Call, HeadlessBackend, ObjectKind};
    use crate::rhi::render_pass::{LoadOp, RenderPass};

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(320, 240))
    }

    #[test]
    fn test_back_buffer_matches_surface() {
        let device = device();
        let swapchain = device.create_swapchain().unwrap();
        let target = swapchain.render_target().unwrap();
        assert_eq!((target.width(), target.height()), (320, 240));
        assert!(target.shader_resource_view().is_none());
    }

    #[test]
    fn test_zero_size_resize_is_ignored() {
        let device = device();
        let mut swapchain = device.create_swapchain().unwrap();
        assert!(!swapchain.resize(0, 240).unwrap());
        assert!(!swapchain.resize(320, 240).unwrap());
        assert!(!device
            .backend()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::ResizeSurface { .. })));
    }

    #[test]
    fn test_resize_reacquires_back_buffer() {
        let device = device();
        let mut swapchain = device.create_swapchain().unwrap();
        let old_id = swapchain.render_target().unwrap().id();

        assert!(swapchain.resize(640, 480).unwrap());
        let target = swapchain.render_target().unwrap();
        assert_ne!(target.id(), old_id);
        assert_eq!((target.width(), target.height()), (640, 480));
        assert_eq!(device.backend().surface_size(), (640, 480));
        assert_eq!(device.backend().live_objects(ObjectKind::RenderTargetView), 1);
    }

    #[test]
    fn test_resize_with_outstanding_handle_fails() {
        let device = device();
        let mut swapchain = device.create_swapchain().unwrap();
        let pass = RenderPass::new("main").with_color(swapchain.render_target().unwrap(), LoadOp::Load);

        assert!(swapchain.resize(800, 600).is_err());
        assert_eq!(swapchain.width(), 320);

        drop(pass);
        assert!(swapchain.resize(800, 600).unwrap());
    }

    #[test]
    fn test_resize_during_active_pass_fails() {
        let device = device();
        let mut swapchain = device.create_swapchain().unwrap();
        let mut queue = device.create_command_queue();
        let pass = RenderPass::new("main").with_color(swapchain.render_target().unwrap(), LoadOp::Load);
        queue.begin_render_pass(&pass).unwrap();
        drop(pass);

        assert!(swapchain.resize(800, 600).is_err());
        assert!(!device
            .backend()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::ResizeSurface { .. })));

        queue.end_render_pass().unwrap();
        assert!(swapchain.resize(800, 600).unwrap());
        assert!(!queue.in_render_pass());
    }

    #[test]
    fn test_present_records_vsync() {
        let device = device();
        let swapchain = device.create_swapchain().unwrap();
        swapchain.present(true).unwrap();
        swapchain.present(false).unwrap();
        let presents: Vec<_> = device
            .backend()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Present { .. }))
            .collect();
        assert_eq!(presents, vec![Call::Present { vsync: true }, Call::Present { vsync: false }]);
    }
}
