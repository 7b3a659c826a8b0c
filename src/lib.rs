//! DistRHI - Direct3D 11 渲染硬件接口
//!
//! 一层很薄的 D3D11 封装：管线状态对象按需懒构建，命令队列跳过冗余的资源绑定，
//! 并在渲染目标与着色器资源之间自动解除读写冲突。
//!
//! # 模块结构
//!
//! - `core`: 日志、配置、错误处理
//! - `rhi`: 设备、资源、管线、命令队列和交换链
//! - `gfx`: 后端实现（D3D11 与 headless）
//!
//! # 使用示例
//!
//! ```no_run
//! use dist_rhi::gfx::HeadlessBackend;
//! use dist_rhi::rhi::{Device, LoadOp, RenderPass};
//!
//! let device = Device::new(HeadlessBackend::new(800, 600));
//! let swapchain = device.create_swapchain().unwrap();
//! let mut queue = device.create_command_queue();
//!
//! let pass = RenderPass::new("main")
//!     .with_color(swapchain.render_target().unwrap(), LoadOp::Clear([0.1, 0.1, 0.1, 1.0]));
//! queue.begin_render_pass(&pass).unwrap();
//! queue.end_render_pass().unwrap();
//! swapchain.present(true).unwrap();
//! ```

pub mod core;
pub mod gfx;
pub mod rhi;
