//! 渲染硬件接口（RHI）
//!
//! 对 Direct3D 11 立即上下文的一层薄封装。所有类型都以 `Backend` 为泛型参数，
//! 既可以跑在真实的 D3D11 设备上，也可以跑在记录调用的 headless 后端上。
//!
//! # 模块结构
//!
//! - `types` / `state`：描述符与枚举
//! - `backend`：原生驱动接缝
//! - `device`：资源创建入口
//! - `buffer` / `texture` / `shader`：引擎侧资源句柄
//! - `pipeline`：带脏标记的管线状态缓存
//! - `registry`：各着色器阶段的槽位绑定表
//! - `render_pass` / `command_queue`：渲染通道与命令录制
//! - `swapchain`：后备缓冲区与呈现

pub mod backend;
pub mod buffer;
pub mod command_queue;
pub mod device;
pub mod pipeline;
pub mod registry;
pub mod render_pass;
pub mod shader;
pub mod state;
pub mod swapchain;
pub mod texture;
pub mod types;

pub use backend::Backend;
pub use buffer::{Buffer, ConstantBuffer, IndexBuffer, VertexBuffer};
pub use command_queue::{CommandQueue, FrameStats};
pub use device::Device;
pub use pipeline::{BindParams, DirtyStates, Pipeline, PipelineDesc, PipelineStateCache, StateGenerations};
pub use registry::{ResourceRegistry, SlotKind};
pub use render_pass::{LoadOp, RenderPass};
pub use shader::{HlslSource, InputLayout, PixelShader, ShaderSource, VertexShader};
pub use swapchain::Swapchain;
pub use texture::{DepthStencil, RenderTarget, Sampler, Texture2D};
pub use types::*;
