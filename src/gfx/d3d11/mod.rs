//! Direct3D 11 后端（仅 Windows）
//!
//! - `context`：设备、立即上下文与交换链的创建
//! - `backend`：`Backend` trait 的实现
//! - `format`：枚举转换表
//! - `compile`：`D3DCompile` 封装

pub mod backend;
pub mod compile;
pub mod context;
pub mod format;

pub use backend::D3D11Backend;
pub use context::D3D11Context;
