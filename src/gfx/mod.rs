//! 图形后端
//!
//! - `headless`：记录每一次原生调用的纯软件后端，用于测试和无窗口运行
//! - `d3d11`：Direct3D 11 后端（仅 Windows）

pub mod headless;
#[cfg(target_os = "windows")]
pub mod d3d11;

pub use headless::HeadlessBackend;
#[cfg(target_os = "windows")]
pub use d3d11::D3D11Backend;
