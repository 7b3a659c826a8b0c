//! Direct3D 11 设备与交换链
//!
//! # 初始化流程
//!
//! 1. `D3D11CreateDevice` 创建设备和立即上下文（可选调试层）
//! 2. 通过 `IDXGIDevice` → 适配器 → `IDXGIFactory2` 找到创建设备的工厂
//! 3. 为 Win32 窗口创建 flip-discard 交换链

use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use tracing::{debug, info, warn};
use windows::core::Interface;
use windows::Win32::Foundation::{HMODULE, HWND};
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::core::config::GraphicsConfig;
use crate::core::error::{GraphicsError, Result, RhiError};

/// 交换链缓冲区数量
pub const BUFFER_COUNT: u32 = 2;

/// 交换链格式
pub const SWAPCHAIN_FORMAT: DXGI_FORMAT = DXGI_FORMAT_B8G8R8A8_UNORM;

/// D3D11 核心对象
#[derive(Debug)]
pub struct D3D11Context {
    pub device: ID3D11Device,
    pub context: ID3D11DeviceContext,
    pub swap_chain: IDXGISwapChain1,
    pub feature_level: D3D_FEATURE_LEVEL,
    /// 创建时是否启用了调试层
    pub debug_layer: bool,
}

fn device_error(what: &str, e: windows::core::Error) -> RhiError {
    GraphicsError::DeviceCreation(format!("{}: {}", what, e)).into()
}

impl D3D11Context {
    /// 为窗口创建设备和交换链
    ///
    /// `width` / `height` 是窗口客户区的物理像素尺寸。
    pub fn new(window: &impl HasWindowHandle, width: u32, height: u32, config: &GraphicsConfig) -> Result<Self> {
        let handle = window
            .window_handle()
            .map_err(|e| GraphicsError::DeviceCreation(format!("window handle unavailable: {}", e)))?;
        let hwnd = match handle.as_raw() {
            RawWindowHandle::Win32(win32) => HWND(win32.hwnd.get() as *mut core::ffi::c_void),
            other => {
                return Err(GraphicsError::DeviceCreation(format!(
                    "expected a Win32 window handle, got {:?}",
                    other
                ))
                .into())
            }
        };

        let (device, context, feature_level, debug_layer) = Self::create_device(config.debug_layer)?;

        unsafe {
            let dxgi_device: IDXGIDevice = device.cast().map_err(|e| device_error("IDXGIDevice", e))?;
            let adapter = dxgi_device.GetAdapter().map_err(|e| device_error("GetAdapter", e))?;
            if let Ok(desc) = adapter.GetDesc() {
                let name = String::from_utf16_lossy(&desc.Description);
                info!(adapter = name.trim_end_matches('\0'), "Using DXGI adapter");
            }
            let factory: IDXGIFactory2 = adapter.GetParent().map_err(|e| device_error("IDXGIFactory2", e))?;

            let desc = DXGI_SWAP_CHAIN_DESC1 {
                Width: width.max(1),
                Height: height.max(1),
                Format: SWAPCHAIN_FORMAT,
                SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
                BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
                BufferCount: BUFFER_COUNT,
                Scaling: DXGI_SCALING_STRETCH,
                SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
                AlphaMode: DXGI_ALPHA_MODE_UNSPECIFIED,
                ..Default::default()
            };
            let swap_chain = factory
                .CreateSwapChainForHwnd(&device, hwnd, &desc, None, None)
                .map_err(|e| GraphicsError::SwapchainError(format!("CreateSwapChainForHwnd: {}", e)))?;
            // 全屏切换由窗口系统处理
            if let Err(e) = factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER) {
                warn!(error = %e, "MakeWindowAssociation failed");
            }

            info!(width, height, buffers = BUFFER_COUNT, "D3D11 swap chain created");

            Ok(Self {
                device,
                context,
                swap_chain,
                feature_level,
                debug_layer,
            })
        }
    }

    /// 调试层需要安装 Graphics Tools；不可用时退回普通设备
    fn create_device(debug_layer: bool) -> Result<(ID3D11Device, ID3D11DeviceContext, D3D_FEATURE_LEVEL, bool)> {
        let levels = [D3D_FEATURE_LEVEL_11_1, D3D_FEATURE_LEVEL_11_0];
        let mut attempts = vec![(D3D11_CREATE_DEVICE_BGRA_SUPPORT, false)];
        if debug_layer {
            attempts.insert(0, (D3D11_CREATE_DEVICE_BGRA_SUPPORT | D3D11_CREATE_DEVICE_DEBUG, true));
        }

        let mut last_error = None;
        for (flags, with_debug) in attempts {
            let mut device = None;
            let mut context = None;
            let mut feature_level = D3D_FEATURE_LEVEL::default();
            let result = unsafe {
                D3D11CreateDevice(
                    None,
                    D3D_DRIVER_TYPE_HARDWARE,
                    HMODULE::default(),
                    flags,
                    Some(&levels),
                    D3D11_SDK_VERSION,
                    Some(&mut device as *mut _),
                    Some(&mut feature_level as *mut _),
                    Some(&mut context as *mut _),
                )
            };
            match (result, device, context) {
                (Ok(()), Some(device), Some(context)) => {
                    info!(
                        feature_level = %format_args!("{:#x}", feature_level.0),
                        debug_layer = with_debug,
                        "D3D11 device created"
                    );
                    return Ok((device, context, feature_level, with_debug));
                }
                (Err(e), _, _) => {
                    if with_debug {
                        warn!(error = %e, "D3D11 debug layer unavailable, retrying without it");
                    }
                    last_error = Some(e);
                }
                _ => debug!("D3D11CreateDevice returned no objects"),
            }
        }

        Err(match last_error {
            Some(e) => device_error("D3D11CreateDevice", e),
            None => GraphicsError::DeviceCreation("D3D11CreateDevice returned no objects".to_string()).into(),
        })
    }
}
