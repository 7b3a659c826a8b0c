//! HLSL 编译（`D3DCompile`）

use std::ffi::CString;

use windows::core::PCSTR;
use windows::Win32::Graphics::Direct3D::Fxc::*;
use windows::Win32::Graphics::Direct3D::*;

use crate::core::error::{GraphicsError, Result};
use crate::rhi::shader::HlslSource;
use crate::rhi::types::ShaderStage;

fn cstring(value: &str, what: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| GraphicsError::InvalidDescriptor(format!("{} contains a NUL byte", what)).into())
}

/// 读取 blob 内容
///
/// # Safety
///
/// `blob` 必须是有效的 `ID3DBlob`。
pub(crate) unsafe fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
}

/// 编译为 `vs_5_0` / `ps_5_0` 字节码；失败时返回编译器输出
pub fn compile(source: &HlslSource, stage: ShaderStage, debug: bool) -> Result<Vec<u8>> {
    let file_name = cstring(&source.file_name, "shader file name")?;
    let entry_point = cstring(&source.entry_point, "entry point")?;
    let profile = cstring(stage.profile(), "shader profile")?;

    let define_strings = source
        .defines
        .iter()
        .map(|(name, value)| Ok((cstring(name, "define name")?, cstring(value, "define value")?)))
        .collect::<Result<Vec<_>>>()?;
    // 以空项结尾
    let mut macros: Vec<D3D_SHADER_MACRO> = define_strings
        .iter()
        .map(|(name, value)| D3D_SHADER_MACRO {
            Name: PCSTR(name.as_ptr() as *const u8),
            Definition: PCSTR(value.as_ptr() as *const u8),
        })
        .collect();
    macros.push(D3D_SHADER_MACRO::default());

    let flags = if debug {
        D3DCOMPILE_DEBUG | D3DCOMPILE_SKIP_OPTIMIZATION
    } else {
        D3DCOMPILE_OPTIMIZATION_LEVEL3
    };

    let mut code: Option<ID3DBlob> = None;
    let mut errors: Option<ID3DBlob> = None;
    let result = unsafe {
        D3DCompile(
            source.code.as_ptr() as _,
            source.code.len(),
            PCSTR(file_name.as_ptr() as *const u8),
            Some(macros.as_ptr()),
            None,
            PCSTR(entry_point.as_ptr() as *const u8),
            PCSTR(profile.as_ptr() as *const u8),
            flags,
            0,
            &mut code,
            Some(&mut errors),
        )
    };

    if let Err(e) = result {
        let message = match &errors {
            Some(blob) => String::from_utf8_lossy(unsafe { blob_bytes(blob) }).trim_end().to_string(),
            None => format!("{:?}", e),
        };
        return Err(GraphicsError::ShaderCompilation(format!(
            "{} ({} {}): {}",
            source.file_name, source.entry_point, stage, message
        ))
        .into());
    }

    let code = code.ok_or_else(|| GraphicsError::ShaderCompilation("D3DCompile returned no bytecode".to_string()))?;
    Ok(unsafe { blob_bytes(&code) }.to_vec())
}
