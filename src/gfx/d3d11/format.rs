//! RHI 枚举到 D3D11 / DXGI 枚举的转换表

use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::rhi::state::{
    AddressMode, BlendFactor, BlendOp, ComparisonFunc, CullMode, FillMode, Filter, StencilFaceDesc,
    StencilOp,
};
use crate::rhi::types::{
    BindFlags, BufferKind, IndexFormat, PixelFormat, PrimitiveTopology, ResourceUsage, VertexFormat,
};

pub fn pixel_format(format: PixelFormat) -> DXGI_FORMAT {
    match format {
        PixelFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        PixelFormat::Rgba8UnormSrgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        PixelFormat::Bgra8Unorm => DXGI_FORMAT_B8G8R8A8_UNORM,
        PixelFormat::Bgra8UnormSrgb => DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
        PixelFormat::R8Unorm => DXGI_FORMAT_R8_UNORM,
        PixelFormat::Rg8Unorm => DXGI_FORMAT_R8G8_UNORM,
        PixelFormat::R16Float => DXGI_FORMAT_R16_FLOAT,
        PixelFormat::Rgba16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        PixelFormat::R32Float => DXGI_FORMAT_R32_FLOAT,
        PixelFormat::Rg32Float => DXGI_FORMAT_R32G32_FLOAT,
        PixelFormat::Rgba32Float => DXGI_FORMAT_R32G32B32A32_FLOAT,
        PixelFormat::Depth16Unorm => DXGI_FORMAT_D16_UNORM,
        PixelFormat::Depth24UnormStencil8 => DXGI_FORMAT_D24_UNORM_S8_UINT,
        PixelFormat::Depth32Float => DXGI_FORMAT_D32_FLOAT,
    }
}

/// 交换链后备缓冲区格式的反查；不认识的格式返回 `None`
pub fn from_dxgi(format: DXGI_FORMAT) -> Option<PixelFormat> {
    match format {
        DXGI_FORMAT_R8G8B8A8_UNORM => Some(PixelFormat::Rgba8Unorm),
        DXGI_FORMAT_R8G8B8A8_UNORM_SRGB => Some(PixelFormat::Rgba8UnormSrgb),
        DXGI_FORMAT_B8G8R8A8_UNORM => Some(PixelFormat::Bgra8Unorm),
        DXGI_FORMAT_B8G8R8A8_UNORM_SRGB => Some(PixelFormat::Bgra8UnormSrgb),
        DXGI_FORMAT_R16G16B16A16_FLOAT => Some(PixelFormat::Rgba16Float),
        _ => None,
    }
}

pub fn vertex_format(format: VertexFormat) -> DXGI_FORMAT {
    match format {
        VertexFormat::Float => DXGI_FORMAT_R32_FLOAT,
        VertexFormat::Float2 => DXGI_FORMAT_R32G32_FLOAT,
        VertexFormat::Float3 => DXGI_FORMAT_R32G32B32_FLOAT,
        VertexFormat::Float4 => DXGI_FORMAT_R32G32B32A32_FLOAT,
        VertexFormat::UByte4Norm => DXGI_FORMAT_R8G8B8A8_UNORM,
        VertexFormat::UInt => DXGI_FORMAT_R32_UINT,
        VertexFormat::Int4 => DXGI_FORMAT_R32G32B32A32_SINT,
    }
}

pub fn index_format(format: IndexFormat) -> DXGI_FORMAT {
    match format {
        IndexFormat::U16 => DXGI_FORMAT_R16_UINT,
        IndexFormat::U32 => DXGI_FORMAT_R32_UINT,
    }
}

pub fn topology(topology: PrimitiveTopology) -> D3D_PRIMITIVE_TOPOLOGY {
    match topology {
        PrimitiveTopology::PointList => D3D11_PRIMITIVE_TOPOLOGY_POINTLIST,
        PrimitiveTopology::LineList => D3D11_PRIMITIVE_TOPOLOGY_LINELIST,
        PrimitiveTopology::LineStrip => D3D11_PRIMITIVE_TOPOLOGY_LINESTRIP,
        PrimitiveTopology::TriangleList => D3D11_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
        PrimitiveTopology::TriangleStrip => D3D11_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
    }
}

pub fn usage(usage: ResourceUsage) -> D3D11_USAGE {
    match usage {
        ResourceUsage::Immutable => D3D11_USAGE_IMMUTABLE,
        ResourceUsage::Default => D3D11_USAGE_DEFAULT,
        ResourceUsage::Dynamic => D3D11_USAGE_DYNAMIC,
    }
}

/// 动态资源需要 CPU 写权限
pub fn cpu_access(usage: ResourceUsage) -> u32 {
    match usage {
        ResourceUsage::Dynamic => D3D11_CPU_ACCESS_WRITE.0 as u32,
        _ => 0,
    }
}

pub fn buffer_bind(kind: BufferKind) -> u32 {
    let flag = match kind {
        BufferKind::Vertex => D3D11_BIND_VERTEX_BUFFER,
        BufferKind::Index => D3D11_BIND_INDEX_BUFFER,
        BufferKind::Constant => D3D11_BIND_CONSTANT_BUFFER,
    };
    flag.0 as u32
}

pub fn texture_bind(bind: BindFlags) -> u32 {
    let mut flags = 0;
    if bind.contains(BindFlags::SHADER_RESOURCE) {
        flags |= D3D11_BIND_SHADER_RESOURCE.0 as u32;
    }
    if bind.contains(BindFlags::RENDER_TARGET) {
        flags |= D3D11_BIND_RENDER_TARGET.0 as u32;
    }
    if bind.contains(BindFlags::DEPTH_STENCIL) {
        flags |= D3D11_BIND_DEPTH_STENCIL.0 as u32;
    }
    flags
}

pub fn comparison(func: ComparisonFunc) -> D3D11_COMPARISON_FUNC {
    match func {
        ComparisonFunc::Never => D3D11_COMPARISON_NEVER,
        ComparisonFunc::Less => D3D11_COMPARISON_LESS,
        ComparisonFunc::Equal => D3D11_COMPARISON_EQUAL,
        ComparisonFunc::LessEqual => D3D11_COMPARISON_LESS_EQUAL,
        ComparisonFunc::Greater => D3D11_COMPARISON_GREATER,
        ComparisonFunc::NotEqual => D3D11_COMPARISON_NOT_EQUAL,
        ComparisonFunc::GreaterEqual => D3D11_COMPARISON_GREATER_EQUAL,
        ComparisonFunc::Always => D3D11_COMPARISON_ALWAYS,
    }
}

fn stencil_op(op: StencilOp) -> D3D11_STENCIL_OP {
    match op {
        StencilOp::Keep => D3D11_STENCIL_OP_KEEP,
        StencilOp::Zero => D3D11_STENCIL_OP_ZERO,
        StencilOp::Replace => D3D11_STENCIL_OP_REPLACE,
        StencilOp::IncrementSaturate => D3D11_STENCIL_OP_INCR_SAT,
        StencilOp::DecrementSaturate => D3D11_STENCIL_OP_DECR_SAT,
        StencilOp::Invert => D3D11_STENCIL_OP_INVERT,
        StencilOp::Increment => D3D11_STENCIL_OP_INCR,
        StencilOp::Decrement => D3D11_STENCIL_OP_DECR,
    }
}

pub fn stencil_face(face: &StencilFaceDesc) -> D3D11_DEPTH_STENCILOP_DESC {
    D3D11_DEPTH_STENCILOP_DESC {
        StencilFailOp: stencil_op(face.fail_op),
        StencilDepthFailOp: stencil_op(face.depth_fail_op),
        StencilPassOp: stencil_op(face.pass_op),
        StencilFunc: comparison(face.func),
    }
}

pub fn fill_mode(mode: FillMode) -> D3D11_FILL_MODE {
    match mode {
        FillMode::Solid => D3D11_FILL_SOLID,
        FillMode::Wireframe => D3D11_FILL_WIREFRAME,
    }
}

pub fn cull_mode(mode: CullMode) -> D3D11_CULL_MODE {
    match mode {
        CullMode::None => D3D11_CULL_NONE,
        CullMode::Front => D3D11_CULL_FRONT,
        CullMode::Back => D3D11_CULL_BACK,
    }
}

pub fn blend_factor(factor: BlendFactor) -> D3D11_BLEND {
    match factor {
        BlendFactor::Zero => D3D11_BLEND_ZERO,
        BlendFactor::One => D3D11_BLEND_ONE,
        BlendFactor::SrcColor => D3D11_BLEND_SRC_COLOR,
        BlendFactor::InvSrcColor => D3D11_BLEND_INV_SRC_COLOR,
        BlendFactor::SrcAlpha => D3D11_BLEND_SRC_ALPHA,
        BlendFactor::InvSrcAlpha => D3D11_BLEND_INV_SRC_ALPHA,
        BlendFactor::DestAlpha => D3D11_BLEND_DEST_ALPHA,
        BlendFactor::InvDestAlpha => D3D11_BLEND_INV_DEST_ALPHA,
        BlendFactor::DestColor => D3D11_BLEND_DEST_COLOR,
        BlendFactor::InvDestColor => D3D11_BLEND_INV_DEST_COLOR,
        BlendFactor::SrcAlphaSaturate => D3D11_BLEND_SRC_ALPHA_SAT,
        BlendFactor::Constant => D3D11_BLEND_BLEND_FACTOR,
        BlendFactor::InvConstant => D3D11_BLEND_INV_BLEND_FACTOR,
    }
}

pub fn blend_op(op: BlendOp) -> D3D11_BLEND_OP {
    match op {
        BlendOp::Add => D3D11_BLEND_OP_ADD,
        BlendOp::Subtract => D3D11_BLEND_OP_SUBTRACT,
        BlendOp::ReverseSubtract => D3D11_BLEND_OP_REV_SUBTRACT,
        BlendOp::Min => D3D11_BLEND_OP_MIN,
        BlendOp::Max => D3D11_BLEND_OP_MAX,
    }
}

pub fn filter(filter: Filter) -> D3D11_FILTER {
    match filter {
        Filter::MinMagMipPoint => D3D11_FILTER_MIN_MAG_MIP_POINT,
        Filter::MinMagLinearMipPoint => D3D11_FILTER_MIN_MAG_LINEAR_MIP_POINT,
        Filter::MinMagMipLinear => D3D11_FILTER_MIN_MAG_MIP_LINEAR,
        Filter::Anisotropic => D3D11_FILTER_ANISOTROPIC,
        Filter::ComparisonMinMagMipLinear => D3D11_FILTER_COMPARISON_MIN_MAG_MIP_LINEAR,
    }
}

pub fn address_mode(mode: AddressMode) -> D3D11_TEXTURE_ADDRESS_MODE {
    match mode {
        AddressMode::Wrap => D3D11_TEXTURE_ADDRESS_WRAP,
        AddressMode::Mirror => D3D11_TEXTURE_ADDRESS_MIRROR,
        AddressMode::Clamp => D3D11_TEXTURE_ADDRESS_CLAMP,
        AddressMode::Border => D3D11_TEXTURE_ADDRESS_BORDER,
        AddressMode::MirrorOnce => D3D11_TEXTURE_ADDRESS_MIRROR_ONCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_buffer_formats_round_trip() {
        for format in [PixelFormat::Rgba8Unorm, PixelFormat::Bgra8Unorm, PixelFormat::Bgra8UnormSrgb] {
            assert_eq!(from_dxgi(pixel_format(format)), Some(format));
        }
        assert_eq!(from_dxgi(DXGI_FORMAT_D32_FLOAT), None);
    }

    #[test]
    fn test_bind_flags_combine() {
        let flags = texture_bind(BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE);
        assert_eq!(
            flags,
            D3D11_BIND_RENDER_TARGET.0 as u32 | D3D11_BIND_SHADER_RESOURCE.0 as u32
        );
        assert_eq!(cpu_access(ResourceUsage::Immutable), 0);
    }
}
