//! 资源描述与基础类型
//!
//! 这些类型与具体图形 API 无关，后端在创建原生对象时把它们翻译成原生描述符
//! （D3D11 的翻译表在 `gfx::d3d11::format` 中）。

use std::fmt;

use bitflags::bitflags;

use crate::core::error::{Result, RhiError};

/// 设备内唯一的资源标识
///
/// 单调递增，永不复用，因此注册表中残留的旧标识不会与新资源混淆。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u64);

impl ResourceId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 着色器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    /// HLSL 编译目标（Shader Model 5.0）
    pub const fn profile(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_5_0",
            ShaderStage::Pixel => "ps_5_0",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Pixel => write!(f, "pixel"),
        }
    }
}

bitflags! {
    /// 纹理绑定标记
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindFlags: u32 {
        const SHADER_RESOURCE = 1 << 0;
        const RENDER_TARGET = 1 << 1;
        const DEPTH_STENCIL = 1 << 2;
    }
}

/// 资源使用方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceUsage {
    /// 创建后不可修改，必须提供初始数据
    Immutable,
    /// GPU 读写，CPU 通过 UpdateSubresource 更新
    Default,
    /// CPU 每帧写入（Map + WRITE_DISCARD）
    Dynamic,
}

/// 缓冲区类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Constant,
}

/// 缓冲区描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub kind: BufferKind,
    pub usage: ResourceUsage,
    /// 字节大小（常量缓冲区已对齐到 16 字节）
    pub size: u32,
    /// 单个元素的字节大小
    pub stride: u32,
}

/// 常量缓冲区大小对齐
pub const CONSTANT_BUFFER_ALIGNMENT: u32 = 16;

impl BufferDesc {
    /// 创建描述，常量缓冲区会向上对齐到 16 字节
    pub fn new(kind: BufferKind, usage: ResourceUsage, size: u32, stride: u32) -> Self {
        let size = if kind == BufferKind::Constant {
            align_up(size, CONSTANT_BUFFER_ALIGNMENT)
        } else {
            size
        };
        Self { kind, usage, size, stride }
    }

    pub fn validate(&self, has_initial_data: bool) -> Result<()> {
        if self.size == 0 {
            return Err(RhiError::invalid(format!("{:?} buffer must not be empty", self.kind)));
        }
        if self.usage == ResourceUsage::Immutable && !has_initial_data {
            return Err(RhiError::invalid("immutable buffers require initial data"));
        }
        if self.stride == 0 && self.kind != BufferKind::Constant {
            return Err(RhiError::invalid(format!("{:?} buffer stride must be non-zero", self.kind)));
        }
        Ok(())
    }
}

pub fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// 索引格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub const fn size(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// 可作为索引的整数类型
pub trait IndexType: bytemuck::Pod + private::Sealed {
    const FORMAT: IndexFormat;
}

impl IndexType for u16 {
    const FORMAT: IndexFormat = IndexFormat::U16;
}

impl IndexType for u32 {
    const FORMAT: IndexFormat = IndexFormat::U32;
}

mod private {
    pub trait Sealed {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
}

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    R8Unorm,
    Rg8Unorm,
    R16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    Depth16Unorm,
    Depth24UnormStencil8,
    Depth32Float,
}

impl PixelFormat {
    /// 每个像素占用的字节数
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::R8Unorm => 1,
            PixelFormat::Rg8Unorm | PixelFormat::R16Float | PixelFormat::Depth16Unorm => 2,
            PixelFormat::Rgba8Unorm
            | PixelFormat::Rgba8UnormSrgb
            | PixelFormat::Bgra8Unorm
            | PixelFormat::Bgra8UnormSrgb
            | PixelFormat::R32Float
            | PixelFormat::Depth24UnormStencil8
            | PixelFormat::Depth32Float => 4,
            PixelFormat::Rgba16Float | PixelFormat::Rg32Float => 8,
            PixelFormat::Rgba32Float => 16,
        }
    }

    pub const fn is_depth(self) -> bool {
        matches!(
            self,
            PixelFormat::Depth16Unorm | PixelFormat::Depth24UnormStencil8 | PixelFormat::Depth32Float
        )
    }

    pub const fn has_stencil(self) -> bool {
        matches!(self, PixelFormat::Depth24UnormStencil8)
    }

    pub const fn is_srgb(self) -> bool {
        matches!(self, PixelFormat::Rgba8UnormSrgb | PixelFormat::Bgra8UnormSrgb)
    }
}

/// D3D11 单边纹理尺寸上限（`D3D11_REQ_TEXTURE2D_U_OR_V_DIMENSION`）
pub const MAX_TEXTURE_DIMENSION: u32 = 16384;

/// 2D 纹理描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: PixelFormat,
    pub bind: BindFlags,
    pub usage: ResourceUsage,
}

impl TextureDesc {
    /// 单 mip 的可采样纹理
    pub fn sampled(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            mip_levels: 1,
            format,
            bind: BindFlags::SHADER_RESOURCE,
            usage: ResourceUsage::Default,
        }
    }

    /// mip 0 的字节大小
    pub fn byte_size(&self) -> Result<usize> {
        (self.row_pitch()? as usize)
            .checked_mul(self.height as usize)
            .ok_or_else(|| self.too_large())
    }

    /// mip 0 一行的字节数
    pub fn row_pitch(&self) -> Result<u32> {
        self.width
            .checked_mul(self.format.bytes_per_pixel())
            .ok_or_else(|| self.too_large())
    }

    fn too_large(&self) -> RhiError {
        RhiError::invalid(format!(
            "texture {}x{} {:?} is too large",
            self.width, self.height, self.format
        ))
    }

    pub fn validate(&self, initial_data: Option<&[u8]>) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RhiError::invalid(format!(
                "texture size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > MAX_TEXTURE_DIMENSION || self.height > MAX_TEXTURE_DIMENSION {
            return Err(RhiError::invalid(format!(
                "texture size {}x{} exceeds the {} texel limit",
                self.width, self.height, MAX_TEXTURE_DIMENSION
            )));
        }
        if self.mip_levels == 0 {
            return Err(RhiError::invalid("mip_levels must be at least 1"));
        }
        if self.bind.is_empty() {
            return Err(RhiError::invalid("texture has no bind flags"));
        }
        if self.bind.contains(BindFlags::DEPTH_STENCIL) {
            if !self.format.is_depth() {
                return Err(RhiError::invalid(format!(
                    "{:?} cannot be used as a depth-stencil format",
                    self.format
                )));
            }
            if self.bind != BindFlags::DEPTH_STENCIL {
                return Err(RhiError::invalid("depth-stencil textures cannot have other bind flags"));
            }
        } else if self.format.is_depth() {
            return Err(RhiError::invalid(format!(
                "depth format {:?} requires the depth-stencil bind flag",
                self.format
            )));
        }
        if self.usage == ResourceUsage::Immutable && initial_data.is_none() {
            return Err(RhiError::invalid("immutable textures require initial data"));
        }
        if self.usage == ResourceUsage::Dynamic && self.mip_levels != 1 {
            return Err(RhiError::invalid("dynamic textures must have exactly one mip level"));
        }
        if let Some(data) = initial_data {
            if self.mip_levels != 1 {
                return Err(RhiError::invalid("initial data is only accepted for single-mip textures"));
            }
            self.validate_data(data)?;
        }
        Ok(())
    }

    /// 检查 mip 0 数据长度
    pub fn validate_data(&self, data: &[u8]) -> Result<()> {
        let expected = self.byte_size()?;
        if data.len() != expected {
            return Err(RhiError::invalid(format!(
                "texture data is {} bytes, expected {} ({}x{} {:?})",
                data.len(),
                expected,
                self.width,
                self.height,
                self.format
            )));
        }
        Ok(())
    }
}

/// 顶点属性格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float,
    Float2,
    Float3,
    Float4,
    UByte4Norm,
    UInt,
    Int4,
}

impl VertexFormat {
    pub const fn size(self) -> u32 {
        match self {
            VertexFormat::Float | VertexFormat::UByte4Norm | VertexFormat::UInt => 4,
            VertexFormat::Float2 => 8,
            VertexFormat::Float3 => 12,
            VertexFormat::Float4 | VertexFormat::Int4 => 16,
        }
    }
}

/// 输入布局中的一个属性
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    /// HLSL 语义名，如 "POSITION"
    pub semantic: String,
    pub semantic_index: u32,
    pub format: VertexFormat,
    /// 相对顶点起始处的字节偏移
    pub offset: u32,
    /// 顶点缓冲区槽位
    pub slot: u32,
}

/// 顶点输入布局
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在槽位 0 末尾追加属性，偏移自动累加
    pub fn with(self, semantic: &str, semantic_index: u32, format: VertexFormat) -> Self {
        self.with_slot(0, semantic, semantic_index, format)
    }

    /// 在指定槽位末尾追加属性
    pub fn with_slot(mut self, slot: u32, semantic: &str, semantic_index: u32, format: VertexFormat) -> Self {
        let offset = self.stride(slot);
        self.attributes.push(VertexAttribute {
            semantic: semantic.to_string(),
            semantic_index,
            format,
            offset,
            slot,
        });
        self
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// 某个槽位的顶点步长
    pub fn stride(&self, slot: u32) -> u32 {
        self.attributes
            .iter()
            .filter(|a| a.slot == slot)
            .map(|a| a.offset + a.format.size())
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// 图元拓扑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// 视口
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// 覆盖整个目标的视口
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// 裁剪矩形（像素坐标，右下角不包含）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_buffer_alignment() {
        let desc = BufferDesc::new(BufferKind::Constant, ResourceUsage::Dynamic, 68, 68);
        assert_eq!(desc.size, 80);

        let desc = BufferDesc::new(BufferKind::Constant, ResourceUsage::Dynamic, 64, 64);
        assert_eq!(desc.size, 64);

        let desc = BufferDesc::new(BufferKind::Vertex, ResourceUsage::Default, 68, 4);
        assert_eq!(desc.size, 68);
    }

    #[test]
    fn test_immutable_buffer_requires_data() {
        let desc = BufferDesc::new(BufferKind::Vertex, ResourceUsage::Immutable, 64, 16);
        assert!(desc.validate(false).is_err());
        assert!(desc.validate(true).is_ok());
    }

    #[test]
    fn test_vertex_layout_offsets() {
        let layout = VertexLayout::new()
            .with("POSITION", 0, VertexFormat::Float3)
            .with("TEXCOORD", 0, VertexFormat::Float2)
            .with("COLOR", 0, VertexFormat::UByte4Norm)
            .with_slot(1, "TEXCOORD", 1, VertexFormat::Float4);

        let offsets: Vec<u32> = layout.attributes().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 20, 0]);
        assert_eq!(layout.stride(0), 24);
        assert_eq!(layout.stride(1), 16);
        assert_eq!(layout.stride(2), 0);
    }

    #[test]
    fn test_texture_validation() {
        let desc = TextureDesc::sampled(4, 2, PixelFormat::Rgba8Unorm);
        assert_eq!(desc.byte_size().unwrap(), 32);
        assert!(desc.validate(Some(&[0u8; 32])).is_ok());
        assert!(desc.validate(Some(&[0u8; 31])).is_err());

        let depth_as_color = TextureDesc::sampled(4, 4, PixelFormat::Depth32Float);
        assert!(depth_as_color.validate(None).is_err());

        let color_as_depth = TextureDesc {
            bind: BindFlags::DEPTH_STENCIL,
            ..TextureDesc::sampled(4, 4, PixelFormat::Rgba8Unorm)
        };
        assert!(color_as_depth.validate(None).is_err());

        let mips_with_data = TextureDesc {
            mip_levels: 3,
            ..TextureDesc::sampled(4, 2, PixelFormat::Rgba8Unorm)
        };
        assert!(mips_with_data.validate(Some(&[0u8; 32])).is_err());
    }

    #[test]
    fn test_pixel_format_properties() {
        assert_eq!(PixelFormat::Rgba32Float.bytes_per_pixel(), 16);
        assert_eq!(PixelFormat::R8Unorm.bytes_per_pixel(), 1);
        assert!(PixelFormat::Depth24UnormStencil8.has_stencil());
        assert!(!PixelFormat::Depth32Float.has_stencil());
        assert!(PixelFormat::Bgra8UnormSrgb.is_srgb());
    }

    #[test]
    fn test_texture_size_limits() {
        let at_limit = TextureDesc::sampled(MAX_TEXTURE_DIMENSION, 1, PixelFormat::R8Unorm);
        assert!(at_limit.validate(None).is_ok());

        let too_wide = TextureDesc::sampled(1 << 30, 1, PixelFormat::Rgba8Unorm);
        assert!(too_wide.validate(None).is_err());
        let too_tall = TextureDesc::sampled(1, MAX_TEXTURE_DIMENSION + 1, PixelFormat::R8Unorm);
        assert!(too_tall.validate(None).is_err());
    }

    #[test]
    fn test_texture_size_overflow_is_an_error() {
        let desc = TextureDesc::sampled(1 << 30, 1, PixelFormat::Rgba8Unorm);
        assert!(desc.row_pitch().is_err());
        assert!(desc.byte_size().is_err());
        assert!(desc.validate_data(&[0u8; 4]).is_err());

        let desc = TextureDesc::sampled(256, 4, PixelFormat::Rgba16Float);
        assert_eq!(desc.row_pitch().unwrap(), 2048);
        assert_eq!(desc.byte_size().unwrap(), 8192);
    }
}
