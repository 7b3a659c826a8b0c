//! 管线状态描述
//!
//! 深度模板、光栅化、混合和采样器的描述结构。
//! `Default` 与 D3D11 文档中的默认状态一致，
//! 这样未显式设置的管线与直接使用 D3D11 默认状态的行为相同。

use bitflags::bitflags;

/// 比较函数（深度测试、模板测试、比较采样）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// 模板操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementSaturate,
    DecrementSaturate,
    Invert,
    Increment,
    Decrement,
}

/// 单面模板设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceDesc {
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub func: ComparisonFunc,
}

impl Default for StencilFaceDesc {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            func: ComparisonFunc::Always,
        }
    }
}

/// 深度模板状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_func: ComparisonFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: StencilFaceDesc,
    pub back_face: StencilFaceDesc,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write: true,
            depth_func: ComparisonFunc::Less,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front_face: StencilFaceDesc::default(),
            back_face: StencilFaceDesc::default(),
        }
    }
}

impl DepthStencilDesc {
    /// 关闭深度测试与写入（UI、全屏后处理）
    pub fn disabled() -> Self {
        Self {
            depth_enable: false,
            depth_write: false,
            ..Self::default()
        }
    }
}

/// 填充模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillMode {
    Solid,
    Wireframe,
}

/// 背面剔除模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// 光栅化状态
///
/// 浮点字段按位比较：NaN 等于同一个 NaN，`-0.0` 与 `0.0` 不同。
#[derive(Debug, Clone, Copy)]
pub struct RasterizerDesc {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
}

impl PartialEq for RasterizerDesc {
    fn eq(&self, other: &Self) -> bool {
        self.fill_mode == other.fill_mode
            && self.cull_mode == other.cull_mode
            && self.front_counter_clockwise == other.front_counter_clockwise
            && self.depth_bias == other.depth_bias
            && self.depth_bias_clamp.to_bits() == other.depth_bias_clamp.to_bits()
            && self.slope_scaled_depth_bias.to_bits() == other.slope_scaled_depth_bias.to_bits()
            && self.depth_clip_enable == other.depth_clip_enable
            && self.scissor_enable == other.scissor_enable
            && self.multisample_enable == other.multisample_enable
            && self.antialiased_line_enable == other.antialiased_line_enable
    }
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            scissor_enable: false,
            multisample_enable: false,
            antialiased_line_enable: false,
        }
    }
}

/// 混合因子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DestAlpha,
    InvDestAlpha,
    DestColor,
    InvDestColor,
    SrcAlphaSaturate,
    /// 绑定时传入的常量混合因子
    Constant,
    InvConstant,
}

/// 混合运算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    /// 颜色写入掩码
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        const RED = 1;
        const GREEN = 2;
        const BLUE = 4;
        const ALPHA = 8;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

/// 单个渲染目标的混合设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetBlendDesc {
    pub blend_enable: bool,
    pub src_blend: BlendFactor,
    pub dest_blend: BlendFactor,
    pub blend_op: BlendOp,
    pub src_blend_alpha: BlendFactor,
    pub dest_blend_alpha: BlendFactor,
    pub blend_op_alpha: BlendOp,
    pub write_mask: ColorWriteMask,
}

impl Default for RenderTargetBlendDesc {
    fn default() -> Self {
        Self::opaque()
    }
}

impl RenderTargetBlendDesc {
    /// 不混合，直接覆盖
    pub fn opaque() -> Self {
        Self {
            blend_enable: false,
            src_blend: BlendFactor::One,
            dest_blend: BlendFactor::Zero,
            blend_op: BlendOp::Add,
            src_blend_alpha: BlendFactor::One,
            dest_blend_alpha: BlendFactor::Zero,
            blend_op_alpha: BlendOp::Add,
            write_mask: ColorWriteMask::ALL,
        }
    }

    /// 标准 alpha 混合：src * a + dst * (1 - a)
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_blend: BlendFactor::SrcAlpha,
            dest_blend: BlendFactor::InvSrcAlpha,
            src_blend_alpha: BlendFactor::One,
            dest_blend_alpha: BlendFactor::InvSrcAlpha,
            ..Self::opaque()
        }
    }

    /// 预乘 alpha
    pub fn premultiplied() -> Self {
        Self {
            blend_enable: true,
            src_blend: BlendFactor::One,
            dest_blend: BlendFactor::InvSrcAlpha,
            src_blend_alpha: BlendFactor::One,
            dest_blend_alpha: BlendFactor::InvSrcAlpha,
            ..Self::opaque()
        }
    }

    /// 加法混合
    pub fn additive() -> Self {
        Self {
            blend_enable: true,
            src_blend: BlendFactor::SrcAlpha,
            dest_blend: BlendFactor::One,
            src_blend_alpha: BlendFactor::One,
            dest_blend_alpha: BlendFactor::One,
            ..Self::opaque()
        }
    }
}

/// D3D11 最多同时绑定 8 个渲染目标
pub const MAX_RENDER_TARGETS: usize = 8;

/// 混合状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendDesc {
    pub alpha_to_coverage: bool,
    /// 为 false 时只使用 `render_targets[0]`
    pub independent_blend: bool,
    pub render_targets: [RenderTargetBlendDesc; MAX_RENDER_TARGETS],
}

impl BlendDesc {
    /// 所有目标使用同一设置
    pub fn uniform(target: RenderTargetBlendDesc) -> Self {
        Self {
            alpha_to_coverage: false,
            independent_blend: false,
            render_targets: [target; MAX_RENDER_TARGETS],
        }
    }
}

/// 纹理过滤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    MinMagMipPoint,
    MinMagLinearMipPoint,
    MinMagMipLinear,
    Anisotropic,
    /// 阴影贴图使用的比较过滤
    ComparisonMinMagMipLinear,
}

/// 纹理寻址模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Mirror,
    Clamp,
    Border,
    MirrorOnce,
}

/// 采样器描述
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mip_lod_bias: f32,
    /// 1..=16，仅在 `Filter::Anisotropic` 时生效
    pub max_anisotropy: u32,
    pub comparison: ComparisonFunc,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::MinMagMipLinear,
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
            address_w: AddressMode::Clamp,
            mip_lod_bias: 0.0,
            max_anisotropy: 1,
            comparison: ComparisonFunc::Never,
            border_color: [1.0, 1.0, 1.0, 1.0],
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

impl SamplerDesc {
    /// 三线性过滤 + 重复寻址
    pub fn linear_wrap() -> Self {
        Self {
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
            ..Self::default()
        }
    }

    /// 点采样 + 边缘截断
    pub fn point_clamp() -> Self {
        Self {
            filter: Filter::MinMagMipPoint,
            ..Self::default()
        }
    }
}
