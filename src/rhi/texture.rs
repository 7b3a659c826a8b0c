//! 纹理与采样器
//!
//! - [`Texture2D`]：着色器可读的 2D 纹理，自带 SRV
//! - [`RenderTarget`]：渲染目标，持有 RTV，可选 SRV（渲染到纹理）
//! - [`DepthStencil`]：深度模板缓冲，持有 DSV
//! - [`Sampler`]：采样器状态
//!
//! 三种纹理共享同一个内部结构，视图随纹理一起创建、一起释放。

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use crate::core::error::{Result, RhiError};
use crate::rhi::backend::Backend;
use crate::rhi::device::{logged, Device};
use crate::rhi::state::SamplerDesc;
use crate::rhi::types::{BindFlags, PixelFormat, ResourceId, ResourceUsage, TextureDesc};
use crate::rhi_debug;

struct TextureInner<B: Backend> {
    id: ResourceId,
    label: String,
    desc: TextureDesc,
    texture: B::Texture,
    srv: Option<B::ShaderResourceView>,
    rtv: Option<B::RenderTargetView>,
    dsv: Option<B::DepthStencilView>,
    backend: Rc<B>,
}

impl<B: Backend> Drop for TextureInner<B> {
    fn drop(&mut self) {
        rhi_debug!(id = %self.id, label = %self.label, "Texture released");
    }
}

impl<B: Backend> TextureInner<B> {
    fn create(device: &Device<B>, label: &str, desc: TextureDesc, data: Option<&[u8]>) -> Result<Self> {
        desc.validate(data)?;
        let backend = device.backend();

        let texture = logged("create texture", label, backend.create_texture_2d(&desc, data))?;
        Self::with_views(device, label, desc, texture)
    }

    fn with_views(device: &Device<B>, label: &str, desc: TextureDesc, texture: B::Texture) -> Result<Self> {
        let backend = device.backend();
        let srv = if desc.bind.contains(BindFlags::SHADER_RESOURCE) {
            Some(logged(
                "create shader resource view",
                label,
                backend.create_shader_resource_view(&texture, &desc),
            )?)
        } else {
            None
        };
        let rtv = if desc.bind.contains(BindFlags::RENDER_TARGET) {
            Some(logged(
                "create render target view",
                label,
                backend.create_render_target_view(&texture, &desc),
            )?)
        } else {
            None
        };
        let dsv = if desc.bind.contains(BindFlags::DEPTH_STENCIL) {
            Some(logged(
                "create depth stencil view",
                label,
                backend.create_depth_stencil_view(&texture, &desc),
            )?)
        } else {
            None
        };

        let id = device.next_id();
        rhi_debug!(
            id = %id,
            label,
            width = desc.width,
            height = desc.height,
            format = ?desc.format,
            "Texture created"
        );

        Ok(Self {
            id,
            label: label.to_string(),
            desc,
            texture,
            srv,
            rtv,
            dsv,
            backend: device.shared_backend(),
        })
    }
}

macro_rules! texture_handle {
    ($name:ident) => {
        pub struct $name<B: Backend> {
            inner: Rc<TextureInner<B>>,
        }

        impl<B: Backend> Clone for $name<B> {
            fn clone(&self) -> Self {
                Self { inner: Rc::clone(&self.inner) }
            }
        }

        impl<B: Backend> fmt::Debug for $name<B> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("id", &self.inner.id)
                    .field("label", &self.inner.label)
                    .field("desc", &self.inner.desc)
                    .finish()
            }
        }

        impl<B: Backend> $name<B> {
            pub fn id(&self) -> ResourceId {
                self.inner.id
            }

            pub fn label(&self) -> &str {
                &self.inner.label
            }

            pub fn desc(&self) -> &TextureDesc {
                &self.inner.desc
            }

            pub fn width(&self) -> u32 {
                self.inner.desc.width
            }

            pub fn height(&self) -> u32 {
                self.inner.desc.height
            }

            pub fn native(&self) -> &B::Texture {
                &self.inner.texture
            }

            /// 当前存活的句柄数量
            pub fn handle_count(&self) -> usize {
                Rc::strong_count(&self.inner)
            }
        }
    };
}

texture_handle!(Texture2D);
texture_handle!(RenderTarget);
texture_handle!(DepthStencil);

impl<B: Backend> Texture2D<B> {
    pub(crate) fn create(device: &Device<B>, label: &str, desc: TextureDesc, data: Option<&[u8]>) -> Result<Self> {
        if desc.bind != BindFlags::SHADER_RESOURCE {
            return Err(RhiError::invalid(format!(
                "Texture2D '{}' must be bound as shader resource only, got {:?}",
                label, desc.bind
            )));
        }
        Ok(Self {
            inner: Rc::new(TextureInner::create(device, label, desc, data)?),
        })
    }

    /// 从 RGBA8 像素创建不可变纹理
    pub fn from_rgba8(device: &Device<B>, label: &str, width: u32, height: u32, pixels: &[u8], srgb: bool) -> Result<Self> {
        let format = if srgb { PixelFormat::Rgba8UnormSrgb } else { PixelFormat::Rgba8Unorm };
        let desc = TextureDesc {
            usage: ResourceUsage::Immutable,
            ..TextureDesc::sampled(width, height, format)
        };
        Self::create(device, label, desc, Some(pixels))
    }

    /// 用 `image` 解码图片文件，转换为 RGBA8
    pub(crate) fn load<P: AsRef<Path>>(device: &Device<B>, path: P, srgb: bool) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| RhiError::resource(format!("failed to load image {}: {}", path.display(), e)))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        let label = path.file_name().and_then(|n| n.to_str()).unwrap_or("image");
        Self::from_rgba8(device, label, width, height, image.as_raw(), srgb)
    }

    /// 覆盖写入 mip 0
    pub fn update(&self, data: &[u8]) -> Result<()> {
        let desc = &self.inner.desc;
        if desc.usage == ResourceUsage::Immutable {
            return Err(RhiError::invalid(format!("texture '{}' is immutable", self.inner.label)));
        }
        desc.validate_data(data)?;
        logged(
            "update texture",
            &self.inner.label,
            self.inner.backend.write_texture_2d(&self.inner.texture, desc, data),
        )
    }

    pub fn shader_resource_view(&self) -> &B::ShaderResourceView {
        self.inner.srv.as_ref().expect("Texture2D always owns a shader resource view")
    }
}

impl<B: Backend> RenderTarget<B> {
    pub(crate) fn create(
        device: &Device<B>,
        label: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
        shader_readable: bool,
    ) -> Result<Self> {
        let mut bind = BindFlags::RENDER_TARGET;
        if shader_readable {
            bind |= BindFlags::SHADER_RESOURCE;
        }
        let desc = TextureDesc {
            width,
            height,
            mip_levels: 1,
            format,
            bind,
            usage: ResourceUsage::Default,
        };
        Ok(Self {
            inner: Rc::new(TextureInner::create(device, label, desc, None)?),
        })
    }

    /// 包装交换链的后备缓冲区
    pub(crate) fn from_native(device: &Device<B>, label: &str, texture: B::Texture, desc: TextureDesc) -> Result<Self> {
        Ok(Self {
            inner: Rc::new(TextureInner::with_views(device, label, desc, texture)?),
        })
    }

    pub fn render_target_view(&self) -> &B::RenderTargetView {
        self.inner.rtv.as_ref().expect("RenderTarget always owns a render target view")
    }

    /// 仅当创建时 `shader_readable` 为 true 才有
    pub fn shader_resource_view(&self) -> Option<&B::ShaderResourceView> {
        self.inner.srv.as_ref()
    }
}

impl<B: Backend> DepthStencil<B> {
    pub(crate) fn create(device: &Device<B>, label: &str, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        let desc = TextureDesc {
            width,
            height,
            mip_levels: 1,
            format,
            bind: BindFlags::DEPTH_STENCIL,
            usage: ResourceUsage::Default,
        };
        Ok(Self {
            inner: Rc::new(TextureInner::create(device, label, desc, None)?),
        })
    }

    pub fn depth_stencil_view(&self) -> &B::DepthStencilView {
        self.inner.dsv.as_ref().expect("DepthStencil always owns a depth stencil view")
    }

    pub fn has_stencil(&self) -> bool {
        self.inner.desc.format.has_stencil()
    }
}

struct SamplerInner<B: Backend> {
    id: ResourceId,
    label: String,
    desc: SamplerDesc,
    native: B::SamplerState,
}

/// 采样器状态
pub struct Sampler<B: Backend> {
    inner: Rc<SamplerInner<B>>,
}

impl<B: Backend> Clone for Sampler<B> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<B: Backend> fmt::Debug for Sampler<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("desc", &self.inner.desc)
            .finish()
    }
}

impl<B: Backend> Sampler<B> {
    pub(crate) fn create(device: &Device<B>, label: &str, desc: SamplerDesc) -> Result<Self> {
        if !(1..=16).contains(&desc.max_anisotropy) {
            return Err(RhiError::invalid(format!(
                "max_anisotropy must be in 1..=16, got {}",
                desc.max_anisotropy
            )));
        }
        if desc.min_lod > desc.max_lod {
            return Err(RhiError::invalid("sampler min_lod is greater than max_lod"));
        }
        let native = logged("create sampler", label, device.backend().create_sampler_state(&desc))?;
        Ok(Self {
            inner: Rc::new(SamplerInner {
                id: device.next_id(),
                label: label.to_string(),
                desc,
                native,
            }),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    pub fn desc(&self) -> &SamplerDesc {
        &self.inner.desc
    }

    pub fn native(&self) -> &B::SamplerState {
        &self.inner.native
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GraphicsError;
    use crate::gfx::headless::{Call, HeadlessBackend, ObjectKind};

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(64, 64))
    }

    #[test]
    fn test_texture_owns_srv_only() {
        let device = device();
        let pixels = vec![255u8; 4 * 4 * 4];
        let texture = Texture2D::from_rgba8(&device, "white", 4, 4, &pixels, false).unwrap();
        assert_eq!(texture.desc().format, PixelFormat::Rgba8Unorm);
        assert_eq!(device.backend().live_objects(ObjectKind::ShaderResourceView), 1);
        assert_eq!(device.backend().live_objects(ObjectKind::RenderTargetView), 0);
    }

    #[test]
    fn test_texture_update_validates_size() {
        let device = device();
        let desc = TextureDesc::sampled(2, 2, PixelFormat::R8Unorm);
        let texture = device.create_texture_2d("mask", desc, None).unwrap();
        assert!(texture.update(&[0u8; 3]).is_err());
        texture.update(&[0u8; 4]).unwrap();
        assert!(device
            .backend()
            .calls()
            .contains(&Call::WriteTexture { texture: texture.native().id, len: 4 }));
    }

    #[test]
    fn test_oversized_texture_is_rejected_before_creation() {
        let device = device();
        let desc = TextureDesc::sampled(1 << 30, 1, PixelFormat::Rgba8Unorm);
        let err = device.create_texture_2d("huge", desc, None).unwrap_err();
        assert!(matches!(err.graphics(), Some(GraphicsError::InvalidDescriptor(_))));
        assert_eq!(device.backend().created_objects(ObjectKind::Texture), 0);
    }

    #[test]
    fn test_immutable_texture_rejects_update() {
        let device = device();
        let texture = Texture2D::from_rgba8(&device, "white", 1, 1, &[255; 4], true).unwrap();
        assert!(texture.update(&[0; 4]).is_err());
    }

    #[test]
    fn test_render_target_views() {
        let device = device();
        let offscreen = device
            .create_render_target("offscreen", 32, 16, PixelFormat::Rgba16Float, true)
            .unwrap();
        assert!(offscreen.shader_resource_view().is_some());

        let plain = device
            .create_render_target("plain", 32, 16, PixelFormat::Rgba8Unorm, false)
            .unwrap();
        assert!(plain.shader_resource_view().is_none());
        assert_eq!(device.backend().live_objects(ObjectKind::RenderTargetView), 2);
    }

    #[test]
    fn test_depth_stencil_requires_depth_format() {
        let device = device();
        assert!(device.create_depth_stencil("depth", 8, 8, PixelFormat::Rgba8Unorm).is_err());
        let depth = device
            .create_depth_stencil("depth", 8, 8, PixelFormat::Depth24UnormStencil8)
            .unwrap();
        assert!(depth.has_stencil());
    }

    #[test]
    fn test_views_released_with_texture() {
        let device = device();
        let target = device
            .create_render_target("offscreen", 8, 8, PixelFormat::Rgba8Unorm, true)
            .unwrap();
        assert_eq!(device.backend().live_objects(ObjectKind::Texture), 1);
        drop(target);
        assert_eq!(device.backend().live_objects(ObjectKind::Texture), 0);
        assert_eq!(device.backend().live_objects(ObjectKind::ShaderResourceView), 0);
        assert_eq!(device.backend().live_objects(ObjectKind::RenderTargetView), 0);
    }

    #[test]
    fn test_failed_view_creation_releases_texture() {
        let device = device();
        device.backend().fail_creation(ObjectKind::ShaderResourceView);
        let desc = TextureDesc::sampled(2, 2, PixelFormat::R8Unorm);
        assert!(device.create_texture_2d("mask", desc, None).is_err());
        assert_eq!(device.backend().live_objects(ObjectKind::Texture), 0);
    }

    #[test]
    fn test_load_texture_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let image = image::RgbaImage::from_fn(3, 2, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        });
        image.save(&path).unwrap();

        let device = device();
        let texture = device.load_texture(&path, true).unwrap();
        assert_eq!((texture.width(), texture.height()), (3, 2));
        assert_eq!(texture.desc().format, PixelFormat::Rgba8UnormSrgb);
        assert_eq!(texture.label(), "checker.png");

        assert!(device.load_texture(dir.path().join("missing.png"), false).is_err());
    }

    #[test]
    fn test_sampler_validation() {
        let device = device();
        let bad = SamplerDesc {
            max_anisotropy: 0,
            ..SamplerDesc::default()
        };
        assert!(device.create_sampler("bad", bad).is_err());
        assert!(device.create_sampler("linear", SamplerDesc::linear_wrap()).is_ok());
    }
}
