//! 着色器与输入布局
//!
//! HLSL 源码交给后端编译（D3D11 使用 `D3DCompile`），也可以直接提供预编译字节码。
//! 顶点着色器保留字节码，创建输入布局时需要其中的输入签名。

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use crate::core::error::{Result, RhiError};
use crate::rhi::backend::Backend;
use crate::rhi::device::{logged, Device};
use crate::rhi::types::{ResourceId, ShaderStage, VertexLayout};
use crate::rhi_debug;

/// HLSL 源码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlslSource {
    pub code: String,
    pub entry_point: String,
    /// 编译器报错时显示的文件名
    pub file_name: String,
    /// 预处理宏 `(name, value)`
    pub defines: Vec<(String, String)>,
}

impl HlslSource {
    pub fn new(code: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            entry_point: entry_point.into(),
            file_name: "memory.hlsl".to_string(),
            defines: Vec::new(),
        }
    }

    /// 从文件读取源码
    pub fn from_file<P: AsRef<Path>>(path: P, entry_point: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let code = std::fs::read_to_string(path)?;
        Ok(Self {
            file_name: path.display().to_string(),
            ..Self::new(code, entry_point)
        })
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.push((name.into(), value.into()));
        self
    }
}

/// 着色器来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    Hlsl(HlslSource),
    Bytecode(Vec<u8>),
}

impl ShaderSource {
    pub fn hlsl(code: impl Into<String>, entry_point: impl Into<String>) -> Self {
        ShaderSource::Hlsl(HlslSource::new(code, entry_point))
    }

    pub fn from_file<P: AsRef<Path>>(path: P, entry_point: impl Into<String>) -> Result<Self> {
        Ok(ShaderSource::Hlsl(HlslSource::from_file(path, entry_point)?))
    }

    fn compile_bytecode<B: Backend>(&self, backend: &B, stage: ShaderStage, label: &str) -> Result<Vec<u8>> {
        let bytecode = match self {
            ShaderSource::Hlsl(source) => logged(
                "compile shader",
                label,
                backend.compile_shader(source, stage),
            )?,
            ShaderSource::Bytecode(bytes) => bytes.clone(),
        };
        if bytecode.is_empty() {
            return Err(RhiError::invalid(format!("{} shader '{}' has empty bytecode", stage, label)));
        }
        Ok(bytecode)
    }
}

struct ShaderInner<N> {
    id: ResourceId,
    label: String,
    bytecode: Vec<u8>,
    native: N,
}

/// 顶点着色器
pub struct VertexShader<B: Backend> {
    inner: Rc<ShaderInner<B::VertexShader>>,
}

/// 像素着色器
pub struct PixelShader<B: Backend> {
    inner: Rc<ShaderInner<B::PixelShader>>,
}

macro_rules! shader_handle {
    ($name:ident, $native:ident, $stage:expr, $create:ident) => {
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
                    .field("bytecode_len", &self.inner.bytecode.len())
                    .finish()
            }
        }

        impl<B: Backend> $name<B> {
            pub(crate) fn create(device: &Device<B>, label: &str, source: &ShaderSource) -> Result<Self> {
                let backend = device.backend();
                let bytecode = source.compile_bytecode(backend, $stage, label)?;
                let native = logged(
                    concat!("create ", stringify!($name)),
                    label,
                    backend.$create(&bytecode),
                )?;
                let id = device.next_id();
                rhi_debug!(id = %id, label, stage = %$stage, bytes = bytecode.len(), "Shader created");
                Ok(Self {
                    inner: Rc::new(ShaderInner {
                        id,
                        label: label.to_string(),
                        bytecode,
                        native,
                    }),
                })
            }

            pub fn id(&self) -> ResourceId {
                self.inner.id
            }

            pub fn label(&self) -> &str {
                &self.inner.label
            }

            pub fn bytecode(&self) -> &[u8] {
                &self.inner.bytecode
            }

            pub fn native(&self) -> &B::$native {
                &self.inner.native
            }
        }
    };
}

shader_handle!(VertexShader, VertexShader, ShaderStage::Vertex, create_vertex_shader);
shader_handle!(PixelShader, PixelShader, ShaderStage::Pixel, create_pixel_shader);

struct InputLayoutInner<B: Backend> {
    id: ResourceId,
    layout: VertexLayout,
    native: B::InputLayout,
}

/// 输入布局
pub struct InputLayout<B: Backend> {
    inner: Rc<InputLayoutInner<B>>,
}

impl<B: Backend> Clone for InputLayout<B> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<B: Backend> fmt::Debug for InputLayout<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputLayout")
            .field("id", &self.inner.id)
            .field("layout", &self.inner.layout)
            .finish()
    }
}

impl<B: Backend> InputLayout<B> {
    pub(crate) fn create(
        device: &Device<B>,
        label: &str,
        layout: &VertexLayout,
        vertex_shader: &VertexShader<B>,
    ) -> Result<Self> {
        if layout.is_empty() {
            return Err(RhiError::invalid(format!("input layout '{}' has no attributes", label)));
        }
        let native = logged(
            "create input layout",
            label,
            device.backend().create_input_layout(layout, vertex_shader.bytecode()),
        )?;
        Ok(Self {
            inner: Rc::new(InputLayoutInner {
                id: device.next_id(),
                layout: layout.clone(),
                native,
            }),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.inner.layout
    }

    pub fn native(&self) -> &B::InputLayout {
        &self.inner.native
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GraphicsError;
    use crate::gfx::headless::{Call, HeadlessBackend};
    use crate::rhi::types::VertexFormat;

    const SOURCE: &str = "float4 VSMain(float3 p : POSITION) : SV_Position { return float4(p, 1); }\n\
                          float4 PSMain() : SV_Target { return 1; }";

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(64, 64))
    }

    #[test]
    fn test_compile_and_keep_bytecode() {
        let device = device();
        let vs = device
            .create_vertex_shader("vs", &ShaderSource::hlsl(SOURCE, "VSMain"))
            .unwrap();
        assert!(!vs.bytecode().is_empty());
        assert!(device.backend().calls().contains(&Call::CompileShader {
            stage: ShaderStage::Vertex,
            entry_point: "VSMain".to_string(),
        }));
    }

    #[test]
    fn test_missing_entry_point_fails_compilation() {
        let device = device();
        let err = device
            .create_pixel_shader("ps", &ShaderSource::hlsl(SOURCE, "Missing"))
            .unwrap_err();
        assert!(matches!(err.graphics(), Some(GraphicsError::ShaderCompilation(_))));
    }

    #[test]
    fn test_precompiled_bytecode_skips_compiler() {
        let device = device();
        device
            .create_pixel_shader("ps", &ShaderSource::Bytecode(vec![0x44, 0x58, 0x42, 0x43]))
            .unwrap();
        assert!(!device
            .backend()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::CompileShader { .. })));

        assert!(device.create_pixel_shader("empty", &ShaderSource::Bytecode(Vec::new())).is_err());
    }

    #[test]
    fn test_input_layout_requires_attributes() {
        let device = device();
        let vs = device
            .create_vertex_shader("vs", &ShaderSource::hlsl(SOURCE, "VSMain"))
            .unwrap();
        assert!(device.create_input_layout("empty", &VertexLayout::new(), &vs).is_err());

        let layout = VertexLayout::new().with("POSITION", 0, VertexFormat::Float3);
        let il = device.create_input_layout("pos", &layout, &vs).unwrap();
        assert_eq!(il.layout().stride(0), 12);
    }

    #[test]
    fn test_source_from_file_and_defines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shader.hlsl");
        std::fs::write(&path, SOURCE).unwrap();

        let source = HlslSource::from_file(&path, "PSMain").unwrap().with_define("USE_TINT", "1");
        assert_eq!(source.code, SOURCE);
        assert!(source.file_name.ends_with("shader.hlsl"));
        assert_eq!(source.defines, vec![("USE_TINT".to_string(), "1".to_string())]);

        assert!(ShaderSource::from_file(dir.path().join("missing.hlsl"), "PSMain").is_err());
    }
}
