//! 错误处理模块
//!
//! 定义了 RHI 中使用的统一错误类型。
//!
//! 原生调用失败时，调用方先用 `tracing::error!` 记录日志，
//! 然后把失败包装成 [`RhiError::Graphics`] 向上返回。没有重试，也没有部分成功的语义。

use std::fmt;

/// RHI 统一的 Result 类型
pub type Result<T> = std::result::Result<T, RhiError>;

/// DistRHI 的错误类型
#[derive(Debug)]
pub enum RhiError {
    /// 配置错误
    Config(ConfigError),

    /// 图形 API 错误
    Graphics(GraphicsError),

    /// IO 错误
    Io(std::io::Error),

    /// 日志系统错误
    Log(String),

    /// 初始化错误
    Initialization(String),

    /// 运行时错误
    Runtime(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置项缺失
    MissingField(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// 设备创建失败
    DeviceCreation(String),

    /// 交换链错误
    SwapchainError(String),

    /// 着色器编译失败（包含编译器输出）
    ShaderCompilation(String),

    /// 资源创建失败
    ResourceCreation(String),

    /// 渲染命令执行失败
    CommandExecution(String),

    /// 描述符或参数不合法，调用没有到达原生 API
    InvalidDescriptor(String),
}

impl fmt::Display for RhiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RhiError::Config(e) => write!(f, "Configuration error: {}", e),
            RhiError::Graphics(e) => write!(f, "Graphics error: {}", e),
            RhiError::Io(e) => write!(f, "IO error: {}", e),
            RhiError::Log(msg) => write!(f, "Log error: {}", msg),
            RhiError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
            RhiError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {}", field),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::DeviceCreation(msg) => write!(f, "Device creation failed: {}", msg),
            GraphicsError::SwapchainError(msg) => write!(f, "Swapchain error: {}", msg),
            GraphicsError::ShaderCompilation(msg) => write!(f, "Shader compilation failed: {}", msg),
            GraphicsError::ResourceCreation(msg) => write!(f, "Resource creation failed: {}", msg),
            GraphicsError::CommandExecution(msg) => write!(f, "Command execution failed: {}", msg),
            GraphicsError::InvalidDescriptor(msg) => write!(f, "Invalid descriptor: {}", msg),
        }
    }
}

impl std::error::Error for RhiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RhiError::Io(e) => Some(e),
            RhiError::Config(e) => Some(e),
            RhiError::Graphics(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for GraphicsError {}

impl From<std::io::Error> for RhiError {
    fn from(err: std::io::Error) -> Self {
        RhiError::Io(err)
    }
}

impl From<ConfigError> for RhiError {
    fn from(err: ConfigError) -> Self {
        RhiError::Config(err)
    }
}

impl From<GraphicsError> for RhiError {
    fn from(err: GraphicsError) -> Self {
        RhiError::Graphics(err)
    }
}

impl RhiError {
    /// 快捷构造：资源创建失败
    pub fn resource(msg: impl Into<String>) -> Self {
        RhiError::Graphics(GraphicsError::ResourceCreation(msg.into()))
    }

    /// 快捷构造：描述符不合法
    pub fn invalid(msg: impl Into<String>) -> Self {
        RhiError::Graphics(GraphicsError::InvalidDescriptor(msg.into()))
    }

    /// 快捷构造：命令执行失败
    pub fn command(msg: impl Into<String>) -> Self {
        RhiError::Graphics(GraphicsError::CommandExecution(msg.into()))
    }

    /// 是否为图形错误中的某一类
    pub fn graphics(&self) -> Option<&GraphicsError> {
        match self {
            RhiError::Graphics(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphics_error_display() {
        let err: RhiError = GraphicsError::ShaderCompilation("X3000: syntax error".into()).into();
        assert_eq!(
            err.to_string(),
            "Graphics error: Shader compilation failed: X3000: syntax error"
        );
    }

    #[test]
    fn test_io_error_has_source() {
        let err: RhiError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_shortcut_constructors() {
        assert!(matches!(
            RhiError::invalid("x").graphics(),
            Some(GraphicsError::InvalidDescriptor(_))
        ));
        assert!(RhiError::Runtime("x".into()).graphics().is_none());
    }
}
