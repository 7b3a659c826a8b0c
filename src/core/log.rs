//! 日志系统模块
//!
//! 基于 `tracing` 提供结构化的日志记录功能。
//! RHI 内部统一使用 `distrhi::rhi` / `distrhi::native` 两个 target：
//! 前者记录引擎侧对象的生命周期，后者记录原生调用及其失败。
//!
//! ```no_run
//! use dist_rhi::core::{log, LogLevel};
//!
//! log::init_logger(LogLevel::Debug, false, None).unwrap();
//! tracing::info!(width = 800, height = 600, "Window created");
//! ```

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use std::path::Path;

use super::config::LogLevel;
use super::error::{Result, RhiError};

/// 初始化日志系统
///
/// 程序开始时调用一次。重复初始化返回 [`RhiError::Log`]。
/// 若设置了 `RUST_LOG` 环境变量，则以它为准，否则使用 `level`。
///
/// * `level` - 日志级别
/// * `file_output` - 是否同时输出到文件（每天滚动）
/// * `log_file_path` - 日志文件路径，默认 "distrhi.log"
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true);

    let result = if file_output {
        let log_path = log_file_path.unwrap_or("distrhi.log");
        let path = Path::new(log_path);
        let directory = path.parent().unwrap_or(Path::new("."));
        let filename = path.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("distrhi.log");

        let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, filename);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()
    };

    result.map_err(|e| RhiError::Log(e.to_string()))
}

/// `EnvFilter` 使用的指令字符串
pub fn filter_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// RHI 对象日志 - Debug 级别
#[macro_export]
macro_rules! rhi_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "distrhi::rhi", $($arg)*)
    };
}

/// RHI 对象日志 - Warn 级别
#[macro_export]
macro_rules! rhi_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "distrhi::rhi", $($arg)*)
    };
}

/// 原生调用失败 - Error 级别
#[macro_export]
macro_rules! native_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "distrhi::native", $($arg)*)
    };
}

/// 原生调用跟踪 - Trace 级别
#[macro_export]
macro_rules! native_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "distrhi::native", $($arg)*)
    };
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(filter_directive(LogLevel::Trace), "trace");
    }
}
