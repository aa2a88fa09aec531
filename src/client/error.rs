//! 扫描客户端错误类型
//!
//! 构建阶段的配置错误与请求阶段的传输错误分开定义，
//! 两者都不会在内部重试。

use std::path::PathBuf;
use thiserror::Error;

/// 配置错误
///
/// 由 `ScanClientFactory::build` 同步返回，此时不会产生客户端。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// 超时必须为正数
    #[error("invalid timeout: must be greater than 0ms")]
    InvalidTimeout,

    /// 不支持的代理协议
    #[error("proxy: unknown scheme: {0}")]
    UnknownScheme(String),

    /// 代理 URL 缺少必要部分
    #[error("invalid proxy url: {0}")]
    InvalidProxy(String),

    /// 客户端证书无法读取或解析
    #[error("client certificate {}: {reason}", .path.display())]
    ClientCertificate { path: PathBuf, reason: String },

    /// CA 证书无法读取或解析
    #[error("ca certificate {}: {reason}", .path.display())]
    CaCertificate { path: PathBuf, reason: String },

    /// 启用 cookie jar 且提供了种子 cookie，但没有作用域 URL
    #[error("seed cookies require a seed cookie url when the cookie jar is enabled")]
    MissingSeedCookieUrl,

    /// cookie 无法放入请求头
    #[error("invalid cookie {name:?}: {reason}")]
    InvalidCookie { name: String, reason: String },

    /// 自定义请求头非法
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// reqwest 客户端构建失败
    #[error("failed to build http client: {0}")]
    ClientBuild(String),
}

/// 传输错误
///
/// 由 `ScanClient::get` 返回，表示没有拿到可用的响应。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// 请求超时
    #[error("request timeout: exceeded {timeout_ms}ms (elapsed {elapsed_ms}ms)")]
    Timeout { timeout_ms: u64, elapsed_ms: u64 },

    /// 连接失败（拒绝连接、DNS、TLS 握手、代理）
    #[error("connection failed: {0}")]
    Connect(String),

    /// 其他请求错误
    #[error("request failed: {0}")]
    Request(String),

    /// 目标 URL 无法解析
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// 是否为超时错误
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }

    /// 将 reqwest 错误归类
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_ms: u64, elapsed_ms: u64) -> Self {
        if err.is_timeout() {
            TransportError::Timeout {
                timeout_ms,
                elapsed_ms,
            }
        } else if err.is_connect() {
            TransportError::Connect(error_chain(&err))
        } else {
            TransportError::Request(error_chain(&err))
        }
    }
}

/// 拼接错误链，reqwest 的顶层信息通常不包含根因
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
