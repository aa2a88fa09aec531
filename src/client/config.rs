//! 扫描客户端配置
//!
//! 构建一次后只读，可以直接从配置文件反序列化。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// 默认请求超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// 种子 cookie
///
/// 只当作不透明的键值对处理。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

impl SeedCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expires: None,
        }
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// 已过期的 cookie 不会被发送
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expires| expires <= Utc::now())
    }
}

/// 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// 单次请求超时（毫秒），必须大于 0
    pub timeout_ms: u64,
    /// SOCKS5 代理地址
    pub proxy_url: Option<Url>,
    /// PEM 格式的客户端证书（证书 + 私钥）
    pub client_cert_path: Option<PathBuf>,
    /// 额外信任的 CA 证书（PEM，可包含多个）
    pub ca_cert_path: Option<PathBuf>,
    /// 是否使用 cookie jar 保存服务端下发的 cookie
    pub use_cookie_jar: bool,
    /// 每个请求都携带的 cookie
    pub seed_cookies: Vec<SeedCookie>,
    /// 种子 cookie 在 jar 中的作用域
    pub seed_cookie_url: Option<Url>,
    /// User-Agent 请求头
    pub user_agent: Option<String>,
    /// 额外的静态请求头，按顺序发送
    pub headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            proxy_url: None,
            client_cert_path: None,
            ca_cert_path: None,
            use_cookie_jar: false,
            seed_cookies: Vec::new(),
            seed_cookie_url: None,
            user_agent: None,
            headers: Vec::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            ..Self::default()
        }
    }

    pub fn with_proxy_url(mut self, proxy_url: Option<Url>) -> Self {
        self.proxy_url = proxy_url;
        self
    }

    pub fn with_client_cert_path(mut self, path: Option<PathBuf>) -> Self {
        self.client_cert_path = path;
        self
    }

    pub fn with_ca_cert_path(mut self, path: Option<PathBuf>) -> Self {
        self.ca_cert_path = path;
        self
    }

    pub fn with_cookie_jar(mut self, use_cookie_jar: bool) -> Self {
        self.use_cookie_jar = use_cookie_jar;
        self
    }

    pub fn with_seed_cookies(mut self, cookies: Vec<SeedCookie>, url: Option<Url>) -> Self {
        self.seed_cookies = cookies;
        self.seed_cookie_url = url;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 获取请求超时 Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
