//! 扫描 HTTP 客户端
//!
//! 按配置创建带超时、可选 SOCKS5 代理、可选客户端证书和 cookie 策略的客户端

mod config;
mod cookie_jar;
mod cookie_policy;
mod error;
mod factory;
mod proxy;

pub use config::{ClientConfig, SeedCookie, DEFAULT_TIMEOUT_MS};
pub use cookie_jar::ScanCookieJar;
pub use cookie_policy::CookiePolicy;
pub use error::{ConfigError, TransportError};
pub use factory::{ScanClient, ScanClientFactory};
pub use proxy::{Dialer, Socks5Resolve};
