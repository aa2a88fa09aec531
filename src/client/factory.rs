//! 扫描客户端工厂
//!
//! 把 `ClientConfig` 转换为可复用的 `ScanClient`：
//! 超时、SOCKS5 拨号、客户端证书和 cookie 策略都在构建时确定。

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, USER_AGENT};
use reqwest::{redirect, Certificate, Client, Identity, Response};
use std::fs;
use std::path::Path;
use std::time::Instant;
use url::Url;

use super::config::ClientConfig;
use super::cookie_jar::ScanCookieJar;
use super::cookie_policy::CookiePolicy;
use super::error::{ConfigError, TransportError};
use super::proxy::Dialer;

/// 扫描客户端工厂
#[derive(Debug, Clone)]
pub struct ScanClientFactory {
    config: ClientConfig,
}

impl ScanClientFactory {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 用工厂持有的配置创建客户端
    pub fn create_client(&self) -> Result<ScanClient, ConfigError> {
        Self::build(&self.config)
    }

    /// 创建扫描客户端
    ///
    /// # 返回
    /// - `Ok(ScanClient)`: 配置有效
    /// - `Err(ConfigError)`: 超时非法、代理协议不支持、证书无法加载、cookie 配置错误
    pub fn build(config: &ClientConfig) -> Result<ScanClient, ConfigError> {
        if config.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        let dialer = Dialer::from_proxy_url(config.proxy_url.as_ref())?;
        let policy = CookiePolicy::new(
            config.use_cookie_jar,
            &config.seed_cookies,
            config.seed_cookie_url.as_ref(),
        )?;

        let timeout = config.timeout();
        let mut builder = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(redirect::Policy::none())
            .default_headers(default_headers(config)?);

        builder = dialer.apply(builder)?;

        if let Some(path) = &config.client_cert_path {
            builder = builder.identity(load_identity(path)?);
        }

        if let Some(path) = &config.ca_cert_path {
            for root in load_ca_certificates(path)? {
                builder = builder.add_root_certificate(root);
            }
        }

        if let Some(jar) = policy.jar() {
            builder = builder.cookie_provider(jar.clone());
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::ClientBuild(e.to_string()))?;

        tracing::info!(
            "[SCAN_CLIENT] 客户端已创建: timeout={}ms, dialer={}, cookies={}, client_cert={}",
            config.timeout_ms,
            dialer.describe(),
            policy.describe(),
            config.client_cert_path.is_some()
        );

        Ok(ScanClient {
            client,
            policy,
            timeout_ms: config.timeout_ms,
        })
    }
}

/// 扫描客户端
///
/// 克隆后共享连接池和 cookie jar，可在多个任务间并发使用。
#[derive(Debug, Clone)]
pub struct ScanClient {
    client: Client,
    policy: CookiePolicy,
    timeout_ms: u64,
}

impl ScanClient {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        ScanClientFactory::build(config)
    }

    /// 发送 GET 请求，收到响应头后返回
    ///
    /// 每次调用独立计算超时，失败时不重试。
    pub async fn get(&self, url: &str) -> Result<Response, TransportError> {
        let target =
            Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;

        let mut request = self.client.get(target);
        if let Some(cookies) = self.policy.static_header() {
            request = request.header(COOKIE, cookies.clone());
        }

        let start = Instant::now();
        request.send().await.map_err(|e| {
            let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            let err = TransportError::from_reqwest(e, self.timeout_ms, elapsed_ms);
            tracing::debug!("[SCAN_CLIENT] GET {} 失败: {}", url, err);
            err
        })
    }

    /// 启用 jar 时返回 jar
    pub fn cookie_jar(&self) -> Option<&ScanCookieJar> {
        self.policy.jar().map(|jar| jar.as_ref())
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

fn default_headers(config: &ClientConfig) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();

    if let Some(user_agent) = &config.user_agent {
        let value = HeaderValue::from_str(user_agent)
            .map_err(|e| ConfigError::InvalidHeader(format!("User-Agent: {e}")))?;
        headers.insert(USER_AGENT, value);
    }

    for (name, value) in &config.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConfigError::InvalidHeader(format!("{name}: {e}")))?;
        if header_name == COOKIE {
            return Err(ConfigError::InvalidHeader(format!(
                "{name}: use seed cookies instead"
            )));
        }
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| ConfigError::InvalidHeader(format!("{name}: {e}")))?;
        headers.append(header_name, header_value);
    }

    Ok(headers)
}

/// 读取 PEM 客户端证书（证书链 + 私钥）
fn load_identity(path: &Path) -> Result<Identity, ConfigError> {
    let cert_error = |reason: String| ConfigError::ClientCertificate {
        path: path.to_path_buf(),
        reason,
    };

    let pem = fs::read(path).map_err(|e| cert_error(e.to_string()))?;

    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| cert_error(e.to_string()))?;
    if certs.is_empty() {
        return Err(cert_error("no certificate found".to_string()));
    }
    match rustls_pemfile::private_key(&mut pem.as_slice()) {
        Ok(Some(_)) => {}
        Ok(None) => return Err(cert_error("no private key found".to_string())),
        Err(e) => return Err(cert_error(e.to_string())),
    }

    Identity::from_pem(&pem).map_err(|e| cert_error(e.to_string()))
}

/// 读取额外信任的 CA 证书
fn load_ca_certificates(path: &Path) -> Result<Vec<Certificate>, ConfigError> {
    let ca_error = |reason: String| ConfigError::CaCertificate {
        path: path.to_path_buf(),
        reason,
    };

    let pem = fs::read(path).map_err(|e| ca_error(e.to_string()))?;
    let ders = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ca_error(e.to_string()))?;
    if ders.is_empty() {
        return Err(ca_error("no certificate found".to_string()));
    }

    ders.iter()
        .map(|der| Certificate::from_der(der).map_err(|e| ca_error(e.to_string())))
        .collect()
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::client::SeedCookie;
    use std::io::Write;

    #[test]
    fn test_zero_timeout_rejected() {
        let err = ScanClientFactory::build(&ClientConfig::new(0)).unwrap_err();
        assert_eq!(err, ConfigError::InvalidTimeout);
    }

    #[test]
    fn test_build_default() {
        let client = ScanClientFactory::new(ClientConfig::default()).create_client().unwrap();
        assert!(client.cookie_jar().is_none());
        assert_eq!(client.timeout_ms(), crate::client::DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_build_with_socks5_proxy() {
        let proxy = Url::parse("socks5://127.0.0.1:1080").unwrap();
        let config = ClientConfig::new(100).with_proxy_url(Some(proxy));
        assert!(ScanClientFactory::build(&config).is_ok());
    }

    #[test]
    fn test_build_with_invalid_proxy_scheme() {
        let proxy = Url::parse("potatoscheme://127.0.0.1:1080").unwrap();
        let config = ClientConfig::new(100).with_proxy_url(Some(proxy));
        let err = ScanClientFactory::build(&config).unwrap_err();
        assert!(err.to_string().contains("unknown scheme"));
    }

    #[test]
    fn test_build_with_jar_and_seed_cookies() {
        let url = Url::parse("http://example.com/").unwrap();
        let config = ClientConfig::new(100)
            .with_cookie_jar(true)
            .with_seed_cookies(vec![SeedCookie::new("a", "1")], Some(url.clone()));
        let client = ScanClientFactory::build(&config).unwrap();
        let jar = client.cookie_jar().unwrap();
        assert_eq!(jar.cookies_for(&url), vec![("a".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_build_with_jar_missing_seed_url() {
        let config = ClientConfig::new(100)
            .with_cookie_jar(true)
            .with_seed_cookies(vec![SeedCookie::new("a", "1")], None);
        let err = ScanClientFactory::build(&config).unwrap_err();
        assert_eq!(err, ConfigError::MissingSeedCookieUrl);
    }

    #[test]
    fn test_static_cookies_do_not_need_seed_url() {
        let config =
            ClientConfig::new(100).with_seed_cookies(vec![SeedCookie::new("a", "1")], None);
        let client = ScanClientFactory::build(&config).unwrap();
        assert!(client.cookie_jar().is_none());
    }

    #[test]
    fn test_invalid_headers() {
        let bad_name = ClientConfig::new(100).with_header("bad header", "x");
        assert!(matches!(
            ScanClientFactory::build(&bad_name),
            Err(ConfigError::InvalidHeader(_))
        ));

        let bad_value = ClientConfig::new(100).with_user_agent("line\nbreak");
        assert!(matches!(
            ScanClientFactory::build(&bad_value),
            Err(ConfigError::InvalidHeader(_))
        ));

        let cookie_header = ClientConfig::new(100).with_header("Cookie", "a=1");
        assert!(matches!(
            ScanClientFactory::build(&cookie_header),
            Err(ConfigError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_missing_client_certificate() {
        let config =
            ClientConfig::new(100).with_client_cert_path(Some("/nonexistent/client.pem".into()));
        let err = ScanClientFactory::build(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ClientCertificate { .. }));
    }

    #[test]
    fn test_client_certificate_without_key() {
        let certified =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(certified.cert.pem().as_bytes()).unwrap();

        let config =
            ClientConfig::new(100).with_client_cert_path(Some(file.path().to_path_buf()));
        let err = ScanClientFactory::build(&config).unwrap_err();
        assert!(err.to_string().contains("no private key found"));
    }

    #[test]
    fn test_client_certificate_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a certificate").unwrap();

        let config =
            ClientConfig::new(100).with_client_cert_path(Some(file.path().to_path_buf()));
        let err = ScanClientFactory::build(&config).unwrap_err();
        assert!(err.to_string().contains("no certificate found"));
    }

    #[test]
    fn test_client_certificate_loaded() {
        let certified =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(certified.cert.pem().as_bytes()).unwrap();
        file.write_all(certified.key_pair.serialize_pem().as_bytes()).unwrap();

        let config =
            ClientConfig::new(100).with_client_cert_path(Some(file.path().to_path_buf()));
        assert!(ScanClientFactory::build(&config).is_ok());
    }

    #[test]
    fn test_missing_ca_certificate() {
        let config =
            ClientConfig::new(100).with_ca_cert_path(Some("/nonexistent/ca.pem".into()));
        let err = ScanClientFactory::build(&config).unwrap_err();
        assert!(matches!(err, ConfigError::CaCertificate { .. }));
    }

    #[test]
    fn test_ca_certificate_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a certificate").unwrap();

        let config = ClientConfig::new(100).with_ca_cert_path(Some(file.path().to_path_buf()));
        let err = ScanClientFactory::build(&config).unwrap_err();
        assert!(matches!(err, ConfigError::CaCertificate { .. }));
        assert!(err.to_string().contains("no certificate found"));
    }

    #[test]
    fn test_ca_certificate_loaded() {
        let certified =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(certified.cert.pem().as_bytes()).unwrap();

        let config = ClientConfig::new(100).with_ca_cert_path(Some(file.path().to_path_buf()));
        assert!(ScanClientFactory::build(&config).is_ok());
    }
}
