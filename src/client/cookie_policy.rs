//! Cookie 策略
//!
//! jar 持久化与逐请求注入二选一，构建时确定。

use reqwest::header::HeaderValue;
use std::sync::Arc;
use url::Url;

use super::config::SeedCookie;
use super::cookie_jar::ScanCookieJar;
use super::error::ConfigError;

#[derive(Debug, Clone)]
pub enum CookiePolicy {
    /// jar 保存种子 cookie 和服务端下发的 cookie
    JarBacked(Arc<ScanCookieJar>),
    /// 每个请求携带固定的种子 cookie，`None` 表示没有 cookie
    StaticList(Option<HeaderValue>),
}

impl CookiePolicy {
    /// 根据配置选择策略
    pub fn new(
        use_cookie_jar: bool,
        seed_cookies: &[SeedCookie],
        seed_cookie_url: Option<&Url>,
    ) -> Result<Self, ConfigError> {
        for cookie in seed_cookies {
            validate_seed_cookie(cookie)?;
        }

        if !use_cookie_jar {
            return Ok(CookiePolicy::StaticList(render_cookie_header(seed_cookies)?));
        }

        let jar = Arc::new(ScanCookieJar::new());
        if !seed_cookies.is_empty() {
            let url = seed_cookie_url.ok_or(ConfigError::MissingSeedCookieUrl)?;
            jar.add_seed_cookies(seed_cookies, url)?;
        }
        Ok(CookiePolicy::JarBacked(jar))
    }

    pub fn jar(&self) -> Option<&Arc<ScanCookieJar>> {
        match self {
            CookiePolicy::JarBacked(jar) => Some(jar),
            CookiePolicy::StaticList(_) => None,
        }
    }

    /// 需要手动附加的 Cookie 请求头
    pub fn static_header(&self) -> Option<&HeaderValue> {
        match self {
            CookiePolicy::JarBacked(_) => None,
            CookiePolicy::StaticList(header) => header.as_ref(),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            CookiePolicy::JarBacked(_) => "jar",
            CookiePolicy::StaticList(_) => "static",
        }
    }
}

fn validate_seed_cookie(cookie: &SeedCookie) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidCookie {
        name: cookie.name.clone(),
        reason: reason.to_string(),
    };

    if cookie.name.is_empty() {
        return Err(invalid("empty name"));
    }
    if cookie
        .name
        .chars()
        .any(|c| c == '=' || c == ';' || c.is_whitespace() || c.is_control())
    {
        return Err(invalid("name contains a separator"));
    }
    if cookie.value.contains(';') {
        return Err(invalid("value contains ';'"));
    }
    HeaderValue::from_str(&format!("{}={}", cookie.name, cookie.value))
        .map_err(|e| invalid(&e.to_string()))?;
    Ok(())
}

/// 把种子 cookie 渲染成单个 Cookie 请求头
fn render_cookie_header(cookies: &[SeedCookie]) -> Result<Option<HeaderValue>, ConfigError> {
    if cookies.is_empty() {
        return Ok(None);
    }
    let rendered = cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ");
    HeaderValue::from_str(&rendered)
        .map(Some)
        .map_err(|e| ConfigError::InvalidCookie {
            name: cookies[0].name.clone(),
            reason: e.to_string(),
        })
}
