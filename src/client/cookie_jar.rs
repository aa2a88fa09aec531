//! 扫描用 cookie jar
//!
//! 按域名/路径作用域保存 cookie，内部加锁，可被并发请求共享。
//! 发送顺序：路径长的在前，同长度按首次写入顺序。

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use std::net::IpAddr;
use url::Url;

use super::config::SeedCookie;
use super::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    host_only: bool,
    path: String,
    secure: bool,
    expires: Option<DateTime<Utc>>,
    /// 首次写入序号，替换时保持不变
    seq: u64,
}

impl StoredCookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    fn matches(&self, host: &str, path: &str, secure_channel: bool) -> bool {
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_match(host, &self.domain)
        };
        domain_ok && path_match(path, &self.path) && (!self.secure || secure_channel)
    }
}

/// 一条待写入的 cookie，`expires` 已过期表示删除
#[derive(Debug)]
struct CookieUpdate {
    name: String,
    value: String,
    domain: String,
    host_only: bool,
    path: String,
    secure: bool,
    expires: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct JarState {
    entries: Vec<StoredCookie>,
    next_seq: u64,
}

impl JarState {
    fn apply(&mut self, update: CookieUpdate, now: DateTime<Utc>) {
        let position = self.entries.iter().position(|c| {
            c.name == update.name && c.domain == update.domain && c.path == update.path
        });
        let expired = update.expires.is_some_and(|expires| expires <= now);

        match (position, expired) {
            (Some(index), true) => {
                self.entries.remove(index);
            }
            (Some(index), false) => {
                let existing = &mut self.entries[index];
                existing.value = update.value;
                existing.host_only = update.host_only;
                existing.secure = update.secure;
                existing.expires = update.expires;
            }
            (None, true) => {}
            (None, false) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries.push(StoredCookie {
                    name: update.name,
                    value: update.value,
                    domain: update.domain,
                    host_only: update.host_only,
                    path: update.path,
                    secure: update.secure,
                    expires: update.expires,
                    seq,
                });
            }
        }
    }
}

/// 线程安全的 cookie 存储
#[derive(Debug, Default)]
pub struct ScanCookieJar {
    state: RwLock<JarState>,
}

impl ScanCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入种子 cookie，作用域为 `url` 的主机（host-only）和默认路径
    pub fn add_seed_cookies(&self, cookies: &[SeedCookie], url: &Url) -> Result<(), ConfigError> {
        let Some(host) = request_host(url) else {
            return Err(ConfigError::InvalidCookie {
                name: cookies.first().map(|c| c.name.clone()).unwrap_or_default(),
                reason: format!("seed cookie url {url} has no host"),
            });
        };
        let path = default_path(url.path());
        let now = Utc::now();

        let mut state = self.state.write();
        for cookie in cookies {
            state.apply(
                CookieUpdate {
                    name: cookie.name.clone(),
                    value: cookie.value.clone(),
                    domain: host.clone(),
                    host_only: true,
                    path: path.clone(),
                    secure: false,
                    expires: cookie.expires,
                },
                now,
            );
        }
        tracing::debug!(
            "[COOKIE_JAR] 写入 {} 个种子 cookie, 作用域 {}{}",
            cookies.len(),
            host,
            path
        );
        Ok(())
    }

    /// 匹配 `url` 的 cookie，按发送顺序
    pub fn cookies_for(&self, url: &Url) -> Vec<(String, String)> {
        let Some(host) = request_host(url) else {
            return Vec::new();
        };
        let path = if url.path().is_empty() { "/" } else { url.path() };
        let secure_channel = matches!(url.scheme(), "https" | "wss");
        let now = Utc::now();

        let state = self.state.read();
        let mut matched: Vec<&StoredCookie> = state
            .entries
            .iter()
            .filter(|c| !c.is_expired(now) && c.matches(&host, path, secure_channel))
            .collect();
        matched.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.seq.cmp(&b.seq)));

        matched
            .into_iter()
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect()
    }

    /// 当前保存的 cookie 数量（含已过期但尚未清理的）
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn parse_set_cookie(header: &HeaderValue, url: &Url, host: &str) -> Option<CookieUpdate> {
        let raw = match header.to_str() {
            Ok(raw) => raw,
            Err(_) => {
                tracing::warn!("[COOKIE_JAR] 忽略非 ASCII 的 Set-Cookie");
                return None;
            }
        };
        let parsed = match cookie::Cookie::parse(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("[COOKIE_JAR] 无法解析 Set-Cookie {:?}: {}", raw, e);
                return None;
            }
        };

        let (domain, host_only) = match parsed.domain().map(str::to_ascii_lowercase) {
            Some(domain) if !domain.is_empty() => {
                let allowed = if host.parse::<IpAddr>().is_ok() {
                    domain == host
                } else {
                    domain_match(host, &domain)
                };
                if !allowed {
                    tracing::warn!(
                        "[COOKIE_JAR] 拒绝 cookie {}: domain {} 与主机 {} 不匹配",
                        parsed.name(),
                        domain,
                        host
                    );
                    return None;
                }
                (domain, false)
            }
            _ => (host.to_string(), true),
        };

        let path = match parsed.path() {
            Some(path) if path.starts_with('/') => path.to_string(),
            _ => default_path(url.path()),
        };

        let secure = parsed.secure().unwrap_or(false);
        if secure && !matches!(url.scheme(), "https" | "wss") {
            tracing::debug!(
                "[COOKIE_JAR] 忽略非安全连接下发的 secure cookie {}",
                parsed.name()
            );
            return None;
        }

        let expires = match (parsed.max_age(), parsed.expires_datetime()) {
            (Some(max_age), _) if max_age.whole_seconds() <= 0 => Some(DateTime::<Utc>::MIN_UTC),
            // 溢出时视为不过期
            (Some(max_age), _) => chrono::Duration::try_seconds(max_age.whole_seconds())
                .and_then(|delta| Utc::now().checked_add_signed(delta)),
            (None, Some(at)) => Some(
                DateTime::from_timestamp(at.unix_timestamp(), 0)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            ),
            (None, None) => None,
        };

        Some(CookieUpdate {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            host_only,
            path,
            secure,
            expires,
        })
    }
}

impl CookieStore for ScanCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = request_host(url) else {
            return;
        };
        let updates: Vec<CookieUpdate> = cookie_headers
            .filter_map(|header| Self::parse_set_cookie(header, url, &host))
            .collect();
        if updates.is_empty() {
            return;
        }

        let now = Utc::now();
        let mut state = self.state.write();
        state.entries.retain(|c| !c.is_expired(now));
        for update in updates {
            tracing::debug!(
                "[COOKIE_JAR] 保存 cookie {} ({}{})",
                update.name,
                update.domain,
                update.path
            );
            state.apply(update, now);
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let pairs = self.cookies_for(url);
        if pairs.is_empty() {
            return None;
        }
        let rendered = pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        match HeaderValue::from_str(&rendered) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("[COOKIE_JAR] 无法生成 Cookie 请求头 ({}): {}", url, e);
                None
            }
        }
    }
}

fn request_host(url: &Url) -> Option<String> {
    let host = match url.host()? {
        url::Host::Domain(domain) => domain.to_ascii_lowercase(),
        url::Host::Ipv4(ip) => ip.to_string(),
        url::Host::Ipv6(ip) => ip.to_string(),
    };
    Some(host.trim_end_matches('.').to_string())
}

/// RFC 6265 5.1.3
fn domain_match(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    host.parse::<IpAddr>().is_err()
        && host.len() > domain.len()
        && host.ends_with(domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

/// RFC 6265 5.1.4
fn default_path(path: &str) -> String {
    if !path.starts_with('/') {
        return "/".to_string();
    }
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

/// RFC 6265 5.1.4
fn path_match(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}
