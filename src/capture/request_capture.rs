//! 清单请求捕获与去重。
//!
//! 同一接口随阅读进度会带着越来越大的 `page-to` 反复请求。以去掉 `page-to=` 及其后
//! 全部内容的 URL 作为前缀（同一逻辑资源），每个前缀只保留 `page-to` 最大的一条。

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    pub url: String,
    /// 最近一次更新的时间（Unix 毫秒）。
    pub timestamp: u64,
    pub prefix: String,
    pub page_to: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureChange {
    Inserted { index: usize },
    Replaced { index: usize, previous_url: String },
    Ignored,
}

pub type CaptureListener = Box<dyn FnMut(&[CapturedRequest]) + Send>;

#[derive(Default)]
pub struct RequestCapture {
    entries: Vec<CapturedRequest>,
    listener: Option<CaptureListener>,
}

impl RequestCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次新增或替换后，以完整的当前列表回调。
    pub fn set_listener(&mut self, listener: CaptureListener) {
        self.listener = Some(listener);
    }

    pub fn observe(&mut self, url: &str) -> CaptureChange {
        self.observe_at(url, now_ms())
    }

    pub fn observe_at(&mut self, url: &str, timestamp: u64) -> CaptureChange {
        let prefix = url_prefix(url);
        let page_to = page_to(url);

        let change = match self.entries.iter().position(|e| e.prefix == prefix) {
            Some(index) => {
                let existing = &mut self.entries[index];
                if page_to <= existing.page_to {
                    return CaptureChange::Ignored;
                }
                let previous_url = std::mem::replace(&mut existing.url, url.to_string());
                existing.timestamp = timestamp;
                existing.page_to = page_to;
                CaptureChange::Replaced {
                    index,
                    previous_url,
                }
            }
            None => {
                self.entries.push(CapturedRequest {
                    url: url.to_string(),
                    timestamp,
                    prefix,
                    page_to,
                });
                CaptureChange::Inserted {
                    index: self.entries.len() - 1,
                }
            }
        };

        if let Some(listener) = self.listener.as_mut() {
            listener(&self.entries);
        }
        change
    }

    pub fn entries(&self) -> &[CapturedRequest] {
        &self.entries
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([?&])page-to=\d+.*").expect("valid page-to regex"))
}

fn page_to_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&]page-to=(\d+)").expect("valid page-to regex"))
}

/// 去掉 `page-to=` 参数及其后的全部内容，保留前面的 `?`/`&`。
pub fn url_prefix(url: &str) -> String {
    prefix_regex().replacen(url, 1, "${1}").into_owned()
}

/// `page-to` 的整数值，缺省为 0。
pub fn page_to(url: &str) -> u64 {
    page_to_regex()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().parse::<u64>().unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
