//! 请求观察入口。
//!
//! 宿主环境里有两条观察请求的路径：浏览器导出的 HAR 网络日志，以及逐行的请求日志。
//! 两者都只负责把 URL 取出来交给同一个 [`RequestObserver`]，分类与去重只在那里做。

use std::io::{BufRead, Read};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::request_capture::CaptureChange;

/// 所有观察路径共用的唯一分类入口。
pub trait RequestObserver {
    fn on_request(&self, url: &str) -> CaptureChange;
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid HAR archive: {0}")]
    Har(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedStats {
    pub seen: usize,
    pub inserted: usize,
    pub replaced: usize,
}

impl FeedStats {
    fn record(&mut self, change: &CaptureChange) {
        self.seen += 1;
        match change {
            CaptureChange::Inserted { .. } => self.inserted += 1,
            CaptureChange::Replaced { .. } => self.replaced += 1,
            CaptureChange::Ignored => {}
        }
    }
}

/// 一条观察路径：把来源里的请求依次交给观察者。
pub trait RequestFeed {
    fn drain(self, observer: &dyn RequestObserver) -> Result<FeedStats, FeedError>;
}

#[derive(Deserialize)]
struct HarArchive {
    log: HarLog,
}

#[derive(Deserialize)]
struct HarLog {
    #[serde(default)]
    entries: Vec<HarEntry>,
}

#[derive(Deserialize)]
struct HarEntry {
    request: HarRequest,
}

#[derive(Deserialize)]
struct HarRequest {
    url: String,
}

/// 开发者工具导出的 `.har`，按记录顺序读取 `log.entries[].request.url`。
pub struct HarFeed<R> {
    reader: R,
}

impl<R: Read> HarFeed<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> RequestFeed for HarFeed<R> {
    fn drain(self, observer: &dyn RequestObserver) -> Result<FeedStats, FeedError> {
        let archive: HarArchive = serde_json::from_reader(self.reader)?;
        let mut stats = FeedStats::default();
        for entry in archive.log.entries {
            let change = observer.on_request(&entry.request.url);
            stats.record(&change);
        }
        debug!(target: "capture", ?stats, "HAR feed drained");
        Ok(stats)
    }
}

/// 每行一个 URL；空行与 `#` 注释跳过，行内第一个以 http 开头的字段视为 URL
/// （兼容 `GET https://... 200` 这类访问日志）。
pub struct LineFeed<R> {
    reader: R,
}

impl<R: BufRead> LineFeed<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> RequestFeed for LineFeed<R> {
    fn drain(self, observer: &dyn RequestObserver) -> Result<FeedStats, FeedError> {
        let mut stats = FeedStats::default();
        for line in self.reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(url) = line
                .split_whitespace()
                .find(|field| field.starts_with("http://") || field.starts_with("https://"))
            else {
                continue;
            };
            let change = observer.on_request(url);
            stats.record(&change);
        }
        debug!(target: "capture", ?stats, "line feed drained");
        Ok(stats)
    }
}
