use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, anyhow};
use clap::Args;
use tracing::{info, warn};

use crate::base_system::context::Config;
use crate::capture::observer::{FeedStats, HarFeed, LineFeed, RequestFeed};
use crate::capture::request_capture::CapturedRequest;
use crate::download::downloader::{DownloadPipeline, PipelineOptions, RunRequest};
use crate::download::models::{Mode, PipelineError};
use crate::download::progress::CliProgress;
use crate::download::session::{Session, Slot};
use crate::download::sink::DirSink;
use crate::network_parser::network::{HttpConfig, HttpTransport};

/// 每次运行都可以覆盖的选项。
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// 拼页模式：0 不拼页，1 右开·封面单独，2 右开·普通（默认取配置）
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub mode: Option<u8>,

    /// 页面标题，用于生成输出文件夹名（取第一个 `|` 之前的部分）
    #[arg(long)]
    pub title: Option<String>,

    /// 章节页地址，作为 Referer 发送
    #[arg(long)]
    pub page_url: Option<String>,

    /// 保存目录
    #[arg(long)]
    pub save_path: Option<String>,
}

impl RunArgs {
    fn apply(&self, config: &Config) -> Result<(Config, Mode)> {
        let mut config = config.clone();
        if let Some(url) = &self.page_url {
            config.page_url = url.clone();
        }
        if let Some(path) = &self.save_path {
            config.save_path = path.trim().trim_end_matches(['/', '\\']).to_string();
        }
        let mode = match self.mode {
            Some(v) => Mode::from_index(v).ok_or_else(|| anyhow!("无效的拼页模式: {v}"))?,
            None => config.mode(),
        };
        Ok((config, mode))
    }

    fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }
}

pub fn run_download(
    config: &Config,
    url1: &str,
    url2: Option<&str>,
    args: &RunArgs,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let (config, mode) = args.apply(config)?;
    let session = Session::new(config.api_marker.clone()).with_mode(mode);
    session.lock_slot(Slot::Url1, url1.trim());
    if let Some(url2) = url2.map(str::trim).filter(|u| !u.is_empty()) {
        session.lock_slot(Slot::Url2, url2);
    }
    start_run(&config, &session, args.title(), cancel)
}

pub fn run_capture(
    config: &Config,
    har_files: &[PathBuf],
    log_source: Option<&str>,
    download: bool,
    merge: bool,
    args: &RunArgs,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    if har_files.is_empty() && log_source.is_none() {
        return Err(anyhow!("至少需要提供 --har 或 --log"));
    }

    let (config, mode) = args.apply(config)?;
    let session = Session::new(config.api_marker.clone()).with_mode(mode);
    session.set_listener(Box::new(|list: &[CapturedRequest]| print_captured(list)));

    for path in har_files {
        let file =
            File::open(path).with_context(|| format!("打开 HAR 文件失败: {}", path.display()))?;
        let stats = HarFeed::new(BufReader::new(file))
            .drain(&session)
            .with_context(|| format!("读取 HAR 文件失败: {}", path.display()))?;
        log_stats(&path.display().to_string(), stats);
    }

    match log_source {
        Some("-") => {
            let stats = LineFeed::new(io::stdin().lock())
                .drain(&session)
                .context("读取标准输入失败")?;
            log_stats("stdin", stats);
        }
        Some(path) => {
            let file = File::open(path).with_context(|| format!("打开请求日志失败: {path}"))?;
            let stats = LineFeed::new(BufReader::new(file))
                .drain(&session)
                .with_context(|| format!("读取请求日志失败: {path}"))?;
            log_stats(path, stats);
        }
        None => {}
    }

    let captured = session.captured();
    if captured.is_empty() {
        println!("未捕获到清单请求（{}）", config.api_marker);
        return Ok(());
    }
    if !download {
        return Ok(());
    }

    if merge {
        if captured.len() < 2 {
            return Err(anyhow!("合并下载需要至少两条捕获记录，当前只有 {} 条", captured.len()));
        }
        session.lock_captured(Slot::Url1, 0);
        session.lock_captured(Slot::Url2, 1);
    } else {
        session.lock_captured(Slot::Url1, captured.len() - 1);
    }

    start_run(&config, &session, args.title(), cancel)
}

fn start_run(
    config: &Config,
    session: &Session,
    title: &str,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let stale = session.stale_slots();
    if !stale.is_empty() {
        let names: Vec<_> = stale.iter().map(|s| s.label()).collect();
        warn!("以下地址已有更新的捕获记录，仍按锁定值下载: {}", names.join(", "));
    }

    let request = RunRequest::from_session(session, title).context("URL-1 不能为空")?;
    let transport =
        HttpTransport::new(HttpConfig::from_config(config)).context("初始化 HTTP 客户端失败")?;
    let mut sink = DirSink::new(config.default_save_dir(), config.allow_overwrite_files);
    let mut progress = CliProgress::new("下载");

    println!(
        "开始下载（{}），保存到 {}",
        request.mode,
        sink.root().display()
    );

    let pipeline =
        DownloadPipeline::new(&transport, PipelineOptions::from_config(config)).with_cancel(cancel);
    match pipeline.run(session, &request, &mut progress, &mut sink) {
        Ok(outcome) => {
            println!(
                "完成！{} 张已保存到 {}",
                outcome.persisted,
                sink.root().join(&outcome.folder).display()
            );
            Ok(())
        }
        Err(failure) => {
            progress.abandon("发生错误");
            if matches!(failure.error, PipelineError::ConcurrentRunRejected) {
                println!("已有下载任务在进行，本次请求已忽略");
                return Ok(());
            }
            Err(failure).context("下载失败")
        }
    }
}

fn print_captured(list: &[CapturedRequest]) {
    println!("── 已捕获 {} 条清单请求 ──", list.len());
    for (idx, entry) in list.iter().enumerate() {
        println!("{}. [page-to={}] {}", idx + 1, entry.page_to, entry.url);
    }
}

fn log_stats(source: &str, stats: FeedStats) {
    info!(
        target: "capture",
        source,
        seen = stats.seen,
        inserted = stats.inserted,
        replaced = stats.replaced,
        "请求来源读取完成"
    );
}
