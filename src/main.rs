//! Comic Growl Downloader：comic-growl 章节图片下载与拼图还原。
//!
//! 本 crate 负责：配置加载、清单请求捕获、下载调度、4×4 拼图还原、右开本拼页与 JPEG 导出。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/输出路径等基础设施
//! - `capture`：清单请求捕获与去重（HAR / 请求日志）
//! - `network_parser`：HTTP 传输与清单解析
//! - `comic_parser`：像素缓冲、拼图还原、跨页合并
//! - `download`：会话上下文与下载流程编排
//! - `ui`：命令行交互

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;

mod base_system;
mod capture;
mod comic_parser;
mod download;
mod network_parser;
mod ui;

use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use ui::noui::RunArgs;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "comic-growl-downloader")]
#[command(about = "Comic Growl episode downloader (descramble + spread compose)")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs 等文件）
    #[arg(long)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 按给定的清单地址下载
    Download {
        /// 第一段清单地址（contentsInfo）
        #[arg(long)]
        url1: String,

        /// 第二段清单地址，拼接在第一段之后
        #[arg(long)]
        url2: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },
    /// 从 HAR / 请求日志中捕获清单请求，可选直接下载
    Capture {
        /// 浏览器开发者工具导出的 HAR 文件，可重复
        #[arg(long = "har")]
        har: Vec<PathBuf>,

        /// 每行一个 URL 的请求日志，`-` 表示标准输入
        #[arg(long)]
        log: Option<String>,

        /// 捕获完成后下载最后一条记录
        #[arg(long, default_value_t = false)]
        download: bool,

        /// 与 --download 一起使用：合并前两条记录
        #[arg(long, default_value_t = false, requires = "download")]
        merge: bool,

        #[command(flatten)]
        run: RunArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("Comic Growl Downloader v{}", VERSION);
        return Ok(());
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let data_dir = cli.data_dir.as_deref().map(Path::new);
    let log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let config = load_or_create::<Config>(None, data_dir).context("加载配置失败")?;

    let cancel = Arc::new(AtomicBool::new(false));
    log.install_cancel_handler(Arc::clone(&cancel));

    match command {
        Command::Download { url1, url2, run } => {
            ui::noui::run_download(&config, &url1, url2.as_deref(), &run, cancel)
        }
        Command::Capture {
            har,
            log: log_source,
            download,
            merge,
            run,
        } => ui::noui::run_capture(
            &config,
            &har,
            log_source.as_deref(),
            download,
            merge,
            &run,
            cancel,
        ),
    }
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: debug,
    };
    LogSystem::init(opts, base_dir).context("初始化日志失败")
}
