//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`      — 数据模型（Mode / ImageDescriptor / PipelineError 等）
//! - `session`     — 会话上下文：捕获列表、锁定地址、单飞标记
//! - `progress`    — 进度上报与 CLI 进度条
//! - `sink`        — 输出落盘
//! - `downloader`  — 下载主流程编排

pub mod downloader;
pub mod models;
pub mod progress;
pub mod session;
pub mod sink;
