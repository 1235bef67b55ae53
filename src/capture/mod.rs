//! 清单请求捕获。
//!
//! - `request_capture` — 按前缀去重的捕获列表
//! - `observer`        — 观察入口与 HAR / 逐行日志两种来源

pub mod observer;
pub mod request_capture;
