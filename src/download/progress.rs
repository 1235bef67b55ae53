//! 进度上报与 CLI 进度条。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// 接收 (百分比, 说明文字)。
pub trait ProgressSink {
    fn report(&mut self, percent: u8, label: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(u8, &str),
{
    fn report(&mut self, percent: u8, label: &str) {
        self(percent, label)
    }
}

/// 单根 0..=100 的终端进度条。
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new(prefix: &str) -> Self {
        let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {pos:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        bar.set_style(style);
        bar.set_prefix(prefix.to_string());
        Self { bar }
    }

    #[cfg(test)]
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// 运行失败时保留当前位置，停止刷新。
    pub fn abandon(&self, label: &str) {
        self.bar.abandon_with_message(label.to_string());
    }
}

impl ProgressSink for CliProgress {
    fn report(&mut self, percent: u8, label: &str) {
        self.bar.set_position(u64::from(percent));
        if percent >= 100 {
            self.bar.finish_with_message(label.to_string());
        } else {
            self.bar.set_message(label.to_string());
        }
    }
}

/// 流水线内部使用的进度包装：夹到 [0, 99]、不回退，100 只在 `finish` 时发出。
pub(crate) struct ProgressReporter<'a> {
    sink: &'a mut dyn ProgressSink,
    last: u8,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, last: 0 }
    }

    pub(crate) fn update(&mut self, percent: u32, label: &str) {
        let clamped = percent.min(99) as u8;
        self.last = self.last.max(clamped);
        self.sink.report(self.last, label);
    }

    pub(crate) fn finish(&mut self, label: &str) {
        self.last = 100;
        self.sink.report(100, label);
    }
}

pub(crate) const MANIFEST_PRIMARY: u32 = 2;
pub(crate) const MANIFEST_SECONDARY: u32 = 5;
pub(crate) const MERGE_SPREADS: u32 = 66;

/// 不拼页模式下第 `i` 张（0 起）开始处理时的进度。
pub(crate) fn page_percent(i: usize, total: usize) -> u32 {
    if total == 0 {
        return 2;
    }
    (i as f64 / total as f64 * 95.0).round() as u32 + 2
}

/// 拼页模式解码阶段。
pub(crate) fn decode_percent(i: usize, total: usize) -> u32 {
    if total == 0 {
        return 5;
    }
    5 + (i as f64 / total as f64 * 60.0).floor() as u32
}

/// 拼页模式输出阶段。
pub(crate) fn spread_percent(i: usize, total: usize) -> u32 {
    if total == 0 {
        return 68;
    }
    68 + (i as f64 / total as f64 * 29.0).round() as u32
}
