//! 下载相关的数据模型定义。
//!
//! 包含拼页模式、图片描述、运行结果以及流水线错误类型。

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// 拼页模式，一次运行中固定不变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// 不拼页，逐张输出。
    #[default]
    NoCompose,
    /// 右开本，第一张（封面）单独放在右侧。
    RightOpenCover,
    /// 右开本，第一张单独放在左侧、右侧留白。
    RightOpenNormal,
}

impl Mode {
    pub fn from_index(value: u8) -> Option<Self> {
        match value {
            0 => Some(Mode::NoCompose),
            1 => Some(Mode::RightOpenCover),
            2 => Some(Mode::RightOpenNormal),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Mode::NoCompose => 0,
            Mode::RightOpenCover => 1,
            Mode::RightOpenNormal => 2,
        }
    }

    pub fn composes(self) -> bool {
        self != Mode::NoCompose
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Mode::NoCompose => "不拼页",
            Mode::RightOpenCover => "右开·封面单独",
            Mode::RightOpenNormal => "右开·普通",
        };
        write!(f, "{} ({})", label, self.index())
    }
}

/// 清单中的一张图：源地址、16 格打乱表与原始尺寸。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub source_image_url: String,
    pub scramble_permutation: Vec<i64>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub persisted: usize,
    pub folder: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("network error ({url}): {reason}")]
    Network { url: String, reason: String },
    #[error("manifest parse error ({url}): {reason}")]
    ManifestParse { url: String, reason: String },
    #[error("scramble format error at image #{index} ({url}): {reason}")]
    ScrambleFormat {
        index: usize,
        url: String,
        reason: String,
    },
    #[error("image decode error at image #{index} ({url}): {source}")]
    ImageDecode {
        index: usize,
        url: String,
        source: image::ImageError,
    },
    #[error("image size error at image #{index} ({url}): {reason}")]
    ImageSize {
        index: usize,
        url: String,
        reason: String,
    },
    #[error("spread compose failed: {reason}")]
    Compose { reason: String },
    #[error("jpeg encode failed: {source}")]
    Encode { source: image::ImageError },
    #[error("persist failed at {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("another download is already running")]
    ConcurrentRunRejected,
    #[error("download cancelled")]
    Cancelled,
}

impl PipelineError {
    /// 出错阶段的简短名称，用于日志与提示。
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Network { .. } => "network",
            PipelineError::ManifestParse { .. } => "manifest",
            PipelineError::ScrambleFormat { .. } => "descramble",
            PipelineError::ImageDecode { .. } | PipelineError::ImageSize { .. } => "decode",
            PipelineError::Compose { .. } => "compose",
            PipelineError::Encode { .. } => "encode",
            PipelineError::Persist { .. } => "persist",
            PipelineError::ConcurrentRunRejected => "guard",
            PipelineError::Cancelled => "cancel",
        }
    }
}

/// 失败的运行：错误本身以及失败前已写出的文件数（不回滚）。
#[derive(Debug)]
pub struct RunFailure {
    pub error: PipelineError,
    pub persisted: usize,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (已保存 {} 张)",
            self.error.stage(),
            self.error,
            self.persisted
        )
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<PipelineError> for RunFailure {
    fn from(error: PipelineError) -> Self {
        Self {
            error,
            persisted: 0,
        }
    }
}
