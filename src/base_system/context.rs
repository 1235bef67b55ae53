//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};
use crate::download::models::Mode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 路径配置
    #[serde(default)]
    pub save_path: String,

    // 网络配置
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_page_url")]
    pub page_url: String,
    #[serde(default = "default_api_marker")]
    pub api_marker: String,

    // 输出配置
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default)]
    pub default_mode: u8,

    // 错误处理
    #[serde(default = "default_true")]
    pub abort_on_scramble_error: bool,
    #[serde(default = "default_true")]
    pub allow_overwrite_files: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_path: String::new(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            page_url: default_page_url(),
            api_marker: default_api_marker(),
            jpeg_quality: default_jpeg_quality(),
            default_mode: 0,
            abort_on_scramble_error: default_true(),
            allow_overwrite_files: default_true(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 9] = [
            FieldMeta {
                name: "save_path",
                description: "保存目录，留空则使用当前目录下的 downloads",
            },
            FieldMeta {
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "page_url",
                description: "章节页地址，作为 Referer 发送（站点防盗链需要）",
            },
            FieldMeta {
                name: "api_marker",
                description: "图片清单接口的路径特征，捕获请求时只保留包含该字符串的 URL",
            },
            FieldMeta {
                name: "jpeg_quality",
                description: "JPEG 输出质量 (1-100)",
            },
            FieldMeta {
                name: "default_mode",
                description: "默认拼页模式, 可选: [0 不拼页, 1 右开封面单独, 2 右开普通]",
            },
            FieldMeta {
                name: "abort_on_scramble_error",
                description: "打乱表格式错误时是否立即中止（false 则跳过该图继续）",
            },
            FieldMeta {
                name: "allow_overwrite_files",
                description: "是否允许覆盖已存在的输出文件",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Validation(format!(
                "jpeg_quality 必须在 1-100 之间，当前为 {}",
                self.jpeg_quality
            )));
        }
        if Mode::from_index(self.default_mode).is_none() {
            return Err(ConfigError::Validation(format!(
                "default_mode 只能为 0/1/2，当前为 {}",
                self.default_mode
            )));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::Validation(
                "request_timeout 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("downloads")
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn mode(&self) -> Mode {
        Mode::from_index(self.default_mode).unwrap_or_default()
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string()
}

fn default_page_url() -> String {
    "https://comic-growl.com/".to_string()
}

fn default_api_marker() -> String {
    "/api/book/contentsInfo".to_string()
}

fn default_jpeg_quality() -> u8 {
    100
}
