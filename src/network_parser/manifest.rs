//! 图片清单（contentsInfo）拉取与解析。

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::network::Transport;
use crate::download::models::{ImageDescriptor, PipelineError};

#[derive(Debug, Deserialize)]
struct ManifestBody {
    #[serde(default)]
    result: Option<Vec<RawDescriptor>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDescriptor {
    image_url: String,
    scramble: Value,
    width: u32,
    height: u32,
}

pub struct ManifestFetcher<'a, T: Transport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: Transport + ?Sized> ManifestFetcher<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// 拉取一个章节的有序图片列表。
    pub fn fetch(&self, manifest_url: &str) -> Result<Vec<ImageDescriptor>, PipelineError> {
        let body = self.transport.get_text(manifest_url)?;
        let descriptors = parse_manifest(manifest_url, &body)?;
        info!(target: "download", url = manifest_url, count = descriptors.len(), "图片列表已获取");
        Ok(descriptors)
    }

    /// 依次拉取多个清单并按调用顺序拼接（用于两段章节合并）。
    ///
    /// 每个清单请求前调用 `before_each(i)`，返回错误则中止。
    pub fn fetch_all<F>(
        &self,
        manifest_urls: &[&str],
        mut before_each: F,
    ) -> Result<Vec<ImageDescriptor>, PipelineError>
    where
        F: FnMut(usize) -> Result<(), PipelineError>,
    {
        let mut all = Vec::new();
        for (i, url) in manifest_urls.iter().enumerate() {
            before_each(i)?;
            all.extend(self.fetch(url)?);
        }
        Ok(all)
    }
}

pub fn parse_manifest(url: &str, body: &str) -> Result<Vec<ImageDescriptor>, PipelineError> {
    let parse_error = |reason: String| PipelineError::ManifestParse {
        url: url.to_string(),
        reason,
    };

    let parsed: ManifestBody =
        serde_json::from_str(body).map_err(|err| parse_error(format!("invalid json: {err}")))?;
    let Some(raw) = parsed.result else {
        return Err(parse_error("missing `result` field".to_string()));
    };

    raw.into_iter()
        .enumerate()
        .map(|(i, item)| -> Result<ImageDescriptor, PipelineError> {
            let scramble_permutation = scramble_values(&item.scramble)
                .map_err(|reason| parse_error(format!("image #{}: {reason}", i + 1)))?;
            debug!(target: "download", index = i + 1, url = %item.image_url, "descriptor");
            Ok(ImageDescriptor {
                source_image_url: item.image_url,
                scramble_permutation,
                width: item.width,
                height: item.height,
            })
        })
        .collect()
}

/// 接口一般返回 `"[1, 5, ...]"` 形式的字符串，也兼容直接给数组。
fn scramble_values(raw: &Value) -> Result<Vec<i64>, String> {
    match raw {
        Value::String(text) => parse_scramble(text),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_i64()
                    .ok_or_else(|| format!("scramble entry `{v}` is not an integer"))
            })
            .collect(),
        other => Err(format!("unexpected scramble value `{other}`")),
    }
}

/// `"[a, b, ...]"` → 整数数组。只负责转成整数，长度与取值由还原阶段校验。
pub fn parse_scramble(text: &str) -> Result<Vec<i64>, String> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let inner = compact.strip_prefix('[').unwrap_or(&compact);
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|token| {
            token
                .parse::<i64>()
                .map_err(|_| format!("scramble token `{token}` is not an integer"))
        })
        .collect()
}
