//! HTTP 传输：带 Referer / User-Agent 的 GET，非 2xx 视为失败，不做重试。

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, CONNECTION, HeaderMap, HeaderValue, REFERER, USER_AGENT,
};
use tracing::debug;

use crate::base_system::context::Config;
use crate::download::models::PipelineError;

/// 流水线依赖的读取通道。
pub trait Transport {
    fn get_text(&self, url: &str) -> Result<String, PipelineError>;
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// 当前章节页地址，源站防盗链会校验。
    pub referer: String,
}

impl HttpConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
            referer: config.page_url.clone(),
        }
    }
}

pub struct HttpTransport {
    client: Client,
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> anyhow::Result<Self> {
        // reqwest 未启用 gzip 解码，要求 identity 编码直接拿原始字节
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        default_headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    fn page_headers(&self, accept: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );
        if let Ok(v) = HeaderValue::from_str(&self.config.referer) {
            headers.insert(REFERER, v);
        }
        headers
    }

    fn get(
        &self,
        url: &str,
        accept: &'static str,
    ) -> Result<reqwest::blocking::Response, PipelineError> {
        debug!(target: "download", url, "GET");
        let resp = self
            .client
            .get(url)
            .headers(self.page_headers(accept))
            .send()
            .map_err(|err| network_error(url, err))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Network {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        Ok(resp)
    }
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str) -> Result<String, PipelineError> {
        self.get(url, "application/json, text/plain, */*")?
            .text()
            .map_err(|err| network_error(url, err))
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        let bytes = self
            .get(url, "image/avif,image/webp,image/*,*/*;q=0.8")?
            .bytes()
            .map_err(|err| network_error(url, err))?;
        Ok(bytes.to_vec())
    }
}

fn network_error(url: &str, err: reqwest::Error) -> PipelineError {
    let reason = if err.is_timeout() {
        "timed out".to_string()
    } else {
        err.to_string()
    };
    PipelineError::Network {
        url: url.to_string(),
        reason,
    }
}
