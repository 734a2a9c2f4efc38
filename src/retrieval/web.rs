//! Web 检索：Custom Search 兼容 REST 接口
//!
//! GET `{endpoint}?key=..&cx=..&q=..&num=..`，取 `items[].link / title / snippet`。
//! 没有 link 的条目丢弃；没有 title 的条目标签记为 `Source {n}`。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::WebSearchSection;
use crate::retrieval::{
    classify_reqwest, classify_status, BackendKind, Query, RetrievalAdapter, RetrievalError,
    RetrievedItem,
};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

/// 解析搜索接口响应体
fn parse_response(body: &str) -> Result<Vec<RetrievedItem>, RetrievalError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| RetrievalError::Malformed(e.to_string()))?;
    Ok(response
        .items
        .into_iter()
        .enumerate()
        .filter(|(_, item)| !item.link.trim().is_empty())
        .map(|(idx, item)| {
            let label = if item.title.trim().is_empty() {
                format!("Source {}", idx + 1)
            } else {
                item.title.trim().to_string()
            };
            let snippet = item.snippet.split_whitespace().collect::<Vec<_>>().join(" ");
            RetrievedItem::new(item.link.trim(), snippet, label)
        })
        .collect())
}

/// Web 检索适配器
pub struct WebSearchAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
    max_results: usize,
}

impl WebSearchAdapter {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
        timeout_secs: u64,
        max_results: usize,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            max_results: max_results.clamp(1, 10),
        }
    }

    /// 从配置构建；api_key（或环境变量 GOOGLE_API_KEY）与 engine_id 缺一则返回 None
    pub fn from_config(cfg: &WebSearchSection) -> Option<Self> {
        if !cfg.enabled {
            return None;
        }
        let api_key = cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|k| !k.is_empty());
        let Some(api_key) = api_key else {
            tracing::warn!("web search disabled: no api key configured");
            return None;
        };
        let Some(engine_id) = cfg.engine_id.clone().filter(|id| !id.is_empty()) else {
            tracing::warn!("web search disabled: no engine_id configured");
            return None;
        };
        Some(Self::new(
            cfg.endpoint.clone(),
            api_key,
            engine_id,
            cfg.timeout_secs,
            cfg.max_results,
        ))
    }
}

#[async_trait]
impl RetrievalAdapter for WebSearchAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Web
    }

    async fn search(&self, query: &Query) -> Result<Vec<RetrievedItem>, RetrievalError> {
        tracing::debug!(ordinal = query.ordinal, q = %query.text, "web search");
        let num = self.max_results.to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query.text.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = resp.status();
        let body = resp.text().await.map_err(classify_reqwest)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        parse_response(&body)
    }
}
