//! 知识库检索：向量库 HTTP 接口
//!
//! POST `{base_url}/query`，请求体 `{query, max_retrieve_docs, similarity_threshold, enable_reflection}`；
//! 连接失败时在适配器内重试 max_retries 次，之后报告 Unavailable。
//! 响应体带 `error` 字段时按 `timeout` 标记区分 Timeout / Unavailable。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::KnowledgeBaseSection;
use crate::retrieval::{
    classify_reqwest, classify_status, truncate_chars, BackendKind, Query, RetrievalAdapter,
    RetrievalError, RetrievedItem,
};

/// 重试前的等待
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    max_retrieve_docs: usize,
    similarity_threshold: f32,
    enable_reflection: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<Document>,
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    id: serde_json::Value,
    source: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: DocumentMetadata,
}

#[derive(Debug, Deserialize, Default)]
struct DocumentMetadata {
    filename: Option<String>,
}

impl Document {
    fn label(&self) -> String {
        match &self.metadata.filename {
            Some(name) if !name.is_empty() => name.clone(),
            _ => match &self.id {
                serde_json::Value::String(s) => format!("doc_{}", s),
                serde_json::Value::Null => "doc".to_string(),
                other => format!("doc_{}", other),
            },
        }
    }
}

/// 解析向量库响应体，内容按 snippet_chars 截断
fn parse_response(body: &str, snippet_chars: usize) -> Result<Vec<RetrievedItem>, RetrievalError> {
    let response: QueryResponse =
        serde_json::from_str(body).map_err(|e| RetrievalError::Malformed(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(if response.timeout {
            RetrievalError::Timeout
        } else {
            RetrievalError::Unavailable(error)
        });
    }

    Ok(response
        .documents
        .into_iter()
        .filter(|d| !d.source.trim().is_empty())
        .map(|d| {
            let content = d.content.trim();
            let mut snippet = truncate_chars(content, snippet_chars);
            if snippet.len() < content.len() {
                snippet.push_str("...");
            }
            let label = d.label();
            RetrievedItem::new(
                d.source.trim(),
                format!("(score {:.3}) {}", d.score, snippet),
                label,
            )
        })
        .collect())
}

/// 知识库检索适配器
pub struct KnowledgeBaseAdapter {
    client: Client,
    base_url: String,
    max_docs: usize,
    similarity_threshold: f32,
    max_retries: u32,
    snippet_chars: usize,
}

impl KnowledgeBaseAdapter {
    pub fn from_config(cfg: &KnowledgeBaseSection) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            max_docs: cfg.max_docs,
            similarity_threshold: cfg.similarity_threshold,
            max_retries: cfg.max_retries,
            snippet_chars: cfg.snippet_chars,
        }
    }

    /// 外层 Err 为传输错误（连接失败可重试），内层为不可重试的最终结果
    async fn query_once(
        &self,
        text: &str,
    ) -> Result<Result<Vec<RetrievedItem>, RetrievalError>, reqwest::Error> {
        let payload = QueryRequest {
            query: text,
            max_retrieve_docs: self.max_docs,
            similarity_threshold: self.similarity_threshold,
            enable_reflection: false,
        };
        let resp = self
            .client
            .post(format!("{}/query", self.base_url))
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Ok(Err(classify_status(status, &body)));
        }
        Ok(parse_response(&body, self.snippet_chars))
    }
}

#[async_trait]
impl RetrievalAdapter for KnowledgeBaseAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::KnowledgeBase
    }

    async fn search(&self, query: &Query) -> Result<Vec<RetrievedItem>, RetrievalError> {
        let mut attempt = 0;
        loop {
            match self.query_once(&query.text).await {
                Ok(result) => {
                    if let Ok(items) = &result {
                        tracing::debug!(ordinal = query.ordinal, documents = items.len(), "knowledge base search");
                    }
                    return result;
                }
                Err(e) if e.is_connect() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(ordinal = query.ordinal, attempt, error = %e, "knowledge base unreachable, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(classify_reqwest(e)),
            }
        }
    }
}
