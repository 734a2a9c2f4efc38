//! 静态检索适配器：按查询文本返回预设结果
//!
//! 用于测试；可设置统一延迟以模拟慢后端。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::retrieval::{BackendKind, Query, RetrievalAdapter, RetrievalError, RetrievedItem};

pub struct StaticAdapter {
    kind: BackendKind,
    responses: HashMap<String, Result<Vec<RetrievedItem>, RetrievalError>>,
    fallback: Result<Vec<RetrievedItem>, RetrievalError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticAdapter {
    /// 未命中的查询返回空结果
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            responses: HashMap::new(),
            fallback: Ok(Vec::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// 所有查询都返回同一个错误
    pub fn failing(kind: BackendKind, error: RetrievalError) -> Self {
        Self::new(kind).with_fallback(Err(error))
    }

    pub fn with_response(
        mut self,
        query: impl Into<String>,
        response: Result<Vec<RetrievedItem>, RetrievalError>,
    ) -> Self {
        self.responses.insert(query.into(), response);
        self
    }

    pub fn with_fallback(mut self, response: Result<Vec<RetrievedItem>, RetrievalError>) -> Self {
        self.fallback = response;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RetrievalAdapter for StaticAdapter {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn search(&self, query: &Query) -> Result<Vec<RetrievedItem>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .get(&query.text)
            .unwrap_or(&self.fallback)
            .clone()
    }
}
