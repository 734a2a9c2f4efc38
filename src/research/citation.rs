//! 引用索引：跨轮次、只增不减的来源登记表
//!
//! canonical_value（URL / 知识库路径）是去重键，首次登记时分配 short_id，之后永不改变。
//! Web 与知识库各自独立编号：Web 为 `1, 2, 3…`，知识库为 `KB-1, KB-2…`。
//! register 在单个互斥区内完成“查重 + 分配”，并发发现同一 URL 也只会得到一个编号。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::research::types::{BackendKind, SourceRecord};

#[derive(Debug, Default)]
struct RegistryInner {
    /// canonical_value -> records 下标
    by_value: HashMap<String, usize>,
    records: Vec<SourceRecord>,
    next_web: usize,
    next_kb: usize,
}

impl RegistryInner {
    fn allocate(&mut self, kind: BackendKind) -> String {
        match kind {
            BackendKind::Web => {
                self.next_web += 1;
                self.next_web.to_string()
            }
            BackendKind::KnowledgeBase => {
                self.next_kb += 1;
                format!("KB-{}", self.next_kb)
            }
        }
    }
}

/// 引用索引
#[derive(Debug, Default)]
pub struct CitationRegistry {
    inner: Mutex<RegistryInner>,
}

impl CitationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // 中毒时沿用内部数据
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 登记来源并返回 short_id；已登记则返回原有 short_id（label 以首次为准）
    pub fn register(&self, canonical_value: &str, label: &str, kind: BackendKind) -> String {
        let mut inner = self.lock();
        if let Some(&idx) = inner.by_value.get(canonical_value) {
            return inner.records[idx].short_id.clone();
        }
        let short_id = inner.allocate(kind);
        let idx = inner.records.len();
        inner.records.push(SourceRecord {
            canonical_value: canonical_value.to_string(),
            short_id: short_id.clone(),
            label: label.to_string(),
            backend_kind: kind,
        });
        inner.by_value.insert(canonical_value.to_string(), idx);
        tracing::trace!(short_id = %short_id, source = %canonical_value, "citation registered");
        short_id
    }

    /// 标记替换在登记时完成，这里原样返回
    pub fn resolve_markers(&self, text: &str) -> String {
        text.to_string()
    }

    /// 按登记顺序返回全部来源
    pub fn snapshot(&self) -> Vec<SourceRecord> {
        self.lock().records.clone()
    }

    pub fn get(&self, canonical_value: &str) -> Option<SourceRecord> {
        let inner = self.lock();
        inner
            .by_value
            .get(canonical_value)
            .map(|&idx| inner.records[idx].clone())
    }

    pub fn contains_short_id(&self, short_id: &str) -> bool {
        self.lock().records.iter().any(|r| r.short_id == short_id)
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_register_is_idempotent() {
        let registry = CitationRegistry::new();
        let a = registry.register("https://u1", "U1", BackendKind::Web);
        let b = registry.register("https://u1", "renamed", BackendKind::Web);
        assert_eq!(a, "1");
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("https://u1").unwrap().label, "U1");
    }

    #[test]
    fn test_independent_numbering_per_backend() {
        let registry = CitationRegistry::new();
        assert_eq!(registry.register("https://a", "a", BackendKind::Web), "1");
        assert_eq!(registry.register("/kb/x.md", "x", BackendKind::KnowledgeBase), "KB-1");
        assert_eq!(registry.register("https://b", "b", BackendKind::Web), "2");
        assert_eq!(registry.register("/kb/y.md", "y", BackendKind::KnowledgeBase), "KB-2");

        let ids: Vec<_> = registry.snapshot().into_iter().map(|r| r.short_id).collect();
        assert_eq!(ids, vec!["1", "KB-1", "2", "KB-2"]);
        assert!(registry.contains_short_id("KB-2"));
        assert!(!registry.contains_short_id("3"));
    }

    #[test]
    fn test_resolve_markers_is_passthrough() {
        let registry = CitationRegistry::new();
        assert_eq!(registry.resolve_markers("see [1] and [KB-1]"), "see [1] and [KB-1]");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_allocates_once() {
        let registry = Arc::new(CitationRegistry::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let shared = registry.register("https://shared", "shared", BackendKind::Web);
                registry.register(&format!("https://own/{}", i), "own", BackendKind::Web);
                shared
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(registry.len(), 33);

        let mut all: Vec<_> = registry.snapshot().into_iter().map(|r| r.short_id).collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 33);
    }
}
