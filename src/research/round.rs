//! 轮执行器：一轮内 N 条查询 × K 个后端并发检索，全部结束后按 ordinal 折叠进状态
//!
//! - 每个 (查询, 后端) 一个 tokio 任务，受 TaskScheduler 的信号量约束；单个失败不影响兄弟任务
//! - 屏障等待所有任务（join-all），没有“首个失败即退出”
//! - 折叠阶段按 ordinal 升序登记来源并把原始标识替换为 `[short_id]`，因此编号与完成顺序无关
//! - 循环级取消：未完成的任务记为 Cancelled 占位，已收集的结果照常折叠

use std::sync::Arc;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::core::{RetrievalError, TaskScheduler};
use crate::research::citation::CitationRegistry;
use crate::research::events::{send_event, EventSender, ResearchEvent};
use crate::research::references::neutralize_markers;
use crate::research::state::{ResearchState, RoundBatch};
use crate::research::types::{marker, FindingChunk, Query, RetrievedItem};
use crate::retrieval::RetrievalAdapter;

/// 一轮执行的摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    pub round: usize,
    pub tasks: usize,
    pub failures: usize,
    pub cancelled: bool,
}

/// 轮执行器
pub struct RoundExecutor {
    adapters: Vec<Arc<dyn RetrievalAdapter>>,
    scheduler: TaskScheduler,
    events: Option<EventSender>,
}

impl RoundExecutor {
    pub fn new(adapters: Vec<Arc<dyn RetrievalAdapter>>, scheduler: TaskScheduler) -> Self {
        Self {
            adapters,
            scheduler,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn backend_count(&self) -> usize {
        self.adapters.len()
    }

    /// 为本轮查询分配 ordinal：第 i 条查询、第 j 个后端 = next_ordinal + i*K + j
    pub fn plan(&self, state: &ResearchState, texts: &[String]) -> Vec<Query> {
        let base = state.next_ordinal();
        let round = state.rounds_executed();
        let k = self.adapters.len();
        texts
            .iter()
            .enumerate()
            .flat_map(|(i, text)| {
                self.adapters.iter().enumerate().map(move |(j, adapter)| Query {
                    ordinal: base + i * k + j,
                    text: text.clone(),
                    backend: adapter.kind(),
                    round,
                })
            })
            .collect()
    }

    /// 执行一轮并把结果作为一个批次追加到 state
    pub async fn execute(
        &self,
        state: &mut ResearchState,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> RoundSummary {
        let queries = self.plan(state, texts);
        let round = state.rounds_executed();
        let k = self.adapters.len().max(1);
        tracing::info!(round = round + 1, queries = texts.len(), tasks = queries.len(), "round started");
        send_event(
            self.events.as_ref(),
            ResearchEvent::RoundStarted {
                round,
                tasks: queries.len(),
            },
        );

        let handles: Vec<_> = queries
            .iter()
            .enumerate()
            .map(|(pos, query)| {
                let adapter = Arc::clone(&self.adapters[pos % k]);
                let scheduler = self.scheduler.clone();
                let cancel = cancel.clone();
                let events = self.events.clone();
                let query = query.clone();
                tokio::spawn(async move {
                    let outcome = run_task(adapter.as_ref(), &scheduler, &cancel, &query).await;
                    send_event(
                        events.as_ref(),
                        ResearchEvent::RetrievalFinished {
                            ordinal: query.ordinal,
                            backend: query.backend,
                            query: query.text.clone(),
                            results: outcome.as_ref().map(|items| items.len()).unwrap_or(0),
                            failure: outcome.as_ref().err().map(|e| e.kind().to_string()),
                        },
                    );
                    outcome
                })
            })
            .collect();

        // 屏障：join_all 按派发顺序返回，与完成顺序无关
        let outcomes = join_all(handles).await;
        let cancelled = cancel.is_cancelled();

        let registry = Arc::clone(state.registry());
        let mut chunks = Vec::with_capacity(queries.len());
        let mut failures = 0;
        for (query, joined) in queries.iter().zip(outcomes) {
            let outcome = joined.unwrap_or_else(|e| {
                Err(RetrievalError::Unavailable(format!("retrieval task aborted: {}", e)))
            });
            if let Err(e) = &outcome {
                failures += 1;
                tracing::warn!(ordinal = query.ordinal, backend = %query.backend, q = %query.text, error = %e, "retrieval failed");
            }
            chunks.push(fold_outcome(&registry, query, outcome));
        }

        let summary = RoundSummary {
            round,
            tasks: queries.len(),
            failures,
            cancelled,
        };
        send_event(
            self.events.as_ref(),
            ResearchEvent::RoundFolded {
                round,
                chunks: chunks.len(),
                failures,
                cancelled,
            },
        );
        tracing::info!(round = round + 1, tasks = summary.tasks, failures, cancelled, sources = registry.len(), "round folded");

        state.append_round(RoundBatch { queries, chunks });
        summary
    }
}

/// 单个检索任务：先取并发许可，再与取消信号竞争
async fn run_task(
    adapter: &dyn RetrievalAdapter,
    scheduler: &TaskScheduler,
    cancel: &CancellationToken,
    query: &Query,
) -> Result<Vec<RetrievedItem>, RetrievalError> {
    let Some(_permit) = scheduler.acquire(cancel).await else {
        return Err(RetrievalError::Cancelled);
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RetrievalError::Cancelled),
        result = adapter.search(query) => result,
    }
}

/// 把一个任务结果变成 FindingChunk；成功时登记来源并替换原始标识
///
/// 后端文本里自带的 `[7]` 之类脚注先改写为 `(7)`，chunk 中的方括号标记只来自登记表。
pub(crate) fn fold_outcome(
    registry: &CitationRegistry,
    query: &Query,
    outcome: Result<Vec<RetrievedItem>, RetrievalError>,
) -> FindingChunk {
    let mut chunk = FindingChunk {
        ordinal: query.ordinal,
        round: query.round,
        backend: query.backend,
        query: query.text.clone(),
        text: String::new(),
        citations: Vec::new(),
        failure: None,
    };

    let query_text = neutralize_markers(&query.text);
    let items = match outcome {
        Ok(items) => items,
        Err(e) => {
            chunk.text = format!(
                "[{} search for \"{}\" failed: {}]",
                query.backend,
                query_text,
                e.kind()
            );
            chunk.failure = Some(e.kind().to_string());
            return chunk;
        }
    };

    if items.is_empty() {
        chunk.text = format!("No {} results found for \"{}\".", query.backend, query_text);
        return chunk;
    }

    let ids: Vec<(String, String)> = items
        .iter()
        .map(|item| {
            let id = registry.register(&item.raw_identity, &item.display_label, query.backend);
            (item.raw_identity.clone(), id)
        })
        .collect();
    let by_length = ids_by_length(&ids);

    let lines: Vec<String> = items
        .iter()
        .zip(ids.iter())
        .map(|(item, (_, id))| {
            let body = format!(
                "{}: {}",
                neutralize_markers(&item.display_label),
                neutralize_markers(&item.snippet_text)
            );
            format!("- {} {}", replace_identities(&body, &by_length), marker(id))
        })
        .collect();

    for (_, id) in ids {
        if !chunk.citations.contains(&id) {
            chunk.citations.push(id);
        }
    }
    chunk.text = format!(
        "{} results for \"{}\":\n{}",
        query.backend,
        query_text,
        lines.join("\n")
    );
    chunk
}

/// 按原始标识长度降序，避免短 URL 先替换掉长 URL 的前缀
fn ids_by_length(ids: &[(String, String)]) -> Vec<(String, String)> {
    let mut sorted = ids.to_vec();
    sorted.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    sorted
}

fn replace_identities(text: &str, ids: &[(String, String)]) -> String {
    let mut out = text.to_string();
    for (raw, id) in ids {
        if !raw.is_empty() {
            out = out.replace(raw.as_str(), &marker(id));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::types::BackendKind;
    use crate::retrieval::StaticAdapter;
    use std::time::Duration;

    fn web_query(ordinal: usize, text: &str) -> Query {
        Query {
            ordinal,
            text: text.into(),
            backend: BackendKind::Web,
            round: 0,
        }
    }

    #[test]
    fn test_fold_replaces_raw_identity_with_marker() {
        let registry = CitationRegistry::new();
        let items = vec![
            RetrievedItem::new("https://a.example", "see https://a.example/deep and https://a.example", "A"),
            RetrievedItem::new("https://a.example/deep", "deeper", "Deep"),
        ];
        let chunk = fold_outcome(&registry, &web_query(0, "q"), Ok(items));
        assert_eq!(chunk.citations, vec!["1", "2"]);
        assert!(chunk.text.contains("- A: see [2] and [1] [1]"));
        assert!(chunk.text.contains("- Deep: deeper [2]"));
        assert!(!chunk.text.contains("https://"));
    }

    #[test]
    fn test_fold_rewrites_bracketed_footnotes() {
        let registry = CitationRegistry::new();
        let items = vec![RetrievedItem::new(
            "https://en.wikipedia.org/wiki/X",
            "X was first described in 1990.[7] It is widely used.[2] See [KB-3].",
            "X [1] - Wikipedia",
        )];
        let chunk = fold_outcome(&registry, &web_query(0, "X [5] history"), Ok(items));
        assert_eq!(
            chunk.text,
            "web results for \"X (5) history\":\n\
             - X (1) - Wikipedia: X was first described in 1990.(7) It is widely used.(2) See (KB-3). [1]"
        );
        assert_eq!(chunk.citations, vec!["1"]);
    }

    #[test]
    fn test_fold_failure_is_placeholder() {
        let registry = CitationRegistry::new();
        let chunk = fold_outcome(&registry, &web_query(3, "q"), Err(RetrievalError::Timeout));
        assert!(chunk.is_placeholder());
        assert_eq!(chunk.failure.as_deref(), Some("timeout"));
        assert!(chunk.text.contains("timeout"));
        assert!(chunk.citations.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_fold_empty_result() {
        let registry = CitationRegistry::new();
        let chunk = fold_outcome(&registry, &web_query(0, "q"), Ok(Vec::new()));
        assert!(!chunk.is_placeholder());
        assert!(chunk.text.starts_with("No web results"));
    }

    #[tokio::test]
    async fn test_plan_assigns_interleaved_ordinals() {
        let adapters: Vec<Arc<dyn RetrievalAdapter>> = vec![
            Arc::new(StaticAdapter::new(BackendKind::Web)),
            Arc::new(StaticAdapter::new(BackendKind::KnowledgeBase)),
        ];
        let executor = RoundExecutor::new(adapters, TaskScheduler::new(4));
        let state = ResearchState::new();
        let plan = executor.plan(&state, &["a".to_string(), "b".to_string()]);
        let shape: Vec<_> = plan.iter().map(|q| (q.ordinal, q.text.as_str(), q.backend)).collect();
        assert_eq!(
            shape,
            vec![
                (0, "a", BackendKind::Web),
                (1, "a", BackendKind::KnowledgeBase),
                (2, "b", BackendKind::Web),
                (3, "b", BackendKind::KnowledgeBase),
            ]
        );
    }

    #[tokio::test]
    async fn test_chunks_follow_ordinal_order_not_completion_order() {
        let slow = StaticAdapter::new(BackendKind::Web)
            .with_fallback(Ok(vec![RetrievedItem::new("https://slow", "s", "Slow")]))
            .with_delay(Duration::from_millis(50));
        let fast = StaticAdapter::new(BackendKind::KnowledgeBase)
            .with_fallback(Ok(vec![RetrievedItem::new("/kb/fast.md", "f", "fast.md")]));
        let executor = RoundExecutor::new(vec![Arc::new(slow), Arc::new(fast)], TaskScheduler::new(4));
        let mut state = ResearchState::new();
        let summary = executor
            .execute(&mut state, &["q".to_string()], &CancellationToken::new())
            .await;
        assert_eq!(summary.tasks, 2);
        assert_eq!(summary.failures, 0);
        let ordinals: Vec<_> = state.findings().iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1]);
        let ids: Vec<_> = state.registry().snapshot().into_iter().map(|r| r.short_id).collect();
        assert_eq!(ids, vec!["1", "KB-1"]);
    }

    #[tokio::test]
    async fn test_cancellation_folds_partial_results() {
        let fast = StaticAdapter::new(BackendKind::Web)
            .with_fallback(Ok(vec![RetrievedItem::new("https://fast", "f", "Fast")]));
        let hung = StaticAdapter::new(BackendKind::KnowledgeBase).with_delay(Duration::from_secs(30));
        let executor = RoundExecutor::new(vec![Arc::new(fast), Arc::new(hung)], TaskScheduler::new(4));
        let mut state = ResearchState::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            executor.execute(&mut state, &["q".to_string()], &cancel),
        )
        .await
        .expect("barrier should be short-circuited");
        assert!(summary.cancelled);
        assert_eq!(summary.failures, 1);
        assert_eq!(state.findings().len(), 2);
        assert!(state.findings()[0].failure.is_none());
        assert_eq!(state.findings()[1].failure.as_deref(), Some("cancelled"));
        assert_eq!(state.registry().len(), 1);
    }
}
