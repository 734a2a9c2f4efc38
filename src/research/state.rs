//! 研究状态：贯穿整个循环的累加器
//!
//! 由 ResearchLoop 独占；协作者只拿到只读访问和几个窄的追加操作（append_round / mark_round_attempted / record_verdict），
//! 所有字段都不对外可变。

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::ResearchError;
use crate::memory::{topic_from_history, Message};
use crate::research::citation::CitationRegistry;
use crate::research::types::{FindingChunk, Query, ReflectionVerdict};

/// Finding 之间的分隔
const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// 研究主题：循环开始时确定，之后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchTopic(String);

impl ResearchTopic {
    pub fn new(text: impl Into<String>) -> Result<Self, ResearchError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ResearchError::EmptyTopic);
        }
        Ok(Self(text))
    }

    /// 从对话历史推导主题
    pub fn from_history(messages: &[Message]) -> Result<Self, ResearchError> {
        Self::new(topic_from_history(messages))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResearchTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 一轮检索的结果批次，一次性追加到状态
#[derive(Debug, Clone)]
pub struct RoundBatch {
    pub queries: Vec<Query>,
    pub chunks: Vec<FindingChunk>,
}

/// 研究状态
#[derive(Debug)]
pub struct ResearchState {
    queries: Vec<Query>,
    findings: Vec<FindingChunk>,
    registry: Arc<CitationRegistry>,
    /// 已尝试的轮数（反思调用前递增）
    round_counter: usize,
    /// 已折叠的轮数
    rounds_executed: usize,
    latest_verdict: Option<ReflectionVerdict>,
}

impl Default for ResearchState {
    fn default() -> Self {
        Self::new()
    }
}

impl ResearchState {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(CitationRegistry::new()))
    }

    pub fn with_registry(registry: Arc<CitationRegistry>) -> Self {
        Self {
            queries: Vec::new(),
            findings: Vec::new(),
            registry,
            round_counter: 0,
            rounds_executed: 0,
            latest_verdict: None,
        }
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn findings(&self) -> &[FindingChunk] {
        &self.findings
    }

    pub fn registry(&self) -> &Arc<CitationRegistry> {
        &self.registry
    }

    pub fn round_counter(&self) -> usize {
        self.round_counter
    }

    pub fn rounds_executed(&self) -> usize {
        self.rounds_executed
    }

    pub fn latest_verdict(&self) -> Option<&ReflectionVerdict> {
        self.latest_verdict.as_ref()
    }

    /// 下一条查询的 ordinal：接着已发出的最大值继续，从不复用
    pub fn next_ordinal(&self) -> usize {
        self.queries.last().map(|q| q.ordinal + 1).unwrap_or(0)
    }

    /// 原子追加一轮结果；查询与 Finding 均按 ordinal 升序写入
    pub fn append_round(&mut self, mut batch: RoundBatch) {
        batch.queries.sort_by_key(|q| q.ordinal);
        batch.chunks.sort_by_key(|c| c.ordinal);
        debug_assert!(batch
            .queries
            .first()
            .map_or(true, |q| q.ordinal >= self.next_ordinal()));
        self.queries.extend(batch.queries);
        self.findings.extend(batch.chunks);
        self.rounds_executed += 1;
    }

    /// 记录一轮已尝试，返回递增后的计数
    pub fn mark_round_attempted(&mut self) -> usize {
        self.round_counter += 1;
        self.round_counter
    }

    pub fn record_verdict(&mut self, verdict: ReflectionVerdict) {
        self.latest_verdict = Some(verdict);
    }

    /// 全部 Finding 文本：按追加顺序，每轮以 `## Round n` 开头
    pub fn findings_text(&self) -> String {
        let mut sections = Vec::new();
        let mut current_round = None;
        let mut current: Vec<&str> = Vec::new();
        for chunk in &self.findings {
            if current_round != Some(chunk.round) {
                if let Some(round) = current_round {
                    sections.push(render_round(round, &current));
                }
                current_round = Some(chunk.round);
                current.clear();
            }
            current.push(&chunk.text);
        }
        if let Some(round) = current_round {
            sections.push(render_round(round, &current));
        }
        sections.join("\n\n")
    }
}

fn render_round(round: usize, texts: &[&str]) -> String {
    format!("## Round {}\n\n{}", round + 1, texts.join(CHUNK_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::types::BackendKind;

    fn chunk(ordinal: usize, round: usize, text: &str) -> FindingChunk {
        FindingChunk {
            ordinal,
            round,
            backend: BackendKind::Web,
            query: "q".into(),
            text: text.into(),
            citations: Vec::new(),
            failure: None,
        }
    }

    fn query(ordinal: usize, round: usize) -> Query {
        Query {
            ordinal,
            text: "q".into(),
            backend: BackendKind::Web,
            round,
        }
    }

    #[test]
    fn test_topic_rejects_blank() {
        assert!(matches!(ResearchTopic::new("  \n"), Err(ResearchError::EmptyTopic)));
        assert!(matches!(ResearchTopic::from_history(&[]), Err(ResearchError::EmptyTopic)));
        assert_eq!(ResearchTopic::new("what is X").unwrap().as_str(), "what is X");
    }

    #[test]
    fn test_append_round_sorts_and_continues_ordinals() {
        let mut state = ResearchState::new();
        assert_eq!(state.next_ordinal(), 0);
        state.append_round(RoundBatch {
            queries: vec![query(1, 0), query(0, 0)],
            chunks: vec![chunk(1, 0, "b"), chunk(0, 0, "a")],
        });
        assert_eq!(state.next_ordinal(), 2);
        assert_eq!(state.findings()[0].text, "a");
        assert_eq!(state.rounds_executed(), 1);
        assert_eq!(state.round_counter(), 0);
    }

    #[test]
    fn test_findings_text_marks_round_boundaries() {
        let mut state = ResearchState::new();
        state.append_round(RoundBatch {
            queries: vec![query(0, 0), query(1, 0)],
            chunks: vec![chunk(0, 0, "a"), chunk(1, 0, "b")],
        });
        state.append_round(RoundBatch {
            queries: vec![query(2, 1)],
            chunks: vec![chunk(2, 1, "c")],
        });
        assert_eq!(
            state.findings_text(),
            "## Round 1\n\na\n\n---\n\nb\n\n## Round 2\n\nc"
        );
    }

    #[test]
    fn test_round_counter_and_verdict() {
        let mut state = ResearchState::new();
        assert_eq!(state.mark_round_attempted(), 1);
        assert_eq!(state.mark_round_attempted(), 2);
        assert!(state.latest_verdict().is_none());
        state.record_verdict(ReflectionVerdict {
            sufficient: true,
            ..Default::default()
        });
        assert!(state.latest_verdict().unwrap().sufficient);
    }
}
