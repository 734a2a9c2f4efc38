//! 答案合成：调用一次 synthesize，连同来源快照一起输出

use std::sync::Arc;

use serde::Serialize;

use crate::core::JudgmentError;
use crate::research::judge::Judge;
use crate::research::reflection::StopReason;
use crate::research::state::{ResearchState, ResearchTopic};
use crate::research::types::SourceRecord;

/// 一次研究的最终结果
#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutcome {
    /// 合成文本，原样保留其中的 `[short_id]` 标记
    pub final_text: String,
    /// 登记顺序的来源快照
    pub sources: Vec<SourceRecord>,
    /// 已尝试的轮数
    pub rounds: usize,
    pub queries_issued: usize,
    pub stop_reason: StopReason,
}

pub struct AnswerFinalizer {
    judge: Arc<dyn Judge>,
}

impl AnswerFinalizer {
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self { judge }
    }

    pub async fn finalize(
        &self,
        topic: &ResearchTopic,
        state: ResearchState,
        stop_reason: StopReason,
    ) -> Result<ResearchOutcome, JudgmentError> {
        let findings = state.findings_text();
        let final_text = self.judge.synthesize(topic, &findings).await?;
        let sources = state.registry().snapshot();
        tracing::info!(
            rounds = state.round_counter(),
            sources = sources.len(),
            answer_chars = final_text.len(),
            %stop_reason,
            "answer synthesized"
        );
        Ok(ResearchOutcome {
            final_text,
            sources,
            rounds: state.round_counter(),
            queries_issued: state.queries().len(),
            stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::research::judge::LlmJudge;
    use crate::research::types::BackendKind;

    #[tokio::test]
    async fn test_finalize_keeps_text_and_snapshot() {
        let llm = Arc::new(MockLlmClient::with_replies(["X is Y [1] [KB-1]"]));
        let finalizer = AnswerFinalizer::new(Arc::new(LlmJudge::new(llm.clone())));
        let mut state = ResearchState::new();
        state.registry().register("https://u1", "U1", BackendKind::Web);
        state.registry().register("/kb/a_1.md", "a_1.md", BackendKind::KnowledgeBase);
        state.mark_round_attempted();

        let topic = ResearchTopic::new("what is X").unwrap();
        let outcome = finalizer
            .finalize(&topic, state, StopReason::Sufficient)
            .await
            .unwrap();
        assert_eq!(outcome.final_text, "X is Y [1] [KB-1]");
        assert_eq!(outcome.sources.len(), 2);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.queries_issued, 0);
        assert!(llm.prompts()[0].contains("what is X"));
    }
}
