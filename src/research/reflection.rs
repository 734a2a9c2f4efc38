//! 反思关卡：每轮检索后判断证据是否足够，决定继续还是停止
//!
//! 轮次计数在调用 Judge **之前**递增；停止条件为 `sufficient || round_counter >= max_rounds`，
//! 因此 max_rounds = 0 时恰好执行一轮。没有后续查询时同样停止，不跑空轮。

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::JudgmentError;
use crate::research::judge::Judge;
use crate::research::state::{ResearchState, ResearchTopic};
use crate::research::types::ReflectionVerdict;

/// 循环停止的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// 反思认为证据已足够
    Sufficient,
    /// 轮次预算用尽
    RoundBudgetExhausted,
    /// 证据不足但给不出后续查询
    NoFollowUps,
    /// 循环被取消（截止时间或信号）
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Sufficient => "sufficient",
            StopReason::RoundBudgetExhausted => "round budget exhausted",
            StopReason::NoFollowUps => "no follow-up queries",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// 反思后的走向
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// 用这些查询再跑一轮
    Continue(Vec<String>),
    Stop(StopReason),
}

/// 根据结论、已尝试轮数与预算做决定（纯函数）
pub fn decide(verdict: &ReflectionVerdict, round_counter: usize, max_rounds: usize) -> Decision {
    if verdict.sufficient {
        return Decision::Stop(StopReason::Sufficient);
    }
    if round_counter >= max_rounds {
        return Decision::Stop(StopReason::RoundBudgetExhausted);
    }
    let follow_ups: Vec<String> = verdict
        .follow_up_queries
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect();
    if follow_ups.is_empty() {
        return Decision::Stop(StopReason::NoFollowUps);
    }
    Decision::Continue(follow_ups)
}

pub struct ReflectionGate {
    judge: Arc<dyn Judge>,
}

impl ReflectionGate {
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self { judge }
    }

    /// 递增轮次计数，调用一次 reflect，记录并返回结论
    pub async fn reflect(
        &self,
        topic: &ResearchTopic,
        state: &mut ResearchState,
    ) -> Result<ReflectionVerdict, JudgmentError> {
        let round_counter = state.mark_round_attempted();
        let findings = state.findings_text();
        tracing::debug!(round_counter, findings_chars = findings.len(), "reflecting");
        let verdict = self.judge.reflect(topic, &findings).await?;
        tracing::info!(
            round_counter,
            sufficient = verdict.sufficient,
            follow_ups = verdict.follow_up_queries.len(),
            gap = %verdict.knowledge_gap,
            "reflection verdict"
        );
        state.record_verdict(verdict.clone());
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::research::judge::LlmJudge;

    fn verdict(sufficient: bool, follow_ups: &[&str]) -> ReflectionVerdict {
        ReflectionVerdict {
            sufficient,
            knowledge_gap: String::new(),
            follow_up_queries: follow_ups.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_sufficient_stops_even_with_budget_left() {
        assert_eq!(
            decide(&verdict(true, &["more"]), 1, 5),
            Decision::Stop(StopReason::Sufficient)
        );
    }

    #[test]
    fn test_budget_is_checked_after_increment() {
        assert_eq!(
            decide(&verdict(false, &["more"]), 1, 0),
            Decision::Stop(StopReason::RoundBudgetExhausted)
        );
        assert_eq!(
            decide(&verdict(false, &["more"]), 2, 2),
            Decision::Stop(StopReason::RoundBudgetExhausted)
        );
        assert_eq!(
            decide(&verdict(false, &["more"]), 1, 2),
            Decision::Continue(vec!["more".into()])
        );
    }

    #[test]
    fn test_blank_follow_ups_stop() {
        assert_eq!(
            decide(&verdict(false, &["", "  "]), 1, 3),
            Decision::Stop(StopReason::NoFollowUps)
        );
    }

    #[tokio::test]
    async fn test_gate_increments_before_judging_and_records_verdict() {
        let llm = Arc::new(MockLlmClient::with_replies([
            r#"{"sufficient": false, "knowledge_gap": "g", "follow_up_queries": ["f"]}"#,
        ]));
        let gate = ReflectionGate::new(Arc::new(LlmJudge::new(llm.clone())));
        let topic = ResearchTopic::new("t").unwrap();
        let mut state = ResearchState::new();
        let v = gate.reflect(&topic, &mut state).await.unwrap();
        assert_eq!(state.round_counter(), 1);
        assert_eq!(state.latest_verdict(), Some(&v));
        assert_eq!(v.follow_up_queries, vec!["f"]);
    }

    #[tokio::test]
    async fn test_gate_failure_still_counts_the_round() {
        let gate = ReflectionGate::new(Arc::new(LlmJudge::new(Arc::new(MockLlmClient::default()))));
        let topic = ResearchTopic::new("t").unwrap();
        let mut state = ResearchState::new();
        assert!(gate.reflect(&topic, &mut state).await.is_err());
        assert_eq!(state.round_counter(), 1);
        assert!(state.latest_verdict().is_none());
    }
}
