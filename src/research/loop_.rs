//! 研究主循环
//!
//! Generating -> ExecutingRound -> Reflecting -> (ExecutingRound | Finalizing) -> Done。
//! 停止条件：反思认为足够、轮次预算用尽、没有后续查询，或循环被取消。
//! 取消发生在某一轮中途时，已收集的结果照常折叠，跳过反思直接合成答案。

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::ResearchSection;
use crate::core::{ResearchError, TaskScheduler};
use crate::research::events::{send_event, EventSender, LoopPhase, ResearchEvent};
use crate::research::finalizer::{AnswerFinalizer, ResearchOutcome};
use crate::research::judge::Judge;
use crate::research::reflection::{decide, Decision, ReflectionGate, StopReason};
use crate::research::round::RoundExecutor;
use crate::research::state::{ResearchState, ResearchTopic};
use crate::retrieval::RetrievalAdapter;

/// 循环参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// 首轮查询条数（> 0）
    pub initial_query_count: usize,
    /// 最大轮数；0 仍执行一轮
    pub max_rounds: usize,
    /// 单轮并发上限（> 0）
    pub max_concurrent_tasks: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from(&ResearchSection::default())
    }
}

impl From<&ResearchSection> for LoopConfig {
    fn from(section: &ResearchSection) -> Self {
        Self {
            initial_query_count: section.initial_query_count,
            max_rounds: section.max_rounds,
            max_concurrent_tasks: section.max_concurrent_tasks,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.initial_query_count == 0 {
            return Err(ResearchError::InvalidConfig(
                "initial_query_count must be greater than 0".into(),
            ));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ResearchError::InvalidConfig(
                "max_concurrent_tasks must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// 研究循环：持有 Judge、各后端适配器与循环参数；每次 run 使用全新的 ResearchState
pub struct ResearchLoop {
    judge: Arc<dyn Judge>,
    executor: RoundExecutor,
    gate: ReflectionGate,
    finalizer: AnswerFinalizer,
    config: LoopConfig,
    events: Option<EventSender>,
}

impl ResearchLoop {
    /// 每种后端最多一个适配器，且至少一个
    pub fn new(
        judge: Arc<dyn Judge>,
        adapters: Vec<Arc<dyn RetrievalAdapter>>,
        config: LoopConfig,
    ) -> Result<Self, ResearchError> {
        config.validate()?;
        if adapters.is_empty() {
            return Err(ResearchError::InvalidConfig(
                "at least one retrieval backend is required".into(),
            ));
        }
        let mut kinds = HashSet::new();
        for adapter in &adapters {
            if !kinds.insert(adapter.kind()) {
                return Err(ResearchError::InvalidConfig(format!(
                    "duplicate retrieval backend: {}",
                    adapter.kind()
                )));
            }
        }
        Ok(Self {
            executor: RoundExecutor::new(adapters, TaskScheduler::new(config.max_concurrent_tasks)),
            gate: ReflectionGate::new(Arc::clone(&judge)),
            finalizer: AnswerFinalizer::new(Arc::clone(&judge)),
            judge,
            config,
            events: None,
        })
    }

    /// 设置过程事件通道
    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.executor = self.executor.with_events(tx.clone());
        self.events = Some(tx);
        self
    }

    fn phase(&self, phase: LoopPhase) {
        tracing::debug!(?phase, "phase changed");
        send_event(self.events.as_ref(), ResearchEvent::PhaseChanged { phase });
    }

    /// 执行一次完整研究
    pub async fn run(
        &self,
        topic: &ResearchTopic,
        cancel: CancellationToken,
    ) -> Result<ResearchOutcome, ResearchError> {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("research", %run_id);
        self.run_inner(topic, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        topic: &ResearchTopic,
        cancel: CancellationToken,
    ) -> Result<ResearchOutcome, ResearchError> {
        if cancel.is_cancelled() {
            return Err(ResearchError::Cancelled);
        }
        tracing::info!(topic = %topic, max_rounds = self.config.max_rounds, backends = self.executor.backend_count(), "research started");

        self.phase(LoopPhase::Generating);
        let count = self.config.initial_query_count;
        let generated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
            result = self.judge.generate_queries(topic, count) => result?,
        };
        let mut texts = normalize_queries(generated, topic, count);
        tracing::info!(queries = ?texts, "initial queries");
        send_event(
            self.events.as_ref(),
            ResearchEvent::QueriesGenerated {
                queries: texts.clone(),
            },
        );

        let mut state = ResearchState::new();
        let stop_reason = loop {
            self.phase(LoopPhase::ExecutingRound);
            let summary = self.executor.execute(&mut state, &texts, &cancel).await;
            if summary.cancelled {
                let attempted = state.mark_round_attempted();
                tracing::warn!(round_counter = attempted, "research cancelled mid-round; finalizing with collected evidence");
                break StopReason::Cancelled;
            }

            self.phase(LoopPhase::Reflecting);
            let verdict = self.gate.reflect(topic, &mut state).await?;
            send_event(
                self.events.as_ref(),
                ResearchEvent::Reflected {
                    round_counter: state.round_counter(),
                    sufficient: verdict.sufficient,
                    knowledge_gap: verdict.knowledge_gap.clone(),
                    follow_up_queries: verdict.follow_up_queries.clone(),
                },
            );

            match decide(&verdict, state.round_counter(), self.config.max_rounds) {
                Decision::Stop(reason) => break reason,
                Decision::Continue(_) if cancel.is_cancelled() => break StopReason::Cancelled,
                Decision::Continue(follow_ups) => texts = follow_ups,
            }
        };
        tracing::info!(%stop_reason, rounds = state.round_counter(), "research loop stopped");

        self.phase(LoopPhase::Finalizing);
        let outcome = self.finalizer.finalize(topic, state, stop_reason).await?;

        send_event(
            self.events.as_ref(),
            ResearchEvent::Done {
                rounds: outcome.rounds,
                sources: outcome.sources.len(),
            },
        );
        self.phase(LoopPhase::Done);
        Ok(outcome)
    }
}

/// 去掉空白查询并截断到 count 条；全部为空时退回主题本身
fn normalize_queries(generated: Vec<String>, topic: &ResearchTopic, count: usize) -> Vec<String> {
    let mut texts: Vec<String> = generated
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .take(count)
        .collect();
    if texts.is_empty() {
        tracing::warn!("query generation returned nothing usable; searching the topic itself");
        texts.push(topic.as_str().to_string());
    }
    texts
}
