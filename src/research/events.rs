//! 研究过程事件：用于向 CLI / 前端推送阶段变化、检索进度与反思结论

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::research::types::BackendKind;

/// 研究循环所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Generating,
    ExecutingRound,
    Reflecting,
    Finalizing,
    Done,
}

/// 单个过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchEvent {
    PhaseChanged { phase: LoopPhase },
    /// 首轮查询已生成
    QueriesGenerated { queries: Vec<String> },
    /// 一轮检索开始（tasks = 查询数 × 后端数）
    RoundStarted { round: usize, tasks: usize },
    /// 单个检索任务结束
    RetrievalFinished {
        ordinal: usize,
        backend: BackendKind,
        query: String,
        results: usize,
        failure: Option<String>,
    },
    /// 一轮结果已折叠进状态
    RoundFolded {
        round: usize,
        chunks: usize,
        failures: usize,
        cancelled: bool,
    },
    Reflected {
        round_counter: usize,
        sufficient: bool,
        knowledge_gap: String,
        follow_up_queries: Vec<String>,
    },
    Done { rounds: usize, sources: usize },
}

pub type EventSender = UnboundedSender<ResearchEvent>;

pub(crate) fn send_event(tx: Option<&EventSender>, ev: ResearchEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
