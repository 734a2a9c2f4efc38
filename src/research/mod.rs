//! 研究编排：状态、引用登记、判断、轮执行、反思、答案合成与主循环

pub mod citation;
pub mod events;
pub mod finalizer;
pub mod judge;
pub mod loop_;
pub mod prompts;
pub mod references;
pub mod reflection;
pub mod round;
pub mod state;
pub mod types;

pub use citation::CitationRegistry;
pub use events::{EventSender, LoopPhase, ResearchEvent};
pub use finalizer::{AnswerFinalizer, ResearchOutcome};
pub use judge::{Judge, LlmJudge, SearchQueryList};
pub use loop_::{LoopConfig, ResearchLoop};
pub use references::{render_answer, Reference, RenderedAnswer};
pub use reflection::{decide, Decision, ReflectionGate, StopReason};
pub use round::{RoundExecutor, RoundSummary};
pub use state::{ResearchState, ResearchTopic, RoundBatch};
pub use types::{BackendKind, FindingChunk, Query, ReflectionVerdict, RetrievedItem, SourceRecord};
