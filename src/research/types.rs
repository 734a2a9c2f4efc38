//! 研究流程的数据类型：查询、来源、Finding、反思结论

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 检索后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Web,
    KnowledgeBase,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Web => write!(f, "web"),
            BackendKind::KnowledgeBase => write!(f, "knowledge_base"),
        }
    }
}

/// 派发给某一后端的一条查询；ordinal 在整个循环内唯一且单调递增
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    pub ordinal: usize,
    pub text: String,
    pub backend: BackendKind,
    /// 所属轮次（从 0 开始）
    pub round: usize,
}

/// 适配器返回的单条结果（尚未登记引用）
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedItem {
    /// URL 或知识库文档路径，即去重键
    pub raw_identity: String,
    pub snippet_text: String,
    pub display_label: String,
}

impl RetrievedItem {
    pub fn new(
        raw_identity: impl Into<String>,
        snippet_text: impl Into<String>,
        display_label: impl Into<String>,
    ) -> Self {
        Self {
            raw_identity: raw_identity.into(),
            snippet_text: snippet_text.into(),
            display_label: display_label.into(),
        }
    }
}

/// 已登记的来源；short_id 首次登记时分配，之后永不改变
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    pub canonical_value: String,
    pub short_id: String,
    pub label: String,
    pub backend_kind: BackendKind,
}

impl SourceRecord {
    /// 正文中使用的引用标记，如 `[3]`、`[KB-1]`
    pub fn marker(&self) -> String {
        marker(&self.short_id)
    }
}

pub fn marker(short_id: &str) -> String {
    format!("[{}]", short_id)
}

/// 一个后端对一条查询的文本结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindingChunk {
    pub ordinal: usize,
    pub round: usize,
    pub backend: BackendKind,
    pub query: String,
    pub text: String,
    /// 文本中出现的 short_id（按首次出现顺序）
    pub citations: Vec<String>,
    /// 任务失败时的失败类型；None 表示检索成功
    pub failure: Option<String>,
}

impl FindingChunk {
    pub fn is_placeholder(&self) -> bool {
        self.failure.is_some()
    }
}

/// 反思结论
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReflectionVerdict {
    /// 已有材料是否足以回答问题
    #[serde(alias = "is_sufficient")]
    pub sufficient: bool,
    /// 仍缺失的信息
    #[serde(default)]
    pub knowledge_gap: String,
    /// 下一轮要检索的查询
    #[serde(default)]
    pub follow_up_queries: Vec<String>,
}
