//! 参考文献呈现：把答案中的 `[short_id]` 按首次出现顺序重编号为 `[1]..[n]`，并生成 References 段落
//!
//! 知识库路径若带 PubMed id（`_<数字>_auto_<数字>.md` 或 `_<数字>.md`），显示为 PubMed 链接。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::research::types::{BackendKind, SourceRecord};

static MARKER_RE: OnceLock<Regex> = OnceLock::new();
static PUBMED_AUTO_RE: OnceLock<Regex> = OnceLock::new();
static PUBMED_PLAIN_RE: OnceLock<Regex> = OnceLock::new();

fn marker_re() -> &'static Regex {
    MARKER_RE.get_or_init(|| Regex::new(r"\[(KB-\d+|\d+)\]").unwrap())
}

/// 把外部文本中形似引用标记的 `[7]` / `[KB-2]` 改写为 `(7)` / `(KB-2)`
pub fn neutralize_markers(text: &str) -> String {
    marker_re().replace_all(text, "($1)").into_owned()
}

/// 从知识库文档路径中提取 PubMed id
pub fn pubmed_id(path: &str) -> Option<&str> {
    let auto = PUBMED_AUTO_RE.get_or_init(|| Regex::new(r"_(\d+)_auto_\d+\.md$").unwrap());
    let plain = PUBMED_PLAIN_RE.get_or_init(|| Regex::new(r"_(\d+)\.md$").unwrap());
    auto.captures(path)
        .or_else(|| plain.captures(path))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// 来源的展示目标：Web 为 URL，知识库优先 PubMed 链接，否则原路径
pub fn reference_target(source: &SourceRecord) -> String {
    match source.backend_kind {
        BackendKind::Web => source.canonical_value.clone(),
        BackendKind::KnowledgeBase => match pubmed_id(&source.canonical_value) {
            Some(id) => format!("https://pubmed.ncbi.nlm.nih.gov/{}/", id),
            None => source.canonical_value.clone(),
        },
    }
}

/// 单条参考文献
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub number: usize,
    pub short_id: String,
    pub label: String,
    pub target: String,
}

/// 重编号后的答案
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedAnswer {
    pub text: String,
    pub references: Vec<Reference>,
}

impl RenderedAnswer {
    pub fn to_markdown(&self) -> String {
        if self.references.is_empty() {
            return self.text.clone();
        }
        let lines: Vec<String> = self
            .references
            .iter()
            .map(|r| format!("[{}] {}", r.number, r.target))
            .collect();
        format!("{}\n\n## References\n\n{}", self.text, lines.join("\n\n"))
    }
}

/// 重编号答案中的引用标记；未登记的标记会被删除，不会与新编号混淆。答案一个来源都没引用时列出全部来源。
pub fn render_answer(text: &str, sources: &[SourceRecord]) -> RenderedAnswer {
    let by_id: HashMap<&str, &SourceRecord> =
        sources.iter().map(|s| (s.short_id.as_str(), s)).collect();
    let mut numbering: HashMap<String, usize> = HashMap::new();
    let mut cited: Vec<&SourceRecord> = Vec::new();

    let rewritten = marker_re().replace_all(text, |caps: &Captures| {
        let id = &caps[1];
        let Some(source) = by_id.get(id) else {
            tracing::debug!(marker = %&caps[0], "dropping citation to unregistered source");
            return String::new();
        };
        let next = numbering.len() + 1;
        let number = *numbering.entry(id.to_string()).or_insert_with(|| {
            cited.push(*source);
            next
        });
        format!("[{}]", number)
    });

    let listed: Vec<&SourceRecord> = if cited.is_empty() {
        sources.iter().collect()
    } else {
        cited
    };
    let references = listed
        .into_iter()
        .enumerate()
        .map(|(idx, s)| Reference {
            number: idx + 1,
            short_id: s.short_id.clone(),
            label: s.label.clone(),
            target: reference_target(s),
        })
        .collect();

    RenderedAnswer {
        text: rewritten.into_owned(),
        references,
    }
}
