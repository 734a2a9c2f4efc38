//! 三个判断阶段的提示词模板
//!
//! 占位符：{current_date}、{research_topic}、{number_queries}、{summaries}、{schema}。

use std::sync::OnceLock;

use regex::{Captures, Regex};

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

pub const QUERY_WRITER: &str = r#"Your goal is to generate sophisticated and diverse web search queries for the research topic below.

- Prefer a single query; add more only when the topic has several distinct aspects. Never exceed {number_queries} queries.
- Queries must not be near-duplicates of each other.
- Aim for the most current information. The current date is {current_date}.

Topic: {research_topic}

Respond with a single JSON object matching this schema:
{schema}"#;

pub const REFLECTION: &str = r#"You are reviewing research summaries about "{research_topic}". The current date is {current_date}.

- Decide whether the summaries are sufficient to answer the question.
- If not, describe the knowledge gap and write self-contained follow-up search queries that close it.
- If they are sufficient, return an empty follow_up_queries list.
- Citation markers such as [3] or [KB-2] refer to sources; keep them as they are.

Summaries:
{summaries}

Respond with a single JSON object matching this schema:
{schema}"#;

pub const ANSWER: &str = r#"Write a well-structured answer to the user's question using only the summaries below. The current date is {current_date}.

- Cite every claim with the citation markers exactly as they appear in the summaries, e.g. [3] or [KB-2].
- Do not invent sources or markers.

User question:
{research_topic}

Summaries:
{summaries}"#;

/// 一次性填充占位符；填入的文本（主题、Finding）中的花括号不会再被展开，未知占位符原样保留
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let re = PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").unwrap());
    re.replace_all(template, |caps: &Captures| {
        vars.iter()
            .find(|(key, _)| *key == &caps[1])
            .map(|(_, value)| value.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

/// 当前日期，如 "October 18, 2026"
pub fn current_date() -> String {
    chrono::Local::now().format("%B %d, %Y").to_string()
}
