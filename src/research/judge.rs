//! 判断能力：查询生成、反思、答案合成
//!
//! Judge 是研究循环唯一依赖的“大模型”接口；LlmJudge 用 LlmClient 实现它，
//! 查询生成与反思要求模型按 schemars 生成的 JSON Schema 输出，解析失败视为 Transient。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::core::JudgmentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::research::prompts;
use crate::research::state::ResearchTopic;
use crate::research::types::ReflectionVerdict;

/// 判断能力接口
#[async_trait]
pub trait Judge: Send + Sync {
    /// 为主题生成至多 count 条检索查询
    async fn generate_queries(
        &self,
        topic: &ResearchTopic,
        count: usize,
    ) -> Result<Vec<String>, JudgmentError>;

    /// 基于已有 Finding 判断是否足够，并给出后续查询
    async fn reflect(
        &self,
        topic: &ResearchTopic,
        findings: &str,
    ) -> Result<ReflectionVerdict, JudgmentError>;

    /// 合成最终回答（保留正文中的引用标记）
    async fn synthesize(&self, topic: &ResearchTopic, findings: &str)
        -> Result<String, JudgmentError>;
}

/// 查询生成的结构化输出
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchQueryList {
    /// 检索查询列表
    pub query: Vec<String>,
    /// 这些查询与主题的关系
    #[serde(default)]
    pub rationale: String,
}

/// 从模型输出中提取 JSON（```json ... ``` 代码块或首个 { 到最后一个 }）
fn extract_json(output: &str) -> &str {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// 解析结构化输出
pub fn parse_structured<T: DeserializeOwned>(output: &str) -> Result<T, JudgmentError> {
    let json = extract_json(output);
    serde_json::from_str(json).map_err(|e| {
        JudgmentError::Transient(format!("unparseable structured output ({}): {}", e, json))
    })
}

fn schema_text<T: JsonSchema>() -> String {
    serde_json::to_string_pretty(&schema_for!(T)).unwrap_or_default()
}

/// 基于 LlmClient 的 Judge：三个阶段可以使用不同模型
pub struct LlmJudge {
    query_llm: Arc<dyn LlmClient>,
    reflection_llm: Arc<dyn LlmClient>,
    answer_llm: Arc<dyn LlmClient>,
}

impl LlmJudge {
    /// 三个阶段共用同一个客户端
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            query_llm: Arc::clone(&llm),
            reflection_llm: Arc::clone(&llm),
            answer_llm: llm,
        }
    }

    pub fn with_clients(
        query_llm: Arc<dyn LlmClient>,
        reflection_llm: Arc<dyn LlmClient>,
        answer_llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            query_llm,
            reflection_llm,
            answer_llm,
        }
    }

    /// 三个客户端的 token 使用合计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        [&self.query_llm, &self.reflection_llm, &self.answer_llm]
            .iter()
            .map(|c| c.token_usage())
            .fold((0, 0, 0), |acc, u| (acc.0 + u.0, acc.1 + u.1, acc.2 + u.2))
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn generate_queries(
        &self,
        topic: &ResearchTopic,
        count: usize,
    ) -> Result<Vec<String>, JudgmentError> {
        let prompt = prompts::fill(
            prompts::QUERY_WRITER,
            &[
                ("current_date", &prompts::current_date()),
                ("research_topic", topic.as_str()),
                ("number_queries", &count.to_string()),
                ("schema", &schema_text::<SearchQueryList>()),
            ],
        );
        let output = self.query_llm.complete(&[Message::user(prompt)]).await?;
        let list: SearchQueryList = parse_structured(&output)?;
        tracing::debug!(rationale = %list.rationale, queries = ?list.query, "queries generated");
        Ok(list.query)
    }

    async fn reflect(
        &self,
        topic: &ResearchTopic,
        findings: &str,
    ) -> Result<ReflectionVerdict, JudgmentError> {
        let prompt = prompts::fill(
            prompts::REFLECTION,
            &[
                ("current_date", &prompts::current_date()),
                ("research_topic", topic.as_str()),
                ("schema", &schema_text::<ReflectionVerdict>()),
                ("summaries", findings),
            ],
        );
        let output = self.reflection_llm.complete(&[Message::user(prompt)]).await?;
        parse_structured(&output)
    }

    async fn synthesize(
        &self,
        topic: &ResearchTopic,
        findings: &str,
    ) -> Result<String, JudgmentError> {
        let prompt = prompts::fill(
            prompts::ANSWER,
            &[
                ("current_date", &prompts::current_date()),
                ("research_topic", topic.as_str()),
                ("summaries", findings),
            ],
        );
        Ok(self.answer_llm.complete(&[Message::user(prompt)]).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};

    fn topic() -> ResearchTopic {
        ResearchTopic::new("what is X").unwrap()
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("Sure! {\"a\":1} hope this helps"), "{\"a\":1}");
        assert_eq!(extract_json("no json"), "no json");
    }

    #[tokio::test]
    async fn test_generate_queries_parses_structured_output() {
        let llm = Arc::new(MockLlmClient::with_replies([
            r#"```json
{"query": ["X definition", "X history"], "rationale": "cover basics"}
```"#,
        ]));
        let judge = LlmJudge::new(llm.clone());
        let queries = judge.generate_queries(&topic(), 2).await.unwrap();
        assert_eq!(queries, vec!["X definition", "X history"]);
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("what is X"));
        assert!(prompt.contains("Never exceed 2 queries"));
        assert!(prompt.contains("\"query\""));
    }

    #[tokio::test]
    async fn test_reflect_accepts_is_sufficient_alias() {
        let llm = Arc::new(MockLlmClient::with_replies([
            r#"{"is_sufficient": false, "knowledge_gap": "dates", "follow_up_queries": ["X timeline"]}"#,
        ]));
        let judge = LlmJudge::new(llm.clone());
        let verdict = judge.reflect(&topic(), "## Round 1\n\nsome [1]").await.unwrap();
        assert!(!verdict.sufficient);
        assert_eq!(verdict.knowledge_gap, "dates");
        assert_eq!(verdict.follow_up_queries, vec!["X timeline"]);
        assert!(llm.prompts()[0].contains("some [1]"));
    }

    #[tokio::test]
    async fn test_braces_in_topic_are_not_expanded() {
        let llm = Arc::new(MockLlmClient::with_replies([r#"{"sufficient": true}"#]));
        let judge = LlmJudge::new(llm.clone());
        let topic = ResearchTopic::new("what does {summaries} mean in {schema}?").unwrap();
        judge.reflect(&topic, "FINDINGS-BODY").await.unwrap();
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("what does {summaries} mean in {schema}?"));
        assert_eq!(prompt.matches("FINDINGS-BODY").count(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_output_is_transient() {
        let llm = Arc::new(MockLlmClient::with_replies(["I cannot answer"]));
        let judge = LlmJudge::new(llm);
        assert!(matches!(
            judge.reflect(&topic(), "").await,
            Err(JudgmentError::Transient(_))
        ));
    }

    #[tokio::test]
    async fn test_llm_errors_keep_their_class() {
        let llm = Arc::new(MockLlmClient::new(vec![Err(LlmError::Fatal("401".into()))]));
        let judge = LlmJudge::new(llm);
        assert_eq!(
            judge.synthesize(&topic(), "").await,
            Err(JudgmentError::Fatal("401".into()))
        );
    }

    #[tokio::test]
    async fn test_separate_clients_per_stage() {
        let q = Arc::new(MockLlmClient::with_replies([r#"{"query": ["a"]}"#]));
        let r = Arc::new(MockLlmClient::default());
        let a = Arc::new(MockLlmClient::with_replies(["final [1]"]));
        let judge = LlmJudge::with_clients(q.clone(), r.clone(), a.clone());
        judge.generate_queries(&topic(), 1).await.unwrap();
        assert_eq!(judge.synthesize(&topic(), "f").await.unwrap(), "final [1]");
        assert_eq!((q.calls(), r.calls(), a.calls()), (1, 0, 1));
    }
}
