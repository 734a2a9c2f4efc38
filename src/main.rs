//! prosearch - 多来源迭代式研究编排
//!
//! 入口：初始化日志、加载配置、组装 LLM 与检索后端，运行一次研究并把带参考文献的回答写到 stdout。
//!
//! 用法：`prosearch [--config <file>] <question…>`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use prosearch::config::{load_config, AppConfig};
use prosearch::core::ShutdownManager;
use prosearch::llm::{LlmClient, OpenAiClient, RetryConfig, RetryingLlmClient};
use prosearch::observability;
use prosearch::research::{render_answer, LlmJudge, LoopConfig, ResearchEvent, ResearchLoop, ResearchTopic};
use prosearch::retrieval::{KnowledgeBaseAdapter, RetrievalAdapter, WebSearchAdapter};

/// 解析命令行：可选 `--config <file>`，其余参数拼成问题
fn parse_args(args: impl Iterator<Item = String>) -> anyhow::Result<(Option<PathBuf>, String)> {
    let mut config_path = None;
    let mut words = Vec::new();
    let mut args = args;
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args.next().context("--config requires a file path")?;
            config_path = Some(PathBuf::from(path));
        } else {
            words.push(arg);
        }
    }
    let question = words.join(" ");
    if question.trim().is_empty() {
        bail!("usage: prosearch [--config <file>] <question…>");
    }
    Ok((config_path, question))
}

fn llm_client(cfg: &AppConfig, model: &str, temperature: f32) -> Arc<dyn LlmClient> {
    let client = OpenAiClient::new(cfg.llm.base_url.as_deref(), model, cfg.llm.api_key.as_deref())
        .with_timeout(Duration::from_secs(cfg.llm.request_timeout_secs))
        .with_temperature(temperature);
    Arc::new(RetryingLlmClient::new(
        Arc::new(client),
        RetryConfig {
            max_retries: cfg.llm.max_retries,
            ..RetryConfig::default()
        },
    ))
}

fn adapters(cfg: &AppConfig) -> Vec<Arc<dyn RetrievalAdapter>> {
    let mut adapters: Vec<Arc<dyn RetrievalAdapter>> = Vec::new();
    if let Some(web) = WebSearchAdapter::from_config(&cfg.retrieval.web) {
        adapters.push(Arc::new(web));
    }
    if cfg.retrieval.knowledge_base.enabled {
        adapters.push(Arc::new(KnowledgeBaseAdapter::from_config(
            &cfg.retrieval.knowledge_base,
        )));
    }
    adapters
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    observability::init();

    let (config_path, question) = parse_args(std::env::args().skip(1))?;
    let cfg = load_config(config_path).context("Failed to load config")?;

    let judge = LlmJudge::with_clients(
        llm_client(&cfg, &cfg.llm.query_model, 1.0),
        llm_client(&cfg, &cfg.llm.reflection_model, 1.0),
        llm_client(&cfg, &cfg.llm.answer_model, 0.0),
    );
    let judge = Arc::new(judge);

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<ResearchEvent>();
    let research = ResearchLoop::new(
        judge.clone(),
        adapters(&cfg),
        LoopConfig::from(&cfg.research),
    )
    .context("Failed to build research loop")?
    .with_events(event_tx);

    // 进度事件写入日志（stdout 只留给最终回答）
    let logger = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                tracing::debug!(event = %json, "progress");
            }
        }
    });

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();
    if let Some(secs) = cfg.research.deadline_secs {
        shutdown.arm_deadline(Duration::from_secs(secs));
    }

    let mut shutdown_reason = shutdown.subscribe();

    let topic = ResearchTopic::new(question).context("Invalid question")?;
    let outcome = research
        .run(&topic, shutdown.token())
        .await
        .context("Research failed")?;

    // 关闭事件通道，等待日志任务收尾
    drop(research);
    let _ = logger.await;

    if let Ok(reason) = shutdown_reason.try_recv() {
        tracing::warn!(?reason, "research stopped early; answer is based on partial evidence");
    }

    let rendered = render_answer(&outcome.final_text, &outcome.sources);
    println!("{}", rendered.to_markdown());

    let (prompt, completion, total) = judge.token_usage();
    tracing::info!(
        rounds = outcome.rounds,
        queries = outcome.queries_issued,
        sources = outcome.sources.len(),
        stop_reason = %outcome.stop_reason,
        prompt_tokens = prompt,
        completion_tokens = completion,
        total_tokens = total,
        "done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_args() {
        let (path, question) = parse_args(args(&["--config", "a.toml", "what", "is", "X"])).unwrap();
        assert_eq!(path, Some(PathBuf::from("a.toml")));
        assert_eq!(question, "what is X");
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["--config"])).is_err());
    }
}
