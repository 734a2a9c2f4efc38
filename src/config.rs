//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PROSEARCH__*` 覆盖（双下划线表示嵌套，如 `PROSEARCH__RESEARCH__MAX_ROUNDS=3`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub research: ResearchSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
}

/// [research] 段：研究循环的查询数、轮数上限、并发与整体截止时间
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchSection {
    /// 首轮生成的查询条数
    #[serde(default = "default_initial_query_count")]
    pub initial_query_count: usize,
    /// 最大研究轮数（0 仍执行一轮）
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// 单轮检索任务的并发上限
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// 整个研究流程的截止时间（秒），未设置则不限
    pub deadline_secs: Option<u64>,
}

fn default_initial_query_count() -> usize {
    3
}

fn default_max_rounds() -> usize {
    2
}

fn default_max_concurrent_tasks() -> usize {
    8
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            initial_query_count: default_initial_query_count(),
            max_rounds: default_max_rounds(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            deadline_secs: None,
        }
    }
}

/// [llm] 段：OpenAI 兼容端点与三个阶段各自使用的模型
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    pub base_url: Option<String>,
    /// 未设置时依次回退到环境变量 OPENROUTER_API_KEY、OPENAI_API_KEY
    pub api_key: Option<String>,
    /// 查询生成模型（轻量）
    #[serde(default = "default_query_model")]
    pub query_model: String,
    /// 反思模型
    #[serde(default = "default_reflection_model")]
    pub reflection_model: String,
    /// 最终回答模型
    #[serde(default = "default_answer_model")]
    pub answer_model: String,
    /// 客户端层对 Transient 错误的重试次数（研究循环本身不重试）
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_query_model() -> String {
    "google/gemini-2.0-flash-lite-001".to_string()
}

fn default_reflection_model() -> String {
    "google/gemini-2.5-flash-preview".to_string()
}

fn default_answer_model() -> String {
    "google/gemini-2.5-pro-preview-05-06".to_string()
}

fn default_llm_max_retries() -> u32 {
    2
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            query_model: default_query_model(),
            reflection_model: default_reflection_model(),
            answer_model: default_answer_model(),
            max_retries: default_llm_max_retries(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// [retrieval] 段：各检索后端
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RetrievalSection {
    #[serde(default)]
    pub web: WebSearchSection,
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseSection,
}

/// [retrieval.web] 段：Custom Search 兼容接口
#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_web_endpoint")]
    pub endpoint: String,
    /// 未设置时回退到环境变量 GOOGLE_API_KEY
    pub api_key: Option<String>,
    /// 搜索引擎 ID（cx）
    pub engine_id: Option<String>,
    #[serde(default = "default_web_timeout_secs")]
    pub timeout_secs: u64,
    /// 每次请求返回的结果数（接口上限 10）
    #[serde(default = "default_web_max_results")]
    pub max_results: usize,
}

fn default_true() -> bool {
    true
}

fn default_web_endpoint() -> String {
    "https://www.googleapis.com/customsearch/v1".to_string()
}

fn default_web_timeout_secs() -> u64 {
    15
}

fn default_web_max_results() -> usize {
    10
}

impl Default for WebSearchSection {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_web_endpoint(),
            api_key: None,
            engine_id: None,
            timeout_secs: default_web_timeout_secs(),
            max_results: default_web_max_results(),
        }
    }
}

/// [retrieval.knowledge_base] 段：向量库 /query 接口
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeBaseSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_kb_base_url")]
    pub base_url: String,
    #[serde(default = "default_kb_max_docs")]
    pub max_docs: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_kb_timeout_secs")]
    pub timeout_secs: u64,
    /// 连接失败时的适配器内重试次数
    #[serde(default = "default_kb_max_retries")]
    pub max_retries: u32,
    /// 文档内容截断长度（字符）
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

fn default_kb_base_url() -> String {
    "http://localhost:16060".to_string()
}

fn default_kb_max_docs() -> usize {
    5
}

fn default_similarity_threshold() -> f32 {
    0.6
}

fn default_kb_timeout_secs() -> u64 {
    30
}

fn default_kb_max_retries() -> u32 {
    1
}

fn default_snippet_chars() -> usize {
    200
}

impl Default for KnowledgeBaseSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_kb_base_url(),
            max_docs: default_kb_max_docs(),
            similarity_threshold: default_similarity_threshold(),
            timeout_secs: default_kb_timeout_secs(),
            max_retries: default_kb_max_retries(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 PROSEARCH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PROSEARCH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PROSEARCH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
