//! prosearch - 多来源迭代式研究编排
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、检索任务池、取消与截止时间
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / 重试包装 / Mock）
//! - **memory**: 对话消息与研究主题推导
//! - **observability**: tracing 日志初始化
//! - **research**: 研究循环（查询生成、并发检索、反思、答案合成、引用管理）
//! - **retrieval**: 检索后端适配器（Web 搜索 / 知识库 / 静态）

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod research;
pub mod retrieval;

pub use research::{ResearchLoop, ResearchOutcome, ResearchTopic};
