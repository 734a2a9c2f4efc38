//! 对话消息：研究主题由对话历史推导
//!
//! 单条消息直接取其内容；多条消息按时间顺序拼接为 `User: ...` / `Assistant: ...` 行，System 消息不参与。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 将对话历史拼接为研究主题文本
pub fn topic_from_history(messages: &[Message]) -> String {
    if let [only] = messages {
        return only.content.clone();
    }
    let mut topic = String::new();
    for m in messages {
        match m.role {
            Role::User => topic.push_str(&format!("User: {}\n", m.content)),
            Role::Assistant => topic.push_str(&format!("Assistant: {}\n", m.content)),
            Role::System => {}
        }
    }
    topic
}
