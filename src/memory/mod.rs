//! 对话层：消息类型与研究主题推导

pub mod conversation;

pub use conversation::{topic_from_history, Message, Role};
