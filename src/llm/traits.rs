//! 模型驱动抽象
//!
//! ModelDriver 是外部协作者：给定消息、工作目录与当前快照，返回一个惰性、有限、不可重启的
//! ModelChunk 流。传输失败时 start_stream 返回 Err，或流中产出 Err。

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::memory::Message;
use crate::snapshot::Snapshot;
use crate::tools::ToolSpec;

/// 模型驱动错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// 模型在流中显式产出的错误事件
    #[error("Model error: {0}")]
    Model(String),
}

/// 模型原始输出的单个事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelChunk {
    Text { text: String },
    ToolCall {
        name: String,
        #[serde(default)]
        args: Value,
    },
    Error { message: String },
    Done,
}

impl ModelChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_call(name: impl Into<String>, args: Value) -> Self {
        Self::ToolCall {
            name: name.into(),
            args,
        }
    }
}

/// 一次思考阶段发给模型驱动的输入
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub working_directory: PathBuf,
    pub snapshot: Snapshot,
    /// 可用工具（注册表 + 控制工具），供驱动向模型声明
    pub tools: Vec<ToolSpec>,
}

pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelChunk, LlmError>> + Send>>;

/// 模型驱动 trait：每次调用都是一次全新的流，从不续接上一次
#[async_trait]
pub trait ModelDriver: Send + Sync {
    async fn start_stream(&self, request: ModelRequest) -> Result<ModelStream, LlmError>;
}
