//! 脚本化模型驱动（用于测试与 replay，无需 API）
//!
//! 每次 start_stream 弹出一个预先写好的 ScriptedTurn，按顺序产出其中的 chunk；
//! 若设置了 raise，则在 chunk 之后以 Err 结束流，模拟传输中断；
//! 设置了 rate_limited 时该轮直接以限流错误拒绝启动。

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::llm::{LlmError, ModelChunk, ModelDriver, ModelRequest, ModelStream};

/// 一次思考阶段的脚本
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptedTurn {
    #[serde(default)]
    pub chunks: Vec<ModelChunk>,
    /// 产出全部 chunk 后以该错误结束流
    #[serde(default)]
    pub raise: Option<String>,
    /// 该轮直接以限流拒绝，值为建议的重试等待毫秒数
    #[serde(default)]
    pub rate_limited: Option<u64>,
}

impl ScriptedTurn {
    pub fn new(chunks: Vec<ModelChunk>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    pub fn raising(chunks: Vec<ModelChunk>, message: impl Into<String>) -> Self {
        Self {
            chunks,
            raise: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn rate_limited(retry_after_ms: u64) -> Self {
        Self {
            rate_limited: Some(retry_after_ms),
            ..Self::default()
        }
    }
}

/// replay 脚本文件格式：{"turns": [{"chunks": [...]}, ...]}
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub initial_message: Option<String>,
    #[serde(default)]
    pub turns: Vec<ScriptedTurn>,
    /// 交互模式下每次回到 idle / awaitingInput 后依次发送的用户消息
    #[serde(default)]
    pub follow_ups: Vec<String>,
}

/// 脚本化驱动：按调用顺序消费 turns，并记录每次收到的请求
#[derive(Debug, Default)]
pub struct ScriptedModelDriver {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModelDriver {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 迄今为止收到的全部请求（按调用顺序）
    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn remaining_turns(&self) -> usize {
        self.turns.lock().await.len()
    }
}

#[async_trait]
impl ModelDriver for ScriptedModelDriver {
    async fn start_stream(&self, request: ModelRequest) -> Result<ModelStream, LlmError> {
        self.requests.lock().await.push(request);
        let turn = self
            .turns
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| LlmError::Transport("script exhausted".to_string()))?;
        if let Some(retry_after_ms) = turn.rate_limited {
            return Err(LlmError::RateLimited { retry_after_ms });
        }

        let mut items: Vec<Result<ModelChunk, LlmError>> =
            turn.chunks.into_iter().map(Ok).collect();
        if let Some(message) = turn.raise {
            items.push(Err(LlmError::Transport(message)));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}
