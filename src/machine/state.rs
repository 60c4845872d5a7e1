//! 状态定义
//!
//! idle → running{thinking | executingTool} → idle | error | awaitingInput | complete。
//! thinking 与 executingTool 是同一个枚举的两个变体，结构上不可能同时处于两者。

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    /// Stream Translator 调用进行中
    Thinking,
    /// ToolDispatcher 调用进行中
    ExecutingTool,
}

/// 模型主动让出控制权的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AwaitReason {
    Paused { reason: Option<String> },
    Clarification { question: Option<String> },
}

/// 终态 complete 的结果；workflow 模式下失败必须显式体现
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Failed { error: String },
    Paused { reason: Option<String> },
    ClarificationRequested { question: Option<String> },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Running(RunningState),
    AwaitingInput(AwaitReason),
    Error,
    Complete(Outcome),
}

impl AgentState {
    pub fn name(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Running(RunningState::Thinking) => "running.thinking",
            AgentState::Running(RunningState::ExecutingTool) => "running.executingTool",
            AgentState::AwaitingInput(_) => "awaitingInput",
            AgentState::Error => "error",
            AgentState::Complete(_) => "complete",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, AgentState::Running(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Complete(_))
    }

    /// 只有 idle / error / awaitingInput 接受 USER_MESSAGE
    pub fn accepts_user_message(&self) -> bool {
        matches!(
            self,
            AgentState::Idle | AgentState::Error | AgentState::AwaitingInput(_)
        )
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
