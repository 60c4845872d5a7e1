//! 状态机事件词表
//!
//! UserMessage 来自调用方；TextDelta / ToolCall / AgentDone / AgentPaused /
//! AgentClarification / Error 来自 Stream Translator；ToolFinished 来自 ToolDispatcher。

use crate::tools::{DispatchOutcome, PendingToolCall};

#[derive(Debug, Clone, PartialEq)]
pub enum MachineEvent {
    UserMessage { content: String },
    TextDelta { text: String },
    ToolCall(PendingToolCall),
    AgentDone { summary: Option<String> },
    AgentPaused { reason: Option<String> },
    AgentClarification { question: Option<String> },
    Error { message: String },
    ToolFinished(DispatchOutcome),
}

impl MachineEvent {
    pub fn user(content: impl Into<String>) -> Self {
        Self::UserMessage {
            content: content.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MachineEvent::UserMessage { .. } => "USER_MESSAGE",
            MachineEvent::TextDelta { .. } => "TEXT_DELTA",
            MachineEvent::ToolCall(_) => "TOOL_CALL",
            MachineEvent::AgentDone { .. } => "AGENT_DONE",
            MachineEvent::AgentPaused { .. } => "AGENT_PAUSED",
            MachineEvent::AgentClarification { .. } => "AGENT_CLARIFICATION",
            MachineEvent::Error { .. } => "ERROR",
            MachineEvent::ToolFinished(_) => "TOOL_FINISHED",
        }
    }
}
