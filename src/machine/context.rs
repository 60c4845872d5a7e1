//! AgentContext：对话的聚合根
//!
//! 由状态机独占；只在 transition 的动作中被修改。观察者拿到的是克隆（copy-on-notify）。

use std::path::PathBuf;

use serde::Serialize;

use crate::memory::Message;
use crate::snapshot::{Snapshot, SnapshotHistory};
use crate::tools::{PendingToolCall, ToolResult};

/// 默认步数预算
pub const DEFAULT_STEP_BUDGET: usize = 50;

/// 一次已结束的工具调用
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolHistoryEntry {
    pub call: PendingToolCall,
    pub result: ToolResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentContext {
    pub current_snapshot: Snapshot,
    pub snapshot_history: SnapshotHistory,
    pub messages: Vec<Message>,
    /// 正在累积的助手回复
    pub response_buffer: String,
    pub pending_tool_call: Option<PendingToolCall>,
    pub tool_history: Vec<ToolHistoryEntry>,
    pub current_step: usize,
    pub step_budget: usize,
    pub working_directory: PathBuf,
    /// true 为 workflow 模式：完成或出错后进入终态 complete
    pub workflow_mode: bool,
    pub last_error: Option<String>,
}

impl AgentContext {
    pub fn new(working_directory: impl Into<PathBuf>, initial_snapshot: Snapshot) -> Self {
        let mut snapshot_history = SnapshotHistory::new();
        let current_snapshot = snapshot_history.push(initial_snapshot).clone();
        Self {
            current_snapshot,
            snapshot_history,
            messages: Vec::new(),
            response_buffer: String::new(),
            pending_tool_call: None,
            tool_history: Vec::new(),
            current_step: 0,
            step_budget: DEFAULT_STEP_BUDGET,
            working_directory: working_directory.into(),
            workflow_mode: false,
            last_error: None,
        }
    }

    /// 预置首条用户消息；状态机启动时自动进入 thinking
    pub fn with_initial_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn with_step_budget(mut self, budget: usize) -> Self {
        self.step_budget = budget;
        self
    }

    pub fn with_workflow_mode(mut self, workflow_mode: bool) -> Self {
        self.workflow_mode = workflow_mode;
        self
    }

    /// 预算的执行由调用方负责，这里只给出判断
    pub fn budget_exhausted(&self) -> bool {
        self.current_step >= self.step_budget
    }

    /// 当前快照指针与历史同时更新
    pub(crate) fn record_snapshot(&mut self, snapshot: Snapshot) {
        self.current_snapshot = self.snapshot_history.push(snapshot).clone();
    }

    /// 缓冲非空时作为助手消息落盘并清空
    pub(crate) fn flush_response(&mut self) {
        if !self.response_buffer.is_empty() {
            let content = std::mem::take(&mut self.response_buffer);
            self.messages.push(Message::assistant(content));
        }
    }

    /// 结束本轮：缓冲（可能为空）总是生成一条助手消息
    pub(crate) fn finalize_response(&mut self, trailer: Option<&str>) {
        let mut content = std::mem::take(&mut self.response_buffer);
        if let Some(trailer) = trailer {
            if content.is_empty() {
                content = trailer.to_string();
            } else {
                content.push_str("\n\n");
                content.push_str(trailer);
            }
        }
        self.messages.push(Message::assistant(content));
    }

    /// 结构不变量：当前快照属于历史、历史时间戳单调、每条工具历史的 id 对应
    pub fn invariants_hold(&self) -> bool {
        let monotonic = self
            .snapshot_history
            .as_slice()
            .windows(2)
            .all(|w| w[0].timestamp_ms <= w[1].timestamp_ms);
        let ids_match = self
            .tool_history
            .iter()
            .all(|e| e.result.tool_call_id() == e.call.id);
        self.snapshot_history.contains(&self.current_snapshot) && monotonic && ids_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Role;

    #[test]
    fn test_new_context_tracks_initial_snapshot() {
        let ctx = AgentContext::new("/tmp", Snapshot::new("abc", Some("initial".into())));
        assert_eq!(ctx.snapshot_history.len(), 1);
        assert!(ctx.invariants_hold());
        assert_eq!(ctx.step_budget, DEFAULT_STEP_BUDGET);
        assert!(!ctx.workflow_mode);
    }

    #[test]
    fn test_finalize_response_appends_trailer() {
        let mut ctx = AgentContext::new("/tmp", Snapshot::placeholder("none"));
        ctx.response_buffer.push_str("Which file?");
        ctx.finalize_response(Some("a.txt or b.txt"));
        ctx.finalize_response(None);

        assert_eq!(ctx.messages[0].content, "Which file?\n\na.txt or b.txt");
        assert_eq!(ctx.messages[1].role, Role::Assistant);
        assert_eq!(ctx.messages[1].content, "");
    }

    #[test]
    fn test_budget_exhausted() {
        let mut ctx = AgentContext::new("/tmp", Snapshot::placeholder("none")).with_step_budget(1);
        assert!(!ctx.budget_exhausted());
        ctx.current_step = 1;
        assert!(ctx.budget_exhausted());
    }
}
