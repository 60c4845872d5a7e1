//! 纯状态转移
//!
//! transition(state, context, event) -> Transition，settle 处理无事件的自动转移。
//! 不涉及任何异步运行时：副作用只以 Effect 的形式返回。

use serde::Serialize;

use crate::memory::Message;
use crate::machine::{AgentContext, AgentState, AwaitReason, Effect, MachineEvent, Outcome, RunningState, ToolHistoryEntry};
use crate::tools::{DispatchOutcome, PendingToolCall, ToolResult};

/// 一次转移的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: AgentState,
    pub effects: Vec<Effect>,
    /// false 表示当前状态不处理该事件，上下文未被修改
    pub handled: bool,
}

impl Transition {
    fn to(state: AgentState, effects: Vec<Effect>) -> Self {
        Self {
            state,
            effects,
            handled: true,
        }
    }

    fn ignored(state: &AgentState) -> Self {
        Self {
            state: state.clone(),
            effects: Vec::new(),
            handled: false,
        }
    }
}

const THINKING: AgentState = AgentState::Running(RunningState::Thinking);
const EXECUTING: AgentState = AgentState::Running(RunningState::ExecutingTool);

pub fn transition(state: &AgentState, ctx: &mut AgentContext, event: MachineEvent) -> Transition {
    match (state, event) {
        (AgentState::Complete(_), _) => Transition::ignored(state),

        (
            AgentState::Idle | AgentState::Error | AgentState::AwaitingInput(_),
            MachineEvent::UserMessage { content },
        ) => {
            ctx.last_error = None;
            ctx.messages.push(Message::user(content));
            ctx.current_step += 1;
            Transition::to(THINKING, vec![Effect::InvokeTranslator])
        }

        (AgentState::Running(RunningState::Thinking), MachineEvent::TextDelta { text }) => {
            ctx.response_buffer.push_str(&text);
            Transition::to(THINKING, Vec::new())
        }

        (AgentState::Running(RunningState::Thinking), MachineEvent::ToolCall(call)) => {
            ctx.pending_tool_call = Some(call.clone());
            Transition::to(
                EXECUTING,
                vec![Effect::StopTranslator, Effect::DispatchTool(call)],
            )
        }

        (AgentState::Running(RunningState::Thinking), MachineEvent::AgentDone { summary }) => {
            ctx.finalize_response(None);
            if let (Some(summary), Some(last)) = (summary, ctx.messages.last_mut()) {
                if last.content.is_empty() {
                    last.content = summary;
                }
            }
            Transition::to(AgentState::Idle, vec![Effect::StopTranslator])
        }

        (AgentState::Running(RunningState::Thinking), MachineEvent::AgentPaused { reason }) => {
            ctx.finalize_response(None);
            Transition::to(
                AgentState::AwaitingInput(AwaitReason::Paused { reason }),
                vec![Effect::StopTranslator],
            )
        }

        (
            AgentState::Running(RunningState::Thinking),
            MachineEvent::AgentClarification { question },
        ) => {
            ctx.finalize_response(question.as_deref());
            Transition::to(
                AgentState::AwaitingInput(AwaitReason::Clarification { question }),
                vec![Effect::StopTranslator],
            )
        }

        (AgentState::Running(RunningState::ExecutingTool), MachineEvent::ToolFinished(outcome)) => {
            let matches_pending = ctx
                .pending_tool_call
                .as_ref()
                .is_some_and(|call| call.id == outcome.result.tool_call_id());
            if !matches_pending {
                return Transition::ignored(state);
            }
            record_tool_outcome(ctx, outcome);
            Transition::to(THINKING, vec![Effect::InvokeTranslator])
        }

        (_, MachineEvent::Error { message }) => {
            let effects = if *state == THINKING {
                vec![Effect::StopTranslator]
            } else {
                Vec::new()
            };
            // 失败轮次的半截回复与未完成的工具调用一并丢弃
            ctx.response_buffer.clear();
            ctx.pending_tool_call = None;
            ctx.last_error = Some(message);
            Transition::to(AgentState::Error, effects)
        }

        (_, _) => Transition::ignored(state),
    }
}

/// 工具结束：写历史、先落盘已缓冲的回复、再追加给模型看的结果摘要、更新快照
fn record_tool_outcome(ctx: &mut AgentContext, outcome: DispatchOutcome) {
    let Some(call) = ctx.pending_tool_call.take() else {
        return;
    };
    let DispatchOutcome { result, snapshot } = outcome;

    ctx.flush_response();
    ctx.messages.push(Message::user(tool_summary(&call, &result)));
    if let Some(snapshot) = snapshot {
        ctx.record_snapshot(snapshot);
    }
    ctx.tool_history.push(ToolHistoryEntry { call, result });
}

/// 合成的 user 消息，让模型在下一轮看到自己工具的结果
pub fn tool_summary(call: &PendingToolCall, result: &ToolResult) -> String {
    match result.error() {
        Some(error) => format!("Tool `{}` ({}) failed: {}", call.name, call.id, error),
        None => format!(
            "Tool `{}` ({}) succeeded:\n{}",
            call.name,
            call.id,
            result.render()
        ),
    }
}

/// 无事件的自动转移；None 表示当前状态已稳定
pub fn settle(state: &AgentState, ctx: &mut AgentContext) -> Option<Transition> {
    match state {
        AgentState::Idle if !ctx.messages.is_empty() && ctx.current_step == 0 => {
            ctx.current_step = 1;
            Some(Transition::to(THINKING, vec![Effect::InvokeTranslator]))
        }
        AgentState::Idle if ctx.workflow_mode && ctx.current_step > 0 => Some(Transition::to(
            AgentState::Complete(Outcome::Completed),
            Vec::new(),
        )),
        AgentState::Error if ctx.workflow_mode => {
            let error = ctx
                .last_error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            Some(Transition::to(
                AgentState::Complete(Outcome::Failed { error }),
                Vec::new(),
            ))
        }
        AgentState::AwaitingInput(reason) if ctx.workflow_mode => {
            let outcome = match reason {
                AwaitReason::Paused { reason } => Outcome::Paused {
                    reason: reason.clone(),
                },
                AwaitReason::Clarification { question } => Outcome::ClarificationRequested {
                    question: question.clone(),
                },
            };
            Some(Transition::to(AgentState::Complete(outcome), Vec::new()))
        }
        _ => None,
    }
}

/// workflow 模式的最终输出
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentOutput {
    pub outcome: Outcome,
    pub context: AgentContext,
}

/// 状态 + 上下文；所有修改都经由 handle
#[derive(Debug, Clone)]
pub struct Machine {
    state: AgentState,
    context: AgentContext,
}

impl Machine {
    /// 创建状态机并执行初始自动转移（如预置消息直接进入 thinking）
    pub fn new(context: AgentContext) -> (Self, Vec<Effect>) {
        let mut machine = Self {
            state: AgentState::Idle,
            context,
        };
        let effects = machine.settle_all();
        (machine, effects)
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    pub fn handle(&mut self, event: MachineEvent) -> Transition {
        let kind = event.kind();
        let step = transition(&self.state, &mut self.context, event);
        if !step.handled {
            tracing::debug!(state = %self.state, event = kind, "event ignored");
            return step;
        }
        if step.state != self.state {
            tracing::debug!(from = %self.state, to = %step.state, event = kind, "transition");
        }
        self.state = step.state;
        let mut effects = step.effects;
        effects.extend(self.settle_all());
        Transition {
            state: self.state.clone(),
            effects,
            handled: true,
        }
    }

    fn settle_all(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        while let Some(step) = settle(&self.state, &mut self.context) {
            tracing::debug!(from = %self.state, to = %step.state, "auto transition");
            self.state = step.state;
            effects.extend(step.effects);
        }
        effects
    }

    pub fn output(&self) -> Option<AgentOutput> {
        match &self.state {
            AgentState::Complete(outcome) => Some(AgentOutput {
                outcome: outcome.clone(),
                context: self.context.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Role;
    use crate::snapshot::Snapshot;
    use serde_json::json;

    fn context() -> AgentContext {
        AgentContext::new("/work", Snapshot::new("t0", Some("initial".into())))
    }

    fn finished(call: &PendingToolCall, snapshot: Option<Snapshot>) -> MachineEvent {
        MachineEvent::ToolFinished(DispatchOutcome {
            result: ToolResult::success(&call.id, json!("ok")),
            snapshot,
        })
    }

    #[test]
    fn test_user_message_starts_thinking() {
        let (mut machine, effects) = Machine::new(context());
        assert!(effects.is_empty());
        assert_eq!(machine.state(), &AgentState::Idle);

        let step = machine.handle(MachineEvent::user("hello"));
        assert_eq!(step.state, THINKING);
        assert_eq!(step.effects, vec![Effect::InvokeTranslator]);
        assert_eq!(machine.context().current_step, 1);
        assert_eq!(machine.context().messages, vec![Message::user("hello")]);
    }

    #[test]
    fn test_initial_message_bootstraps_once() {
        let (machine, effects) = Machine::new(context().with_initial_message("go"));
        assert_eq!(machine.state(), &THINKING);
        assert_eq!(effects, vec![Effect::InvokeTranslator]);
        assert_eq!(machine.context().current_step, 1);
    }

    #[test]
    fn test_text_then_tool_then_done() {
        let (mut machine, _) = Machine::new(context());
        machine.handle(MachineEvent::user("write then read"));
        machine.handle(MachineEvent::TextDelta { text: "Writing ".into() });
        machine.handle(MachineEvent::TextDelta { text: "now.".into() });

        let call = PendingToolCall::new("write", json!({"path": "a.txt"}));
        let step = machine.handle(MachineEvent::ToolCall(call.clone()));
        assert_eq!(step.state, EXECUTING);
        assert_eq!(
            step.effects,
            vec![Effect::StopTranslator, Effect::DispatchTool(call.clone())]
        );
        // 文本在工具调用处被截断，保留到工具成功时落盘
        assert_eq!(machine.context().response_buffer, "Writing now.");

        // 执行中到达的文本被忽略
        assert!(!machine
            .handle(MachineEvent::TextDelta { text: "late".into() })
            .handled);

        let step = machine.handle(finished(&call, Some(Snapshot::new("t1", None))));
        assert_eq!(step.state, THINKING);
        assert_eq!(step.effects, vec![Effect::InvokeTranslator]);

        let ctx = machine.context();
        assert!(ctx.pending_tool_call.is_none());
        assert!(ctx.response_buffer.is_empty());
        assert_eq!(ctx.messages[1], Message::assistant("Writing now."));
        assert_eq!(ctx.messages[2].role, Role::User);
        assert!(ctx.messages[2].content.contains("`write`"));
        assert_eq!(ctx.current_snapshot.tree_hash, "t1");
        assert_eq!(ctx.snapshot_history.len(), 2);
        assert_eq!(ctx.tool_history.len(), 1);
        assert!(ctx.invariants_hold());

        let step = machine.handle(MachineEvent::AgentDone { summary: None });
        assert_eq!(step.state, AgentState::Idle);
        assert_eq!(machine.context().messages.len(), 4);
    }

    #[test]
    fn test_tool_failure_is_recoverable() {
        let (mut machine, _) = Machine::new(context());
        machine.handle(MachineEvent::user("x"));
        let call = PendingToolCall::new("nonexistent", json!({}));
        machine.handle(MachineEvent::ToolCall(call.clone()));

        let step = machine.handle(MachineEvent::ToolFinished(DispatchOutcome {
            result: ToolResult::failure(&call.id, "Unknown tool: nonexistent"),
            snapshot: None,
        }));
        assert_eq!(step.state, THINKING);
        let entry = &machine.context().tool_history[0];
        assert!(entry.result.result().is_none());
        assert!(entry.result.error().is_some());
        assert!(machine.context().messages[1].content.contains("failed"));
        assert_eq!(machine.context().snapshot_history.len(), 1);
    }

    #[test]
    fn test_stale_tool_result_is_ignored() {
        let (mut machine, _) = Machine::new(context());
        machine.handle(MachineEvent::user("x"));
        let call = PendingToolCall::new("write", json!({}));
        machine.handle(MachineEvent::ToolCall(call));

        let other = PendingToolCall::new("write", json!({}));
        let step = machine.handle(finished(&other, None));
        assert!(!step.handled);
        assert_eq!(machine.state(), &EXECUTING);
        assert!(machine.context().tool_history.is_empty());
    }

    #[test]
    fn test_complete_first_yields_single_empty_message() {
        let (mut machine, _) = Machine::new(context().with_initial_message("hi"));
        machine.handle(MachineEvent::AgentDone { summary: None });
        let ctx = machine.context();
        assert_eq!(machine.state(), &AgentState::Idle);
        assert!(ctx.tool_history.is_empty());
        assert_eq!(ctx.messages.len(), 2);
        assert_eq!(ctx.messages[1], Message::assistant(""));
    }

    #[test]
    fn test_done_summary_fills_empty_response() {
        let (mut machine, _) = Machine::new(context().with_initial_message("hi"));
        machine.handle(MachineEvent::AgentDone {
            summary: Some("All done".into()),
        });
        assert_eq!(machine.context().messages[1], Message::assistant("All done"));
    }

    #[test]
    fn test_error_then_user_message_recovers_in_interactive_mode() {
        let (mut machine, _) = Machine::new(context());
        machine.handle(MachineEvent::user("x"));
        machine.handle(MachineEvent::TextDelta { text: "partial".into() });
        let step = machine.handle(MachineEvent::Error {
            message: "connection reset".into(),
        });
        assert_eq!(step.state, AgentState::Error);
        assert_eq!(step.effects, vec![Effect::StopTranslator]);
        assert_eq!(machine.context().last_error.as_deref(), Some("connection reset"));
        assert!(machine.context().response_buffer.is_empty());

        let step = machine.handle(MachineEvent::user("again"));
        assert_eq!(step.state, THINKING);
        assert!(machine.context().last_error.is_none());
        assert_eq!(machine.context().current_step, 2);
    }

    #[test]
    fn test_workflow_done_completes() {
        let (mut machine, _) =
            Machine::new(context().with_workflow_mode(true).with_initial_message("task"));
        let step = machine.handle(MachineEvent::AgentDone { summary: None });
        assert_eq!(step.state, AgentState::Complete(Outcome::Completed));
        let output = machine.output().unwrap();
        assert!(output.outcome.is_success());
        assert_eq!(output.context.current_step, 1);

        // 终态不再响应任何事件
        assert!(!machine.handle(MachineEvent::user("more")).handled);
    }

    #[test]
    fn test_workflow_error_is_terminal_failure() {
        let (mut machine, _) =
            Machine::new(context().with_workflow_mode(true).with_initial_message("task"));
        machine.handle(MachineEvent::Error {
            message: "401 unauthorized".into(),
        });
        assert_eq!(
            machine.state(),
            &AgentState::Complete(Outcome::Failed {
                error: "401 unauthorized".into()
            })
        );
    }

    #[test]
    fn test_pause_and_clarify_await_input() {
        let (mut machine, _) = Machine::new(context().with_initial_message("task"));
        machine.handle(MachineEvent::TextDelta { text: "Hmm.".into() });
        let step = machine.handle(MachineEvent::AgentClarification {
            question: Some("Which branch?".into()),
        });
        assert_eq!(
            step.state,
            AgentState::AwaitingInput(AwaitReason::Clarification {
                question: Some("Which branch?".into())
            })
        );
        assert_eq!(
            machine.context().messages[1],
            Message::assistant("Hmm.\n\nWhich branch?")
        );

        let step = machine.handle(MachineEvent::user("main"));
        assert_eq!(step.state, THINKING);
        machine.handle(MachineEvent::AgentPaused { reason: None });
        assert!(matches!(machine.state(), AgentState::AwaitingInput(AwaitReason::Paused { .. })));
    }

    #[test]
    fn test_workflow_pause_completes_with_outcome() {
        let (mut machine, _) =
            Machine::new(context().with_workflow_mode(true).with_initial_message("task"));
        machine.handle(MachineEvent::AgentPaused {
            reason: Some("need approval".into()),
        });
        assert_eq!(
            machine.output().unwrap().outcome,
            Outcome::Paused {
                reason: Some("need approval".into())
            }
        );
    }

    #[test]
    fn test_user_message_rejected_while_running() {
        let (mut machine, _) = Machine::new(context().with_initial_message("task"));
        let before = machine.context().clone();
        assert!(!machine.handle(MachineEvent::user("interrupt")).handled);
        assert_eq!(machine.context(), &before);
    }

    #[test]
    fn test_error_during_tool_execution_clears_pending_call() {
        let (mut machine, _) = Machine::new(context().with_initial_message("task"));
        machine.handle(MachineEvent::ToolCall(PendingToolCall::new("write", json!({}))));
        let step = machine.handle(MachineEvent::Error {
            message: "dispatcher crashed".into(),
        });
        assert_eq!(step.state, AgentState::Error);
        assert!(step.effects.is_empty());
        assert!(machine.context().pending_tool_call.is_none());
    }
}
