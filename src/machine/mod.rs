//! 智能体状态机
//!
//! 纯核心：显式的状态枚举 + transition(state, event) -> (state, effects)；
//! 副作用（调用模型、执行工具）由 crate::agent 中的解释器执行。

pub mod context;
pub mod effect;
pub mod event;
pub mod state;
pub mod transition;
pub mod translator;

pub use context::{AgentContext, ToolHistoryEntry, DEFAULT_STEP_BUDGET};
pub use effect::Effect;
pub use event::MachineEvent;
pub use state::{AgentState, AwaitReason, Outcome, RunningState};
pub use transition::{settle, tool_summary, transition, AgentOutput, Machine, Transition};
