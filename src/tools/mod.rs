pub mod call;
pub mod control;
pub mod dispatcher;
pub mod registry;

pub use call::{PendingToolCall, ToolResult};
pub use control::{
    control_specs, is_control_tool, ControlSignal, CLARIFY_TOOL, COMPLETE_TOOL, PAUSE_TOOL,
};
pub use dispatcher::{DispatchError, DispatchOutcome, ToolDispatcher};
pub use registry::{Tool, ToolCallContext, ToolRegistry, ToolSpec};
