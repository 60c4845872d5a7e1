use crate::tools::PendingToolCall;

/// transition 产出的副作用请求，由 agent 运行时解释执行
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// 以当前上下文启动一次全新的 Stream Translator 调用
    InvokeTranslator,
    /// 清理钩子：中止进行中的 Stream Translator 调用
    StopTranslator,
    DispatchTool(PendingToolCall),
}
