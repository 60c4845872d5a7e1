//! 运行时错误类型
//!
//! AgentError 面向调用方（启动、发消息、等待输出）；SnapshotError 来自快照存储。
//! 工具失败不在此列：ToolDispatcher 将其归一化为 ToolResult::failure，永不向上抛出。

use thiserror::Error;

/// 对话运行过程中暴露给调用方的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Working directory unavailable: {0}")]
    WorkingDirectory(String),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// 只有 idle / error / awaitingInput 接受用户消息
    #[error("Machine is not accepting input in state '{0}'")]
    NotAcceptingInput(String),

    /// 状态机已被 stop() 或后台任务已退出
    #[error("Agent stopped")]
    Stopped,
}

/// 快照存储错误：capture / restore / diff / read_file 的失败原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// 工作目录不在版本控制之下（没有可记录的状态）
    #[error("Not under version control: {0}")]
    NotVersioned(String),

    #[error("Unknown tree: {0}")]
    UnknownTree(String),

    #[error("Path '{path}' not found in tree {tree}")]
    PathNotFound { tree: String, path: String },

    /// 降级快照（空树标识）不能参与 restore / diff / read_file
    #[error("Snapshot is degraded: {0}")]
    Degraded(String),

    #[error("Git command failed: {0}")]
    Git(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SnapshotError {
    fn from(e: std::io::Error) -> Self {
        SnapshotError::Io(e.to_string())
    }
}
