//! 核心层：错误类型、对话构建器、会话监管

pub mod builder;
pub mod error;
pub mod session_supervisor;

pub use builder::AgentBuilder;
pub use error::{AgentError, SnapshotError};
pub use session_supervisor::SessionSupervisor;
