//! Drone - 可回溯的自主编码智能体运行时
//!
//! 模块划分：
//! - **agent**: 异步运行时（副作用解释器、对话句柄、观察者通知）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、对话构建器、会话监管
//! - **llm**: 模型驱动抽象与脚本化驱动
//! - **machine**: 纯状态机（状态、事件、副作用、转移）与 Stream Translator
//! - **memory**: 对话消息
//! - **observability**: tracing 初始化
//! - **snapshot**: 内容寻址的工作目录快照（Git / 内存后端）
//! - **tools**: 工具注册表、控制工具、调度器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod machine;
pub mod memory;
pub mod observability;
pub mod snapshot;
pub mod tools;

pub use agent::{AgentHandle, AgentOptions, AgentView};
pub use core::{AgentBuilder, AgentError, SnapshotError};
pub use machine::{AgentOutput, AgentState, Outcome};
