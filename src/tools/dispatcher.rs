//! 工具调度器
//!
//! 持有 ToolRegistry 与可选快照存储：dispatch(call, working_directory) 按名查找并执行工具，
//! 成功包装为 ToolResult::success，任何失败（未知工具、工具报错、超时、panic）都转为
//! ToolResult::failure，dispatch 本身从不失败。修改型工具成功后尝试捕获快照，
//! 捕获失败时用空树标识的占位快照代替。每次调用输出结构化审计日志（JSON）。

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use thiserror::Error;
use tokio::time::timeout;

use crate::snapshot::{Snapshot, SnapshotStore};
use crate::tools::{PendingToolCall, Tool, ToolCallContext, ToolRegistry, ToolResult};

/// 单次调度的失败原因，渲染为 ToolResult 的 error 文本
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Failed(String),

    #[error("Tool '{name}' timed out after {limit:?}")]
    Timeout { name: String, limit: Duration },

    #[error("Tool '{0}' panicked")]
    Panicked(String),
}

/// 调度结果：归一化的工具结果 + 可能产生的快照
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub result: ToolResult,
    pub snapshot: Option<Snapshot>,
}

pub struct ToolDispatcher {
    registry: ToolRegistry,
    snapshots: Option<Arc<SnapshotStore>>,
    extra_mutating: HashSet<String>,
    timeout: Option<Duration>,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            snapshots: None,
            extra_mutating: HashSet::new(),
            timeout: None,
        }
    }

    pub fn with_snapshots(mut self, store: Arc<SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// 除了自身声明 is_mutating 的工具之外，额外按名称视为修改型的工具
    pub fn with_mutating<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_mutating.extend(names.into_iter().map(Into::into));
        self
    }

    /// 默认不设超时
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn snapshots(&self) -> Option<&Arc<SnapshotStore>> {
        self.snapshots.as_ref()
    }

    fn is_mutating(&self, tool: &dyn Tool) -> bool {
        tool.is_mutating() || self.extra_mutating.contains(tool.name())
    }

    pub async fn dispatch(
        &self,
        call: &PendingToolCall,
        working_directory: &Path,
    ) -> DispatchOutcome {
        let start = Instant::now();
        let args_preview = args_preview(&call.args);

        let (outcome, mutating) = match self.registry.get(&call.name) {
            None => (Err(DispatchError::UnknownTool(call.name.clone())), false),
            Some(tool) => {
                let ctx = ToolCallContext {
                    working_directory: working_directory.to_path_buf(),
                    tool_call_id: call.id.clone(),
                };
                let mutating = self.is_mutating(tool.as_ref());
                (self.run_tool(tool.as_ref(), call, &ctx).await, mutating)
            }
        };

        let label = match &outcome {
            Ok(_) => "ok",
            Err(DispatchError::UnknownTool(_)) => "unknown_tool",
            Err(DispatchError::Failed(_)) => "error",
            Err(DispatchError::Timeout { .. }) => "timeout",
            Err(DispatchError::Panicked(_)) => "panic",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "tool_call_id": call.id,
            "ok": outcome.is_ok(),
            "outcome": label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match outcome {
            Ok(value) => {
                let snapshot = if mutating {
                    self.capture_after(call).await
                } else {
                    None
                };
                DispatchOutcome {
                    result: ToolResult::success(&call.id, value),
                    snapshot,
                }
            }
            Err(e) => DispatchOutcome {
                result: ToolResult::failure(&call.id, e.to_string()),
                snapshot: None,
            },
        }
    }

    async fn run_tool(
        &self,
        tool: &dyn Tool,
        call: &PendingToolCall,
        ctx: &ToolCallContext,
    ) -> Result<serde_json::Value, DispatchError> {
        let fut = AssertUnwindSafe(tool.execute(call.args.clone(), ctx)).catch_unwind();
        let joined = match self.timeout {
            Some(limit) => timeout(limit, fut).await.map_err(|_| DispatchError::Timeout {
                name: call.name.clone(),
                limit,
            })?,
            None => fut.await,
        };
        match joined {
            Ok(result) => result.map_err(DispatchError::Failed),
            Err(_) => Err(DispatchError::Panicked(call.name.clone())),
        }
    }

    /// 快照是观测手段，不影响工具成败：失败时降级为占位快照
    async fn capture_after(&self, call: &PendingToolCall) -> Option<Snapshot> {
        let store = self.snapshots.as_ref()?;
        let description = format!("after {} ({})", call.name, call.id);
        match store.capture(Some(&description)).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "snapshot capture failed, recording placeholder");
                Some(Snapshot::placeholder(format!(
                    "snapshot capture failed after {}: {e}",
                    call.name
                )))
            }
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
