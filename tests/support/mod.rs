//! 集成测试共用的夹具：读写文件工具、脚本构造、快速启动

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use drone::config::AppConfig;
use drone::llm::{ModelChunk, ScriptedModelDriver, ScriptedTurn};
use drone::snapshot::{MemoryTreeBackend, TreeBackend};
use drone::tools::{Tool, ToolCallContext};
use drone::{AgentBuilder, AgentHandle};

/// 写文件：{"path", "content"}
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write a file relative to the working directory"
    }

    fn is_mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolCallContext) -> Result<Value, String> {
        let path = args["path"].as_str().ok_or("missing path")?;
        let content = args["content"].as_str().unwrap_or_default();
        let full = ctx.working_directory.join(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| e.to_string())?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!(format!("wrote {} bytes to {path}", content.len())))
    }
}

/// 读文件：{"path"}
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read a file relative to the working directory"
    }

    async fn execute(&self, args: Value, ctx: &ToolCallContext) -> Result<Value, String> {
        let path = args["path"].as_str().ok_or("missing path")?;
        tokio::fs::read_to_string(ctx.working_directory.join(path))
            .await
            .map(Value::String)
            .map_err(|e| format!("{path}: {e}"))
    }
}

/// 在 release 被通知前一直阻塞，用于观察 executingTool 状态
pub struct GateTool {
    pub release: Arc<Notify>,
}

#[async_trait]
impl Tool for GateTool {
    fn name(&self) -> &str {
        "gate"
    }

    fn description(&self) -> &str {
        "Blocks until released"
    }

    async fn execute(&self, _args: Value, _ctx: &ToolCallContext) -> Result<Value, String> {
        self.release.notified().await;
        Ok(json!("released"))
    }
}

pub fn turn(chunks: Vec<ModelChunk>) -> ScriptedTurn {
    ScriptedTurn::new(chunks)
}

pub fn write_call(path: &str, content: &str) -> ModelChunk {
    ModelChunk::tool_call("write", json!({"path": path, "content": content}))
}

pub fn read_call(path: &str) -> ModelChunk {
    ModelChunk::tool_call("read", json!({"path": path}))
}

/// 内存快照后端 + 读写工具的构建器
pub fn builder(dir: &Path, driver: Arc<ScriptedModelDriver>) -> AgentBuilder {
    AgentBuilder::new(AppConfig::default())
        .with_driver(driver)
        .with_backend(Arc::new(MemoryTreeBackend::new()) as Arc<dyn TreeBackend>)
        .with_working_directory(dir)
        .register_tool(WriteFileTool)
        .register_tool(ReadFileTool)
}

pub async fn start(
    dir: &Path,
    turns: Vec<ScriptedTurn>,
    initial_message: &str,
    workflow: bool,
) -> (AgentHandle, Arc<ScriptedModelDriver>) {
    let driver = Arc::new(ScriptedModelDriver::new(turns));
    let handle = builder(dir, driver.clone())
        .with_initial_message(initial_message)
        .with_workflow_mode(workflow)
        .start()
        .await
        .expect("agent should start");
    (handle, driver)
}
