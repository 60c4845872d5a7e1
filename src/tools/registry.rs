//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / execute），由 ToolRegistry 按名注册与查找；
//! 具体工具（shell、读写文件、搜索等）由外部提供，本 crate 只负责调度。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::tools::control::is_control_tool;

/// 单次工具调用的上下文
#[derive(Debug, Clone)]
pub struct ToolCallContext {
    pub working_directory: PathBuf,
    pub tool_call_id: String,
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、是否修改工作目录、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型 tool call 中的 name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 修改工作目录的工具（write / edit 等）执行后会触发快照
    fn is_mutating(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value, ctx: &ToolCallContext) -> Result<Value, String>;
}

/// 向模型声明的工具描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；控制工具名（complete / pause / clarify）为保留名，注册会被忽略
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if is_control_tool(&name) {
            tracing::warn!(tool = %name, "refusing to register reserved control tool name");
            return;
        }
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "tool replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 按名称排序的工具描述，供 ModelRequest 使用
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test tool"
        }

        async fn execute(&self, args: Value, _ctx: &ToolCallContext) -> Result<Value, String> {
            Ok(args)
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Named("write"));
        registry.register(Named("read"));

        assert!(registry.contains("read"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.tool_names(), vec!["read".to_string(), "write".to_string()]);
        assert_eq!(registry.specs()[1].name, "write");
    }

    #[test]
    fn test_control_names_are_reserved() {
        let mut registry = ToolRegistry::new();
        registry.register(Named("complete"));
        registry.register(Named("pause"));
        assert!(registry.is_empty());
    }
}
