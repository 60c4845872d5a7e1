//! 工具调用与结果

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 模型声明的一次工具调用；同一时刻最多一个在执行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl PendingToolCall {
    /// 生成新的关联 id
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }
}

/// 归一化后的工具结果：result 与 error 恰有一个有效
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    tool_call_id: String,
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, value: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            result: Some(value),
            error: None,
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// 供模型阅读的结果文本：字符串原样输出，其它 JSON 序列化
    pub fn render(&self) -> String {
        match (&self.error, &self.result) {
            (Some(e), _) => e.clone(),
            (None, Some(Value::String(s))) => s.clone(),
            (None, Some(v)) => v.to_string(),
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exactly_one_outcome() {
        let ok = ToolResult::success("call_1", json!({"bytes": 3}));
        assert!(!ok.is_error());
        assert_eq!(ok.result(), Some(&json!({"bytes": 3})));

        let err = ToolResult::failure("call_2", "boom");
        assert!(err.result().is_none());
        assert_eq!(err.error(), Some("boom"));
        assert_eq!(serde_json::to_value(&err).unwrap()["result"], Value::Null);
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = PendingToolCall::new("read", Value::Null);
        let b = PendingToolCall::new("read", Value::Null);
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("call_"));
    }
}
