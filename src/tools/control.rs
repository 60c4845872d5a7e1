//! 控制工具
//!
//! complete / pause / clarify 是保留名：模型调用它们表示结束本轮，而不是执行动作。
//! Stream Translator 拦截它们，它们永远不会到达 ToolDispatcher。

use serde_json::Value;

use crate::tools::ToolSpec;

pub const COMPLETE_TOOL: &str = "complete";
pub const PAUSE_TOOL: &str = "pause";
pub const CLARIFY_TOOL: &str = "clarify";

pub fn is_control_tool(name: &str) -> bool {
    matches!(name, COMPLETE_TOOL | PAUSE_TOOL | CLARIFY_TOOL)
}

/// 控制工具调用解析后的信号
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    Complete { summary: Option<String> },
    Pause { reason: Option<String> },
    Clarify { question: Option<String> },
}

impl ControlSignal {
    pub fn from_call(name: &str, args: &Value) -> Option<Self> {
        let field = |key: &str| {
            args.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        match name {
            COMPLETE_TOOL => Some(Self::Complete {
                summary: field("summary"),
            }),
            PAUSE_TOOL => Some(Self::Pause {
                reason: field("reason"),
            }),
            CLARIFY_TOOL => Some(Self::Clarify {
                question: field("question"),
            }),
            _ => None,
        }
    }
}

fn optional_text(key: &str, description: &str) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        key.to_string(),
        serde_json::json!({ "type": "string", "description": description }),
    );
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": []
    })
}

/// 控制工具的声明，随注册表工具一起发给模型
pub fn control_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: COMPLETE_TOOL.to_string(),
            description: "Finish the current turn. Call when the task is done.".to_string(),
            parameters: optional_text("summary", "Short summary of what was done"),
        },
        ToolSpec {
            name: PAUSE_TOOL.to_string(),
            description: "Pause and wait for the user before continuing.".to_string(),
            parameters: optional_text("reason", "Why the work is paused"),
        },
        ToolSpec {
            name: CLARIFY_TOOL.to_string(),
            description: "Ask the user a clarifying question and wait for the answer.".to_string(),
            parameters: optional_text("question", "The question for the user"),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_call() {
        assert_eq!(
            ControlSignal::from_call("complete", &json!({"summary": "done"})),
            Some(ControlSignal::Complete {
                summary: Some("done".to_string())
            })
        );
        assert_eq!(
            ControlSignal::from_call("clarify", &Value::Null),
            Some(ControlSignal::Clarify { question: None })
        );
        assert_eq!(
            ControlSignal::from_call("pause", &json!({"reason": "  "})),
            Some(ControlSignal::Pause { reason: None })
        );
        assert_eq!(ControlSignal::from_call("write", &json!({})), None);
    }

    #[test]
    fn test_specs_cover_all_control_tools() {
        let names: Vec<String> = control_specs().into_iter().map(|s| s.name).collect();
        assert!(names.iter().all(|n| is_control_tool(n)));
        assert_eq!(names.len(), 3);
    }
}
