//! Stream Translator
//!
//! 把模型驱动的原始 chunk 流翻译成状态机事件，经有界通道推送给状态机：
//! - 文本 → TEXT_DELTA；普通工具调用 → TOOL_CALL（新生成关联 id，绝不执行工具）
//! - 控制工具 complete / pause / clarify → AGENT_DONE / AGENT_PAUSED / AGENT_CLARIFICATION，
//!   并立即停止读取底层流
//! - 流正常结束而没有控制信号 → 隐式 AGENT_DONE
//! - 流报错或产出 error → 单个 ERROR 后停止

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::llm::{LlmError, ModelChunk, ModelDriver, ModelRequest};
use crate::machine::MachineEvent;
use crate::tools::{ControlSignal, PendingToolCall};

impl From<ControlSignal> for MachineEvent {
    fn from(signal: ControlSignal) -> Self {
        match signal {
            ControlSignal::Complete { summary } => MachineEvent::AgentDone { summary },
            ControlSignal::Pause { reason } => MachineEvent::AgentPaused { reason },
            ControlSignal::Clarify { question } => MachineEvent::AgentClarification { question },
        }
    }
}

/// 一次思考阶段：向驱动发起全新的流并翻译；返回时流已被丢弃
pub async fn invoke(
    driver: Arc<dyn ModelDriver>,
    request: ModelRequest,
    sink: mpsc::Sender<MachineEvent>,
) {
    match driver.start_stream(request).await {
        Ok(stream) => translate(stream, &sink).await,
        Err(e) => {
            tracing::warn!(error = %e, "model driver failed to start");
            let _ = sink
                .send(MachineEvent::Error {
                    message: e.to_string(),
                })
                .await;
        }
    }
}

/// 翻译整个流；接收端关闭（状态机已离开 thinking）时提前返回
pub async fn translate<S>(mut stream: S, sink: &mpsc::Sender<MachineEvent>)
where
    S: Stream<Item = Result<ModelChunk, LlmError>> + Unpin,
{
    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(ModelChunk::Text { text }) => {
                if text.is_empty() {
                    continue;
                }
                MachineEvent::TextDelta { text }
            }
            Ok(ModelChunk::ToolCall { name, args }) => {
                if let Some(signal) = ControlSignal::from_call(&name, &args) {
                    tracing::debug!(tool = %name, "control signal");
                    let _ = sink.send(signal.into()).await;
                    return;
                }
                MachineEvent::ToolCall(PendingToolCall::new(name, args))
            }
            Ok(ModelChunk::Done) => break,
            Ok(ModelChunk::Error { message }) => {
                let _ = sink
                    .send(MachineEvent::Error {
                        message: LlmError::Model(message).to_string(),
                    })
                    .await;
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "model stream failed");
                let _ = sink
                    .send(MachineEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };
        if sink.send(event).await.is_err() {
            return;
        }
    }
    let _ = sink.send(MachineEvent::AgentDone { summary: None }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn collect(items: Vec<Result<ModelChunk, LlmError>>) -> Vec<MachineEvent> {
        let (tx, mut rx) = mpsc::channel(16);
        translate(stream::iter(items), &tx).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn test_text_and_tool_calls() {
        let events = collect(vec![
            Ok(ModelChunk::text("Let me ")),
            Ok(ModelChunk::text("")),
            Ok(ModelChunk::text("write.")),
            Ok(ModelChunk::tool_call("write", json!({"path": "a.txt"}))),
        ])
        .await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], MachineEvent::TextDelta { text: "Let me ".into() });
        match &events[2] {
            MachineEvent::ToolCall(call) => {
                assert_eq!(call.name, "write");
                assert_eq!(call.args, json!({"path": "a.txt"}));
                assert!(!call.id.is_empty());
            }
            other => panic!("Expected ToolCall, got {other:?}"),
        }
        assert_eq!(events[3], MachineEvent::AgentDone { summary: None });
    }

    #[tokio::test]
    async fn test_control_signal_stops_reading() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let items = vec![
            Ok(ModelChunk::text("done")),
            Ok(ModelChunk::tool_call("complete", json!({"summary": "ok"}))),
            Ok(ModelChunk::text("never read")),
            Ok(ModelChunk::tool_call("write", json!({}))),
        ];
        let source = stream::iter(items).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (tx, mut rx) = mpsc::channel(16);
        translate(Box::pin(source), &tx).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }

        assert_eq!(pulled.load(Ordering::SeqCst), 2);
        assert_eq!(
            events,
            vec![
                MachineEvent::TextDelta { text: "done".into() },
                MachineEvent::AgentDone {
                    summary: Some("ok".into())
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_pause_and_clarify_signals() {
        let events = collect(vec![Ok(ModelChunk::tool_call("pause", json!({"reason": "wait"})))]).await;
        assert_eq!(
            events,
            vec![MachineEvent::AgentPaused {
                reason: Some("wait".into())
            }]
        );

        let events = collect(vec![Ok(ModelChunk::tool_call("clarify", json!({})))]).await;
        assert_eq!(events, vec![MachineEvent::AgentClarification { question: None }]);
    }

    #[tokio::test]
    async fn test_stream_error_emits_single_error() {
        let events = collect(vec![
            Ok(ModelChunk::text("partial")),
            Err(LlmError::Transport("reset".into())),
            Ok(ModelChunk::text("unreachable")),
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], MachineEvent::Error { message } if message.contains("reset")));
    }

    #[tokio::test]
    async fn test_error_chunk_and_done_chunk() {
        let events = collect(vec![Ok(ModelChunk::Error {
            message: "overloaded".into(),
        })])
        .await;
        assert!(matches!(&events[..], [MachineEvent::Error { message }] if message.contains("overloaded")));

        let events = collect(vec![Ok(ModelChunk::Done), Ok(ModelChunk::text("after done"))]).await;
        assert_eq!(events, vec![MachineEvent::AgentDone { summary: None }]);
    }

    #[tokio::test]
    async fn test_silent_completion_is_done() {
        let events = collect(vec![]).await;
        assert_eq!(events, vec![MachineEvent::AgentDone { summary: None }]);
    }
}
