//! Headless Agent 运行时
//!
//! AgentHandle::spawn 在后台任务中运行状态机的副作用解释器：
//! - 调用方命令（USER_MESSAGE）经无界 mpsc 进入；
//! - 每次 thinking 新建一个有界通道，Stream Translator 在独立任务中向其推送事件；
//! - 工具调度在独立任务中执行，结果作为 ToolFinished 事件回到状态机；
//! - 每次转移后通过 watch 通道发布 AgentView（上下文克隆）给观察者。
//! 同一时刻最多一个异步调用在进行：离开 thinking 时丢弃其通道并中止任务。

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, SessionSupervisor};
use crate::llm::{ModelDriver, ModelRequest};
use crate::machine::{
    translator, AgentContext, AgentOutput, AgentState, Effect, Machine, MachineEvent,
    DEFAULT_STEP_BUDGET,
};
use crate::snapshot::Snapshot;
use crate::tools::{control_specs, DispatchOutcome, ToolDispatcher};

/// 默认的 translator 事件通道容量
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// 开始对话的参数
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// 未设置时使用进程当前目录
    pub working_directory: Option<PathBuf>,
    pub initial_message: Option<String>,
    pub step_budget: usize,
    pub workflow_mode: bool,
    pub event_channel_capacity: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            working_directory: None,
            initial_message: None,
            step_budget: DEFAULT_STEP_BUDGET,
            workflow_mode: false,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// 观察者看到的通知：状态 + 完整上下文的副本
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    pub state: AgentState,
    pub context: AgentContext,
}

impl AgentView {
    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }
}

enum Command {
    UserMessage {
        content: String,
        reply: oneshot::Sender<Result<(), AgentError>>,
    },
}

/// 对话句柄：发送消息、订阅状态、等待输出、停止
pub struct AgentHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    view_rx: watch::Receiver<AgentView>,
    supervisor: SessionSupervisor,
    task: JoinHandle<()>,
}

impl AgentHandle {
    /// 以已解析的工作目录与初始快照启动对话
    pub fn spawn(
        working_directory: PathBuf,
        initial_snapshot: Snapshot,
        options: AgentOptions,
        driver: Arc<dyn ModelDriver>,
        dispatcher: Arc<ToolDispatcher>,
    ) -> Self {
        let mut context = AgentContext::new(working_directory, initial_snapshot)
            .with_step_budget(options.step_budget)
            .with_workflow_mode(options.workflow_mode);
        if let Some(message) = options.initial_message {
            context = context.with_initial_message(message);
        }

        let (machine, initial_effects) = Machine::new(context);
        let (view_tx, view_rx) = watch::channel(AgentView {
            state: machine.state().clone(),
            context: machine.context().clone(),
        });
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let supervisor = SessionSupervisor::new();

        let interpreter = Interpreter {
            machine,
            driver,
            dispatcher,
            view_tx,
            capacity: options.event_channel_capacity.max(1),
            translator: None,
            dispatch: None,
            cancel: supervisor.child_token(),
        };
        let task = tokio::spawn(interpreter.run(cmd_rx, initial_effects));

        Self {
            cmd_tx,
            view_rx,
            supervisor,
            task,
        }
    }

    /// 投递 USER_MESSAGE；状态机不在 idle / error / awaitingInput 时返回 NotAcceptingInput
    pub async fn send_message(&self, content: impl Into<String>) -> Result<(), AgentError> {
        if self.supervisor.is_cancelled() {
            return Err(AgentError::Stopped);
        }
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::UserMessage {
                content: content.into(),
                reply,
            })
            .map_err(|_| AgentError::Stopped)?;
        rx.await.map_err(|_| AgentError::Stopped)?
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentView> {
        self.view_rx.clone()
    }

    pub fn current(&self) -> AgentView {
        self.view_rx.borrow().clone()
    }

    /// 等待本轮结束（离开 running）
    pub async fn wait_until_settled(&self) -> Result<AgentView, AgentError> {
        let mut rx = self.view_rx.clone();
        let view = rx
            .wait_for(|v| !v.state.is_running())
            .await
            .map_err(|_| AgentError::Stopped)?;
        Ok(view.clone())
    }

    /// workflow 模式的最终输出；交互模式下永远不会到达 complete，直到 stop()
    pub async fn output(&self) -> Result<AgentOutput, AgentError> {
        let mut rx = self.view_rx.clone();
        let view = rx
            .wait_for(|v| v.state.is_terminal())
            .await
            .map_err(|_| AgentError::Stopped)?;
        match &view.state {
            AgentState::Complete(outcome) => Ok(AgentOutput {
                outcome: outcome.clone(),
                context: view.context.clone(),
            }),
            _ => Err(AgentError::Stopped),
        }
    }

    /// 外部停止：中止进行中的调用并丢弃状态机
    pub fn stop(&self) {
        self.supervisor.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

struct TranslatorInvocation {
    rx: mpsc::Receiver<MachineEvent>,
    task: JoinHandle<()>,
}

enum Inbound {
    Command(Command),
    Translator(Option<MachineEvent>),
    Dispatch(Result<DispatchOutcome, JoinError>),
}

struct Interpreter {
    machine: Machine,
    driver: Arc<dyn ModelDriver>,
    dispatcher: Arc<ToolDispatcher>,
    view_tx: watch::Sender<AgentView>,
    capacity: usize,
    translator: Option<TranslatorInvocation>,
    dispatch: Option<JoinHandle<DispatchOutcome>>,
    cancel: CancellationToken,
}

async fn next_translator_event(slot: &mut Option<TranslatorInvocation>) -> Option<MachineEvent> {
    match slot {
        Some(invocation) => invocation.rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_dispatch(
    slot: &mut Option<JoinHandle<DispatchOutcome>>,
) -> Result<DispatchOutcome, JoinError> {
    match slot {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

impl Interpreter {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>, initial: Vec<Effect>) {
        self.apply_effects(initial);
        self.publish();

        while !self.machine.state().is_terminal() {
            let inbound = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!(state = %self.machine.state(), "agent stopped");
                    break;
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => Inbound::Command(cmd),
                    None => break,  // 所有句柄已丢弃
                },
                event = next_translator_event(&mut self.translator) => Inbound::Translator(event),
                joined = next_dispatch(&mut self.dispatch) => Inbound::Dispatch(joined),
            };

            match inbound {
                Inbound::Command(Command::UserMessage { content, reply }) => {
                    if self.cancel.is_cancelled() {
                        let _ = reply.send(Err(AgentError::Stopped));
                        break;
                    }
                    let state = self.machine.state().clone();
                    if !state.accepts_user_message() {
                        let _ = reply.send(Err(AgentError::NotAcceptingInput(state.name().to_string())));
                        continue;
                    }
                    self.apply(MachineEvent::UserMessage { content });
                    let _ = reply.send(Ok(()));
                }
                Inbound::Translator(Some(event)) => self.apply(event),
                Inbound::Translator(None) => {
                    // 发送端在没有终止事件的情况下关闭（任务 panic 等）
                    self.translator = None;
                    self.apply(MachineEvent::Error {
                        message: "model stream ended unexpectedly".to_string(),
                    });
                }
                Inbound::Dispatch(joined) => {
                    self.dispatch = None;
                    match joined {
                        Ok(outcome) => self.apply(MachineEvent::ToolFinished(outcome)),
                        Err(e) => self.apply(MachineEvent::Error {
                            message: format!("tool dispatch aborted: {e}"),
                        }),
                    }
                }
            }
        }

        self.stop_translator();
        if let Some(handle) = self.dispatch.take() {
            handle.abort();
        }
    }

    fn apply(&mut self, event: MachineEvent) {
        let step = self.machine.handle(event);
        if step.handled {
            self.apply_effects(step.effects);
            self.publish();
        }
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::InvokeTranslator => self.start_translator(),
                Effect::StopTranslator => self.stop_translator(),
                Effect::DispatchTool(call) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let working_directory = self.machine.context().working_directory.clone();
                    tracing::info!(tool = %call.name, tool_call_id = %call.id, "executing tool");
                    self.dispatch = Some(tokio::spawn(async move {
                        dispatcher.dispatch(&call, &working_directory).await
                    }));
                }
            }
        }
    }

    fn start_translator(&mut self) {
        self.stop_translator();
        let ctx = self.machine.context();
        let mut tools = self.dispatcher.registry().specs();
        tools.extend(control_specs());
        let request = ModelRequest {
            messages: ctx.messages.clone(),
            working_directory: ctx.working_directory.clone(),
            snapshot: ctx.current_snapshot.clone(),
            tools,
        };
        tracing::info!(step = ctx.current_step, messages = ctx.messages.len(), "thinking");

        let (tx, rx) = mpsc::channel(self.capacity);
        let task = tokio::spawn(translator::invoke(Arc::clone(&self.driver), request, tx));
        self.translator = Some(TranslatorInvocation { rx, task });
    }

    /// 清理钩子：丢弃接收端并中止任务，之后该调用的事件不会再被读取
    fn stop_translator(&mut self) {
        if let Some(invocation) = self.translator.take() {
            invocation.task.abort();
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(AgentView {
            state: self.machine.state().clone(),
            context: self.machine.context().clone(),
        });
    }
}
