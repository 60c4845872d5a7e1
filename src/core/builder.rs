//! Agent 构建器：统一的对话启动逻辑
//!
//! 组装模型驱动、工具注册表、快照存储与调度器，解析工作目录并捕获初始快照，
//! 最后交给 AgentHandle::spawn。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{AgentHandle, AgentOptions};
use crate::config::{AppConfig, SnapshotBackendKind};
use crate::core::AgentError;
use crate::llm::ModelDriver;
use crate::snapshot::{GitTreeBackend, MemoryTreeBackend, Snapshot, SnapshotStore, TreeBackend};
use crate::tools::{Tool, ToolDispatcher, ToolRegistry};

/// 开始一次对话所需的全部组件
pub struct AgentBuilder {
    config: AppConfig,
    options: AgentOptions,
    driver: Option<Arc<dyn ModelDriver>>,
    registry: ToolRegistry,
    backend: Option<Arc<dyn TreeBackend>>,
}

impl AgentBuilder {
    /// 以配置文件中的 [agent] 段作为默认参数
    pub fn new(config: AppConfig) -> Self {
        let options = config.agent_options();
        Self {
            config,
            options,
            driver: None,
            registry: ToolRegistry::new(),
            backend: None,
        }
    }

    pub fn with_driver(mut self, driver: Arc<dyn ModelDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn with_options(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn register_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.registry.register(tool);
        self
    }

    /// 覆盖配置中选择的快照后端
    pub fn with_backend(mut self, backend: Arc<dyn TreeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.working_directory = Some(dir.into());
        self
    }

    pub fn with_initial_message(mut self, content: impl Into<String>) -> Self {
        self.options.initial_message = Some(content.into());
        self
    }

    pub fn with_workflow_mode(mut self, workflow_mode: bool) -> Self {
        self.options.workflow_mode = workflow_mode;
        self
    }

    pub fn with_step_budget(mut self, budget: usize) -> Self {
        self.options.step_budget = budget;
        self
    }

    /// 解析工作目录：参数 > 配置 > 进程当前目录
    pub fn resolve_working_directory(&self) -> Result<PathBuf, AgentError> {
        let dir = match &self.options.working_directory {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| AgentError::WorkingDirectory(e.to_string()))?,
        };
        if !dir.is_dir() {
            return Err(AgentError::WorkingDirectory(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Ok(dir)
    }

    /// 根据 [snapshot] 段构建存储；关闭快照时返回 None
    pub fn build_snapshot_store(&self, working_directory: PathBuf) -> Option<Arc<SnapshotStore>> {
        let backend = match &self.backend {
            Some(backend) => Arc::clone(backend),
            None if !self.config.snapshot.enabled => return None,
            None => match self.config.snapshot.backend {
                SnapshotBackendKind::Git => {
                    Arc::new(GitTreeBackend::new(self.config.snapshot.mode)) as Arc<dyn TreeBackend>
                }
                SnapshotBackendKind::Memory => Arc::new(MemoryTreeBackend::new()),
            },
        };
        Some(Arc::new(SnapshotStore::new(backend, working_directory)))
    }

    /// 启动对话；初始快照捕获失败不会阻止启动，只会得到降级占位
    pub async fn start(self) -> Result<AgentHandle, AgentError> {
        let driver = self
            .driver
            .clone()
            .ok_or_else(|| AgentError::ConfigError("no model driver configured".to_string()))?;
        let working_directory = self.resolve_working_directory()?;
        let store = self.build_snapshot_store(working_directory.clone());

        let initial_snapshot = match &store {
            Some(store) => match store.capture(Some("initial")).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(error = %e, dir = %working_directory.display(), "initial snapshot unavailable");
                    Snapshot::placeholder("initial")
                }
            },
            None => Snapshot::placeholder("initial"),
        };

        let mut dispatcher = ToolDispatcher::new(self.registry)
            .with_mutating(self.config.tools.mutating.iter().cloned())
            .with_timeout(self.config.tools.tool_timeout_secs.map(Duration::from_secs));
        if let Some(store) = store {
            dispatcher = dispatcher.with_snapshots(store);
        }

        tracing::info!(
            dir = %working_directory.display(),
            snapshot = %initial_snapshot.tree_hash,
            workflow = self.options.workflow_mode,
            step_budget = self.options.step_budget,
            "starting conversation"
        );

        Ok(AgentHandle::spawn(
            working_directory,
            initial_snapshot,
            self.options,
            driver,
            Arc::new(dispatcher),
        ))
    }
}
