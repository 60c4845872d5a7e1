//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DRONE__*` 覆盖（双下划线表示嵌套，如 `DRONE__AGENT__STEP_BUDGET=10`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::agent::{AgentOptions, DEFAULT_EVENT_CHANNEL_CAPACITY};
use crate::machine::DEFAULT_STEP_BUDGET;
use crate::snapshot::CaptureMode;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub snapshot: SnapshotSection,
    pub tools: ToolsSection,
}

/// [agent] 段：步数预算、模式、工作目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 一次对话允许的 USER_MESSAGE 总数
    pub step_budget: usize,
    pub workflow_mode: bool,
    /// 未设置时用进程当前目录
    pub working_directory: Option<PathBuf>,
    pub event_channel_capacity: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            step_budget: DEFAULT_STEP_BUDGET,
            workflow_mode: false,
            working_directory: None,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// 快照后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotBackendKind {
    #[default]
    Git,
    /// 进程内内容寻址存储，不依赖 git（测试、非仓库目录）
    Memory,
}

/// [snapshot] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotSection {
    /// false 时不捕获任何快照，所有快照都是降级占位
    pub enabled: bool,
    pub backend: SnapshotBackendKind,
    pub mode: CaptureMode,
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: SnapshotBackendKind::Git,
            mode: CaptureMode::Worktree,
        }
    }
}

/// [tools] 段：超时与额外的变更型工具名
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）；未设置时不限时
    pub tool_timeout_secs: Option<u64>,
    /// 除工具自身声明外，额外视为会修改文件系统的工具名
    pub mutating: Vec<String>,
}

impl AppConfig {
    /// 由 [agent] 段生成默认的对话参数
    pub fn agent_options(&self) -> AgentOptions {
        AgentOptions {
            working_directory: self.agent.working_directory.clone(),
            initial_message: None,
            step_budget: self.agent.step_budget,
            workflow_mode: self.agent.workflow_mode,
            event_channel_capacity: self.agent.event_channel_capacity,
        }
    }
}

/// 从 config 目录加载配置，环境变量 DRONE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DRONE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DRONE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.step_budget, 50);
        assert!(!cfg.agent.workflow_mode);
        assert!(cfg.snapshot.enabled);
        assert_eq!(cfg.snapshot.backend, SnapshotBackendKind::Git);
        assert_eq!(cfg.snapshot.mode, CaptureMode::Worktree);
        assert!(cfg.tools.tool_timeout_secs.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[agent]\nstep_budget = 3\n\n[snapshot]\nbackend = \"memory\"\nmode = \"head\"\n\n[tools]\ntool_timeout_secs = 5\nmutating = [\"write\"]"
        )
        .unwrap();

        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from(file.path().to_path_buf()))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.agent.step_budget, 3);
        assert_eq!(cfg.agent.event_channel_capacity, 64);
        assert!(cfg.snapshot.enabled);
        assert_eq!(cfg.snapshot.backend, SnapshotBackendKind::Memory);
        assert_eq!(cfg.snapshot.mode, CaptureMode::Head);
        assert_eq!(cfg.tools.tool_timeout_secs, Some(5));
        assert_eq!(cfg.tools.mutating, vec!["write".to_string()]);

        let options = cfg.agent_options();
        assert_eq!(options.step_budget, 3);
        assert!(options.initial_message.is_none());
    }
}
