//! Drone 命令行入口
//!
//! - `drone replay <script.json>`：用脚本化模型驱动跑一次对话，结束后把最终状态以 JSON 打到 stdout
//! - `drone snapshot ...`：直接操作工作目录的 Git 快照（capture / diff / show / restore）

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use drone::config::{load_config, AppConfig, SnapshotBackendKind};
use drone::llm::{Script, ScriptedModelDriver};
use drone::snapshot::{GitTreeBackend, Snapshot, SnapshotStore};
use drone::{AgentBuilder, AgentHandle};

#[derive(Parser)]
#[command(name = "drone")]
#[command(about = "Snapshot-tracking coding agent runtime")]
#[command(version)]
struct Cli {
    /// Extra config file layered over config/default.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a conversation against a scripted model
    Replay {
        /// JSON script: {"initial_message", "turns", "follow_ups"}
        script: PathBuf,

        /// Run autonomously and stop at the first final answer
        #[arg(long)]
        workflow: bool,

        /// Working directory (defaults to config or current directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Keep snapshots in memory instead of the git object store
        #[arg(long)]
        memory_snapshots: bool,
    },
    /// Inspect or restore working directory snapshots
    Snapshot {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Record the current working directory and print its tree id
    Capture,
    /// List files that differ between two tree ids
    Diff { from: String, to: String },
    /// Print one file as it was in a tree
    Show { tree: String, path: String },
    /// Make the working directory match a tree
    Restore { tree: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    drone::observability::init();
    let cli = Cli::parse();
    let config = match load_config(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "config unavailable, using defaults");
            AppConfig::default()
        }
    };

    match cli.command {
        Commands::Replay {
            script,
            workflow,
            dir,
            memory_snapshots,
        } => replay(config, script, workflow, dir, memory_snapshots).await,
        Commands::Snapshot { dir, action } => snapshot(&config, dir, action).await,
    }
}

async fn replay(
    mut config: AppConfig,
    path: PathBuf,
    workflow: bool,
    dir: Option<PathBuf>,
    memory_snapshots: bool,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    let script: Script = serde_json::from_str(&raw).context("Invalid script")?;
    if memory_snapshots {
        config.snapshot.backend = SnapshotBackendKind::Memory;
    }

    let mut follow_ups = script.follow_ups.into_iter();
    let initial_message = script.initial_message.or_else(|| follow_ups.next());
    let driver = Arc::new(ScriptedModelDriver::new(script.turns));

    let mut builder = AgentBuilder::new(config)
        .with_driver(driver)
        .with_workflow_mode(workflow);
    if let Some(dir) = dir {
        builder = builder.with_working_directory(dir);
    }
    if let Some(message) = initial_message {
        builder = builder.with_initial_message(message);
    }
    let handle = builder.start().await.context("Failed to start agent")?;
    let observer = spawn_observer(&handle);

    let result = if workflow {
        let output = handle.output().await.context("Agent stopped early")?;
        serde_json::to_string_pretty(&output)?
    } else {
        let mut view = handle.wait_until_settled().await?;
        for message in follow_ups {
            if !view.state.accepts_user_message() || view.context.budget_exhausted() {
                break;
            }
            handle.send_message(message).await?;
            view = handle.wait_until_settled().await?;
        }
        handle.stop();
        serde_json::to_string_pretty(&view)?
    };

    observer.abort();
    println!("{result}");
    Ok(())
}

fn spawn_observer(handle: &AgentHandle) -> tokio::task::JoinHandle<()> {
    let mut rx = handle.subscribe();
    tokio::spawn(async move {
        let mut last = rx.borrow_and_update().state_name();
        while rx.changed().await.is_ok() {
            let view = rx.borrow_and_update();
            let state = view.state_name();
            if state != last {
                tracing::info!(
                    from = last,
                    to = state,
                    step = view.context.current_step,
                    snapshots = view.context.snapshot_history.len(),
                    "state changed"
                );
                last = state;
            }
        }
    })
}

async fn snapshot(config: &AppConfig, dir: PathBuf, action: SnapshotAction) -> anyhow::Result<()> {
    let backend = Arc::new(GitTreeBackend::new(config.snapshot.mode));
    let store = SnapshotStore::new(backend, dir);

    match action {
        SnapshotAction::Capture => {
            let snapshot = store.capture(Some("manual")).await?;
            println!("{}", snapshot.tree_hash);
        }
        SnapshotAction::Diff { from, to } => {
            let changes = store
                .diff(&Snapshot::new(from, None), &Snapshot::new(to, None))
                .await?;
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }
        SnapshotAction::Show { tree, path } => {
            let content = store.read_file(tree.as_str(), &path).await?;
            std::io::stdout().write_all(&content)?;
        }
        SnapshotAction::Restore { tree } => {
            store.restore(tree.as_str()).await?;
            tracing::info!(tree = %tree, "working directory restored");
        }
    }
    Ok(())
}
