//! MASS - 多 Agent 模拟对话框架
//!
//! 入口：初始化日志、加载配置、创建全部 Agent，可选导入历史，然后进入交互式命令行。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mass::config::{load_config, AppConfig};
use mass::core::DialogueManager;

#[derive(Parser, Debug)]
#[command(name = "mass", version, about = "多 Agent 模拟对话框架")]
struct Args {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(short, long, env = "MASS_CONFIG")]
    config: Option<PathBuf>,

    /// 启动时导入的历史文件
    #[arg(short, long)]
    load: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    mass::observability::init();

    let cfg = load_config(args.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    // 插件工具在工作目录下执行
    if let Err(e) = cfg.tools.ensure_workspace() {
        tracing::warn!(
            workspace = ?cfg.tools.workspace_root,
            error = %e,
            "cannot create tool workspace, plugins may fail to start"
        );
    }

    println!("--- MASS: Multi-Agent Simulated Scenarios ---");
    println!("正在初始化 Agent...");
    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
    let manager = DialogueManager::from_config(&cfg)
        .await
        .context("Failed to initialize agents")?
        .with_event_tx(event_tx);

    if let Some(path) = args.load.as_ref() {
        let count = manager
            .load(path)
            .await
            .with_context(|| format!("Failed to load history from {}", path.display()))?;
        println!("已加载 {} 条历史: {}", count, path.display());
    }

    mass::cli::run(Arc::new(manager), event_rx)
        .await
        .context("REPL failed")?;

    Ok(())
}
