//! 交互式命令行
//!
//! 逐行读取指令并交给 DialogueManager；发言期间 Ctrl-C 只取消当前 Turn，空闲时 Ctrl-C 退出。
//! 调试模式下，后台任务把 ReactEvent 逐条打印出来。
//! stdin 由独立的 OS 线程阻塞读取后经 channel 送入，退出时不必等待该线程，进程可以立即结束。

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::core::{DialogueError, DialogueManager};
use crate::memory::Turn;
use crate::react::ReactEvent;

/// 删除提示中内容预览的字符数
const DELETE_PREVIEW_CHARS: usize = 20;

const HELP: &str = "
指令列表:
  list / show     列出所有消息及其序号
  delete <n>      根据序号删除消息（各角色下次发言时自动基于剩余历史）
  speak <id>      指定 ID 为 <id> 的角色生成下一条回复
  auto <n>        按配置中的角色顺序自动轮流发言 <n> 次
  status          查看当前已加载的角色及其私有工具
  export [name]   将当前对话保存至历史目录下的 [name].json
  load <path>     从指定文件导入对话记录
  debug on|off    开关调试输出（工具调用与观察）
  help            显示本帮助
  exit            退出（配置 save_on_exit 时自动保存）
";

/// REPL 指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    List,
    Delete(usize),
    Speak(String),
    Auto(usize),
    Status,
    Export(Option<String>),
    Load(PathBuf),
    Debug(bool),
    Help,
    Exit,
}

/// 指令解析失败（Display 即给用户看的提示）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("用法: {0}")]
    Usage(&'static str),

    #[error("[错误] 序号必须是非负整数: {0}")]
    NotANumber(String),

    #[error("未知指令: {0}，输入 help 查看帮助。")]
    Unknown(String),
}

/// 解析一行输入；空行返回 Ok(None)
pub fn parse_command(line: &str) -> Result<Option<ReplCommand>, ParseError> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();
    let number = |usage: &'static str| -> Result<usize, ParseError> {
        let raw = arg.ok_or(ParseError::Usage(usage))?;
        raw.parse().map_err(|_| ParseError::NotANumber(raw.to_string()))
    };

    let cmd = match head.to_lowercase().as_str() {
        "list" | "show" => ReplCommand::List,
        "delete" => ReplCommand::Delete(number("delete <序号>")?),
        "speak" => ReplCommand::Speak(arg.ok_or(ParseError::Usage("speak <agent_id>"))?.to_string()),
        "auto" => ReplCommand::Auto(number("auto <n>")?),
        "status" => ReplCommand::Status,
        "export" => ReplCommand::Export(arg.map(str::to_string)),
        "load" => ReplCommand::Load(PathBuf::from(arg.ok_or(ParseError::Usage("load <path>"))?)),
        "debug" => match arg.map(str::to_lowercase).as_deref() {
            Some("on") => ReplCommand::Debug(true),
            Some("off") => ReplCommand::Debug(false),
            _ => return Err(ParseError::Usage("debug on|off")),
        },
        "help" => ReplCommand::Help,
        "exit" | "quit" => ReplCommand::Exit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(cmd))
}

/// 时间线表格（序号 | 角色 | 单行内容）
pub fn format_timeline(turns: &[Turn]) -> String {
    let mut out = String::new();
    out.push_str(&"=".repeat(40));
    out.push_str(&format!("\n{:<4} | {:<10} | 消息内容\n", "序号", "角色"));
    out.push_str(&"-".repeat(40));
    out.push('\n');
    for (i, turn) in turns.iter().enumerate() {
        let content = turn.content.replace('\n', " ");
        out.push_str(&format!("{:03}  | {:<10} | {}\n", i, turn.speaker_name, content));
    }
    out.push_str(&"=".repeat(40));
    out
}

/// 角色与私有工具列表
pub fn format_status(agents: &[Agent]) -> String {
    let mut out = String::from("--- 角色状态与私有工具 ---\n");
    for agent in agents {
        let names = agent.executor.tool_names();
        let tools = if names.is_empty() {
            "无".to_string()
        } else {
            names.join(", ")
        };
        out.push_str(&format!(
            "ID: {:12} | 姓名: {:10} | 模型: {} | 私有工具: {}\n",
            agent.id(),
            agent.name(),
            agent.model,
            tools
        ));
    }
    out
}

fn format_event(ev: &ReactEvent) -> String {
    match ev {
        ReactEvent::RoundStarted { agent, round, max_rounds } => {
            format!("[debug] {agent} 第 {round}/{max_rounds} 轮请求")
        }
        ReactEvent::ToolCall { agent, tool, call_id, arguments } => {
            format!("[debug] {agent} 调用工具 {tool} ({call_id}): {arguments}")
        }
        ReactEvent::Observation { agent, tool, preview, .. } => {
            format!("[debug] {agent} <- {tool}: {preview}")
        }
        ReactEvent::ToolFailure { agent, tool, reason } => {
            format!("[debug] {agent} 工具 {tool} 失败: {reason}")
        }
        ReactEvent::Reply { agent, text } => format!("[debug] {agent} 回复 {} 字", text.chars().count()),
        ReactEvent::TokenUsage {
            agent,
            prompt_tokens,
            completion_tokens,
            total_tokens,
        } => format!("[debug] {agent} tokens: prompt {prompt_tokens} / completion {completion_tokens} / total {total_tokens}"),
    }
}

enum Flow {
    Continue,
    Exit,
}

/// 在 Ctrl-C 时取消 token 的前提下等待 fut
async fn interruptible<F, T>(cancel: &CancellationToken, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let token = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    let out = fut.await;
    watcher.abort();
    out
}

async fn speak_and_print(manager: &DialogueManager, agent_id: &str, cancel: &CancellationToken) -> Result<(), DialogueError> {
    let turn = interruptible(cancel, manager.speak(agent_id, cancel.clone())).await?;
    println!("\n[{}]: {}", turn.speaker_name, turn.content);
    Ok(())
}

async fn execute(manager: &DialogueManager, cmd: ReplCommand) -> anyhow::Result<Flow> {
    match cmd {
        ReplCommand::List => println!("\n{}", format_timeline(&manager.turns().await)),
        ReplCommand::Delete(position) => match manager.delete(position).await {
            Ok(removed) => {
                let preview: String = removed.content.chars().take(DELETE_PREVIEW_CHARS).collect();
                println!("[成功] 已删除序号 {} 的消息: [{}]: {}...", position, removed.speaker_name, preview);
            }
            Err(DialogueError::TurnNotFound { .. }) => println!("[错误] 无效的序号: {}", position),
            Err(e) => return Err(e.into()),
        },
        ReplCommand::Speak(agent_id) => {
            let name = manager.agent(&agent_id).map(|a| a.name()).unwrap_or("未知");
            println!("[*] 正在等待 {} ({}) 回复...", agent_id, name);
            speak_and_print(manager, &agent_id, &CancellationToken::new()).await?;
        }
        ReplCommand::Auto(rounds) => {
            let order = manager.round_robin(rounds)?;
            let cancel = CancellationToken::new();
            for (i, agent_id) in order.iter().enumerate() {
                println!("[*] ({}/{}) {} 正在思考...", i + 1, rounds, agent_id);
                speak_and_print(manager, agent_id, &cancel).await?;
            }
        }
        ReplCommand::Status => println!("\n{}", format_status(manager.agents())),
        ReplCommand::Export(name) => {
            let path = manager.export(name.as_deref()).await?;
            println!("历史记录已导出至: {}", path.display());
        }
        ReplCommand::Load(path) => {
            let count = manager.load(&path).await?;
            println!("已加载 {} 条历史，共 {} 个角色。", count, manager.agents().len());
        }
        ReplCommand::Debug(enabled) => {
            manager.set_debug(enabled);
            println!("Debug 模式已{}。", if enabled { "开启" } else { "关闭" });
        }
        ReplCommand::Help => println!("{}", HELP),
        ReplCommand::Exit => {
            if manager.settings().save_on_exit {
                let path = manager.export(None).await?;
                println!("已自动保存历史至: {}", path.display());
            }
            return Ok(Flow::Exit);
        }
    }
    Ok(Flow::Continue)
}

fn prompt() {
    print!("\n>>> ");
    let _ = std::io::stdout().flush();
}

/// 运行 REPL 直到 exit、EOF 或空闲时 Ctrl-C
/// 在后台线程中逐行读取 reader；读到 EOF、出错或接收端被丢弃时线程结束
pub fn spawn_line_reader<R>(reader: R) -> UnboundedReceiver<std::io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in reader.lines() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn run(manager: Arc<DialogueManager>, mut events: UnboundedReceiver<ReactEvent>) -> anyhow::Result<()> {
    let printer = tokio::spawn(async move {
        while let Some(ev) = events.recv().await {
            println!("{}", format_event(&ev));
        }
    });

    println!("\n[已加载角色]");
    for agent in manager.agents() {
        println!(" - ID: {:12} | 姓名: {}", agent.id(), agent.name());
    }
    println!("\n系统就绪。输入 'help' 查看指令。");

    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    loop {
        prompt();
        let line = tokio::select! {
            line = lines.recv() => line.transpose().context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                println!("\n程序中断，正在退出...");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        match execute(&manager, cmd).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Err(e) => println!("\n[运行时错误]: {:#}", e),
        }
    }

    printer.abort();
    Ok(())
}
