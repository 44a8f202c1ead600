//! 进程型插件工具：由 [capabilities.<name>].tools 声明
//!
//! 参数模板中的 `{{key}}` 取自模型传入的参数对象，`{{workspace}}` 固定为工作目录（模型不能覆盖）；
//! 模板只展开一遍，替换进去的值不会再被当作模板。完整参数 JSON 同时写入子进程 stdin。
//! 不经过 shell，直接 exec；超时后子进程随 Child 一起被杀掉。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::PluginEntry;
use crate::tools::Tool;

/// 返回给模型的输出上限（字符）
const MAX_OUTPUT_CHARS: usize = 8000;

pub struct PluginTool {
    entry: PluginEntry,
    workspace: PathBuf,
    timeout: Duration,
}

impl PluginTool {
    pub fn new(entry: &PluginEntry, workspace: &Path, timeout_secs: u64) -> Self {
        Self {
            entry: entry.clone(),
            workspace: workspace.to_path_buf(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn render_args(&self, args: &Value) -> Vec<String> {
        let mut vars: HashMap<&str, String> = HashMap::new();
        if let Value::Object(map) = args {
            for (key, value) in map {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                vars.insert(key.as_str(), text);
            }
        }
        vars.insert("workspace", self.workspace.display().to_string());
        self.entry.args.iter().map(|tpl| render(tpl, &vars)).collect()
    }
}

/// 单遍展开 `{{key}}`；未知 key 原样保留
fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let inner = &rest[open + 2..];
        let Some(close) = inner.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        match vars.get(inner[..close].trim()) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[open..open + close + 4]),
        }
        rest = &inner[close + 2..];
    }
    out.push_str(rest);
    out
}

fn clip(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_OUTPUT_CHARS {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(MAX_OUTPUT_CHARS).collect();
    format!("{}\n...(truncated)", head)
}

#[async_trait]
impl Tool for PluginTool {
    fn name(&self) -> &str {
        &self.entry.name
    }

    fn description(&self) -> &str {
        &self.entry.description
    }

    fn parameters_schema(&self) -> Value {
        match &self.entry.parameters {
            Some(schema) => schema.clone(),
            None => serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let argv = self.render_args(&args);
        tracing::debug!(tool = %self.entry.name, program = %self.entry.program, ?argv, "spawning plugin");

        let mut child = Command::new(&self.entry.program)
            .args(&argv)
            .current_dir(&self.workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("cannot start {}: {}", self.entry.program, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            // 子进程不读 stdin 时写入可能失败，忽略即可
            let _ = stdin.write_all(args.to_string().as_bytes()).await;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("{} did not finish within {}s", self.entry.program, self.timeout.as_secs()))?
            .map_err(|e| format!("{} failed: {}", self.entry.program, e))?;

        if output.status.success() {
            return Ok(clip(&String::from_utf8_lossy(&output.stdout)));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).into_owned()
        } else {
            stderr.into_owned()
        };
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        Err(format!("{} exited with {}: {}", self.entry.program, code, clip(&detail)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(program: &str, args: &[&str]) -> PluginEntry {
        PluginEntry {
            name: "sample".into(),
            description: "test plugin".into(),
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            parameters: None,
        }
    }

    #[test]
    fn test_render_placeholders() {
        let tool = PluginTool::new(&entry("ls", &["{{workspace}}/{{ file }}", "--n={{n}}", "{{missing}}"]), Path::new("/tmp/ws"), 5);
        let argv = tool.render_args(&json!({"file": "a.txt", "n": 3}));
        assert_eq!(argv, vec!["/tmp/ws/a.txt", "--n=3", "{{missing}}"]);
    }

    #[test]
    fn test_substituted_values_not_expanded_again() {
        let tool = PluginTool::new(&entry("ls", &["{{a}}"]), Path::new("/ws"), 5);
        let argv = tool.render_args(&json!({"a": "{{workspace}}", "workspace": "/etc"}));
        assert_eq!(argv, vec!["{{workspace}}"]);

        let tool = PluginTool::new(&entry("ls", &["{{workspace}}"]), Path::new("/ws"), 5);
        assert_eq!(tool.render_args(&json!({"workspace": "/etc"})), vec!["/ws"]);
    }

    #[test]
    fn test_unterminated_placeholder_kept() {
        let vars = HashMap::new();
        assert_eq!(render("x {{open", &vars), "x {{open");
    }

    #[test]
    fn test_clip_long_output() {
        let long = "x".repeat(MAX_OUTPUT_CHARS + 10);
        assert!(clip(&long).ends_with("...(truncated)"));
        assert_eq!(clip("  short \n"), "short");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let tool = PluginTool::new(&entry("/definitely/not/a/program", &[]), Path::new("."), 5);
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(err.starts_with("cannot start /definitely/not/a/program"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_program_with_rendered_args() {
        let tool = PluginTool::new(&entry("echo", &["hello", "{{who}}"]), Path::new("."), 5);
        assert_eq!(tool.execute(json!({"who": "world"})).await.unwrap(), "hello world");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_arguments_on_stdin() {
        let tool = PluginTool::new(&entry("cat", &[]), Path::new("."), 5);
        let out = tool.execute(json!({"q": 1})).await.unwrap();
        assert_eq!(out, r#"{"q":1}"#);
    }
}
