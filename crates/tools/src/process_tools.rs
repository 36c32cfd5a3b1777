use crate::output::truncate_utf8;
use crate::path_guard::PathGuard;
use crate::traits::{parse_input, Tool, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Deserialize)]
struct ExecuteCommandInput {
    command: String,
    #[serde(default)]
    cwd: Option<String>,
}

/// Bytes kept from one output pipe, plus how many the command wrote in total.
#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    total: usize,
}

/// Read `reader` to EOF, keeping at most `cap` bytes and discarding the rest
/// so the child never blocks on a full pipe.
async fn capture<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> std::io::Result<Captured> {
    let mut captured = Captured::default();
    let Some(mut reader) = reader else {
        return Ok(captured);
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(captured);
        }
        captured.total += n;
        let room = cap.saturating_sub(captured.bytes.len());
        captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
    }
}

/// Runs a command line through the platform shell.
pub struct ExecuteCommandTool {
    guard: PathGuard,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ExecuteCommandTool {
    pub fn new(guard: PathGuard, timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            guard,
            timeout,
            max_output_bytes,
        }
    }

    fn shell(command_line: &str) -> Command {
        if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command_line]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command_line]);
            cmd
        }
    }

    fn section(&self, out: &mut String, label: &str, captured: &Captured) {
        let text = String::from_utf8_lossy(&captured.bytes);
        let text = text.trim_end();
        if text.is_empty() {
            return;
        }
        let (kept, cut) = truncate_utf8(text, self.max_output_bytes);
        out.push_str(&format!("\n[{}]\n{}", label, kept));
        if cut || captured.total > captured.bytes.len() {
            out.push_str(&format!("\n…（输出过长，已截断，共 {} 字节）", captured.total));
        }
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "在系统 shell 中执行命令并返回输出（Linux/macOS 使用 sh，Windows 使用 cmd）。命令有超时限制"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "要执行的命令行"
                },
                "cwd": {
                    "type": "string",
                    "description": "工作目录（可选，绝对路径或以 ~/ 开头）"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let input: ExecuteCommandInput = parse_input(input)?;
        if input.command.trim().is_empty() {
            return Err(ToolError::Validation("命令为空".into()));
        }

        let mut cmd = Self::shell(&input.command);
        if let Some(cwd) = &input.cwd {
            cmd.current_dir(self.guard.resolve(cwd)?);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Executing command: {}", input.command);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return Ok(format!("❌ 命令执行失败: {}", e)),
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = self.max_output_bytes;

        let run = async {
            let (stdout, stderr, status) =
                tokio::join!(capture(stdout, cap), capture(stderr, cap), child.wait());
            Ok::<_, std::io::Error>((stdout?, stderr?, status?))
        };

        // On timeout the child is killed when it drops at the end of this call.
        let (stdout, stderr, status) = match timeout(self.timeout, run).await {
            Err(_) => {
                return Ok(format!(
                    "❌ 命令执行失败: 超时（{}秒）未完成: {}",
                    self.timeout.as_secs_f32(),
                    input.command
                ))
            }
            Ok(Err(e)) => return Ok(format!("❌ 命令执行失败: {}", e)),
            Ok(Ok(captured)) => captured,
        };

        let mut out = if status.success() {
            "✅ 命令执行成功".to_string()
        } else {
            match status.code() {
                Some(code) => format!("❌ 命令执行失败: 退出码 {}", code),
                None => "❌ 命令执行失败: 进程被信号终止".to_string(),
            }
        };
        self.section(&mut out, "stdout", &stdout);
        self.section(&mut out, "stderr", &stderr);
        Ok(out)
    }
}
