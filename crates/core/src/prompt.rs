use chrono::{DateTime, Local};

pub const DEFAULT_PERSONA: &str = "你是 Deskmate，一个运行在用户电脑上的桌面助手。\
你可以通过工具读写文件、执行命令、管理回收站，并记住用户的偏好。\
需要操作本机时直接调用工具，不要只描述步骤。\
文件路径一律使用绝对路径或以 ~/ 开头。\
执行不可逆操作（例如清空回收站）前，确认这是用户明确的要求。\
回答使用简体中文，简洁明了。";

/// Facts about the machine the assistant runs on.
#[derive(Debug, Clone)]
pub struct Environment {
    pub now: DateTime<Local>,
    pub os: String,
    pub home: Option<String>,
}

impl Environment {
    pub fn current() -> Self {
        Self {
            now: Local::now(),
            os: std::env::consts::OS.to_string(),
            home: dirs::home_dir().map(|h| h.display().to_string()),
        }
    }
}

/// Per-turn system prompt. The memory document lives here and never in the
/// transcript.
pub fn build_system_prompt(
    persona: &str,
    env: &Environment,
    tools: &[(String, String)],
    memory: &str,
) -> String {
    let mut prompt = String::from(persona.trim());

    prompt.push_str("\n\n## 当前环境\n");
    prompt.push_str(&format!("- 时间: {}\n", env.now.format("%Y-%m-%d %H:%M (%A)")));
    prompt.push_str(&format!("- 操作系统: {}\n", env.os));
    if let Some(home) = &env.home {
        prompt.push_str(&format!("- 用户主目录: {}\n", home));
    }

    if !tools.is_empty() {
        prompt.push_str("\n## 可用工具\n");
        for (name, description) in tools {
            prompt.push_str(&format!("- {}: {}\n", name, description));
        }
    }

    let memory = memory.trim();
    if !memory.is_empty() {
        prompt.push_str("\n## 关于用户的记忆\n");
        prompt.push_str("以下是之前会话中保存的记忆，可用 get_ai_memory / save_ai_memory 读取和更新：\n\n");
        prompt.push_str(memory);
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn env() -> Environment {
        Environment {
            now: Local.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).single().unwrap_or_else(Local::now),
            os: "linux".into(),
            home: Some("/home/alice".into()),
        }
    }

    #[test]
    fn test_prompt_sections() {
        let tools = vec![("empty_trash".to_string(), "清空回收站（不可逆）".to_string())];
        let prompt = build_system_prompt(DEFAULT_PERSONA, &env(), &tools, "# AI 记忆\n- 喜欢深色模式");

        assert!(prompt.starts_with("你是 Deskmate"));
        assert!(prompt.contains("- 操作系统: linux"));
        assert!(prompt.contains("- 用户主目录: /home/alice"));
        assert!(prompt.contains("- empty_trash: 清空回收站（不可逆）"));
        assert!(prompt.ends_with("# AI 记忆\n- 喜欢深色模式\n"));
    }

    #[test]
    fn test_blank_memory_and_no_tools_are_omitted() {
        let prompt = build_system_prompt("persona", &env(), &[], "   ");
        assert!(!prompt.contains("## 可用工具"));
        assert!(!prompt.contains("## 关于用户的记忆"));
    }
}
